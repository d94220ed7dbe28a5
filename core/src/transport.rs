//! The network seam.
//!
//! # Design
//! The executor never talks to a socket directly. It hands one `HttpRequest`
//! per attempt to a `Transport` and gets back either an `HttpResponse` (for
//! any status, 4xx/5xx included) or a `TransportError` when no status was
//! received. Deadlines are not the transport's business: the executor drops
//! the `send` future when an attempt's deadline expires, which aborts the
//! underlying call.

use std::error::Error as _;

use async_trait::async_trait;

use crate::error::{TransportError, TransportErrorKind};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport used in production.
///
/// Redirects are not followed and no client-level timeout is configured, so
/// every status reaches the classifier and every deadline is the executor's.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("remote-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client })
    }

    /// Wrap an already configured client, e.g. one with custom TLS roots.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    let message = error_chain(&err);
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        if message.contains("dns error") {
            TransportErrorKind::Dns
        } else {
            TransportErrorKind::Connect
        }
    } else if err.is_builder() {
        TransportErrorKind::Other
    } else if err.is_request() || err.is_body() {
        // Connection dropped mid-exchange.
        TransportErrorKind::Aborted
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, message)
}

/// `reqwest` keeps the useful detail (DNS, refused, reset) in its sources.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
