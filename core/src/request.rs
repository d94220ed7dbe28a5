//! Caller options and the immutable descriptor an attempt sequence runs on.

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{set_header_if_absent, HttpMethod};

/// Per-call options for `RemoteClient` operations.
///
/// Verb helpers (`get`, `post`, ...) set `method` and `body` themselves;
/// `RemoteClient::request` reads both from here and defaults to GET.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<HttpMethod>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Overrides the client's default per-attempt timeout.
    pub timeout: Option<Duration>,
    pub skip_auth: bool,
    pub skip_retry: bool,
    /// Allow deduplication of a non-GET request the caller knows is safe to share.
    pub idempotent: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value =
            serde_json::to_value(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }
}

/// Everything one logical request needs, fixed before the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Correlation id, sent as `x-request-id` on every attempt.
    pub id: Uuid,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
    pub skip_auth: bool,
    pub skip_retry: bool,
    pub idempotent: bool,
}

impl RequestDescriptor {
    pub fn new(url: String, options: RequestOptions) -> Result<Self, ApiError> {
        let mut headers = options.headers;
        let body = match options.body {
            Some(value) => {
                let body = serde_json::to_string(&value)
                    .map_err(|e| ApiError::Serialization(e.to_string()))?;
                set_header_if_absent(&mut headers, "content-type", "application/json".to_string());
                Some(body)
            }
            None => None,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            method: options.method.unwrap_or(HttpMethod::Get),
            url,
            headers,
            body,
            timeout: options.timeout,
            skip_auth: options.skip_auth,
            skip_retry: options.skip_retry,
            idempotent: options.idempotent,
        })
    }

    /// Only reads, or requests the caller explicitly vouched for, may share
    /// an in-flight outcome.
    pub fn is_deduplicable(&self) -> bool {
        self.method == HttpMethod::Get || self.idempotent
    }

    /// Method, absolute URL and serialized body. Headers and options are
    /// deliberately left out: requests sharing a key are interchangeable.
    pub fn canonical_key(&self) -> String {
        format!(
            "{} {} {}",
            self.method,
            self.url,
            self.body.as_deref().unwrap_or("")
        )
    }
}

/// Resolve `path` against `base_url`. Absolute URLs pass through untouched.
pub fn resolve_url(base_url: &str, path: &str) -> Result<String, ApiError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(path.to_string());
    }
    if base_url.is_empty() {
        return Err(ApiError::InvalidUrl(format!(
            "relative path {path:?} with no base address configured"
        )));
    }
    Ok(format!("{}/{}", base_url, path.trim_start_matches('/')))
}
