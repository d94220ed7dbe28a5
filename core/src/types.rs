//! Success payloads handed back to callers.
//!
//! # Design
//! The client does not know the caller's domain types. A 2xx body is parsed
//! according to the declared `content-type` into a `Content` value, and the
//! caller deserializes that into its own types with `ApiResponse::json`.

use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::http::HttpResponse;

/// Terminal result of one logical request.
pub type Outcome = Result<ApiResponse, ApiError>;

/// A 2xx body, parsed by declared content kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Json(serde_json::Value),
    Text(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content: Content,
}

impl ApiResponse {
    /// Parse a successful transport response. A body declared as JSON that
    /// does not parse is a `Deserialization` failure, not text.
    pub fn from_http(response: HttpResponse) -> Result<Self, ApiError> {
        let declared_json = response
            .header("content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

        let content = if response.body.trim().is_empty() {
            Content::Empty
        } else if declared_json {
            let value = serde_json::from_str(&response.body)
                .map_err(|e| ApiError::Deserialization(e.to_string()))?;
            Content::Json(value)
        } else {
            Content::Text(response.body)
        };

        Ok(Self {
            status: response.status,
            headers: response.headers,
            content,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        crate::http::find_header(&self.headers, name)
    }

    /// Deserialize the body into `T`. Text bodies are parsed as JSON too;
    /// an empty body deserializes from `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let parsed = match &self.content {
            Content::Json(value) => serde_json::from_value(value.clone()),
            Content::Text(text) => serde_json::from_str(text),
            Content::Empty => serde_json::from_value(serde_json::Value::Null),
        };
        parsed.map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}
