//! HTTP transport types shared by the executor and every `Transport`.
//!
//! # Design
//! Requests and responses are plain data. The executor builds an
//! `HttpRequest` per attempt and hands it to a `Transport`; the transport
//! returns an `HttpResponse` for any status it received, leaving status
//! interpretation to the core. This keeps retry and classification logic
//! testable against an in-memory transport.
//!
//! Headers stay as ordered `(name, value)` pairs. Lookups compare names
//! case-insensitively, as HTTP requires.

use std::fmt;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt's worth of request, described as plain data.
///
/// `url` is absolute: the facade resolves relative paths against the
/// configured base address before the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response as returned by a `Transport`, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Case-insensitive header lookup. The first matching pair wins.
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Insert `name: value` unless a header with that name is already present.
pub(crate) fn set_header_if_absent(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    if find_header(headers, name).is_none() {
        headers.push((name.to_string(), value));
    }
}
