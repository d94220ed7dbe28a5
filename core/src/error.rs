//! Error types for the remote-call layer.
//!
//! # Design
//! Every terminal failure of a logical request is an `ApiError` value the
//! caller must observe. Variants follow how a caller is expected to react:
//! a definitive `ClientError` is never retried, `RateLimited`, `ServerError`
//! and `Network` are retried up to the budget, and `ExhaustedRetries` wraps
//! whichever of those was observed last once the budget runs out.
//!
//! `ApiError` is `Clone` because a single deduplicated outcome is handed to
//! every waiter that shared it.

use thiserror::Error;

/// What went wrong below HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused or reset.
    Connect,
    /// Host name did not resolve.
    Dns,
    /// The attempt deadline expired and the call was dropped.
    Timeout,
    /// The call was cancelled before a response arrived.
    Aborted,
    /// Anything else, e.g. a request the transport could not build.
    Other,
}

/// A failure reported by a `Transport` when no HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }
}

/// Terminal failure of a logical request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// 4xx other than 429. Never retried.
    #[error("HTTP {status}: {body}")]
    ClientError { status: u16, body: String },

    /// 429 Too Many Requests.
    #[error("rate limited: {body}")]
    RateLimited { body: String },

    /// 5xx.
    #[error("server error HTTP {status}: {body}")]
    ServerError { status: u16, body: String },

    /// No HTTP status was received.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// The retry budget ran out; `last` is the final attempt's failure.
    #[error("gave up after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: Box<ApiError> },

    /// A status outside 2xx/4xx/5xx, e.g. an unfollowed redirect.
    #[error("unexpected HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The path could not be resolved against the base address.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A success body could not be deserialized into the requested type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// The failure that actually happened, looking through `ExhaustedRetries`.
    pub fn last_failure(&self) -> &ApiError {
        match self {
            ApiError::ExhaustedRetries { last, .. } => last.last_failure(),
            other => other,
        }
    }

    /// HTTP status of the underlying failure, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self.last_failure() {
            ApiError::ClientError { status, .. }
            | ApiError::ServerError { status, .. }
            | ApiError::UnexpectedStatus { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.last_failure(),
            ApiError::Network(TransportError {
                kind: TransportErrorKind::Timeout,
                ..
            })
        )
    }
}
