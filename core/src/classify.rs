//! Decide which failures are worth another attempt.

use crate::error::{TransportError, TransportErrorKind};

/// Coarse bucket for an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    RateLimited,
    ClientError,
    ServerError,
    /// 1xx and 3xx: nothing the executor knows how to handle.
    Unexpected,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 => StatusClass::RateLimited,
        400..=499 => StatusClass::ClientError,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Unexpected,
    }
}

/// Whether a failed attempt may be retried.
///
/// A status wins over a transport error: if the server answered, its answer
/// decides. Without a status only network-level transport failures qualify.
pub fn is_retryable(status: Option<u16>, transport: Option<&TransportError>) -> bool {
    match (status, transport) {
        (Some(status), _) => matches!(
            classify_status(status),
            StatusClass::RateLimited | StatusClass::ServerError
        ),
        (None, Some(err)) => matches!(
            err.kind,
            TransportErrorKind::Connect
                | TransportErrorKind::Dns
                | TransportErrorKind::Timeout
                | TransportErrorKind::Aborted
        ),
        (None, None) => false,
    }
}
