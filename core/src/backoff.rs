//! Exponential backoff and server retry hints.

use std::time::Duration;

use crate::http::find_header;

pub const RETRY_AFTER: &str = "retry-after";

/// Retry budget and backoff bounds for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts allowed after the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay, hints included.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        delay(attempt, self.base_delay, self.max_delay)
    }

    /// Delay before retrying a rate-limited attempt: the server's hint when
    /// it sent a usable one, the exponential formula otherwise.
    pub fn rate_limited_backoff(&self, attempt: u32, headers: &[(String, String)]) -> Duration {
        match retry_after_override(headers) {
            Some(hint) => hint.min(self.max_delay),
            None => self.backoff(attempt),
        }
    }
}

/// `min(base * 2^attempt, cap)`, saturating instead of overflowing.
pub fn delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// HTTP-date values and anything else that is not a non-negative integer
/// yield `None`.
pub fn retry_after_override(headers: &[(String, String)]) -> Option<Duration> {
    let raw = find_header(headers, RETRY_AFTER)?;
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}
