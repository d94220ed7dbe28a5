//! Bearer credential lookup.
//!
//! The client asks its `CredentialSource` on every attempt, so a rotated or
//! revoked token takes effect on the next call without rebuilding anything.

/// Supplies an optional bearer token. `None` means "send unauthenticated".
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn bearer_token(&self) -> Option<String> {
        self()
    }
}

/// Never authenticates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}
