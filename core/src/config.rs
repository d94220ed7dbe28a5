//! Client configuration.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::backoff::RetryPolicy;

pub const ENV_BASE_URL: &str = "REMOTE_BASE_URL";
pub const ENV_MAX_RETRIES: &str = "REMOTE_MAX_RETRIES";
pub const ENV_BASE_DELAY_MS: &str = "REMOTE_BASE_DELAY_MS";
pub const ENV_MAX_DELAY_MS: &str = "REMOTE_MAX_DELAY_MS";
pub const ENV_TIMEOUT_MS: &str = "REMOTE_TIMEOUT_MS";
pub const ENV_DEDUP_WINDOW_MS: &str = "REMOTE_DEDUP_WINDOW_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Prefix for relative paths. Stored without a trailing slash.
    pub base_url: String,
    pub retry: RetryPolicy,
    /// Per-attempt deadline unless a request overrides it.
    pub timeout: Duration,
    /// How long an identical read may join an in-flight one.
    pub dedup_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(10),
            dedup_window: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Defaults overlaid with `REMOTE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`. Values that do
    /// not parse are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut builder = Self::builder();
        if let Some(url) = lookup(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }
        if let Some(n) = parse_var::<u32>(&lookup, ENV_MAX_RETRIES) {
            builder = builder.max_retries(n);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_BASE_DELAY_MS) {
            builder = builder.base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_MAX_DELAY_MS) {
            builder = builder.max_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_TIMEOUT_MS) {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_DEDUP_WINDOW_MS) {
            builder = builder.dedup_window(Duration::from_millis(ms));
        }
        builder.build()
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Extra attempts after the first; 0 disables retries.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, cap: Duration) -> Self {
        self.config.retry.max_delay = cap;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.config.dedup_window = window;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
