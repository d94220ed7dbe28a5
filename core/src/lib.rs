//! Resilient remote-call layer for a backend HTTP service.
//!
//! # Overview
//! `RemoteClient` issues requests against a base address, retries failures
//! that are worth retrying with capped exponential backoff (or the server's
//! `Retry-After` hint on 429), bounds every attempt with a deadline, and
//! collapses identical concurrent reads into one in-flight call. Callers get
//! back a parsed `ApiResponse` or a typed `ApiError`; domain meaning stays
//! with them.
//!
//! # Design
//! - `backoff` and `classify` are pure: delay computation and the
//!   retryable-or-not decision.
//! - `registry` holds the only shared mutable state, a keyed map of pending
//!   shared outcomes used for GET deduplication.
//! - `executor` runs the attempt loop over a `Transport`; `ReqwestTransport`
//!   is the production implementation and tests script their own.
//! - `client` is the facade tying them together.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use remote_core::{ClientConfig, RemoteClient, RequestOptions};
//!
//! # async fn demo() -> Result<(), remote_core::ApiError> {
//! let config = ClientConfig::builder().base_url("https://api.example.com").build();
//! let client = RemoteClient::with_reqwest(config, Arc::new(|| std::env::var("TOKEN").ok()))?;
//! let playlists: Vec<serde_json::Value> = client
//!     .get("/playlists", RequestOptions::new())
//!     .await?
//!     .json()?;
//! # let _ = playlists;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backoff;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod registry;
pub mod request;
pub mod transport;
pub mod types;

pub use auth::{CredentialSource, NoCredentials};
pub use backoff::{delay, retry_after_override, RetryPolicy};
pub use classify::{classify_status, is_retryable, StatusClass};
pub use client::RemoteClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ApiError, TransportError, TransportErrorKind};
pub use executor::Executor;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use registry::InFlightRegistry;
pub use request::{RequestDescriptor, RequestOptions};
pub use transport::{ReqwestTransport, Transport};
pub use types::{ApiResponse, Content, Outcome};
