//! Public entry point for calling the backend.
//!
//! # Design
//! `RemoteClient` is cheap to clone; clones share one executor and one
//! in-flight registry. Each operation builds a `RequestDescriptor`, then:
//! - GET (or an explicitly idempotent request) goes through the registry, so
//!   identical concurrent reads share one attempt sequence and one outcome;
//! - everything else runs its own attempt sequence, so two writes are never
//!   merged even when their bodies match.
//!
//! The credential is read from the injected `CredentialSource` on every
//! attempt, never cached.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::auth::CredentialSource;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::executor::Executor;
use crate::http::HttpMethod;
use crate::registry::InFlightRegistry;
use crate::request::{resolve_url, RequestDescriptor, RequestOptions};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::Outcome;

#[derive(Clone)]
pub struct RemoteClient {
    base_url: String,
    executor: Arc<Executor>,
    registry: Arc<InFlightRegistry>,
}

impl RemoteClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let executor = Executor::new(transport, credentials, config.retry, config.timeout);
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            executor: Arc::new(executor),
            registry: Arc::new(InFlightRegistry::new(config.dedup_window)),
        }
    }

    /// Client backed by a fresh `reqwest` transport.
    pub fn with_reqwest(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(config, Arc::new(transport), credentials))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Outcome {
        self.request(path, options.method(HttpMethod::Get)).await
    }

    pub async fn post<B>(&self, path: &str, body: &B, options: RequestOptions) -> Outcome
    where
        B: Serialize + ?Sized,
    {
        let options = options.method(HttpMethod::Post).json(body)?;
        self.request(path, options).await
    }

    pub async fn put<B>(&self, path: &str, body: &B, options: RequestOptions) -> Outcome
    where
        B: Serialize + ?Sized,
    {
        let options = options.method(HttpMethod::Put).json(body)?;
        self.request(path, options).await
    }

    pub async fn patch<B>(&self, path: &str, body: &B, options: RequestOptions) -> Outcome
    where
        B: Serialize + ?Sized,
    {
        let options = options.method(HttpMethod::Patch).json(body)?;
        self.request(path, options).await
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Outcome {
        self.request(path, options.method(HttpMethod::Delete)).await
    }

    /// Run a request with whatever method `options` names (GET if none).
    pub async fn request(&self, path: &str, options: RequestOptions) -> Outcome {
        let url = resolve_url(&self.base_url, path)?;
        let descriptor = RequestDescriptor::new(url, options)?;

        if !descriptor.is_deduplicable() {
            return self.executor.execute(&descriptor).await;
        }

        let key = descriptor.canonical_key();
        debug!(key = %key, request_id = %descriptor.id, "deduplicable request");
        let executor = Arc::clone(&self.executor);
        self.registry
            .get_or_create(&key, move || async move { executor.execute(&descriptor).await })
            .await
    }

    /// Drop every pending dedup entry, e.g. on logout or between tests.
    pub fn clear_pending_requests(&self) {
        self.registry.clear();
    }

    pub fn pending_requests(&self) -> usize {
        self.registry.len()
    }
}
