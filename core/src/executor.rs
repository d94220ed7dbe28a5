//! Drives one logical request through its attempts.
//!
//! # Design
//! The attempt loop is a small state machine: `Attempting(n)` ends in
//! success, a terminal failure, or a retryable failure. A retryable failure
//! either sleeps and moves to `Attempting(n + 1)` or, when the budget is
//! spent or the caller asked for no retries, becomes terminal. Attempts are
//! strictly sequential, and each one is bounded by a deadline that drops the
//! in-flight transport call when it expires.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument};

use crate::auth::CredentialSource;
use crate::backoff::RetryPolicy;
use crate::classify::{classify_status, is_retryable, StatusClass};
use crate::error::{ApiError, TransportError};
use crate::http::{set_header_if_absent, HttpRequest, HttpResponse};
use crate::request::RequestDescriptor;
use crate::transport::Transport;
use crate::types::{ApiResponse, Outcome};

/// How one attempt ended.
enum Step {
    Succeeded(ApiResponse),
    Failed(ApiError),
    Retry { failure: ApiError, delay: Duration },
}

pub struct Executor {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    policy: RetryPolicy,
    default_timeout: Duration,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
        policy: RetryPolicy,
        default_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            credentials,
            policy,
            default_timeout,
        }
    }

    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Outcome {
        let span = info_span!(
            "remote_request",
            request_id = %descriptor.id,
            method = %descriptor.method,
            url = %descriptor.url,
        );
        self.run(descriptor).instrument(span).await
    }

    async fn run(&self, descriptor: &RequestDescriptor) -> Outcome {
        let mut attempt: u32 = 0;
        loop {
            let result = self.attempt(descriptor).await;
            match self.classify(attempt, result) {
                Step::Succeeded(response) => {
                    debug!(attempt, status = response.status, "request succeeded");
                    return Ok(response);
                }
                Step::Failed(failure) => {
                    warn!(attempt, error = %failure, "request failed");
                    return Err(failure);
                }
                Step::Retry { failure, delay } => {
                    if descriptor.skip_retry || attempt >= self.policy.max_retries {
                        warn!(attempt, error = %failure, "no retries left");
                        return Err(exhausted(attempt, failure));
                    }
                    warn!(
                        attempt,
                        error = %failure,
                        delay_ms = delay.as_millis() as u64,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One round-trip under the attempt deadline.
    async fn attempt(&self, descriptor: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
        let request = self.build_request(descriptor);
        let deadline = descriptor.timeout.unwrap_or(self.default_timeout);
        debug!(timeout_ms = deadline.as_millis() as u64, "sending attempt");

        match tokio::time::timeout(deadline, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(format!(
                "no response within {}ms",
                deadline.as_millis()
            ))),
        }
    }

    /// Caller headers win over the bearer credential and correlation id.
    fn build_request(&self, descriptor: &RequestDescriptor) -> HttpRequest {
        let mut headers = descriptor.headers.clone();
        if !descriptor.skip_auth {
            if let Some(token) = self.credentials.bearer_token() {
                set_header_if_absent(&mut headers, "authorization", format!("Bearer {token}"));
            }
        }
        set_header_if_absent(&mut headers, "x-request-id", descriptor.id.to_string());

        HttpRequest {
            method: descriptor.method,
            url: descriptor.url.clone(),
            headers,
            body: descriptor.body.clone(),
        }
    }

    fn classify(&self, attempt: u32, result: Result<HttpResponse, TransportError>) -> Step {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                let retryable = is_retryable(None, Some(&err));
                let failure = ApiError::Network(err);
                return if retryable {
                    Step::Retry {
                        failure,
                        delay: self.policy.backoff(attempt),
                    }
                } else {
                    Step::Failed(failure)
                };
            }
        };

        let status = response.status;
        match classify_status(status) {
            StatusClass::Success => match ApiResponse::from_http(response) {
                Ok(parsed) => Step::Succeeded(parsed),
                Err(err) => Step::Failed(err),
            },
            StatusClass::RateLimited => Step::Retry {
                delay: self.policy.rate_limited_backoff(attempt, &response.headers),
                failure: ApiError::RateLimited {
                    body: response.body,
                },
            },
            StatusClass::ServerError => Step::Retry {
                failure: ApiError::ServerError {
                    status,
                    body: response.body,
                },
                delay: self.policy.backoff(attempt),
            },
            StatusClass::ClientError => Step::Failed(ApiError::ClientError {
                status,
                body: response.body,
            }),
            StatusClass::Unexpected => Step::Failed(ApiError::UnexpectedStatus {
                status,
                body: response.body,
            }),
        }
    }
}

/// The raw failure when no retry happened, wrapped once retries were spent.
fn exhausted(attempt: u32, failure: ApiError) -> ApiError {
    if attempt == 0 {
        failure
    } else {
        ApiError::ExhaustedRetries {
            attempts: attempt + 1,
            last: Box::new(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoCredentials;
    use crate::error::TransportErrorKind;
    use crate::http::HttpMethod;
    use crate::request::RequestOptions;
    use crate::transport::scripted::{json, rate_limited, status, ScriptedTransport, Step as S};
    use crate::types::Content;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
        }
    }

    fn executor(transport: &Arc<ScriptedTransport>, max_retries: u32) -> Executor {
        Executor::new(
            transport.clone(),
            Arc::new(NoCredentials),
            policy(max_retries),
            Duration::from_secs(5),
        )
    }

    fn get() -> RequestDescriptor {
        RequestDescriptor::new("http://backend/songs".to_string(), RequestOptions::new()).unwrap()
    }

    fn with(options: RequestOptions) -> RequestDescriptor {
        RequestDescriptor::new("http://backend/songs".to_string(), options).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_then_success_waits_base_delay() {
        let transport = Arc::new(ScriptedTransport::new([
            status(500),
            json(200, r#"{"id":7}"#),
        ]));
        let response = executor(&transport, 1).execute(&get()).await.unwrap();

        assert_eq!(response.content, Content::Json(serde_json::json!({"id": 7})));
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.gaps(), vec![Duration::from_millis(300)]);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_sequence_within_budget_follows_backoff() {
        let transport = Arc::new(ScriptedTransport::new([
            status(503),
            S::Fail(TransportError::new(TransportErrorKind::Connect, "refused")),
            status(502),
            json(200, "[]"),
        ]));
        executor(&transport, 3).execute(&get()).await.unwrap();

        assert_eq!(transport.calls(), 4);
        assert_eq!(
            transport.gaps(),
            vec![
                Duration::from_millis(300),
                Duration::from_millis(600),
                Duration::from_millis(1200),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_hint_overrides_formula() {
        let transport = Arc::new(ScriptedTransport::new([
            rate_limited("2"),
            json(200, "{}"),
        ]));
        executor(&transport, 1).execute(&get()).await.unwrap();
        assert_eq!(transport.gaps(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_hint_falls_back_to_formula() {
        let transport = Arc::new(ScriptedTransport::new([
            rate_limited("whenever"),
            json(200, "{}"),
        ]));
        executor(&transport, 1).execute(&get()).await.unwrap();
        assert_eq!(transport.gaps(), vec![Duration::from_millis(300)]);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_fail_after_one_attempt() {
        for code in [400, 401, 404, 422] {
            let transport = Arc::new(ScriptedTransport::new([status(code), json(200, "{}")]));
            let err = executor(&transport, 3).execute(&get()).await.unwrap_err();
            assert_eq!(transport.calls(), 1, "{code}");
            assert_eq!(
                err,
                ApiError::ClientError {
                    status: code,
                    body: format!("status {code}"),
                }
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn post_404_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new([status(404)]));
        let descriptor = with(RequestOptions::new().method(HttpMethod::Post));
        let err = executor(&transport, 1).execute(&descriptor).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_surfaces_last_failure() {
        let transport = Arc::new(ScriptedTransport::new([
            status(500),
            rate_limited("0"),
            status(503),
        ]));
        let err = executor(&transport, 2).execute(&get()).await.unwrap_err();

        assert_eq!(transport.calls(), 3);
        match err {
            ApiError::ExhaustedRetries { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(
                    *last,
                    ApiError::ServerError {
                        status: 503,
                        body: "status 503".to_string(),
                    }
                );
            }
            other => panic!("expected ExhaustedRetries, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_on_last_attempt_is_reported_as_rate_limit() {
        let transport = Arc::new(ScriptedTransport::new([status(500), rate_limited("1")]));
        let err = executor(&transport, 1).execute(&get()).await.unwrap_err();
        assert!(matches!(err.last_failure(), ApiError::RateLimited { .. }));
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test(start_paused = true)]
    async fn skip_retry_returns_first_failure_unwrapped() {
        let transport = Arc::new(ScriptedTransport::new([status(500), json(200, "{}")]));
        let descriptor = with(RequestOptions::new().skip_retry());
        let err = executor(&transport, 3).execute(&descriptor).await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, ApiError::ServerError { status: 500, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_means_single_attempt() {
        let transport = Arc::new(ScriptedTransport::new([rate_limited("1")]));
        let err = executor(&transport, 0).execute(&get()).await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, ApiError::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_a_retryable_timeout() {
        let slow = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: "late".to_string(),
        };
        let transport = Arc::new(ScriptedTransport::new([
            S::Slow(Duration::from_secs(10), slow),
            json(200, r#"{"ok":true}"#),
        ]));
        let descriptor = with(RequestOptions::new().timeout(Duration::from_millis(100)));
        executor(&transport, 1).execute(&descriptor).await.unwrap();

        assert_eq!(transport.calls(), 2);
        // 100ms deadline plus the 300ms backoff.
        assert_eq!(transport.gaps(), vec![Duration::from_millis(400)]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_timeouts_exhaust_as_network_error() {
        let slow = || {
            S::Slow(
                Duration::from_secs(60),
                HttpResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: String::new(),
                },
            )
        };
        let transport = Arc::new(ScriptedTransport::new([slow(), slow()]));
        let err = executor(&transport, 1).execute(&get()).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, ApiError::ExhaustedRetries { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn non_network_transport_failure_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new([S::Fail(TransportError::new(
            TransportErrorKind::Other,
            "invalid header value",
        ))]));
        let err = executor(&transport, 3).execute(&get()).await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_is_unexpected() {
        let transport = Arc::new(ScriptedTransport::new([status(302)]));
        let err = executor(&transport, 3).execute(&get()).await.unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedStatus { status: 302, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn bearer_token_and_request_id_are_attached_per_attempt() {
        let transport = Arc::new(ScriptedTransport::new([status(500), json(200, "{}")]));
        let tokens = Arc::new(parking_lot::Mutex::new(vec!["second", "first"]));
        let credentials = {
            let tokens = Arc::clone(&tokens);
            move || tokens.lock().pop().map(str::to_string)
        };
        let executor = Executor::new(
            transport.clone(),
            Arc::new(credentials),
            policy(1),
            Duration::from_secs(5),
        );
        let descriptor = get();
        executor.execute(&descriptor).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].header("authorization"), Some("Bearer first"));
        assert_eq!(requests[1].header("authorization"), Some("Bearer second"));
        let id = descriptor.id.to_string();
        assert_eq!(requests[0].header("x-request-id"), Some(id.as_str()));
        assert_eq!(requests[1].header("x-request-id"), Some(id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn skip_auth_and_caller_authorization_are_respected() {
        let transport = Arc::new(ScriptedTransport::new([json(200, "{}"), json(200, "{}")]));
        let executor = Executor::new(
            transport.clone(),
            Arc::new(|| Some("token".to_string())),
            policy(0),
            Duration::from_secs(5),
        );

        executor.execute(&with(RequestOptions::new().skip_auth())).await.unwrap();
        executor
            .execute(&with(RequestOptions::new().header("Authorization", "Basic abc")))
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].header("authorization"), None);
        assert_eq!(requests[1].header("authorization"), Some("Basic abc"));
    }
}
