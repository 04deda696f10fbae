use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::version::user_agent;

/// Statuses treated as transient and retried.
pub const RETRYABLE_STATUSES: [StatusCode; 4] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("Max retries exceeded ({attempts} attempts), last status: {status}")]
    RetriesExhausted { status: StatusCode, attempts: u32 },
}

/// Retry configuration shared by every outgoing call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`: base, 2x base, 4x base, ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

/// Long-lived HTTP client with a bounded retry policy.
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(policy: RetryPolicy) -> Result<Self, HttpError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent())
            .build()?;
        Ok(Self { client, policy })
    }

    /// Sends the request built by `build`, retrying connection failures and
    /// the statuses in [`RETRYABLE_STATUSES`]. Any other response is returned
    /// as is; callers decide what a non-2xx status means for them.
    pub async fn send<F>(&self, build: F) -> Result<Response, HttpError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let exhausted = attempt >= self.policy.max_retries;
            match build(&self.client).send().await {
                Ok(response) if RETRYABLE_STATUSES.contains(&response.status()) => {
                    let status = response.status();
                    if exhausted {
                        return Err(HttpError::RetriesExhausted {
                            status,
                            attempts: attempt + 1,
                        });
                    }
                    warn!(url = %response.url(), %status, attempt = attempt + 1, "Transient HTTP status, retrying.");
                }
                Ok(response) => return Ok(response),
                Err(e) if is_transient(&e) && !exhausted => {
                    warn!(error = %e, attempt = attempt + 1, "Request failed, retrying.");
                }
                Err(e) => return Err(e.into()),
            }
            sleep(self.policy.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_client() -> RetryingClient {
        RetryingClient::new(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        })
        .unwrap()
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let url = format!("{}/flaky", server.uri());
        let response = fast_client().send(|c| c.get(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let url = server.uri();
        let err = fast_client().send(|c| c.post(&url)).await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::RetriesExhausted { status: StatusCode::BAD_GATEWAY, attempts: 4 }
        ));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let url = server.uri();
        let response = fast_client().send(|c| c.get(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_is_retried_then_reported() {
        // Reserve a free port, then release it so connections are refused.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let url = format!("http://{addr}/");
        let client = RetryingClient::new(RetryPolicy::default()).unwrap();

        let started = tokio::time::Instant::now();
        let err = client.send(|c| c.get(&url)).await.unwrap_err();
        assert!(matches!(err, HttpError::Request(_)));
        // Three backoff sleeps: 1s + 2s + 4s.
        assert!(started.elapsed() >= Duration::from_secs(7));
    }
}
