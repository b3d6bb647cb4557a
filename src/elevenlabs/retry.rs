use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Request, Response, StatusCode};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request cannot be cloned for retry")]
    NotCloneable,
}

/// Sends a single HTTP request. Production uses reqwest; tests script responses.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn execute(&self, request: Request) -> Result<Response, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        self.client
            .execute(request)
            .await
            .map_err(|err| TransportError::Request(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// `base_delay * 2^exponent`, capped at `max_delay`.
    pub fn backoff_delay(&self, exponent: u32) -> Duration {
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

fn retry_after(response: &Response) -> Duration {
    let seconds = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(seconds)
}

/// Sends `request`, retrying 429 (after `Retry-After`), 5xx and transport
/// failures. At most `max_retries + 1` attempts are made. When retries run out
/// the last response is returned as-is, or the last transport error.
pub async fn fetch_with_retry(
    transport: &dyn HttpTransport,
    request: Request,
    policy: &RetryPolicy,
) -> Result<Response, TransportError> {
    let url = request.url().clone();
    let mut retries = 0u32;
    let mut backoff_exponent = 0u32;

    loop {
        let attempt = request.try_clone().ok_or(TransportError::NotCloneable)?;
        debug!(%url, attempt = retries + 1, "sending voice api request");

        let wait = match transport.execute(attempt).await {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::TOO_MANY_REQUESTS {
                    if retries >= policy.max_retries {
                        warn!(%url, %status, retries, "rate limited; retries exhausted");
                        return Ok(response);
                    }
                    let wait = retry_after(&response);
                    info!(%url, %status, wait_secs = wait.as_secs(), "rate limited; honouring retry-after");
                    wait
                } else if status.is_server_error() {
                    if retries >= policy.max_retries {
                        warn!(%url, %status, retries, "server error; retries exhausted");
                        return Ok(response);
                    }
                    let wait = policy.backoff_delay(backoff_exponent);
                    backoff_exponent += 1;
                    info!(%url, %status, wait_ms = wait.as_millis() as u64, "server error; backing off");
                    wait
                } else {
                    debug!(%url, %status, "voice api responded");
                    return Ok(response);
                }
            }
            Err(err) => {
                if retries >= policy.max_retries {
                    warn!(%url, error = %err, retries, "request failed; retries exhausted");
                    return Err(err);
                }
                let wait = policy.backoff_delay(backoff_exponent);
                backoff_exponent += 1;
                info!(%url, error = %err, wait_ms = wait.as_millis() as u64, "request failed; backing off");
                wait
            }
        };

        sleep(wait).await;
        retries += 1;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    pub(crate) enum Scripted {
        Status(u16, &'static str),
        StatusWithHeader(u16, &'static str, &'static str),
        Json(String),
        Fail(&'static str),
    }

    /// Replays scripted outcomes in order and records requested URLs.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::default(),
            }
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    pub(crate) fn http_response(
        status: u16,
        body: String,
        header: Option<(&'static str, &'static str)>,
    ) -> Response {
        let mut builder = axum::http::Response::builder().status(status);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        Response::from(builder.body(body).expect("valid response"))
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: Request) -> Result<Response, TransportError> {
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.url().to_string());
            let next = self
                .script
                .lock()
                .expect("script lock")
                .pop_front()
                .expect("transport called more often than scripted");
            match next {
                Scripted::Status(status, body) => Ok(http_response(status, body.into(), None)),
                Scripted::StatusWithHeader(status, name, value) => {
                    Ok(http_response(status, String::new(), Some((name, value))))
                }
                Scripted::Json(body) => Ok(http_response(200, body, None)),
                Scripted::Fail(message) => Err(TransportError::Request(message.into())),
            }
        }
    }
}
