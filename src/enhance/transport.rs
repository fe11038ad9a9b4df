//! Chat-completion transport: a single-attempt backend plus a retrying
//! wrapper that applies the per-attempt timeout and backoff policy.
//!
//! Retry rules:
//! - 429: wait `rate_limit_base × attempt`, or `Retry-After` if longer.
//! - other non-2xx and network failures: `retry_base × 2^(attempt-1)` plus jitter.
//! - timeout: retried once, then surfaced as `Timeout`.
//! - a 2xx body carrying `error.message`: surfaced at once, never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EnhancerConfig;
use crate::error::EnhanceError;
use crate::metrics::{metric_names, Counter, MetricsRegistry};

/// Raw outcome of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub enum AttemptError {
    Timeout,
    Network(String),
}

/// One POST of a chat-completion body. Implementations do not retry.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn post(&self, body: &serde_json::Value) -> Result<BackendResponse, AttemptError>;
}

/// OpenAI-compatible `/v1/chat/completions` client.
pub struct HttpBackend {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpBackend {
    /// Fails with `Configuration` when no API key is configured.
    pub fn new(config: &EnhancerConfig) -> Result<Self, EnhanceError> {
        let api_key = config.require_api_key()?.to_string();

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EnhanceError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn post(&self, body: &serde_json::Value) -> Result<BackendResponse, AttemptError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Timeout
                } else {
                    AttemptError::Network(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Timeout
            } else {
                AttemptError::Network(e.to_string())
            }
        })?;

        Ok(BackendResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_delay: Duration,
    pub rate_limit_base_delay: Duration,
    pub max_jitter: Duration,
    /// How many timed-out attempts may be retried.
    pub timeout_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &EnhancerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.request_timeout,
            base_delay: config.retry_base_delay,
            rate_limit_base_delay: config.rate_limit_base_delay,
            max_jitter: config.max_jitter,
            timeout_retries: 1,
        }
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }

    /// Delay after a 429 on attempt `attempt` (1-based). Linear in `attempt`.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.rate_limit_base_delay.saturating_mul(attempt.max(1))
    }

    fn jitter(&self) -> Duration {
        self.max_jitter.mul_f64(rand::random::<f64>())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EnhancerConfig::default())
    }
}

// --- Response contract ---

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

fn error_message(body: &str) -> Option<String> {
    let parsed: CompletionBody = serde_json::from_str(body).ok()?;
    parsed.error.map(|e| e.message.unwrap_or_else(|| "unknown upstream error".into()))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Why one attempt failed, and whether the loop may try again.
enum AttemptFailure {
    Retry { error: EnhanceError, wait: Duration },
    Fatal(EnhanceError),
}

pub struct RetryingTransport {
    backend: Arc<dyn ChatBackend>,
    policy: RetryPolicy,
    metrics: Arc<MetricsRegistry>,
}

impl RetryingTransport {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        policy: RetryPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            backend,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `body` and return `choices[0].message.content`.
    pub async fn send(
        &self,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<String, EnhanceError> {
        let mut timeouts_seen: u32 = 0;
        let mut attempt: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(EnhanceError::Cancelled);
            }
            self.metrics.incr(Counter::TransportAttempt);
            let span = self.metrics.span(metric_names::TRANSPORT_CALL);

            let outcome = tokio::select! {
                r = tokio::time::timeout(self.policy.attempt_timeout, self.backend.post(body)) => r,
                _ = cancel.cancelled() => return Err(EnhanceError::Cancelled),
            };
            span.finish();

            let failure = match outcome {
                Ok(Ok(resp)) => match self.classify(resp, attempt) {
                    Ok(content) => return Ok(content),
                    Err(failure) => failure,
                },
                Ok(Err(AttemptError::Network(message))) => AttemptFailure::Retry {
                    error: EnhanceError::Transport {
                        status: None,
                        message,
                    },
                    wait: self.policy.backoff_delay(attempt) + self.policy.jitter(),
                },
                Ok(Err(AttemptError::Timeout)) | Err(_) => {
                    timeouts_seen += 1;
                    let error = EnhanceError::Timeout {
                        after: self.policy.attempt_timeout,
                    };
                    if timeouts_seen > self.policy.timeout_retries {
                        AttemptFailure::Fatal(error)
                    } else {
                        AttemptFailure::Retry {
                            error,
                            wait: self.policy.backoff_delay(attempt) + self.policy.jitter(),
                        }
                    }
                }
            };

            let (error, wait) = match failure {
                AttemptFailure::Fatal(error) => return Err(error),
                AttemptFailure::Retry { error, wait } => (error, wait),
            };

            if attempt >= self.policy.max_attempts {
                warn!(attempt, error = %error, "retry budget exhausted");
                return Err(error);
            }

            warn!(
                attempt,
                status = error.status(),
                wait_ms = wait.as_millis() as u64,
                error = %error,
                "upstream attempt failed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(EnhanceError::Cancelled),
            }
            attempt += 1;
        }
    }

    fn classify(&self, resp: BackendResponse, attempt: u32) -> Result<String, AttemptFailure> {
        if !(200..300).contains(&resp.status) {
            let message = error_message(&resp.body)
                .unwrap_or_else(|| format!("unexpected status: {}", truncate(&resp.body, 200)));
            let wait = if resp.status == 429 {
                let linear = self.policy.rate_limit_delay(attempt);
                resp.retry_after.map_or(linear, |ra| ra.max(linear))
            } else {
                self.policy.backoff_delay(attempt) + self.policy.jitter()
            };
            return Err(AttemptFailure::Retry {
                error: EnhanceError::Transport {
                    status: Some(resp.status),
                    message,
                },
                wait,
            });
        }

        let parsed: CompletionBody = serde_json::from_str(&resp.body).map_err(|e| AttemptFailure::Retry {
            error: EnhanceError::Transport {
                status: Some(resp.status),
                message: format!("malformed response body: {e}"),
            },
            wait: self.policy.backoff_delay(attempt) + self.policy.jitter(),
        })?;

        if let Some(err) = parsed.error {
            let message = err.message.unwrap_or_else(|| "unknown upstream error".into());
            return Err(AttemptFailure::Fatal(EnhanceError::Upstream(message)));
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                AttemptFailure::Fatal(EnhanceError::Upstream("response contained no choices".into()))
            })?;
        debug!(attempt, chars = content.len(), "upstream call succeeded");
        Ok(content)
    }
}
