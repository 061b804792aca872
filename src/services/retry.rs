//! Retry classification and the shared retry loop.
//!
//! Every outbound request goes through [`run_with_retry`]. Whether a failure
//! is worth another attempt is decided by a classifier returning a
//! [`Disposition`]; how long to wait comes from the [`RetryPolicy`].

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;

use crate::services::client::ClientError;

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable(Wait),
    Terminal,
}

/// How long to wait before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Delay taken from the policy's backoff schedule.
    Backoff,
    /// Server asked us to slow down; `Some` carries its `Retry-After` hint.
    RateLimit(Option<Duration>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^retry`, capped at `max`.
    Exponential { base: Duration, max: Duration },
    Fixed(Duration),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Used for 429 responses without a `Retry-After` header.
    pub rate_limit_wait: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (zero-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential { base, max } => {
                let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
            Backoff::Fixed(delay) => delay,
        }
    }

    fn delay_for(&self, wait: Wait, retry: u32) -> Duration {
        match wait {
            Wait::Backoff => self.backoff_delay(retry),
            Wait::RateLimit(hint) => hint.unwrap_or(self.rate_limit_wait),
        }
    }
}

/// Classifier for request paths: transport failures, 5xx and 429 are retried,
/// any other response error is terminal.
pub fn classify(error: &ClientError) -> Disposition {
    match error.root() {
        ClientError::Transport(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
            Disposition::Retryable(Wait::Backoff)
        }
        ClientError::Http {
            status,
            retry_after,
            ..
        } => {
            if *status == StatusCode::TOO_MANY_REQUESTS {
                Disposition::Retryable(Wait::RateLimit(*retry_after))
            } else if status.is_server_error() {
                Disposition::Retryable(Wait::Backoff)
            } else {
                Disposition::Terminal
            }
        }
        _ => Disposition::Terminal,
    }
}

/// Classifier for status lookups: only a 404 is retried, since a freshly
/// created job may not be visible yet.
pub fn classify_not_found(error: &ClientError) -> Disposition {
    match error {
        ClientError::Http { status, .. } if *status == StatusCode::NOT_FOUND => {
            Disposition::Retryable(Wait::Backoff)
        }
        _ => Disposition::Terminal,
    }
}

/// Source of delays between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Run `attempt` until it succeeds, `classify` calls the failure terminal, or
/// the retry budget runs out.
///
/// `attempt` receives the zero-based attempt number. Terminal failures are
/// returned unchanged; an exhausted budget yields
/// [`ClientError::RetriesExhausted`] wrapping the last failure.
pub async fn run_with_retry<T, F, Fut, C>(
    operation: &'static str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    classify: C,
    mut attempt: F,
) -> Result<T, ClientError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
    C: Fn(&ClientError) -> Disposition,
{
    let mut retry = 0;
    loop {
        let error = match attempt(retry).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let wait = match classify(&error) {
            Disposition::Terminal => {
                tracing::debug!(operation, attempt = retry + 1, error = %error, "Request failed, not retrying");
                return Err(error);
            }
            Disposition::Retryable(wait) => wait,
        };

        if retry >= policy.max_retries {
            tracing::warn!(
                operation,
                attempts = retry + 1,
                error = %error,
                "Retry budget exhausted"
            );
            return Err(ClientError::RetriesExhausted {
                operation,
                attempts: retry + 1,
                source: Box::new(error),
            });
        }

        let delay = policy.delay_for(wait, retry);
        tracing::warn!(
            operation,
            attempt = retry + 1,
            max_attempts = policy.max_retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Request failed, retrying"
        );
        metrics::counter!("imggo_request_retries_total", "operation" => operation).increment(1);

        sleeper.sleep(delay).await;
        retry += 1;
    }
}
