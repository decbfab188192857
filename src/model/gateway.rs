//! Retry-wrapped HTTP gateway for the model-service endpoints.
//!
//! Two policies cover every call the agent makes: [`RetryPolicy::Unbounded`]
//! for the calls the loop cannot proceed without (planning, perception,
//! chat), and [`RetryPolicy::Bounded`] for side-channel calls whose failure
//! should degrade the step instead of stalling the run. Transport errors,
//! non-2xx statuses and undecodable bodies all count as failed attempts.
//!
//! Unbounded calls can only be stopped through the gateway's
//! [`CancellationToken`], which also aborts in-flight requests and backoff
//! sleeps.

use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Attempt cap used for auxiliary calls.
pub const BOUNDED_RETRY_ATTEMPTS: u32 = 10;

/// Gateway errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("request cancelled")]
    Cancelled,
    #[error("gave up after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },
}

/// How long to keep retrying a failing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry until a response decodes or the token is cancelled.
    Unbounded,
    /// Give up after `max_attempts` tries.
    Bounded { max_attempts: u32 },
}

impl RetryPolicy {
    /// The default bounded policy.
    pub fn bounded() -> Self {
        Self::Bounded {
            max_attempts: BOUNDED_RETRY_ATTEMPTS,
        }
    }
}

/// Delay between attempts.
///
/// `None` preserves the original no-backoff timing; `Jittered` grows
/// exponentially from `base` up to `cap` with a +/-50% random factor.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    None,
    Jittered { base: Duration, cap: Duration },
}

impl Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Jittered { base, cap } => {
                let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
                let capped = exp.min(*cap);
                let factor = rand::thread_rng().gen_range(0.5..1.5);
                capped.mul_f64(factor)
            }
        }
    }
}

/// JSON-over-HTTP client shared by every endpoint wrapper.
#[derive(Clone)]
pub struct RpcGateway {
    http: Client,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl RpcGateway {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            http: Client::new(),
            backoff: Backoff::None,
            cancel,
        }
    }

    /// Replace the inter-attempt delay strategy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// POST `payload` to `url` and decode the JSON reply into `T`,
    /// retrying per `policy`. The gateway holds no caller state; a failed
    /// call leaves nothing behind.
    pub async fn call<P, T>(
        &self,
        url: &str,
        payload: &P,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<T, GatewayError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
                outcome = self.attempt::<P, T>(url, payload, timeout) => outcome,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            tracing::warn!(url, attempt, %error, "model service call failed");

            if let RetryPolicy::Bounded { max_attempts } = policy {
                if attempt >= max_attempts {
                    return Err(GatewayError::AttemptsExhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
            }

            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    async fn attempt<P, T>(&self, url: &str, payload: &P, timeout: Duration) -> Result<T, String>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("request failed with status {status}"));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| format!("malformed response: {e}"))
    }
}
