//
// retry.rs
// Dicom-Inference-Client
//
// Exponential backoff around transport calls; retries connection failures and transient statuses.
//
// Thales Matheus Mendonça Santos - November 2025

use std::future::Future;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Result<Self> {
        if config.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if config.backoff_multiplier < 1.0 {
            return Err(Error::Configuration(
                "retry.backoff_multiplier must be >= 1.0".into(),
            ));
        }
        Ok(Self { config })
    }

    /// Delay before attempt `attempt + 1`, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .config
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay_ms = (self.config.initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(delay_ms.min(self.config.max_delay_ms))
    }

    /// Run `operation` until it yields a non-transient outcome or attempts run out.
    ///
    /// The final response is returned even if its status is transient, so the caller's status
    /// mapping still applies.
    pub async fn run<F, Fut>(&self, mut operation: F) -> Result<Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = operation().await;
            let last = attempt >= self.config.max_attempts;

            let transient = match &outcome {
                Ok(resp) if is_transient(resp.status()) => Some(resp.status().to_string()),
                Err(e) if e.is_retryable() => Some(e.to_string()),
                _ => None,
            };
            let Some(reason) = transient else {
                return outcome;
            };
            if last {
                return outcome;
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                attempt,
                max_attempts = self.config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Retrying request after transient failure"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

pub fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}
