//! Exponential backoff around solver invocations

use std::future::Future;
use std::time::Duration;

use lockstep_config::SolverSection;
use lockstep_core::{LockSpec, Platform, PlatformResolution};
use tracing::warn;

use crate::adapter::SolverAdapter;
use crate::SolverResult;

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts in total, including the first
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn from_section(section: &SolverSection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            initial_delay: Duration::from_millis(section.initial_backoff_ms),
            max_delay: Duration::from_millis(section.max_backoff_ms),
            multiplier: section.multiplier,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(
            Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64),
            self.max_delay,
        )
    }
}

/// Execute an operation, retrying transient failures with exponential backoff.
///
/// Only errors for which `is_retryable` holds are retried; an
/// unsatisfiable spec or malformed output is returned on the first attempt.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, label: &str, operation: F) -> SolverResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = SolverResult<T>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if error.is_retryable() && attempt < config.max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    label, attempt, config.max_attempts, delay, error
                );
                tokio::time::sleep(delay).await;
                delay = config.next_delay(delay);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Wraps any adapter so every `resolve` is retried per a [`RetryConfig`]
#[derive(Debug, Clone)]
pub struct Retrying<A> {
    inner: A,
    config: RetryConfig,
}

impl<A: SolverAdapter> Retrying<A> {
    pub fn new(inner: A, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl<A: SolverAdapter> SolverAdapter for Retrying<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> impl Future<Output = SolverResult<String>> + Send {
        self.inner.version()
    }

    fn resolve(
        &self,
        spec: &LockSpec,
        platform: &Platform,
    ) -> impl Future<Output = SolverResult<PlatformResolution>> + Send {
        async move {
            let label = format!("{} on {}", self.inner.name(), platform);
            with_retry(&self.config, &label, || self.inner.resolve(spec, platform)).await
        }
    }
}
