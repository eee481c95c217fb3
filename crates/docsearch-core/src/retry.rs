//! Bounded exponential backoff with jitter around remote calls.
//!
//! One controller wraps every storage, document-service, embedding and
//! relevance-provider call. Only errors classified by
//! [`crate::error::Error::is_transient`] are retried; everything else propagates at once.
//!
//! The wait before retry `n` (1-based) is `backoff_factor^n + U(0, 1)`
//! multiplied by `delay_unit` (one second in production).

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::config::RetrySettings;
use crate::error::Result;

/// Lifecycle of one controlled call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, wait: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Attempting { attempt } => write!(f, "attempting #{attempt}"),
            Self::BackingOff { attempt, wait } => write!(f, "backing off after #{attempt} for {wait:?}"),
            Self::Succeeded { attempts } => write!(f, "succeeded after {attempts} attempt(s)"),
            Self::Failed { attempts } => write!(f, "failed after {attempts} attempt(s)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub delay_unit: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_retries: s.max_retries,
            backoff_factor: s.backoff_factor,
            delay_unit: Duration::from_millis(s.delay_unit_ms),
            jitter: s.jitter,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        Self { max_retries, backoff_factor, ..Self::default() }
    }

    /// A policy that never sleeps; for tests and offline tools.
    pub fn immediate(max_retries: u32) -> Self {
        Self { max_retries, backoff_factor: 1.0, delay_unit: Duration::ZERO, jitter: false }
    }

    pub fn with_delay_unit(mut self, unit: Duration) -> Self {
        self.delay_unit = unit;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Deterministic part of the schedule: `(factor^attempt + jitter) * unit`.
    pub fn wait_for(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let units = self.backoff_factor.powi(exponent) + jitter;
        if !units.is_finite() || units <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.delay_unit.as_secs_f64() * units).unwrap_or(Duration::MAX)
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter { rand::thread_rng().gen_range(0.0..1.0) } else { 0.0 };
        self.wait_for(attempt, jitter)
    }

    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.execute(label, None, op, &mut |_| {}).await
    }

    pub async fn run_cancellable<T, F, Fut>(&self, label: &str, token: &CancellationToken, op: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.execute(label, Some(token), op, &mut |_| {}).await
    }

    /// Like [`RetryPolicy::run_cancellable`], reporting every state transition.
    pub async fn run_observed<T, F, Fut>(
        &self,
        label: &str,
        token: Option<&CancellationToken>,
        op: F,
        on_state: &mut (dyn FnMut(RetryState) + Send),
    ) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.execute(label, token, op, on_state).await
    }

    async fn execute<T, F, Fut>(
        &self,
        label: &str,
        token: Option<&CancellationToken>,
        mut op: F,
        on_state: &mut (dyn FnMut(RetryState) + Send),
    ) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.max_retries.max(1);
        let mut attempt = 0u32;
        on_state(RetryState::Idle);
        loop {
            attempt += 1;
            on_state(RetryState::Attempting { attempt });
            let outcome = match token {
                Some(t) => t.run(op()).await,
                None => op().await,
            };
            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(target: "docsearch::retry", label, attempts = attempt, "call recovered");
                    }
                    on_state(RetryState::Succeeded { attempts: attempt });
                    return Ok(value);
                }
                Err(e) => e,
            };
            if !err.is_transient() || attempt >= max_attempts {
                if err.is_transient() {
                    warn!(target: "docsearch::retry", label, attempts = attempt, error = %err, "retries exhausted");
                }
                on_state(RetryState::Failed { attempts: attempt });
                return Err(err);
            }
            let wait = self.backoff_delay(attempt);
            warn!(
                target: "docsearch::retry",
                label,
                attempt,
                max_attempts,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient failure, retrying"
            );
            on_state(RetryState::BackingOff { attempt, wait });
            match token {
                Some(t) => {
                    t.run(async {
                        tokio::time::sleep(wait).await;
                        Ok(())
                    })
                    .await?;
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }
}
