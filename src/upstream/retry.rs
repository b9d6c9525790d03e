//! Retry policy for upstream calls.
//!
//! A [`RetryPolicy`] is independent of any particular client: it takes a
//! classification function that decides whether a failure is worth another
//! attempt and a backoff function that decides how long to wait first.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::status::{classify_status, Classification};
use super::ToolError;
use crate::config::RetryConfig;

/// Decides whether a failure is transient, terminal, or local.
pub type Classifier = dyn Fn(&ToolError) -> Classification + Send + Sync;

/// Maps a failed attempt number (starting at 1) to the delay before the next one.
pub type Backoff = dyn Fn(u32) -> Duration + Send + Sync;

/// Default classification: only upstream statuses are ever retried.
#[must_use]
pub fn classify_error(error: &ToolError) -> Classification {
    match error {
        ToolError::Upstream(err) => classify_status(&err.status),
        ToolError::Transport(_) => Classification::Terminal,
        ToolError::InvalidArguments(_) | ToolError::Configuration { .. } => Classification::Local,
    }
}

/// `min(2^attempt, ceiling)` seconds plus up to one second of jitter.
pub fn exponential_backoff(ceiling: Duration) -> impl Fn(u32) -> Duration + Send + Sync + 'static {
    move |attempt| {
        let base = 2u64
            .checked_pow(attempt)
            .map_or(ceiling, Duration::from_secs)
            .min(ceiling);
        let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
        base + Duration::from_secs_f64(jitter)
    }
}

/// Bounded retry with pluggable classification and backoff.
pub struct RetryPolicy {
    max_attempts: u32,
    classify: Box<Classifier>,
    backoff: Box<Backoff>,
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` counts the first try; zero is treated as one.
    pub fn new<C, B>(max_attempts: u32, classify: C, backoff: B) -> Self
    where
        C: Fn(&ToolError) -> Classification + Send + Sync + 'static,
        B: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            classify: Box::new(classify),
            backoff: Box::new(backoff),
        }
    }

    /// Builds the default policy from configuration.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            classify_error,
            exponential_backoff(Duration::from_secs(config.max_backoff_secs)),
        )
    }

    /// Total attempts per call, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `action` until it succeeds, fails terminally, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last failure. Upstream failures are finalised with
    /// [`UpstreamError::into_terminal`](super::UpstreamError::into_terminal);
    /// local failures are returned untouched on the first attempt.
    pub async fn invoke<T, F, Fut>(&self, action: F) -> Result<T, ToolError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        self.invoke_with_sleep(action, tokio::time::sleep).await
    }

    /// Like [`invoke`](Self::invoke) with an injected sleep.
    ///
    /// # Errors
    ///
    /// See [`invoke`](Self::invoke).
    pub async fn invoke_with_sleep<T, F, Fut, S, SFut>(
        &self,
        mut action: F,
        mut sleep: S,
    ) -> Result<T, ToolError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
        S: FnMut(Duration) -> SFut,
        SFut: Future<Output = ()>,
    {
        let mut attempt: u32 = 1;
        loop {
            let error = match action().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match (self.classify)(&error) {
                Classification::Local => return Err(error),
                Classification::Transient if attempt < self.max_attempts => {
                    let delay = (self.backoff)(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Transient upstream failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Classification::Transient | Classification::Terminal => {
                    debug!(attempt, error = %error, "Upstream call failed");
                    return Err(match error {
                        ToolError::Upstream(err) => ToolError::Upstream(err.into_terminal()),
                        other => other,
                    });
                }
            }
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
