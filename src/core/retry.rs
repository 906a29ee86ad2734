//! Retry with exponential backoff and jitter.
//!
//! [`RetryPolicy`] is independent of the operation it wraps: the operation
//! classifies each failed attempt as [`AttemptError::Retryable`] or
//! [`AttemptError::Fatal`], and the policy decides whether to sleep and try
//! again. Backoff sleeps are cancellation-aware through a
//! [`GenerationToken`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::generation::GenerationToken;
use crate::errors::{SpeechError, SpeechResult};

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_JITTER: f64 = 0.3;

/// Classification of one failed attempt.
#[derive(Debug, Clone)]
pub enum AttemptError {
    /// Transient failure (rate limit); try again after a backoff
    Retryable(SpeechError),
    /// Permanent failure; give up immediately
    Fatal(SpeechError),
}

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    /// Default: 3
    pub max_attempts: u32,

    /// Delay after the first failed attempt (milliseconds).
    /// Default: 1000ms
    pub base_delay_ms: u64,

    /// Relative jitter applied to every delay, e.g. 0.3 = ±30%.
    /// Default: 0.3
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            jitter_factor: DEFAULT_RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base_delay.as_millis() as u64,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Un-jittered delay after the failed attempt with the given 0-based index.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Jittered delay: `base * 2^attempt * (1 ± jitter_factor)`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt).as_secs_f64();
        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Duration::from_secs_f64(nominal);
        }
        let scaled = nominal * (1.0 + rand_unit() * jitter);
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    #[inline]
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    ///
    /// The operation receives the 0-based attempt index. The token is checked
    /// before every attempt and after every backoff sleep; a superseded token
    /// ends the loop with [`SpeechError::Cancelled`]. Exhaustion on retryable
    /// failures yields [`SpeechError::ServiceBusy`].
    pub async fn execute<T, F, Fut>(
        &self,
        token: &GenerationToken,
        mut operation: F,
    ) -> SpeechResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            token.ensure_current()?;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Retryable(error)) => {
                    let attempts_made = attempt + 1;
                    if !self.should_retry(attempts_made) {
                        warn!(
                            attempts = attempts_made,
                            last_error = %error,
                            "Retry attempts exhausted"
                        );
                        return Err(SpeechError::ServiceBusy {
                            attempts: max_attempts,
                        });
                    }
                    let delay = self.calculate_delay(attempt);
                    debug!(
                        attempt = attempts_made,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    token.ensure_current()?;
                    attempt += 1;
                }
            }
        }
    }
}

/// Pseudo-random value in `[-1.0, 1.0]` from a time-seeded LCG.
///
/// Jitter only needs to de-correlate clients, not be unpredictable.
fn rand_unit() -> f64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::SystemTime;

    static STATE: AtomicU64 = AtomicU64::new(0);

    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let previous = STATE.fetch_add(seed | 1, Ordering::Relaxed);
    // Simple LCG: (a * seed + c) mod m
    let random = (previous ^ seed)
        .wrapping_mul(1103515245)
        .wrapping_add(12345)
        % (1 << 31);
    let normalized = random as f64 / (1u64 << 31) as f64;
    (normalized - 0.5) * 2.0
}
