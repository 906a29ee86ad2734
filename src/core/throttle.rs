//! Minimum spacing between outbound synthesis calls.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::core::generation::GenerationToken;
use crate::errors::SpeechResult;

pub const DEFAULT_THROTTLE_MIN_GAP_MS: u64 = 500;

/// Enforces `min_gap` between consecutive network dispatches.
///
/// Only callers that actually go on to dispatch claim a slot. A waiter that
/// is superseded while sleeping leaves `last_dispatch` untouched, so a burst
/// of cancelled taps never pushes later callers further back. Callers inside
/// the window queue up instead of being dropped.
#[derive(Debug)]
pub struct RequestThrottle {
    min_gap: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_dispatch: Mutex::new(None),
        }
    }

    #[inline]
    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    /// Claim the dispatch slot if the gap has elapsed, else return the wait.
    fn try_claim(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut last = self.last_dispatch.lock();
        match *last {
            Some(previous) if previous + self.min_gap > now => {
                Some(previous + self.min_gap - now)
            }
            _ => {
                *last = Some(now);
                None
            }
        }
    }

    /// Wait until `min_gap` has passed since the last dispatch, then claim it.
    ///
    /// The generation is checked before every claim; a superseded caller
    /// returns `Cancelled` without recording a dispatch.
    pub async fn acquire(&self, token: &GenerationToken) -> SpeechResult<()> {
        loop {
            token.ensure_current()?;
            match self.try_claim() {
                None => return Ok(()),
                Some(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Throttling synthesis request");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_THROTTLE_MIN_GAP_MS))
    }
}
