//! Generation-based cancellation.
//!
//! A single monotonically increasing counter is owned by the coordinator.
//! Every cancellable operation captures the counter value when it starts in
//! a [`GenerationToken`] and checks it before committing any externally
//! visible side effect. `stop()` bumps the counter, which invalidates every
//! token captured before it.
//!
//! A token can be re-bound to a newer generation. The pending-request
//! deduplicator uses this so that a caller joining an in-flight request
//! keeps that request alive on its own behalf.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{SpeechError, SpeechResult};

/// Process-wide (per coordinator) generation counter.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation value.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Invalidate every previously captured generation.
    ///
    /// Returns the new generation.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Capture the current generation.
    pub fn token(&self) -> GenerationToken {
        GenerationToken {
            counter: Arc::clone(&self.current),
            captured: Arc::new(AtomicU64::new(self.current())),
        }
    }
}

/// Snapshot of the generation counter taken when an operation started.
///
/// Clones share the captured value, so re-binding one clone re-binds all.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    counter: Arc<AtomicU64>,
    captured: Arc<AtomicU64>,
}

impl GenerationToken {
    /// The generation this token was captured at.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.captured.load(Ordering::SeqCst)
    }

    /// Whether no `stop()` has happened since the token was captured.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.generation() == self.counter.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` when superseded.
    #[inline]
    pub fn ensure_current(&self) -> SpeechResult<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(SpeechError::Cancelled)
        }
    }

    /// Re-bind this token (and its clones) to the generation of `other`.
    ///
    /// Only moves forward; an older token never rewinds a newer binding.
    pub fn adopt(&self, other: &GenerationToken) {
        self.captured.fetch_max(other.generation(), Ordering::SeqCst);
    }

    /// An independent token with the same captured value.
    pub fn detached(&self) -> GenerationToken {
        GenerationToken {
            counter: Arc::clone(&self.counter),
            captured: Arc::new(AtomicU64::new(self.generation())),
        }
    }
}
