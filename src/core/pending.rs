//! Deduplication of concurrent identical synthesis requests.
//!
//! At most one network operation per [`CacheKey`] is in flight. Later callers
//! for the same key await the same shared future. Each operation runs on its
//! own task and removes its map entry when it settles, even if every caller
//! awaiting it has gone away.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

use crate::core::cache::AudioResource;
use crate::core::generation::GenerationToken;
use crate::core::voice::CacheKey;
use crate::errors::{SpeechError, SpeechResult};

/// Shared handle to an in-flight synthesis.
pub type PendingSynthesis = Shared<BoxFuture<'static, SpeechResult<AudioResource>>>;

struct PendingEntry {
    id: u64,
    future: PendingSynthesis,
    /// Token the operation checks; joiners re-bind it to their generation
    token: GenerationToken,
}

/// Map of in-flight synthesis operations keyed by cache key.
#[derive(Default)]
pub struct PendingRequests {
    inflight: Arc<DashMap<CacheKey, PendingEntry>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations currently in flight.
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inflight.contains_key(key)
    }

    /// Join the in-flight operation for `key`, or start one with `start`.
    ///
    /// When joining, the running operation is re-bound to the caller's
    /// generation so a `stop()` issued between the original request and this
    /// one does not abort work the caller still wants. `start` receives the
    /// token the new operation must check before every side effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn join_or_start<F>(
        &self,
        key: &CacheKey,
        token: &GenerationToken,
        start: F,
    ) -> PendingSynthesis
    where
        F: FnOnce(GenerationToken) -> BoxFuture<'static, SpeechResult<AudioResource>>,
    {
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.get();
                entry.token.adopt(token);
                debug!(key = %key, "Joining in-flight synthesis request");
                entry.future.clone()
            }
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let op_token = token.detached();
                let operation = start(op_token.clone());

                let inflight = Arc::clone(&self.inflight);
                let task_key = key.clone();
                let handle = tokio::spawn(async move {
                    let result = operation.await;
                    inflight.remove_if(&task_key, |_, entry| entry.id == id);
                    result
                });

                let future = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(SpeechError::Failed(format!("Synthesis task failed: {e}")))
                    })
                }
                .boxed()
                .shared();

                vacant.insert(PendingEntry {
                    id,
                    future: future.clone(),
                    token: op_token,
                });
                future
            }
        }
    }
}
