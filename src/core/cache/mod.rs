//! Bounded in-memory store of synthesized audio.
//!
//! Eviction is strictly by insertion order (FIFO): when the cache is full the
//! entry inserted first is dropped and its resource released. Reads never
//! change an entry's position, so a phrase spoken repeatedly is still evicted
//! once enough newer phrases have been inserted after it.
//!
//! All operations take `&self`; state lives behind a `parking_lot::Mutex`
//! that is never held across an `.await`, which makes every check-then-act
//! sequence atomic with respect to other tasks.

mod resource;

pub use resource::AudioResource;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::core::voice::CacheKey;

/// Default bound on the number of cached entries.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 50;

#[derive(Debug)]
struct CacheEntry {
    resource: AudioResource,
    sequence: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// sequence -> key, ordered oldest first
    order: BTreeMap<u64, CacheKey>,
    next_sequence: u64,
}

impl CacheState {
    fn evict_oldest(&mut self) -> Option<(CacheKey, AudioResource)> {
        let (sequence, key) = self.order.pop_first()?;
        let entry = self.entries.remove(&key)?;
        debug_assert_eq!(entry.sequence, sequence);
        Some((key, entry.resource))
    }
}

/// Cache statistics for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// FIFO-bounded audio cache.
#[derive(Debug)]
pub struct AudioCache {
    state: Mutex<CacheState>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for AudioCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_MAX_SIZE)
    }
}

impl AudioCache {
    /// Create a cache holding at most `max_size` entries (minimum 1).
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size: max_size.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Look up a resource. Does not affect eviction order.
    pub fn get(&self, key: &CacheKey) -> Option<AudioResource> {
        let found = self
            .state
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.resource.clone());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Pure membership test; does not touch hit/miss counters.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Insert a resource, evicting the oldest entry first if at the bound.
    ///
    /// Replacing an existing key keeps its original position and releases
    /// the previous resource.
    pub fn set(&self, key: CacheKey, resource: AudioResource) {
        let replaced = {
            let mut state = self.state.lock();
            if let Some(entry) = state.entries.get_mut(&key) {
                let old = std::mem::replace(&mut entry.resource, resource);
                (!old.same_as(&entry.resource)).then_some(old)
            } else {
                let evicted = if state.entries.len() >= self.max_size {
                    state.evict_oldest()
                } else {
                    None
                };
                let sequence = state.next_sequence;
                state.next_sequence += 1;
                state.order.insert(sequence, key.clone());
                state.entries.insert(key, CacheEntry { resource, sequence });
                if let Some((evicted_key, evicted_resource)) = evicted {
                    self.release_evicted(&evicted_key, &evicted_resource);
                }
                None
            }
        };

        if let Some(old) = replaced {
            old.release();
        }
    }

    /// Evict the single oldest entry if the cache is at its bound.
    ///
    /// Returns `true` if an entry was evicted.
    pub fn prune(&self) -> bool {
        let evicted = {
            let mut state = self.state.lock();
            if state.entries.len() >= self.max_size {
                state.evict_oldest()
            } else {
                None
            }
        };
        match evicted {
            Some((key, resource)) => {
                self.release_evicted(&key, &resource);
                true
            }
            None => false,
        }
    }

    /// Release every resource and empty the cache.
    pub fn clear(&self) {
        let drained: Vec<AudioResource> = {
            let mut state = self.state.lock();
            state.order.clear();
            state.entries.drain().map(|(_, e)| e.resource).collect()
        };
        let count = drained.len();
        for resource in drained {
            resource.release();
        }
        debug!(released = count, "Audio cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn release_evicted(&self, key: &CacheKey, resource: &AudioResource) {
        resource.release();
        self.evictions.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, resource_id = resource.id(), "Evicted oldest cache entry");
    }
}
