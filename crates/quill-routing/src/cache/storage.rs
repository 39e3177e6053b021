//! In-memory response cache with per-kind TTL expiration.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use quill_core::{CacheConfig, IgnoreLock as _, Response, TaskKind};

use super::fingerprint::CacheKey;

/// A cached response with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The cached response
    pub response: Response,
    /// Provider that produced the response
    pub served_by: String,
    /// When this entry was written
    pub written_at: Instant,
    /// When this entry expires
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Creates an entry written now that lives for `ttl`.
    ///
    /// A `ttl` past the end of the clock yields an entry that is already expired.
    #[must_use]
    pub fn new(response: Response, ttl: Duration) -> Self {
        let written_at = Instant::now();
        Self {
            served_by: response.provider.clone(),
            response,
            written_at,
            expires_at: written_at.checked_add(ttl).unwrap_or(written_at),
        }
    }

    /// Checks if this entry has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of live entries
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
}

/// An entry plus its write sequence, which breaks ties between equal instants.
#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    sequence: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    storage: HashMap<CacheKey, Slot>,
    stats: CacheStats,
    next_sequence: u64,
}

impl CacheState {
    /// Evicts the entry with the oldest write time.
    fn evict_oldest(&mut self) {
        let oldest = self
            .storage
            .iter()
            .min_by_key(|(_, slot)| (slot.entry.written_at, slot.sequence))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.storage.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

/// Shared response cache, bounded by entry count.
#[derive(Debug)]
pub struct ResponseCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Creates a cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            config,
        }
    }

    /// Creates a cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    /// Whether lookups and writes are active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.capacity > 0
    }

    /// Lifetime for entries of `kind`.
    #[must_use]
    pub const fn ttl_for(&self, kind: TaskKind) -> Duration {
        self.config.ttl_for(kind)
    }

    /// Gets a live entry, dropping it if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.is_enabled() {
            return None;
        }

        let now = Instant::now();
        self.state.with_lock(|state| {
            let expired = match state.storage.get(key) {
                Some(slot) if !slot.entry.is_expired_at(now) => {
                    let entry = slot.entry.clone();
                    state.stats.hits += 1;
                    return Some(entry);
                }
                Some(_) => true,
                None => false,
            };
            if expired {
                state.storage.remove(key);
                state.stats.expirations += 1;
            }
            state.stats.misses += 1;
            None
        })
    }

    /// Stores an entry, evicting the oldest one when full.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        if !self.is_enabled() {
            return;
        }

        let capacity = self.config.capacity;
        self.state.with_lock(|state| {
            if !state.storage.contains_key(&key) {
                while state.storage.len() >= capacity && !state.storage.is_empty() {
                    state.evict_oldest();
                }
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.storage.insert(key, Slot { entry, sequence });
        });
    }

    /// Stores a response from a real provider under the TTL of `kind`.
    ///
    /// Degraded responses are ignored.
    pub fn insert_response(&self, key: CacheKey, kind: TaskKind, response: &Response) {
        if response.degraded {
            tracing::debug!("Not caching degraded response from {}", response.provider);
            return;
        }
        self.put(key, CacheEntry::new(response.clone(), self.ttl_for(kind)));
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        self.state.with_lock(|state| {
            let before = state.storage.len();
            state.storage.retain(|_, slot| !slot.entry.is_expired_at(now));
            let removed = before - state.storage.len();
            state.stats.expirations += removed as u64;
            removed
        })
    }

    /// Clears all entries. Counters are kept.
    pub fn clear(&self) {
        self.state.with_lock(|state| state.storage.clear());
    }

    /// Returns the number of entries in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.with_lock(|state| state.storage.len())
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.state.with_lock(|state| CacheStats {
            entries: state.storage.len(),
            ..state.stats
        })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
