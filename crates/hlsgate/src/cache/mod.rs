//! In-memory segment cache.
//!
//! A mutex-guarded LRU over `url -> CacheEntry`, bounded by entry count and
//! aggregate bytes, with TTL expiry enforced lazily on `get` and eagerly by
//! [`cleanup`](SegmentCache::cleanup) / the periodic sweeper. A single lock
//! covers the recency list and the byte counter, so observers never see a
//! torn count/bytes pair.
//!
//! The `DISABLE_CACHE=true` environment switch turns `get`/`set`/`cleanup`
//! into no-ops; it is re-read on every call.

mod entry;
mod stats;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::env_flag;

pub use entry::CacheEntry;
pub use stats::CacheStats;

/// Environment switch disabling all cache reads, writes, and sweeps.
pub const DISABLE_CACHE_ENV: &str = "DISABLE_CACHE";

pub fn cache_disabled() -> bool {
    env_flag(DISABLE_CACHE_ENV)
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_memory_bytes: usize,
    pub expiry: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 2000,
            max_memory_bytes: 500 * 1024 * 1024,
            expiry: Duration::from_secs(2 * 60 * 60),
            sweep_interval: Duration::from_secs(30 * 60),
        }
    }
}

struct Shelf {
    lru: LruCache<String, CacheEntry>,
    memory_bytes: usize,
}

impl Shelf {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.lru.pop(key);
        if let Some(entry) = &removed {
            self.memory_bytes -= entry.size_bytes;
        }
        removed
    }

    fn evict_lru(&mut self) -> bool {
        match self.lru.pop_lru() {
            Some((key, entry)) => {
                self.memory_bytes -= entry.size_bytes;
                debug!(key = %key, size = entry.size_bytes, "evicted least-recently-used segment");
                true
            }
            None => false,
        }
    }
}

/// Process-wide LRU segment cache. All operations are mutually atomic.
pub struct SegmentCache {
    config: CacheConfig,
    inner: Mutex<Shelf>,
}

impl SegmentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            // Capacity is enforced manually so byte-budget evictions stay
            // visible to the accounting.
            inner: Mutex::new(Shelf {
                lru: LruCache::unbounded(),
                memory_bytes: 0,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a segment. An expired entry is removed and reported as a
    /// miss; a live hit is promoted to most-recently-used.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if cache_disabled() {
            return None;
        }

        let mut inner = self.inner.lock().unwrap();
        let expired = inner.lru.peek(key)?.is_expired(self.config.expiry);
        if expired {
            inner.remove(key);
            return None;
        }
        inner.lru.get(key).cloned()
    }

    /// Insert a segment, evicting from the least-recently-used end until
    /// both the byte budget and the entry cap hold. Re-setting an existing
    /// key replaces it (and refreshes its recency). An entry larger than the
    /// whole budget empties the cache and is still inserted.
    pub fn set(&self, key: &str, bytes: Bytes, headers: HashMap<String, String>) {
        if cache_disabled() {
            return;
        }

        let entry = CacheEntry::new(bytes, headers);
        let size = entry.size_bytes;
        let mut inner = self.inner.lock().unwrap();

        inner.remove(key);

        while inner.memory_bytes + size > self.config.max_memory_bytes && !inner.lru.is_empty() {
            inner.evict_lru();
        }
        if inner.lru.len() >= self.config.max_entries {
            inner.evict_lru();
        }

        inner.lru.push(key.to_string(), entry);
        inner.memory_bytes += size;
    }

    /// Remove a single entry; returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.remove(key).is_some()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn cleanup(&self) -> usize {
        if cache_disabled() {
            return 0;
        }

        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .lru
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.config.expiry))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    /// Drop everything and reset the accounting.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.lru.clear();
        inner.memory_bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats::compute(
            inner.lru.len(),
            inner.memory_bytes,
            self.config.max_entries,
            self.config.max_memory_bytes,
            self.config.expiry.as_secs_f64(),
        )
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_bytes(&self) -> usize {
        self.inner.lock().unwrap().memory_bytes
    }
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Start the periodic expiry sweep. Runs until the token is cancelled.
pub fn spawn_sweeper(cache: Arc<SegmentCache>, cancel_token: CancellationToken) {
    let interval = cache.config().sweep_interval;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("segment cache sweeper shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let removed = cache.cleanup();
                    if removed > 0 {
                        info!(removed, "swept expired segments from cache");
                    }
                }
            }
        }
    });
}
