use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

/// One cached segment (or key) body with the response headers observed at
/// fetch time. `bytes` and `headers` are immutable after insertion; callers
/// get cheap clones (`Bytes` is reference-counted).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bytes: Bytes,
    /// Response headers, lowercased name -> value.
    pub headers: HashMap<String, String>,
    pub inserted_at: Instant,
    pub size_bytes: usize,
}

impl CacheEntry {
    pub fn new(bytes: Bytes, headers: HashMap<String, String>) -> Self {
        let size_bytes = bytes.len();
        Self {
            bytes,
            headers,
            inserted_at: Instant::now(),
            size_bytes,
        }
    }

    pub fn is_expired(&self, expiry: Duration) -> bool {
        self.inserted_at.elapsed() > expiry
    }
}
