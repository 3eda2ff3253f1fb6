//! Short-lived cache for plate extraction results, keyed by a fingerprint
//! of the input image so repeated frames skip the external call.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct CacheEntry {
    plate: Option<String>,
    stored_at: DateTime<Utc>,
}

pub struct ExtractionCache {
    entries: Mutex<HashMap<u64, CacheEntry>>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl ExtractionCache {
    pub fn new(window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window: Duration::seconds(window_secs as i64),
            clock,
        }
    }

    /// Fingerprint of the raw image bytes used as the cache key.
    pub fn fingerprint(image: &[u8]) -> u64 {
        let mut hasher = DefaultHasher::new();
        image.hash(&mut hasher);
        hasher.finish()
    }

    /// Look up a fresh extraction result. Expired entries are purged on
    /// access and never served; the outer Option is the cache hit, the
    /// inner one is the extraction result itself.
    pub fn get(&self, key: u64) -> Option<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| now.signed_duration_since(entry.stored_at) < self.window);
        entries.get(&key).map(|entry| entry.plate.clone())
    }

    pub fn insert(&self, key: u64, plate: Option<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CacheEntry {
                plate,
                stored_at: self.clock.now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
