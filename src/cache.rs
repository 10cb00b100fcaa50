//! Bounded result cache for repeated identical backups

use crate::orchestrator::BackupResult;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Key to [`BackupResult`] store that evicts the least recently inserted entry when full.
///
/// Lookups use `peek`, so a hit never changes eviction order.
/// Concurrent writers to the same key resolve as last-write-wins.
#[derive(Debug)]
pub struct ResultCache {
    /// `None` when the capacity is zero
    entries: Option<Mutex<LruCache<String, BackupResult>>>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries
            .as_ref()
            .map_or(0, |entries| entries.lock().cap().get())
    }

    pub fn get(&self, key: &str) -> Option<BackupResult> {
        self.entries.as_ref()?.lock().peek(key).cloned()
    }

    /// Insert or replace; a replaced key moves to the newest position
    pub fn insert(&self, key: String, value: BackupResult) {
        if let Some(entries) = &self.entries {
            entries.lock().put(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }
}
