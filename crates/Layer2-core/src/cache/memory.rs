//! Bounded in-memory entry map
//!
//! Holds the hot tier of the tiered cache. When full, inserting a new key
//! evicts the entry with the oldest creation timestamp (not the least
//! recently read one: reads never refresh an entry).
//!
//! The map itself is not synchronized; `TieredCache` keeps it behind a
//! mutex.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// One cached payload and the instant it was produced
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl CacheEntry {
    pub fn new(payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, payload }
    }

    /// `now - timestamp <= ttl` (millisecond resolution)
    ///
    /// Entries stamped in the future count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age_ms = (now - self.timestamp).num_milliseconds();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        age_ms <= ttl_ms
    }
}

/// Entry map with a hard item bound and oldest-timestamp eviction
#[derive(Debug)]
pub struct MemoryMap {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    evictions: u64,
}

impl MemoryMap {
    /// `capacity` of zero disables the memory tier entirely
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            capacity,
            evictions: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace
    ///
    /// Replacing an existing key never evicts. A new key evicts the
    /// globally oldest entry first when the map is full.
    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        if self.capacity == 0 {
            return;
        }

        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity {
                if self.evict_oldest().is_none() {
                    break;
                }
            }
        }

        self.entries.insert(key, entry);
    }

    /// Insert unless the resident entry for `key` is at least as new
    ///
    /// Returns whether `entry` was stored.
    pub fn insert_if_newer(&mut self, key: String, entry: CacheEntry) -> bool {
        match self.entries.get(&key) {
            Some(resident) if resident.timestamp >= entry.timestamp => false,
            _ => {
                self.insert(key, entry);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Drop the entry with the oldest timestamp, returning its key
    pub fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.timestamp)
            .map(|(key, _)| key.clone())?;

        self.entries.remove(&oldest);
        self.evictions += 1;
        Some(oldest)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Capacity evictions since creation
    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}
