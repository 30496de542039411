//! Tiered response cache
//!
//! Two levels, both keyed through [`KeyCodec`]:
//! - **Memory**: bounded map, oldest-timestamp eviction
//! - **Disk**: one gzip JSON file per entry, sharded by key prefix
//!
//! Access pattern:
//! 1. Check memory; a stale memory entry is dropped
//! 2. On memory miss, read the disk file
//! 3. On a fresh disk hit, promote into memory
//!
//! `extended = true` doubles the category TTL. Callers use it as a
//! fallback when a live call is being throttled.
//!
//! Every failure (missing file, bad gzip, disk full) degrades to a miss or
//! a logged write failure; nothing here returns an error.

use super::disk;
use super::janitor::{CacheJanitor, JanitorReport};
use super::key::{CategoryStats, KeyCodec};
use super::memory::{CacheEntry, MemoryMap};
use parking_lot::Mutex;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tollgate_foundation::{CacheSettings, Clock, SystemClock};
use tracing::{debug, warn};

/// TTL multiplier applied when `extended` is requested
pub const EXTENDED_TTL_MULTIPLIER: u32 = 2;

/// Hit/miss counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TieredCacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub janitor_runs: u64,
    pub memory_items: usize,
    pub memory_capacity: usize,
    pub memory_evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    janitor_runs: AtomicU64,
}

pub struct TieredCache {
    codec: KeyCodec,
    settings: Arc<CacheSettings>,
    clock: Arc<dyn Clock>,
    memory: Mutex<MemoryMap>,
    /// Serializes disk reads, writes and janitor passes
    disk: Mutex<()>,
    counters: Counters,
}

impl TieredCache {
    /// Cache rooted at `base_dir` using the wall clock
    pub fn new(base_dir: impl Into<PathBuf>, settings: CacheSettings) -> Self {
        Self::with_clock(base_dir, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(base_dir: impl Into<PathBuf>, settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let settings = Arc::new(settings);
        let codec = KeyCodec::new(base_dir, settings.clone());
        codec.init_layout();

        Self {
            memory: Mutex::new(MemoryMap::new(settings.max_memory_items)),
            codec,
            settings,
            clock,
            disk: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// TTL for a category, doubled when `extended`
    pub fn effective_ttl(&self, category: &str, extended: bool) -> Duration {
        let ttl = self.settings.ttl(category);
        if extended {
            ttl * EXTENDED_TTL_MULTIPLIER
        } else {
            ttl
        }
    }

    // ========================================================================
    // Get
    // ========================================================================

    /// Look up a payload; `None` on miss, staleness or any read failure
    pub fn get(&self, key: &str, category: &str, extended: bool) -> Option<Value> {
        let ttl = self.effective_ttl(category, extended);
        let now = self.clock.now();
        let memory_key = KeyCodec::memory_key(category, key);

        {
            let mut memory = self.memory.lock();
            match memory.get(&memory_key) {
                Some(entry) if entry.is_fresh(now, ttl) => {
                    self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %memory_key, "Memory cache hit");
                    return Some(entry.payload.clone());
                }
                Some(_) => {
                    memory.remove(&memory_key);
                    debug!(key = %memory_key, "Dropped stale memory entry");
                }
                None => {}
            }
        }

        let path = self.codec.entry_path(category, key);
        let read = {
            let _disk = self.disk.lock();
            disk::read_entry(&path)
        };

        match read {
            Ok(entry) if entry.is_fresh(now, ttl) => {
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %memory_key, "Disk cache hit");
                // a put may have landed since the disk read; keep the newer entry
                let mut memory = self.memory.lock();
                let payload = entry.payload.clone();
                if memory.insert_if_newer(memory_key.clone(), entry) {
                    return Some(payload);
                }
                let resident = memory.get(&memory_key).map(|entry| entry.payload.clone());
                Some(resident.unwrap_or(payload))
            }
            Ok(_) => {
                debug!(key = %memory_key, extended, "Disk entry expired");
                self.miss()
            }
            Err(e) if e.is_absent() => self.miss(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cache entry, treating as miss");
                self.miss()
            }
        }
    }

    fn miss(&self) -> Option<Value> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// `get` decoded into `T`; a payload of the wrong shape is a miss
    pub fn get_as<T: DeserializeOwned>(&self, key: &str, category: &str, extended: bool) -> Option<T> {
        let value = self.get(key, category, extended)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key, category, error = %e, "Cached payload has unexpected shape");
                None
            }
        }
    }

    // ========================================================================
    // Put
    // ========================================================================

    /// Store a payload in both tiers
    ///
    /// Returns `false` without side effects for a `null` payload. A failed
    /// disk write is logged; the memory tier still holds the entry.
    pub fn put(&self, key: &str, category: &str, payload: Value) -> bool {
        if payload.is_null() {
            debug!(key, category, "Refusing to cache null payload");
            return false;
        }

        let entry = CacheEntry::new(payload, self.clock.now());
        let path = self.codec.path_for(category, key);

        let written = {
            let _disk = self.disk.lock();
            disk::write_entry(&path, &entry, self.settings.compression_level)
        };
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "Failed to write cache entry");
        }

        self.memory
            .lock()
            .insert(KeyCodec::memory_key(category, key), entry);
        self.counters.puts.fetch_add(1, Ordering::Relaxed);

        self.maybe_run_janitor();
        true
    }

    /// `put` for any serializable value
    pub fn put_as<T: Serialize>(&self, key: &str, category: &str, payload: &T) -> bool {
        match serde_json::to_value(payload) {
            Ok(value) => self.put(key, category, value),
            Err(e) => {
                warn!(key, category, error = %e, "Failed to serialize cache payload");
                false
            }
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop an entry from both tiers
    pub fn remove(&self, key: &str, category: &str) -> bool {
        let in_memory = self
            .memory
            .lock()
            .remove(&KeyCodec::memory_key(category, key))
            .is_some();

        let path = self.codec.entry_path(category, key);
        let _disk = self.disk.lock();
        let on_disk = match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove cache entry");
                false
            }
        };

        in_memory || on_disk
    }

    pub fn clear_memory(&self) {
        self.memory.lock().clear();
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }

    /// Janitor over this cache's directory and clock
    pub fn janitor(&self) -> CacheJanitor {
        CacheJanitor::new(self.codec.clone(), self.clock.clone())
    }

    /// Run a janitor pass now, holding the disk lock
    pub fn run_janitor(&self) -> JanitorReport {
        let _disk = self.disk.lock();
        self.counters.janitor_runs.fetch_add(1, Ordering::Relaxed);
        self.janitor().run()
    }

    fn maybe_run_janitor(&self) {
        let probability = self.settings.janitor_probability;
        if probability > 0.0 && rand::thread_rng().gen::<f64>() < probability {
            debug!("Triggering cache janitor from put");
            self.run_janitor();
        }
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub fn stats(&self) -> TieredCacheStats {
        let memory = self.memory.lock();
        TieredCacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            puts: self.counters.puts.load(Ordering::Relaxed),
            janitor_runs: self.counters.janitor_runs.load(Ordering::Relaxed),
            memory_items: memory.len(),
            memory_capacity: memory.capacity(),
            memory_evictions: memory.evictions(),
        }
    }

    /// Per-category file counts and sizes
    pub fn disk_stats(&self) -> BTreeMap<String, CategoryStats> {
        self.codec.stats()
    }
}
