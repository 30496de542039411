//! Cache janitor - best-effort reclamation of disk space
//!
//! One pass runs three stages over every entry file under the cache root:
//!
//! 1. **Expire**: delete files whose age (clock now - mtime) exceeds the
//!    TTL of the category that owns their directory
//! 2. **Evict**: while the survivors exceed the disk quota, delete the
//!    oldest by mtime
//! 3. **Recompress**: if the survivors still sit above 90% of the quota,
//!    re-encode them at maximum gzip level (mtime preserved)
//!
//! Nothing here fails the caller. Every I/O error is logged and the file
//! is skipped.

use super::disk::{self, MAX_COMPRESSION_LEVEL};
use super::key::KeyCodec;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tollgate_foundation::{Clock, DEFAULT_CATEGORY};
use tracing::{debug, info, warn};

/// Fraction of the quota above which surviving files are recompressed
const RECOMPRESS_THRESHOLD: f64 = 0.9;

/// Outcome of one janitor pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JanitorReport {
    /// Files removed because their TTL elapsed
    pub expired: u64,
    /// Files removed to get under the quota
    pub evicted: u64,
    /// Bytes released by expiry and eviction
    pub bytes_freed: u64,
    /// Files that shrank on recompression
    pub recompressed: u64,
    /// Bytes still on disk after the pass
    pub remaining_bytes: u64,
}

#[derive(Debug)]
struct Survivor {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

pub struct CacheJanitor {
    codec: KeyCodec,
    clock: Arc<dyn Clock>,
    quota_bytes: u64,
}

impl CacheJanitor {
    /// Janitor enforcing the quota from the codec's settings
    pub fn new(codec: KeyCodec, clock: Arc<dyn Clock>) -> Self {
        let quota_bytes = codec.settings().max_disk_bytes();
        Self {
            codec,
            clock,
            quota_bytes,
        }
    }

    /// Override the quota (bytes)
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    /// Run one full pass
    pub fn run(&self) -> JanitorReport {
        let mut report = JanitorReport::default();

        let mut survivors = self.expire(&mut report);
        let mut total: u64 = survivors.iter().map(|s| s.size).sum();

        if total > self.quota_bytes {
            total = self.evict(&mut survivors, total, &mut report);
        }

        if total as f64 > self.quota_bytes as f64 * RECOMPRESS_THRESHOLD {
            total = self.recompress(&survivors, total, &mut report);
        }

        report.remaining_bytes = total;
        if report.expired + report.evicted + report.recompressed > 0 {
            info!(
                expired = report.expired,
                evicted = report.evicted,
                recompressed = report.recompressed,
                freed_mb = report.bytes_freed as f64 / (1024.0 * 1024.0),
                "Cache janitor pass complete"
            );
        } else {
            debug!(remaining = total, "Cache janitor pass found nothing to do");
        }
        report
    }

    // ========================================================================
    // Stages
    // ========================================================================

    fn expire(&self, report: &mut JanitorReport) -> Vec<Survivor> {
        let base = self.codec.base_dir();
        let entries = match fs::read_dir(base) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %base.display(), error = %e, "Cache root not readable");
                return Vec::new();
            }
        };

        let settings = self.codec.settings();
        let now = self.clock.now();
        let mut survivors = Vec::new();

        for dir in entries.filter_map(|e| e.ok()).map(|e| e.path()).filter(|p| p.is_dir()) {
            let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let category = settings.category_for_dir(dir_name).unwrap_or(DEFAULT_CATEGORY);
            let ttl = settings.ttl(category);

            for path in self.codec.entry_files(&dir) {
                let metadata = match fs::metadata(&path).and_then(|m| Ok((m.len(), m.modified()?))) {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to stat cache file");
                        continue;
                    }
                };
                let (size, modified) = metadata;

                if older_than(now, modified, ttl) {
                    match fs::remove_file(&path) {
                        Ok(()) => {
                            report.expired += 1;
                            report.bytes_freed += size;
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Failed to remove expired cache file");
                            survivors.push(Survivor { path, modified, size });
                        }
                    }
                } else {
                    survivors.push(Survivor { path, modified, size });
                }
            }
        }

        survivors
    }

    fn evict(&self, survivors: &mut Vec<Survivor>, mut total: u64, report: &mut JanitorReport) -> u64 {
        survivors.sort_by_key(|s| s.modified);

        let mut kept = Vec::with_capacity(survivors.len());
        for survivor in survivors.drain(..) {
            if total <= self.quota_bytes {
                kept.push(survivor);
                continue;
            }
            match fs::remove_file(&survivor.path) {
                Ok(()) => {
                    total -= survivor.size;
                    report.evicted += 1;
                    report.bytes_freed += survivor.size;
                }
                Err(e) => {
                    warn!(path = %survivor.path.display(), error = %e, "Failed to evict cache file");
                    kept.push(survivor);
                }
            }
        }
        *survivors = kept;

        if report.evicted > 0 {
            info!(
                evicted = report.evicted,
                quota = self.quota_bytes,
                remaining = total,
                "Evicted cache files over quota"
            );
        }
        total
    }

    fn recompress(&self, survivors: &[Survivor], mut total: u64, report: &mut JanitorReport) -> u64 {
        for survivor in survivors {
            match disk::recompress(&survivor.path, MAX_COMPRESSION_LEVEL) {
                Ok((old_size, new_size)) if new_size < old_size => {
                    total -= old_size - new_size;
                    report.recompressed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %survivor.path.display(), error = %e, "Failed to recompress cache file");
                }
            }
        }
        total
    }
}

fn older_than(now: DateTime<Utc>, modified: SystemTime, ttl: Duration) -> bool {
    let age_ms = (now - DateTime::<Utc>::from(modified)).num_milliseconds();
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    age_ms > ttl_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::CacheEntry;
    use serde_json::json;
    use std::fs::File;
    use tempfile::TempDir;
    use tollgate_foundation::{CacheSettings, ManualClock};

    fn setup(dir: &TempDir) -> (KeyCodec, Arc<ManualClock>) {
        let codec = KeyCodec::new(dir.path(), Arc::new(CacheSettings::default()));
        (codec, Arc::new(ManualClock::starting_now()))
    }

    fn write(codec: &KeyCodec, category: &str, key: &str, payload: serde_json::Value, level: u32) -> PathBuf {
        let path = codec.path_for(category, key);
        disk::write_entry(&path, &CacheEntry::new(payload, Utc::now()), level).unwrap();
        path
    }

    fn age(path: &PathBuf, secs: u64) {
        let when = SystemTime::now() - Duration::from_secs(secs);
        File::options().write(true).open(path).unwrap().set_modified(when).unwrap();
    }

    #[test]
    fn test_expires_by_category_ttl() {
        let dir = TempDir::new().unwrap();
        let (codec, clock) = setup(&dir);

        // chat TTL is 600s, news TTL is 3600s
        let chat = write(&codec, "chat", "old_chat", json!("hi"), 6);
        let news = write(&codec, "news", "old_news", json!("headline"), 6);
        age(&chat, 900);
        age(&news, 900);

        let report = CacheJanitor::new(codec, clock).run();

        assert_eq!(report.expired, 1);
        assert!(!chat.exists());
        assert!(news.exists());
        assert_eq!(report.remaining_bytes, fs::metadata(&news).unwrap().len());
    }

    #[test]
    fn test_clock_drives_expiry() {
        let dir = TempDir::new().unwrap();
        let (codec, clock) = setup(&dir);
        let path = write(&codec, "default", "entry", json!(1), 6);

        let janitor = CacheJanitor::new(codec, clock.clone());
        assert_eq!(janitor.run().expired, 0);

        clock.advance_secs(301);
        assert_eq!(janitor.run().expired, 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_evicts_oldest_over_quota() {
        let dir = TempDir::new().unwrap();
        let (codec, clock) = setup(&dir);

        let payload = json!({"blob": (0..400).map(|i| format!("{:x}", i * 7919)).collect::<Vec<_>>()});
        let oldest = write(&codec, "news", "first", payload.clone(), 6);
        let middle = write(&codec, "news", "second", payload.clone(), 6);
        let newest = write(&codec, "news", "third", payload, 6);
        age(&oldest, 300);
        age(&middle, 200);
        age(&newest, 100);

        let size = fs::metadata(&newest).unwrap().len();
        let report = CacheJanitor::new(codec, clock).with_quota(size * 2).run();

        assert_eq!(report.expired, 0);
        assert_eq!(report.evicted, 1);
        assert!(!oldest.exists());
        assert!(middle.exists());
        assert!(newest.exists());
        assert!(report.bytes_freed > 0);
        assert!(report.remaining_bytes <= size * 2);
    }

    #[test]
    fn test_recompresses_near_quota() {
        let dir = TempDir::new().unwrap();
        let (codec, clock) = setup(&dir);

        let path = write(&codec, "pattern", "repetitive", json!({"text": "xauusd ".repeat(4000)}), 0);
        let before = fs::metadata(&path).unwrap().len();

        // quota just above current size puts us over the 90% mark
        let report = CacheJanitor::new(codec, clock).with_quota(before + 1).run();

        assert_eq!(report.evicted, 0);
        assert_eq!(report.recompressed, 1);
        assert!(report.remaining_bytes < before);
        assert!(path.exists());
        assert_eq!(
            disk::read_entry(&path).unwrap().payload["text"],
            json!("xauusd ".repeat(4000))
        );
    }

    #[test]
    fn test_missing_root_is_noop() {
        let dir = TempDir::new().unwrap();
        let codec = KeyCodec::new(dir.path().join("absent"), Arc::new(CacheSettings::default()));
        let report = CacheJanitor::new(codec, Arc::new(ManualClock::starting_now())).run();
        assert_eq!(report, JanitorReport::default());
    }
}
