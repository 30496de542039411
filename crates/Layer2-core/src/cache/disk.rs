//! On-disk entry codec
//!
//! Each entry is one gzip-compressed JSON document:
//!
//! ```json
//! {"timestamp": 1718000000.125, "payload": { ... }}
//! ```
//!
//! Writes land in a sibling `*.tmp` file first and are renamed into place,
//! so a reader never observes a half-written entry.

use super::memory::CacheEntry;
use chrono::{DateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tollgate_foundation::{Error, Result};

/// gzip level used by the janitor when shrinking entries
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Persisted form of a [`CacheEntry`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskRecord {
    /// Seconds since the Unix epoch
    timestamp: f64,
    payload: Value,
}

impl From<&CacheEntry> for DiskRecord {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            timestamp: entry.timestamp.timestamp_millis() as f64 / 1000.0,
            payload: entry.payload.clone(),
        }
    }
}

impl TryFrom<DiskRecord> for CacheEntry {
    type Error = Error;

    fn try_from(record: DiskRecord) -> Result<Self> {
        Ok(CacheEntry::new(record.payload, epoch_to_datetime(record.timestamp)?))
    }
}

fn epoch_to_datetime(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() {
        return Err(Error::Codec(format!("invalid entry timestamp {}", secs)));
    }
    let millis = (secs * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::Codec(format!("entry timestamp out of range: {}", secs)))
}

// ============================================================================
// Encode / Decode
// ============================================================================

pub fn encode(entry: &CacheEntry, level: u32) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(&DiskRecord::from(entry))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(MAX_COMPRESSION_LEVEL)));
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

pub fn decode(bytes: &[u8]) -> Result<CacheEntry> {
    let mut json = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut json)
        .map_err(|e| Error::Codec(format!("gzip: {}", e)))?;

    let record: DiskRecord = serde_json::from_slice(&json)?;
    record.try_into()
}

// ============================================================================
// File I/O
// ============================================================================

/// Read and decode one entry file
///
/// A missing file yields an error for which `is_absent()` holds; bad gzip
/// or JSON yields one for which `is_corrupt()` holds.
pub fn read_entry(path: &Path) -> Result<CacheEntry> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

/// Encode and atomically place an entry file
pub fn write_entry(path: &Path, entry: &CacheEntry, level: u32) -> Result<()> {
    let bytes = encode(entry, level)?;
    write_atomic(path, &bytes)
}

/// Re-encode an existing file at `level`, keeping its modification time
///
/// Returns `(old_size, new_size)`. The file is left untouched when the
/// new encoding is not smaller.
pub fn recompress(path: &Path, level: u32) -> Result<(u64, u64)> {
    let metadata = fs::metadata(path)?;
    let old_size = metadata.len();
    let modified = metadata.modified()?;

    let entry = read_entry(path)?;
    let bytes = encode(&entry, level)?;
    let new_size = bytes.len() as u64;
    if new_size >= old_size {
        return Ok((old_size, old_size));
    }

    write_atomic(path, &bytes)?;
    File::options().write(true).open(path)?.set_modified(modified)?;
    Ok((old_size, new_size))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    let result = (|| -> Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(|e| Error::storage(path, e))
}
