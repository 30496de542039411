//! Key codec - turns arbitrary query strings into bounded, filesystem-safe
//! cache keys and on-disk paths
//!
//! ```text
//! "What is  Gold's COT bias?"  ──normalize──▶  what_is_gold_s_cot_bias
//!                              ──truncate───▶  (≤ 128 chars, hash suffix)
//!                              ──path_for───▶  base/news_data/wh/what_is_gold_s_cot_bias.cache.gz
//! ```
//!
//! `normalize` and `truncate` are pure; only `path_for`, `init_layout` and
//! `stats` touch the filesystem.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tollgate_foundation::CacheSettings;
use tracing::{debug, warn};

/// Maximum length of a cache key (characters)
pub const MAX_KEY_LENGTH: usize = 128;

/// Separator used by [`KeyCodec::compose`]
pub const KEY_SEPARATOR: &str = ":";

/// Suffix of every on-disk cache entry
pub const ENTRY_EXTENSION: &str = "cache.gz";

/// Shard used for keys shorter than two characters
const FALLBACK_SHARD: &str = "aa";

/// Parameters that change model output and therefore belong in a query key
const OUTPUT_PARAMS: [&str; 3] = ["temperature", "top_p", "max_tokens"];

/// Longest file name most filesystems accept
const MAX_FILENAME_LENGTH: usize = 255;

fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static pattern"))
}

fn separator_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s_]+").expect("static pattern"))
}

// ============================================================================
// Pure key transforms
// ============================================================================

/// Normalize a key: lowercase, trim, replace anything outside
/// `[A-Za-z0-9_.-]` with `_`, collapse separator runs, strip edge `_`
///
/// Idempotent and total.
pub fn normalize(key: &str) -> String {
    let lowered = key.to_lowercase();
    let replaced = invalid_chars().replace_all(lowered.trim(), "_");
    let collapsed = separator_runs().replace_all(&replaced, "_");
    collapsed.trim_matches('_').to_string()
}

/// Bound a key to `max_len` characters
///
/// Keys that fit are returned unchanged. Longer keys keep their first
/// `max_len / 2` characters, then `_`, then a SHA-256 hex digest of the
/// discarded tail cut to fill the remaining budget.
pub fn truncate(key: &str, max_len: usize) -> String {
    if key.chars().count() <= max_len {
        return key.to_string();
    }
    if max_len == 0 {
        return String::new();
    }

    let prefix_len = max_len / 2;
    let split_at = key
        .char_indices()
        .nth(prefix_len)
        .map(|(idx, _)| idx)
        .unwrap_or(key.len());
    let (prefix, remaining) = key.split_at(split_at);

    let digest = hex::encode(Sha256::digest(remaining.as_bytes()));
    let digest_len = max_len.saturating_sub(prefix_len + 1).min(digest.len());

    let truncated = format!("{}_{}", prefix, &digest[..digest_len]);
    debug!(
        from = key.chars().count(),
        to = truncated.chars().count(),
        "Truncated cache key"
    );
    truncated
}

/// Join non-empty parts with `:`, `prefix` first when present
pub fn compose<S: AsRef<str>>(prefix: Option<&str>, parts: &[S]) -> String {
    prefix
        .into_iter()
        .filter(|p| !p.is_empty())
        .chain(parts.iter().map(AsRef::as_ref).filter(|p| !p.is_empty()))
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// Build a key for a model query from only the inputs that change the answer
///
/// Irrelevant parameters (stream flags, user ids, ...) are dropped so they
/// do not fragment the cache.
pub fn query_key(query: &str, model: Option<&str>, params: Option<&Map<String, Value>>) -> String {
    let params_part = params
        .map(|params| {
            OUTPUT_PARAMS
                .iter()
                .filter_map(|name| params.get(*name).map(|v| format!("{}={}", name, param_text(v))))
                .collect::<Vec<_>>()
                .join("_")
        })
        .unwrap_or_default();

    let model_part = model.filter(|m| !m.is_empty()).unwrap_or("default_model");
    let query_part = truncate(&normalize(query), MAX_KEY_LENGTH / 2);

    compose(None, &[model_part, params_part.as_str(), query_part.as_str()])
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Full SHA-256 hex digest of a query
pub fn query_hash(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

/// Make a string safe to use as a file name
pub fn sanitize_filename(name: &str) -> String {
    invalid_chars()
        .replace_all(name, "_")
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .collect()
}

/// Two-character directory prefix for a (normalized, truncated) key
///
/// Dots become `_` so a shard is never `.` or `..`.
pub fn shard_of(key: &str) -> String {
    if key.chars().count() >= 2 {
        key.chars()
            .take(2)
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    } else {
        FALLBACK_SHARD.to_string()
    }
}

// ============================================================================
// KeyCodec - filesystem layout
// ============================================================================

/// Per-category file statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub count: u64,
    pub total_bytes: u64,
}

impl CategoryStats {
    pub fn avg_bytes(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total_bytes as f64 / self.count as f64
    }
}

/// Maps (category, key) pairs onto the on-disk cache layout
///
/// `base/<category-dir>/<shard>/<key>.cache.gz`
#[derive(Debug, Clone)]
pub struct KeyCodec {
    base_dir: PathBuf,
    settings: Arc<CacheSettings>,
}

impl KeyCodec {
    pub fn new(base_dir: impl Into<PathBuf>, settings: Arc<CacheSettings>) -> Self {
        Self {
            base_dir: base_dir.into(),
            settings,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Directory holding a category's shards
    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.base_dir.join(self.settings.category_dir(category))
    }

    /// Disk key for a raw key: normalized, then truncated
    pub fn disk_key(key: &str) -> String {
        truncate(&normalize(key), MAX_KEY_LENGTH)
    }

    /// Memory-map key: `category:normalized`
    pub fn memory_key(category: &str, key: &str) -> String {
        format!("{}{}{}", category, KEY_SEPARATOR, normalize(key))
    }

    /// Entry path without touching the filesystem
    pub fn entry_path(&self, category: &str, key: &str) -> PathBuf {
        let disk_key = Self::disk_key(key);
        self.category_dir(category)
            .join(shard_of(&disk_key))
            .join(format!("{}.{}", disk_key, ENTRY_EXTENSION))
    }

    /// Entry path, creating the shard directory if needed
    ///
    /// A failed create is logged; the subsequent write reports its own error.
    pub fn path_for(&self, category: &str, key: &str) -> PathBuf {
        let path = self.entry_path(category, key);
        if let Some(shard_dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(shard_dir) {
                warn!(dir = %shard_dir.display(), error = %e, "Failed to create cache shard directory");
            }
        }
        path
    }

    /// Create every category directory up front
    pub fn init_layout(&self) {
        for dir in self.settings.category_dirs.values() {
            let path = self.base_dir.join(dir);
            match std::fs::create_dir_all(&path) {
                Ok(()) => debug!(dir = %path.display(), "Initialized cache directory"),
                Err(e) => warn!(dir = %path.display(), error = %e, "Failed to create cache directory"),
            }
        }
    }

    /// All entry files currently under one category directory
    pub fn entry_files(&self, category_dir: &Path) -> Vec<PathBuf> {
        let pattern = format!("{}/**/*.{}", category_dir.display(), ENTRY_EXTENSION);
        match glob::glob(&pattern) {
            Ok(paths) => paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable cache path");
                        None
                    }
                })
                .filter(|path| path.is_file())
                .collect(),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid cache glob pattern");
                Vec::new()
            }
        }
    }

    /// Entry count and size per category
    ///
    /// Categories without a directory are omitted; unreadable files count as
    /// zero bytes.
    pub fn stats(&self) -> BTreeMap<String, CategoryStats> {
        let mut stats = BTreeMap::new();

        for (category, dir) in &self.settings.category_dirs {
            let category_dir = self.base_dir.join(dir);
            if !category_dir.is_dir() {
                continue;
            }

            let mut row = CategoryStats::default();
            for path in self.entry_files(&category_dir) {
                row.count += 1;
                match std::fs::metadata(&path) {
                    Ok(meta) => row.total_bytes += meta.len(),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to stat cache file"),
                }
            }
            stats.insert(category.clone(), row);
        }

        stats
    }
}
