//! Cache configuration
//!
//! Category tables (TTL and on-disk directory), memory bound, disk quota and
//! janitor trigger probability for the tiered cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Category used when a tag is not in the tables
pub const DEFAULT_CATEGORY: &str = "default";

/// Tiered cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum entries held in memory
    #[serde(default = "default_max_memory_items")]
    pub max_memory_items: usize,

    /// Disk quota (MB)
    #[serde(default = "default_max_disk_mb")]
    pub max_disk_mb: u64,

    /// Chance that a put triggers a janitor pass (0.0 - 1.0)
    #[serde(default = "default_janitor_probability")]
    pub janitor_probability: f64,

    /// gzip level for regular writes (0-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// TTL per category (seconds)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: BTreeMap<String, u64>,

    /// Subdirectory per category
    #[serde(default = "default_category_dirs")]
    pub category_dirs: BTreeMap<String, String>,
}

// Default value functions
fn default_max_memory_items() -> usize {
    100
}
fn default_max_disk_mb() -> u64 {
    100
}
fn default_janitor_probability() -> f64 {
    0.05
}
fn default_compression_level() -> u32 {
    6
}
fn default_ttl_secs() -> BTreeMap<String, u64> {
    [
        (DEFAULT_CATEGORY, 300),     // 5 minutes
        ("chat", 600),               // 10 minutes
        ("news", 3600),              // 1 hour
        ("market_analysis", 1800),   // 30 minutes
        ("pattern", 3600),           // 1 hour
        ("portfolio", 1200),         // 20 minutes
        ("scenario", 1800),          // 30 minutes
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
fn default_category_dirs() -> BTreeMap<String, String> {
    [
        (DEFAULT_CATEGORY, "general"),
        ("chat", "conversations"),
        ("news", "news_data"),
        ("market_analysis", "market_analytics"),
        ("pattern", "technical_patterns"),
        ("portfolio", "portfolio_data"),
        ("scenario", "scenario_analysis"),
        ("seasonal", "seasonal_patterns"),
        ("cot", "cot_data"),
        ("backtest", "backtest_results"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_memory_items: default_max_memory_items(),
            max_disk_mb: default_max_disk_mb(),
            janitor_probability: default_janitor_probability(),
            compression_level: default_compression_level(),
            ttl_secs: default_ttl_secs(),
            category_dirs: default_category_dirs(),
        }
    }
}

impl CacheSettings {
    /// TTL for a category (unknown categories use `default`)
    pub fn ttl(&self, category: &str) -> Duration {
        let secs = self
            .ttl_secs
            .get(category)
            .or_else(|| self.ttl_secs.get(DEFAULT_CATEGORY))
            .copied()
            .unwrap_or(300);
        Duration::from_secs(secs)
    }

    /// Subdirectory for a category (unknown categories use `default`)
    pub fn category_dir(&self, category: &str) -> &str {
        self.category_dirs
            .get(category)
            .or_else(|| self.category_dirs.get(DEFAULT_CATEGORY))
            .map(String::as_str)
            .unwrap_or("general")
    }

    /// Reverse lookup: which category owns a directory name
    pub fn category_for_dir(&self, dir: &str) -> Option<&str> {
        self.category_dirs
            .iter()
            .find(|(_, d)| d.as_str() == dir)
            .map(|(category, _)| category.as_str())
    }

    /// Disk quota in bytes
    pub fn max_disk_bytes(&self) -> u64 {
        self.max_disk_mb.saturating_mul(1024 * 1024)
    }

    /// Settings that never trigger the janitor from `put` (tests, tooling)
    pub fn without_janitor(mut self) -> Self {
        self.janitor_probability = 0.0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_lookup() {
        let settings = CacheSettings::default();
        assert_eq!(settings.ttl("chat"), Duration::from_secs(600));
        assert_eq!(settings.ttl("news"), Duration::from_secs(3600));
        assert_eq!(settings.ttl("unknown"), Duration::from_secs(300));
        // listed directory but no TTL row
        assert_eq!(settings.ttl("cot"), Duration::from_secs(300));
    }

    #[test]
    fn test_category_dirs() {
        let settings = CacheSettings::default();
        assert_eq!(settings.category_dir("pattern"), "technical_patterns");
        assert_eq!(settings.category_dir("whatever"), "general");
        assert_eq!(settings.category_for_dir("news_data"), Some("news"));
        assert_eq!(settings.category_for_dir("nope"), None);
    }

    #[test]
    fn test_quota_bytes() {
        let settings = CacheSettings {
            max_disk_mb: 2,
            ..Default::default()
        };
        assert_eq!(settings.max_disk_bytes(), 2 * 1024 * 1024);
    }
}
