//! Tollgate Config - combined settings
//!
//! One `tollgate.json` per scope. The global file (~/.config/tollgate/) is
//! read first, the project file (.tollgate/) is deep-merged over it, and
//! environment variables win last.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use super::{BudgetConfig, CacheSettings, RequestPolicy};

/// Config file name
pub const TOLLGATE_CONFIG_FILE: &str = "tollgate.json";

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "TOLLGATE_DATA_DIR";

/// Subdirectory of the data dir holding ledger and market files
pub const USAGE_DIR_NAME: &str = "api_usage";

/// Subdirectory of the data dir holding cache entries
pub const CACHE_DIR_NAME: &str = "cache";

// ============================================================================
// Tollgate Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Root for ledger and cache files (defaults to the platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub request_types: RequestPolicy,

    /// Symbols always treated as active by the market feed
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
}

fn default_watchlist() -> Vec<String> {
    vec!["XAUUSD".to_string(), "XAGUSD".to_string()]
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            budget: BudgetConfig::default(),
            cache: CacheSettings::default(),
            request_types: RequestPolicy::default(),
            watchlist: default_watchlist(),
        }
    }
}

impl TollgateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Global + project + environment
    pub fn load() -> Result<Self> {
        let mut raw = Value::Object(Default::default());

        if let Ok(global) = JsonStore::global() {
            if let Some(value) = global.load_optional::<Value>(TOLLGATE_CONFIG_FILE)? {
                merge_json(&mut raw, value);
            }
        }

        if let Ok(project) = JsonStore::current_project() {
            if let Some(value) = project.load_optional::<Value>(TOLLGATE_CONFIG_FILE)? {
                merge_json(&mut raw, value);
            }
        }

        let mut config: Self = serde_json::from_value(raw)?;
        config.apply_env();
        Ok(config)
    }

    /// Load from one store only (no merging, no environment)
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<Self>(TOLLGATE_CONFIG_FILE)?
            .unwrap_or_else(Self::new))
    }

    pub fn save_global(&self) -> Result<()> {
        JsonStore::global()?.save(TOLLGATE_CONFIG_FILE, self)
    }

    /// Environment overrides
    pub fn apply_env(&mut self) {
        self.budget.apply_env();
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.data_dir = Some(PathBuf::from(dir));
            }
        }
    }

    // ========================================================================
    // Paths
    // ========================================================================

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(JsonStore::default_data_dir)
    }

    /// Where the ledger and market-status files live
    pub fn usage_dir(&self) -> PathBuf {
        self.data_dir().join(USAGE_DIR_NAME)
    }

    /// Root of the on-disk cache
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir().join(CACHE_DIR_NAME)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn data_dir_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn daily_limit(mut self, limit: f64) -> Self {
        self.budget.daily_cost_limit = limit;
        self
    }
}

/// Recursive object merge; non-object values in `overlay` replace `base`
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
