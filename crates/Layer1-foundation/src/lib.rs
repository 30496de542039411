//! # tollgate-foundation
//!
//! Foundation layer for Tollgate:
//! - Core: shared types and traits (ThrottleLevel, Clock)
//! - Config: budget, cache and request-type settings (TollgateConfig)
//! - Storage: JsonStore (typed JSON records, atomic writes)
//! - Error: the crate-wide error enum
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Layer3-cli        tollgate binary (report, markets, ...) │
//! ├──────────────────────────────────────────────────────────┤
//! │  Layer2-core       TieredCache · CostLedger · Governor    │
//! ├──────────────────────────────────────────────────────────┤
//! │  Layer1-foundation Config · JsonStore · Clock · Error     │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core
// ============================================================================
pub use core::{percent_of_limit, Clock, ManualClock, SystemClock, ThrottleLevel};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    BudgetConfig, CacheSettings, IntervalTable, RequestPolicy, RequestTypeConfig, TollgateConfig,
    DEFAULT_CATEGORY, TOLLGATE_CONFIG_FILE,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{JsonStore, APP_DIR_NAME};
