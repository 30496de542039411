//! Config - combined settings
//!
//! - `limits.rs` - daily budget and pricing
//! - `cache.rs` - tiered cache tables and quotas
//! - `requests.rs` - per request type intervals and token estimates
//! - `tollgate.rs` - TollgateConfig (global + project + env)

mod cache;
mod limits;
mod requests;
mod tollgate;

pub use cache::{CacheSettings, DEFAULT_CATEGORY};
pub use limits::{BudgetConfig, DAILY_LIMIT_ENV};
pub use requests::{IntervalTable, RequestPolicy, RequestTypeConfig, UNKNOWN_TYPE_AVG_TOKENS};
pub use tollgate::{
    merge_json, TollgateConfig, CACHE_DIR_NAME, DATA_DIR_ENV, TOLLGATE_CONFIG_FILE, USAGE_DIR_NAME,
};
