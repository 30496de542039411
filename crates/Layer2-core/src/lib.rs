//! tollgate-core: cache and budget engine for Tollgate
//!
//! Layer2 - sits between callers and a metered inference API
//!
//! # Modules
//!
//! - `cache`: key codec, tiered (memory + disk) cache, janitor
//! - `budget`: cost ledger, active markets, request governor, reports
//! - `gate`: the combined cache → governor → call → record flow
//!
//! # Example
//!
//! ```ignore
//! use tollgate_core::{CostLedger, GateRequest, Gatekeeper, RequestGovernor, TieredCache};
//! use tollgate_foundation::TollgateConfig;
//!
//! let config = TollgateConfig::load()?;
//! let cache = Arc::new(TieredCache::new(config.cache_dir(), config.cache.clone()));
//! let ledger = Arc::new(CostLedger::from_config(&config));
//! let gate = Gatekeeper::new(cache, Arc::new(RequestGovernor::new(ledger)));
//!
//! let request = GateRequest::new("news_bias", "news", "xauusd daily news").market("XAUUSD");
//! let resolution = gate.resolve(&request, || client.news_bias("XAUUSD"))?;
//! ```

pub mod budget;
pub mod cache;
pub mod gate;

// Re-exports: Cache
pub use cache::{
    CacheEntry, CacheJanitor, CategoryStats, JanitorReport, KeyCodec, TieredCache,
    TieredCacheStats, MAX_KEY_LENGTH,
};

// Re-exports: Budget
pub use budget::{
    CostEstimate, CostLedger, DailySummary, DayBucket, Decision, LedgerFile, MarketFeed,
    MarketStatus, RequestGovernor, UsageReport,
};

// Re-exports: Gate
pub use gate::{GateRequest, Gatekeeper, Resolution};
