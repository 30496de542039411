//! Budget control
//!
//! - `ledger`: persisted usage counters and the derived throttle level
//! - `markets`: active-market set and the positions/signals feed
//! - `governor`: execute/skip decisions
//! - `report`: read-only usage snapshot

pub mod governor;
pub mod ledger;
pub mod markets;
pub mod report;

pub use governor::{Decision, RequestGovernor};
pub use ledger::{
    day_key, month_key, CostEstimate, CostLedger, DayBucket, LedgerFile, MonthBucket,
    ThrottleRecord, TypeUsage, UsageCounter, USAGE_DATA_FILE,
};
pub use markets::{MarketFeed, MarketStatus, MARKET_STATUS_FILE};
pub use report::{DailySummary, UsageReport};
