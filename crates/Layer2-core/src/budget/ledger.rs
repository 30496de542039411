//! Cost ledger - durable token and spend counters
//!
//! Counts tokens, requests and estimated cost per day, per request type and
//! per (type, market), keeps a rolling month aggregate and derives the
//! current [`ThrottleLevel`] from today's spend. One mutex guards the whole
//! state; every mutation and the flush that follows it happen inside it.
//!
//! ```text
//! api_usage/
//! ├── usage_data.json     days · current_month · throttling · last_request_time
//! └── market_status.json  active_markets · last_updated
//! ```
//!
//! Missing or corrupt files load as empty state. Failed writes are logged;
//! memory stays authoritative until the next successful flush.

use super::markets::{MarketStatus, MARKET_STATUS_FILE};
use super::report::{DailySummary, UsageReport};
use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tollgate_foundation::{
    BudgetConfig, Clock, JsonStore, RequestPolicy, SystemClock, ThrottleLevel, TollgateConfig,
};
use tracing::{debug, info, warn};

/// Ledger file name (inside the usage directory)
pub const USAGE_DATA_FILE: &str = "usage_data.json";

// ============================================================================
// Persisted records
// ============================================================================

/// Tokens and request count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    #[serde(default)]
    pub tokens: u64,
    #[serde(default)]
    pub count: u64,
}

impl UsageCounter {
    fn add(&mut self, tokens: u64) {
        self.tokens += tokens;
        self.count += 1;
    }
}

/// Usage of one request type within a day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeUsage {
    #[serde(default)]
    pub tokens: u64,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub markets: BTreeMap<String, UsageCounter>,
}

/// One calendar day (local time)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayBucket {
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub requests_count: u64,
    #[serde(default)]
    pub by_type: BTreeMap<String, TypeUsage>,
}

impl DayBucket {
    fn add(&mut self, request_type: &str, tokens: u64, cost: f64, market: Option<&str>) {
        self.total_tokens += tokens;
        self.estimated_cost += cost;
        self.requests_count += 1;

        let by_type = self.by_type.entry(request_type.to_string()).or_default();
        by_type.tokens += tokens;
        by_type.count += 1;

        if let Some(market) = market {
            by_type.markets.entry(market.to_string()).or_default().add(tokens);
        }
    }
}

/// Rolling aggregate for the current month
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthBucket {
    /// `YYYY-MM`; empty in files written before the key was tracked
    #[serde(default)]
    pub month: String,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub requests_count: u64,
}

/// Last throttle level transition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottleRecord {
    #[serde(default)]
    pub current_level: ThrottleLevel,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Everything persisted in `usage_data.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerFile {
    #[serde(default)]
    pub days: BTreeMap<String, DayBucket>,
    #[serde(default)]
    pub current_month: MonthBucket,
    #[serde(default)]
    pub throttling: ThrottleRecord,
    #[serde(default)]
    pub last_request_time: Option<DateTime<Utc>>,
}

// ============================================================================
// Estimates
// ============================================================================

/// Expected size and price of one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub tokens: u64,
    pub cost: f64,
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug)]
struct LedgerState {
    file: LedgerFile,
    markets: MarketStatus,
    level: ThrottleLevel,
    daily_limit: f64,
    /// Process-lifetime only, written solely by `record`
    last_requests: HashMap<String, DateTime<Utc>>,
}

/// Spend tracker shared by the governor and callers
pub struct CostLedger {
    store: JsonStore,
    budget: BudgetConfig,
    policy: RequestPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl CostLedger {
    /// Open (or start) the ledger in `usage_dir` on the wall clock
    pub fn open(usage_dir: impl Into<PathBuf>, budget: BudgetConfig, policy: RequestPolicy) -> Self {
        Self::with_clock(usage_dir, budget, policy, Arc::new(SystemClock))
    }

    pub fn from_config(config: &TollgateConfig) -> Self {
        Self::open(
            config.usage_dir(),
            config.budget.clone(),
            config.request_types.clone(),
        )
    }

    pub fn with_clock(
        usage_dir: impl Into<PathBuf>,
        budget: BudgetConfig,
        policy: RequestPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = JsonStore::new(usage_dir);
        let file: LedgerFile = load_or_empty(&store, USAGE_DATA_FILE);
        let markets: MarketStatus = load_or_empty(&store, MARKET_STATUS_FILE);

        let daily_limit = if BudgetConfig::is_valid_limit(budget.daily_cost_limit) {
            budget.daily_cost_limit
        } else {
            warn!(
                limit = budget.daily_cost_limit,
                "Invalid daily cost limit in config, using default"
            );
            BudgetConfig::default().daily_cost_limit
        };

        let today = day_key(clock.now());
        let today_cost = file.days.get(&today).map(|d| d.estimated_cost).unwrap_or(0.0);
        let level = ThrottleLevel::from_cost(today_cost, daily_limit);

        debug!(
            dir = %store.base_dir().display(),
            days = file.days.len(),
            markets = markets.active_markets.len(),
            %level,
            "Opened cost ledger"
        );

        Self {
            store,
            budget,
            policy,
            clock,
            state: Mutex::new(LedgerState {
                file,
                markets,
                level,
                daily_limit,
                last_requests: HashMap::new(),
            }),
        }
    }

    pub fn usage_dir(&self) -> &Path {
        self.store.base_dir()
    }

    pub fn budget(&self) -> &BudgetConfig {
        &self.budget
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Account for one completed request
    pub fn record(&self, request_type: &str, tokens: u64, market: Option<&str>) {
        let now = self.clock.now();
        let cost = self.budget.cost_of(tokens);
        let market = market.filter(|m| !m.is_empty());

        let mut state = self.state.lock();

        state
            .file
            .days
            .entry(day_key(now))
            .or_default()
            .add(request_type, tokens, cost, market);

        let month = &mut state.file.current_month;
        let this_month = month_key(now);
        if month.month.is_empty() {
            month.month = this_month;
        } else if month.month != this_month {
            info!(from = %month.month, to = %this_month, "Starting new month aggregate");
            *month = MonthBucket {
                month: this_month,
                ..Default::default()
            };
        }
        month.total_tokens += tokens;
        month.estimated_cost += cost;
        month.requests_count += 1;

        state.file.last_request_time = Some(now);
        state.last_requests.insert(request_type.to_string(), now);

        debug!(request_type, tokens, cost, market = ?market, "Recorded API usage");

        self.refresh_level(&mut state, now);
        self.flush_usage(&state);
    }

    /// Change the daily limit; invalid limits are ignored
    pub fn set_daily_limit(&self, limit: f64) -> bool {
        if !BudgetConfig::is_valid_limit(limit) {
            warn!(limit, "Rejected daily cost limit (must be finite and positive)");
            return false;
        }

        let now = self.clock.now();
        let mut state = self.state.lock();
        state.daily_limit = limit;
        info!(limit, "Daily cost limit updated");

        self.refresh_level(&mut state, now);
        self.flush_usage(&state);
        true
    }

    /// Replace the active-market set
    pub fn update_active_markets<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.markets = MarketStatus::new(symbols, now);
        info!(markets = ?state.markets.active_markets, "Active markets updated");

        if let Err(e) = self.store.save(MARKET_STATUS_FILE, &state.markets) {
            warn!(error = %e, "Failed to persist market status");
        }
    }

    fn refresh_level(&self, state: &mut LedgerState, now: DateTime<Utc>) {
        let today_cost = state
            .file
            .days
            .get(&day_key(now))
            .map(|d| d.estimated_cost)
            .unwrap_or(0.0);
        let new_level = ThrottleLevel::from_cost(today_cost, state.daily_limit);

        if new_level != state.level {
            info!(
                from = %state.level,
                to = %new_level,
                daily_cost = today_cost,
                percent = tollgate_foundation::percent_of_limit(today_cost, state.daily_limit),
                "Throttle level changed"
            );
            state.level = new_level;
            state.file.throttling = ThrottleRecord {
                current_level: new_level,
                last_updated: Some(now),
            };
        }
    }

    fn flush_usage(&self, state: &LedgerState) {
        if let Err(e) = self.store.save(USAGE_DATA_FILE, &state.file) {
            warn!(error = %e, "Failed to persist usage ledger");
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn throttle_level(&self) -> ThrottleLevel {
        self.state.lock().level
    }

    pub fn daily_limit(&self) -> f64 {
        self.state.lock().daily_limit
    }

    pub fn is_market_active(&self, symbol: &str) -> bool {
        self.state.lock().markets.contains(symbol)
    }

    pub fn active_markets(&self) -> Vec<String> {
        self.state.lock().markets.symbols()
    }

    /// Last time `record` saw this request type in this process
    pub fn last_request(&self, request_type: &str) -> Option<DateTime<Utc>> {
        self.state.lock().last_requests.get(request_type).copied()
    }

    /// Today's bucket, empty if nothing was recorded yet
    pub fn daily_usage(&self) -> DayBucket {
        let today = day_key(self.clock.now());
        self.state
            .lock()
            .file
            .days
            .get(&today)
            .cloned()
            .unwrap_or_default()
    }

    /// Full copy of the persisted ledger
    pub fn snapshot(&self) -> LedgerFile {
        self.state.lock().file.clone()
    }

    /// Average size and cost of one request of this type
    pub fn estimate_request_cost(&self, request_type: &str) -> CostEstimate {
        let tokens = self.policy.avg_tokens(request_type);
        CostEstimate {
            tokens,
            cost: self.budget.cost_of(tokens),
        }
    }

    pub fn report(&self) -> UsageReport {
        let today = day_key(self.clock.now());
        let state = self.state.lock();
        let day = state.file.days.get(&today).cloned().unwrap_or_default();

        UsageReport {
            daily: DailySummary::new(&day, state.daily_limit),
            monthly: state.file.current_month.clone(),
            throttling: ThrottleRecord {
                current_level: state.level,
                last_updated: state.file.throttling.last_updated,
            },
            active_markets: state.markets.symbols(),
        }
    }
}

/// Local calendar day of an instant, `YYYY-MM-DD`
pub fn day_key(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// Local calendar month of an instant, `YYYY-MM`
pub fn month_key(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%Y-%m").to_string()
}

fn load_or_empty<T: DeserializeOwned + Default>(store: &JsonStore, filename: &str) -> T {
    match store.load::<T>(filename) {
        Ok(value) => value,
        Err(e) if e.is_absent() => T::default(),
        Err(e) => {
            warn!(file = filename, error = %e, "Unreadable ledger file, starting empty");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;
    use tollgate_foundation::ManualClock;

    fn noon(day: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2025, 6, day, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn ledger(dir: &TempDir, limit: f64, per_1k: f64) -> (CostLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(noon(10)));
        let budget = BudgetConfig {
            daily_cost_limit: limit,
            token_cost_per_1k: per_1k,
            ..Default::default()
        };
        let ledger = CostLedger::with_clock(dir.path(), budget, RequestPolicy::default(), clock.clone());
        (ledger, clock)
    }

    #[test]
    fn test_record_counts_every_granularity() {
        let dir = TempDir::new().unwrap();
        let (ledger, _) = ledger(&dir, 5.0, 0.2);

        ledger.record("news_bias", 800, Some("XAUUSD"));
        ledger.record("news_bias", 200, Some("XAUUSD"));
        ledger.record("news_bias", 500, Some("EURUSD"));
        ledger.record("chat", 1000, None);

        let day = ledger.daily_usage();
        assert_eq!(day.total_tokens, 2500);
        assert_eq!(day.requests_count, 4);
        assert!((day.estimated_cost - 0.5).abs() < 1e-9);

        let news = &day.by_type["news_bias"];
        assert_eq!((news.tokens, news.count), (1500, 3));
        assert_eq!(news.markets["XAUUSD"], UsageCounter { tokens: 1000, count: 2 });
        assert_eq!(news.markets["EURUSD"], UsageCounter { tokens: 500, count: 1 });
        assert!(day.by_type["chat"].markets.is_empty());

        let month = ledger.snapshot().current_month;
        assert_eq!(month.month, "2025-06");
        assert_eq!(month.total_tokens, 2500);
        assert_eq!(month.requests_count, 4);
    }

    #[test]
    fn test_scenario_half_budget() {
        let dir = TempDir::new().unwrap();
        let (ledger, _) = ledger(&dir, 5.0, 0.2);
        assert_eq!(ledger.throttle_level(), ThrottleLevel::Normal);

        ledger.record("news_bias", 12500, Some("XAUUSD"));

        let report = ledger.report();
        assert!((report.daily.estimated_cost - 2.5).abs() < 1e-9);
        assert_eq!(report.daily.percent_of_limit, 50.0);
        assert_eq!(ledger.throttle_level(), ThrottleLevel::Light);
        assert_eq!(report.throttling.current_level, ThrottleLevel::Light);
        assert!(report.throttling.last_updated.is_some());
    }

    #[test]
    fn test_level_follows_limit_changes() {
        let dir = TempDir::new().unwrap();
        let (ledger, _) = ledger(&dir, 100.0, 1.0);

        // 1 USD per 1K tokens: 95_000 tokens = 95 USD
        ledger.record("scenario_analysis", 95_000, None);
        assert_eq!(ledger.throttle_level(), ThrottleLevel::Heavy);

        assert!(ledger.set_daily_limit(50.0));
        assert_eq!(ledger.throttle_level(), ThrottleLevel::Critical);

        assert!(ledger.set_daily_limit(1000.0));
        assert_eq!(ledger.throttle_level(), ThrottleLevel::Normal);

        assert!(!ledger.set_daily_limit(0.0));
        assert!(!ledger.set_daily_limit(f64::NAN));
        assert_eq!(ledger.daily_limit(), 1000.0);
    }

    #[test]
    fn test_new_day_keeps_old_buckets() {
        let dir = TempDir::new().unwrap();
        let (ledger, clock) = ledger(&dir, 5.0, 0.2);

        ledger.record("chat", 20_000, None);
        assert_eq!(ledger.throttle_level(), ThrottleLevel::Moderate);

        clock.set(noon(11));
        assert_eq!(ledger.daily_usage(), DayBucket::default());
        ledger.record("chat", 1000, None);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.days.len(), 2);
        assert_eq!(snapshot.days["2025-06-10"].total_tokens, 20_000);
        assert_eq!(snapshot.days["2025-06-11"].total_tokens, 1000);
        assert_eq!(snapshot.current_month.total_tokens, 21_000);
        assert_eq!(ledger.throttle_level(), ThrottleLevel::Normal);
    }

    #[test]
    fn test_month_rollover_resets_aggregate() {
        let dir = TempDir::new().unwrap();
        let (ledger, clock) = ledger(&dir, 5.0, 0.2);
        ledger.record("chat", 1000, None);

        clock.advance(Duration::days(30));
        ledger.record("chat", 300, None);

        let month = ledger.snapshot().current_month;
        assert_eq!(month.month, "2025-07");
        assert_eq!(month.total_tokens, 300);
        assert_eq!(month.requests_count, 1);
    }

    #[test]
    fn test_persisted_and_reloaded() {
        let dir = TempDir::new().unwrap();
        {
            let (ledger, _) = ledger(&dir, 5.0, 0.2);
            ledger.record("news_bias", 12500, Some("XAUUSD"));
            ledger.update_active_markets(["XAUUSD", "EURUSD"]);
        }

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(USAGE_DATA_FILE)).unwrap()).unwrap();
        assert_eq!(raw["days"]["2025-06-10"]["total_tokens"], 12500);
        assert_eq!(raw["throttling"]["current_level"], "light");

        let (reopened, _) = ledger(&dir, 5.0, 0.2);
        assert_eq!(reopened.daily_usage().total_tokens, 12500);
        assert_eq!(reopened.throttle_level(), ThrottleLevel::Light);
        assert!(reopened.is_market_active("EURUSD"));
        // interval clock is process-local
        assert_eq!(reopened.last_request("news_bias"), None);
    }

    #[test]
    fn test_unwritable_dir_keeps_counting_in_memory() {
        let dir = TempDir::new().unwrap();
        let usage_dir = dir.path().join("usage");
        std::fs::write(&usage_dir, b"not a directory").unwrap();

        let clock = Arc::new(ManualClock::new(noon(10)));
        let open = || {
            CostLedger::with_clock(
                &usage_dir,
                BudgetConfig::with_daily_limit(5.0),
                RequestPolicy::default(),
                clock.clone(),
            )
        };

        let ledger = open();
        ledger.record("news_bias", 1000, Some("XAUUSD"));
        assert_eq!(ledger.daily_usage().requests_count, 1);
        assert!(!usage_dir.join(USAGE_DATA_FILE).exists());

        // once the path is usable the next write carries everything
        std::fs::remove_file(&usage_dir).unwrap();
        ledger.record("chat", 500, None);
        assert_eq!(ledger.daily_usage().requests_count, 2);

        let reopened = open();
        let day = reopened.daily_usage();
        assert_eq!(day.requests_count, 2);
        assert_eq!(day.total_tokens, 1500);
    }

    #[test]
    fn test_corrupt_files_start_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(USAGE_DATA_FILE), "{ not json").unwrap();
        std::fs::write(dir.path().join(MARKET_STATUS_FILE), "garbage").unwrap();

        let (ledger, _) = ledger(&dir, 5.0, 0.2);
        assert_eq!(ledger.snapshot(), LedgerFile::default());
        assert!(ledger.active_markets().is_empty());

        ledger.record("chat", 100, None);
        let reloaded: LedgerFile = JsonStore::new(dir.path()).load(USAGE_DATA_FILE).unwrap();
        assert_eq!(reloaded.days.len(), 1);
    }

    #[test]
    fn test_active_markets_replaced_wholesale() {
        let dir = TempDir::new().unwrap();
        let (ledger, _) = ledger(&dir, 5.0, 0.2);

        ledger.update_active_markets(["XAUUSD", "EURUSD"]);
        ledger.update_active_markets(vec!["GBPUSD".to_string()]);

        assert_eq!(ledger.active_markets(), vec!["GBPUSD"]);
        assert!(!ledger.is_market_active("XAUUSD"));
        assert_eq!(ledger.report().active_markets, vec!["GBPUSD"]);
    }

    #[test]
    fn test_estimate_request_cost() {
        let dir = TempDir::new().unwrap();
        let (ledger, _) = ledger(&dir, 5.0, 0.2);

        let estimate = ledger.estimate_request_cost("portfolio_optimization");
        assert_eq!(estimate.tokens, 2000);
        assert!((estimate.cost - 0.4).abs() < 1e-9);
        assert_eq!(ledger.estimate_request_cost("unknown").tokens, 500);
    }

    #[test]
    fn test_last_request_tracks_record() {
        let dir = TempDir::new().unwrap();
        let (ledger, clock) = ledger(&dir, 5.0, 0.2);
        assert_eq!(ledger.last_request("chat"), None);

        ledger.record("chat", 10, None);
        assert_eq!(ledger.last_request("chat"), Some(clock.now()));
    }
}
