//! Command handlers
//!
//! Each handler prints JSON (reports, stats) or a short status line to
//! stdout; logs go to stderr.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tollgate_core::cache::query_key;
use tollgate_core::{CostLedger, Decision, MarketFeed, RequestGovernor, TieredCache};
use tollgate_foundation::TollgateConfig;
use tracing::warn;

/// Request mix used by `simulate`: (type, tokens per call)
const SIMULATED_REQUESTS: [(&str, u64); 3] = [
    ("news_bias", 800),
    ("chat", 500),
    ("pattern_recognition", 1200),
];

/// Markets alternated by `simulate`
const SIMULATED_MARKETS: [&str; 2] = ["XAUUSD", "WTICOUSD"];

pub struct App {
    pub config: TollgateConfig,
    pub ledger: Arc<CostLedger>,
    pub cache: Arc<TieredCache>,
}

impl App {
    pub fn new(config: TollgateConfig) -> Self {
        let ledger = Arc::new(CostLedger::from_config(&config));
        let cache = Arc::new(TieredCache::new(config.cache_dir(), config.cache.clone()));
        Self {
            config,
            ledger,
            cache,
        }
    }

    /// Feed over the given files plus the configured watchlist
    pub fn feed(&self, positions: Option<PathBuf>, signals: Option<PathBuf>) -> MarketFeed {
        MarketFeed {
            positions_file: positions,
            signals_file: signals,
            watchlist: self.config.watchlist.clone(),
        }
    }

    // ========================================================================
    // Budget
    // ========================================================================

    pub fn report(&self) -> Result<()> {
        print_json(&self.ledger.report())
    }

    pub fn set_limit(&self, limit: f64, save: bool) -> Result<()> {
        if !self.ledger.set_daily_limit(limit) {
            bail!("daily limit must be a positive number, got {}", limit);
        }

        if save {
            let mut global = TollgateConfig::load_from(&tollgate_foundation::JsonStore::global()?)?;
            global.budget.daily_cost_limit = limit;
            global.save_global()?;
        }

        println!(
            "Daily cost limit set to ${:.2} (level: {})",
            limit,
            self.ledger.throttle_level()
        );
        Ok(())
    }

    pub fn markets(&self, symbols: Vec<String>, feed: &MarketFeed) -> Result<()> {
        let active: Vec<String> = if symbols.is_empty() {
            feed.collect().into_iter().collect()
        } else {
            symbols
        };

        self.ledger.update_active_markets(active);
        println!("Active markets: {}", self.ledger.active_markets().join(", "));
        Ok(())
    }

    /// Replay a fixed request mix through the governor
    pub fn simulate(&self, count: usize) -> Result<()> {
        let governor = RequestGovernor::new(self.ledger.clone());

        for i in 0..count {
            let (request_type, tokens) = SIMULATED_REQUESTS[i % SIMULATED_REQUESTS.len()];
            let market = SIMULATED_MARKETS[i % SIMULATED_MARKETS.len()];

            let decision = governor.decide(request_type, Some(market));
            println!(
                "Request {}: {} for {} - {}",
                i + 1,
                request_type,
                market,
                describe(decision)
            );

            if decision.is_execute() {
                self.ledger.record(request_type, tokens, Some(market));
                println!("  Throttle level: {}", self.ledger.throttle_level());
            }
        }

        println!("\nFinal report:");
        self.report()
    }

    // ========================================================================
    // Cache
    // ========================================================================

    pub fn cache_stats(&self) -> Result<()> {
        let rows: Map<String, Value> = self
            .cache
            .disk_stats()
            .into_iter()
            .map(|(category, stats)| {
                (
                    category,
                    json!({
                        "count": stats.count,
                        "total_bytes": stats.total_bytes,
                        "avg_bytes": stats.avg_bytes(),
                    }),
                )
            })
            .collect();
        print_json(&rows)
    }

    pub fn cache_clean(&self) -> Result<()> {
        print_json(&self.cache.run_janitor())
    }

    pub fn cache_key(
        &self,
        query: &str,
        model: Option<&str>,
        params: &Map<String, Value>,
        category: &str,
    ) -> Result<()> {
        let key = query_key(query, model, Some(params));
        let path = self.cache.codec().entry_path(category, &key);
        print_json(&json!({
            "key": key,
            "category": category,
            "path": path.display().to_string(),
            "cached": path.exists(),
        }))
    }
}

fn describe(decision: Decision) -> String {
    match decision {
        Decision::Execute => "execute".to_string(),
        Decision::TooSoon { wait_minutes } => format!("skip (retry in {} min)", wait_minutes),
        Decision::InactiveMarket => "skip (inactive market)".to_string(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse `name=value` pairs; values that are valid JSON keep their type
pub fn parse_params(raw: &[String]) -> Result<Map<String, Value>> {
    let mut params = Map::new();
    for pair in raw {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("expected NAME=VALUE, got '{}'", pair);
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("empty parameter name in '{}'", pair);
        }
        let value = serde_json::from_str(value.trim()).unwrap_or_else(|_| {
            Value::String(value.trim().to_string())
        });
        if params.insert(name.to_string(), value).is_some() {
            warn!(name, "Parameter given more than once, keeping the last value");
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_params() {
        let raw = vec![
            "temperature=0.7".to_string(),
            "max_tokens=1000".to_string(),
            "stop=###".to_string(),
        ];
        let params = parse_params(&raw).unwrap();

        assert_eq!(params["temperature"], json!(0.7));
        assert_eq!(params["max_tokens"], json!(1000));
        assert_eq!(params["stop"], json!("###"));
        assert!(parse_params(&["novalue".to_string()]).is_err());
        assert!(parse_params(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_markets_from_feed_and_symbols() {
        let dir = TempDir::new().unwrap();
        let positions = dir.path().join("positions.json");
        std::fs::write(&positions, r#"{"positions": [{"symbol": "EURUSD"}]}"#).unwrap();

        let app = App::new(TollgateConfig::default().data_dir_path(dir.path()));
        let feed = app.feed(Some(positions), None);

        app.markets(Vec::new(), &feed).unwrap();
        assert_eq!(app.ledger.active_markets(), vec!["EURUSD", "XAGUSD", "XAUUSD"]);

        app.markets(vec!["USDJPY".into()], &feed).unwrap();
        assert_eq!(app.ledger.active_markets(), vec!["USDJPY"]);
    }

    #[test]
    fn test_simulate_records_usage() {
        let dir = TempDir::new().unwrap();
        let app = App::new(TollgateConfig::default().data_dir_path(dir.path()));
        app.ledger.update_active_markets(["XAUUSD", "WTICOUSD"]);

        app.simulate(3).unwrap();

        // three distinct types, all first calls, all active markets
        let day = app.ledger.daily_usage();
        assert_eq!(day.requests_count, 3);
        assert_eq!(day.total_tokens, 2500);
    }
}
