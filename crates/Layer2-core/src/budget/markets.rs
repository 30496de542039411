//! Active markets
//!
//! The active set is replaced wholesale on every update and persisted to
//! `market_status.json`, separately from the usage ledger:
//!
//! ```json
//! {"active_markets": ["XAUUSD", "EURUSD"], "last_updated": "2025-06-10T08:00:00Z"}
//! ```
//!
//! [`MarketFeed`] derives the set from the trading side's files: symbols
//! with an open position, symbols with a non-neutral signal, plus a fixed
//! watchlist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Market status file name (inside the usage directory)
pub const MARKET_STATUS_FILE: &str = "market_status.json";

/// Signal value that does not make a market active
const NEUTRAL_SIGNAL: &str = "neutral";

/// Persisted active-market set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    #[serde(default)]
    pub active_markets: BTreeSet<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl MarketStatus {
    pub fn new<I, S>(symbols: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            active_markets: symbols
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.trim().is_empty())
                .collect(),
            last_updated: Some(now),
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.active_markets.contains(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.active_markets.iter().cloned().collect()
    }
}

// ============================================================================
// Market Feed
// ============================================================================

/// Reads positions and signals files into an active-market set
///
/// Expected shapes:
/// - positions: `{"positions": [{"symbol": "XAUUSD", ...}, ...]}`
/// - signals: `{"signals": {"XAUUSD": {"signal": "buy", ...}, ...}}`
///
/// Missing or malformed files contribute nothing.
#[derive(Debug, Clone, Default)]
pub struct MarketFeed {
    pub positions_file: Option<PathBuf>,
    pub signals_file: Option<PathBuf>,
    pub watchlist: Vec<String>,
}

impl MarketFeed {
    pub fn new(watchlist: Vec<String>) -> Self {
        Self {
            watchlist,
            ..Default::default()
        }
    }

    pub fn positions(mut self, path: impl Into<PathBuf>) -> Self {
        self.positions_file = Some(path.into());
        self
    }

    pub fn signals(mut self, path: impl Into<PathBuf>) -> Self {
        self.signals_file = Some(path.into());
        self
    }

    /// Current active set
    pub fn collect(&self) -> BTreeSet<String> {
        let mut active: BTreeSet<String> = BTreeSet::new();

        if let Some(doc) = self.positions_file.as_deref().and_then(read_json) {
            active.extend(position_symbols(&doc));
        }
        if let Some(doc) = self.signals_file.as_deref().and_then(read_json) {
            active.extend(signal_symbols(&doc));
        }
        active.extend(self.watchlist.iter().filter(|s| !s.is_empty()).cloned());

        debug!(count = active.len(), "Collected active markets");
        active
    }
}

fn read_json(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read market feed file");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed market feed file");
            None
        }
    }
}

fn position_symbols(doc: &Value) -> impl Iterator<Item = String> + '_ {
    doc.get("positions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|position| position.get("symbol").and_then(Value::as_str))
        .filter(|symbol| !symbol.is_empty())
        .map(str::to_string)
}

fn signal_symbols(doc: &Value) -> impl Iterator<Item = String> + '_ {
    doc.get("signals")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
        .filter(|(_, info)| {
            info.get("signal")
                .and_then(Value::as_str)
                .unwrap_or(NEUTRAL_SIGNAL)
                != NEUTRAL_SIGNAL
        })
        .map(|(symbol, _)| symbol.clone())
}
