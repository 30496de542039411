//! Gatekeeper - the cache → governor → call → record flow in one place
//!
//! ```text
//! resolve(request, call)
//!   │
//!   ├─ fresh cache hit ───────────────────────────▶ Cached
//!   ├─ governor skips ─┬─ extended-TTL hit ───────▶ Stale
//!   │                  └─ nothing usable ─────────▶ Skipped
//!   └─ call() ── Ok ──▶ put + record ─────────────▶ Fresh
//!              └ Err ─────────────────────────────▶ Err (unchanged)
//! ```

use crate::budget::{CostLedger, Decision, RequestGovernor};
use crate::cache::TieredCache;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// One guarded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest {
    pub request_type: String,
    pub market: Option<String>,
    pub category: String,
    pub cache_key: String,
}

impl GateRequest {
    pub fn new(
        request_type: impl Into<String>,
        category: impl Into<String>,
        cache_key: impl Into<String>,
    ) -> Self {
        Self {
            request_type: request_type.into(),
            market: None,
            category: category.into(),
            cache_key: cache_key.into(),
        }
    }

    pub fn market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into());
        self
    }
}

/// How a request was satisfied
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Served from cache within the normal TTL
    Cached(Value),
    /// Throttled; served from cache within the extended TTL
    Stale(Value),
    /// Called through; result cached and recorded
    Fresh { payload: Value, tokens: u64 },
    /// Throttled with nothing usable in cache
    Skipped(Decision),
}

impl Resolution {
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Resolution::Cached(v) | Resolution::Stale(v) => Some(v),
            Resolution::Fresh { payload, .. } => Some(payload),
            Resolution::Skipped(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Cached(_) => "cached",
            Resolution::Stale(_) => "stale",
            Resolution::Fresh { .. } => "fresh",
            Resolution::Skipped(_) => "skipped",
        }
    }
}

pub struct Gatekeeper {
    cache: Arc<TieredCache>,
    governor: Arc<RequestGovernor>,
}

impl Gatekeeper {
    pub fn new(cache: Arc<TieredCache>, governor: Arc<RequestGovernor>) -> Self {
        Self { cache, governor }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn governor(&self) -> &Arc<RequestGovernor> {
        &self.governor
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        self.governor.ledger()
    }

    /// Resolve a request, calling out only when cache and budget allow
    ///
    /// `call` returns the payload and the tokens it consumed. Its error is
    /// passed through untouched and nothing is cached or recorded.
    pub fn resolve<F, E>(&self, request: &GateRequest, call: F) -> Result<Resolution, E>
    where
        F: FnOnce() -> Result<(Value, u64), E>,
    {
        let GateRequest {
            request_type,
            market,
            category,
            cache_key,
        } = request;
        let market = market.as_deref();

        if let Some(payload) = self.cache.get(cache_key, category, false) {
            debug!(request_type = %request_type, category = %category, "Served from cache");
            return Ok(Resolution::Cached(payload));
        }

        let decision = self.governor.decide(request_type, market);
        if !decision.is_execute() {
            if let Some(payload) = self.cache.get(cache_key, category, true) {
                info!(request_type = %request_type, market = ?market, "Throttled, using extended cache");
                return Ok(Resolution::Stale(payload));
            }
            info!(request_type = %request_type, market = ?market, ?decision, "Throttled, skipping call");
            return Ok(Resolution::Skipped(decision));
        }

        let (payload, tokens) = call()?;
        self.ledger().record(request_type, tokens, market);
        self.cache.put(cache_key, category, payload.clone());

        Ok(Resolution::Fresh { payload, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tollgate_foundation::{BudgetConfig, CacheSettings, ManualClock, RequestPolicy};

    struct Fixture {
        _dir: TempDir,
        clock: Arc<ManualClock>,
        gate: Gatekeeper,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let cache = TieredCache::with_clock(
            dir.path().join("cache"),
            CacheSettings::default().without_janitor(),
            clock.clone(),
        );
        let ledger = CostLedger::with_clock(
            dir.path().join("api_usage"),
            BudgetConfig::default(),
            RequestPolicy::default(),
            clock.clone(),
        );
        let governor = RequestGovernor::new(Arc::new(ledger)).with_seed(9);
        Fixture {
            _dir: dir,
            clock,
            gate: Gatekeeper::new(Arc::new(cache), Arc::new(governor)),
        }
    }

    fn ok(value: Value, tokens: u64) -> impl FnOnce() -> Result<(Value, u64), String> {
        move || Ok((value, tokens))
    }

    #[test]
    fn test_fresh_then_cached() {
        let f = fixture();
        let request = GateRequest::new("news_bias", "news", "xauusd news").market("XAUUSD");
        f.gate.ledger().update_active_markets(["XAUUSD"]);

        let first = f.gate.resolve(&request, ok(json!({"bias": "bullish"}), 800)).unwrap();
        assert_eq!(first.kind(), "fresh");
        assert_eq!(f.gate.ledger().daily_usage().total_tokens, 800);

        let second = f
            .gate
            .resolve(&request, || -> Result<(Value, u64), String> { panic!("must not call") })
            .unwrap();
        assert_eq!(second, Resolution::Cached(json!({"bias": "bullish"})));
    }

    #[test]
    fn test_throttled_falls_back_to_extended_cache() {
        let f = fixture();
        let request = GateRequest::new("news_bias", "news", "gold headlines");
        f.gate.resolve(&request, ok(json!("v1"), 100)).unwrap();

        // past the 1h news TTL; a fresh record blocks the next call
        f.clock.advance_minutes(61);
        f.gate.ledger().record("news_bias", 100, None);

        let resolution = f
            .gate
            .resolve(&request, || -> Result<(Value, u64), String> { panic!("must not call") })
            .unwrap();
        assert_eq!(resolution, Resolution::Stale(json!("v1")));

        // past the 2h extended TTL as well
        f.clock.advance_minutes(60);
        f.gate.ledger().record("news_bias", 100, None);
        let resolution = f
            .gate
            .resolve(&request, || -> Result<(Value, u64), String> { panic!("must not call") })
            .unwrap();
        assert!(matches!(resolution, Resolution::Skipped(Decision::TooSoon { .. })));
    }

    #[test]
    fn test_call_error_passes_through() {
        let f = fixture();
        let request = GateRequest::new("chat", "chat", "hello");

        let err = f
            .gate
            .resolve(&request, || -> Result<(Value, u64), String> { Err("upstream 503".into()) })
            .unwrap_err();
        assert_eq!(err, "upstream 503");
        assert_eq!(f.gate.ledger().daily_usage().requests_count, 0);
        assert!(f.gate.cache().get("hello", "chat", true).is_none());
    }
}
