//! Request governor - execute/skip decisions
//!
//! Combines three inputs read from the [`CostLedger`]:
//! - the current throttle level
//! - the per-type minimum interval for that level
//! - whether the request's market is in the active set
//!
//! ```text
//! high-priority type ──────────────────────────────▶ interval rule
//! market given, not active ──▶ r < factor(level)·0.2 ─▶ interval rule
//! otherwise ───────────────────────────────────────▶ interval rule
//! ```
//!
//! Decisions never fail; unknown request types are unrestricted. Deciding
//! does not touch the interval clock: only `CostLedger::record` does.

use super::ledger::CostLedger;
use chrono::Duration;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tollgate_foundation::ThrottleLevel;
use tracing::debug;

/// Outcome of one governor check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Execute,
    /// The type's minimum interval has not elapsed yet
    TooSoon { wait_minutes: i64 },
    /// Lost the inactive-market draw
    InactiveMarket,
}

impl Decision {
    pub fn is_execute(&self) -> bool {
        matches!(self, Decision::Execute)
    }
}

pub struct RequestGovernor {
    ledger: Arc<CostLedger>,
    rng: Mutex<StdRng>,
}

impl RequestGovernor {
    pub fn new(ledger: Arc<CostLedger>) -> Self {
        Self {
            ledger,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source (seeded runs)
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    pub fn should_execute(&self, request_type: &str, market: Option<&str>) -> bool {
        self.decide(request_type, market).is_execute()
    }

    pub fn decide(&self, request_type: &str, market: Option<&str>) -> Decision {
        let level = self.ledger.throttle_level();
        let budget = self.ledger.budget();

        if budget.is_high_priority(request_type) {
            return self.check_interval(request_type, level);
        }

        if let Some(market) = market.filter(|m| !m.is_empty()) {
            if !self.ledger.is_market_active(market) {
                let probability = level.factor() * budget.inactive_market_factor;
                let draw: f64 = self.rng.lock().gen();
                if draw >= probability {
                    debug!(request_type, market, %level, probability, "Skipped inactive market");
                    return Decision::InactiveMarket;
                }
            }
        }

        self.check_interval(request_type, level)
    }

    fn check_interval(&self, request_type: &str, level: ThrottleLevel) -> Decision {
        let min_minutes = match self.ledger.policy().min_interval_minutes(request_type, level) {
            Some(0) | None => return Decision::Execute,
            Some(minutes) => minutes,
        };

        let Some(last) = self.ledger.last_request(request_type) else {
            return Decision::Execute;
        };

        let min_interval = Duration::minutes(i64::try_from(min_minutes).unwrap_or(i64::MAX / 60_000));
        let elapsed = self.ledger.clock().now() - last;
        if elapsed >= min_interval {
            Decision::Execute
        } else {
            let wait = min_interval - elapsed;
            debug!(
                request_type,
                %level,
                min_minutes,
                elapsed_minutes = elapsed.num_minutes(),
                "Minimum interval not elapsed"
            );
            Decision::TooSoon {
                wait_minutes: (wait.num_seconds() + 59) / 60,
            }
        }
    }
}
