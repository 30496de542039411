//! Budget Configuration - daily spend limit and pricing
//!
//! The ledger turns token counts into an estimated cost with
//! `token_cost_per_1k`; the throttle level is derived from that cost as a
//! percentage of `daily_cost_limit`.

use serde::{Deserialize, Serialize};

/// Environment variable overriding the daily limit
pub const DAILY_LIMIT_ENV: &str = "TOLLGATE_DAILY_LIMIT";

/// Budget settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Daily cost limit (USD)
    #[serde(default = "default_daily_cost_limit")]
    pub daily_cost_limit: f64,

    /// Estimated cost per 1K tokens (USD)
    #[serde(default = "default_token_cost_per_1k")]
    pub token_cost_per_1k: f64,

    /// Request types that skip budget gating (interval rule still applies)
    #[serde(default = "default_high_priority_types")]
    pub high_priority_types: Vec<String>,

    /// Extra execution probability multiplier for markets outside the
    /// active set
    #[serde(default = "default_inactive_market_factor")]
    pub inactive_market_factor: f64,
}

fn default_daily_cost_limit() -> f64 {
    5.0
}
fn default_token_cost_per_1k() -> f64 {
    0.0002
}
fn default_high_priority_types() -> Vec<String> {
    vec!["chat".to_string()]
}
fn default_inactive_market_factor() -> f64 {
    0.2
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_cost_limit: default_daily_cost_limit(),
            token_cost_per_1k: default_token_cost_per_1k(),
            high_priority_types: default_high_priority_types(),
            inactive_market_factor: default_inactive_market_factor(),
        }
    }
}

impl BudgetConfig {
    /// Same defaults with a different daily limit
    pub fn with_daily_limit(limit: f64) -> Self {
        Self {
            daily_cost_limit: limit,
            ..Default::default()
        }
    }

    /// Estimated cost of `tokens`
    pub fn cost_of(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.token_cost_per_1k
    }

    pub fn is_high_priority(&self, request_type: &str) -> bool {
        self.high_priority_types.iter().any(|t| t == request_type)
    }

    /// A usable daily limit is finite and strictly positive
    pub fn is_valid_limit(limit: f64) -> bool {
        limit.is_finite() && limit > 0.0
    }

    /// Apply `TOLLGATE_DAILY_LIMIT` when set to a valid number
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(DAILY_LIMIT_ENV) {
            match raw.trim().parse::<f64>() {
                Ok(limit) if Self::is_valid_limit(limit) => self.daily_cost_limit = limit,
                _ => tracing::warn!(value = %raw, "Ignoring invalid {}", DAILY_LIMIT_ENV),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_of() {
        let config = BudgetConfig {
            token_cost_per_1k: 0.2,
            ..Default::default()
        };
        assert!((config.cost_of(12_500) - 2.5).abs() < 1e-12);
        assert_eq!(config.cost_of(0), 0.0);
    }

    #[test]
    fn test_high_priority() {
        let config = BudgetConfig::default();
        assert!(config.is_high_priority("chat"));
        assert!(!config.is_high_priority("news_bias"));
    }

    #[test]
    fn test_limit_validation() {
        assert!(BudgetConfig::is_valid_limit(5.0));
        assert!(!BudgetConfig::is_valid_limit(0.0));
        assert!(!BudgetConfig::is_valid_limit(-1.0));
        assert!(!BudgetConfig::is_valid_limit(f64::NAN));
        assert!(!BudgetConfig::is_valid_limit(f64::INFINITY));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BudgetConfig = serde_json::from_str(r#"{"daily_cost_limit": 12.0}"#).unwrap();
        assert_eq!(config.daily_cost_limit, 12.0);
        assert_eq!(config.token_cost_per_1k, 0.0002);
        assert_eq!(config.high_priority_types, vec!["chat".to_string()]);
    }
}
