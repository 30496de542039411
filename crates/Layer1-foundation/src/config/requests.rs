//! Request type policy - per-type token estimates and minimum intervals
//!
//! Each request type carries an interval table indexed by throttle level.
//! `0` minutes means unrestricted. Types missing from the table are always
//! allowed.

use crate::core::ThrottleLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Token estimate used for types not in the table
pub const UNKNOWN_TYPE_AVG_TOKENS: u64 = 500;

/// Minimum minutes between requests, per throttle level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntervalTable {
    #[serde(default)]
    pub normal: u64,
    #[serde(default)]
    pub light: u64,
    #[serde(default)]
    pub moderate: u64,
    #[serde(default)]
    pub heavy: u64,
    #[serde(default)]
    pub critical: u64,
}

impl IntervalTable {
    pub const fn new(normal: u64, light: u64, moderate: u64, heavy: u64, critical: u64) -> Self {
        Self {
            normal,
            light,
            moderate,
            heavy,
            critical,
        }
    }

    /// Minimum interval in minutes at `level`
    pub fn minutes(&self, level: ThrottleLevel) -> u64 {
        match level {
            ThrottleLevel::Normal => self.normal,
            ThrottleLevel::Light => self.light,
            ThrottleLevel::Moderate => self.moderate,
            ThrottleLevel::Heavy => self.heavy,
            ThrottleLevel::Critical => self.critical,
        }
    }
}

/// Static description of one request type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTypeConfig {
    /// Average tokens per request
    pub avg_tokens: u64,
    /// Relative importance (0-1)
    pub importance: f64,
    /// Minimum interval per level
    pub interval_minutes: IntervalTable,
}

/// Table of known request types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestPolicy {
    types: BTreeMap<String, RequestTypeConfig>,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        let mut types = BTreeMap::new();
        types.insert(
            "news_bias".to_string(),
            RequestTypeConfig {
                avg_tokens: 800,
                importance: 0.8,
                interval_minutes: IntervalTable::new(60, 120, 240, 480, 720),
            },
        );
        types.insert(
            "pattern_recognition".to_string(),
            RequestTypeConfig {
                avg_tokens: 1200,
                importance: 0.7,
                interval_minutes: IntervalTable::new(60, 120, 240, 480, 720),
            },
        );
        types.insert(
            "portfolio_optimization".to_string(),
            RequestTypeConfig {
                avg_tokens: 2000,
                importance: 0.6,
                interval_minutes: IntervalTable::new(240, 480, 720, 1440, 2880),
            },
        );
        types.insert(
            "scenario_analysis".to_string(),
            RequestTypeConfig {
                avg_tokens: 3000,
                importance: 0.5,
                interval_minutes: IntervalTable::new(360, 720, 1440, 2880, 4320),
            },
        );
        // direct user interaction, only rate-limited when the budget is tight
        types.insert(
            "chat".to_string(),
            RequestTypeConfig {
                avg_tokens: 1000,
                importance: 0.9,
                interval_minutes: IntervalTable::new(0, 0, 0, 2, 5),
            },
        );
        Self { types }
    }
}

impl RequestPolicy {
    pub fn get(&self, request_type: &str) -> Option<&RequestTypeConfig> {
        self.types.get(request_type)
    }

    /// Minimum interval for a type at a level (`None` for unknown types)
    pub fn min_interval_minutes(&self, request_type: &str, level: ThrottleLevel) -> Option<u64> {
        self.get(request_type)
            .map(|config| config.interval_minutes.minutes(level))
    }

    /// Average tokens for a type (unknown types use a flat estimate)
    pub fn avg_tokens(&self, request_type: &str) -> u64 {
        self.get(request_type)
            .map(|config| config.avg_tokens)
            .unwrap_or(UNKNOWN_TYPE_AVG_TOKENS)
    }
}
