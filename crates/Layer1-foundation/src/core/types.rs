//! Core Types - shared across layers
//!
//! Types the configuration layer needs to name before the budget engine in
//! Layer2 gives them behavior.

use serde::{Deserialize, Serialize};

// ============================================================================
// Throttle Level
// ============================================================================

/// Discrete tier controlling how aggressively non-essential requests are
/// suppressed
///
/// Derived from the percentage of the daily budget spent so far:
///
/// | percent      | level    |
/// |--------------|----------|
/// | `< 50`       | normal   |
/// | `< 75`       | light    |
/// | `< 90`       | moderate |
/// | `< 100`      | heavy    |
/// | otherwise    | critical |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleLevel {
    #[default]
    Normal,
    Light,
    Moderate,
    Heavy,
    Critical,
}

impl ThrottleLevel {
    /// All levels, least to most restrictive
    pub const ALL: [ThrottleLevel; 5] = [
        ThrottleLevel::Normal,
        ThrottleLevel::Light,
        ThrottleLevel::Moderate,
        ThrottleLevel::Heavy,
        ThrottleLevel::Critical,
    ];

    /// Level for a spend percentage (no hysteresis)
    ///
    /// NaN compares false against every breakpoint and lands on `Critical`.
    pub fn from_percent(percent: f64) -> Self {
        if percent < 50.0 {
            ThrottleLevel::Normal
        } else if percent < 75.0 {
            ThrottleLevel::Light
        } else if percent < 90.0 {
            ThrottleLevel::Moderate
        } else if percent < 100.0 {
            ThrottleLevel::Heavy
        } else {
            ThrottleLevel::Critical
        }
    }

    /// Level for a daily cost against a daily limit
    pub fn from_cost(daily_cost: f64, daily_limit: f64) -> Self {
        Self::from_percent(percent_of_limit(daily_cost, daily_limit))
    }

    /// Execution probability multiplier used for inactive markets
    pub fn factor(&self) -> f64 {
        match self {
            ThrottleLevel::Normal => 1.0,
            ThrottleLevel::Light => 0.5,
            ThrottleLevel::Moderate => 0.3,
            ThrottleLevel::Heavy => 0.1,
            ThrottleLevel::Critical => 0.05,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleLevel::Normal => "normal",
            ThrottleLevel::Light => "light",
            ThrottleLevel::Moderate => "moderate",
            ThrottleLevel::Heavy => "heavy",
            ThrottleLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ThrottleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThrottleLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::InvalidInput(format!("unknown throttle level: {}", s)))
    }
}

/// `daily_cost / daily_limit * 100`
///
/// A non-positive limit leaves no budget at all: any spend is infinite
/// percent, zero spend is zero percent.
pub fn percent_of_limit(daily_cost: f64, daily_limit: f64) -> f64 {
    if daily_limit > 0.0 {
        daily_cost / daily_limit * 100.0
    } else if daily_cost > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}
