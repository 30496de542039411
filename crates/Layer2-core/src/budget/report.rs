//! Usage report - read-only snapshot for dashboards and the CLI

use super::ledger::{DayBucket, MonthBucket, ThrottleRecord};
use serde::Serialize;
use tollgate_foundation::percent_of_limit;

/// Today's totals against the daily limit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub total_tokens: u64,
    pub estimated_cost: f64,
    pub requests_count: u64,
    pub daily_limit: f64,
    pub percent_of_limit: f64,
}

impl DailySummary {
    pub fn new(day: &DayBucket, daily_limit: f64) -> Self {
        Self {
            total_tokens: day.total_tokens,
            estimated_cost: day.estimated_cost,
            requests_count: day.requests_count,
            daily_limit,
            percent_of_limit: percent_of_limit(day.estimated_cost, daily_limit),
        }
    }

    /// Budget left today (never negative)
    pub fn remaining(&self) -> f64 {
        (self.daily_limit - self.estimated_cost).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub daily: DailySummary,
    pub monthly: MonthBucket,
    pub throttling: ThrottleRecord,
    pub active_markets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_summary() {
        let day = DayBucket {
            total_tokens: 10_000,
            estimated_cost: 4.0,
            requests_count: 3,
            ..Default::default()
        };
        let summary = DailySummary::new(&day, 5.0);

        assert_eq!(summary.percent_of_limit, 80.0);
        assert_eq!(summary.remaining(), 1.0);
        assert_eq!(DailySummary::new(&day, 2.0).remaining(), 0.0);
    }

    #[test]
    fn test_report_serializes_flat_sections() {
        let report = UsageReport {
            daily: DailySummary::new(&DayBucket::default(), 5.0),
            monthly: MonthBucket::default(),
            throttling: ThrottleRecord::default(),
            active_markets: vec!["XAUUSD".into()],
        };
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["daily"]["percent_of_limit"], 0.0);
        assert_eq!(json["throttling"]["current_level"], "normal");
        assert_eq!(json["active_markets"][0], "XAUUSD");
        assert!(json["monthly"].get("total_tokens").is_some());
    }
}
