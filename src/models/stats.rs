//! User run statistics aggregates.
//!
//! These aggregates are updated in the same batch that saves a run, so a
//! profile screen reads one document instead of every run.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::RunRecord;

/// Pre-computed statistics for a user.
///
/// Stored at: `user_stats/{user_id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    // ─── Totals ──────────────────────────────────────────────────
    /// Total runs saved
    #[serde(default)]
    pub total_runs: u32,
    /// Total distance across all runs (meters)
    #[serde(default)]
    pub total_distance_meters: f64,
    /// Total moving time across all runs (seconds)
    #[serde(default)]
    pub total_duration_seconds: u64,
    /// Longest single run (meters)
    #[serde(default)]
    pub longest_run_meters: f64,

    // ─── Time Series ─────────────────────────────────────────────
    /// Run count per month ("YYYY-MM" format)
    #[serde(default)]
    pub runs_by_month: HashMap<String, u32>,
    /// Distance per month ("YYYY-MM" format, meters)
    #[serde(default)]
    pub distance_by_month: HashMap<String, f64>,
    /// Run count per year ("YYYY" format)
    #[serde(default)]
    pub runs_by_year: HashMap<String, u32>,

    // ─── Idempotency ─────────────────────────────────────────────
    /// Set of counted run IDs (for duplicate detection)
    #[serde(default)]
    pub processed_run_ids: HashSet<String>,

    // ─── Metadata ────────────────────────────────────────────────
    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl UserStats {
    /// Fold a saved run into the aggregate.
    ///
    /// Returns `false` if the run was already counted.
    pub fn update_from_run(&mut self, run: &RunRecord, now: &str) -> bool {
        if !self.processed_run_ids.insert(run.id.clone()) {
            return false;
        }
        self.updated_at = now.to_string();

        self.total_runs += 1;
        self.total_distance_meters += run.distance_meters;
        self.total_duration_seconds += run.duration_seconds;
        if run.distance_meters > self.longest_run_meters {
            self.longest_run_meters = run.distance_meters;
        }

        // Bucket by the run's start date
        if let Some(month_key) = extract_month_key(&run.started_at) {
            *self.runs_by_month.entry(month_key.clone()).or_insert(0) += 1;
            *self.distance_by_month.entry(month_key).or_insert(0.0) += run.distance_meters;
        }
        if let Some(year_key) = extract_year_key(&run.started_at) {
            *self.runs_by_year.entry(year_key).or_insert(0) += 1;
        }

        true
    }
}

/// Extract "YYYY-MM" from an ISO 8601 date string.
fn extract_month_key(date: &str) -> Option<String> {
    // ISO 8601: "2024-01-15T10:30:00Z" -> "2024-01"
    date.get(..7).map(str::to_string)
}

/// Extract "YYYY" from an ISO 8601 date string.
fn extract_year_key(date: &str) -> Option<String> {
    date.get(..4).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_run(id: &str, date: &str, distance: f64, duration: u64) -> RunRecord {
        RunRecord {
            id: id.to_string(),
            user_id: "runner".to_string(),
            title: format!("Run {}", id),
            started_at: date.to_string(),
            created_at: date.to_string(),
            duration_seconds: duration,
            distance_meters: distance,
            pace_seconds_per_km: None,
            path_polyline: String::new(),
            point_count: 0,
        }
    }

    #[test]
    fn test_update_from_run_basic() {
        let mut stats = UserStats::default();
        let run = make_run("r1", "2024-01-15T10:00:00Z", 5000.0, 1500);

        assert!(stats.update_from_run(&run, "2024-01-15T12:00:00Z"));
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.total_distance_meters, 5000.0);
        assert_eq!(stats.total_duration_seconds, 1500);
        assert_eq!(stats.runs_by_month.get("2024-01"), Some(&1));
        assert_eq!(stats.distance_by_month.get("2024-01"), Some(&5000.0));
        assert_eq!(stats.runs_by_year.get("2024"), Some(&1));
    }

    #[test]
    fn test_idempotency_skips_duplicate() {
        let mut stats = UserStats::default();
        let run = make_run("r1", "2024-01-15T10:00:00Z", 5000.0, 1500);

        stats.update_from_run(&run, "2024-01-15T12:00:00Z");
        let counted_again = stats.update_from_run(&run, "2024-01-15T13:00:00Z");

        assert!(!counted_again);
        assert_eq!(stats.total_runs, 1); // Not incremented twice
        assert_eq!(stats.updated_at, "2024-01-15T12:00:00Z");
    }

    #[test]
    fn test_longest_run_tracking() {
        let mut stats = UserStats::default();
        stats.update_from_run(&make_run("a", "2024-01-10T10:00:00Z", 8000.0, 2400), "now");
        stats.update_from_run(&make_run("b", "2024-02-20T10:00:00Z", 3000.0, 900), "now");

        assert_eq!(stats.longest_run_meters, 8000.0);
        assert_eq!(stats.runs_by_month.len(), 2);
    }

    #[test]
    fn test_short_date_is_not_bucketed() {
        let mut stats = UserStats::default();
        stats.update_from_run(&make_run("a", "2024", 100.0, 60), "now");
        assert!(stats.runs_by_month.is_empty());
        assert_eq!(stats.runs_by_year.get("2024"), Some(&1));
    }
}
