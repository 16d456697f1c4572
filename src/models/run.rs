// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stored run record.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Completed run stored in `runs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RunRecord {
    /// Document ID
    pub id: String,
    /// Owner
    pub user_id: String,
    /// Run title shown on the feed post
    pub title: String,
    /// Start time (ISO 8601)
    pub started_at: String,
    /// Finish time (ISO 8601); also the ordering key
    pub created_at: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub duration_seconds: u64,
    pub distance_meters: f64,
    /// Average pace, absent for zero-distance runs
    pub pace_seconds_per_km: Option<f64>,
    /// Accepted path as a Google encoded polyline (precision 5)
    pub path_polyline: String,
    /// Number of accepted samples
    pub point_count: u32,
}
