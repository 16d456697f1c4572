// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run-tracking data: raw fixes, accepted samples, live state and the
//! finished-run snapshot.

use chrono::{DateTime, Utc};
use geo::{Coord, Distance, Haversine, LineString, Point};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// One raw location update from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub timestamp_millis: i64,
}

impl Fix {
    pub fn new(lat: f64, lon: f64, timestamp_millis: i64) -> Self {
        Self {
            lat,
            lon,
            timestamp_millis,
        }
    }

    /// Finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// An accepted point of the run path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrackSample {
    pub latitude: f64,
    pub longitude: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub index: u64,
}

impl TrackSample {
    fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Great-circle distance in meters between an accepted sample and a fix.
pub fn haversine_meters(from: &TrackSample, to: &Fix) -> f64 {
    Haversine.distance(from.point(), Point::new(to.lon, to.lat))
}

/// Live recorder state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TrackState {
    pub running: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub elapsed_seconds: u64,
    pub distance_meters: f64,
    pub path: Vec<TrackSample>,
}

/// Immutable summary of a completed recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedRun {
    /// When recording first started (None if it never started)
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub distance_km: f64,
    pub path: Vec<TrackSample>,
}

impl FinishedRun {
    pub fn distance_meters(&self) -> f64 {
        self.distance_km * 1000.0
    }

    /// Average pace in seconds per kilometer, if any distance was covered.
    pub fn pace_seconds_per_km(&self) -> Option<f64> {
        (self.distance_km > 0.0).then(|| self.duration_seconds as f64 / self.distance_km)
    }

    /// Path as a geo line string (x = longitude, y = latitude).
    pub fn line_string(&self) -> LineString<f64> {
        self.path
            .iter()
            .map(|s| Coord {
                x: s.longitude,
                y: s.latitude,
            })
            .collect()
    }

    /// Path as a Google encoded polyline (precision 5).
    pub fn encoded_path(&self) -> Result<String, String> {
        polyline::encode_coordinates(self.line_string(), 5).map_err(|e| e.to_string())
    }
}
