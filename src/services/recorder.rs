// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run recorder: turns location fixes and clock ticks into a track.
//!
//! State machine: `Idle -> Running <-> Paused -> Finished`. Fixes and ticks
//! only count while running. A fix is accepted when it is the first one or
//! lies more than [`NOISE_THRESHOLD_METERS`] from the last accepted sample;
//! distance is the sum of accepted segments only. Elapsed time follows the
//! injected clock, not the number of ticks.

use crate::models::track::{haversine_meters, FinishedRun, Fix, TrackSample, TrackState};
use crate::time_utils::Clock;
use std::sync::Arc;

/// Movement at or below this distance is treated as GPS jitter.
pub const NOISE_THRESHOLD_METERS: f64 = 1.0;

/// Recorder lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderPhase {
    Idle,
    Running,
    Paused,
    Finished,
}

/// Single-owner run recorder.
pub struct TrackRecorder {
    clock: Arc<dyn Clock>,
    phase: RecorderPhase,
    state: TrackState,
    /// Clock reading at the last tick (or start/resume) while running
    last_tick_millis: Option<i64>,
    elapsed_millis: u64,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished: Option<FinishedRun>,
}

impl TrackRecorder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            phase: RecorderPhase::Idle,
            state: TrackState::default(),
            last_tick_millis: None,
            elapsed_millis: 0,
            started_at: None,
            finished: None,
        }
    }

    pub fn phase(&self) -> RecorderPhase {
        self.phase
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Begin recording. No-op unless idle; a paused recorder is resumed.
    ///
    /// Returns whether the recorder is running afterwards.
    pub fn start(&mut self) -> bool {
        match self.phase {
            RecorderPhase::Idle => {
                self.started_at = Some(self.clock.wall_time());
                self.enter_running();
                true
            }
            RecorderPhase::Paused => self.resume(),
            RecorderPhase::Running => true,
            RecorderPhase::Finished => false,
        }
    }

    /// Offer a fix. Returns whether it was appended to the path.
    ///
    /// Never fails: invalid or sub-threshold fixes are dropped.
    pub fn on_fix(&mut self, fix: Fix) -> bool {
        if self.phase != RecorderPhase::Running || !fix.is_valid() {
            return false;
        }

        let segment = match self.state.path.last() {
            None => 0.0,
            Some(last) => {
                let d = haversine_meters(last, &fix);
                // NaN never passes this comparison either
                if !(d > NOISE_THRESHOLD_METERS) {
                    return false;
                }
                d
            }
        };

        let index = self.state.path.len() as u64;
        self.state.path.push(TrackSample {
            latitude: fix.lat,
            longitude: fix.lon,
            index,
        });
        self.state.distance_meters += segment;
        true
    }

    /// Advance elapsed time by the clock delta since the previous tick.
    pub fn on_tick(&mut self) {
        if self.phase == RecorderPhase::Running {
            self.accumulate();
        }
    }

    /// Stop accepting fixes and ticks; keeps everything recorded so far.
    pub fn pause(&mut self) -> bool {
        if self.phase != RecorderPhase::Running {
            return false;
        }
        self.accumulate();
        self.last_tick_millis = None;
        self.phase = RecorderPhase::Paused;
        self.state.running = false;
        true
    }

    /// Continue a paused recording from the preserved state.
    pub fn resume(&mut self) -> bool {
        if self.phase != RecorderPhase::Paused {
            return false;
        }
        self.enter_running();
        true
    }

    /// Terminal transition. Later calls return the same snapshot.
    pub fn finish(&mut self) -> FinishedRun {
        if let Some(finished) = &self.finished {
            return finished.clone();
        }
        if self.phase == RecorderPhase::Running {
            self.accumulate();
        }
        self.last_tick_millis = None;
        self.phase = RecorderPhase::Finished;
        self.state.running = false;

        let finished = FinishedRun {
            started_at: self.started_at,
            finished_at: self.clock.wall_time(),
            duration_seconds: self.state.elapsed_seconds,
            distance_km: self.state.distance_meters / 1000.0,
            path: self.state.path.clone(),
        };
        self.finished = Some(finished.clone());
        finished
    }

    fn enter_running(&mut self) {
        self.last_tick_millis = Some(self.clock.monotonic_millis());
        self.phase = RecorderPhase::Running;
        self.state.running = true;
    }

    fn accumulate(&mut self) {
        let now = self.clock.monotonic_millis();
        if let Some(last) = self.last_tick_millis {
            // A clock that steps backwards contributes nothing
            self.elapsed_millis += now.saturating_sub(last).max(0) as u64;
        }
        self.last_tick_millis = Some(now);
        self.state.elapsed_seconds = self.elapsed_millis / 1000;
    }
}
