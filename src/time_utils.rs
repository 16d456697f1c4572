// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and the injectable clock.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as an RFC3339 string.
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

/// Time source for the run recorder.
///
/// `monotonic_millis` drives elapsed-time accounting and must never go
/// backwards; `wall_time` only stamps start/finish times on a run.
pub trait Clock: Send + Sync {
    fn monotonic_millis(&self) -> i64;
    fn wall_time(&self) -> DateTime<Utc>;
}

/// Real clock backed by `Instant` and `chrono::Utc`.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_millis(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and benchmarks.
#[derive(Debug)]
pub struct ManualClock {
    base: DateTime<Utc>,
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            millis: AtomicI64::new(0),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn monotonic_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn wall_time(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::milliseconds(self.monotonic_millis())
    }
}
