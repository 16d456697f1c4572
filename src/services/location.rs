// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Location providers.
//!
//! A provider is started with a [`LocationRequest`] and yields a stream of
//! fixes until stopped. The server has no GPS of its own, so
//! [`PushLocationProvider`] is fed by clients over HTTP and applies the
//! requested interval and distance throttling itself.

use crate::models::Fix;
use geo::{Distance, Haversine, Point};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Delivery constraints for a provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRequest {
    /// Minimum time between delivered fixes
    pub min_interval: Duration,
    /// Minimum movement between delivered fixes (meters)
    pub min_distance_m: f64,
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            min_distance_m: 0.0,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LocationError {
    #[error("Location updates already started")]
    AlreadyStarted,

    #[error("Location updates not started")]
    NotStarted,
}

pub type FixStream = mpsc::UnboundedReceiver<Fix>;

/// Source of location fixes. Must be explicitly started and stopped.
pub trait LocationProvider: Send + Sync {
    fn start(&self, request: LocationRequest) -> Result<FixStream, LocationError>;

    /// Stop delivering fixes; the stream ends. Idempotent.
    fn stop(&self);
}

struct Active {
    request: LocationRequest,
    sender: mpsc::UnboundedSender<Fix>,
    last_delivered: Option<Fix>,
}

/// Provider fed by [`push`](PushLocationProvider::push).
#[derive(Default)]
pub struct PushLocationProvider {
    active: Mutex<Option<Active>>,
}

impl PushLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Offer a fix. Returns whether it passed throttling and was delivered.
    ///
    /// Invalid fixes are delivered as-is; the recorder discards them.
    pub fn push(&self, fix: Fix) -> Result<bool, LocationError> {
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let active = guard.as_mut().ok_or(LocationError::NotStarted)?;

        if fix.is_valid() {
            if let Some(last) = &active.last_delivered {
                if !passes_throttle(&active.request, last, &fix) {
                    return Ok(false);
                }
            }
            active.last_delivered = Some(fix);
        }

        if active.sender.send(fix).is_err() {
            // Consumer went away
            *guard = None;
            return Err(LocationError::NotStarted);
        }
        Ok(true)
    }
}

fn passes_throttle(request: &LocationRequest, last: &Fix, fix: &Fix) -> bool {
    let min_interval = i64::try_from(request.min_interval.as_millis()).unwrap_or(i64::MAX);
    // Client clocks are untrusted; an unrepresentable gap fails throttling
    match fix.timestamp_millis.checked_sub(last.timestamp_millis) {
        Some(gap) if gap >= min_interval => {}
        _ => return false,
    }
    if request.min_distance_m > 0.0 {
        let moved = Haversine.distance(Point::new(last.lon, last.lat), Point::new(fix.lon, fix.lat));
        if moved < request.min_distance_m {
            return false;
        }
    }
    true
}

impl LocationProvider for PushLocationProvider {
    fn start(&self, request: LocationRequest) -> Result<FixStream, LocationError> {
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Err(LocationError::AlreadyStarted);
        }
        let (sender, stream) = mpsc::unbounded_channel();
        *guard = Some(Active {
            request,
            sender,
            last_delivered: None,
        });
        tracing::debug!(?request, "Location updates started");
        Ok(stream)
    }

    fn stop(&self) {
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            tracing::debug!("Location updates stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(interval_ms: u64, distance: f64) -> LocationRequest {
        LocationRequest {
            min_interval: Duration::from_millis(interval_ms),
            min_distance_m: distance,
        }
    }

    #[test]
    fn test_push_requires_start() {
        let provider = PushLocationProvider::new();
        assert_eq!(
            provider.push(Fix::new(0.0, 0.0, 0)),
            Err(LocationError::NotStarted)
        );
    }

    #[test]
    fn test_double_start_rejected() {
        let provider = PushLocationProvider::new();
        let _stream = provider.start(request(0, 0.0)).unwrap();
        assert!(matches!(
            provider.start(request(0, 0.0)),
            Err(LocationError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_interval_throttling() {
        let provider = PushLocationProvider::new();
        let mut stream = provider.start(request(1000, 0.0)).unwrap();

        assert_eq!(provider.push(Fix::new(0.0, 0.0, 0)), Ok(true));
        assert_eq!(provider.push(Fix::new(0.001, 0.0, 400)), Ok(false));
        assert_eq!(provider.push(Fix::new(0.002, 0.0, 1000)), Ok(true));

        assert_eq!(stream.recv().await.unwrap().timestamp_millis, 0);
        assert_eq!(stream.recv().await.unwrap().timestamp_millis, 1000);
    }

    #[test]
    fn test_distance_throttling() {
        let provider = PushLocationProvider::new();
        let _stream = provider.start(request(0, 50.0)).unwrap();

        assert_eq!(provider.push(Fix::new(0.0, 0.0, 0)), Ok(true));
        // ~11 m
        assert_eq!(provider.push(Fix::new(0.0001, 0.0, 1000)), Ok(false));
        // ~111 m
        assert_eq!(provider.push(Fix::new(0.001, 0.0, 2000)), Ok(true));
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let provider = PushLocationProvider::new();
        let _stream = provider.start(request(1000, 0.0)).unwrap();

        assert_eq!(provider.push(Fix::new(0.0, 0.0, -1)), Ok(true));
        assert_eq!(provider.push(Fix::new(0.001, 0.0, i64::MAX)), Ok(false));

        let provider = PushLocationProvider::new();
        let _stream = provider.start(request(1000, 0.0)).unwrap();
        assert_eq!(provider.push(Fix::new(0.0, 0.0, i64::MAX)), Ok(true));
        assert_eq!(provider.push(Fix::new(0.001, 0.0, i64::MIN)), Ok(false));
    }

    #[tokio::test]
    async fn test_stop_ends_stream() {
        let provider = PushLocationProvider::new();
        let mut stream = provider.start(request(0, 0.0)).unwrap();
        provider.stop();
        provider.stop();
        assert!(stream.recv().await.is_none());
        assert!(!provider.is_started());
    }
}
