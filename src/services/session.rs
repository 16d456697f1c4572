// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recording sessions: one [`TrackRecorder`] driven by a location provider
//! and a ticker.
//!
//! Fixes and ticks travel through a single queue and are applied by one
//! pump task, in arrival order. Each event is stamped with the session
//! generation when it leaves its source. A pause, resume or finish that
//! changes the recorder phase, under the recorder lock, drops the fixes
//! still waiting in the provider stream and bumps the generation, so
//! nothing delivered before a control operation is applied after it.

use crate::models::{FinishedRun, Fix, TrackState};
use crate::services::location::{
    FixStream, LocationError, LocationProvider, LocationRequest, PushLocationProvider,
};
use crate::services::recorder::{RecorderPhase, TrackRecorder};
use crate::time_utils::Clock;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum SessionEvent {
    Fix { fix: Fix, generation: u64 },
    Tick { generation: u64 },
    Flush(oneshot::Sender<()>),
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: RecorderPhase,
    #[serde(flatten)]
    pub state: TrackState,
}

struct Core {
    recorder: Mutex<TrackRecorder>,
    generation: AtomicU64,
    /// Provider stream; locked together with the generation stamp
    fixes: Mutex<FixStream>,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, TrackRecorder> {
        self.recorder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Next fix from the provider, stamped with the generation current
    /// when it was taken off the stream.
    async fn next_fix(&self) -> Option<(Fix, u64)> {
        std::future::poll_fn(|cx| {
            let mut fixes = self.fixes.lock().unwrap_or_else(PoisonError::into_inner);
            fixes
                .poll_recv(cx)
                .map(|fix| fix.map(|fix| (fix, self.generation())))
        })
        .await
    }

    /// Invalidate every event delivered so far. Caller holds the recorder lock.
    fn cancel_pending(&self) {
        let mut fixes = self.fixes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut dropped = 0;
        while fixes.try_recv().is_ok() {
            dropped += 1;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded fixes queued before a control operation");
        }
    }

    fn apply(&self, event: SessionEvent) {
        match event {
            SessionEvent::Fix { fix, generation } => {
                let mut recorder = self.lock();
                if generation == self.generation() {
                    recorder.on_fix(fix);
                }
            }
            SessionEvent::Tick { generation } => {
                let mut recorder = self.lock();
                if generation == self.generation() {
                    recorder.on_tick();
                }
            }
            SessionEvent::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// A live recording.
pub struct RecordingSession {
    core: Arc<Core>,
    provider: Arc<dyn LocationProvider>,
    flush_requests: mpsc::UnboundedSender<oneshot::Sender<()>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RecordingSession {
    /// Start recording immediately.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        clock: Arc<dyn Clock>,
        provider: Arc<dyn LocationProvider>,
        request: LocationRequest,
        tick_interval: Duration,
    ) -> Result<Self, LocationError> {
        let fixes = provider.start(request)?;

        let mut recorder = TrackRecorder::new(clock);
        recorder.start();
        let core = Arc::new(Core {
            recorder: Mutex::new(recorder),
            generation: AtomicU64::new(0),
            fixes: Mutex::new(fixes),
        });

        let (queue, events) = mpsc::unbounded_channel();
        let (flush_requests, flush_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            tokio::spawn(pump(core.clone(), events)),
            tokio::spawn(forward_fixes(core.clone(), flush_rx, queue.clone())),
            tokio::spawn(ticker(core.clone(), queue, tick_interval)),
        ];

        Ok(Self {
            core,
            provider,
            flush_requests,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let recorder = self.core.lock();
        SessionSnapshot {
            phase: recorder.phase(),
            state: recorder.state().clone(),
        }
    }

    pub fn phase(&self) -> RecorderPhase {
        self.core.lock().phase()
    }

    pub fn pause(&self) -> bool {
        self.control(TrackRecorder::pause)
    }

    pub fn resume(&self) -> bool {
        self.control(TrackRecorder::resume)
    }

    /// Idempotent `start`: resumes a paused recording.
    pub fn restart(&self) -> bool {
        self.control(TrackRecorder::start)
    }

    /// Finish the recording and stop all event sources.
    pub fn finish(&self) -> FinishedRun {
        let finished = self.control(TrackRecorder::finish);
        self.shutdown();
        finished
    }

    /// Wait until every fix delivered so far has been applied.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.flush_requests.send(done).is_ok() {
            let _ = wait.await;
        }
    }

    /// Run a control operation. Only an operation that changes the phase
    /// cancels events in flight; a no-op leaves them alone.
    fn control<R>(&self, op: impl FnOnce(&mut TrackRecorder) -> R) -> R {
        let mut recorder = self.core.lock();
        let before = recorder.phase();
        let result = op(&mut recorder);
        if recorder.phase() != before {
            self.core.cancel_pending();
        }
        result
    }

    fn shutdown(&self) {
        self.provider.stop();
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump(core: Arc<Core>, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        core.apply(event);
    }
}

async fn forward_fixes(
    core: Arc<Core>,
    mut flush_rx: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    queue: mpsc::UnboundedSender<SessionEvent>,
) {
    loop {
        // Fixes first, so a flush follows everything already pushed
        let event = tokio::select! {
            biased;
            Some((fix, generation)) = core.next_fix() => SessionEvent::Fix { fix, generation },
            Some(done) = flush_rx.recv() => SessionEvent::Flush(done),
            else => break,
        };
        if queue.send(event).is_err() {
            break;
        }
    }
}

async fn ticker(core: Arc<Core>, queue: mpsc::UnboundedSender<SessionEvent>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let tick = SessionEvent::Tick {
            generation: core.generation(),
        };
        if queue.send(tick).is_err() {
            break;
        }
    }
}

/// A user's in-progress run and the provider its client pushes fixes into.
pub struct ActiveRun {
    pub session: RecordingSession,
    pub location: Arc<PushLocationProvider>,
    /// Held while the run is being finished and saved
    pub finishing: tokio::sync::Mutex<()>,
}

/// Active runs keyed by user ID. At most one run per user.
pub struct SessionRegistry {
    clock: Arc<dyn Clock>,
    request: LocationRequest,
    tick_interval: Duration,
    runs: DashMap<String, Arc<ActiveRun>>,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>, request: LocationRequest, tick_interval: Duration) -> Self {
        Self {
            clock,
            request,
            tick_interval,
            runs: DashMap::new(),
        }
    }

    /// Start a run for `user_id`, or return the one already in progress
    /// (resuming it if paused).
    pub fn begin(&self, user_id: &str) -> Result<Arc<ActiveRun>, LocationError> {
        match self.runs.entry(user_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let run = entry.get().clone();
                run.session.restart();
                Ok(run)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let location = Arc::new(PushLocationProvider::new());
                let session = RecordingSession::start(
                    self.clock.clone(),
                    location.clone(),
                    self.request,
                    self.tick_interval,
                )?;
                tracing::info!(user_id = %user_id, "Run recording started");
                let run = Arc::new(ActiveRun {
                    session,
                    location,
                    finishing: tokio::sync::Mutex::new(()),
                });
                entry.insert(run.clone());
                Ok(run)
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<ActiveRun>> {
        self.runs.get(user_id).map(|r| r.value().clone())
    }

    /// Detach the user's run; its session stops once the last reference goes.
    pub fn remove(&self, user_id: &str) -> Option<Arc<ActiveRun>> {
        self.runs.remove(user_id).map(|(_, run)| run)
    }

    /// Whether `run` is still the user's registered run.
    pub fn is_current(&self, user_id: &str, run: &Arc<ActiveRun>) -> bool {
        self.runs
            .get(user_id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), run))
    }

    /// Detach `run` only if it is still the user's registered run.
    pub fn remove_if_current(&self, user_id: &str, run: &Arc<ActiveRun>) -> bool {
        self.runs
            .remove_if(user_id, |_, current| Arc::ptr_eq(current, run))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
