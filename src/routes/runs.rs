// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run recording routes.
//!
//! The client's GPS pushes fixes in batches; the server owns the recorder,
//! its clock and its ticker.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Fix, RunRecord};
use crate::services::location::LocationError;
use crate::services::recorder::RecorderPhase;
use crate::services::runs::run_to_geojson;
use crate::services::session::{ActiveRun, SessionSnapshot};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Most fixes accepted in one upload.
const MAX_FIXES_PER_BATCH: usize = 500;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/runs/start", post(start_run))
        .route("/api/runs/fixes", post(push_fixes))
        .route("/api/runs/pause", post(pause_run))
        .route("/api/runs/resume", post(resume_run))
        .route("/api/runs/finish", post(finish_run))
        .route("/api/runs/current", get(current_run).delete(discard_run))
        .route("/api/runs/{id}/geojson", get(run_geojson))
}

fn active_run(state: &AppState, user_id: &str) -> Result<Arc<ActiveRun>> {
    state
        .sessions
        .get(user_id)
        .ok_or_else(|| AppError::NotFound("No run in progress".to_string()))
}

async fn start_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SessionSnapshot>> {
    let run = state
        .sessions
        .begin(&user.user_id)
        .map_err(|e| AppError::Conflict(e.to_string()))?;
    if run.session.phase() == RecorderPhase::Finished {
        return Err(AppError::Conflict(
            "Previous run is not saved yet; finish or discard it".to_string(),
        ));
    }
    Ok(Json(run.session.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct FixBatch {
    pub fixes: Vec<Fix>,
}

#[derive(Serialize)]
pub struct FixBatchResponse {
    /// Fixes that passed provider throttling
    pub delivered: usize,
    pub run: SessionSnapshot,
}

/// Feed a batch of fixes, in order, into the active run.
async fn push_fixes(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(batch): Json<FixBatch>,
) -> Result<Json<FixBatchResponse>> {
    if batch.fixes.len() > MAX_FIXES_PER_BATCH {
        return Err(AppError::BadRequest(format!(
            "At most {} fixes per batch",
            MAX_FIXES_PER_BATCH
        )));
    }
    let run = active_run(&state, &user.user_id)?;

    let mut delivered = 0;
    for fix in batch.fixes {
        match run.location.push(fix) {
            Ok(true) => delivered += 1,
            Ok(false) => {}
            Err(LocationError::NotStarted) => {
                return Err(AppError::Conflict("Run is no longer recording".to_string()))
            }
            Err(e) => return Err(AppError::Conflict(e.to_string())),
        }
    }
    run.session.flush().await;

    Ok(Json(FixBatchResponse {
        delivered,
        run: run.session.snapshot(),
    }))
}

async fn pause_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SessionSnapshot>> {
    let run = active_run(&state, &user.user_id)?;
    if !run.session.pause() {
        return Err(AppError::Conflict("Run is not recording".to_string()));
    }
    Ok(Json(run.session.snapshot()))
}

async fn resume_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SessionSnapshot>> {
    let run = active_run(&state, &user.user_id)?;
    if !run.session.resume() {
        return Err(AppError::Conflict("Run is not paused".to_string()));
    }
    Ok(Json(run.session.snapshot()))
}

async fn current_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SessionSnapshot>> {
    Ok(Json(active_run(&state, &user.user_id)?.session.snapshot()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct FinishRequest {
    #[validate(length(max = 100))]
    pub title: Option<String>,
    /// Persist the run and post it to the feed
    #[serde(default = "default_save")]
    pub save: bool,
}

fn default_save() -> bool {
    true
}

#[derive(Serialize)]
pub struct FinishResponse {
    pub duration_seconds: u64,
    pub distance_km: f64,
    pub pace_seconds_per_km: Option<f64>,
    pub point_count: usize,
    /// Stored record, when saved
    pub saved: Option<RunRecord>,
}

/// Finish the active run and optionally save it.
///
/// Runs without any accepted fix are never saved. The run stays registered
/// until it is stored, so a failed save can be retried with another finish.
async fn finish_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<FinishRequest>>,
) -> Result<Json<FinishResponse>> {
    let request = match body {
        Some(Json(request)) => request,
        None => FinishRequest {
            title: None,
            save: true,
        },
    };
    request.validate()?;

    let run = active_run(&state, &user.user_id)?;
    let _finishing = run.finishing.lock().await;
    if !state.sessions.is_current(&user.user_id, &run) {
        return Err(AppError::NotFound("No run in progress".to_string()));
    }
    let finished = run.session.finish();

    let saved = if request.save && !finished.path.is_empty() {
        let record = state
            .runs
            .save_run(&user.user_id, &finished, request.title.as_deref())
            .await
            .inspect_err(|e| {
                tracing::warn!(user_id = %user.user_id, error = %e, "Run save failed; kept for retry");
            })?;
        Some(record)
    } else {
        None
    };
    state.sessions.remove_if_current(&user.user_id, &run);

    tracing::info!(
        user_id = %user.user_id,
        distance_km = finished.distance_km,
        duration_s = finished.duration_seconds,
        saved = saved.is_some(),
        "Run finished"
    );
    Ok(Json(FinishResponse {
        duration_seconds: finished.duration_seconds,
        distance_km: finished.distance_km,
        pace_seconds_per_km: finished.pace_seconds_per_km(),
        point_count: finished.path.len(),
        saved,
    }))
}

/// Throw away the active run without saving.
async fn discard_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode> {
    let run = state
        .sessions
        .remove(&user.user_id)
        .ok_or_else(|| AppError::NotFound("No run in progress".to_string()))?;
    run.session.finish();
    tracing::info!(user_id = %user.user_id, "Run discarded");
    Ok(StatusCode::NO_CONTENT)
}

/// Export a run path. Only the owner, or viewers of a post sharing the run,
/// can see it.
async fn run_geojson(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(run_id): Path<String>,
) -> Result<Json<geojson::Feature>> {
    let run = state.runs.get_visible_run(&run_id, &user.user_id).await?;
    Ok(Json(run_to_geojson(&run)?))
}
