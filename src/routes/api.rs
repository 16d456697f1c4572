// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile routes for authenticated users.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{User, UserStats};
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/me", get(get_me))
}

/// Current user response.
#[derive(Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub stats: StatsSummary,
    /// Whether a run is being recorded right now
    pub recording: bool,
}

#[derive(Serialize)]
pub struct StatsSummary {
    pub total_runs: u32,
    pub total_distance_meters: f64,
    pub total_duration_seconds: u64,
    pub longest_run_meters: f64,
}

impl From<UserStats> for StatsSummary {
    fn from(stats: UserStats) -> Self {
        Self {
            total_runs: stats.total_runs,
            total_distance_meters: stats.total_distance_meters,
            total_duration_seconds: stats.total_duration_seconds,
            longest_run_meters: stats.longest_run_meters,
        }
    }
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let profile = state.users.get(&user.user_id).await?;
    let stats = state.runs.stats(&user.user_id).await?;

    Ok(Json(MeResponse {
        user: profile,
        stats: stats.into(),
        recording: state.sessions.get(&user.user_id).is_some(),
    }))
}
