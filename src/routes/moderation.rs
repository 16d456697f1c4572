// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reports and announcements.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Announcement, Report};
use crate::services::moderation::{AnnouncementRequest, FileReportRequest, ResolveReportRequest};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/reports", post(file_report))
        .route("/api/reports/{id}/resolve", post(resolve_report))
        .route("/api/announcements", post(publish_announcement))
}

async fn file_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<FileReportRequest>,
) -> Result<(StatusCode, Json<Report>)> {
    let report = state.moderation.file_report(&user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn resolve_report(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(report_id): Path<String>,
    Json(request): Json<ResolveReportRequest>,
) -> Result<Json<Report>> {
    Ok(Json(
        state
            .moderation
            .resolve_report(&user.user_id, &report_id, request)
            .await?,
    ))
}

async fn publish_announcement(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<AnnouncementRequest>,
) -> Result<(StatusCode, Json<Announcement>)> {
    let announcement = state
        .moderation
        .publish_announcement(&user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}
