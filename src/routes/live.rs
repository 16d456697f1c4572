// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live list views over Server-Sent Events.
//!
//! `GET /api/live/{view}?dimension=value&...` streams one `state` event per
//! published projection: the complete list each time, or a failure carrying
//! the last good list.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::services::views::LiveView;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::stream::{Stream, StreamExt};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/live/{view}", get(live_view))
}

async fn live_view(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(view): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let view = LiveView::parse(&view, &params)?;
    if view.requires_admin() {
        state.moderation.require_admin(&user.user_id).await?;
    }
    if let Some(thread_id) = view.required_chat() {
        state.chats.require_participant(thread_id, &user.user_id).await?;
    }

    let states = view.open(&state.projector, &user.user_id, &params).await?;
    tracing::debug!(user_id = %user.user_id, view = ?view, "Live view opened");

    let events = states.map(|value| Event::default().event("state").json_data(value));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
