// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{ChatThread, Message};
use crate::services::chat::{CreateThreadRequest, SendMessageRequest};
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
        .route("/api/chats", post(create_thread))
        .route(
            "/api/chats/{id}/messages",
            post(send_message).get(list_messages),
        )
        .route("/api/chats/{id}/read", post(mark_read))
}

async fn create_thread(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<ChatThread>)> {
    let thread = state.chats.create_thread(&user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(thread_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    let message = state
        .chats
        .send_message(&thread_id, &user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    Ok(Json(state.chats.messages(&thread_id, &user.user_id).await?))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(thread_id): Path<String>,
) -> Result<StatusCode> {
    state.chats.mark_read(&thread_id, &user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
