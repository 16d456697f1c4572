// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Posts, comments and groups.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Comment, CommentThread, Post, RunningGroup};
use crate::services::social::{CreateCommentRequest, CreateGroupRequest, CreatePostRequest};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/posts", post(create_post))
        .route(
            "/api/posts/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .route("/api/groups", post(create_group))
        .route("/api/groups/{id}/join", post(join_group))
        .route("/api/groups/{id}/leave", post(leave_group))
}

async fn create_post(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>)> {
    let post = state.social.create_post(&user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn add_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<String>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = state
        .social
        .add_comment(&post_id, &user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> Result<Json<Vec<CommentThread>>> {
    Ok(Json(state.social.comment_threads(&post_id).await?))
}

async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<RunningGroup>)> {
    let group = state.social.create_group(&user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[derive(Serialize)]
pub struct MembershipResponse {
    /// Whether membership changed
    pub changed: bool,
}

async fn join_group(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<String>,
) -> Result<Json<MembershipResponse>> {
    let changed = state.social.join_group(&group_id, &user.user_id).await?;
    Ok(Json(MembershipResponse { changed }))
}

async fn leave_group(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<String>,
) -> Result<Json<MembershipResponse>> {
    let changed = state.social.leave_group(&group_id, &user.user_id).await?;
    Ok(Json(MembershipResponse { changed }))
}
