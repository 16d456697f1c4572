// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email/password sign-in and sign-out.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, verify_jwt, SESSION_COOKIE};
use crate::models::User;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub token: String,
    pub user: User,
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Verify credentials with the identity provider and start a session.
async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SignInRequest>,
) -> Result<(CookieJar, Json<SignInResponse>)> {
    request.validate()?;

    let identity = state
        .identity
        .sign_in(&request.email, &request.password)
        .await
        .inspect_err(|e| tracing::info!(error = %e, "Sign-in rejected"))?;

    let user = state.users.record_sign_in(&identity).await?;
    let token = create_jwt(&user.id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    tracing::info!(user_id = %user.id, "User signed in");
    Ok((
        jar.add(session_cookie(token.clone())),
        Json(SignInResponse { token, user }),
    ))
}

/// Clear the session cookie. Works with or without a valid session.
async fn sign_out(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    let user_id = jar
        .get(SESSION_COOKIE)
        .and_then(|c| verify_jwt(c.value(), &state.config.jwt_signing_key).ok());

    if let Some(user_id) = user_id {
        if let Err(e) = state.identity.sign_out(&user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Provider sign-out failed");
        }
        tracing::info!(user_id = %user_id, "User signed out");
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
}
