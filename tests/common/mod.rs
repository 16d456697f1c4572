// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::Value;
use std::sync::Arc;
use stride_tracker::config::Config;
use stride_tracker::db::{collections, DocumentStore};
use stride_tracker::models::{Role, User};
use stride_tracker::routes::create_router;
use stride_tracker::services::MemoryIdentityProvider;
use stride_tracker::time_utils::ManualClock;
use stride_tracker::AppState;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test store connection against the emulator.
#[allow(dead_code)]
pub async fn test_store() -> DocumentStore {
    DocumentStore::firestore("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Offline app pieces a test may want to poke at directly.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub accounts: Arc<MemoryIdentityProvider>,
    pub clock: Arc<ManualClock>,
}

/// Create a test app with an in-memory store and in-memory accounts.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let accounts = Arc::new(MemoryIdentityProvider::new());
    let clock = Arc::new(ManualClock::default());
    let state = Arc::new(AppState::new(
        Config::test_default(),
        DocumentStore::in_memory(),
        accounts.clone(),
        clock.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        accounts,
        clock,
    }
}

/// Create a session token the way the server does.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    stride_tracker::middleware::auth::create_jwt(user_id, signing_key).unwrap()
}

/// Store a profile for `user_id` and return a token for it.
#[allow(dead_code)]
pub async fn seed_user(app: &TestApp, user_id: &str, role: Role) -> String {
    let user = User {
        id: user_id.to_string(),
        email: format!("{}@example.com", user_id),
        display_name: user_id.to_string(),
        role,
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
        last_active: "2024-01-01T00:00:00.000Z".to_string(),
    };
    app.state
        .store
        .set(collections::USERS, user_id, &user)
        .await
        .unwrap();
    create_test_jwt(user_id, &app.state.config.jwt_signing_key)
}

/// Send a request with an optional bearer token and JSON body, returning the
/// status and the parsed JSON body (`Null` when empty).
#[allow(dead_code)]
pub async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
