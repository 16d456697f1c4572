// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stride API Server
//!
//! Records runs from client-pushed location fixes and serves the social
//! feed, groups, chats and moderation tools on top of Firestore.

use std::sync::Arc;
use stride_tracker::{
    config::{Config, StoreBackend},
    db::DocumentStore,
    services::{FirebaseIdentityProvider, IdentityProvider, MemoryIdentityProvider},
    time_utils::SystemClock,
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, backend = ?config.store_backend, "Starting Stride API");

    let store = match config.store_backend {
        StoreBackend::Firestore => {
            let store = DocumentStore::firestore(&config.gcp_project_id).await?;
            tracing::info!(project = %config.gcp_project_id, "Firestore connected");
            store
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            DocumentStore::in_memory()
        }
    };

    let identity: Arc<dyn IdentityProvider> = match &config.firebase_api_key {
        Some(api_key) => Arc::new(FirebaseIdentityProvider::new(api_key.clone())),
        None => {
            tracing::warn!("FIREBASE_API_KEY not set; using in-memory accounts");
            Arc::new(MemoryIdentityProvider::new())
        }
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        identity,
        Arc::new(SystemClock::new()),
    ));

    // Build router
    let app = stride_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stride_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
