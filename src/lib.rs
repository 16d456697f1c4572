// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Stride: run tracking and a social feed for runners
//!
//! This crate provides the backend API: live run recording from pushed
//! location fixes, run persistence, posts, groups, chats and moderation,
//! plus live list views projected from the document store.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::DocumentStore;
use services::{
    ChatService, IdentityProvider, LiveProjector, LocationRequest, ModerationService, RunService,
    SessionRegistry, SocialService, UserService,
};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: DocumentStore,
    pub identity: Arc<dyn IdentityProvider>,
    pub sessions: SessionRegistry,
    pub projector: LiveProjector,
    pub users: UserService,
    pub runs: RunService,
    pub social: SocialService,
    pub chats: ChatService,
    pub moderation: ModerationService,
}

impl AppState {
    /// Wire every service onto one store.
    pub fn new(
        config: Config,
        store: DocumentStore,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let location = LocationRequest {
            min_interval: config.location_min_interval,
            min_distance_m: config.location_min_distance_m,
        };
        Self {
            sessions: SessionRegistry::new(clock, location, config.tick_interval),
            projector: LiveProjector::new(store.clone()),
            users: UserService::new(store.clone()),
            runs: RunService::new(store.clone()),
            social: SocialService::new(store.clone()),
            chats: ChatService::new(store.clone()),
            moderation: ModerationService::new(store.clone()),
            config,
            store,
            identity,
        }
    }
}
