// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod chat;
pub mod filter;
pub mod identity;
pub mod location;
pub mod moderation;
pub mod projector;
pub mod recorder;
pub mod runs;
pub mod session;
pub mod social;
pub mod users;
pub mod views;

pub use chat::ChatService;
pub use filter::ProjectionFilter;
pub use identity::{AuthError, FirebaseIdentityProvider, Identity, IdentityProvider, MemoryIdentityProvider};
pub use location::{LocationError, LocationProvider, LocationRequest, PushLocationProvider};
pub use moderation::ModerationService;
pub use projector::{decode_as, LiveProjector, Projection, ProjectionState, SubscriptionHandle};
pub use recorder::{RecorderPhase, TrackRecorder, NOISE_THRESHOLD_METERS};
pub use runs::RunService;
pub use session::{ActiveRun, RecordingSession, SessionRegistry, SessionSnapshot};
pub use social::SocialService;
pub use users::UserService;
pub use views::LiveView;
