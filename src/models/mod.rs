// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod chat;
pub mod moderation;
pub mod run;
pub mod social;
pub mod stats;
pub mod track;
pub mod user;

pub use chat::{ChatMembership, ChatThread, Message};
pub use moderation::{Announcement, Report, ReportStatus};
pub use run::RunRecord;
pub use social::{Comment, CommentThread, Post, PostKind, RunningGroup};
pub use stats::UserStats;
pub use track::{FinishedRun, Fix, TrackSample, TrackState};
pub use user::{Role, User};
