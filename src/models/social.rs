// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feed posts, comments and running groups.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// What produced a feed post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
pub enum PostKind {
    /// Posted automatically when a run is saved
    Run,
    /// Free-form status update
    Text,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Run => "run",
            PostKind::Text => "text",
        }
    }
}

/// Feed post stored in `posts/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub kind: PostKind,
    pub body: String,
    /// Uploaded image URL (blob storage is external)
    #[serde(default)]
    pub image_url: Option<String>,
    /// Group feed this post belongs to, if any
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub comment_count: i64,
    pub created_at: String,
}

/// Comment stored in `comments/{id}`.
///
/// Replies are at most one level deep: `parent_id` always names a top-level
/// comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub body: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: String,
}

/// A top-level comment with its replies, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentThread {
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// Running group stored in `groups/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RunningGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub owner_id: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub member_count: i64,
    pub created_at: String,
}
