// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live list views served to clients.
//!
//! Every screen that shows a live list is one [`LiveView`]: a remote query,
//! a decoder and a set of filter dimensions, all projected through the same
//! [`LiveProjector`].

use crate::db::{collections, CollectionQuery, Direction, FieldFilter};
use crate::error::{AppError, Result};
use crate::models::{Announcement, ChatMembership, Comment, Message, Post, Report, RunningGroup};
use crate::services::filter::ProjectionFilter;
use crate::services::projector::{decode_as, LiveProjector, ProjectionState};
use futures_util::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

/// Feed pages are capped; older posts are not live.
const FEED_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum LiveView {
    /// Newest posts, optionally one group's feed
    Feed { group_id: Option<String> },
    /// Moderation queue (admin only)
    Reports,
    Announcements,
    /// All groups by name, or only those the user belongs to
    Groups { mine: bool },
    /// The user's chats, most recent first
    Chats,
    /// One chat's messages, oldest first (participants only)
    Messages { thread_id: String },
    /// One post's comments, oldest first
    Comments { post_id: String },
}

impl LiveView {
    /// Build a view from its name and the query-string parameters that
    /// select it (`group`, `mine`, `post`, `chat`). Remaining parameters are filter
    /// selections.
    pub fn parse(name: &str, params: &[(String, String)]) -> Result<Self> {
        let param = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        match name {
            "feed" => Ok(LiveView::Feed {
                group_id: param("group"),
            }),
            "reports" => Ok(LiveView::Reports),
            "announcements" => Ok(LiveView::Announcements),
            "groups" => Ok(LiveView::Groups {
                mine: param("mine").is_some_and(|v| v == "true" || v == "1"),
            }),
            "chats" => Ok(LiveView::Chats),
            "messages" => param("chat")
                .map(|thread_id| LiveView::Messages { thread_id })
                .ok_or_else(|| AppError::BadRequest("messages view needs ?chat=".to_string())),
            "comments" => param("post")
                .map(|post_id| LiveView::Comments { post_id })
                .ok_or_else(|| AppError::BadRequest("comments view needs ?post=".to_string())),
            other => Err(AppError::NotFound(format!("Unknown live view: {}", other))),
        }
    }

    /// Parameters consumed by [`parse`](Self::parse) rather than the filter.
    fn selector_keys(&self) -> &'static [&'static str] {
        match self {
            LiveView::Feed { .. } => &["group"],
            LiveView::Groups { .. } => &["mine"],
            LiveView::Comments { .. } => &["post"],
            LiveView::Messages { .. } => &["chat"],
            _ => &[],
        }
    }

    pub fn requires_admin(&self) -> bool {
        matches!(self, LiveView::Reports)
    }

    /// Chat the subscriber must take part in.
    pub fn required_chat(&self) -> Option<&str> {
        match self {
            LiveView::Messages { thread_id } => Some(thread_id.as_str()),
            _ => None,
        }
    }

    /// Remote query for this view as seen by `user_id`.
    pub fn query(&self, user_id: &str) -> CollectionQuery {
        match self {
            LiveView::Feed { group_id } => {
                let query = CollectionQuery::new(collections::POSTS).limit(FEED_LIMIT);
                match group_id {
                    Some(group) => query.filter(FieldFilter::eq("group_id", group.as_str())),
                    None => query,
                }
            }
            LiveView::Reports => CollectionQuery::new(collections::REPORTS),
            LiveView::Announcements => CollectionQuery::new(collections::ANNOUNCEMENTS),
            LiveView::Groups { mine } => {
                let query = CollectionQuery::new(collections::GROUPS)
                    .order_by("name", Direction::Ascending);
                if *mine {
                    query.filter(FieldFilter::array_contains("members", user_id))
                } else {
                    query
                }
            }
            LiveView::Chats => CollectionQuery::new(collections::CHAT_MEMBERS)
                .order_by("last_message_at", Direction::Descending)
                .filter(FieldFilter::eq("user_id", user_id)),
            LiveView::Comments { post_id } => crate::services::social::comments_query(post_id),
            LiveView::Messages { thread_id } => crate::services::chat::messages_query(thread_id),
        }
    }

    /// Subscribe and stream each published state as JSON.
    pub async fn open(
        &self,
        projector: &LiveProjector,
        user_id: &str,
        params: &[(String, String)],
    ) -> Result<BoxStream<'static, Value>> {
        let query = self.query(user_id);
        let selections: Vec<&(String, String)> = params
            .iter()
            .filter(|(k, _)| !self.selector_keys().contains(&k.as_str()))
            .collect();

        match self {
            LiveView::Feed { .. } => open_view(projector, query, post_filter(), &selections).await,
            LiveView::Reports => open_view(projector, query, report_filter(), &selections).await,
            LiveView::Announcements => {
                open_view::<Announcement>(projector, query, ProjectionFilter::new(), &selections).await
            }
            LiveView::Groups { .. } => open_view(projector, query, group_filter(), &selections).await,
            LiveView::Chats => open_view(projector, query, chat_filter(), &selections).await,
            LiveView::Comments { .. } => {
                open_view(projector, query, comment_filter(), &selections).await
            }
            LiveView::Messages { .. } => {
                open_view(projector, query, message_filter(), &selections).await
            }
        }
    }
}

async fn open_view<T>(
    projector: &LiveProjector,
    query: CollectionQuery,
    mut filter: ProjectionFilter<T>,
    selections: &[&(String, String)],
) -> Result<BoxStream<'static, Value>>
where
    T: DeserializeOwned + Serialize + Clone + Send + Sync + 'static,
{
    for (dimension, value) in selections {
        if !filter.select(dimension, value.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Unknown filter '{}'; expected one of: {}",
                dimension,
                filter.dimension_names().collect::<Vec<_>>().join(", ")
            )));
        }
    }
    let handle = projector.subscribe(query, decode_as::<T>(), Some(filter)).await?;
    Ok(handle.into_stream().map(|state| state_json(&state)).boxed())
}

/// Wire form of a projection state.
pub fn state_json<T: Serialize>(state: &ProjectionState<T>) -> Value {
    match state {
        ProjectionState::Loading => json!({ "state": "loading", "items": [] }),
        ProjectionState::Ready(items) => json!({ "state": "ready", "items": items.as_slice() }),
        ProjectionState::Failed { error, last } => json!({
            "state": "failed",
            "error": error.to_string(),
            "items": last.as_slice(),
        }),
    }
}

// ─── Filter dimensions ───────────────────────────────────────────────

pub fn post_filter() -> ProjectionFilter<Post> {
    ProjectionFilter::new()
        .dimension("kind", |p: &Post| Some(p.kind.as_str().to_string()))
        .dimension("author", |p: &Post| Some(p.author_id.clone()))
        .dimension("group", |p: &Post| p.group_id.clone())
}

pub fn report_filter() -> ProjectionFilter<Report> {
    ProjectionFilter::new()
        .dimension("status", |r: &Report| Some(r.status.as_str().to_string()))
        .dimension("kind", |r: &Report| Some(r.kind.clone()))
        .dimension("target_kind", |r: &Report| Some(r.target_kind.clone()))
}

pub fn group_filter() -> ProjectionFilter<RunningGroup> {
    ProjectionFilter::new().dimension("owner", |g: &RunningGroup| Some(g.owner_id.clone()))
}

pub fn chat_filter() -> ProjectionFilter<ChatMembership> {
    ProjectionFilter::new().dimension("unread", |m: &ChatMembership| {
        Some((m.unread_count > 0).to_string())
    })
}

pub fn comment_filter() -> ProjectionFilter<Comment> {
    ProjectionFilter::new().dimension("author", |c: &Comment| Some(c.author_id.clone()))
}

pub fn message_filter() -> ProjectionFilter<Message> {
    ProjectionFilter::new().dimension("sender", |m: &Message| Some(m.sender_id.clone()))
}
