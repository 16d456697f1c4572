// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feed posts, comments and running groups.

use crate::db::{collections, new_document_id, CollectionQuery, Direction, DocumentStore, FieldFilter, WriteBatch};
use crate::error::{AppError, Result};
use crate::models::{Comment, CommentThread, Post, PostKind, RunningGroup};
use crate::time_utils::now_rfc3339;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
    #[validate(url)]
    pub image_url: Option<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 1000))]
    pub body: String,
    /// Comment being replied to, at any depth
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
}

#[derive(Clone)]
pub struct SocialService {
    store: DocumentStore,
}

impl SocialService {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    // ─── Posts ───────────────────────────────────────────────────

    pub async fn create_post(&self, author_id: &str, request: CreatePostRequest) -> Result<Post> {
        request.validate()?;

        if let Some(group_id) = &request.group_id {
            let group: RunningGroup = self.store.require(collections::GROUPS, group_id).await?;
            if !group.members.iter().any(|m| m == author_id) {
                return Err(AppError::Forbidden(
                    "Only group members can post to a group".to_string(),
                ));
            }
        }

        let post = Post {
            id: new_document_id()?,
            author_id: author_id.to_string(),
            kind: PostKind::Text,
            body: request.body.trim().to_string(),
            image_url: request.image_url,
            group_id: request.group_id,
            run_id: None,
            distance_km: None,
            duration_seconds: None,
            comment_count: 0,
            created_at: now_rfc3339(),
        };
        self.store.set(collections::POSTS, &post.id, &post).await?;
        tracing::info!(post_id = %post.id, author_id = %author_id, "Post created");
        Ok(post)
    }

    // ─── Comments ────────────────────────────────────────────────

    /// Add a comment and bump the post's comment count in one batch.
    ///
    /// Replies to replies are attached to the top-level comment, so threads
    /// are never more than one level deep.
    pub async fn add_comment(
        &self,
        post_id: &str,
        author_id: &str,
        request: CreateCommentRequest,
    ) -> Result<Comment> {
        request.validate()?;

        // The post must exist before counting against it
        let _post: Post = self.store.require(collections::POSTS, post_id).await?;

        let parent_id = match &request.parent_id {
            Some(parent_id) => {
                let parent: Comment = self.store.require(collections::COMMENTS, parent_id).await?;
                if parent.post_id != post_id {
                    return Err(AppError::BadRequest(
                        "Parent comment belongs to a different post".to_string(),
                    ));
                }
                Some(parent.parent_id.unwrap_or(parent.id))
            }
            None => None,
        };

        let comment = Comment {
            id: new_document_id()?,
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            body: request.body.trim().to_string(),
            parent_id,
            created_at: now_rfc3339(),
        };

        let mut batch = WriteBatch::new();
        batch.set(collections::COMMENTS, &comment.id, &comment)?;
        batch.increment(collections::POSTS, post_id, "comment_count", 1);
        self.store.commit(batch).await?;

        tracing::debug!(post_id = %post_id, comment_id = %comment.id, "Comment added");
        Ok(comment)
    }

    /// Comments of a post grouped into threads, oldest first.
    pub async fn comment_threads(&self, post_id: &str) -> Result<Vec<CommentThread>> {
        let docs = self.store.query(&comments_query(post_id)).await?;
        let comments: Vec<Comment> = docs.iter().filter_map(|d| d.decode().ok()).collect();
        Ok(thread_comments(comments))
    }

    // ─── Groups ──────────────────────────────────────────────────

    pub async fn create_group(&self, owner_id: &str, request: CreateGroupRequest) -> Result<RunningGroup> {
        request.validate()?;
        let group = RunningGroup {
            id: new_document_id()?,
            name: request.name.trim().to_string(),
            description: request.description,
            owner_id: owner_id.to_string(),
            members: vec![owner_id.to_string()],
            member_count: 1,
            created_at: now_rfc3339(),
        };
        self.store.set(collections::GROUPS, &group.id, &group).await?;
        tracing::info!(group_id = %group.id, owner_id = %owner_id, "Group created");
        Ok(group)
    }

    /// Returns `false` if the user was already a member.
    ///
    /// The membership change is an atomic array union in the store, so
    /// concurrent joins never overwrite each other.
    pub async fn join_group(&self, group_id: &str, user_id: &str) -> Result<bool> {
        let group: RunningGroup = self.store.require(collections::GROUPS, group_id).await?;
        if group.members.iter().any(|m| m == user_id) {
            return Ok(false);
        }
        let mut batch = WriteBatch::new();
        batch.array_union(
            collections::GROUPS,
            group_id,
            "members",
            Value::from(user_id),
            Some("member_count"),
        );
        self.store.commit(batch).await?;
        tracing::info!(group_id = %group_id, user_id = %user_id, "Joined group");
        Ok(true)
    }

    /// Returns `false` if the user was not a member.
    pub async fn leave_group(&self, group_id: &str, user_id: &str) -> Result<bool> {
        let group: RunningGroup = self.store.require(collections::GROUPS, group_id).await?;
        if !group.members.iter().any(|m| m == user_id) {
            return Ok(false);
        }
        let mut batch = WriteBatch::new();
        batch.array_remove(
            collections::GROUPS,
            group_id,
            "members",
            Value::from(user_id),
            Some("member_count"),
        );
        self.store.commit(batch).await?;
        tracing::info!(group_id = %group_id, user_id = %user_id, "Left group");
        Ok(true)
    }
}

/// Comments on one post, oldest first.
pub fn comments_query(post_id: &str) -> CollectionQuery {
    CollectionQuery::new(collections::COMMENTS)
        .order_by("created_at", Direction::Ascending)
        .filter(FieldFilter::eq("post_id", post_id))
}

/// Group a flat, ordered comment list into depth-1 threads.
///
/// Replies whose parent is missing are promoted to top level.
pub fn thread_comments(comments: Vec<Comment>) -> Vec<CommentThread> {
    let top_level: std::collections::HashSet<String> = comments
        .iter()
        .filter(|c| c.parent_id.is_none())
        .map(|c| c.id.clone())
        .collect();

    let mut threads: Vec<CommentThread> = Vec::new();
    let mut position: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut replies: Vec<Comment> = Vec::new();

    for comment in comments {
        match &comment.parent_id {
            Some(parent) if top_level.contains(parent) => replies.push(comment),
            _ => {
                position.insert(comment.id.clone(), threads.len());
                threads.push(CommentThread {
                    comment,
                    replies: Vec::new(),
                });
            }
        }
    }
    for reply in replies {
        let parent = reply.parent_id.as_deref().and_then(|p| position.get(p));
        if let Some(&index) = parent {
            threads[index].replies.push(reply);
        }
    }
    threads
}
