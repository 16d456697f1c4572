// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Direct-message threads.
//!
//! Each participant has a `chat_members` document per thread holding their
//! unread counter and a copy of the last message, so a user's chat list is
//! a single query and unread counts are incremented per recipient.

use crate::db::{collections, new_document_id, CollectionQuery, Direction, DocumentStore, FieldFilter, WriteBatch};
use crate::error::{AppError, Result};
use crate::models::{ChatMembership, ChatThread, Message};
use crate::time_utils::now_rfc3339;
use serde::Deserialize;
use serde_json::{Map, Value};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateThreadRequest {
    /// Other participants (the caller is added automatically)
    #[validate(length(min = 1, max = 20))]
    pub participants: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}

/// Membership document ID for a user in a thread.
pub fn membership_id(thread_id: &str, user_id: &str) -> String {
    format!("{}_{}", thread_id, urlencoding::encode(user_id))
}

/// Preview stored on threads and memberships.
fn preview(body: &str) -> String {
    const MAX: usize = 80;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

#[derive(Clone)]
pub struct ChatService {
    store: DocumentStore,
}

impl ChatService {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub async fn create_thread(&self, creator_id: &str, request: CreateThreadRequest) -> Result<ChatThread> {
        request.validate()?;

        let mut participants = vec![creator_id.to_string()];
        for p in request.participants {
            let p = p.trim().to_string();
            if !p.is_empty() && !participants.contains(&p) {
                participants.push(p);
            }
        }
        if participants.len() < 2 {
            return Err(AppError::BadRequest(
                "A chat needs at least one other participant".to_string(),
            ));
        }

        let now = now_rfc3339();
        let thread = ChatThread {
            id: new_document_id()?,
            participants: participants.clone(),
            last_message: None,
            created_at: now.clone(),
            last_message_at: now.clone(),
        };

        let mut batch = WriteBatch::new();
        batch.set(collections::CHATS, &thread.id, &thread)?;
        for user_id in &participants {
            let membership = ChatMembership {
                id: membership_id(&thread.id, user_id),
                thread_id: thread.id.clone(),
                user_id: user_id.clone(),
                peers: participants.iter().filter(|p| *p != user_id).cloned().collect(),
                last_message: None,
                last_message_at: now.clone(),
                unread_count: 0,
            };
            batch.set(collections::CHAT_MEMBERS, &membership.id, &membership)?;
        }
        self.store.commit(batch).await?;

        tracing::info!(thread_id = %thread.id, participants = participants.len(), "Chat created");
        Ok(thread)
    }

    /// Post a message: stores it, updates every participant's last-message
    /// preview and increments each recipient's unread count, atomically.
    pub async fn send_message(
        &self,
        thread_id: &str,
        sender_id: &str,
        request: SendMessageRequest,
    ) -> Result<Message> {
        request.validate()?;
        let thread: ChatThread = self.store.require(collections::CHATS, thread_id).await?;
        if !thread.participants.iter().any(|p| p == sender_id) {
            return Err(AppError::Forbidden("Not a participant of this chat".to_string()));
        }

        let message = Message {
            id: new_document_id()?,
            thread_id: thread_id.to_string(),
            sender_id: sender_id.to_string(),
            body: request.body,
            created_at: now_rfc3339(),
        };

        let mut last = Map::new();
        last.insert("last_message".to_string(), Value::from(preview(&message.body)));
        last.insert(
            "last_message_at".to_string(),
            Value::from(message.created_at.clone()),
        );

        let mut batch = WriteBatch::new();
        batch.set(collections::MESSAGES, &message.id, &message)?;
        batch.update(collections::CHATS, thread_id, last.clone());
        for participant in &thread.participants {
            let member_doc = membership_id(thread_id, participant);
            batch.update(collections::CHAT_MEMBERS, &member_doc, last.clone());
            if participant != sender_id {
                batch.increment(collections::CHAT_MEMBERS, &member_doc, "unread_count", 1);
            }
        }
        self.store.commit(batch).await?;

        tracing::debug!(thread_id = %thread_id, message_id = %message.id, "Message sent");
        Ok(message)
    }

    /// Reset the caller's unread counter.
    pub async fn mark_read(&self, thread_id: &str, user_id: &str) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("unread_count".to_string(), Value::from(0));
        self.store
            .update(collections::CHAT_MEMBERS, &membership_id(thread_id, user_id), fields)
            .await
            .map_err(|e| match e {
                crate::db::StoreError::NotFound { .. } => {
                    AppError::NotFound(format!("Chat {} not found", thread_id))
                }
                other => other.into(),
            })
    }

    /// The thread, if `user_id` takes part in it.
    pub async fn require_participant(&self, thread_id: &str, user_id: &str) -> Result<ChatThread> {
        let thread: ChatThread = self.store.require(collections::CHATS, thread_id).await?;
        if !thread.participants.iter().any(|p| p == user_id) {
            return Err(AppError::Forbidden("Not a participant of this chat".to_string()));
        }
        Ok(thread)
    }

    pub async fn messages(&self, thread_id: &str, user_id: &str) -> Result<Vec<Message>> {
        self.require_participant(thread_id, user_id).await?;
        let docs = self.store.query(&messages_query(thread_id)).await?;
        Ok(docs.iter().filter_map(|d| d.decode().ok()).collect())
    }
}

/// Messages of one thread, oldest first.
pub fn messages_query(thread_id: &str) -> CollectionQuery {
    CollectionQuery::new(collections::MESSAGES)
        .order_by("created_at", Direction::Ascending)
        .filter(FieldFilter::eq("thread_id", thread_id))
}
