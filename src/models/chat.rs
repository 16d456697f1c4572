//! Direct-message threads.

use serde::{Deserialize, Serialize};

/// Chat thread stored in `chats/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    pub created_at: String,
    /// Ordering key for chat lists
    pub last_message_at: String,
}

/// Per-participant view of a thread, stored in `chat_members/{thread}_{user}`.
///
/// Carries the unread counter so it can be incremented independently for
/// each recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMembership {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    /// The other participants, for list display
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    pub last_message_at: String,
    #[serde(default)]
    pub unread_count: i64,
}

/// Message stored in `messages/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: String,
}
