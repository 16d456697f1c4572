//! Database layer: document store over Firestore or memory.

pub mod document;
pub mod firestore;
pub mod memory;
pub mod store;

pub use document::{
    CollectionQuery, Direction, FieldFilter, RemoteDocumentSnapshot, SnapshotEvent, SnapshotFeed,
    StoreError, WriteBatch,
};
pub use memory::MemoryStore;
pub use store::{new_document_id, DocumentStore};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const RUNS: &str = "runs";
    pub const POSTS: &str = "posts";
    pub const COMMENTS: &str = "comments";
    pub const GROUPS: &str = "groups";
    pub const CHATS: &str = "chats";
    pub const CHAT_MEMBERS: &str = "chat_members";
    pub const MESSAGES: &str = "messages";
    pub const REPORTS: &str = "reports";
    pub const ANNOUNCEMENTS: &str = "announcements";
    /// User stats aggregates (keyed by user_id)
    pub const USER_STATS: &str = "user_stats";
}
