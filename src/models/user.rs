//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// Account role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

/// User profile stored in `users/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Identity provider user ID (also used as document ID)
    pub id: String,
    /// Email address
    pub email: String,
    /// Name shown on posts
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    /// When user first signed in
    pub created_at: String,
    /// Last sign-in timestamp
    pub last_active: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
