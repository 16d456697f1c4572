// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile documents.

use crate::db::{collections, DocumentStore};
use crate::error::{AppError, Result};
use crate::models::{Role, User};
use crate::services::identity::Identity;
use crate::time_utils::now_rfc3339;

#[derive(Clone)]
pub struct UserService {
    store: DocumentStore,
}

impl UserService {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Create or refresh the profile of a user who just signed in.
    ///
    /// Role and creation time of an existing profile are kept.
    pub async fn record_sign_in(&self, identity: &Identity) -> Result<User> {
        let now = now_rfc3339();
        let existing: Option<User> = self.store.get_as(collections::USERS, &identity.user_id).await?;
        let user = match existing {
            Some(user) => User {
                email: identity.email.clone(),
                display_name: identity.display_name.clone(),
                last_active: now,
                ..user
            },
            None => {
                tracing::info!(user_id = %identity.user_id, "Creating user profile");
                User {
                    id: identity.user_id.clone(),
                    email: identity.email.clone(),
                    display_name: identity.display_name.clone(),
                    role: Role::Member,
                    created_at: now.clone(),
                    last_active: now,
                }
            }
        };
        self.store.set(collections::USERS, &user.id, &user).await?;
        Ok(user)
    }

    pub async fn get(&self, user_id: &str) -> Result<User> {
        self.store
            .get_as(collections::USERS, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }
}
