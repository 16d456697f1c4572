// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity providers for email/password sign-in.
//!
//! - [`FirebaseIdentityProvider`]: Firebase Authentication REST API
//! - [`MemoryIdentityProvider`]: in-process accounts for offline mode and tests

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Authentication failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User account is disabled")]
    UserDisabled,

    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// A signed-in user as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
}

/// Email/password identity provider.
pub trait IdentityProvider: Send + Sync {
    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Identity, AuthError>>;

    /// End the provider-side session, if the provider keeps one.
    fn sign_out<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<(), AuthError>>;
}

// ─── Firebase ────────────────────────────────────────────────────────

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Firebase Authentication via the Identity Toolkit REST API.
#[derive(Clone)]
pub struct FirebaseIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseIdentityProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, IDENTITY_TOOLKIT_URL.to_string())
    }

    /// Point at a different endpoint (the Auth emulator, for instance).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let url = format!(
            "{}/accounts:signInWithPassword?key={}",
            self.base_url,
            urlencoding::encode(&self.api_key)
        );
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("Sign-in request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_firebase_error(status, &text));
        }

        let signed_in: SignInResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("Invalid sign-in response: {}", e)))?;

        let display_name = signed_in
            .display_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_display_name(&signed_in.email));
        Ok(Identity {
            user_id: signed_in.local_id,
            email: signed_in.email,
            display_name,
        })
    }
}

fn map_firebase_error(status: reqwest::StatusCode, body: &str) -> AuthError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_default();
    // Messages look like "INVALID_PASSWORD" or "TOO_MANY_ATTEMPTS_TRY_LATER : ..."
    let code = message.split(':').next().unwrap_or_default().trim();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
            AuthError::InvalidCredentials
        }
        "USER_DISABLED" => AuthError::UserDisabled,
        _ => {
            tracing::warn!(status = %status, message = %message, "Identity provider rejected sign-in");
            AuthError::Provider(format!("HTTP {}: {}", status, message))
        }
    }
}

impl IdentityProvider for FirebaseIdentityProvider {
    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Identity, AuthError>> {
        Box::pin(self.sign_in_with_password(email, password))
    }

    fn sign_out<'a>(&'a self, _user_id: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        // ID tokens are not kept server-side; dropping our session is enough
        Box::pin(async { Ok(()) })
    }
}

// ─── In-memory ───────────────────────────────────────────────────────

struct Account {
    identity: Identity,
    password_digest: [u8; 32],
    disabled: bool,
}

/// In-process accounts keyed by lowercase email.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    accounts: DashMap<String, Account>,
}

fn password_digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account; the user ID is derived from the email.
    pub fn add_user(&self, email: &str, password: &str, display_name: &str) -> Identity {
        let key = email.trim().to_lowercase();
        let identity = Identity {
            user_id: format!("user-{}", &hex::encode(Sha256::digest(key.as_bytes()))[..16]),
            email: key.clone(),
            display_name: display_name.to_string(),
        };
        self.accounts.insert(
            key,
            Account {
                identity: identity.clone(),
                password_digest: password_digest(password),
                disabled: false,
            },
        );
        identity
    }

    pub fn set_disabled(&self, email: &str, disabled: bool) {
        if let Some(mut account) = self.accounts.get_mut(&email.trim().to_lowercase()) {
            account.disabled = disabled;
        }
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Identity, AuthError>> {
        let result = match self.accounts.get(&email.trim().to_lowercase()) {
            Some(account) => {
                let matches: bool = account
                    .password_digest
                    .as_slice()
                    .ct_eq(password_digest(password).as_slice())
                    .into();
                if !matches {
                    Err(AuthError::InvalidCredentials)
                } else if account.disabled {
                    Err(AuthError::UserDisabled)
                } else {
                    Ok(account.identity.clone())
                }
            }
            None => Err(AuthError::InvalidCredentials),
        };
        Box::pin(async move { result })
    }

    fn sign_out<'a>(&'a self, _user_id: &'a str) -> BoxFuture<'a, Result<(), AuthError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Local part of the email, used when the provider has no display name.
pub fn default_display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
