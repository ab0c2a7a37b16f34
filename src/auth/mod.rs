//! Accounts and login sessions.
//!
//! [`AuthService`] owns the rules (validation, hashing, expiry); the
//! [`AccountStore`] only persists rows.

pub mod password;
pub mod token;
mod sqlite;

pub use password::PasswordHasher;
pub use sqlite::SqliteAccountStore;
pub use token::SessionSigner;

use async_trait::async_trait;
use chrono::Utc;
use log::{ info, warn };
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub conversation_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn find_session(&self, token: &str) -> Result<Option<Session>, StoreError>;
    async fn set_conversation(&self, token: &str, conversation_id: &str) -> Result<(), StoreError>;
    async fn delete_session(&self, token: &str) -> Result<(), StoreError>;
    async fn purge_expired_sessions(&self, now: i64) -> Result<u64, StoreError>;
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("an account with this {0} already exists")]
    Duplicate(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("session is missing or expired")]
    InvalidSession,

    #[error("password hashing task failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => AuthError::Duplicate(field),
            other => AuthError::Store(other),
        }
    }
}

pub fn new_conversation_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AccountStore>,
    hasher: PasswordHasher,
    session_ttl_secs: i64,
}

impl AuthService {
    pub fn new(store: Arc<dyn AccountStore>, hasher: PasswordHasher, session_ttl_hours: u32) -> Self {
        Self {
            store,
            hasher,
            session_ttl_secs: i64::from(session_ttl_hours) * 3600,
        }
    }

    pub fn session_ttl_secs(&self) -> i64 {
        self.session_ttl_secs
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() {
            return Err(AuthError::MissingField("username"));
        }
        if email.is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let password_hash = self.hash_password(password).await?;
        let user = self.store.create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
        }).await?;
        info!("Registered user {} ({})", user.id, user.username);
        Ok(user)
    }

    /// Checks credentials and opens a session with a fresh conversation.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, Session), AuthError> {
        let Some(user) = self.store.find_user_by_email(email.trim()).await? else {
            self.verify_password(password, self.hasher.dummy_hash()).await?;
            return Err(AuthError::InvalidCredentials);
        };
        if !self.verify_password(password, user.password_hash.clone()).await? {
            warn!("Failed login for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now().timestamp();
        let purged = self.store.purge_expired_sessions(now).await?;
        if purged > 0 {
            info!("Removed {} expired sessions", purged);
        }
        let session = Session {
            token: token::generate_token(),
            user_id: user.id,
            conversation_id: new_conversation_id(),
            created_at: now,
            expires_at: now + self.session_ttl_secs,
        };
        self.store.create_session(&session).await?;
        info!("User {} logged in", user.id);
        Ok((user, session))
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher;
        let password = password.to_string();
        tokio::task
            ::spawn_blocking(move || hasher.hash(&password)).await
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    async fn verify_password(&self, password: &str, stored: String) -> Result<bool, AuthError> {
        let hasher = self.hasher;
        let password = password.to_string();
        tokio::task
            ::spawn_blocking(move || hasher.verify(&password, &stored)).await
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Resolves a session token to its user. Expired sessions are deleted.
    pub async fn authenticate(&self, token: &str) -> Result<(User, Session), AuthError> {
        let session = self.store.find_session(token).await?.ok_or(AuthError::InvalidSession)?;
        if session.is_expired(Utc::now().timestamp()) {
            self.store.delete_session(token).await?;
            return Err(AuthError::InvalidSession);
        }
        let user = self.store.find_user(session.user_id).await?.ok_or(AuthError::InvalidSession)?;
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.store.delete_session(token).await?;
        Ok(())
    }

    /// Points the session at a new, empty conversation.
    pub async fn new_conversation(&self, token: &str) -> Result<String, AuthError> {
        let conversation_id = new_conversation_id();
        self.store.set_conversation(token, &conversation_id).await?;
        Ok(conversation_id)
    }

    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        Ok(self.store.purge_expired_sessions(Utc::now().timestamp()).await?)
    }
}
