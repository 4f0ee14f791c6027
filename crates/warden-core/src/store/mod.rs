//! Persistence collaborators.
//!
//! The authorization pipeline treats these traits as the authority of
//! record. [`SledStore`] is the bundled implementation.

mod sled_store;

pub use sled_store::SledStore;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Identity, Post, PostId, Role, UserId};

/// Storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("resource not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    #[error("resource already exists: {0}")]
    Conflict(String),

    /// Login credentials did not match.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The call did not finish within its deadline.
    #[error("store call timed out")]
    Timeout,

    /// The backing database failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Backend(format!("serialization: {e}"))
    }
}

/// Lookup of user identities by their unique keys.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch an identity by ID.
    async fn get_by_id(&self, id: UserId) -> Result<Identity, StoreError>;

    /// Fetch an identity by username.
    async fn get_by_username(&self, username: &str) -> Result<Identity, StoreError>;

    /// Fetch an identity by email address.
    async fn get_by_email(&self, email: &str) -> Result<Identity, StoreError>;
}

/// Lookup of role reference data.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Fetch a role by its unique name.
    async fn get_by_name(&self, name: &str) -> Result<Role, StoreError>;
}

/// How a user identifies themselves at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Login {
    /// By username.
    Username(String),
    /// By email address.
    Email(String),
}

/// Password verification for token issuance.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Verify a password and return the matching active identity.
    ///
    /// Unknown logins, wrong passwords and inactive accounts all yield
    /// [`StoreError::InvalidCredentials`].
    async fn verify_password(&self, login: &Login, password: &str)
    -> Result<Identity, StoreError>;
}

/// Input for creating a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// Owning user.
    pub user_id: UserId,
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
}

/// Post persistence.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Create a post.
    async fn create(&self, post: NewPost) -> Result<Post, StoreError>;

    /// Fetch a post by ID.
    async fn get_by_id(&self, id: PostId) -> Result<Post, StoreError>;

    /// Overwrite title and content of an existing post.
    async fn update(&self, post: Post) -> Result<Post, StoreError>;

    /// Delete a post.
    async fn delete(&self, id: PostId) -> Result<(), StoreError>;
}

/// Run a store call with an upper bound on its duration.
///
/// Exceeding `limit` yields [`StoreError::Timeout`]. The inner future is
/// dropped, which cancels any pending wait it holds.
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(StoreError::Timeout))
}
