//! Core types used throughout Warden.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Big-endian key bytes for ordered storage.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Unique identifier for a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl PostId {
    /// Big-endian key bytes for ordered storage.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named privilege tier. Higher `level` means more privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role ID.
    pub id: u64,
    /// Unique role name (e.g. "moderator").
    pub name: String,
    /// Precedence level.
    pub level: i32,
    /// Human readable description.
    pub description: String,
}

impl Role {
    /// Name of the default role for new accounts.
    pub const USER: &'static str = "user";
    /// Name of the role allowed to edit anyone's content.
    pub const MODERATOR: &'static str = "moderator";
    /// Name of the role allowed to delete anyone's content.
    pub const ADMIN: &'static str = "admin";

    /// Built-in roles seeded into an empty store.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                id: 1,
                name: Self::USER.to_string(),
                level: 1,
                description: "A user can create posts and comments".to_string(),
            },
            Self {
                id: 2,
                name: Self::MODERATOR.to_string(),
                level: 2,
                description: "A moderator can update other users posts".to_string(),
            },
            Self {
                id: 3,
                name: Self::ADMIN.to_string(),
                level: 3,
                description: "An admin can update and delete other users posts".to_string(),
            },
        ]
    }

    /// Whether this role's privileges subsume `required`.
    #[must_use]
    pub const fn outranks_or_equals(&self, required: &Self) -> bool {
        self.level >= required.level
    }
}

/// The authenticated view of a user account.
///
/// This is a copy of the record held by the identity store. It carries
/// no credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User ID.
    pub id: UserId,
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Whether the account is active.
    pub active: bool,
    /// Assigned role.
    pub role: Role,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Anything that can be owned by a user and mutated under an ownership check.
pub trait OwnedResource {
    /// ID of the owning user.
    fn owner_id(&self) -> UserId;
}

/// A user-authored post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post ID.
    pub id: PostId,
    /// Owning user.
    pub user_id: UserId,
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl OwnedResource for Post {
    fn owner_id(&self) -> UserId {
        self.user_id
    }
}

/// Input for creating a user account.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Plaintext password; hashed before it is stored.
    pub password: String,
    /// Role name.
    pub role: String,
}
