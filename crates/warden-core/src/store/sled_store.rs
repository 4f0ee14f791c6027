//! Sled-backed store for users, roles and posts.

use std::path::Path;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CredentialStore, IdentityStore, Login, NewPost, PostStore, RoleStore, StoreError};
use crate::types::{Identity, NewUser, Post, PostId, Role, UserId};

/// Persisted user record. Only this module sees the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: UserId,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn into_identity(self, role: Role) -> Identity {
        Identity {
            id: self.id,
            username: self.username,
            email: self.email,
            active: self.active,
            role,
            created_at: self.created_at,
        }
    }
}

/// Store backed by sled.
///
/// Cloning is cheap; clones share the same database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    users: sled::Tree,
    user_index: sled::Tree,
    roles: sled::Tree,
    posts: sled::Tree,
}

impl SledStore {
    /// Open or create a store under `path`, seeding default roles if none exist.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path.join("store"))?;
        Self::with_db(db)
    }

    /// Create a store over an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if a tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let store = Self {
            users: db.open_tree("users")?,
            user_index: db.open_tree("user_index")?,
            roles: db.open_tree("roles")?,
            posts: db.open_tree("posts")?,
            db,
        };

        if store.roles.is_empty() {
            for role in Role::defaults() {
                store.put_role(&role)?;
            }
            tracing::info!("Seeded default roles");
        }

        Ok(store)
    }

    /// Insert or replace a role.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn put_role(&self, role: &Role) -> Result<(), StoreError> {
        self.roles
            .insert(role.name.as_bytes(), serde_json::to_vec(role)?)?;
        Ok(())
    }

    /// Fetch a role by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such role exists.
    pub fn role(&self, name: &str) -> Result<Role, StoreError> {
        let value = self.roles.get(name.as_bytes())?.ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&value)?)
    }

    /// List all roles ordered by level.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let mut roles = self
            .roles
            .iter()
            .values()
            .map(|v| Ok(serde_json::from_slice::<Role>(&v?)?))
            .collect::<Result<Vec<_>, StoreError>>()?;
        roles.sort_by_key(|r| r.level);
        Ok(roles)
    }

    /// Flush pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Count user accounts.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Create a user with an argon2id password hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the username or email is taken and
    /// [`StoreError::NotFound`] if the role does not exist.
    pub fn create_user(&self, new_user: &NewUser) -> Result<Identity, StoreError> {
        let role = self.role(&new_user.role)?;
        let id = UserId(self.db.generate_id()? + 1);
        let id_bytes = id.to_be_bytes();

        let username_key = username_key(&new_user.username);
        let email_key = email_key(&new_user.email);

        // Claim the unique keys first; the loser of a race sees a conflict.
        if self
            .user_index
            .compare_and_swap(&username_key, None as Option<&[u8]>, Some(&id_bytes[..]))?
            .is_err()
        {
            return Err(StoreError::Conflict(format!(
                "username {}",
                new_user.username
            )));
        }
        if self
            .user_index
            .compare_and_swap(&email_key, None as Option<&[u8]>, Some(&id_bytes[..]))?
            .is_err()
        {
            self.user_index.remove(&username_key)?;
            return Err(StoreError::Conflict(format!("email {}", new_user.email)));
        }

        let record = UserRecord {
            id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: hash_password(&new_user.password)?,
            role: role.name.clone(),
            active: true,
            created_at: Utc::now(),
        };
        self.write_user(&record)?;
        self.db.flush()?;

        Ok(record.into_identity(role))
    }

    /// Fetch a user by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such user exists.
    pub fn user(&self, id: UserId) -> Result<Identity, StoreError> {
        self.identity(self.record(id)?)
    }

    /// Fetch a user by username.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such user exists.
    pub fn user_by_username(&self, username: &str) -> Result<Identity, StoreError> {
        self.identity(self.record_by_key(&username_key(username))?)
    }

    /// Fetch a user by email.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such user exists.
    pub fn user_by_email(&self, email: &str) -> Result<Identity, StoreError> {
        self.identity(self.record_by_key(&email_key(email))?)
    }

    /// List all users.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list_users(&self) -> Result<Vec<Identity>, StoreError> {
        let mut users = Vec::new();
        for value in self.users.iter().values() {
            let record: UserRecord = serde_json::from_slice(&value?)?;
            users.push(self.identity(record)?);
        }
        Ok(users)
    }

    /// Activate or deactivate a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such user exists.
    pub fn set_active(&self, id: UserId, active: bool) -> Result<Identity, StoreError> {
        let mut record = self.record(id)?;
        record.active = active;
        self.write_user(&record)?;
        self.identity(record)
    }

    /// Assign a role to a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the user or role does not exist.
    pub fn set_role(&self, id: UserId, role_name: &str) -> Result<Identity, StoreError> {
        let role = self.role(role_name)?;
        let mut record = self.record(id)?;
        record.role = role.name.clone();
        self.write_user(&record)?;
        Ok(record.into_identity(role))
    }

    /// Delete a user and its index entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such user exists.
    pub fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let record = self.record(id)?;
        self.user_index.remove(username_key(&record.username))?;
        self.user_index.remove(email_key(&record.email))?;
        self.users.remove(id.to_be_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// Check a password for a login.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCredentials`] for unknown logins, wrong
    /// passwords and inactive accounts.
    pub fn check_password(&self, login: &Login, password: &str) -> Result<Identity, StoreError> {
        let key = match login {
            Login::Username(username) => username_key(username),
            Login::Email(email) => email_key(email),
        };
        let record = match self.record_by_key(&key) {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(StoreError::InvalidCredentials),
            Err(e) => return Err(e),
        };
        if !record.active {
            return Err(StoreError::InvalidCredentials);
        }
        verify_password(password, &record.password_hash)?;
        self.identity(record)
    }

    /// Create a post.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn create_post(&self, new_post: NewPost) -> Result<Post, StoreError> {
        let now = Utc::now();
        let post = Post {
            id: PostId(self.db.generate_id()? + 1),
            user_id: new_post.user_id,
            title: new_post.title,
            content: new_post.content,
            created_at: now,
            updated_at: now,
        };
        self.posts
            .insert(post.id.to_be_bytes(), serde_json::to_vec(&post)?)?;
        Ok(post)
    }

    /// Fetch a post.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such post exists.
    pub fn post(&self, id: PostId) -> Result<Post, StoreError> {
        let value = self
            .posts
            .get(id.to_be_bytes())?
            .ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&value)?)
    }

    /// Update title and content of a post.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such post exists.
    pub fn update_post(&self, post: Post) -> Result<Post, StoreError> {
        let existing = self.post(post.id)?;
        let updated = Post {
            title: post.title,
            content: post.content,
            updated_at: Utc::now(),
            ..existing
        };
        self.posts
            .insert(updated.id.to_be_bytes(), serde_json::to_vec(&updated)?)?;
        Ok(updated)
    }

    /// Delete a post.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such post exists.
    pub fn delete_post(&self, id: PostId) -> Result<(), StoreError> {
        self.posts
            .remove(id.to_be_bytes())?
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn record(&self, id: UserId) -> Result<UserRecord, StoreError> {
        let value = self
            .users
            .get(id.to_be_bytes())?
            .ok_or(StoreError::NotFound)?;
        Ok(serde_json::from_slice(&value)?)
    }

    fn record_by_key(&self, index_key: &str) -> Result<UserRecord, StoreError> {
        let id_bytes = self
            .user_index
            .get(index_key.as_bytes())?
            .ok_or(StoreError::NotFound)?;
        let bytes: [u8; 8] = id_bytes
            .as_ref()
            .try_into()
            .map_err(|_| StoreError::Backend(format!("corrupt index entry {index_key}")))?;
        self.record(UserId(u64::from_be_bytes(bytes)))
    }

    fn write_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        self.users
            .insert(record.id.to_be_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    fn identity(&self, record: UserRecord) -> Result<Identity, StoreError> {
        let role = match self.role(&record.role) {
            Ok(role) => role,
            Err(StoreError::NotFound) => {
                return Err(StoreError::Backend(format!(
                    "user {} references unknown role {}",
                    record.id, record.role
                )));
            }
            Err(e) => return Err(e),
        };
        Ok(record.into_identity(role))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Self) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(&this))
            .await
            .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("users", &self.users.len())
            .field("posts", &self.posts.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentityStore for SledStore {
    async fn get_by_id(&self, id: UserId) -> Result<Identity, StoreError> {
        self.blocking(move |s| s.user(id)).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Identity, StoreError> {
        let username = username.to_string();
        self.blocking(move |s| s.user_by_username(&username)).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Identity, StoreError> {
        let email = email.to_string();
        self.blocking(move |s| s.user_by_email(&email)).await
    }
}

#[async_trait]
impl RoleStore for SledStore {
    async fn get_by_name(&self, name: &str) -> Result<Role, StoreError> {
        let name = name.to_string();
        self.blocking(move |s| s.role(&name)).await
    }
}

#[async_trait]
impl CredentialStore for SledStore {
    async fn verify_password(
        &self,
        login: &Login,
        password: &str,
    ) -> Result<Identity, StoreError> {
        let login = login.clone();
        let password = password.to_string();
        self.blocking(move |s| s.check_password(&login, &password))
            .await
    }
}

#[async_trait]
impl PostStore for SledStore {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        self.blocking(move |s| s.create_post(post)).await
    }

    async fn get_by_id(&self, id: PostId) -> Result<Post, StoreError> {
        self.blocking(move |s| s.post(id)).await
    }

    async fn update(&self, post: Post) -> Result<Post, StoreError> {
        self.blocking(move |s| s.update_post(post)).await
    }

    async fn delete(&self, id: PostId) -> Result<(), StoreError> {
        self.blocking(move |s| s.delete_post(id)).await
    }
}

fn username_key(username: &str) -> String {
    format!("username:{username}")
}

fn email_key(email: &str) -> String {
    format!("email:{email}")
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| StoreError::Backend(format!("password hashing failed: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), StoreError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| StoreError::Backend(format!("invalid hash: {e}")))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| StoreError::InvalidCredentials)
}
