//! # Warden Core
//!
//! Core types, configuration, and storage for Warden.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - Domain types for identities, roles and owned resources
//! - Persistence collaborator traits and a sled-backed implementation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod store;
pub mod types;

pub use config::{Config, ConfigError};
pub use store::{
    CredentialStore, IdentityStore, Login, NewPost, PostStore, RoleStore, SledStore, StoreError,
};
pub use types::{Identity, NewUser, OwnedResource, Post, PostId, Role, UserId};
