//! # Warden Gateway
//!
//! HTTP gateway that authenticates, authorizes and rate limits requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
/// Read-through identity cache.
pub mod cache;
/// Fixed-window rate limiting.
pub mod middleware;
mod server;

pub use auth::{AuthError, AuthPipeline, AuthorizationGate, RequireAuth, TokenCodec};
pub use cache::IdentityCache;
pub use middleware::{Decision, RateLimiter};
pub use server::{ApiError, Gateway, GatewayBuilder, GatewayState, ServiceMeta};

use warden_core::Config;

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: Config) -> Result<(), GatewayError> {
    let gateway = GatewayBuilder::new().with_config(config).build()?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
