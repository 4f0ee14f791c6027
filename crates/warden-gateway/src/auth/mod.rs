//! Authentication and authorization.
//!
//! This module provides:
//! - Bearer token issuance and verification
//! - Basic credential checks for operational endpoints
//! - The per-request authentication pipeline and its axum extractor
//! - The owner-or-role authorization gate

mod basic;
mod gate;
mod pipeline;
mod token;

pub use basic::{BasicAuth, require_basic};
pub use gate::{AuthorizationGate, RoleResolver};
pub use pipeline::{AuthPipeline, RequireAuth};
pub use token::{Claims, IssuedToken, TokenCodec};

use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use warden_core::StoreError;

/// Errors raised by the authorization pipeline.
///
/// Every variant maps to a stable status code and machine-readable kind.
/// The `Display` text may carry internal detail and is only logged; clients
/// see [`AuthError::public_message`].
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authorization header, or it is not `<scheme> <value>`.
    #[error("missing or malformed authorization header")]
    MissingOrMalformedCredential,

    /// Bad signature, bad claims, bad subject, or unknown subject.
    #[error("invalid credential")]
    InvalidCredential,

    /// Authenticated but not allowed to perform the action.
    #[error("forbidden")]
    Forbidden,

    /// Too many requests from this client in the current window.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited {
        /// Time until the client's window ends.
        retry_after: Duration,
    },

    /// A backing store failed or timed out. Safe to retry.
    #[error("transient failure: {0}")]
    TransientFailure(#[source] StoreError),

    /// Unexpected condition, e.g. a route requires a role that does not exist.
    #[error("internal error: {0}")]
    Internal(String),

    /// The token could not be signed.
    #[error("signing error: {0}")]
    Signing(String),
}

impl AuthError {
    /// Stable machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingOrMalformedCredential => "missing_credential",
            Self::InvalidCredential => "invalid_credential",
            Self::Forbidden => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::TransientFailure(_) => "transient_failure",
            Self::Internal(_) | Self::Signing(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingOrMalformedCredential | Self::InvalidCredential => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::TransientFailure(_) | Self::Internal(_) | Self::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Generic message safe to show to clients.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::MissingOrMalformedCredential | Self::InvalidCredential => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::RateLimited { .. } => "rate limit exceeded",
            Self::TransientFailure(_) | Self::Internal(_) | Self::Signing(_) => {
                "the server encountered a problem"
            }
        }
    }
}

/// Error body returned to clients.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: &'static str,
    pub(crate) code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.public_message(),
            code: self.kind(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
        }

        response
    }
}

/// Whole seconds for a `Retry-After` header, never zero.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::MissingOrMalformedCredential.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::InvalidCredential.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::RateLimited {
                retry_after: Duration::from_secs(5)
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::TransientFailure(StoreError::Timeout).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_cause() {
        let err = AuthError::TransientFailure(StoreError::Backend("disk on fire".into()));
        assert!(err.to_string().contains("disk on fire"));
        assert!(!err.public_message().contains("disk"));
        assert_eq!(err.kind(), "transient_failure");
        assert_eq!(
            AuthError::Signing("bad key".into()).kind(),
            AuthError::Internal("boom".into()).kind()
        );
    }

    #[test]
    fn test_retry_after_header() {
        let response = AuthError::RateLimited {
            retry_after: Duration::from_millis(4200),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "5");

        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(5)), 5);
    }
}
