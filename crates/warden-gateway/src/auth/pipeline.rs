//! Per-request bearer authentication.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use warden_core::{Identity, StoreError};

use super::{AuthError, TokenCodec};
use crate::cache::IdentityCache;

/// Resolves the caller's identity from a bearer token.
#[derive(Debug)]
pub struct AuthPipeline {
    codec: Arc<TokenCodec>,
    identities: IdentityCache,
}

impl AuthPipeline {
    /// Create a pipeline.
    #[must_use]
    pub const fn new(codec: Arc<TokenCodec>, identities: IdentityCache) -> Self {
        Self { codec, identities }
    }

    /// The token codec.
    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// The identity cache.
    #[must_use]
    pub const fn identities(&self) -> &IdentityCache {
        &self.identities
    }

    /// Authenticate an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingOrMalformedCredential`] for an absent header or
    ///   one that is not exactly `Bearer <token>`
    /// - [`AuthError::InvalidCredential`] for a bad token, a bad subject, or a
    ///   subject with no active identity
    /// - [`AuthError::TransientFailure`] if the identity lookup fails
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        let token = bearer_token(header)?;
        let claims = self.codec.verify(token)?;
        let user_id = claims.subject()?;

        let identity = self.identities.get(user_id).await.map_err(|e| match e {
            StoreError::NotFound => AuthError::InvalidCredential,
            other => AuthError::TransientFailure(other),
        })?;

        if !identity.active {
            tracing::debug!(user_id = %identity.id, "inactive account presented a token");
            return Err(AuthError::InvalidCredential);
        }

        Ok(identity)
    }
}

fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingOrMalformedCredential)?;
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MissingOrMalformedCredential),
    }
}

/// Extractor for authenticated requests.
///
/// Use this in handler parameters to require a valid bearer token. The
/// identity is bound for the rest of the request and never mutated.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub Identity);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    Arc<AuthPipeline>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let pipeline = Arc::<AuthPipeline>::from_ref(state);
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| AuthError::MissingOrMalformedCredential)?,
            ),
            None => None,
        };
        pipeline.authenticate(header).await.map(RequireAuth)
    }
}
