//! Basic credential check for operational endpoints.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header::AUTHORIZATION, header::WWW_AUTHENTICATE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use warden_core::config::BasicConfig;

use super::AuthError;

const CHALLENGE: &str = r#"Basic realm="restricted", charset="UTF-8""#;

/// A single configured username/password pair.
pub struct BasicAuth {
    username: String,
    password: SecretString,
}

impl BasicAuth {
    /// Create a checker for the given pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Create a checker from configuration.
    #[must_use]
    pub fn from_config(config: &BasicConfig) -> Self {
        Self::new(&config.username, SecretString::from(config.password.clone()))
    }

    /// Check an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Any problem with presence, scheme, encoding or the credentials
    /// themselves yields [`AuthError::InvalidCredential`].
    pub fn check(&self, header: Option<&str>) -> Result<(), AuthError> {
        let header = header.ok_or(AuthError::InvalidCredential)?;

        let mut parts = header.split(' ');
        let (Some("Basic"), Some(encoded), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidCredential);
        };

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| AuthError::InvalidCredential)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::InvalidCredential)?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or(AuthError::InvalidCredential)?;

        let matched = username.as_bytes().ct_eq(self.username.as_bytes())
            & password
                .as_bytes()
                .ct_eq(self.password.expose_secret().as_bytes());
        if bool::from(matched) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Middleware guarding a router with the configured basic credential.
pub async fn require_basic(
    State(basic): State<Arc<BasicAuth>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match basic.check(header) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            let mut response = e.into_response();
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE));
            response
        }
    }
}
