//! Bearer token encoding and verification.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use warden_core::UserId;
use warden_core::config::TokenConfig;

use super::AuthError;

/// The only MAC algorithm accepted for signing and verification.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Token claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Not before (Unix timestamp).
    pub nbf: i64,
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: String,
}

impl Claims {
    /// Parse the subject as a user ID.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredential`] if the subject is not numeric.
    pub fn subject(&self) -> Result<UserId, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidCredential)
    }
}

/// A freshly issued token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    /// Encoded token.
    pub token: String,
    /// When the token stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HMAC-signed bearer tokens.
///
/// Holds no mutable state: verification is a pure function of the
/// configured secret, issuer, audience and the input token.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    lifetime: Duration,
    usable: bool,
}

impl TokenCodec {
    /// Create a codec.
    ///
    /// An empty secret yields a codec that refuses to sign and rejects
    /// every token.
    #[must_use]
    pub fn new(
        secret: &SecretString,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        lifetime: Duration,
    ) -> Self {
        let issuer = issuer.into();
        let audience = audience.into();
        let bytes = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            validation,
            issuer,
            audience,
            lifetime,
            usable: !bytes.is_empty(),
        }
    }

    /// Create a codec from configuration, generating an ephemeral secret
    /// when none is configured.
    #[must_use]
    pub fn from_config(config: &TokenConfig) -> Self {
        let secret = match &config.secret {
            Some(secret) => SecretString::from(secret.clone()),
            None => {
                tracing::warn!(
                    "No token secret configured; generated an ephemeral one. \
                     Tokens will not survive a restart."
                );
                SecretString::from(Self::generate_hex_secret())
            }
        };
        Self::new(&secret, &config.issuer, &config.audience, config.expiry())
    }

    /// Generate a random 256-bit secret as a hex string.
    #[must_use]
    pub fn generate_hex_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Configured token lifetime.
    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Sign a claim set.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if the secret is unusable or encoding fails.
    pub fn issue(&self, claims: &Claims) -> Result<String, AuthError> {
        if !self.usable {
            return Err(AuthError::Signing("signing secret is empty".to_string()));
        }
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Issue a token for `user` valid from now for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if signing fails.
    pub fn issue_for(&self, user: UserId) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(self.lifetime).unwrap_or_default();

        let claims = Claims {
            sub: user.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        Ok(IssuedToken {
            token: self.issue(&claims)?,
            expires_at,
        })
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`AuthError::InvalidCredential`].
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if !self.usable {
            return Err(AuthError::InvalidCredential);
        }
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(reason = ?e.kind(), "token rejected");
                AuthError::InvalidCredential
            })
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HOUR: Duration = Duration::from_secs(3600);

    fn codec(secret: &str, issuer: &str, audience: &str) -> TokenCodec {
        TokenCodec::new(&SecretString::from(secret.to_string()), issuer, audience, HOUR)
    }

    fn claims_at(exp_offset: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: "7".to_string(),
            exp: now + exp_offset,
            iat: now,
            nbf: now,
            iss: "warden".to_string(),
            aud: "warden".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let codec = codec("secret", "warden", "warden");
        let claims = claims_at(3600);
        let token = codec.issue(&claims).unwrap();

        let decoded = codec.verify(&token).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.subject().unwrap(), UserId(7));
    }

    #[test]
    fn test_issue_for_uses_configuration() {
        let codec = codec("secret", "warden", "warden");
        let issued = codec.issue_for(UserId(42)).unwrap();
        let claims = codec.verify(&issued.token).unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.iss, "warden");
        assert_eq!(claims.aud, "warden");
        assert_eq!(claims.exp, issued.expires_at.timestamp());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = codec("secret-a", "warden", "warden")
            .issue(&claims_at(3600))
            .unwrap();
        let result = codec("secret-b", "warden", "warden").verify(&token);
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let token = codec("secret", "someone-else", "warden")
            .issue_for(UserId(1))
            .unwrap()
            .token;
        let result = codec("secret", "warden", "warden").verify(&token);
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let token = codec("secret", "warden", "elsewhere")
            .issue_for(UserId(1))
            .unwrap()
            .token;
        let result = codec("secret", "warden", "warden").verify(&token);
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_expired_one_second_ago() {
        let codec = codec("secret", "warden", "warden");
        let token = codec.issue(&claims_at(-1)).unwrap();
        assert!(matches!(
            codec.verify(&token),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_not_yet_valid_rejected() {
        let codec = codec("secret", "warden", "warden");
        let mut claims = claims_at(7200);
        claims.nbf += 600;
        let token = codec.issue(&claims).unwrap();
        assert!(matches!(
            codec.verify(&token),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_algorithm_substitution_rejected() {
        let claims = claims_at(3600);
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let result = codec("secret", "warden", "warden").verify(&token);
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_missing_expiry_rejected() {
        #[derive(Serialize)]
        struct NoExpiry {
            sub: String,
            iat: i64,
            nbf: i64,
            iss: String,
            aud: String,
        }

        let now = Utc::now().timestamp();
        let token = encode(
            &Header::new(ALGORITHM),
            &NoExpiry {
                sub: "1".to_string(),
                iat: now,
                nbf: now,
                iss: "warden".to_string(),
                aud: "warden".to_string(),
            },
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let result = codec("secret", "warden", "warden").verify(&token);
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = codec("secret", "warden", "warden");
        assert!(codec.verify("").is_err());
        assert!(codec.verify("not.a.token").is_err());
    }

    #[test]
    fn test_empty_secret_is_unusable() {
        let codec = codec("", "warden", "warden");
        assert!(matches!(
            codec.issue(&claims_at(3600)),
            Err(AuthError::Signing(_))
        ));

        let forged = encode(
            &Header::new(ALGORITHM),
            &claims_at(3600),
            &EncodingKey::from_secret(b""),
        )
        .unwrap();
        assert!(matches!(
            codec.verify(&forged),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_non_numeric_subject() {
        let mut claims = claims_at(3600);
        claims.sub = "alice".to_string();
        assert!(matches!(claims.subject(), Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_generated_secret_shape() {
        let a = TokenCodec::generate_hex_secret();
        let b = TokenCodec::generate_hex_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
