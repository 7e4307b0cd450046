//! Token issuance and verification.
//!
//! Two disjoint token families share one HS256 secret but never a claim
//! shape. Access tokens carry `{sub, exp}` only; purpose tokens (email
//! confirmation, password reset) additionally carry `iat` and their
//! workflow-specific claims. Every claim struct denies unknown fields, so
//! a token of one family never decodes as another.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::errors::AppError;

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_expiration_seconds: i64,
    purpose_token_ttl_days: i64,
}

/// Claims of a bearer access token. No `iat`, and no extra fields
/// tolerated: purpose tokens must never pass as access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessClaims {
    /// Username of the authenticated session.
    pub sub: String,
    pub exp: i64,
}

/// Claims of an email-confirmation token. The unconfirmed registration
/// lives entirely inside this signed token: no user row exists until it
/// is redeemed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmClaims {
    /// Email being confirmed.
    pub sub: String,
    pub email: String,
    pub username: String,
    /// Argon2 hash of the pending password; the plaintext is never
    /// embedded anywhere.
    pub password: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a password-reset token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetClaims {
    /// Email of the account being reset.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_expiration_seconds: config.access_expiration_seconds,
            purpose_token_ttl_days: config.purpose_token_ttl_days,
        }
    }

    /// Issue a bearer access token for `username`. `ttl_seconds` overrides
    /// the configured expiration when given.
    pub fn issue_access_token(
        &self,
        username: &str,
        ttl_seconds: Option<i64>,
    ) -> Result<String, AppError> {
        let ttl = ttl_seconds.unwrap_or(self.access_expiration_seconds);
        let claims = AccessClaims {
            sub: username.to_string(),
            exp: (Utc::now() + Duration::seconds(ttl)).timestamp(),
        };
        self.encode_claims(&claims)
    }

    /// Issue an email-confirmation token embedding the pending account.
    pub fn issue_confirmation_token(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        ttl_days: Option<i64>,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let ttl = ttl_days.unwrap_or(self.purpose_token_ttl_days);
        let claims = ConfirmClaims {
            sub: email.to_string(),
            email: email.to_string(),
            username: username.to_string(),
            password: password_hash.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(ttl)).timestamp(),
        };
        self.encode_claims(&claims)
    }

    /// Issue a password-reset token for `email`.
    pub fn issue_reset_token(&self, email: &str, ttl_days: Option<i64>) -> Result<String, AppError> {
        let now = Utc::now();
        let ttl = ttl_days.unwrap_or(self.purpose_token_ttl_days);
        let claims = ResetClaims {
            sub: email.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(ttl)).timestamp(),
        };
        self.encode_claims(&claims)
    }

    /// Verify a bearer access token. Any failure collapses to
    /// `Unauthorized` with one message.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        self.decode_claims(token)
            .map_err(|_| AppError::Unauthorized("Could not validate credentials".to_string()))
    }

    /// Verify an email-confirmation token.
    pub fn verify_confirmation_token(&self, token: &str) -> Result<ConfirmClaims, AppError> {
        self.decode_claims(token).map_err(|_| AppError::InvalidToken)
    }

    /// Verify a password-reset token.
    pub fn verify_reset_token(&self, token: &str) -> Result<ResetClaims, AppError> {
        self.decode_claims(token).map_err(|_| AppError::InvalidToken)
    }

    fn encode_claims<T: Serialize>(&self, claims: &T) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    // Signature, expiry, and claim-shape failures are indistinguishable to
    // the caller (no oracle leakage).
    fn decode_claims<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<T, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<T>(token, &self.decoding_key, &validation).map(|data| data.claims)
    }
}
