//! JWT session tokens
//!
//! Replaces the old long-lived admin key kept in browser storage with
//! short-lived signed tokens. Tokens carry the user's permission level so
//! route guards can decide without a user lookup.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::permissions::PermissionLevel;
use crate::error::MarketError;

const DEV_SECRET: &str = "dev-only-insecure-secret";

/// Claims embedded in issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Login identifier (email or username)
    pub identifier: String,
    /// Permission level at issue time
    pub permission_level: PermissionLevel,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// Issued-at, seconds since epoch
    pub iat: i64,
}

/// Result of validating a presented token
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    fn ok(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// Issues and verifies HS256 tokens with a shared secret
pub struct JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: i64,
}

impl JwtValidator {
    pub fn new(secret: &str, expiry_seconds: i64) -> Result<Self, MarketError> {
        if secret.len() < 16 {
            return Err(MarketError::Config(
                "JWT secret must be at least 16 characters".to_string(),
            ));
        }
        if expiry_seconds <= 0 {
            return Err(MarketError::Config(
                "JWT expiry must be positive".to_string(),
            ));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        })
    }

    /// Validator with a fixed secret, for dev mode and tests only
    pub fn new_dev() -> Self {
        warn!("Using insecure development JWT secret");
        Self {
            encoding_key: EncodingKey::from_secret(DEV_SECRET.as_bytes()),
            decoding_key: DecodingKey::from_secret(DEV_SECRET.as_bytes()),
            expiry_seconds: 3600,
        }
    }

    /// Issue a token for a user
    pub fn issue_token(
        &self,
        user_id: &str,
        identifier: &str,
        permission_level: PermissionLevel,
    ) -> Result<String, MarketError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            identifier: identifier.to_string(),
            permission_level,
            exp: now + self.expiry_seconds,
            iat: now,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| MarketError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Verify a presented token. Expiry and signature failures come back
    /// as a failed result, not an Err.
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        match decode::<Claims>(token, &self.decoding_key, &Validation::default()) {
            Ok(data) => TokenValidationResult::ok(data.claims),
            Err(e) => TokenValidationResult::fail(e.to_string()),
        }
    }

    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_seconds
    }
}

/// Pull the bearer token out of an Authorization header value
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim)
}
