//! JWT Token Service
//! Mission: Issue and verify the access/refresh token pair

use crate::auth::models::{Claims, TokenType, UserRecord};
use crate::models::Config;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// Issuer embedded in every token and enforced on verification.
pub const ISSUER: &str = "opsdeck-dashboard";

/// Issues and verifies the signed token pair.
///
/// Access tokens are short-lived and carry authorization claims so the
/// middleware can decide without touching the credential store. Refresh
/// tokens are long-lived and minimal; minting a fresh access token from one
/// always goes back through the store, which bounds the blast radius of a
/// leaked refresh token.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn from_config(config: &Config) -> Self {
        Self::with_ttls(
            &config.jwt_secret,
            Duration::hours(config.access_token_hours),
            Duration::days(config.refresh_token_days),
        )
    }

    /// Build a service with explicit lifetimes. Test code uses this to issue
    /// already-expired tokens.
    pub fn with_ttls(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0; // expiry is exact
        validation.set_issuer(&[ISSUER]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Issue an access token carrying role and email claims.
    pub fn issue_access(&self, user: &UserRecord) -> Result<String> {
        self.issue(user, TokenType::Access)
    }

    /// Issue a refresh token. Role and email are deliberately omitted.
    pub fn issue_refresh(&self, user: &UserRecord) -> Result<String> {
        self.issue(user, TokenType::Refresh)
    }

    fn issue(&self, user: &UserRecord, token_type: TokenType) -> Result<String> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let expiration = now
            .checked_add_signed(ttl)
            .context("token expiry overflowed")?;

        let (role, email) = match token_type {
            TokenType::Access => (Some(user.role), Some(user.email.clone())),
            TokenType::Refresh => (None, None),
        };

        let claims = Claims {
            sub: user.username.clone(),
            username: user.username.clone(),
            role,
            email,
            token_type,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding).context("failed to sign token")
    }

    /// Verify signature, expiry, and issuer. Returns `None` on any failure;
    /// callers branch on the absent value rather than an error.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                debug!("token rejected: {}", err);
                None
            }
        }
    }
}
