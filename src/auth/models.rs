//! Authentication Models
//! Mission: Define user records, token claims, and request/response shapes

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Operator roles for RBAC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin, // Full access, including user administration
    #[serde(rename = "viewer")]
    Viewer, // Read and run day-to-day operations
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Viewer => "viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

/// A stored user account. Owned by the credential store; the password hash
/// never leaves it unredacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String, // bcrypt
    pub role: Role,
    pub email: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl UserRecord {
    pub fn new(username: &str, password_hash: String, role: Role, email: String) -> Self {
        Self {
            username: username.to_string(),
            password_hash,
            role,
            email,
            created_at: Utc::now().to_rfc3339(),
            last_login: None,
        }
    }
}

/// Distinguishes the two token families. A refresh token must never pass an
/// access check, and vice versa.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenType {
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "refresh")]
    Refresh,
}

/// JWT claims payload.
///
/// Access tokens carry role and email for request-time authorization without
/// a store lookup. Refresh tokens omit both so a leaked refresh token cannot
/// assert authorization claims on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (username)
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Identity attached to a request after successful verification. Ephemeral;
/// never persisted.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub role: Role,
    pub email: String,
}

/// User payload returned to clients (password hash stripped).
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub role: Role,
    pub email: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl UserInfo {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            username: record.username.clone(),
            role: record.role,
            email: record.email.clone(),
            created_at: record.created_at.clone(),
            last_login: record.last_login.clone(),
        }
    }
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Refresh request body. The token may instead arrive via cookie.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Change-password request body.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Create-user request body (admin only).
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<Role>,
    pub email: Option<String>,
}
