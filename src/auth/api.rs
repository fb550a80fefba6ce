//! Authentication API Endpoints
//! Mission: Provide login, token refresh, and user management endpoints

use crate::auth::{
    jwt::TokenService,
    models::{
        ChangePasswordRequest, CreateUserRequest, Identity, LoginRequest, RefreshRequest, Role,
        TokenType, UserInfo, UserRecord,
    },
    session::{SessionRegistry, SessionTokens},
    store::{self, CredentialStore, BOOTSTRAP_ADMIN, DEFAULT_EMAIL_DOMAIN},
    ACCESS_COOKIE, REFRESH_COOKIE, SESSION_COOKIE,
};
use crate::models::Config;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use time::Duration as CookieDuration;
use tracing::{error, info, warn};

/// Shared auth state.
#[derive(Clone)]
pub struct AuthState {
    pub store: Arc<CredentialStore>,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionRegistry>,

    /// Production deployments mark auth cookies `Secure`.
    pub secure_cookies: bool,
    pub access_cookie_max_age: CookieDuration,
    pub refresh_cookie_max_age: CookieDuration,
}

impl AuthState {
    pub fn new(
        store: Arc<CredentialStore>,
        tokens: Arc<TokenService>,
        sessions: Arc<SessionRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            tokens,
            sessions,
            secure_cookies: config.production,
            access_cookie_max_age: CookieDuration::hours(config.access_token_hours),
            refresh_cookie_max_age: CookieDuration::days(config.refresh_token_days),
        }
    }

    fn cookie(&self, name: &'static str, value: String, max_age: CookieDuration) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure_cookies)
            .path("/")
            .max_age(max_age)
            .build()
    }
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

fn internal(err: anyhow::Error) -> AuthApiError {
    error!("auth internal error: {:#}", err);
    AuthApiError::Internal
}

/// Login - POST /api/auth/login
///
/// Unknown usernames and wrong passwords produce the same response so the
/// endpoint cannot be used to enumerate accounts.
pub async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AuthApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(AuthApiError::MissingCredentials);
    }

    info!("Login attempt: {}", payload.username);

    let mut users = state.store.load().await;

    let Some(user) = users.get_mut(&payload.username) else {
        warn!("Failed login attempt: {}", payload.username);
        return Err(AuthApiError::InvalidCredentials);
    };

    if !store::verify_password(&payload.password, &user.password_hash).await {
        warn!("Failed login attempt: {}", payload.username);
        return Err(AuthApiError::InvalidCredentials);
    }

    let access_token = state.tokens.issue_access(user).map_err(internal)?;
    let refresh_token = state.tokens.issue_refresh(user).map_err(internal)?;

    let session_id = state.sessions.create(
        &user.username,
        SessionTokens {
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
        },
    );

    user.last_login = Some(Utc::now().to_rfc3339());
    let user_info = UserInfo::from_record(user);

    if !state.store.save(&users).await {
        // Login still succeeds; only the last_login stamp is lost.
        warn!("Failed to persist last_login for {}", user_info.username);
    }

    info!(
        "Login successful: {} ({})",
        user_info.username,
        user_info.role.as_str()
    );

    let jar = jar
        .add(state.cookie(
            ACCESS_COOKIE,
            access_token.clone(),
            state.access_cookie_max_age,
        ))
        .add(state.cookie(
            REFRESH_COOKIE,
            refresh_token.clone(),
            state.refresh_cookie_max_age,
        ))
        .add(state.cookie(SESSION_COOKIE, session_id, state.access_cookie_max_age));

    Ok((
        jar,
        Json(json!({
            "success": true,
            "user": user_info,
            "tokens": {
                "access_token": access_token,
                "refresh_token": refresh_token,
            },
        })),
    ))
}

/// Logout - POST /api/auth/logout
///
/// Idempotent: succeeds with or without a live session.
pub async fn logout(
    State(state): State<AuthState>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.destroy(cookie.value());
    }

    let jar = jar
        .remove(removal_cookie(ACCESS_COOKIE))
        .remove(removal_cookie(REFRESH_COOKIE))
        .remove(removal_cookie(SESSION_COOKIE));

    (
        jar,
        Json(json!({ "success": true, "message": "Logged out successfully" })),
    )
}

/// Refresh - POST /api/auth/refresh
///
/// Accepts the refresh token from the body or the refresh cookie. The
/// refresh token itself is not rotated here; it stays valid until its
/// natural expiry.
pub async fn refresh(
    State(state): State<AuthState>,
    jar: CookieJar,
    payload: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<Value>), AuthApiError> {
    let token = payload
        .and_then(|Json(p)| p.refresh_token)
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AuthApiError::NoRefreshToken)?;

    let claims = state
        .tokens
        .verify(&token)
        .ok_or(AuthApiError::InvalidRefreshToken)?;

    if claims.token_type != TokenType::Refresh {
        return Err(AuthApiError::InvalidRefreshToken);
    }

    // Re-consult the store so revoked accounts stop refreshing and role or
    // email changes land in the new access token.
    let users = state.store.load().await;
    let user = users
        .get(&claims.username)
        .ok_or(AuthApiError::RefreshUserGone)?;

    let access_token = state.tokens.issue_access(user).map_err(internal)?;

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state
            .sessions
            .update_access_token(cookie.value(), &access_token);
    }

    let jar = jar.add(state.cookie(
        ACCESS_COOKIE,
        access_token.clone(),
        state.access_cookie_max_age,
    ));

    Ok((
        jar,
        Json(json!({ "success": true, "access_token": access_token })),
    ))
}

/// Get current user - GET /api/auth/user
pub async fn get_current_user(
    State(state): State<AuthState>,
    identity: Option<Extension<Identity>>,
) -> Result<Json<Value>, AuthApiError> {
    let Extension(identity) = identity.ok_or(AuthApiError::NotAuthenticated)?;

    let users = state.store.load().await;
    let user = users
        .get(&identity.username)
        .ok_or(AuthApiError::UserNotFound)?;

    Ok(Json(json!({
        "success": true,
        "user": UserInfo::from_record(user),
    })))
}

/// Change password - POST /api/auth/change-password
pub async fn change_password(
    State(state): State<AuthState>,
    identity: Option<Extension<Identity>>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AuthApiError> {
    let Extension(identity) = identity.ok_or(AuthApiError::NotAuthenticated)?;

    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(AuthApiError::MissingPasswordFields);
    }
    if payload.new_password.len() < 8 {
        return Err(AuthApiError::NewPasswordTooShort);
    }

    let mut users = state.store.load().await;
    let Some(user) = users.get_mut(&identity.username) else {
        return Err(AuthApiError::UserNotFound);
    };

    if !store::verify_password(&payload.current_password, &user.password_hash).await {
        return Err(AuthApiError::CurrentPasswordIncorrect);
    }

    user.password_hash = store::hash_password(&payload.new_password)
        .await
        .map_err(internal)?;

    if !state.store.save(&users).await {
        return Err(AuthApiError::Internal);
    }

    info!("Password changed for {}", identity.username);

    Ok(Json(
        json!({ "success": true, "message": "Password changed successfully" }),
    ))
}

/// Create user - POST /api/auth/users (admin only)
pub async fn create_user(
    State(state): State<AuthState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<Value>, AuthApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(AuthApiError::MissingCredentials);
    }
    if payload.password.len() < 8 {
        return Err(AuthApiError::PasswordTooShort);
    }

    let mut users = state.store.load().await;
    if users.contains_key(&payload.username) {
        return Err(AuthApiError::DuplicateUser);
    }

    let role = payload.role.unwrap_or(Role::Viewer);
    let email = payload
        .email
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| format!("{}@{}", payload.username, DEFAULT_EMAIL_DOMAIN));

    let password_hash = store::hash_password(&payload.password)
        .await
        .map_err(internal)?;

    let record = UserRecord::new(&payload.username, password_hash, role, email);
    let user_info = UserInfo::from_record(&record);
    users.insert(record.username.clone(), record);

    if !state.store.save(&users).await {
        return Err(AuthApiError::Internal);
    }

    info!(
        "Created user: {} ({})",
        user_info.username,
        user_info.role.as_str()
    );

    Ok(Json(json!({ "success": true, "user": user_info })))
}

/// List users - GET /api/auth/users (admin only)
pub async fn list_users(State(state): State<AuthState>) -> Json<Value> {
    let users = state.store.load().await;

    let mut list: Vec<UserInfo> = users.values().map(UserInfo::from_record).collect();
    list.sort_by(|a, b| a.username.cmp(&b.username));
    let total = list.len();

    Json(json!({ "success": true, "users": list, "total": total }))
}

/// Delete user - DELETE /api/auth/users/:username (admin only)
///
/// The bootstrap admin account and the caller's own account are protected.
pub async fn delete_user(
    State(state): State<AuthState>,
    identity: Option<Extension<Identity>>,
    Path(username): Path<String>,
) -> Result<Json<Value>, AuthApiError> {
    let Extension(identity) = identity.ok_or(AuthApiError::NotAuthenticated)?;

    if username == BOOTSTRAP_ADMIN {
        return Err(AuthApiError::ProtectedUser);
    }
    if username == identity.username {
        return Err(AuthApiError::SelfDeletion);
    }

    let mut users = state.store.load().await;
    if users.remove(&username).is_none() {
        return Err(AuthApiError::UserNotFound);
    }

    if !state.store.save(&users).await {
        return Err(AuthApiError::Internal);
    }

    info!("Deleted user: {}", username);

    Ok(Json(
        json!({ "success": true, "message": "User deleted successfully" }),
    ))
}

/// Auth API errors.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthApiError {
    MissingCredentials,
    MissingPasswordFields,
    PasswordTooShort,
    NewPasswordTooShort,
    InvalidCredentials,
    CurrentPasswordIncorrect,
    NotAuthenticated,
    NoRefreshToken,
    InvalidRefreshToken,
    RefreshUserGone,
    UserNotFound,
    DuplicateUser,
    ProtectedUser,
    SelfDeletion,
    Internal,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::MissingCredentials => {
                (StatusCode::BAD_REQUEST, "Username and password required")
            }
            AuthApiError::MissingPasswordFields => (
                StatusCode::BAD_REQUEST,
                "Current and new password required",
            ),
            AuthApiError::PasswordTooShort => (
                StatusCode::BAD_REQUEST,
                "Password must be at least 8 characters",
            ),
            AuthApiError::NewPasswordTooShort => (
                StatusCode::BAD_REQUEST,
                "New password must be at least 8 characters",
            ),
            AuthApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
            AuthApiError::CurrentPasswordIncorrect => {
                (StatusCode::UNAUTHORIZED, "Current password incorrect")
            }
            AuthApiError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Not authenticated"),
            AuthApiError::NoRefreshToken => {
                (StatusCode::UNAUTHORIZED, "No refresh token provided")
            }
            AuthApiError::InvalidRefreshToken => {
                (StatusCode::UNAUTHORIZED, "Invalid refresh token")
            }
            AuthApiError::RefreshUserGone => (StatusCode::UNAUTHORIZED, "User not found"),
            AuthApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            AuthApiError::DuplicateUser => (StatusCode::CONFLICT, "Username already exists"),
            AuthApiError::ProtectedUser => (StatusCode::FORBIDDEN, "Cannot delete admin user"),
            AuthApiError::SelfDeletion => (StatusCode::FORBIDDEN, "Cannot delete yourself"),
            AuthApiError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (
            status,
            Json(json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}
