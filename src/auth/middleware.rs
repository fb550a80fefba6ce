//! Authentication Middleware
//! Mission: Gate every protected endpoint behind token verification

use crate::auth::api::AuthState;
use crate::auth::models::{Claims, Identity, Role, TokenType};
use crate::auth::{ACCESS_COOKIE, SESSION_COOKIE};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde_json::json;
use tracing::error;

/// Request gate: extract a token, verify it, attach the caller's identity.
///
/// Token lookup order: `Authorization: Bearer` header, then the access-token
/// cookie, then a `token` query parameter (WebSocket clients cannot set
/// headers). Session touching is best effort; tokens remain the source of
/// truth.
pub async fn authenticate(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_token(&req, &jar).ok_or(AuthError::NoToken)?;

    let claims = state.tokens.verify(&token).ok_or(AuthError::InvalidToken)?;

    if claims.token_type != TokenType::Access {
        return Err(AuthError::InvalidTokenType);
    }

    let identity = identity_from_claims(claims)?;
    req.extensions_mut().insert(identity);

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.touch(cookie.value());
    }

    Ok(next.run(req).await)
}

/// Role gate, layered after [`authenticate`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AuthError> {
    let identity = extract_identity(&req).ok_or(AuthError::NotAuthenticated)?;

    if identity.role != Role::Admin {
        return Err(AuthError::AdminRequired);
    }

    Ok(next.run(req).await)
}

/// Like [`authenticate`], but any failure proceeds without an identity
/// attached. Never rejects.
pub async fn optional_auth(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(&req, &jar) {
        if let Some(claims) = state.tokens.verify(&token) {
            if claims.token_type == TokenType::Access {
                if let Ok(identity) = identity_from_claims(claims) {
                    req.extensions_mut().insert(identity);
                }
            }
        }
    }

    next.run(req).await
}

/// Identity attached by [`authenticate`], if any (use after the middleware).
pub fn extract_identity(req: &Request) -> Option<&Identity> {
    req.extensions().get::<Identity>()
}

fn extract_token(req: &Request, jar: &CookieJar) -> Option<String> {
    bearer_token(req)
        .or_else(|| jar.get(ACCESS_COOKIE).map(|c| c.value().to_string()))
        .or_else(|| query_token(req))
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

fn query_token(req: &Request) -> Option<String> {
    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

/// An access token is expected to carry role and email; one that verified
/// but lacks them is malformed and reported as an internal fault, not a
/// policy rejection.
fn identity_from_claims(claims: Claims) -> Result<Identity, AuthError> {
    let Some(role) = claims.role else {
        error!(
            "access token for {} verified without a role claim",
            claims.username
        );
        return Err(AuthError::Internal);
    };

    Ok(Identity {
        username: claims.username,
        role,
        email: claims.email.unwrap_or_default(),
    })
}

/// Middleware rejection states.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    NoToken,
    InvalidToken,
    InvalidTokenType,
    NotAuthenticated,
    AdminRequired,
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::NoToken => (StatusCode::UNAUTHORIZED, "No token provided"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::InvalidTokenType => (StatusCode::UNAUTHORIZED, "Invalid token type"),
            AuthError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::AdminRequired => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed"),
        };

        (
            status,
            Json(json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}
