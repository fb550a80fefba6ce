//! End-to-end tests for the authentication flow.
//!
//! Each test assembles the real router against a temporary credential store
//! and drives it with in-memory requests; no sockets and no external script
//! installation are involved.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use opsdeck_backend::api::AppState;
use opsdeck_backend::auth::{AuthState, CredentialStore, SessionRegistry, TokenService};
use opsdeck_backend::middleware::{RateLimitConfig, RateLimitLayer};
use opsdeck_backend::ops::ScriptRunner;
use opsdeck_backend::server::build_router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

const TEST_SECRET: &str = "integration-test-secret-key";

struct TestApp {
    app: Router,
    admin_password: String,
    // Keeps the credential store file alive for the test's duration.
    _dir: TempDir,
}

async fn test_app() -> TestApp {
    test_app_with_limiter(RateLimitConfig {
        max_requests: 1000,
        window: Duration::from_secs(60),
        burst: 0,
    })
    .await
}

async fn test_app_with_limiter(limit: RateLimitConfig) -> TestApp {
    let dir = TempDir::new().unwrap();

    let store = Arc::new(CredentialStore::new(dir.path().join("users.json")));
    let admin_password = store
        .initialize()
        .await
        .expect("store init")
        .expect("first run generates a password");

    let tokens = Arc::new(TokenService::with_ttls(
        TEST_SECRET,
        chrono::Duration::hours(1),
        chrono::Duration::days(1),
    ));
    let sessions = Arc::new(SessionRegistry::new());

    let auth_state = AuthState {
        store,
        tokens,
        sessions,
        secure_cookies: false,
        access_cookie_max_age: time::Duration::hours(24),
        refresh_cookie_max_age: time::Duration::days(7),
    };

    let (feed, _) = broadcast::channel(8);
    let app_state = AppState {
        runner: Arc::new(ScriptRunner::new(dir.path().join("scripts"))),
        feed,
    };

    let app = build_router(auth_state, app_state, RateLimitLayer::new(limit));

    TestApp {
        app,
        admin_password,
        _dir: dir,
    }
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<(String, String)>, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookies = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| {
            let (pair, _) = v.split_once(';').unwrap_or((v, ""));
            pair.split_once('=')
                .map(|(n, val)| (n.to_string(), val.to_string()))
        })
        .collect();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, cookies, value)
}

async fn login(app: &Router, username: &str, password: &str) -> (StatusCode, Value) {
    let (status, _, body) = request(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    (status, body)
}

fn access_token(login_body: &Value) -> String {
    login_body["tokens"]["access_token"]
        .as_str()
        .expect("access token in login response")
        .to_string()
}

fn refresh_token(login_body: &Value) -> String {
    login_body["tokens"]["refresh_token"]
        .as_str()
        .expect("refresh token in login response")
        .to_string()
}

#[tokio::test]
async fn login_returns_tokens_and_cookies() {
    let t = test_app().await;

    let (status, cookies, body) = request(
        &t.app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin", "password": t.admin_password })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], "admin");
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"]["last_login"].is_string());
    assert!(!access_token(&body).is_empty());
    assert!(!refresh_token(&body).is_empty());

    let names: Vec<&str> = cookies.iter().map(|(n, _)| n.as_str()).collect();
    assert!(names.contains(&"access_token"));
    assert!(names.contains(&"refresh_token"));
    assert!(names.contains(&"session_id"));

    // Session ids carry 32 bytes of entropy, hex encoded.
    let session = cookies.iter().find(|(n, _)| n == "session_id").unwrap();
    assert_eq!(session.1.len(), 64);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let t = test_app().await;

    let wrong_password = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": "admin", "password": "wrong" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    let unknown_user = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": "ghost", "password": "whatever" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);

    let a = axum::body::to_bytes(wrong_password.into_body(), usize::MAX)
        .await
        .unwrap();
    let b = axum::body::to_bytes(unknown_user.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(a, b, "failure payloads must be byte-identical");
}

#[tokio::test]
async fn login_requires_both_fields() {
    let t = test_app().await;

    let (status, _, body) =
        request(&t.app, "POST", "/api/auth/login", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username and password required");

    let (status, _, _) = request(
        &t.app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn whoami_requires_token() {
    let t = test_app().await;

    let (status, _, body) = request(&t.app, "GET", "/api/auth/user", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No token provided");

    let (status, _, body) =
        request(&t.app, "GET", "/api/auth/user", Some("garbage.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn whoami_returns_current_user() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let token = access_token(&body);

    let (status, _, body) = request(&t.app, "GET", "/api/auth/user", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "admin");
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["email"], "admin@opsdeck.local");
}

#[tokio::test]
async fn refresh_token_cannot_act_as_access_token() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let refresh = refresh_token(&body);

    let (status, _, body) = request(&t.app, "GET", "/api/auth/user", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token type");
}

#[tokio::test]
async fn access_token_cannot_refresh() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let access = access_token(&body);

    let (status, _, body) = request(
        &t.app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({ "refresh_token": access })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid refresh token");
}

#[tokio::test]
async fn refresh_mints_a_new_access_token() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let original_access = access_token(&body);
    let refresh = refresh_token(&body);

    // Issue timestamps have second granularity; step past it so the new
    // token cannot be identical.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let (status, cookies, body) = request(
        &t.app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let new_access = body["access_token"].as_str().unwrap().to_string();
    assert_ne!(new_access, original_access);

    // Refreshed access token cookie is set.
    assert!(cookies.iter().any(|(n, _)| n == "access_token"));

    // The fresh token works and names the same subject.
    let (status, _, body) =
        request(&t.app, "GET", "/api/auth/user", Some(&new_access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "admin");
}

#[tokio::test]
async fn refresh_requires_a_token() {
    let t = test_app().await;

    let (status, _, body) = request(&t.app, "POST", "/api/auth/refresh", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No refresh token provided");
}

#[tokio::test]
async fn refresh_rejects_deleted_user() {
    let t = test_app().await;

    let (_, admin_body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&admin_body);

    // Create and log in a disposable user, then delete it.
    let (status, _, _) = request(
        &t.app,
        "POST",
        "/api/auth/users",
        Some(&admin_token),
        Some(json!({ "username": "temp", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, temp_body) = login(&t.app, "temp", "password123").await;
    let temp_refresh = refresh_token(&temp_body);

    let (status, _, _) = request(
        &t.app,
        "DELETE",
        "/api/auth/users/temp",
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = request(
        &t.app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({ "refresh_token": temp_refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn admin_creates_viewer_with_default_email() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&body);

    let (status, _, body) = request(
        &t.app,
        "POST",
        "/api/auth/users",
        Some(&admin_token),
        Some(json!({ "username": "bob", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "viewer");
    assert_eq!(body["user"]["email"], "bob@opsdeck.local");

    let (status, body) = login(&t.app, "bob", "password123").await;
    assert_eq!(status, StatusCode::OK);

    let bob_token = access_token(&body);
    let (status, _, body) = request(&t.app, "GET", "/api/auth/user", Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "viewer");
    assert_eq!(body["user"]["email"], "bob@opsdeck.local");
}

#[tokio::test]
async fn viewer_cannot_reach_admin_routes() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&body);

    request(
        &t.app,
        "POST",
        "/api/auth/users",
        Some(&admin_token),
        Some(json!({ "username": "bob", "password": "password123" })),
    )
    .await;

    let (_, body) = login(&t.app, "bob", "password123").await;
    let bob_token = access_token(&body);

    let (status, _, body) = request(&t.app, "GET", "/api/auth/users", Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Admin access required");

    let (status, _, _) = request(
        &t.app,
        "POST",
        "/api/auth/users",
        Some(&bob_token),
        Some(json!({ "username": "eve", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&body);

    let payload = json!({ "username": "bob", "password": "password123" });
    let (status, _, _) = request(
        &t.app,
        "POST",
        "/api/auth/users",
        Some(&admin_token),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = request(
        &t.app,
        "POST",
        "/api/auth/users",
        Some(&admin_token),
        Some(payload),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username already exists");
}

#[tokio::test]
async fn list_users_strips_password_hashes() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&body);

    let (status, _, body) = request(&t.app, "GET", "/api/auth/users", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["users"][0]["username"], "admin");

    let raw = body.to_string();
    assert!(!raw.contains("password"));
    assert!(!raw.contains("$2b$"));
}

#[tokio::test]
async fn bootstrap_admin_cannot_be_deleted() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&body);

    let (status, _, body) = request(
        &t.app,
        "DELETE",
        "/api/auth/users/admin",
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Cannot delete admin user");
}

#[tokio::test]
async fn admins_cannot_delete_themselves() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&body);

    // A second admin account, deleting itself.
    request(
        &t.app,
        "POST",
        "/api/auth/users",
        Some(&admin_token),
        Some(json!({ "username": "root2", "password": "password123", "role": "admin" })),
    )
    .await;

    let (_, body) = login(&t.app, "root2", "password123").await;
    let root2_token = access_token(&body);

    let (status, _, body) = request(
        &t.app,
        "DELETE",
        "/api/auth/users/root2",
        Some(&root2_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Cannot delete yourself");
}

#[tokio::test]
async fn deleting_unknown_user_is_not_found() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&body);

    let (status, _, _) = request(
        &t.app,
        "DELETE",
        "/api/auth/users/ghost",
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleted_user_cannot_log_in() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let admin_token = access_token(&body);

    request(
        &t.app,
        "POST",
        "/api/auth/users",
        Some(&admin_token),
        Some(json!({ "username": "bob", "password": "password123" })),
    )
    .await;
    let (status, _) = login(&t.app, "bob", "password123").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = request(
        &t.app,
        "DELETE",
        "/api/auth/users/bob",
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&t.app, "bob", "password123").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_rotates_credentials() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let token = access_token(&body);

    // Too-short replacement is rejected before any store mutation.
    let (status, _, body) = request(
        &t.app,
        "POST",
        "/api/auth/change-password",
        Some(&token),
        Some(json!({ "current_password": t.admin_password, "new_password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "New password must be at least 8 characters");

    // Wrong current password is rejected.
    let (status, _, body) = request(
        &t.app,
        "POST",
        "/api/auth/change-password",
        Some(&token),
        Some(json!({ "current_password": "wrong", "new_password": "replacement-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Current password incorrect");

    // Valid rotation.
    let (status, _, _) = request(
        &t.app,
        "POST",
        "/api/auth/change-password",
        Some(&token),
        Some(json!({ "current_password": t.admin_password, "new_password": "replacement-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Old password no longer works; the new one does.
    let (status, _) = login(&t.app, "admin", &t.admin_password).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&t.app, "admin", "replacement-pass").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_is_idempotent_and_clears_cookies() {
    let t = test_app().await;

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let token = access_token(&body);

    let (status, cookies, body) =
        request(&t.app, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // All three auth cookies are cleared.
    for name in ["access_token", "refresh_token", "session_id"] {
        let cleared = cookies
            .iter()
            .find(|(n, _)| n == name)
            .unwrap_or_else(|| panic!("{} removal cookie missing", name));
        assert!(cleared.1.is_empty(), "{} should be emptied", name);
    }

    // Logging out again without a session still succeeds.
    let (status, _, _) = request(&t.app, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn dashboard_routes_are_gated() {
    let t = test_app().await;

    let (status, _, body) = request(&t.app, "GET", "/api/domains", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No token provided");

    let (_, body) = login(&t.app, "admin", &t.admin_password).await;
    let token = access_token(&body);

    // With no script installation the collaborator call fails, but the
    // request passes the gate and reaches the glue.
    let (status, _, body) = request(&t.app, "GET", "/api/domains", Some(&token), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);

    // Status-file endpoints degrade to defaults instead of failing.
    let (status, _, body) = request(&t.app, "GET", "/api/bulk/progress", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["total"], 0);
}

#[tokio::test]
async fn public_health_endpoint_needs_no_auth() {
    let t = test_app().await;

    let (status, _, body) = request(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn optional_auth_attaches_identity_but_never_rejects() {
    use axum::routing::get;
    use axum::{middleware as axum_middleware, Extension, Json};
    use opsdeck_backend::auth::models::Identity;
    use opsdeck_backend::auth::optional_auth;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(CredentialStore::new(dir.path().join("users.json")));
    store.initialize().await.unwrap();

    let tokens = Arc::new(TokenService::with_ttls(
        TEST_SECRET,
        chrono::Duration::hours(1),
        chrono::Duration::days(1),
    ));
    let auth_state = AuthState {
        store,
        tokens: tokens.clone(),
        sessions: Arc::new(SessionRegistry::new()),
        secure_cookies: false,
        access_cookie_max_age: time::Duration::hours(24),
        refresh_cookie_max_age: time::Duration::days(7),
    };

    async fn probe(identity: Option<Extension<Identity>>) -> Json<Value> {
        Json(json!({
            "user": identity.map(|Extension(i)| i.username),
        }))
    }

    let app = Router::new()
        .route("/probe", get(probe))
        .layer(axum_middleware::from_fn_with_state(
            auth_state.clone(),
            optional_auth,
        ));

    // Without a token the request passes with no identity.
    let (status, _, body) = request(&app, "GET", "/probe", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].is_null());

    // With a garbage token it still passes, identity-free.
    let (status, _, body) = request(&app, "GET", "/probe", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].is_null());

    // With a valid access token the identity is attached.
    let users = auth_state.store.load().await;
    let admin = users.get("admin").unwrap();
    let access = tokens.issue_access(admin).unwrap();
    let (status, _, body) = request(&app, "GET", "/probe", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"], "admin");
}

#[tokio::test]
async fn api_requests_are_rate_limited() {
    let t = test_app_with_limiter(RateLimitConfig {
        max_requests: 2,
        window: Duration::from_secs(60),
        burst: 0,
    })
    .await;

    let payload = json!({ "username": "ghost", "password": "nope" });
    for _ in 0..2 {
        let (status, _, _) = request(
            &t.app,
            "POST",
            "/api/auth/login",
            None,
            Some(payload.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _, body) = request(&t.app, "POST", "/api/auth/login", None, Some(payload)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);

    // The public health endpoint is outside the limited surface.
    let (status, _, _) = request(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
