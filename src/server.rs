//! Server Assembly
//! Mission: Compose the routers, the WebSocket feed, and background tasks

use crate::api::{self, AppState};
use crate::auth::{api as auth_api, authenticate, require_admin, AuthState, SessionRegistry};
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitLayer};
use crate::models::{WsClientMessage, WsServerEvent};
use crate::ops::{read_json_file, ScriptRunner};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    middleware,
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// How often the bulk-progress file is polled for the feed.
const PROGRESS_POLL_SECS: u64 = 2;
/// How often the health-status file is polled for the feed.
const HEALTH_POLL_SECS: u64 = 10;
/// How often idle sessions are swept.
const SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Assemble the full application router.
///
/// Authentication endpoints that must work without a token (login, refresh)
/// stay public; everything else is gated by [`authenticate`], with the user
/// administration routes additionally behind [`require_admin`].
pub fn build_router(auth_state: AuthState, app_state: AppState, limiter: RateLimitLayer) -> Router {
    let public_auth = Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/refresh", post(auth_api::refresh))
        .with_state(auth_state.clone());

    let user_routes = Router::new()
        .route("/api/auth/logout", post(auth_api::logout))
        .route("/api/auth/user", get(auth_api::get_current_user))
        .route("/api/auth/change-password", post(auth_api::change_password))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            authenticate,
        ))
        .with_state(auth_state.clone());

    let admin_routes = Router::new()
        .route(
            "/api/auth/users",
            get(auth_api::list_users).post(auth_api::create_user),
        )
        .route("/api/auth/users/:username", delete(auth_api::delete_user))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            authenticate,
        ))
        .with_state(auth_state.clone());

    let dashboard = Router::new()
        .route("/api/domains", get(api::domains::list_domains))
        .route("/api/domains/:domain", get(api::domains::domain_detail))
        .route("/api/domains/:domain/backup", post(api::domains::backup_domain))
        .route(
            "/api/domains/:domain/restore",
            post(api::domains::restore_domain),
        )
        .route("/api/health/system", get(api::health::system_health))
        .route("/api/health/domains", get(api::health::domains_health))
        .route("/api/health/check", post(api::health::run_health_check))
        .route("/api/bulk/backup", post(api::bulk::bulk_backup))
        .route("/api/bulk/progress", get(api::bulk::bulk_progress))
        .route("/api/bulk/results", get(api::bulk::bulk_results))
        .route("/api/stats/overview", get(api::stats::overview))
        .route("/api/stats/domains", get(api::stats::domain_stats))
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(auth_state, authenticate))
        .with_state(app_state);

    let api_routes = Router::new()
        .merge(public_auth)
        .merge(user_routes)
        .merge(admin_routes)
        .merge(dashboard)
        .layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(api_routes)
        .layer(middleware::from_fn(request_logging))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Public liveness endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection loop: track topic subscriptions and relay matching feed
/// events. Clients receive nothing until they subscribe.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.feed.subscribe();
    let mut topics: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Ok(event) = event else {
                    // Lagged or closed feed; drop missed events and continue.
                    continue;
                };
                if !topics.contains(event.topic()) {
                    continue;
                }
                let msg = serde_json::to_string(&event).unwrap_or_else(|e| {
                    warn!("Failed to serialize ws event: {}", e);
                    "{}".to_string()
                });
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break; };
                match msg {
                    Message::Text(text) => {
                        if let Ok(control) = serde_json::from_str::<WsClientMessage>(&text) {
                            match control {
                                WsClientMessage::Subscribe { topic } => {
                                    debug!("ws client subscribed to {}", topic);
                                    topics.insert(topic);
                                }
                                WsClientMessage::Unsubscribe { topic } => {
                                    debug!("ws client unsubscribed from {}", topic);
                                    topics.remove(&topic);
                                }
                                WsClientMessage::Ping => {
                                    let pong = r#"{"type":"pong"}"#.to_string();
                                    if socket.send(Message::Text(pong)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        } else if text == "ping" {
                            // Legacy plain text ping
                            let _ = socket.send(Message::Text("pong".to_string())).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
}

/// Hourly sweep of idle sessions, owned by the process supervisor rather
/// than request handling.
pub async fn session_sweeper(sessions: Arc<SessionRegistry>) {
    let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        let removed = sessions.sweep();
        if removed > 0 {
            info!("Session sweep removed {} idle session(s)", removed);
        }
    }
}

/// Poll the bulk-progress file and publish updates on the feed.
pub async fn progress_poller(runner: Arc<ScriptRunner>, feed: broadcast::Sender<WsServerEvent>) {
    let path = runner.data_file("bulk_progress.json");
    let mut ticker = interval(Duration::from_secs(PROGRESS_POLL_SECS));
    loop {
        ticker.tick().await;
        if let Some(data) = read_json_file(&path).await {
            let _ = feed.send(WsServerEvent::ProgressUpdate(data));
        }
    }
}

/// Poll the health-status file and publish updates on the feed.
pub async fn health_poller(runner: Arc<ScriptRunner>, feed: broadcast::Sender<WsServerEvent>) {
    let path = runner.data_file("health_status.json");
    let mut ticker = interval(Duration::from_secs(HEALTH_POLL_SECS));
    loop {
        ticker.tick().await;
        if let Some(data) = read_json_file(&path).await {
            let _ = feed.send(WsServerEvent::SystemHealthUpdate(data));
        }
    }
}

/// Hourly cleanup of stale rate-limiter entries.
pub async fn limiter_cleanup(limiter: RateLimitLayer) {
    let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        limiter.cleanup();
    }
}
