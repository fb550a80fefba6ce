//! Opsdeck - Server Management Dashboard Backend
//! Mission: Authenticated REST/WebSocket front door for the management scripts

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use opsdeck_backend::{
    api::AppState,
    auth::{AuthState, CredentialStore, SessionRegistry, TokenService},
    middleware::{RateLimitConfig, RateLimitLayer},
    models::{Config, WsServerEvent},
    ops::ScriptRunner,
    server,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env();

    info!("🚀 Opsdeck Dashboard starting");

    // Credential store; first run bootstraps the admin account with a
    // generated password that is printed exactly once.
    let store = Arc::new(CredentialStore::new(&config.users_file));
    if let Some(password) = store
        .initialize()
        .await
        .context("failed to initialize credential store")?
    {
        info!(
            "🔐 Default admin user created (username: admin, password: {})",
            password
        );
        warn!("⚠️  Rotate the generated admin password now");
    }

    let tokens = Arc::new(TokenService::from_config(&config));
    let sessions = Arc::new(SessionRegistry::new());
    let auth_state = AuthState::new(store, tokens, sessions.clone(), &config);

    info!("🔒 Authentication initialized ({})", config.users_file.display());

    // Feed channel for WebSocket subscribers plus the script installation
    // the dashboard routes shell out to.
    let (feed_tx, _feed_rx) = broadcast::channel::<WsServerEvent>(64);
    let runner = Arc::new(ScriptRunner::new(&config.scripts_path));
    let app_state = AppState {
        runner: runner.clone(),
        feed: feed_tx.clone(),
    };

    let limiter = RateLimitLayer::new(RateLimitConfig::default());

    // Background tasks: idle-session sweep, status-file pollers, limiter
    // cleanup. All independent of request handling.
    tokio::spawn(server::session_sweeper(sessions));
    tokio::spawn(server::progress_poller(runner.clone(), feed_tx.clone()));
    tokio::spawn(server::health_poller(runner, feed_tx));
    tokio::spawn(server::limiter_cleanup(limiter.clone()));

    let app = server::build_router(auth_state, app_state, limiter).layer(cors_layer(&config));

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("Server closed");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "opsdeck_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Browsers only send auth cookies cross-origin when the origin is pinned,
/// so a configured origin switches off the permissive default.
fn cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_origin {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
            Err(_) => {
                warn!("Invalid CORS_ORIGIN {:?}; falling back to permissive", origin);
                CorsLayer::permissive()
            }
        },
        None => CorsLayer::permissive(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    warn!("⚠️  Shutdown signal received, closing gracefully");
}
