//! Shared Types & Configuration
//! Mission: One place for runtime config and the WebSocket event vocabulary

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Runtime configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_token_hours: i64,
    pub refresh_token_days: i64,
    /// Production deployments get `Secure` auth cookies.
    pub production: bool,
    pub users_file: PathBuf,
    /// Root of the server-management script installation.
    pub scripts_path: PathBuf,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            "dev-secret-change-in-production-minimum-32-characters".to_string()
        });

        let access_token_hours = std::env::var("ACCESS_TOKEN_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|&h| h > 0)
            .unwrap_or(24);

        let refresh_token_days = std::env::var("REFRESH_TOKEN_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|&d| d > 0)
            .unwrap_or(7);

        let production = std::env::var("OPSDECK_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let users_file = std::env::var("USERS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("users.json"));

        let scripts_path = std::env::var("OPSDECK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/opt/opsdeck"));

        let cors_origin = std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty());

        Self {
            host,
            port,
            jwt_secret,
            access_token_hours,
            refresh_token_days,
            production,
            users_file,
            scripts_path,
            cors_origin,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Events pushed to WebSocket subscribers.
///
/// The payloads are collaborator-produced JSON relayed verbatim; this server
/// does not interpret them beyond routing to the right topic.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum WsServerEvent {
    ProgressUpdate(Value),
    SystemHealthUpdate(Value),
}

impl WsServerEvent {
    /// Topic a client must be subscribed to in order to receive this event.
    pub fn topic(&self) -> &'static str {
        match self {
            WsServerEvent::ProgressUpdate(_) => "progress",
            WsServerEvent::SystemHealthUpdate(_) => "health",
        }
    }
}

/// Control messages accepted from WebSocket clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsClientMessage {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Ping,
}
