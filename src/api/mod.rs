//! Dashboard API
//! Mission: Thin authenticated glue over the external script layer

pub mod bulk;
pub mod domains;
pub mod health;
pub mod stats;

use crate::models::WsServerEvent;
use crate::ops::ScriptRunner;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared application state for the dashboard routes.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ScriptRunner>,
    /// Fan-out channel feeding WebSocket subscribers.
    pub feed: broadcast::Sender<WsServerEvent>,
}

/// Dashboard route errors.
#[derive(Debug)]
pub enum ApiError {
    /// An external operation reported failure.
    Collaborator(String),
    BadRequest(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Collaborator(err) => {
                tracing::error!("external operation failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
        };

        (
            status,
            Json(json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

impl From<&crate::ops::OpResult> for ApiError {
    fn from(result: &crate::ops::OpResult) -> Self {
        ApiError::Collaborator(
            result
                .error
                .clone()
                .unwrap_or_else(|| "operation failed".to_string()),
        )
    }
}
