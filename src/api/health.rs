//! Health Routes
//! Mission: Relay system and per-domain health from the monitoring scripts

use crate::api::{ApiError, AppState};
use crate::ops::read_json_file;
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

/// GET /api/health/system - last health snapshot written by the monitor.
pub async fn system_health(State(state): State<AppState>) -> Json<Value> {
    let health = read_json_file(&state.runner.data_file("health_status.json"))
        .await
        .unwrap_or_else(|| json!({}));

    Json(json!({ "success": true, "health": health }))
}

/// GET /api/health/domains - live check across all domains.
///
/// The monitor emits one `domain:status` line per domain.
pub async fn domains_health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let result = state
        .runner
        .run_function("health_monitor", "check_all_domains_health", &[])
        .await;

    if !result.success {
        return Err(ApiError::from(&result));
    }

    let domains: Vec<Value> = result
        .output
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let mut parts = line.splitn(2, ':');
            let domain = parts.next().unwrap_or("").trim();
            let status = parts.next().unwrap_or("UNKNOWN").trim();
            json!({ "domain": domain, "status": status })
        })
        .collect();

    Ok(Json(json!({ "success": true, "domains": domains })))
}

#[derive(Debug, Default, Deserialize)]
pub struct HealthCheckRequest {
    pub domain: Option<String>,
    #[serde(rename = "type")]
    pub check_type: Option<String>,
}

/// POST /api/health/check - run a health check for one domain.
pub async fn run_health_check(
    State(state): State<AppState>,
    payload: Option<Json<HealthCheckRequest>>,
) -> Result<Json<Value>, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();

    let domain = payload
        .domain
        .filter(|d| !d.is_empty())
        .ok_or(ApiError::BadRequest("domain required"))?;
    let check_type = payload.check_type.unwrap_or_else(|| "all".to_string());

    let result = state
        .runner
        .run_function("health_monitor", "check_domain_health", &[&domain, &check_type])
        .await;

    if !result.success {
        return Err(ApiError::from(&result));
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Health check completed for {}", domain),
        "result": result.output,
    })))
}
