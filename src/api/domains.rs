//! Domain Routes
//! Mission: Discovery, detail, backup, and restore for hosted domains

use crate::api::{ApiError, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// GET /api/domains - list all managed domains.
pub async fn list_domains(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let result = state
        .runner
        .run_function("bulk_operations", "discover_all_domains", &[])
        .await;

    if !result.success {
        return Err(ApiError::from(&result));
    }

    let domains: Vec<String> = result
        .output
        .unwrap_or_default()
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": domains.len(),
        "domains": domains,
    })))
}

/// GET /api/domains/:domain - site type, disk size, and health for one
/// domain. Individual probe failures degrade to placeholder values rather
/// than failing the whole request.
pub async fn domain_detail(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Json<Value> {
    let type_result = state
        .runner
        .run_function("auto_detect", "detect_site_type", &[&domain])
        .await;

    let size_result =
        crate::ops::run_command(&format!("du -sh /home/{} 2>/dev/null | awk '{{print $1}}'", domain))
            .await;

    let health_result = state
        .runner
        .run_function("health_monitor", "check_domain_health", &[&domain])
        .await;

    Json(json!({
        "success": true,
        "domain": {
            "name": domain,
            "type": type_result.output.filter(|_| type_result.success).unwrap_or_else(|| "UNKNOWN".to_string()),
            "size": size_result.output.filter(|_| size_result.success).unwrap_or_else(|| "N/A".to_string()),
            "health": if health_result.success { "OK" } else { "WARNING" },
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct BackupRequest {
    #[serde(rename = "type")]
    pub backup_type: Option<String>,
}

/// POST /api/domains/:domain/backup
pub async fn backup_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    payload: Option<Json<BackupRequest>>,
) -> Result<Json<Value>, ApiError> {
    let backup_type = payload
        .and_then(|Json(p)| p.backup_type)
        .unwrap_or_else(|| "auto".to_string());

    let result = state
        .runner
        .run_function("smart_backup", "smart_backup", &[&domain, &backup_type])
        .await;

    if !result.success {
        return Err(ApiError::from(&result));
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Backup started for {}", domain),
        "output": result.output,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RestoreRequest {
    pub backup_file: Option<String>,
}

/// POST /api/domains/:domain/restore
pub async fn restore_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    payload: Option<Json<RestoreRequest>>,
) -> Result<Json<Value>, ApiError> {
    let backup_file = payload
        .and_then(|Json(p)| p.backup_file)
        .filter(|f| !f.is_empty())
        .ok_or(ApiError::BadRequest("backup_file required"))?;

    let result = state
        .runner
        .run_function("restore", "restore_site", &[&domain, &backup_file])
        .await;

    if !result.success {
        return Err(ApiError::from(&result));
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Restore started for {}", domain),
        "output": result.output,
    })))
}
