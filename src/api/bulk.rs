//! Bulk Operation Routes
//! Mission: Kick off filtered bulk backups and relay their progress files

use crate::api::{ApiError, AppState};
use crate::ops::read_json_file;
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default, Deserialize)]
pub struct BulkBackupRequest {
    pub filter_type: Option<String>,
    pub filter_value: Option<String>,
    pub backup_type: Option<String>,
    pub parallel: Option<String>,
}

/// POST /api/bulk/backup - start a filtered bulk backup. The script runs in
/// the background and reports through the progress file.
pub async fn bulk_backup(
    State(state): State<AppState>,
    payload: Option<Json<BulkBackupRequest>>,
) -> Result<Json<Value>, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();

    let filter_type = payload.filter_type.unwrap_or_else(|| "all".to_string());
    let filter_value = payload.filter_value.unwrap_or_default();
    let backup_type = payload.backup_type.unwrap_or_else(|| "auto".to_string());
    let parallel = payload.parallel.unwrap_or_else(|| "4".to_string());

    let result = state
        .runner
        .run_function(
            "bulk_operations",
            "bulk_backup_filtered",
            &[&filter_type, &filter_value, &backup_type, &parallel],
        )
        .await;

    if !result.success {
        return Err(ApiError::from(&result));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Bulk backup started",
        "output": result.output,
    })))
}

/// GET /api/bulk/progress - current bulk progress, zeroed when no run is
/// active.
pub async fn bulk_progress(State(state): State<AppState>) -> Json<Value> {
    let progress = read_json_file(&state.runner.data_file("bulk_progress.json"))
        .await
        .unwrap_or_else(|| {
            json!({
                "total": 0,
                "completed": 0,
                "failed": 0,
                "percentage": 0,
            })
        });

    Json(json!({ "success": true, "progress": progress }))
}

/// GET /api/bulk/results - results of the last bulk run.
pub async fn bulk_results(State(state): State<AppState>) -> Json<Value> {
    let results = read_json_file(&state.runner.data_file("bulk_results.json"))
        .await
        .unwrap_or_else(|| json!({ "operations": [], "summary": {} }));

    Json(json!({ "success": true, "results": results }))
}
