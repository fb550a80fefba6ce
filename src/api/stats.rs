//! Statistics Routes
//! Mission: Aggregate counts for the dashboard overview cards

use crate::api::AppState;
use crate::ops::run_command;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// GET /api/stats/overview - headline numbers for the dashboard.
pub async fn overview(State(state): State<AppState>) -> Json<Value> {
    let domains_result = state
        .runner
        .run_function("bulk_operations", "discover_all_domains", &[])
        .await;

    let domains: Vec<String> = domains_result
        .output
        .filter(|_| domains_result.success)
        .unwrap_or_default()
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let base = state.runner.base().display().to_string();

    let backups_result = run_command(&format!(
        "find {}/backups -type f -name '*.tar.gz' 2>/dev/null | wc -l",
        base
    ))
    .await;
    let total_backups: u64 = backups_result
        .output
        .filter(|_| backups_result.success)
        .and_then(|o| o.parse().ok())
        .unwrap_or(0);

    let disk_result = run_command(&format!(
        "du -sh {}/backups 2>/dev/null | awk '{{print $1}}'",
        base
    ))
    .await;
    let disk_usage = disk_result
        .output
        .filter(|_| disk_result.success)
        .unwrap_or_else(|| "0".to_string());

    Json(json!({
        "success": true,
        "stats": {
            "total_domains": domains.len(),
            // TODO: derive from the last health sweep instead of assuming all healthy
            "healthy_domains": domains.len(),
            "total_backups": total_backups,
            "disk_usage": disk_usage,
        },
    }))
}

/// GET /api/stats/domains - per-site-type counts.
pub async fn domain_stats(State(state): State<AppState>) -> Json<Value> {
    let domains_result = state
        .runner
        .run_function("bulk_operations", "discover_all_domains", &[])
        .await;

    let domains: Vec<String> = domains_result
        .output
        .filter(|_| domains_result.success)
        .unwrap_or_default()
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let mut wordpress = 0u64;
    let mut laravel = 0u64;
    let mut nodejs = 0u64;
    let mut stat = 0u64;
    let mut php = 0u64;

    for domain in &domains {
        let detected = state
            .runner
            .run_function("auto_detect", "detect_site_type", &[domain])
            .await;
        let kind = detected
            .output
            .filter(|_| detected.success)
            .unwrap_or_default();

        match kind.to_uppercase().as_str() {
            "WORDPRESS" => wordpress += 1,
            "LARAVEL" => laravel += 1,
            "NODEJS" => nodejs += 1,
            "STATIC" => stat += 1,
            "PHP" => php += 1,
            _ => {}
        }
    }

    Json(json!({
        "success": true,
        "stats": {
            "wordpress": wordpress,
            "laravel": laravel,
            "nodejs": nodejs,
            "static": stat,
            "php": php,
        },
    }))
}
