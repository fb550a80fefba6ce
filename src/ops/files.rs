//! Status Files
//! Mission: Best-effort JSON relay of collaborator-produced state

use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Read and parse a JSON file. Any failure yields `None`; the files are
/// produced by external processes and may be mid-write or absent.
pub async fn read_json_file(path: &Path) -> Option<Value> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(err) => {
            debug!("status file {} unreadable: {}", path.display(), err);
            return None;
        }
    };

    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("status file {} unparsable: {}", path.display(), err);
            None
        }
    }
}

/// Write a JSON file, pretty-printed. Returns `false` on failure.
pub async fn write_json_file(path: &Path, value: &Value) -> bool {
    let data = match serde_json::to_string_pretty(value) {
        Ok(data) => data,
        Err(_) => return false,
    };

    tokio::fs::write(path, data).await.is_ok()
}
