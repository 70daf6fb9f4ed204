//! JSON copies of reports and production artifacts.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

use crate::error::ScoutResult;

/// Serialize `value` to `{dir}/{stem}.json`, creating `dir` if needed.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), %stem))]
pub async fn write_json<T: Serialize>(dir: &Path, stem: &str, value: &T) -> ScoutResult<PathBuf> {
    let json = serde_json::to_string_pretty(value)?;

    info!("Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(dir).await {
        error!(error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = dir.join(format!("{stem}.json"));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_json_creates_directory() {
        let base = std::env::temp_dir().join(format!("scout_json_{}", std::process::id()));
        let dir = base.join("2026-01-01");
        let path = write_json(&dir, "report", &json!({"keyword": "우산"})).await.unwrap();

        assert_eq!(path, dir.join("report.json"));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["keyword"], "우산");
        std::fs::remove_dir_all(base).unwrap();
    }
}
