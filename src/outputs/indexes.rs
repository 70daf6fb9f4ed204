//! Per-day index of written reports.
//!
//! Each run appends one line to `{dir}/index.md`, so several jobs on the
//! same day share one index. The header is written only when the file is
//! created.

use std::fmt::Write;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use crate::error::ScoutResult;
use crate::utils::now_for_sheet;

pub const INDEX_FILE: &str = "index.md";

/// Append `- [HH:MM:SS] [title](./file_name)` to the day's index.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), file = %file_name))]
pub async fn append_date_index(dir: &Path, title: &str, file_name: &str) -> ScoutResult<()> {
    fs::create_dir_all(dir).await?;
    let index_path = dir.join(INDEX_FILE);
    let mut entry = String::new();

    if !fs::try_exists(&index_path).await? {
        let date = dir
            .file_name()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = writeln!(entry, "# Reports generated on {date}\n");
    }

    let time = now_for_sheet();
    let time = time.split(' ').nth(1).unwrap_or(time.as_str());
    let _ = writeln!(entry, "- {time} [{}](./{})", title.replace(['[', ']'], ""), file_name);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&index_path)
        .await?;
    file.write_all(entry.as_bytes()).await?;
    info!(path = %index_path.display(), "Updated date index");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_index_header_written_once() {
        let base = std::env::temp_dir().join(format!("scout_index_{}", std::process::id()));
        let dir = base.join("2026-02-03");
        append_date_index(&dir, "우산 (상위노출분석)", "a.md").await.unwrap();
        append_date_index(&dir, "[우산] / 장마", "b.md").await.unwrap();

        let text = std::fs::read_to_string(dir.join(INDEX_FILE)).unwrap();
        assert_eq!(text.matches("# Reports generated on 2026-02-03").count(), 1);
        assert!(text.contains("[우산 (상위노출분석)](./a.md)"));
        assert!(text.contains("[우산 / 장마](./b.md)"));
        assert_eq!(text.lines().filter(|l| l.starts_with("- ")).count(), 2);
        std::fs::remove_dir_all(base).unwrap();
    }
}
