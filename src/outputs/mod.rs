//! Report and artifact files.
//!
//! - [`json`]: machine-readable copies of every report
//! - [`markdown`]: human-readable renderings
//! - [`indexes`]: the per-day index linking everything written that day
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── 2026-05-06/
//!     ├── index.md
//!     ├── 20260506_101500_우산_상위노출분석.json
//!     ├── 20260506_101500_우산_상위노출분석.md
//!     ├── 20260506_102210_우산_장마우산_제목.json
//!     └── 20260506_102210_우산_장마우산_제목.md
//! ```

pub mod indexes;
pub mod json;
pub mod markdown;

use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::KeywordReport;
use crate::error::ScoutResult;
use crate::production::TopicArtifact;
use crate::utils::sanitize_file_name_part;

/// `output_dir/<local date>`.
pub fn dated_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(Local::now().date_naive().to_string())
}

/// `<timestamp>_<keyword>_<suffix>` with every part made file-name safe.
pub fn file_stem(timestamp: &str, keyword: &str, suffix: &str) -> String {
    let keyword = sanitize_file_name_part(keyword);
    let suffix = sanitize_file_name_part(suffix);
    format!(
        "{}_{}_{}",
        sanitize_file_name_part(timestamp),
        if keyword.is_empty() { "keyword" } else { keyword.as_str() },
        if suffix.is_empty() { "report" } else { suffix.as_str() }
    )
}

async fn write_pair<T: serde::Serialize>(
    dir: &Path,
    stem: &str,
    value: &T,
    markdown: String,
    index_title: &str,
) -> ScoutResult<PathBuf> {
    json::write_json(dir, stem, value).await?;
    let md_path = dir.join(format!("{stem}.md"));
    tokio::fs::write(&md_path, markdown).await?;
    info!(path = %md_path.display(), "Wrote Markdown");
    indexes::append_date_index(dir, index_title, &format!("{stem}.md")).await?;
    Ok(md_path)
}

/// Write a keyword report as JSON + Markdown. Returns the Markdown path.
pub async fn write_keyword_report(
    report: &KeywordReport,
    output_dir: &Path,
    timestamp: &str,
    suffix: &str,
) -> ScoutResult<PathBuf> {
    let dir = dated_dir(output_dir);
    let stem = file_stem(timestamp, &report.keyword, suffix);
    let title = format!("{} ({suffix})", report.keyword);
    write_pair(&dir, &stem, report, markdown::keyword_report_to_markdown(report), &title).await
}

/// Write a production artifact, complete or partial. Returns the Markdown
/// path.
pub async fn write_topic_artifact(
    artifact: &TopicArtifact,
    output_dir: &Path,
    timestamp: &str,
) -> ScoutResult<PathBuf> {
    let dir = dated_dir(output_dir);
    let label = match &artifact.selected_title {
        Some(title) if artifact.error.is_none() => format!("{}_{title}", artifact.topic_title),
        _ => format!("제작중_{}", artifact.topic_title),
    };
    let stem = file_stem(timestamp, &artifact.keyword, &label);
    let title = format!("{} / {}", artifact.keyword, artifact.topic_title);
    write_pair(&dir, &stem, artifact, markdown::topic_artifact_to_markdown(artifact), &title).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_sanitizes_parts() {
        assert_eq!(file_stem("20260101_000000", "우산/추천", "상위노출분석"), "20260101_000000_우산 추천_상위노출분석");
        assert_eq!(file_stem("t", "  ", ""), "t_keyword_report");
    }

    #[test]
    fn test_dated_dir_is_under_output_dir() {
        let dir = dated_dir(Path::new("/tmp/reports"));
        assert!(dir.starts_with("/tmp/reports"));
        assert_eq!(dir.file_name().unwrap().to_string_lossy().len(), 10);
    }
}
