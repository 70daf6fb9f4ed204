//! Batch jobs over the workbook's work queues.
//!
//! Every job follows the same shape: read the rows marked for its queue,
//! process them one at a time until the runtime budget runs out, record the
//! outcome on the row, clear the row's queue flag and save the workbook.
//! Row failures are recorded and counted; they never stop the job.

pub mod keywords;
pub mod posts;
pub mod produce;
pub mod rank;

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{ScoutError, ScoutResult};
use crate::store::{Queue, Workbook};

/// Outcome of one unit of work: a short summary on success, plus the path
/// of any artifact written (including partial artifacts on failure).
#[derive(Debug)]
pub struct UnitResult {
    pub outcome: ScoutResult<String>,
    pub artifact: Option<String>,
}

impl UnitResult {
    pub fn succeeded(summary: impl Into<String>, artifact: Option<String>) -> Self {
        Self {
            outcome: Ok(summary.into()),
            artifact,
        }
    }

    pub fn failed(error: ScoutError, artifact: Option<String>) -> Self {
        Self {
            outcome: Err(error),
            artifact,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job: String,
    pub total: usize,
    pub processed: usize,
    pub ok: usize,
    pub failed: usize,
    pub remaining: usize,
    pub timed_out: bool,
    pub artifacts: Vec<String>,
}

impl JobSummary {
    pub fn new(job: &str, total: usize) -> Self {
        Self {
            job: job.to_string(),
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, unit: &UnitResult) {
        self.processed += 1;
        match unit.outcome {
            Ok(_) => self.ok += 1,
            Err(_) => self.failed += 1,
        }
        if let Some(artifact) = &unit.artifact {
            self.artifacts
                .extend(artifact.lines().filter(|l| !l.trim().is_empty()).map(str::to_string));
        }
    }

    pub fn stop(&mut self, remaining: usize) {
        self.timed_out = true;
        self.remaining = remaining;
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} processed, {} ok, {} failed",
            self.job, self.processed, self.total, self.ok, self.failed
        )?;
        if self.timed_out {
            write!(f, ", timed out with {} remaining", self.remaining)?;
        }
        if !self.artifacts.is_empty() {
            write!(f, ", {} file(s)", self.artifacts.len())?;
        }
        Ok(())
    }
}

/// Wall-clock ceiling for one job. Checked before each row, so a row that
/// has started always finishes.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    limit: Duration,
}

impl Budget {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            started: Instant::now(),
            limit: Duration::from_secs(secs),
        }
    }

    pub fn exhausted(&self) -> bool {
        self.started.elapsed() >= self.limit
    }
}

/// Human label of a queue, used in "nothing to do" errors.
pub fn queue_label(queue: Queue) -> &'static str {
    match queue {
        Queue::Keyword => "수집",
        Queue::Rank => "순위 수집",
        Queue::Posts => "글 수집",
        Queue::Analysis => "글 분석",
        Queue::Produce => "제작",
    }
}

/// Marked row indices, or a validation error when there are none.
pub fn marked_rows_or_err(workbook: &Workbook, queue: Queue) -> ScoutResult<Vec<usize>> {
    let rows = workbook.marked_rows(queue);
    if rows.is_empty() {
        return Err(ScoutError::validation(format!(
            "{} 대상이 없습니다. keywords 행의 queue.{queue} 값을 true로 지정하세요.",
            queue_label(queue)
        )));
    }
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::KeywordRow;
    use std::path::PathBuf;

    /// A scratch workbook path unique to `tag` and this process.
    pub(crate) fn temp_workbook_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("scout_wb_{tag}_{}.json", std::process::id()))
    }

    pub(crate) fn marked_row(keyword: &str, queue: Queue) -> KeywordRow {
        let mut row = KeywordRow::new(keyword);
        match queue {
            Queue::Rank => row.queue.rank = true,
            Queue::Keyword => row.queue.keyword = true,
            Queue::Posts => row.queue.posts = true,
            Queue::Analysis => row.queue.analysis = true,
            Queue::Produce => row.queue.produce = true,
        }
        row
    }

    #[test]
    fn test_no_marked_rows_is_validation_error() {
        let workbook = Workbook {
            keywords: vec![KeywordRow::new("우산")],
            ..Workbook::default()
        };
        let err = marked_rows_or_err(&workbook, Queue::Rank).unwrap_err();
        assert_eq!(
            err.to_string(),
            "순위 수집 대상이 없습니다. keywords 행의 queue.rank 값을 true로 지정하세요."
        );
    }

    #[test]
    fn test_summary_counts_and_splits_artifacts() {
        let mut summary = JobSummary::new("produce", 3);
        summary.record(&UnitResult::succeeded("t", Some("a.md\nb.md".into())));
        summary.record(&UnitResult::failed(ScoutError::validation("x"), Some("c.md".into())));
        summary.stop(1);

        assert_eq!(summary.ok, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.artifacts, vec!["a.md", "b.md", "c.md"]);
        assert_eq!(
            summary.to_string(),
            "produce: 2/3 processed, 1 ok, 1 failed, timed out with 1 remaining, 3 file(s)"
        );
    }

    #[test]
    fn test_zero_budget_is_exhausted() {
        assert!(Budget::from_secs(0).exhausted());
        assert!(!Budget::from_secs(300).exhausted());
    }
}
