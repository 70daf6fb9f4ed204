//! Top-post collection and exposure analysis jobs.
//!
//! Both build a keyword report and write it under the dated output
//! directory; the analysis job additionally runs the LLM over it. A failed
//! collection is captured inside the report, so only a failed write fails
//! the row.

use std::path::Path;
use tracing::{info, instrument, warn};

use super::{marked_rows_or_err, Budget, JobSummary, UnitResult};
use crate::analysis::{analyze_report, collect_keyword_report};
use crate::config::ScoutConfig;
use crate::error::ScoutResult;
use crate::gemini::{GeminiClient, RunContext, TextGenerator};
use crate::http::HttpClient;
use crate::outputs::write_keyword_report;
use crate::store::{Queue, Workbook};
use crate::utils::file_timestamp;

pub const COLLECT_SUFFIX: &str = "상위글수집";
pub const ANALYSIS_SUFFIX: &str = "상위노출분석";

async fn run_report_job<C: HttpClient, G: TextGenerator>(
    http: &C,
    analyzer: Option<(&G, &RunContext)>,
    config: &ScoutConfig,
    workbook: &mut Workbook,
    workbook_path: &Path,
) -> ScoutResult<JobSummary> {
    let (queue, job, budget_secs, suffix) = match analyzer {
        Some(_) => (Queue::Analysis, "analyze", config.runtime_budget_secs.analysis, ANALYSIS_SUFFIX),
        None => (Queue::Posts, "posts", config.runtime_budget_secs.posts, COLLECT_SUFFIX),
    };
    let rows = marked_rows_or_err(workbook, queue)?;
    let budget = Budget::from_secs(budget_secs);
    let mut summary = JobSummary::new(job, rows.len());
    let output_dir = Path::new(&config.output_dir);

    for (i, &idx) in rows.iter().enumerate() {
        if budget.exhausted() {
            summary.stop(rows.len() - i);
            break;
        }
        let keyword = workbook.keywords[idx].keyword.trim().to_string();
        let query = workbook.keywords[idx].query();

        let mut report = collect_keyword_report(http, config, &keyword, &query).await;
        if let Some((generator, run)) = analyzer {
            analyze_report(generator, run, &mut report).await;
        }

        let unit = match write_keyword_report(&report, output_dir, &file_timestamp(), suffix).await {
            Ok(path) => UnitResult::succeeded(report.collection_status(), Some(path.display().to_string())),
            Err(e) => {
                warn!(%keyword, error = %e, "report write failed");
                UnitResult::failed(e, None)
            }
        };
        workbook.clear_queue(idx, queue);
        workbook.save(workbook_path).await?;
        summary.record(&unit);
    }

    info!(%summary, "report job finished");
    Ok(summary)
}

/// Collect top posts for every row marked `posts`, without analysis.
#[instrument(level = "info", skip_all, fields(workbook = %workbook_path.display()))]
pub async fn run_post_collect<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    workbook: &mut Workbook,
    workbook_path: &Path,
) -> ScoutResult<JobSummary> {
    run_report_job::<C, GeminiClient<'_, C>>(http, None, config, workbook, workbook_path).await
}

/// Collect and analyse top posts for every row marked `analysis`.
#[instrument(level = "info", skip_all, fields(workbook = %workbook_path.display(), model = %generator.model()))]
pub async fn run_exposure_analysis<C: HttpClient, G: TextGenerator>(
    http: &C,
    generator: &G,
    run: &RunContext,
    config: &ScoutConfig,
    workbook: &mut Workbook,
    workbook_path: &Path,
) -> ScoutResult<JobSummary> {
    run_report_job(http, Some((generator, run)), config, workbook, workbook_path).await
}
