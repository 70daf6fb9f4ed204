//! Keyword collection: search volumes plus the smartblock summary of the
//! keyword's result page.

use std::path::Path;
use tracing::{info, instrument, warn};

use super::{marked_rows_or_err, Budget, JobSummary, UnitResult};
use crate::config::ScoutConfig;
use crate::error::ScoutResult;
use crate::http::HttpClient;
use crate::models::{QuerySummary, VolumeRecord};
use crate::searchad::{fetch_volumes, pick_volume, VolumeSource};
use crate::serp::{fetch_sections, summarize};
use crate::store::{Queue, Workbook};
use crate::utils::now_for_sheet;

/// Volumes and smartblock summary for one query.
pub async fn collect_keyword<C: HttpClient, S: VolumeSource>(
    http: &C,
    volumes: &S,
    config: &ScoutConfig,
    query: &str,
) -> ScoutResult<(VolumeRecord, QuerySummary)> {
    let map = fetch_volumes(volumes, &[query.to_string()], config.searchad.chunk_size).await?;
    let sections = fetch_sections(http, config, query).await?;
    Ok((pick_volume(&map, query), summarize(&sections)))
}

#[instrument(level = "info", skip_all, fields(workbook = %workbook_path.display()))]
pub async fn run_keyword_collect<C: HttpClient, S: VolumeSource>(
    http: &C,
    volumes: &S,
    config: &ScoutConfig,
    workbook: &mut Workbook,
    workbook_path: &Path,
) -> ScoutResult<JobSummary> {
    let rows = marked_rows_or_err(workbook, Queue::Keyword)?;
    let budget = Budget::from_secs(config.runtime_budget_secs.collect);
    let mut summary = JobSummary::new("collect", rows.len());

    for (i, &idx) in rows.iter().enumerate() {
        if budget.exhausted() {
            summary.stop(rows.len() - i);
            break;
        }
        let query = workbook.keywords[idx].query();
        let at = now_for_sheet();

        let unit = match collect_keyword(http, volumes, config, &query).await {
            Ok((volume, smart)) => {
                workbook.keywords[idx].record_keyword_success(&volume, &smart, &at);
                UnitResult::succeeded(smart.flag(), None)
            }
            Err(e) => {
                warn!(%query, error = %e, "keyword collection failed");
                workbook.keywords[idx].record_keyword_error(&at, &e.user_message());
                UnitResult::failed(e, None)
            }
        };
        workbook.clear_queue(idx, Queue::Keyword);
        workbook.save(workbook_path).await?;
        summary.record(&unit);
    }

    info!(%summary, "keyword collection finished");
    Ok(summary)
}
