//! Content production job over rows marked `produce`.

use std::path::Path;
use tracing::{info, instrument, warn};

use super::{marked_rows_or_err, Budget, JobSummary, UnitResult};
use crate::config::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::gemini::{RunContext, TextGenerator};
use crate::http::HttpClient;
use crate::production::{produce_keyword, ProduceRequest};
use crate::store::{Queue, Workbook, RECENT_HISTORY_LIMIT};
use crate::utils::{normalize_whitespace, now_for_sheet};

pub const MISSING_PRODUCT: &str = "제작제품이 비어 있습니다. keywords 행의 produce_product를 입력하세요.";
pub const MISSING_INTENT: &str = "작성의도가 비어 있습니다. keywords 행의 produce_intent를 입력하세요.";

/// Validate one row, produce it and append the resulting history.
async fn produce_row<C: HttpClient, G: TextGenerator>(
    http: &C,
    generator: &G,
    run: &RunContext,
    config: &ScoutConfig,
    workbook: &mut Workbook,
    idx: usize,
) -> UnitResult {
    let row = &workbook.keywords[idx];
    let product_name = normalize_whitespace(&row.produce_product);
    if product_name.is_empty() {
        return UnitResult::failed(ScoutError::validation(MISSING_PRODUCT), None);
    }
    let intent = normalize_whitespace(&row.produce_intent);
    if intent.is_empty() {
        return UnitResult::failed(ScoutError::validation(MISSING_INTENT), None);
    }
    let Some(product) = workbook.find_product(&product_name) else {
        return UnitResult::failed(
            ScoutError::validation(format!("PRODUCTS 시트에서 제품을 찾지 못했습니다: {product_name}")),
            None,
        );
    };

    let keyword = normalize_whitespace(&row.keyword);
    let query = row.query();
    let history = workbook.recent_history(&keyword, &product.name, RECENT_HISTORY_LIMIT);
    let request = ProduceRequest {
        keyword: &keyword,
        query: &query,
        intent: &intent,
        rank_result: &row.rank_result,
        product,
        recent_history: &history,
    };

    let produced = produce_keyword(http, generator, run, config, &request).await;
    for entry in produced.history {
        workbook.append_history(entry);
    }
    produced.unit
}

#[instrument(level = "info", skip_all, fields(workbook = %workbook_path.display(), model = %generator.model()))]
pub async fn run_content_production<C: HttpClient, G: TextGenerator>(
    http: &C,
    generator: &G,
    run: &RunContext,
    config: &ScoutConfig,
    workbook: &mut Workbook,
    workbook_path: &Path,
) -> ScoutResult<JobSummary> {
    let rows = marked_rows_or_err(workbook, Queue::Produce)?;
    let budget = Budget::from_secs(config.runtime_budget_secs.produce);
    let mut summary = JobSummary::new("produce", rows.len());

    for (i, &idx) in rows.iter().enumerate() {
        if budget.exhausted() {
            summary.stop(rows.len() - i);
            break;
        }
        let produced_at = now_for_sheet();
        let unit = produce_row(http, generator, run, config, workbook, idx).await;

        let row = &mut workbook.keywords[idx];
        match &unit.outcome {
            Ok(titles) => row.record_produce_success(titles, unit.artifact.as_deref().unwrap_or_default(), &produced_at),
            Err(e) => {
                warn!(keyword = %row.keyword, error = %e, "content production failed");
                row.record_produce_error(&produced_at, &e.user_message(), unit.artifact.as_deref());
            }
        }
        workbook.clear_queue(idx, Queue::Produce);
        workbook.save(workbook_path).await?;
        summary.record(&unit);
    }

    info!(%summary, "content production finished");
    Ok(summary)
}
