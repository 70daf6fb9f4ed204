//! Rank collection: where the tracked blogs appear on each keyword's
//! result page.

use std::path::Path;
use tracing::{info, instrument, warn};

use super::{marked_rows_or_err, Budget, JobSummary, UnitResult};
use crate::config::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::http::HttpClient;
use crate::rank::rank_authors_for_query;
use crate::store::{Queue, Workbook};
use crate::utils::now_for_sheet;

pub const NO_ACTIVE_BLOG_IDS: &str =
    "활성 블로그ID가 없습니다. blog_ids에 active: true 인 블로그ID를 추가하세요.";

#[instrument(level = "info", skip_all, fields(workbook = %workbook_path.display()))]
pub async fn run_rank_collect<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    workbook: &mut Workbook,
    workbook_path: &Path,
) -> ScoutResult<JobSummary> {
    let rows = marked_rows_or_err(workbook, Queue::Rank)?;
    let targets = workbook.active_blog_ids();
    if targets.is_empty() {
        return Err(ScoutError::validation(NO_ACTIVE_BLOG_IDS));
    }
    info!(targets = targets.len(), rows = rows.len(), "tracking blogs");

    let budget = Budget::from_secs(config.runtime_budget_secs.rank);
    let mut summary = JobSummary::new("rank", rows.len());

    for (i, &idx) in rows.iter().enumerate() {
        if budget.exhausted() {
            summary.stop(rows.len() - i);
            break;
        }
        let query = workbook.keywords[idx].query();
        let at = now_for_sheet();

        let unit = match rank_authors_for_query(http, config, &query, &targets).await {
            Ok(ranking) => {
                let rendered = ranking.to_string();
                workbook.keywords[idx].record_rank_success(&rendered, &at);
                UnitResult::succeeded(rendered, None)
            }
            Err(e) => {
                warn!(%query, error = %e, "rank collection failed");
                workbook.keywords[idx].record_rank_error(&at, &e.user_message());
                UnitResult::failed(e, None)
            }
        };
        workbook.clear_queue(idx, Queue::Rank);
        workbook.save(workbook_path).await?;
        summary.record(&unit);
    }

    info!(%summary, "rank collection finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::{status, FakeHttp};
    use crate::http::HttpResponse;
    use crate::jobs::tests::{marked_row, temp_workbook_path};
    use crate::serp::fetch::tests::fast_config;
    use crate::store::{BlogIdRow, RowStatus};

    fn workbook(blog_ids: Vec<BlogIdRow>) -> Workbook {
        Workbook {
            keywords: vec![marked_row("우산", Queue::Rank)],
            blog_ids,
            ..Workbook::default()
        }
    }

    #[tokio::test]
    async fn test_requires_active_blog_ids() {
        let http = FakeHttp::new();
        let mut wb = workbook(vec![BlogIdRow {
            active: false,
            blog_id: "alpha".into(),
        }]);
        let err = run_rank_collect(&http, &fast_config(), &mut wb, &temp_workbook_path("rank_none"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), NO_ACTIVE_BLOG_IDS);
        assert!(wb.keywords[0].queue.rank);
    }

    #[tokio::test]
    async fn test_rank_result_written_to_row() {
        let http = FakeHttp::new().route(
            "search.naver",
            HttpResponse::ok(concat!(
                r#"<div data-fender-root="true"><h2>우산 인기글</h2>"#,
                r#"<a href="https://m.blog.naver.com/other/111111">a</a>"#,
                r#"<a href="https://m.blog.naver.com/alpha/222222">b</a></div>"#
            )),
        );
        let mut wb = workbook(vec![BlogIdRow {
            active: true,
            blog_id: "https://blog.naver.com/Alpha".into(),
        }]);
        let path = temp_workbook_path("rank_ok");
        let summary = run_rank_collect(&http, &fast_config(), &mut wb, &path).await.unwrap();

        assert_eq!(summary.ok, 1);
        assert_eq!(wb.keywords[0].rank_result, "alpha: 1섹션 2위 (우산 인기글)");
        assert_eq!(wb.keywords[0].status, Some(RowStatus::Ok));
        assert!(!wb.keywords[0].queue.rank);
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded() {
        let http = FakeHttp::new().route("search.naver", status(404, "gone"));
        let mut wb = workbook(vec![BlogIdRow {
            active: true,
            blog_id: "alpha".into(),
        }]);
        let path = temp_workbook_path("rank_err");
        let summary = run_rank_collect(&http, &fast_config(), &mut wb, &path).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(wb.keywords[0].status, Some(RowStatus::Error));
        assert!(wb.keywords[0].rank_result.is_empty());
        assert!(!wb.keywords[0].queue.rank);
        std::fs::remove_file(path).unwrap();
    }
}
