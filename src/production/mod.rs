//! Content production: for every popular-topic block of a keyword, pick a
//! title, plan the post, draft it in two parts, review it and rewrite it.
//!
//! Every step is timed and recorded in the topic's process log. A topic
//! artifact is always written, so a failing step still leaves its partial
//! log on disk for inspection.

pub mod prompts;

use itertools::Itertools;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::analysis::collect_analyzable_blocks;
use crate::config::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::gemini::{RunContext, TextGenerator};
use crate::http::HttpClient;
use crate::jobs::UnitResult;
use crate::models::{AnalyzableBlock, BlockCategory, QuerySummary};
use crate::outputs::write_topic_artifact;
use crate::serp::{fetch_sections, summarize};
use crate::store::{text_hash, HistoryEntry, ProductProfile};
use crate::utils::{clamp_text, file_timestamp, normalize_whitespace, now_for_sheet};

use prompts::{
    draft_part1_prompt, draft_part2_prompt, normalize_generated_titles, normalize_plans, normalize_title_scores,
    planning_prompt, review_prompt, rewrite_prompt, title_generation_prompt, title_scoring_prompt, PlanSet,
    ProductionContext, TitleScoring, TITLE_COUNT,
};

/// Longest input/output text kept per process-log entry.
const LOG_TEXT_CHARS: usize = 48_000;

pub const NO_TOPIC_BLOCKS: &str =
    "제작 가능한 인기주제 블록이 없습니다. (인플루언서/카페/브랜드 콘텐츠 제외 후 0건)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Ok,
    Error,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Ok => "OK",
            StepStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessLogEntry {
    pub step: String,
    pub started_at: String,
    pub duration_ms: u64,
    pub status: StepStatus,
    pub input_summary: String,
    pub output: String,
}

fn log_text<T: Serialize + ?Sized>(value: &T) -> String {
    let text = match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        Ok(other) => serde_json::to_string_pretty(&other).unwrap_or_default(),
        Err(e) => format!("<unserializable: {e}>"),
    };
    clamp_text(&text, LOG_TEXT_CHARS)
}

/// Ordered record of the steps run for one topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProcessLog(pub Vec<ProcessLogEntry>);

impl ProcessLog {
    /// Await `work`, recording its duration, input and output (or error).
    pub async fn step<T, Fut>(&mut self, name: &str, input: Value, work: Fut) -> ScoutResult<T>
    where
        T: Serialize,
        Fut: Future<Output = ScoutResult<T>>,
    {
        let started_at = now_for_sheet();
        let clock = Instant::now();
        let result = work.await;
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, output) = match &result {
            Ok(value) => (StepStatus::Ok, log_text(value)),
            Err(e) => (StepStatus::Error, e.user_message()),
        };
        info!(step = name, duration_ms, ok = status == StepStatus::Ok, "production step");
        self.0.push(ProcessLogEntry {
            step: name.to_string(),
            started_at,
            duration_ms,
            status,
            input_summary: log_text(&input),
            output,
        });
        result
    }
}

/// Prompt, raw model output and the value derived from it.
#[derive(Debug, Serialize)]
struct Generated<T> {
    prompt: String,
    raw: String,
    result: T,
}

async fn generate_with<G, T>(
    generator: &G,
    run: &RunContext,
    prompt: String,
    derive: impl FnOnce(&str) -> T,
) -> ScoutResult<Generated<T>>
where
    G: TextGenerator,
{
    let raw = generator.generate(run, &prompt).await?;
    let result = derive(&raw);
    Ok(Generated { prompt, raw, result })
}

/// Everything produced for one topic block, complete or partial.
#[derive(Debug, Clone, Serialize)]
pub struct TopicArtifact {
    pub keyword: String,
    pub created_at: String,
    pub product_name: String,
    pub intent: String,
    pub topic_no: usize,
    pub topic_count: usize,
    pub topic_title: String,
    pub titles: Vec<String>,
    pub title_scoring: Option<TitleScoring>,
    pub plans: Option<PlanSet>,
    pub selected_title: Option<String>,
    pub draft: String,
    pub review: String,
    pub rewrite: String,
    pub process_log: ProcessLog,
    pub error: Option<String>,
}

/// One row's production inputs.
#[derive(Debug, Clone, Copy)]
pub struct ProduceRequest<'a> {
    pub keyword: &'a str,
    pub query: &'a str,
    pub intent: &'a str,
    pub rank_result: &'a str,
    pub product: &'a ProductProfile,
    pub recent_history: &'a [HistoryEntry],
}

/// Outcome of producing every topic of a keyword plus the history entries
/// for the topics that completed.
#[derive(Debug)]
pub struct KeywordProduction {
    pub unit: UnitResult,
    pub history: Vec<HistoryEntry>,
}

/// Fetch the query's result page and collect its analyzable blocks.
pub async fn collect_production_context<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    query: &str,
) -> ScoutResult<(QuerySummary, Vec<AnalyzableBlock>)> {
    let sections = fetch_sections(http, config, query).await?;
    let summary = summarize(&sections);
    let blocks = collect_analyzable_blocks(http, config, &sections, config.analysis_max_posts_per_block).await;
    Ok((summary, blocks))
}

/// Popular-topic blocks with a title, deduplicated by lowercase title and
/// ordered by section ordinal.
pub fn select_topic_blocks(blocks: &[AnalyzableBlock]) -> Vec<AnalyzableBlock> {
    blocks
        .iter()
        .filter(|b| b.category == BlockCategory::PopularTopic)
        .filter(|b| !normalize_whitespace(&b.title).is_empty())
        .unique_by(|b| normalize_whitespace(&b.title).to_lowercase())
        .sorted_by_key(|b| b.ordinal)
        .cloned()
        .collect()
}

/// Run every step for one topic, filling `artifact` as steps complete.
pub async fn produce_topic<G: TextGenerator>(
    generator: &G,
    run: &RunContext,
    ctx: &ProductionContext<'_>,
    artifact: &mut TopicArtifact,
) -> ScoutResult<()> {
    let log = &mut artifact.process_log;

    log.step(
        "CONTEXT",
        json!({
            "keyword": ctx.keyword,
            "topicNo": ctx.topic_no,
            "topicCount": ctx.topic_count,
            "topicTitle": ctx.topic_title,
            "productName": ctx.product.name,
            "intent": ctx.intent,
            "rankResult": ctx.rank_result,
        }),
        async {
            Ok(json!({
                "topicNo": ctx.topic_no,
                "topicCount": ctx.topic_count,
                "topicTitle": ctx.topic_title,
                "smartSummary": ctx.summary,
                "blocks": [ctx.block],
            }))
        },
    )
    .await?;

    let titles = log
        .step(
            "TITLE_GEN",
            json!({"keyword": ctx.keyword, "topicTitle": ctx.topic_title, "intent": ctx.intent}),
            generate_with(generator, run, title_generation_prompt(ctx), |raw| {
                normalize_generated_titles(raw, ctx.keyword, TITLE_COUNT)
            }),
        )
        .await?
        .result;
    artifact.titles = titles.clone();

    let scoring = log
        .step(
            "TITLE_SCORE",
            json!({"topicTitle": ctx.topic_title, "titleCount": titles.len()}),
            generate_with(generator, run, title_scoring_prompt(ctx, &titles), |raw| {
                normalize_title_scores(raw, &titles)
            }),
        )
        .await?
        .result;

    let selected = if !scoring.best_title.is_empty() {
        scoring.best_title.clone()
    } else {
        titles.first().cloned().unwrap_or_else(|| ctx.keyword.to_string())
    };
    artifact.title_scoring = Some(scoring);
    artifact.selected_title = Some(selected.clone());

    let plans = log
        .step(
            "PLAN",
            json!({"topicTitle": ctx.topic_title, "selectedTitle": selected}),
            generate_with(generator, run, planning_prompt(ctx, &selected), |raw| {
                normalize_plans(raw, &selected)
            }),
        )
        .await?
        .result;
    let plan = plans.selected().cloned();
    artifact.plans = Some(plans);
    let pattern = plan.as_ref().map(|p| p.pattern.clone()).unwrap_or_default();

    let part1 = log
        .step(
            "DRAFT_P1",
            json!({"topicTitle": ctx.topic_title, "selectedTitle": selected, "selectedPattern": pattern}),
            generate_with(generator, run, draft_part1_prompt(ctx, &selected, plan.as_ref()), |raw| {
                raw.trim().to_string()
            }),
        )
        .await?
        .result;

    let part2 = log
        .step(
            "DRAFT_P2",
            json!({"topicTitle": ctx.topic_title, "selectedTitle": selected, "selectedPattern": pattern}),
            generate_with(
                generator,
                run,
                draft_part2_prompt(ctx, &selected, plan.as_ref(), &part1),
                |raw| raw.trim().to_string(),
            ),
        )
        .await?
        .result;

    let draft = [part1.as_str(), part2.as_str()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .join("\n\n");
    artifact.draft = draft.clone();

    let review = log
        .step(
            "REVIEW",
            json!({"topicTitle": ctx.topic_title, "selectedTitle": selected, "draftLength": draft.chars().count()}),
            generate_with(generator, run, review_prompt(ctx, &selected, &draft), |raw| {
                raw.trim().to_string()
            }),
        )
        .await?
        .result;
    artifact.review = review.clone();

    let rewrite = log
        .step(
            "REWRITE",
            json!({"topicTitle": ctx.topic_title, "selectedTitle": selected}),
            generate_with(generator, run, rewrite_prompt(ctx, &selected, &draft, &review), |raw| {
                raw.trim().to_string()
            }),
        )
        .await?
        .result;
    artifact.rewrite = rewrite;
    Ok(())
}

/// Produce every topic block of one keyword.
///
/// Topics run in ordinal order and the first failing topic stops the
/// keyword; its partial artifact is still written and reported.
#[instrument(level = "info", skip_all, fields(keyword = %request.keyword, product = %request.product.name))]
pub async fn produce_keyword<C: HttpClient, G: TextGenerator>(
    http: &C,
    generator: &G,
    run: &RunContext,
    config: &ScoutConfig,
    request: &ProduceRequest<'_>,
) -> KeywordProduction {
    let mut history = Vec::new();
    let mut summaries = Vec::new();
    let mut files = Vec::new();

    let (summary, blocks) = match collect_production_context(http, config, request.query).await {
        Ok(context) => context,
        Err(e) => return KeywordProduction { unit: UnitResult::failed(e, None), history },
    };
    let topics = select_topic_blocks(&blocks);
    if topics.is_empty() {
        return KeywordProduction {
            unit: UnitResult::failed(ScoutError::validation(NO_TOPIC_BLOCKS), None),
            history,
        };
    }

    let output_dir = Path::new(&config.output_dir);
    for (i, block) in topics.iter().enumerate() {
        let topic_no = i + 1;
        let topic_title = match normalize_whitespace(&block.title) {
            t if t.is_empty() => format!("주제{topic_no}"),
            t => t,
        };
        let ctx = ProductionContext {
            keyword: request.keyword,
            intent: request.intent,
            topic_title: &topic_title,
            topic_no,
            topic_count: topics.len(),
            product: request.product,
            rank_result: request.rank_result,
            summary: &summary,
            block,
            recent_history: request.recent_history,
        };
        let mut artifact = TopicArtifact {
            keyword: request.keyword.to_string(),
            created_at: now_for_sheet(),
            product_name: request.product.name.clone(),
            intent: request.intent.to_string(),
            topic_no,
            topic_count: topics.len(),
            topic_title: topic_title.clone(),
            titles: Vec::new(),
            title_scoring: None,
            plans: None,
            selected_title: None,
            draft: String::new(),
            review: String::new(),
            rewrite: String::new(),
            process_log: ProcessLog::default(),
            error: None,
        };

        let timestamp = file_timestamp();
        let produced = produce_topic(generator, run, &ctx, &mut artifact).await;
        if let Err(e) = &produced {
            warn!(topic = %topic_title, error = %e, "topic production failed");
            artifact.error = Some(e.user_message());
        }

        let file = match write_topic_artifact(&artifact, output_dir, &timestamp).await {
            Ok(path) => path.display().to_string(),
            Err(e) => {
                let err = produced.err().unwrap_or(e);
                return KeywordProduction { unit: UnitResult::failed(err, None), history };
            }
        };

        if let Err(e) = produced {
            return KeywordProduction { unit: UnitResult::failed(e, Some(file)), history };
        }

        let selected = artifact.selected_title.clone().unwrap_or_default();
        history.push(HistoryEntry {
            created_at: now_for_sheet(),
            keyword: request.keyword.to_string(),
            product_name: request.product.name.clone(),
            title: format!("{topic_title} | {selected}"),
            draft_hash: text_hash(&artifact.draft),
            rewrite_hash: text_hash(&artifact.rewrite),
            file: file.clone(),
        });
        summaries.push(format!("{topic_title}: {selected}"));
        files.push(file);
    }

    info!(topics = files.len(), "keyword produced");
    KeywordProduction {
        unit: UnitResult::succeeded(summaries.join(" | "), Some(files.join("\n"))),
        history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{post, post_html, serp_with_topic_block};
    use crate::gemini::tests::ScriptedGenerator;
    use crate::http::fake::FakeHttp;
    use crate::http::HttpResponse;
    use crate::serp::fetch::tests::fast_config;

    fn block(category: BlockCategory, title: &str, ordinal: usize) -> AnalyzableBlock {
        AnalyzableBlock {
            category,
            title: title.into(),
            ordinal,
            posts: vec![post("https://m.blog.naver.com/a/111111", "t")],
        }
    }

    fn config_in_temp(tag: &str) -> ScoutConfig {
        let mut config = fast_config();
        config.output_dir = std::env::temp_dir()
            .join(format!("scout_produce_{tag}_{}", std::process::id()))
            .display()
            .to_string();
        config
    }

    fn product() -> ProductProfile {
        ProductProfile {
            name: "방수 우산".into(),
            usp: "초경량".into(),
            ..ProductProfile::default()
        }
    }

    #[test]
    fn test_select_topic_blocks_filters_dedupes_and_sorts() {
        let blocks = vec![
            block(BlockCategory::PopularTopic, "장마 우산", 5),
            block(BlockCategory::PopularArticle, "인기글", 1),
            block(BlockCategory::PopularTopic, "  ", 2),
            block(BlockCategory::PopularTopic, "경량 우산", 3),
            block(BlockCategory::PopularTopic, "장마  우산", 7),
        ];
        let picked = select_topic_blocks(&blocks);
        let titles: Vec<_> = picked.iter().map(|b| (b.title.as_str(), b.ordinal)).collect();
        assert_eq!(titles, vec![("경량 우산", 3), ("장마 우산", 5)]);
    }

    #[tokio::test]
    async fn test_process_log_records_errors() {
        let mut log = ProcessLog::default();
        let ok: ScoutResult<String> = log.step("A", json!({"k": 1}), async { Ok("done".to_string()) }).await;
        let err: ScoutResult<String> = log
            .step("B", json!("plain"), async { Err(ScoutError::validation("boom")) })
            .await;

        assert_eq!(ok.unwrap(), "done");
        assert!(err.is_err());
        assert_eq!(log.0[0].status, StepStatus::Ok);
        assert_eq!(log.0[0].output, "done");
        assert!(log.0[0].input_summary.contains("\"k\": 1"));
        assert_eq!(log.0[1].status, StepStatus::Error);
        assert_eq!(log.0[1].input_summary, "plain");
        assert_eq!(log.0[1].output, "boom");
    }

    #[tokio::test]
    async fn test_produce_keyword_runs_all_steps() {
        let http = FakeHttp::new()
            .route("search.naver", HttpResponse::ok(serp_with_topic_block()))
            .route("m.blog.naver.com/alpha", HttpResponse::ok(post_html("의자 후기")));
        let generator = ScriptedGenerator::new(vec![
            Ok(r#"{"titles":["캠핑 의자 고르는 법","가벼운 캠핑 의자"]}"#.into()),
            Ok(r#"{"bestTitle":"가벼운 캠핑 의자","scores":[{"title":"가벼운 캠핑 의자","score":91}]}"#.into()),
            Ok("not json".into()),
            Ok(" 파트1 ".into()),
            Ok("파트2".into()),
            Ok("검수".into()),
            Ok("수정본".into()),
        ]);
        let config = config_in_temp("ok");
        let product = product();
        let request = ProduceRequest {
            keyword: "캠핑 의자",
            query: "캠핑 의자",
            intent: "후기형",
            rank_result: "",
            product: &product,
            recent_history: &[],
        };

        let produced = produce_keyword(&http, &generator, &RunContext::new(), &config, &request).await;

        assert_eq!(produced.unit.outcome.as_ref().unwrap(), "캠핑 의자 추천: 가벼운 캠핑 의자");
        assert_eq!(generator.prompts.borrow().len(), 7);
        assert!(generator.prompts.borrow()[4].contains("파트1"));
        assert_eq!(produced.history.len(), 1);
        assert_eq!(produced.history[0].title, "캠핑 의자 추천 | 가벼운 캠핑 의자");
        assert_eq!(produced.history[0].draft_hash, text_hash("파트1\n\n파트2"));

        let file = produced.unit.artifact.unwrap();
        let markdown = std::fs::read_to_string(&file).unwrap();
        assert!(markdown.contains("수정본"));
        assert!(std::fs::read_to_string(file.replace(".md", ".json")).unwrap().contains("\"REWRITE\""));
        std::fs::remove_dir_all(&config.output_dir).unwrap();
    }

    #[tokio::test]
    async fn test_failing_step_writes_partial_artifact() {
        let http = FakeHttp::new()
            .route("search.naver", HttpResponse::ok(serp_with_topic_block()))
            .route("m.blog.naver.com/alpha", HttpResponse::ok(post_html("의자 후기")));
        let generator = ScriptedGenerator::new(vec![
            Ok("제목 하나".into()),
            Err(ScoutError::Disabled("quota exceeded (429)".into())),
        ]);
        let config = config_in_temp("partial");
        let product = product();
        let request = ProduceRequest {
            keyword: "캠핑 의자",
            query: "캠핑 의자",
            intent: "후기형",
            rank_result: "",
            product: &product,
            recent_history: &[],
        };

        let produced = produce_keyword(&http, &generator, &RunContext::new(), &config, &request).await;

        assert!(produced.unit.outcome.is_err());
        assert!(produced.history.is_empty());
        let file = produced.unit.artifact.unwrap();
        assert!(file.contains("제작중"));
        let json = std::fs::read_to_string(file.replace(".md", ".json")).unwrap();
        assert!(json.contains("\"TITLE_SCORE\""));
        assert!(json.contains("\"ERROR\""));
        std::fs::remove_dir_all(&config.output_dir).unwrap();
    }

    #[tokio::test]
    async fn test_no_topic_blocks_is_validation_error() {
        let http = FakeHttp::new().route(
            "search.naver",
            HttpResponse::ok(r#"<div data-fender-root="true"><h2>웹문서</h2></div>"#),
        );
        let generator = ScriptedGenerator::new(vec![]);
        let product = product();
        let request = ProduceRequest {
            keyword: "k",
            query: "k",
            intent: "i",
            rank_result: "",
            product: &product,
            recent_history: &[],
        };
        let produced = produce_keyword(&http, &generator, &RunContext::new(), &fast_config(), &request).await;
        let err = produced.unit.outcome.unwrap_err();
        assert_eq!(err.user_message(), NO_TOPIC_BLOCKS);
        assert!(produced.unit.artifact.is_none());
        assert!(generator.prompts.borrow().is_empty());
    }
}
