//! Keyword exposure reports: top posts per smartblock plus optional LLM
//! analysis of what the exposed posts have in common.
//!
//! [`collect_keyword_report`] never fails; a collection failure is captured
//! in the report. [`analyze_report`] fills in per-block and overall
//! analyses, recording generation failures instead of propagating them.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::blog::extract_top_posts;
use crate::config::ScoutConfig;
use crate::gemini::{RunContext, TextGenerator};
use crate::http::HttpClient;
use crate::models::{AnalyzableBlock, Post, QuerySummary, Section};
use crate::serp::{classify_section, fetch_sections, is_excluded_from_deep_analysis, summarize};
use crate::utils::{normalize_whitespace, now_for_sheet};

pub const SKIPPED_NO_POSTS: &str = "상위 글 데이터가 없어 주제 분석을 생략했습니다.";
const COLLECTION_ONLY: &str = "글 수집 전용 실행입니다. Gemini 분석은 수행하지 않았습니다.";
const EMPTY_OVERALL: &str = "전체 분석 결과가 비어 있습니다.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Ok,
    Error,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAnalysis {
    pub topic_no: usize,
    pub label: String,
    pub text: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordReport {
    pub keyword: String,
    pub created_at: String,
    pub model: Option<String>,
    pub summary: QuerySummary,
    pub blocks: Vec<AnalyzableBlock>,
    pub topic_analyses: Vec<TopicAnalysis>,
    pub overall_status: AnalysisStatus,
    pub overall_text: String,
    pub overall_error: Option<String>,
    pub collection_error: Option<String>,
}

impl KeywordReport {
    fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            created_at: now_for_sheet(),
            model: None,
            summary: QuerySummary::default(),
            blocks: Vec::new(),
            topic_analyses: Vec::new(),
            overall_status: AnalysisStatus::Skipped,
            overall_text: String::new(),
            overall_error: None,
            collection_error: None,
        }
    }

    pub fn collection_status(&self) -> &'static str {
        if self.collection_error.is_some() { "ERROR" } else { "OK" }
    }

    /// Text shown under the overall analysis heading.
    pub fn overall_display(&self) -> String {
        if self.overall_status == AnalysisStatus::Skipped && self.collection_error.is_none() {
            return COLLECTION_ONLY.to_string();
        }
        if let Some(err) = &self.collection_error {
            return format!("수집 실패로 전체 분석을 생략했습니다.\n{err}");
        }
        if let Some(err) = &self.overall_error {
            return format!("Gemini 분석 실패: {err}");
        }
        if self.overall_text.trim().is_empty() {
            EMPTY_OVERALL.to_string()
        } else {
            self.overall_text.clone()
        }
    }
}

/// Popular-article and popular-topic sections that are not excluded, each
/// with up to `max_posts` resolved posts.
pub async fn collect_analyzable_blocks<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    sections: &[Section],
    max_posts: usize,
) -> Vec<AnalyzableBlock> {
    let mut blocks = Vec::new();
    for section in sections {
        let Some(category) = classify_section(section) else {
            continue;
        };
        if is_excluded_from_deep_analysis(section) {
            continue;
        }
        let posts = extract_top_posts(http, config, section, max_posts).await;
        blocks.push(AnalyzableBlock {
            category,
            title: normalize_whitespace(&section.title),
            ordinal: section.index,
            posts,
        });
    }
    blocks
}

/// Fetch the query's result page and collect every analyzable block.
#[instrument(level = "info", skip(http, config))]
pub async fn collect_keyword_report<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    keyword: &str,
    query: &str,
) -> KeywordReport {
    let mut report = KeywordReport::new(keyword);
    match fetch_sections(http, config, query).await {
        Ok(sections) => {
            report.summary = summarize(&sections);
            report.blocks =
                collect_analyzable_blocks(http, config, &sections, config.analysis_max_posts_per_block).await;
            info!(blocks = report.blocks.len(), flag = report.summary.flag(), "collected keyword report");
        }
        Err(e) => {
            warn!(error = %e, "collection failed");
            report.collection_error = Some(e.user_message());
        }
    }
    report
}

/// Run the per-block and overall analyses. A report whose collection
/// failed is left untouched apart from its status.
pub async fn analyze_report<G: TextGenerator>(generator: &G, ctx: &RunContext, report: &mut KeywordReport) {
    report.model = Some(generator.model().to_string());
    if report.collection_error.is_some() {
        report.overall_status = AnalysisStatus::Error;
        return;
    }

    report.topic_analyses = analyze_blocks(generator, ctx, &report.keyword, &report.blocks).await;

    let prompt = overall_prompt(&observed_context(&report.keyword, &report.summary, &report.blocks));
    match generator.generate(ctx, &prompt).await {
        Ok(text) => {
            report.overall_status = AnalysisStatus::Ok;
            report.overall_text = text;
        }
        Err(e) => {
            warn!(keyword = %report.keyword, error = %e, "overall analysis skipped");
            report.overall_status = AnalysisStatus::Error;
            report.overall_error = Some(e.user_message());
        }
    }
}

pub async fn analyze_blocks<G: TextGenerator>(
    generator: &G,
    ctx: &RunContext,
    keyword: &str,
    blocks: &[AnalyzableBlock],
) -> Vec<TopicAnalysis> {
    let mut out = Vec::with_capacity(blocks.len());
    for (i, block) in blocks.iter().enumerate() {
        let mut topic = TopicAnalysis {
            topic_no: i + 1,
            label: block.display_label(i),
            text: String::new(),
            error: None,
        };
        if block.posts.is_empty() {
            topic.text = SKIPPED_NO_POSTS.to_string();
        } else {
            match generator.generate(ctx, &block_prompt(keyword, block)).await {
                Ok(text) => topic.text = text,
                Err(e) => topic.error = Some(e.user_message()),
            }
        }
        out.push(topic);
    }
    out
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn push_samples(lines: &mut Vec<String>, posts: &[Post]) {
    if posts.is_empty() {
        lines.push("- 샘플 글 없음".to_string());
        return;
    }
    for (p, post) in posts.iter().enumerate() {
        lines.push(format!("- 샘플{} 제목: {}", p + 1, or_dash(&post.title)));
        lines.push(format!("  URL: {}", or_dash(&post.canonical_url)));
        lines.push(format!("  태그: {}", or_dash(&post.tags_joined())));
        lines.push(format!("  원고: {}", or_dash(&post.body)));
    }
}

/// Observed facts about one keyword, shared by every analysis prompt.
pub fn observed_context(keyword: &str, summary: &QuerySummary, blocks: &[AnalyzableBlock]) -> String {
    let mut lines = vec![
        format!("- 키워드: {keyword}"),
        format!("- 스마트블록 여부: {}", summary.flag()),
        format!("- 인기글명: {}", or_dash(&summary.article_titles_joined())),
        format!("- 인기주제명들: {}", or_dash(&summary.topic_titles_joined())),
        format!("- 스마트블록 섹션순번: {}", or_dash(&summary.section_ordinals())),
    ];
    for (i, block) in blocks.iter().enumerate() {
        lines.push(String::new());
        let title = if block.title.is_empty() { "(제목없음)" } else { block.title.as_str() };
        lines.push(format!("[블록 {}] {} | {} | {}번째", i + 1, block.category, title, block.ordinal));
        push_samples(&mut lines, &block.posts);
    }
    lines.join("\n")
}

pub fn overall_prompt(observed: &str) -> String {
    [
        "당신은 네이버 상위노출 실무 전문가입니다.",
        "목표: 키워드별 인기글/인기주제 블록에서 상위노출 로직을 분석해 제작 가능한 보고서를 작성합니다.",
        "문체: 실무 보고서 형태, 간결하고 구조적으로 작성합니다.",
        "",
        "[실측 데이터]",
        observed,
        "",
        "[지시사항]",
        "1) 검색 의도를 1~2개로 요약하세요.",
        "2) 인기글 블록의 상위노출 로직(콘텐츠 유형, 제목 패턴, 본문 구조, 태그 활용)을 분석하세요.",
        "3) 인기주제 블록의 상위노출 로직을 주제명별로 분석하세요.",
        "4) 실제 실행 전략을 블록별로 체크리스트 형태로 작성하세요.",
        "5) 추측과 사실을 구분해서 작성하세요. (표기: [분석근거], [결과근거], [가설])",
        "6) 카페/쇼핑/광고 전략은 제외하고 블로그 기준으로만 작성하세요.",
        "",
        "[출력 형식]",
        "## 1) 키워드 검색 의도 요약",
        "- ...",
        "## 2) 섹션별 상위노출 패턴",
        "- 인기글: ...",
        "- 인기주제(주제명별): ...",
        "## 3) 제작용 인사이트",
        "- 훅/제목 패턴: ...",
        "- 본문 전개 구조: ...",
        "- 신뢰요소/증거: ...",
        "- 태그/키워드 운용: ...",
        "## 4) 제작 체크리스트",
        "- ...",
        "## 5) 리스크/주의사항",
        "- ...",
    ]
    .join("\n")
}

pub fn block_prompt(keyword: &str, block: &AnalyzableBlock) -> String {
    let title = if block.title.is_empty() { "(제목없음)" } else { block.title.as_str() };
    let mut observed = vec![
        format!("- 키워드: {keyword}"),
        format!("- 블록유형: {}", block.category),
        format!("- 주제명: {title}"),
        format!("- 섹션순번: {}번째", block.ordinal),
    ];
    push_samples(&mut observed, &block.posts);
    let observed = observed.join("\n");

    [
        "당신은 네이버 상위노출 실무 전문가입니다.",
        "목표: 특정 주제 블록 1개에 대해 블로그 상위노출 로직을 추론하고 제작용 보고서를 작성합니다.",
        "문체: 실무 보고서 형태, 간결하고 구조적으로 작성합니다.",
        "",
        "[해당 주제 실측 데이터]",
        observed.as_str(),
        "",
        "[지시사항]",
        "1) 이 주제 블록의 검색 의도를 1개로 요약하세요.",
        "2) 상위 노출 글의 공통점(제목, 본문 구조, 태그, 신뢰요소)을 분석하세요.",
        "3) 실제 실행 체크리스트 5개를 제시하세요.",
        "4) 추측과 사실을 구분하세요. ([분석근거], [결과근거], [가설])",
        "",
        "[출력 형식]",
        "## 1) 주제 검색의도",
        "- ...",
        "## 2) 상위노출 로직",
        "- ...",
        "## 3) 제작 포인트",
        "- 제목/도입 훅: ...",
        "- 본문 구성: ...",
        "- 신뢰요소: ...",
        "- 태그/키워드: ...",
        "## 4) 실행 체크리스트",
        "- ...",
    ]
    .join("\n")
}
