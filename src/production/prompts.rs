//! Prompt builders for the production steps and the tolerant parsers that
//! turn model output back into titles, scores and plans.
//!
//! Every parser has a deterministic fallback, so a malformed answer never
//! stops the pipeline.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::models::{AnalyzableBlock, QuerySummary};
use crate::store::{HistoryEntry, ProductProfile};
use crate::utils::normalize_whitespace;

pub const TITLE_COUNT: usize = 20;
const MAX_TITLE_CHARS: usize = 45;
const MAX_OUTLINE_ITEMS: usize = 7;
const PART1_TAIL_CHARS: usize = 1800;

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json\s*(.*?)```").expect("static regex"));
static ANY_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```\s*(.*?)```").expect("static regex"));
static BRACKET_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\[\]{}]").expect("static regex"));
static AB_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(A|B)\.").expect("static regex"));
static BARE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*]\s*$").expect("static regex"));
static LABEL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(title|titles|output|출력|json)\s*[:：]").expect("static regex"));
static NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s*[.)]\s*").expect("static regex"));
static BULLET_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*]\s*").expect("static regex"));

/// Everything the prompts know about one topic being produced.
#[derive(Debug, Clone, Copy)]
pub struct ProductionContext<'a> {
    pub keyword: &'a str,
    pub intent: &'a str,
    pub topic_title: &'a str,
    pub topic_no: usize,
    pub topic_count: usize,
    pub product: &'a ProductProfile,
    pub rank_result: &'a str,
    pub summary: &'a QuerySummary,
    pub block: &'a AnalyzableBlock,
    pub recent_history: &'a [HistoryEntry],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTitle {
    pub title: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleScoring {
    pub best_title: String,
    pub selection_reason: String,
    pub scores: Vec<ScoredTitle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub pattern: String,
    pub plan_name: String,
    pub outline: Vec<String>,
    pub why: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSet {
    /// 1-based, always within `plans`.
    pub selected_plan_index: usize,
    pub selection_reason: String,
    pub plans: Vec<Plan>,
}

impl PlanSet {
    pub fn selected(&self) -> Option<&Plan> {
        self.plans
            .get(self.selected_plan_index.saturating_sub(1))
            .or_else(|| self.plans.first())
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn history_lines(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|h| format!("- {} | {}", or_dash(&h.created_at), or_dash(&h.title)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn outline_text(plan: Option<&Plan>) -> String {
    plan.map(|p| {
        p.outline
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {item}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    })
    .unwrap_or_default()
}

pub fn context_text(ctx: &ProductionContext<'_>) -> String {
    let block = ctx.block;
    let sample_titles = block
        .posts
        .iter()
        .map(|p| normalize_whitespace(or_dash(&p.title)))
        .filter(|t| !t.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join(" | ");
    let block_line = format!(
        "- {} | {} | {}번째 | 샘플제목: {}",
        block.category,
        or_dash(&block.title),
        block.ordinal,
        or_dash(&sample_titles)
    );
    let recent = history_lines(ctx.recent_history);
    let p = ctx.product;

    [
        format!("키워드: {}", ctx.keyword),
        format!("작성의도: {}", ctx.intent),
        format!("타겟주제: {}", or_dash(ctx.topic_title)),
        format!("주제진행순번: {} / {}", ctx.topic_no, ctx.topic_count),
        format!("제품명: {}", p.name),
        format!("제품카테고리: {}", p.category),
        format!("핵심문제: {}", p.pain),
        format!("잘못된해결책: {}", p.wrong_solution),
        format!("근본원인: {}", p.root_cause),
        format!("핵심USP: {}", p.usp),
        format!("특화루틴: {}", p.routine),
        format!("순위수집결과: {}", or_dash(ctx.rank_result)),
        format!("스마트블록: {}", ctx.summary.flag()),
        format!("인기글명: {}", ctx.summary.article_titles_joined()),
        format!("인기주제명들: {}", ctx.summary.topic_titles_joined()),
        format!("섹션순번: {}", ctx.summary.section_ordinals()),
        "[블록 샘플]".to_string(),
        block_line,
        "[최근 이력]".to_string(),
        if recent.is_empty() { "- 없음".to_string() } else { recent },
    ]
    .join("\n")
}

pub fn title_generation_prompt(ctx: &ProductionContext<'_>) -> String {
    let context = context_text(ctx);
    [
        "당신은 블로그 마케팅 전략가이자 심리 마케팅 전문가입니다.",
        "목표: 클릭 유도형 제목 후보를 20개 생성합니다.",
        "규칙:",
        "- 제목은 최대 46자 미만",
        "- 법적 위험 표현(100% 보장/완치/치료 확정) 금지",
        "- 추상어 남발 금지, 구체성 우선",
        "- 전문가/대표 시점 + 소비자/찐후기 시점을 적절히 섞되 중복 흐름 금지",
        "- 같은 패턴 반복 금지, 20개 모두 다른 심리 자극 사용",
        "- 메인 키워드는 가능한 자연스럽게 포함",
        "",
        "[분석 컨텍스트]",
        context.as_str(),
        "",
        "[출력 형식]",
        "반드시 JSON만 출력:",
        r#"{"titles":["제목1", "...", "제목20"]}"#,
    ]
    .join("\n")
}

pub fn title_scoring_prompt(ctx: &ProductionContext<'_>, titles: &[String]) -> String {
    let candidates = titles
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {t}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let recent = history_lines(ctx.recent_history);

    [
        "당신은 네이버 상위노출과 CTR 최적화 심사관입니다.".to_string(),
        "주어진 제목 후보를 채점하고 최종 1개를 선정하세요.".to_string(),
        "평가 기준(100점):".to_string(),
        "- 검색의도 적합성 25".to_string(),
        "- 상위노출/인기주제 구조 적합성 25".to_string(),
        "- 클릭유도력 20".to_string(),
        "- 안전성(법/과장 표현 위험 최소) 15".to_string(),
        "- 최근 이력 대비 신선도 15".to_string(),
        String::new(),
        format!("[키워드] {}", ctx.keyword),
        format!("[제품] {}", ctx.product.name),
        format!("[작성의도] {}", ctx.intent),
        String::new(),
        "[최근 생성 제목 이력]".to_string(),
        if recent.is_empty() { "- 없음".to_string() } else { recent },
        String::new(),
        "[제목 후보]".to_string(),
        candidates,
        String::new(),
        "[출력 형식]".to_string(),
        "반드시 JSON만 출력:".to_string(),
        r#"{"bestTitle":"...","selectionReason":"...","scores":[{"title":"...","score":88,"reason":"..."}]}"#
            .to_string(),
    ]
    .join("\n")
}

pub fn planning_prompt(ctx: &ProductionContext<'_>, selected_title: &str) -> String {
    let context = context_text(ctx);
    let title_line = format!("[선정 제목] {selected_title}");
    [
        "Role: 네이버 블로그 고전환 카피라이팅 전문가",
        "목표: 선택된 제목을 바탕으로 전환율 높은 기획안 3세트를 만들고, 최종 1세트를 자동 선택합니다.",
        "요구사항:",
        "- 설득 패턴(A~M) 중 맥락에 맞는 패턴을 세트별로 선택",
        "- 세트마다 6~7개 섹션 개요",
        "- 단순 나열 금지, 기승전결 흐름 필수",
        "- 동일한 관점 반복 금지",
        "",
        title_line.as_str(),
        "",
        "[분석 컨텍스트]",
        context.as_str(),
        "",
        "[출력 형식]",
        "반드시 JSON만 출력:",
        r#"{"selectedPlanIndex":1,"selectionReason":"...","plans":[{"pattern":"A","planName":"...","outline":["섹션1","섹션2"],"why":"..."}]}"#,
    ]
    .join("\n")
}

pub fn draft_part1_prompt(ctx: &ProductionContext<'_>, selected_title: &str, plan: Option<&Plan>) -> String {
    let outline = outline_text(plan);
    let p = ctx.product;
    [
        "역할: 찐 소비자 톤의 블로그 작가".to_string(),
        "목표: 아래 개요로 원고 PART 1만 작성합니다.".to_string(),
        "규칙:".to_string(),
        "- 이모지(😀🔥 등) 금지".to_string(),
        "- 텍스트 이모티콘(ㅠㅠ, ㅋㅋ)은 자연스럽게 허용".to_string(),
        "- 문단 2~3줄 단위, 모바일 가독성 유지".to_string(),
        "- 제품은 갑자기 등장시키지 말고 탐색 서사(The Hunt)를 반드시 포함".to_string(),
        "- 고유 사용루틴이 있다면 행동 장면으로 묘사".to_string(),
        "- 사진 가이드 파트는 이번 작성에서 제외".to_string(),
        "- 마지막 한 줄은 PART 2로 이어지는 행동 직전 문장으로 마무리".to_string(),
        String::new(),
        format!("[제목] {selected_title}"),
        format!("[메인키워드] {}", ctx.keyword),
        format!("[작성의도] {}", ctx.intent),
        format!("[제품명] {}", p.name),
        format!("[제품카테고리] {}", p.category),
        format!("[핵심문제] {}", p.pain),
        format!("[잘못된해결책] {}", p.wrong_solution),
        format!("[근본원인] {}", p.root_cause),
        format!("[핵심USP] {}", p.usp),
        format!("[특화루틴] {}", p.routine),
        String::new(),
        "[기획 개요]".to_string(),
        or_dash(&outline).to_string(),
        String::new(),
        "[출력]".to_string(),
        "PART 1 원고 본문만 출력".to_string(),
    ]
    .join("\n")
}

/// Last `n` characters of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let skip = count - n;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

pub fn draft_part2_prompt(
    ctx: &ProductionContext<'_>,
    selected_title: &str,
    plan: Option<&Plan>,
    part1: &str,
) -> String {
    let outline = outline_text(plan);
    let p = ctx.product;
    [
        "역할: 찐 소비자 톤의 블로그 작가".to_string(),
        "목표: PART 1 다음 내용을 이어서 PART 2를 작성합니다.".to_string(),
        "규칙:".to_string(),
        "- 앞 문장 반복 금지, 자연스럽게 이어쓰기".to_string(),
        "- 해결/변화/주변반응/최종 제안까지 완결".to_string(),
        "- 과장/위법 표현 금지".to_string(),
        "- 사진 가이드 파트 제외".to_string(),
        String::new(),
        format!("[제목] {selected_title}"),
        format!("[메인키워드] {}", ctx.keyword),
        format!("[작성의도] {}", ctx.intent),
        format!("[제품명] {}", p.name),
        format!("[핵심USP] {}", p.usp),
        format!("[특화루틴] {}", p.routine),
        String::new(),
        "[기획 개요]".to_string(),
        or_dash(&outline).to_string(),
        String::new(),
        "[PART 1 마지막 부분]".to_string(),
        or_dash(tail_chars(part1, PART1_TAIL_CHARS)).to_string(),
        String::new(),
        "[출력]".to_string(),
        "PART 2 원고 본문만 출력".to_string(),
    ]
    .join("\n")
}

pub fn review_prompt(ctx: &ProductionContext<'_>, selected_title: &str, draft: &str) -> String {
    let target = if ctx.product.target_keyword.is_empty() {
        ctx.product.name.as_str()
    } else {
        ctx.product.target_keyword.as_str()
    };
    [
        "Role: 네이버 SEO 알고리즘 분석가 + 바이럴 편집장".to_string(),
        "아래 원고를 냉철하게 검수하세요.".to_string(),
        String::new(),
        format!("[검색 키워드] {}", ctx.keyword),
        format!("[타겟 제품명] {target}"),
        format!("[제목] {selected_title}"),
        format!("[작성의도] {}", ctx.intent),
        format!("[순위수집결과] {}", or_dash(ctx.rank_result)),
        format!("[스마트블록] {}", ctx.summary.flag()),
        String::new(),
        "[원고]".to_string(),
        draft.to_string(),
        String::new(),
        "[요구 출력 섹션]".to_string(),
        "## 0. 글 유형 진단".to_string(),
        "## 1. SEO & 알고리즘 정밀 진단".to_string(),
        "## 2. [AI 티 내기] 문장 교정 리포트".to_string(),
        "## 3. 바이럴 각인 & 흐름 진단".to_string(),
        "## 4. [위험 요소] vs [안전한 대안] 수정표".to_string(),
        "## 5. 디테일 & 체크리스트".to_string(),
    ]
    .join("\n")
}

pub fn rewrite_prompt(ctx: &ProductionContext<'_>, selected_title: &str, draft: &str, review: &str) -> String {
    [
        "역할: 바이럴 에디터".to_string(),
        "목표: 검수 리포트를 반영해 원고를 고칩니다.".to_string(),
        "규칙:".to_string(),
        "- 제목은 유지".to_string(),
        "- 법적/과장 리스크 문장 우선 수정".to_string(),
        "- AI 티 나는 번역투/작위문장 제거".to_string(),
        "- 후기형이면 사람 말투, 전문가형이면 단호한 논리 톤으로 맞춤".to_string(),
        "- 본문 길이는 원고 대비 ±20% 이내".to_string(),
        String::new(),
        format!("[제목] {selected_title}"),
        format!("[키워드] {}", ctx.keyword),
        format!("[제품] {}", ctx.product.name),
        format!("[작성의도] {}", ctx.intent),
        String::new(),
        "[원고]".to_string(),
        draft.to_string(),
        String::new(),
        "[검수 리포트]".to_string(),
        review.to_string(),
        String::new(),
        "[출력]".to_string(),
        "수정된 본문만 출력".to_string(),
    ]
    .join("\n")
}

/// First JSON value found in model output: the whole text, a fenced
/// block, or the span between the first `{` and the last `}`.
pub fn parse_json_from_text(text: &str) -> Option<Value> {
    let raw = text.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str(raw) {
        return Some(v);
    }
    let fenced = JSON_FENCE.captures(raw).or_else(|| ANY_FENCE.captures(raw));
    if let Some(caps) = fenced {
        if let Ok(v) = serde_json::from_str(caps[1].trim()) {
            return Some(v);
        }
    }
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&raw[start..=end]).ok(),
        _ => None,
    }
}

/// Non-structural lines of free text with list markers stripped,
/// de-duplicated case-insensitively.
pub fn candidate_lines(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in text.lines() {
        let line = normalize_whitespace(line);
        if line.is_empty()
            || BRACKET_LINE.is_match(&line)
            || AB_LINE.is_match(&line)
            || BARE_BULLET.is_match(&line)
            || LABEL_LINE.is_match(&line)
        {
            continue;
        }
        let cleaned = NUMBER_PREFIX.replace(&line, "");
        let cleaned = BULLET_PREFIX.replace(&cleaned, "").trim().to_string();
        if cleaned.is_empty() || !seen.insert(cleaned.to_lowercase()) {
            continue;
        }
        out.push(cleaned);
    }
    out
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => normalize_whitespace(s),
        Value::Null => String::new(),
        other => normalize_whitespace(&other.to_string()),
    }
}

fn field_text(obj: &Value, key: &str) -> String {
    obj.get(key).map(value_text).unwrap_or_default()
}

/// Exactly `expected` distinct titles of at most 45 characters, padded with
/// `"<keyword> 핵심 포인트 N"` when the model returned too few.
pub fn normalize_generated_titles(raw: &str, keyword: &str, expected: usize) -> Vec<String> {
    let expected = expected.max(1);
    let source: Vec<String> = match parse_json_from_text(raw)
        .as_ref()
        .and_then(|v| v.get("titles"))
        .and_then(Value::as_array)
    {
        Some(items) => items.iter().map(value_text).collect(),
        None => candidate_lines(raw),
    };

    let mut seen = HashSet::new();
    let mut titles = Vec::new();
    for t in source {
        let mut t = normalize_whitespace(&t);
        if t.is_empty() {
            continue;
        }
        if t.chars().count() > MAX_TITLE_CHARS + 1 {
            t = t.chars().take(MAX_TITLE_CHARS).collect::<String>().trim().to_string();
        }
        if !seen.insert(t.to_lowercase()) {
            continue;
        }
        titles.push(t);
        if titles.len() >= expected {
            break;
        }
    }
    for i in titles.len()..expected {
        titles.push(format!("{keyword} 핵심 포인트 {}", i + 1));
    }
    titles
}

/// The candidate matching `raw` exactly (case-insensitive), else the first
/// candidate containing or contained in it, else the first candidate.
/// An empty `raw` matches nothing.
pub fn closest_candidate<'a>(raw: &str, candidates: &'a [String]) -> Option<&'a String> {
    let src = normalize_whitespace(raw).to_lowercase();
    if src.is_empty() {
        return None;
    }
    let keys: Vec<String> = candidates.iter().map(|c| normalize_whitespace(c).to_lowercase()).collect();
    keys.iter()
        .position(|k| *k == src)
        .or_else(|| keys.iter().position(|k| !k.is_empty() && (k.contains(&src) || src.contains(k.as_str()))))
        .map(|i| &candidates[i])
        .or_else(|| candidates.first())
}

fn score_value(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    n.clamp(0.0, 100.0)
}

pub fn normalize_title_scores(raw: &str, candidates: &[String]) -> TitleScoring {
    let parsed = parse_json_from_text(raw).unwrap_or(Value::Null);
    let mut scores: Vec<ScoredTitle> = parsed
        .get("scores")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|it| {
                    let title = closest_candidate(&field_text(it, "title"), candidates)?;
                    Some(ScoredTitle {
                        title: title.clone(),
                        score: score_value(it.get("score")),
                        reason: field_text(it, "reason"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if scores.is_empty() {
        scores = candidates
            .iter()
            .enumerate()
            .map(|(i, t)| ScoredTitle {
                title: t.clone(),
                score: (80.0 - i as f64).max(0.0),
                reason: "파싱 실패 fallback 점수".to_string(),
            })
            .collect();
    }
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));

    let best_title = closest_candidate(&field_text(&parsed, "bestTitle"), candidates)
        .cloned()
        .or_else(|| scores.first().map(|s| s.title.clone()))
        .or_else(|| candidates.first().cloned())
        .unwrap_or_default();
    let reason = field_text(&parsed, "selectionReason");

    TitleScoring {
        best_title,
        selection_reason: if reason.is_empty() {
            "최고 점수 제목 자동 선택".to_string()
        } else {
            reason
        },
        scores,
    }
}

pub fn fallback_plans(selected_title: &str) -> Vec<Plan> {
    let plan = |pattern: &str, name: &str, outline: [String; 7], why: &str| Plan {
        pattern: pattern.to_string(),
        plan_name: name.to_string(),
        outline: Vec::from(outline),
        why: why.to_string(),
    };
    let s = |v: &str| v.to_string();
    vec![
        plan(
            "D",
            "비교 분석형",
            [
                format!("문제 제기: {selected_title}"),
                s("검색자 상황 공감"),
                s("기존 해결법 한계"),
                s("비교 기준 3가지"),
                s("제품/해결책 선택 이유"),
                s("실행 루틴 정리"),
                s("결론 및 행동 제안"),
            ],
            "합리적 비교 니즈 대응",
        ),
        plan(
            "A",
            "경고형",
            [
                format!("후킹: {selected_title}"),
                s("하지 말아야 할 행동"),
                s("문제 악화 메커니즘"),
                s("근본 원인 설명"),
                s("해결책 발견 과정"),
                s("사용 루틴 및 변화"),
                s("안전한 실행 체크리스트"),
            ],
            "손실회피 심리 대응",
        ),
        plan(
            "I",
            "의심 해제형",
            [
                format!("후킹: {selected_title}"),
                s("광고 피로 공감"),
                s("직접 검증 과정"),
                s("의외의 발견 포인트"),
                s("루틴 적용 장면"),
                s("변화 체감 결과"),
                s("추천/비추천 기준"),
            ],
            "냉소형 독자 장벽 해제",
        ),
    ]
}

pub fn normalize_plans(raw: &str, selected_title: &str) -> PlanSet {
    let parsed = parse_json_from_text(raw).unwrap_or(Value::Null);
    let mut plans: Vec<Plan> = parsed
        .get("plans")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let outline: Vec<String> = match p.get("outline") {
                        Some(Value::Array(lines)) => lines.iter().map(value_text).collect(),
                        Some(Value::String(text)) => candidate_lines(text),
                        Some(Value::Null) => Vec::new(),
                        Some(other) => candidate_lines(&other.to_string()),
                        None => Vec::new(),
                    };
                    let name = field_text(p, "planName");
                    Plan {
                        pattern: field_text(p, "pattern"),
                        plan_name: if name.is_empty() { format!("기획안 {}", i + 1) } else { name },
                        outline: outline
                            .into_iter()
                            .filter(|o| !o.is_empty())
                            .take(MAX_OUTLINE_ITEMS)
                            .collect(),
                        why: field_text(p, "why"),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    if plans.len() < 3 {
        plans = fallback_plans(selected_title);
    }

    let requested = match parsed.get("selectedPlanIndex") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .unwrap_or(1.0);
    let selected_plan_index = (requested.max(1.0) as usize).clamp(1, plans.len());
    let reason = field_text(&parsed, "selectionReason");

    PlanSet {
        selected_plan_index,
        selection_reason: if reason.is_empty() {
            "SERP 적합도 기준 자동 선택".to_string()
        } else {
            reason
        },
        plans,
    }
}
