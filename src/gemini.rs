//! Text generation through the Gemini `generateContent` API.
//!
//! A response cut off by the token limit (`finishReason == MAX_TOKENS`) is
//! continued automatically: the original prompt is re-sent with the tail of
//! the output so far, up to a fixed number of rounds.
//!
//! Quota exhaustion (HTTP 429 with a billing/quota body) is never retried
//! and switches generation off for the rest of the run through
//! [`RunContext`], so later calls fail without touching the network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::config::{GeminiConfig, ScoutConfig};
use crate::error::{ScoutError, ScoutResult};
use crate::http::HttpClient;
use crate::retry::{with_retry, RetryPolicy};

static QUOTA_EXCEEDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)exceeded your current quota|check your plan and billing details")
        .expect("static regex")
});

const SCOPE: &str = "Gemini generateContent";

/// State shared by every generation call of one job invocation.
#[derive(Debug, Default)]
pub struct RunContext {
    disabled_reason: OnceLock<String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch generation off. The first reason sticks.
    pub fn disable(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.disabled_reason.set(reason.clone()).is_ok() {
            warn!(reason = %reason, "text generation disabled for the rest of this run");
        }
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled_reason.get().map(String::as_str)
    }
}

/// One prompt in, one complete text out.
pub trait TextGenerator {
    fn model(&self) -> &str;

    async fn generate(&self, ctx: &RunContext, prompt: &str) -> ScoutResult<String>;
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Text of the first candidate that has any, parts joined by a blank line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub finish_reason: String,
}

impl Completion {
    pub fn hit_token_limit(&self) -> bool {
        self.finish_reason.eq_ignore_ascii_case("MAX_TOKENS")
    }
}

pub fn parse_completion(body: &str) -> ScoutResult<Completion> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    let parsed: GenerateResponse = serde_json::from_str(body)?;
    for candidate in parsed.candidates {
        let texts: Vec<String> = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if !texts.is_empty() {
            return Ok(Completion {
                text: texts.join("\n\n").trim().to_string(),
                finish_reason: candidate.finish_reason.unwrap_or_default(),
            });
        }
    }
    Ok(Completion::default())
}

pub fn build_payload(config: &GeminiConfig, prompt: &str) -> serde_json::Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": config.temperature,
            "maxOutputTokens": config.max_output_tokens,
        }
    })
}

/// Prompt for continuing a truncated answer from its last `tail` characters.
pub fn continuation_prompt(base_prompt: &str, tail: &str) -> String {
    let tail = if tail.is_empty() { "-" } else { tail };
    [
        base_prompt,
        "",
        "[직전 응답 마지막 부분]",
        tail,
        "",
        "위 응답의 마지막 문장 바로 다음부터 이어서 작성하세요.",
        "이미 쓴 내용은 반복하지 말고 이어쓰기만 출력하세요.",
    ]
    .join("\n")
}

fn last_chars(text: &str, n: usize) -> &str {
    match text.char_indices().rev().nth(n.saturating_sub(1)) {
        Some((idx, _)) if n > 0 => &text[idx..],
        _ if n == 0 => "",
        _ => text,
    }
}

pub struct GeminiClient<'a, C> {
    http: &'a C,
    config: &'a ScoutConfig,
    api_key: String,
}

impl<'a, C: HttpClient> GeminiClient<'a, C> {
    pub fn new(http: &'a C, config: &'a ScoutConfig, api_key: Option<&str>) -> ScoutResult<Self> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ScoutError::validation("Missing Gemini API key: GEMINI_API_KEY"))?;
        Ok(Self {
            http,
            config,
            api_key: api_key.to_string(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.config.gemini.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.config.gemini.model),
            urlencoding::encode(&self.api_key)
        )
    }

    async fn call(&self, ctx: &RunContext, prompt: &str) -> ScoutResult<Completion> {
        let url = self.url();
        let payload = build_payload(&self.config.gemini, prompt);
        let body = with_retry(RetryPolicy::from_config(self.config), SCOPE, |_| async {
            let resp = self.http.post_json(&url, &[], &payload).await?;
            if resp.is_success() {
                return Ok(resp.body);
            }
            if resp.status == 429 && QUOTA_EXCEEDED.is_match(&resp.body) {
                ctx.disable("quota exceeded (429)");
                return Err(ScoutError::http(SCOPE, resp.status, &resp.body, Some(false)));
            }
            Err(ScoutError::http_status(SCOPE, resp.status, &resp.body))
        })
        .await?;
        parse_completion(&body)
    }
}

impl<C: HttpClient> TextGenerator for GeminiClient<'_, C> {
    fn model(&self) -> &str {
        &self.config.gemini.model
    }

    #[instrument(level = "info", skip_all, fields(model = %self.config.gemini.model, prompt_chars = prompt.chars().count()))]
    async fn generate(&self, ctx: &RunContext, prompt: &str) -> ScoutResult<String> {
        if let Some(reason) = ctx.disabled_reason() {
            return Err(ScoutError::Disabled(reason.to_string()));
        }

        let t0 = Instant::now();
        let first = self.call(ctx, prompt).await?;
        if first.text.is_empty() {
            return Err(ScoutError::Decode("Gemini response did not contain text.".into()));
        }

        let mut truncated = first.hit_token_limit();
        let mut output = first.text;
        let cfg = &self.config.gemini;

        for round in 0..cfg.max_continuations {
            if !truncated {
                break;
            }
            let tail = last_chars(&output, cfg.continuation_tail_chars);
            let next = self.call(ctx, &continuation_prompt(prompt, tail)).await?;
            if next.text.is_empty() {
                break;
            }
            info!(round = round + 1, added_chars = next.text.chars().count(), "continued truncated response");
            output = format!("{output}\n{}", next.text).trim().to_string();
            truncated = next.hit_token_limit();
        }

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            output_chars = output.chars().count(),
            "generation complete"
        );
        Ok(output)
    }
}
