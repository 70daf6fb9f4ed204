//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default, so an empty file (or no file) yields a
//! working configuration. Secrets are not stored here; they arrive through
//! CLI flags or environment variables (see [`crate::cli`]).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ScoutError, ScoutResult};

pub const DEFAULT_MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub serp_endpoint: String,
    pub mobile_user_agent: String,
    pub accept_language: String,
    pub analysis_max_posts_per_block: usize,
    pub output_dir: String,
    pub searchad: SearchAdConfig,
    pub gemini: GeminiConfig,
    pub runtime_budget_secs: RuntimeBudgets,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            serp_endpoint: "https://m.search.naver.com/search.naver".to_string(),
            mobile_user_agent: DEFAULT_MOBILE_USER_AGENT.to_string(),
            accept_language: "ko-KR,ko;q=0.9,en-US;q=0.8".to_string(),
            analysis_max_posts_per_block: 3,
            output_dir: "./reports".to_string(),
            searchad: SearchAdConfig::default(),
            gemini: GeminiConfig::default(),
            runtime_budget_secs: RuntimeBudgets::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchAdConfig {
    pub endpoint: String,
    pub uri: String,
    pub chunk_size: usize,
}

impl Default for SearchAdConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.searchad.naver.com".to_string(),
            uri: "/keywordstool".to_string(),
            chunk_size: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub max_continuations: u32,
    pub continuation_tail_chars: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-3-flash-preview".to_string(),
            max_output_tokens: 8192,
            temperature: 0.2,
            max_continuations: 3,
            continuation_tail_chars: 2500,
        }
    }
}

/// Wall-clock ceilings per batch job, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeBudgets {
    pub collect: u64,
    pub rank: u64,
    pub posts: u64,
    pub analysis: u64,
    pub produce: u64,
}

impl Default for RuntimeBudgets {
    fn default() -> Self {
        Self {
            collect: 300,
            rank: 300,
            posts: 300,
            analysis: 300,
            produce: 300,
        }
    }
}

impl ScoutConfig {
    pub fn from_yaml_str(text: &str) -> ScoutResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| ScoutError::validation(format!("invalid config: {e}")))
    }

    /// Load from `path`, or defaults when no path was given.
    pub async fn load(path: Option<&Path>) -> ScoutResult<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let text = tokio::fs::read_to_string(p).await?;
                Self::from_yaml_str(&text)
            }
        }
    }
}
