//! JSON workbook: keyword rows with their work queues, tracked blog IDs,
//! product profiles and the append-only content history.
//!
//! The file is loaded once per job and saved after every processed row, so
//! an interrupted run keeps everything finished so far.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

use crate::blog::normalize_target_blog_ids;
use crate::error::ScoutResult;
use crate::models::{QuerySummary, Volume, VolumeRecord};
use crate::utils::{is_queue_marked, normalize_whitespace};

pub const RECENT_HISTORY_LIMIT: usize = 20;

/// The five per-row work queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Rank,
    Keyword,
    Posts,
    Analysis,
    Produce,
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Queue::Rank => "rank",
            Queue::Keyword => "keyword",
            Queue::Posts => "posts",
            Queue::Analysis => "analysis",
            Queue::Produce => "produce",
        })
    }
}

/// Accepts `true`/`false`, `1`/`0` and the legacy text markers.
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => is_queue_marked(&s),
        serde_json::Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueFlags {
    #[serde(deserialize_with = "lenient_flag")]
    pub rank: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub keyword: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub posts: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub analysis: bool,
    #[serde(deserialize_with = "lenient_flag")]
    pub produce: bool,
}

impl QueueFlags {
    pub fn get(&self, queue: Queue) -> bool {
        match queue {
            Queue::Rank => self.rank,
            Queue::Keyword => self.keyword,
            Queue::Posts => self.posts,
            Queue::Analysis => self.analysis,
            Queue::Produce => self.produce,
        }
    }

    pub fn clear(&mut self, queue: Queue) {
        let flag = match queue {
            Queue::Rank => &mut self.rank,
            Queue::Keyword => &mut self.keyword,
            Queue::Posts => &mut self.posts,
            Queue::Analysis => &mut self.analysis,
            Queue::Produce => &mut self.produce,
        };
        *flag = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RowStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordRow {
    pub keyword: String,
    pub queue: QueueFlags,
    pub pc_volume: Option<Volume>,
    pub mobile_volume: Option<Volume>,
    pub total_volume: Option<Volume>,
    pub smartblock_flag: String,
    pub popular_article_titles: String,
    pub popular_topic_titles: String,
    pub section_ordinals: String,
    pub rank_result: String,
    pub keyword_collected_at: String,
    pub rank_collected_at: String,
    pub status: Option<RowStatus>,
    pub error: String,
    pub produce_product: String,
    pub produce_intent: String,
    pub produce_title: String,
    pub produce_file: String,
    pub produced_at: String,
    pub produce_status: Option<RowStatus>,
    pub produce_error: String,
}

impl KeywordRow {
    #[cfg(test)]
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            ..Default::default()
        }
    }

    /// The search query issued for this row.
    pub fn query(&self) -> String {
        normalize_whitespace(&self.keyword)
    }

    pub fn record_keyword_success(&mut self, volume: &VolumeRecord, summary: &QuerySummary, at: &str) {
        self.pc_volume = volume.pc.clone();
        self.mobile_volume = volume.mobile.clone();
        self.total_volume = volume.total.map(Volume::Count);
        self.smartblock_flag = summary.flag().to_string();
        self.popular_article_titles = summary.article_titles_joined();
        self.popular_topic_titles = summary.topic_titles_joined();
        self.section_ordinals = summary.section_ordinals();
        self.keyword_collected_at = at.to_string();
        self.status = Some(RowStatus::Ok);
        self.error.clear();
    }

    /// Blanks every metric so stale numbers never survive a failed refresh.
    pub fn record_keyword_error(&mut self, at: &str, message: &str) {
        self.pc_volume = None;
        self.mobile_volume = None;
        self.total_volume = None;
        self.smartblock_flag.clear();
        self.popular_article_titles.clear();
        self.popular_topic_titles.clear();
        self.section_ordinals.clear();
        self.keyword_collected_at = at.to_string();
        self.status = Some(RowStatus::Error);
        self.error = message.to_string();
    }

    pub fn record_rank_success(&mut self, rendered: &str, at: &str) {
        self.rank_result = rendered.to_string();
        self.rank_collected_at = at.to_string();
        self.status = Some(RowStatus::Ok);
        self.error.clear();
    }

    pub fn record_rank_error(&mut self, at: &str, message: &str) {
        self.rank_result.clear();
        self.rank_collected_at = at.to_string();
        self.status = Some(RowStatus::Error);
        self.error = message.to_string();
    }

    pub fn record_produce_success(&mut self, title: &str, file: &str, at: &str) {
        self.produce_title = title.to_string();
        self.produce_file = file.to_string();
        self.produced_at = at.to_string();
        self.produce_status = Some(RowStatus::Ok);
        self.produce_error.clear();
    }

    pub fn record_produce_error(&mut self, at: &str, message: &str, file: Option<&str>) {
        self.produce_title.clear();
        self.produce_file = file.unwrap_or_default().to_string();
        self.produced_at = at.to_string();
        self.produce_status = Some(RowStatus::Error);
        self.produce_error = if message.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            message.to_string()
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogIdRow {
    #[serde(deserialize_with = "lenient_flag")]
    pub active: bool,
    pub blog_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductProfile {
    pub name: String,
    pub target_keyword: String,
    pub category: String,
    pub pain: String,
    pub wrong_solution: String,
    pub root_cause: String,
    pub usp: String,
    pub routine: String,
    pub knowledge: String,
    pub compliance_memo: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEntry {
    pub created_at: String,
    pub keyword: String,
    pub product_name: String,
    pub title: String,
    pub draft_hash: String,
    pub rewrite_hash: String,
    pub file: String,
}

fn product_key(name: &str) -> String {
    normalize_whitespace(name).to_lowercase()
}

/// Base64 SHA-256 of a text, used to spot repeated drafts.
pub fn text_hash(text: &str) -> String {
    STANDARD.encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workbook {
    pub keywords: Vec<KeywordRow>,
    pub blog_ids: Vec<BlogIdRow>,
    pub products: Vec<ProductProfile>,
    pub content_history: Vec<HistoryEntry>,
}

impl Workbook {
    pub fn from_json_str(text: &str) -> ScoutResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(text)?)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> ScoutResult<Self> {
        let text = fs::read_to_string(path).await?;
        let book = Self::from_json_str(&text)?;
        debug!(
            keywords = book.keywords.len(),
            blog_ids = book.blog_ids.len(),
            products = book.products.len(),
            history = book.content_history.len(),
            "loaded workbook"
        );
        Ok(book)
    }

    /// Write through a sibling temp file so a crash never leaves half a
    /// workbook behind.
    pub async fn save(&self, path: &Path) -> ScoutResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Indices of rows with a keyword whose `queue` flag is set.
    pub fn marked_rows(&self, queue: Queue) -> Vec<usize> {
        self.keywords
            .iter()
            .enumerate()
            .filter(|(_, row)| !normalize_whitespace(&row.keyword).is_empty() && row.queue.get(queue))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn clear_queue(&mut self, index: usize, queue: Queue) {
        if let Some(row) = self.keywords.get_mut(index) {
            row.queue.clear(queue);
        }
    }

    /// Active tracked blog IDs, normalised and de-duplicated.
    pub fn active_blog_ids(&self) -> Vec<String> {
        normalize_target_blog_ids(self.blog_ids.iter().filter(|r| r.active).map(|r| r.blog_id.as_str()))
    }

    /// Case-insensitive, whitespace-normalised name lookup.
    pub fn find_product(&self, name: &str) -> Option<&ProductProfile> {
        let key = product_key(name);
        if key.is_empty() {
            return None;
        }
        self.products.iter().find(|p| product_key(&p.name) == key)
    }

    /// Newest-first history for one keyword and product.
    pub fn recent_history(&self, keyword: &str, product_name: &str, limit: usize) -> Vec<HistoryEntry> {
        let keyword = normalize_whitespace(keyword);
        let product = product_key(product_name);
        self.content_history
            .iter()
            .rev()
            .filter(|h| keyword.is_empty() || normalize_whitespace(&h.keyword) == keyword)
            .filter(|h| product.is_empty() || product_key(&h.product_name) == product)
            .take(limit.max(1))
            .cloned()
            .collect()
    }

    pub fn append_history(&mut self, entry: HistoryEntry) {
        self.content_history.push(HistoryEntry {
            created_at: normalize_whitespace(&entry.created_at),
            keyword: normalize_whitespace(&entry.keyword),
            product_name: normalize_whitespace(&entry.product_name),
            title: normalize_whitespace(&entry.title),
            draft_hash: entry.draft_hash,
            rewrite_hash: entry.rewrite_hash,
            file: entry.file,
        });
    }
}
