//! Data models for result-page sections, classification summaries, blog
//! posts, author rankings and search-volume records.
//!
//! - [`Section`]: one structurally delimited block of a mobile result page
//! - [`QuerySummary`]: smartblock classification aggregated over a query
//! - [`AnalyzableBlock`] and [`Post`]: sections selected for deep analysis
//!   together with their resolved top posts
//! - [`AuthorRankEntry`] and [`AuthorRanking`]: first positions of tracked
//!   blogs inside a query's sections
//! - [`VolumeRecord`]: PC/mobile search volume for one keyword

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rendered when no tracked blog appears anywhere on the page.
pub const NO_RANKING: &str = "순위 없음";

/// Placeholder for sections without a heading.
pub const UNTITLED_SECTION: &str = "제목없음";

/// One section of a result page, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// 1-based position in the document.
    pub index: usize,
    /// Template identifier from `data-block-id`, empty when absent.
    pub block_id: String,
    /// Human-readable heading, may be empty.
    pub title: String,
    /// The HTML substring owned by this section.
    #[serde(skip_serializing)]
    pub segment: String,
}

/// The two smartblock categories this crate extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    PopularArticle,
    PopularTopic,
}

impl BlockCategory {
    /// Label used in workbook cells and prompts.
    pub fn label(self) -> &'static str {
        match self {
            BlockCategory::PopularArticle => "인기글",
            BlockCategory::PopularTopic => "인기주제",
        }
    }
}

impl fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Smartblock classification of every section for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySummary {
    pub has_popular_article: bool,
    pub has_popular_topic: bool,
    /// De-duplicated, first-seen order.
    pub article_titles: Vec<String>,
    /// De-duplicated, first-seen order.
    pub topic_titles: Vec<String>,
    /// Unique ordinals of popular-article sections, document order.
    pub article_ordinals: Vec<usize>,
    /// Unique ordinals of popular-topic sections, document order.
    pub topic_ordinals: Vec<usize>,
}

impl QuerySummary {
    /// Four-way presence flag: `인기글|인기주제`, `인기글`, `인기주제` or `없음`.
    pub fn flag(&self) -> &'static str {
        match (self.has_popular_article, self.has_popular_topic) {
            (true, true) => "인기글|인기주제",
            (true, false) => "인기글",
            (false, true) => "인기주제",
            (false, false) => "없음",
        }
    }

    pub fn article_titles_joined(&self) -> String {
        self.article_titles.join("|")
    }

    pub fn topic_titles_joined(&self) -> String {
        self.topic_titles.join(",")
    }

    /// Ordinals grouped by category, e.g. `인기글:2번째;인기주제:1번째,3번째`.
    pub fn section_ordinals(&self) -> String {
        let mut parts = Vec::new();
        for (category, ordinals) in [
            (BlockCategory::PopularArticle, &self.article_ordinals),
            (BlockCategory::PopularTopic, &self.topic_ordinals),
        ] {
            if ordinals.is_empty() {
                continue;
            }
            let list = ordinals
                .iter()
                .map(|n| format!("{n}번째"))
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("{}:{}", category.label(), list));
        }
        parts.join(";")
    }
}

/// A blog post resolved from a section and fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// `https://m.blog.naver.com/<author>/<post>`; the identity key.
    pub canonical_url: String,
    pub title: String,
    pub body: String,
    /// Hashtags including the leading `#`.
    pub tags: Vec<String>,
}

impl Post {
    pub fn tags_joined(&self) -> String {
        self.tags.join(",")
    }
}

/// A classified section selected for post collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzableBlock {
    pub category: BlockCategory,
    pub title: String,
    pub ordinal: usize,
    pub posts: Vec<Post>,
}

impl AnalyzableBlock {
    /// `주제 N. <category> | <title> | <ordinal>번째`
    pub fn display_label(&self, position: usize) -> String {
        let title = if self.title.is_empty() {
            "(제목없음)"
        } else {
            self.title.as_str()
        };
        format!(
            "주제 {}. {} | {} | {}번째",
            position + 1,
            self.category,
            title,
            self.ordinal
        )
    }
}

/// The first position of a tracked author on a result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRankEntry {
    pub author_id: String,
    pub section_ordinal: usize,
    pub rank_within_section: usize,
    pub section_title: String,
}

/// First hits for the tracked authors, in the order the targets were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRanking {
    pub hits: Vec<AuthorRankEntry>,
}

impl AuthorRanking {
    #[cfg(test)]
    pub fn get(&self, author_id: &str) -> Option<&AuthorRankEntry> {
        self.hits.iter().find(|h| h.author_id == author_id)
    }
}

impl fmt::Display for AuthorRanking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits.is_empty() {
            return f.write_str(NO_RANKING);
        }
        let rendered = self
            .hits
            .iter()
            .map(|h| {
                format!(
                    "{}: {}섹션 {}위 ({})",
                    h.author_id, h.section_ordinal, h.rank_within_section, h.section_title
                )
            })
            .collect::<Vec<_>>()
            .join(" | ");
        f.write_str(&rendered)
    }
}

/// A volume component: a count when the provider reports a number,
/// otherwise the provider's own label (e.g. `"< 10"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Volume {
    Count(i64),
    Label(String),
}

impl Volume {
    /// Interpret a raw JSON field. Integer strings become counts; blanks
    /// and nulls become `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Volume> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Volume::Count(i),
                None => Volume::Label(n.to_string()),
            }),
            serde_json::Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return None;
                }
                match s.parse::<i64>() {
                    Ok(i) => Some(Volume::Count(i)),
                    Err(_) => Some(Volume::Label(s.to_string())),
                }
            }
            other => Some(Volume::Label(other.to_string())),
        }
    }

    pub fn as_count(&self) -> Option<i64> {
        match self {
            Volume::Count(n) => Some(*n),
            Volume::Label(_) => None,
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Volume::Count(n) => write!(f, "{n}"),
            Volume::Label(s) => f.write_str(s),
        }
    }
}

/// Monthly search volume for one keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub pc: Option<Volume>,
    pub mobile: Option<Volume>,
    /// Present only when both components are counts and their sum fits.
    pub total: Option<i64>,
}

impl VolumeRecord {
    pub fn new(pc: Option<Volume>, mobile: Option<Volume>) -> Self {
        let total = match (
            pc.as_ref().and_then(Volume::as_count),
            mobile.as_ref().and_then(Volume::as_count),
        ) {
            (Some(a), Some(b)) => a.checked_add(b),
            _ => None,
        };
        Self { pc, mobile, total }
    }

    pub fn has_value(&self) -> bool {
        self.pc.is_some() || self.mobile.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_flag_variants() {
        let mut s = QuerySummary::default();
        assert_eq!(s.flag(), "없음");
        s.has_popular_topic = true;
        assert_eq!(s.flag(), "인기주제");
        s.has_popular_article = true;
        assert_eq!(s.flag(), "인기글|인기주제");
        s.has_popular_topic = false;
        assert_eq!(s.flag(), "인기글");
    }

    #[test]
    fn test_section_ordinals_rendering() {
        let s = QuerySummary {
            article_ordinals: vec![2],
            topic_ordinals: vec![1, 3],
            ..Default::default()
        };
        assert_eq!(s.section_ordinals(), "인기글:2번째;인기주제:1번째,3번째");
        assert_eq!(QuerySummary::default().section_ordinals(), "");
    }

    #[test]
    fn test_volume_from_json() {
        assert_eq!(Volume::from_json(&json!(120)), Some(Volume::Count(120)));
        assert_eq!(Volume::from_json(&json!("340")), Some(Volume::Count(340)));
        assert_eq!(
            Volume::from_json(&json!("< 10")),
            Some(Volume::Label("< 10".into()))
        );
        assert_eq!(Volume::from_json(&json!("  ")), None);
        assert_eq!(Volume::from_json(&json!(null)), None);
    }

    #[test]
    fn test_total_only_when_both_numeric() {
        let r = VolumeRecord::new(Some(Volume::Count(10)), Some(Volume::Count(32)));
        assert_eq!(r.total, Some(42));

        let r = VolumeRecord::new(Some(Volume::Label("< 10".into())), Some(Volume::Count(32)));
        assert_eq!(r.total, None);
        assert!(r.has_value());

        assert!(!VolumeRecord::default().has_value());
    }

    #[test]
    fn test_total_left_blank_on_overflow() {
        let r = VolumeRecord::new(Some(Volume::Count(i64::MAX)), Some(Volume::Count(1)));
        assert_eq!(r.total, None);
        assert_eq!(r.pc, Some(Volume::Count(i64::MAX)));
    }

    #[test]
    fn test_author_ranking_display() {
        assert_eq!(AuthorRanking::default().to_string(), NO_RANKING);

        let ranking = AuthorRanking {
            hits: vec![
                AuthorRankEntry {
                    author_id: "abc123".into(),
                    section_ordinal: 2,
                    rank_within_section: 1,
                    section_title: "다이어트 후기".into(),
                },
                AuthorRankEntry {
                    author_id: "xyz".into(),
                    section_ordinal: 4,
                    rank_within_section: 3,
                    section_title: UNTITLED_SECTION.into(),
                },
            ],
        };
        assert_eq!(
            ranking.to_string(),
            "abc123: 2섹션 1위 (다이어트 후기) | xyz: 4섹션 3위 (제목없음)"
        );
        assert_eq!(ranking.get("xyz").map(|h| h.rank_within_section), Some(3));
    }

    #[test]
    fn test_volume_record_serialization() {
        let r = VolumeRecord::new(Some(Volume::Count(5)), Some(Volume::Label("< 10".into())));
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"pc":5,"mobile":"< 10","total":null}"#);
        let back: VolumeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_block_display_label() {
        let block = AnalyzableBlock {
            category: BlockCategory::PopularTopic,
            title: String::new(),
            ordinal: 3,
            posts: vec![],
        };
        assert_eq!(block.display_label(0), "주제 1. 인기주제 | (제목없음) | 3번째");
    }
}
