//! Smartblock classification.
//!
//! Classification is a pure function of a section's block identifier and
//! title; nothing here touches the network.

use once_cell::sync::Lazy;
use regex::Regex;

use super::parser::INFLUENCER_BLOCK_PREFIX;
use crate::models::{BlockCategory, QuerySummary, Section};
use crate::utils::{normalize_whitespace, unique_strings};

const POPULAR_ARTICLE: &str = "인기글";
const BRAND_CONTENT: &str = "브랜드 콘텐츠";
const RELATED_BRAND_CONTENT: &str = "관련 브랜드 콘텐츠";

static UGC_V2_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^ugc/prs_template_v2_ugc_").expect("static regex"));
static POPULAR_CAFE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^ugc/prs_template_v2_ugc_popular_cafe_").expect("static regex")
});
static POWER_CONTENTS_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^ugc/prs_template_v2_ugc_powercontents_").expect("static regex")
});

fn is_topic_block_id(block_id: &str) -> bool {
    UGC_V2_PREFIX.is_match(block_id) || INFLUENCER_BLOCK_PREFIX.is_match(block_id)
}

/// A UGC-template section with a usable, non-article, non-brand title.
pub fn is_popular_topic_section(section: &Section) -> bool {
    let title = normalize_whitespace(&section.title);
    !title.is_empty()
        && is_topic_block_id(&section.block_id)
        && !title.contains(POPULAR_ARTICLE)
        && !title.contains(BRAND_CONTENT)
        && !title.contains(RELATED_BRAND_CONTENT)
}

pub fn classify_section(section: &Section) -> Option<BlockCategory> {
    let title = normalize_whitespace(&section.title);
    if title.contains(POPULAR_ARTICLE) {
        Some(BlockCategory::PopularArticle)
    } else if is_popular_topic_section(section) {
        Some(BlockCategory::PopularTopic)
    } else {
        None
    }
}

/// Aggregate the classification of every section of one page.
pub fn summarize(sections: &[Section]) -> QuerySummary {
    let mut article_titles = Vec::new();
    let mut topic_titles = Vec::new();
    let mut article_ordinals = Vec::new();
    let mut topic_ordinals = Vec::new();

    for section in sections {
        let title = normalize_whitespace(&section.title);
        match classify_section(section) {
            Some(BlockCategory::PopularArticle) => {
                article_titles.push(title);
                push_unique(&mut article_ordinals, section.index);
            }
            Some(BlockCategory::PopularTopic) => {
                topic_titles.push(title);
                push_unique(&mut topic_ordinals, section.index);
            }
            None => {}
        }
    }

    let article_titles = unique_strings(article_titles);
    let topic_titles = unique_strings(topic_titles);

    QuerySummary {
        has_popular_article: !article_titles.is_empty(),
        has_popular_topic: !topic_titles.is_empty(),
        article_titles,
        topic_titles,
        article_ordinals,
        topic_ordinals,
    }
}

fn push_unique(list: &mut Vec<usize>, value: usize) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Cafe, influencer-participation and paid "power content" sections are
/// reported in the summary but never collected or produced from.
pub fn is_excluded_from_deep_analysis(section: &Section) -> bool {
    let block_id = section.block_id.as_str();
    let title = normalize_whitespace(&section.title);

    POPULAR_CAFE_PREFIX.is_match(block_id)
        || title.contains("카페")
        || INFLUENCER_BLOCK_PREFIX.is_match(block_id)
        || title.contains("인플루언서")
        || POWER_CONTENTS_PREFIX.is_match(block_id)
        || title.contains(BRAND_CONTENT)
}
