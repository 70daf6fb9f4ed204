//! Author ranking inside result-page sections.
//!
//! Within a section every resolved, distinct post takes a rank slot, in
//! link order; an author's rank is the slot of their first post. A query's
//! result keeps only the first hit per tracked author across all sections.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

use crate::blog::{blog_id_from_post_url, extract_url_candidates, normalize_target_blog_ids, resolve_post_url};
use crate::config::ScoutConfig;
use crate::error::ScoutResult;
use crate::http::HttpClient;
use crate::models::{AuthorRankEntry, AuthorRanking, Section, UNTITLED_SECTION};
use crate::serp::fetch_sections;
use crate::utils::normalize_whitespace;

/// `(author_id, rank)` for the first post of each author in a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRank {
    pub author_id: String,
    pub rank: usize,
}

/// Rank authors within one section. Redirector links are resolved once;
/// unresolvable candidates do not take a slot.
pub async fn section_author_ranks<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    section: &Section,
) -> Vec<SectionRank> {
    let mut seen_urls = HashSet::new();
    let mut seen_authors = HashSet::new();
    let mut out = Vec::new();
    let mut rank = 0;

    for candidate in extract_url_candidates(&section.segment) {
        let Some(post_url) = resolve_post_url(http, config, &candidate).await else {
            continue;
        };
        if !seen_urls.insert(post_url.to_lowercase()) {
            continue;
        }
        let Some(author_id) = blog_id_from_post_url(&post_url) else {
            continue;
        };

        rank += 1;
        if seen_authors.insert(author_id.clone()) {
            out.push(SectionRank { author_id, rank });
        }
    }
    out
}

/// First position of each tracked author across `sections`, stopping as
/// soon as every target has been found. Hits are ordered like `targets`.
pub async fn rank_authors_in_sections<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    sections: &[Section],
    targets: &[String],
) -> AuthorRanking {
    let targets = normalize_target_blog_ids(targets);
    let target_set: HashSet<&str> = targets.iter().map(String::as_str).collect();
    let mut hits: HashMap<String, AuthorRankEntry> = HashMap::new();
    let mut unresolved = targets.len();

    for section in sections {
        if unresolved == 0 {
            break;
        }
        for item in section_author_ranks(http, config, section).await {
            if !target_set.contains(item.author_id.as_str()) || hits.contains_key(&item.author_id) {
                continue;
            }
            let title = normalize_whitespace(&section.title);
            let entry = AuthorRankEntry {
                author_id: item.author_id.clone(),
                section_ordinal: section.index,
                rank_within_section: item.rank,
                section_title: if title.is_empty() {
                    UNTITLED_SECTION.to_string()
                } else {
                    title
                },
            };
            debug!(author = %entry.author_id, section = entry.section_ordinal, rank = entry.rank_within_section, "author hit");
            hits.insert(item.author_id, entry);
            unresolved -= 1;
            if unresolved == 0 {
                break;
            }
        }
    }

    AuthorRanking {
        hits: targets.iter().filter_map(|t| hits.remove(t)).collect(),
    }
}

/// Fetch a query's result page and rank the tracked authors on it.
#[instrument(level = "info", skip(http, config, targets))]
pub async fn rank_authors_for_query<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    query: &str,
    targets: &[String],
) -> ScoutResult<AuthorRanking> {
    if normalize_target_blog_ids(targets).is_empty() {
        return Ok(AuthorRanking::default());
    }
    let sections = fetch_sections(http, config, query).await?;
    let ranking = rank_authors_in_sections(http, config, &sections, targets).await;
    info!(hits = ranking.hits.len(), "ranked tracked blogs");
    Ok(ranking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::{redirect, FakeHttp};
    use crate::http::HttpResponse;
    use crate::models::NO_RANKING;
    use crate::serp::fetch::tests::fast_config;

    fn section(index: usize, title: &str, links: &[&str]) -> Section {
        let segment = links
            .iter()
            .map(|l| format!(r#"<a href="{l}">x</a>"#))
            .collect::<String>();
        Section {
            index,
            block_id: String::new(),
            title: title.into(),
            segment,
        }
    }

    #[tokio::test]
    async fn test_every_resolved_post_takes_a_slot() {
        let http = FakeHttp::new();
        let s = section(
            1,
            "t",
            &[
                "https://m.blog.naver.com/alpha/111111",
                "https://blog.naver.com/alpha/111111",
                "https://m.blog.naver.com/alpha/222222",
                "https://m.blog.naver.com/beta/333333",
                "https://example.com/gamma/444444",
            ],
        );
        let ranks = section_author_ranks(&http, &fast_config(), &s).await;
        assert_eq!(
            ranks,
            vec![
                SectionRank { author_id: "alpha".into(), rank: 1 },
                SectionRank { author_id: "beta".into(), rank: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn test_first_hit_wins_and_order_follows_targets() {
        let http = FakeHttp::new()
            .route("in.naver.com/short", redirect("https://blog.naver.com/target2/555555"));
        let sections = vec![
            section(1, "", &["https://m.blog.naver.com/other/111111", "https://m.blog.naver.com/target1/222222"]),
            section(2, "캠핑 인기글", &["https://in.naver.com/short", "https://m.blog.naver.com/target1/333333"]),
            section(3, "never reached", &["https://m.blog.naver.com/target1/444444"]),
        ];
        let targets = vec!["Target2".to_string(), "@target1".to_string()];
        let ranking = rank_authors_in_sections(&http, &fast_config(), &sections, &targets).await;

        assert_eq!(
            ranking.to_string(),
            "target2: 2섹션 1위 (캠핑 인기글) | target1: 1섹션 2위 (제목없음)"
        );
    }

    #[tokio::test]
    async fn test_no_hits_renders_sentinel() {
        let http = FakeHttp::new().route(
            "search.naver",
            HttpResponse::ok(r#"<div data-fender-root="true"><a href="https://m.blog.naver.com/x/123456">a</a></div>"#),
        );
        let ranking = rank_authors_for_query(&http, &fast_config(), "q", &["nobody".to_string()])
            .await
            .unwrap();
        assert_eq!(ranking.to_string(), NO_RANKING);
    }

    #[tokio::test]
    async fn test_no_targets_skips_fetch() {
        let http = FakeHttp::new();
        let ranking = rank_authors_for_query(&http, &fast_config(), "q", &[]).await.unwrap();
        assert!(ranking.hits.is_empty());
        assert_eq!(http.request_count(), 0);
    }
}
