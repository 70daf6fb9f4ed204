//! Blog post resolution for result-page sections.
//!
//! - [`urls`]: candidate extraction and canonical post URLs
//! - [`resolve`]: redirector short-link resolution
//! - [`post`]: post download plus title/body/tag extraction

pub mod post;
pub mod resolve;
pub mod urls;

use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use crate::config::ScoutConfig;
use crate::http::HttpClient;
use crate::models::{Post, Section};
use crate::utils::truncate_for_log;

pub use post::fetch_post;
pub use resolve::resolve_post_url;
pub use urls::{blog_id_from_post_url, extract_url_candidates, normalize_target_blog_ids};

/// Resolve and fetch up to `limit` distinct posts from a section, in the
/// order their links appear. Unresolvable candidates and failed fetches
/// are skipped.
#[instrument(level = "info", skip_all, fields(section = section.index, limit = limit))]
pub async fn extract_top_posts<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    section: &Section,
    limit: usize,
) -> Vec<Post> {
    let limit = limit.max(1);
    let candidates = extract_url_candidates(&section.segment);
    let mut seen = HashSet::new();
    let mut posts = Vec::new();

    for candidate in &candidates {
        if posts.len() >= limit {
            break;
        }
        let Some(canonical) = resolve_post_url(http, config, candidate).await else {
            debug!(candidate = %truncate_for_log(candidate, 200), "no canonical post");
            continue;
        };
        if !seen.insert(canonical.to_lowercase()) {
            continue;
        }
        match fetch_post(http, config, &canonical).await {
            Ok(Some(post)) => posts.push(post),
            Ok(None) => debug!(url = %canonical, "post had neither title nor body"),
            Err(e) => warn!(url = %canonical, error = %e, "skipping post"),
        }
    }

    info!(candidates = candidates.len(), posts = posts.len(), "collected section posts");
    posts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::{redirect, status, FakeHttp};
    use crate::http::HttpResponse;
    use crate::serp::fetch::tests::fast_config;

    fn section(segment: &str) -> Section {
        Section {
            index: 1,
            block_id: "ugc/prs_template_v2_ugc_x".into(),
            title: "t".into(),
            segment: segment.into(),
        }
    }

    fn page(title: &str) -> HttpResponse {
        HttpResponse::ok(format!(r#"<meta property="og:title" content="{title}">"#))
    }

    #[tokio::test]
    async fn test_legacy_and_modern_links_fetch_once() {
        let segment = r#"
            <a href="https://blog.naver.com/abc123?Redirect=Log&amp;logNo=900000001">legacy</a>
            <a href="https://m.blog.naver.com/abc123/900000001">modern</a>"#;
        let http = FakeHttp::new().route("m.blog.naver.com/abc123/900000001", page("하나"));
        let posts = extract_top_posts(&http, &fast_config(), &section(segment), 3).await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].canonical_url, "https://m.blog.naver.com/abc123/900000001");
        assert_eq!(http.request_count(), 1);
    }

    #[tokio::test]
    async fn test_limit_and_skips() {
        let segment = r#"
            <a href="https://in.naver.com/short">redirect</a>
            <a href="https://m.blog.naver.com/broken/111111">500</a>
            <a href="https://m.blog.naver.com/empty/222222">empty</a>
            <a href="https://m.blog.naver.com/two/333333">two</a>
            <a href="https://m.blog.naver.com/three/444444">three</a>"#;
        let http = FakeHttp::new()
            .route("in.naver.com/short", redirect("https://blog.naver.com/one/555555"))
            .route("/one/555555", page("one"))
            .route("/broken/", status(404, "gone"))
            .route("/empty/", HttpResponse::ok("<html></html>"))
            .route("/two/", page("two"))
            .route("/three/", page("three"));

        let posts = extract_top_posts(&http, &fast_config(), &section(segment), 2).await;
        let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["one", "two"]);
        assert!(!http.requests.borrow().iter().any(|u| u.contains("three")));
    }
}
