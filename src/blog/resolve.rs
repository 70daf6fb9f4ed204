//! Resolution of raw candidates to canonical post URLs, following the
//! short-link redirector when needed.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::ScoutConfig;
use crate::error::ScoutError;
use crate::http::{mobile_headers, HttpClient};
use crate::retry::{with_retry, RetryPolicy};
use crate::utils::{decode_html_entities, normalize_whitespace};

use super::post::extract_meta_content;
use super::urls::{canonicalize_post_url, host_of, REDIRECTOR_HOST};

static CANONICAL_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<link[^>]+rel=["']canonical["'][^>]*href=["']([^"']+)["'][^>]*>"#)
        .expect("static regex")
});

pub fn extract_canonical_href(html: &str) -> Option<String> {
    let caps = CANONICAL_LINK.captures(html)?;
    let href = normalize_whitespace(&decode_html_entities(&caps[1]));
    (!href.is_empty()).then_some(href)
}

/// Canonical post URL for a candidate. Redirector links are resolved with
/// one non-following GET (retried on transient failures); every failure is
/// a miss, never an error.
pub async fn resolve_post_url<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    raw: &str,
) -> Option<String> {
    if let Some(direct) = canonicalize_post_url(raw) {
        return Some(direct);
    }
    if host_of(raw).as_deref() != Some(REDIRECTOR_HOST) {
        return None;
    }
    match resolve_redirector(http, config, raw.trim()).await {
        Ok(found) => found,
        Err(e) => {
            debug!(url = raw, error = %e, "redirector resolution failed");
            None
        }
    }
}

async fn resolve_redirector<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    url: &str,
) -> Result<Option<String>, ScoutError> {
    let headers = mobile_headers(config);
    with_retry(RetryPolicy::from_config(config), "in.naver resolve", |_| async {
        let resp = http.get(url, &headers[..2], false).await?;
        if resp.is_redirect() {
            if let Some(found) = resp.location.as_deref().and_then(canonicalize_post_url) {
                return Ok(Some(found));
            }
        }
        if resp.is_success() {
            let from_og = extract_meta_content(&resp.body, "property", "og:url")
                .and_then(|u| canonicalize_post_url(&u));
            let found =
                from_og.or_else(|| extract_canonical_href(&resp.body).and_then(|u| canonicalize_post_url(&u)));
            return Ok(found);
        }
        if resp.is_redirect() {
            return Ok(None);
        }
        Err(ScoutError::http_status("in.naver resolve", resp.status, &resp.body))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::{redirect, status, FakeHttp};
    use crate::http::HttpResponse;
    use crate::serp::fetch::tests::fast_config;

    #[tokio::test]
    async fn test_direct_urls_skip_network() {
        let http = FakeHttp::new();
        let got = resolve_post_url(&http, &fast_config(), "https://blog.naver.com/a/123456").await;
        assert_eq!(got.as_deref(), Some("https://m.blog.naver.com/a/123456"));
        assert_eq!(http.request_count(), 0);
    }

    #[tokio::test]
    async fn test_redirect_location_is_canonicalized() {
        let http = FakeHttp::new().route(
            "in.naver.com/x",
            redirect("https://blog.naver.com/PostView.naver?blogId=bob&logNo=77777"),
        );
        let got = resolve_post_url(&http, &fast_config(), "https://in.naver.com/x/contents/1").await;
        assert_eq!(got.as_deref(), Some("https://m.blog.naver.com/bob/77777"));
    }

    #[tokio::test]
    async fn test_success_page_uses_og_url_then_canonical_link() {
        let og = r#"<meta property="og:url" content="https://m.blog.naver.com/og/123456">"#;
        let canonical = r#"<link rel="canonical" href="https://blog.naver.com/canon/654321">"#;
        let http = FakeHttp::new()
            .route("in.naver.com/og", HttpResponse::ok(og))
            .route("in.naver.com/canon", HttpResponse::ok(canonical))
            .route("in.naver.com/none", HttpResponse::ok("<html></html>"));
        let cfg = fast_config();

        assert_eq!(
            resolve_post_url(&http, &cfg, "https://in.naver.com/og").await.as_deref(),
            Some("https://m.blog.naver.com/og/123456")
        );
        assert_eq!(
            resolve_post_url(&http, &cfg, "https://in.naver.com/canon").await.as_deref(),
            Some("https://m.blog.naver.com/canon/654321")
        );
        assert_eq!(resolve_post_url(&http, &cfg, "https://in.naver.com/none").await, None);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let http = FakeHttp::new().route("in.naver.com", status(500, "boom"));
        let got = resolve_post_url(&http, &fast_config(), "https://in.naver.com/x").await;
        assert_eq!(got, None);
        assert_eq!(http.request_count(), 3);
    }

    #[tokio::test]
    async fn test_other_hosts_are_ignored() {
        let http = FakeHttp::new();
        assert_eq!(resolve_post_url(&http, &fast_config(), "https://example.com/a").await, None);
        assert_eq!(http.request_count(), 0);
    }
}
