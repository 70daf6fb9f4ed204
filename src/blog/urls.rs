//! Blog URL extraction and canonicalisation.
//!
//! A post is identified by `https://m.blog.naver.com/<author>/<post>`.
//! Everything else (desktop host, legacy `PostView.naver?blogId=..&logNo=..`,
//! `?logNo=` redirects, script-escaped copies inside JSON) is folded onto
//! that form. Canonicalisation is idempotent.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::utils::{
    decode_html_entities, decode_script_escaped_url, decode_url_component, normalize_whitespace,
    remove_all_spaces,
};

pub const BLOG_HOST: &str = "blog.naver.com";
pub const MOBILE_BLOG_HOST: &str = "m.blog.naver.com";
/// Short-link host whose targets must be resolved over HTTP.
pub const REDIRECTOR_HOST: &str = "in.naver.com";

static HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href=["']([^"']+)["']"#).expect("static regex"));
static JSON_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)"(?:titleHref|contentHref|imageHref|keepTriggerUrl|link|href)"\s*:\s*"([^"]+)""#)
        .expect("static regex")
});
static HTTP_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://([^/?#]+)([^?#]*)(\?[^#]*)?").expect("static regex"));
static HTTP_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://").expect("static regex"));
static POST_NO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5,}$").expect("static regex"));
static CANONICAL_AUTHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://m\.blog\.naver\.com/([^/?#]+)/\d{5,}").expect("static regex")
});
static LEGACY_VIEW_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/(?:postview\.(?:naver|nhn)|postlist\.naver)(?:/|$)").expect("static regex")
});
static BLOG_ID_QUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[?&]blogId=([^&#]+)").expect("static regex"));
static BLOG_ID_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://(?:m\.)?blog\.naver\.com/([^/?#]+)").expect("static regex")
});

/// Host, path and raw query (with leading `?`) of an absolute http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub host: String,
    pub path: String,
    pub query: String,
}

pub fn parse_http_url_parts(url: &str) -> Option<UrlParts> {
    let caps = HTTP_URL.captures(url.trim())?;
    let authority = caps[1].trim().to_lowercase();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    let host = host_port.split(':').next().unwrap_or_default().to_string();
    if host.is_empty() {
        return None;
    }
    let path = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
        .to_string();
    let query = caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default();
    Some(UrlParts { host, path, query })
}

pub fn host_of(url: &str) -> Option<String> {
    parse_http_url_parts(url).map(|p| p.host)
}

/// First value of `key` (case-insensitive) in a raw query string, decoded.
pub fn query_param(query: &str, key: &str) -> Option<String> {
    let q = query.strip_prefix('?').unwrap_or(query);
    let target = key.to_lowercase();
    for pair in q.split('&').filter(|kv| !kv.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if decode_url_component(k).to_lowercase() != target {
            continue;
        }
        let value = decode_url_component(v).trim().to_string();
        return if value.is_empty() { None } else { Some(value) };
    }
    None
}

/// Decode markup/script escaping and make scheme-relative URLs absolute.
/// Returns `None` for anything that is not http(s) afterwards.
fn decode_candidate(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.is_empty() || text.starts_with('#') {
        return None;
    }
    let mut text = decode_script_escaped_url(&decode_html_entities(text)).replace("&amp;", "&");
    if text.starts_with("//") {
        text = format!("https:{text}");
    }
    HTTP_SCHEME.is_match(&text).then_some(text)
}

/// Decode a raw candidate and keep it only when it points at a blog host
/// or the redirector.
pub fn normalize_url_candidate(raw: &str) -> Option<String> {
    let text = decode_candidate(raw)?;
    let host = host_of(&text)?;
    matches!(host.as_str(), BLOG_HOST | MOBILE_BLOG_HOST | REDIRECTOR_HOST).then_some(text)
}

/// Every allowlisted URL in a section, link attributes first and then
/// JSON url-like fields, de-duplicated case-insensitively in first-seen order.
pub fn extract_url_candidates(segment: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let raw = HREF
        .captures_iter(segment)
        .chain(JSON_URL.captures_iter(segment))
        .map(|c| c[1].to_string());
    for candidate in raw.filter_map(|r| normalize_url_candidate(&r)) {
        if seen.insert(candidate.to_lowercase()) {
            out.push(candidate);
        }
    }
    out
}

fn render_canonical(author: &str, post: &str) -> String {
    format!(
        "https://{MOBILE_BLOG_HOST}/{}/{}",
        urlencoding::encode(author),
        urlencoding::encode(post)
    )
}

/// Canonical post URL, or `None` when `raw` is not a recognisable post on
/// one of the two blog hosts.
///
/// Accepted shapes:
/// - `/PostView.naver?blogId=<a>&logNo=<p>` (also `PostView.nhn`, `PostList.naver`)
/// - `/<a>/.../<p>`
/// - `/<a>?...&logNo=<p>` where `<a>` contains no `.`
///
/// In every shape `<p>` must have at least five digits.
pub fn canonicalize_post_url(raw: &str) -> Option<String> {
    let text = decode_candidate(raw)?;
    let parts = parse_http_url_parts(&text)?;
    if parts.host != BLOG_HOST && parts.host != MOBILE_BLOG_HOST {
        return None;
    }

    if LEGACY_VIEW_PATH.is_match(&parts.path) {
        let author = query_param(&parts.query, "blogId")?;
        let post = query_param(&parts.query, "logNo")?;
        return POST_NO.is_match(&post).then(|| render_canonical(&author, &post));
    }

    let segments: Vec<String> = parts
        .path
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(decode_url_component)
        .collect();
    let author = segments.first().filter(|a| !a.is_empty())?;

    let post = match segments.len() {
        0 => return None,
        1 if author.contains('.') => return None,
        1 => query_param(&parts.query, "logNo")?,
        _ => segments.last()?.clone(),
    };
    if !POST_NO.is_match(&post) {
        return None;
    }
    Some(render_canonical(author, &post))
}

/// Normalised author id of a post URL: decoded, whitespace-free, lowercase.
pub fn blog_id_from_post_url(url: &str) -> Option<String> {
    let canonical = canonicalize_post_url(url)?;
    let caps = CANONICAL_AUTHOR.captures(&canonical)?;
    let id = remove_all_spaces(&decode_url_component(&caps[1])).to_lowercase();
    (!id.is_empty()).then_some(id)
}

/// Normalise a user-entered blog id cell: a raw id, a `?blogId=` URL or a
/// `blog.naver.com/<id>` URL. Leading `@` is dropped; result is lowercase.
pub fn normalize_blog_id_cell(value: &str) -> Option<String> {
    let raw = normalize_whitespace(value);
    let compact = remove_all_spaces(&raw);
    if compact.is_empty() {
        return None;
    }

    let from_url = BLOG_ID_QUERY
        .captures(&compact)
        .or_else(|| BLOG_ID_PATH.captures(&compact))
        .map(|c| remove_all_spaces(&decode_url_component(&c[1])).to_lowercase());
    let id = match from_url {
        Some(id) => id,
        None => compact.trim_start_matches('@').to_lowercase(),
    };
    (!id.is_empty()).then_some(id)
}

/// Normalise and de-duplicate tracked blog ids, keeping input order.
pub fn normalize_target_blog_ids<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter_map(|v| normalize_blog_id_cell(v.as_ref()))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_and_modern_forms_agree() {
        let legacy = "https://blog.naver.com/abc123?Redirect=Log&logNo=900000001&from=postView";
        let modern = "https://m.blog.naver.com/abc123/900000001";
        let view = "https://m.blog.naver.com/PostView.naver?blogId=abc123&logNo=900000001";
        let expected = Some("https://m.blog.naver.com/abc123/900000001".to_string());
        assert_eq!(canonicalize_post_url(legacy), expected);
        assert_eq!(canonicalize_post_url(modern), expected);
        assert_eq!(canonicalize_post_url(view), expected);
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        for raw in [
            "https://blog.naver.com/abc123/900000001",
            "//m.blog.naver.com/PostView.naver?blogId=%ED%95%9C%EA%B8%80&amp;logNo=123456",
            "https://blog.naver.com/my_blog/category/223344556",
            "https:\\/\\/blog.naver.com\\/someone\\/22334455",
            "https://blog.naver.com/PostView.nhn?blogId=realauthor&logNo=223344556",
        ] {
            let once = canonicalize_post_url(raw).expect(raw);
            assert_eq!(canonicalize_post_url(&once).as_deref(), Some(once.as_str()));
        }
    }

    #[test]
    fn test_legacy_view_and_list_paths_use_blog_id() {
        let expected = Some("https://m.blog.naver.com/realauthor/223344556".to_string());
        for raw in [
            "https://blog.naver.com/PostView.nhn?blogId=realauthor&logNo=223344556",
            "https://blog.naver.com/PostList.naver?blogId=realauthor&logNo=223344556",
            "https://m.blog.naver.com/postview.NHN?logNo=223344556&blogId=realauthor",
        ] {
            assert_eq!(canonicalize_post_url(raw), expected, "{raw}");
            assert_eq!(blog_id_from_post_url(raw).as_deref(), Some("realauthor"), "{raw}");
        }
        assert_eq!(canonicalize_post_url("https://blog.naver.com/PostList.naver?logNo=223344556"), None);
    }

    #[test]
    fn test_host_allowlist_enforced() {
        assert_eq!(canonicalize_post_url("https://cafe.naver.com/abc/900000001"), None);
        assert_eq!(canonicalize_post_url("https://evil.com/abc/900000001"), None);
        assert_eq!(canonicalize_post_url("https://in.naver.com/abc/contents/900000001"), None);
        assert_eq!(canonicalize_post_url("https://blog.naver.com.evil.com/a/900000001"), None);
    }

    #[test]
    fn test_rejects_non_post_paths() {
        assert_eq!(canonicalize_post_url("https://blog.naver.com/abc123"), None);
        assert_eq!(canonicalize_post_url("https://blog.naver.com/abc123/1234"), None);
        assert_eq!(canonicalize_post_url("https://blog.naver.com/PostView.naver?blogId=a"), None);
        assert_eq!(
            canonicalize_post_url("https://blog.naver.com/PostView.naver?blogId=abc&logNo=1234"),
            None
        );
        assert_eq!(canonicalize_post_url("https://blog.naver.com/main.naver?logNo=223344556"), None);
        assert_eq!(canonicalize_post_url("#top"), None);
        assert_eq!(canonicalize_post_url("javascript:void(0)"), None);
    }

    #[test]
    fn test_extracts_candidates_from_links_and_json() {
        let segment = r#"
            <a href="https://m.blog.naver.com/aa/111111">x</a>
            <a href='https://M.BLOG.NAVER.COM/aa/111111'>dup</a>
            <a href="https://shopping.naver.com/x">skip</a>
            <script>{"contentHref":"https:\/\/in.naver.com\/bb\/contents\/internal\/222","link" : "//blog.naver.com/cc/333333"}</script>
        "#;
        let urls = extract_url_candidates(segment);
        assert_eq!(
            urls,
            vec![
                "https://m.blog.naver.com/aa/111111",
                "https://in.naver.com/bb/contents/internal/222",
                "https://blog.naver.com/cc/333333",
            ]
        );
    }

    #[test]
    fn test_url_parts() {
        let p = parse_http_url_parts("HTTPS://user@Blog.Naver.com:443?x=1").unwrap();
        assert_eq!(p.host, "blog.naver.com");
        assert_eq!(p.path, "/");
        assert_eq!(p.query, "?x=1");
        assert_eq!(query_param("?A=1&logno=55555", "logNo").as_deref(), Some("55555"));
        assert_eq!(query_param("?a=1", "logNo"), None);
    }

    #[test]
    fn test_blog_id_from_post_url() {
        assert_eq!(
            blog_id_from_post_url("https://blog.naver.com/AbC123/900000001").as_deref(),
            Some("abc123")
        );
        assert_eq!(blog_id_from_post_url("https://in.naver.com/abc"), None);
    }

    #[test]
    fn test_normalize_blog_id_cell() {
        assert_eq!(normalize_blog_id_cell(" @MyBlog ").as_deref(), Some("myblog"));
        assert_eq!(
            normalize_blog_id_cell("https://m.blog.naver.com/PostList.naver?blogId=Foo").as_deref(),
            Some("foo")
        );
        assert_eq!(
            normalize_blog_id_cell("https://blog.naver.com/bar_01/223344").as_deref(),
            Some("bar_01")
        );
        assert_eq!(normalize_blog_id_cell("   "), None);
        assert_eq!(
            normalize_target_blog_ids(["A", "a", "@b", ""]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
