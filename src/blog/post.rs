//! Blog post download and content extraction.
//!
//! [`parse_post_html`] is the pure half and holds all extraction rules;
//! [`fetch_post`] only adds the retried GET.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::instrument;

use crate::config::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::http::{mobile_headers, HttpClient};
use crate::models::Post;
use crate::retry::{with_retry, RetryPolicy};
use crate::utils::{
    decode_html_entities, decode_unicode_escapes, normalize_whitespace, strip_html_tags,
    truncate_text,
};

pub const MAX_TAGS: usize = 15;
const MAX_TITLE_CHARS: usize = 200;
const MIN_PARAGRAPH_CHARS: usize = 15;
const MIN_EDITOR_PARAGRAPH_CHARS: usize = 2;
const TAG_SCAN_CHARS: usize = 50_000;
const CONTAINMENT_MIN_CHARS: usize = 8;

static TITLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));
static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("static regex"));
static EDITOR_PARAGRAPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<p[^>]*class=["'][^"']*se-text-paragraph[^"']*["'][^>]*>(.*?)</p>"#)
        .expect("static regex")
});
static EDITOR_HASH_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<span[^>]*class=["'][^"']*__se-hash-tag[^"']*["'][^>]*>(.*?)</span>"#)
        .expect("static regex")
});
static TAG_NAMES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)"tagNames"\s*:\s*"([^"]*)""#).expect("static regex"));
static PLAIN_HASH_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s\u{00A0}])#([0-9A-Za-z가-힣_]{2,30})").expect("static regex")
});
static COMPARE_STRIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9a-z가-힣]").expect("static regex"));
static TAG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,|]+").expect("static regex"));

/// `content` of the first `<meta {attr}="{value}" content="...">`, decoded.
pub fn extract_meta_content(html: &str, attr: &str, value: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)<meta[^>]+{}=["']{}["'][^>]*content=["']([^"']*)["'][^>]*>"#,
        regex::escape(attr),
        regex::escape(value)
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(html)?;
    let text = normalize_whitespace(&decode_html_entities(&caps[1]));
    (!text.is_empty()).then_some(text)
}

fn extract_title_tag(html: &str) -> Option<String> {
    let caps = TITLE_TAG.captures(html)?;
    let text = clean(&caps[1]);
    (!text.is_empty()).then_some(text)
}

fn clean(fragment: &str) -> String {
    normalize_whitespace(&decode_html_entities(&strip_html_tags(fragment)))
}

fn editor_paragraphs(html: &str) -> Vec<String> {
    EDITOR_PARAGRAPH
        .captures_iter(html)
        .map(|c| clean(&c[1]))
        .filter(|t| t.chars().count() >= MIN_EDITOR_PARAGRAPH_CHARS)
        .collect()
}

/// Editor paragraphs, else generic `<p>` text of at least 15 characters,
/// else the meta description.
pub fn extract_body_text(html: &str, fallback: &str) -> String {
    let editor = editor_paragraphs(html);
    if !editor.is_empty() {
        return editor.join("\n");
    }

    let generic: Vec<String> = PARAGRAPH
        .captures_iter(html)
        .map(|c| clean(&c[1]))
        .filter(|t| t.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect();
    if !generic.is_empty() {
        return generic.join("\n");
    }

    normalize_whitespace(fallback)
}

fn compare_key(value: &str) -> String {
    COMPARE_STRIP.replace_all(&value.to_lowercase(), "").into_owned()
}

/// Drop the body's first non-empty line when it repeats the title.
///
/// Lines match when their comparison keys (lowercase letters, digits and
/// Hangul only) are equal, or when both keys have at least 8 characters and
/// one contains the other.
pub fn remove_duplicated_title(title: &str, body: &str) -> String {
    let title = normalize_whitespace(title);
    if title.is_empty() || body.is_empty() {
        return body.to_string();
    }

    let mut lines: Vec<String> = body
        .split('\n')
        .map(normalize_whitespace)
        .filter(|l| !l.is_empty())
        .collect();
    let Some(first) = lines.first() else {
        return body.to_string();
    };

    let title_key = compare_key(&title);
    let first_key = compare_key(first);
    if title_key.is_empty() || first_key.is_empty() {
        return body.to_string();
    }

    let long_enough = first_key.chars().count() >= CONTAINMENT_MIN_CHARS
        && title_key.chars().count() >= CONTAINMENT_MIN_CHARS;
    let contains = long_enough && (first_key.contains(&title_key) || title_key.contains(&first_key));

    if first_key == title_key || contains {
        lines.remove(0);
        lines.join("\n")
    } else {
        body.to_string()
    }
}

struct TagSet {
    seen: HashSet<String>,
    tags: Vec<String>,
}

impl TagSet {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            tags: Vec::new(),
        }
    }

    fn full(&self) -> bool {
        self.tags.len() >= MAX_TAGS
    }

    fn add(&mut self, raw: &str) {
        let decoded = normalize_whitespace(&decode_html_entities(raw));
        let stripped = decoded.trim_start_matches('#');
        let separated = TAG_SEPARATORS.replace_all(stripped, " ");
        let normalized: String = separated.split_whitespace().collect();
        if normalized.is_empty() {
            return;
        }
        let tag = format!("#{normalized}");
        if self.seen.insert(tag.to_lowercase()) {
            self.tags.push(tag);
        }
    }
}

/// Up to 15 hashtags from, in priority order: editor hashtag spans, the
/// page data `tagNames` field, and a `#word` scan over paragraph text,
/// stripped HTML and `seed`.
pub fn extract_tags(html: &str, seed: &str) -> Vec<String> {
    let mut set = TagSet::new();

    for caps in EDITOR_HASH_TAG.captures_iter(html) {
        set.add(&strip_html_tags(&caps[1]));
        if set.full() {
            return set.tags;
        }
    }

    for caps in TAG_NAMES.captures_iter(html) {
        let decoded = decode_unicode_escapes(&caps[1]);
        for part in decoded.split(',').map(normalize_whitespace).filter(|p| !p.is_empty()) {
            set.add(&part);
            if set.full() {
                return set.tags;
            }
        }
    }

    let editor_text = editor_paragraphs(html).join("\n");
    let plain = decode_html_entities(&strip_html_tags(html));
    let scan: String = format!("{editor_text}\n{plain}\n{seed}")
        .chars()
        .take(TAG_SCAN_CHARS)
        .collect();
    for caps in PLAIN_HASH_TAG.captures_iter(&scan) {
        set.add(&caps[1]);
        if set.full() {
            break;
        }
    }
    set.tags
}

/// Extract a post from its HTML. Returns `None` when the page has neither
/// a title nor a body.
pub fn parse_post_html(canonical_url: &str, html: &str) -> Option<Post> {
    let title = extract_meta_content(html, "property", "og:title")
        .or_else(|| extract_meta_content(html, "name", "title"))
        .or_else(|| extract_title_tag(html))
        .unwrap_or_default();
    let description = extract_meta_content(html, "property", "og:description")
        .or_else(|| extract_meta_content(html, "name", "description"))
        .unwrap_or_default();

    let raw_body = extract_body_text(html, &description);
    let body = remove_duplicated_title(&title, &raw_body);
    let tags = extract_tags(html, &format!("{title}\n{description}\n{body}"));

    if title.is_empty() && body.is_empty() {
        return None;
    }
    Some(Post {
        canonical_url: canonical_url.to_string(),
        title: truncate_text(&title, MAX_TITLE_CHARS),
        body,
        tags,
    })
}

/// Download and extract one canonical post.
#[instrument(level = "debug", skip(http, config))]
pub async fn fetch_post<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    canonical_url: &str,
) -> ScoutResult<Option<Post>> {
    let headers = mobile_headers(config);
    let html = with_retry(RetryPolicy::from_config(config), "Naver Blog fetch", |_| async {
        let resp = http.get(canonical_url, &headers[..2], true).await?;
        if resp.is_success() && !resp.body.is_empty() {
            Ok(resp.body)
        } else {
            Err(ScoutError::http_status("Naver Blog fetch", resp.status, &resp.body))
        }
    })
    .await?;
    Ok(parse_post_html(canonical_url, &html))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://m.blog.naver.com/a/123456";

    #[test]
    fn test_title_fallback_chain() {
        let og = r#"<meta property="og:title" content="OG &amp; title"><title>tag</title>"#;
        assert_eq!(parse_post_html(URL, og).unwrap().title, "OG & title");

        let name = r#"<meta name="title" content="named"><title>tag</title>"#;
        assert_eq!(parse_post_html(URL, name).unwrap().title, "named");

        let tag = "<title> <b>only</b> tag </title>";
        assert_eq!(parse_post_html(URL, tag).unwrap().title, "only tag");
    }

    #[test]
    fn test_body_prefers_editor_paragraphs() {
        let html = r#"
            <p class="se-text-paragraph se-ff">첫 문단</p>
            <p class="se-text-paragraph">둘째 문단</p>
            <p class="se-text-paragraph">a</p>
            <p>this generic paragraph is long enough</p>"#;
        assert_eq!(extract_body_text(html, "desc"), "첫 문단\n둘째 문단");
    }

    #[test]
    fn test_body_falls_back_to_long_paragraphs_then_description() {
        let html = "<p>short</p><p>this generic paragraph is long enough</p>";
        assert_eq!(extract_body_text(html, "desc"), "this generic paragraph is long enough");
        assert_eq!(extract_body_text("<p>tiny</p>", "  meta  description "), "meta description");
    }

    #[test]
    fn test_first_line_equal_to_title_is_stripped() {
        assert_eq!(
            remove_duplicated_title("Camping Chair!", "camping   chair\nsecond line"),
            "second line"
        );
        assert_eq!(
            remove_duplicated_title("캠핑 의자 추천 리뷰 총정리", "캠핑 의자 추천 리뷰\n본문"),
            "본문"
        );
        let untouched = "different first line\nsecond";
        assert_eq!(remove_duplicated_title("Camping Chair", untouched), untouched);
    }

    #[test]
    fn test_short_containment_is_not_enough() {
        let body = "캠핑 의자 후기\n본문";
        assert_eq!(remove_duplicated_title("캠핑 의자", body), body);
    }

    #[test]
    fn test_tags_from_editor_spans_first() {
        let html = r#"<span class="__se-hash-tag">#캠핑</span><span class="x __se-hash-tag">#캠핑</span>
                      <span class="__se-hash-tag">#의자,추천</span>"tagNames":"여행""#;
        // The plain scan still runs afterwards and picks up "#의자" from the span text.
        assert_eq!(extract_tags(html, ""), vec!["#캠핑", "#의자추천", "#여행", "#의자"]);
    }

    #[test]
    fn test_tags_from_tag_names_then_plain_scan() {
        let html = r#"<script>{"tagNames":"여행,Camping, camping"}</script>"#;
        assert_eq!(extract_tags(html, ""), vec!["#여행", "#Camping"]);

        let plain = "<p>오늘은 #등산 을 했다 #a #hiking_day</p>";
        assert_eq!(extract_tags(plain, "seed #추가"), vec!["#등산", "#hiking_day", "#추가"]);
    }

    #[test]
    fn test_tags_are_capped() {
        let html: String = (0..30).map(|i| format!(" #tag{i:02}")).collect();
        assert_eq!(extract_tags(&html, "").len(), MAX_TAGS);
    }

    #[test]
    fn test_empty_page_is_discarded() {
        assert_eq!(parse_post_html(URL, "<html><body></body></html>"), None);
    }

    #[test]
    fn test_full_post_extraction() {
        let html = r#"<meta property="og:title" content="우산 추천 베스트">
            <meta property="og:description" content="desc">
            <p class="se-text-paragraph">우산 추천 베스트</p>
            <p class="se-text-paragraph">가볍고 튼튼한 우산</p>
            <span class="__se-hash-tag">#우산</span>"#;
        let post = parse_post_html(URL, html).unwrap();
        assert_eq!(post.canonical_url, URL);
        assert_eq!(post.body, "가볍고 튼튼한 우산");
        assert_eq!(post.tags, vec!["#우산"]);
    }
}
