//! Section splitting for mobile result pages.
//!
//! Every smartblock root carries the attribute `data-fender-root="true"`.
//! A section runs from the nearest `<div` before its marker (or a fixed
//! 400 character window when there is none) up to the next marker or the
//! end of the document.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Section;
use crate::utils::{decode_html_entities, normalize_whitespace, strip_html_tags};

pub const SECTION_MARKER: &str = r#"data-fender-root="true""#;

const LOOKBACK_CHARS: usize = 400;

pub const INFLUENCER_BLOCK_LABEL: &str = "인플루언서 콘텐츠";

static BLOCK_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)data-block-id="([^"]+)""#).expect("static regex"));
static H2: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").expect("static regex"));
static HEADER_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)sds-comps-header-left.{0,300}<span[^>]*>(.*?)</span>").expect("static regex")
});
static INFLUENCER_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([가-힣A-Za-z0-9\s]{1,60}인플루언서(?:\s*참여)?\s*콘텐츠)").expect("static regex")
});
pub(crate) static INFLUENCER_BLOCK_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^ugc/prs_template_ugc_influencer_participation_").expect("static regex")
});

/// Lazy, restartable iterator over the sections of one page.
///
/// Parsing is a pure function of the input, so cloning the iterator (or
/// creating a new one over the same HTML) yields the same sequence again.
#[derive(Debug, Clone)]
pub struct Sections<'a> {
    source: &'a str,
    cursor: usize,
    produced: usize,
}

impl<'a> Sections<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: 0,
            produced: 0,
        }
    }
}

impl Iterator for Sections<'_> {
    type Item = Section;

    fn next(&mut self) -> Option<Section> {
        let source = self.source;
        let marker_idx = self.cursor + source.get(self.cursor..)?.find(SECTION_MARKER)?;
        let after_marker = marker_idx + SECTION_MARKER.len();
        let end_idx = source[after_marker..]
            .find(SECTION_MARKER)
            .map(|i| after_marker + i)
            .unwrap_or(source.len());

        let start_idx = source[..marker_idx]
            .rfind("<div")
            .unwrap_or_else(|| lookback_start(source, marker_idx));

        let segment = &source[start_idx..end_idx];
        let block_id = BLOCK_ID
            .captures(segment)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        let title = extract_section_title(segment, &block_id);

        self.cursor = after_marker;
        self.produced += 1;

        Some(Section {
            index: self.produced,
            block_id,
            title,
            segment: segment.to_string(),
        })
    }
}

/// Byte offset `LOOKBACK_CHARS` characters before `idx`, or 0.
fn lookback_start(source: &str, idx: usize) -> usize {
    source[..idx]
        .char_indices()
        .rev()
        .nth(LOOKBACK_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Split a page into sections, in document order.
pub fn parse_sections(html: &str) -> Vec<Section> {
    Sections::new(html).collect()
}

fn clean_title(raw: &str) -> String {
    normalize_whitespace(&decode_html_entities(&strip_html_tags(raw)))
}

/// Resolve a section heading. Strategies, first non-empty wins:
/// the first `<h2>`, the header-left label span, an
/// "... 인플루언서 (참여) 콘텐츠" phrase, and finally a fixed label for
/// influencer-participation blocks.
pub fn extract_section_title(segment: &str, block_id: &str) -> String {
    if segment.is_empty() {
        return String::new();
    }

    if let Some(c) = H2.captures(segment) {
        let t = clean_title(&c[1]);
        if !t.is_empty() {
            return t;
        }
    }

    if let Some(c) = HEADER_SPAN.captures(segment) {
        let t = clean_title(&c[1]);
        if !t.is_empty() {
            return t;
        }
    }

    if let Some(c) = INFLUENCER_TITLE.captures(segment) {
        let t = normalize_whitespace(&decode_html_entities(&c[1]));
        if !t.is_empty() {
            return t;
        }
    }

    if INFLUENCER_BLOCK_PREFIX.is_match(block_id) {
        return INFLUENCER_BLOCK_LABEL.to_string();
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str, inner: &str) -> String {
        format!(r#"<div class="sc" data-fender-root="true" data-block-id="{id}">{inner}</div>"#)
    }

    #[test]
    fn test_n_markers_give_n_ordered_sections() {
        for n in 0..6 {
            let html: String = (0..n)
                .map(|i| block(&format!("b{i}"), &format!("<h2>t{i}</h2>")))
                .collect();
            let sections = parse_sections(&html);
            assert_eq!(sections.len(), n);
            for (i, s) in sections.iter().enumerate() {
                assert_eq!(s.index, i + 1);
                assert_eq!(s.block_id, format!("b{i}"));
                assert_eq!(s.title, format!("t{i}"));
            }
        }
    }

    #[test]
    fn test_segment_boundaries() {
        let html = format!(
            "<html>{}{}<footer>end</footer>",
            block("a", "<h2>first</h2>"),
            block("b", "<h2>second</h2>")
        );
        let sections = parse_sections(&html);
        assert!(sections[0].segment.starts_with("<div class=\"sc\""));
        assert!(!sections[0].segment.contains("second"));
        assert!(sections[1].segment.ends_with("<footer>end</footer>"));
    }

    #[test]
    fn test_lookback_window_without_div() {
        let prefix = "가".repeat(500);
        let html = format!("{prefix}<section {SECTION_MARKER}><h2>x</h2></section>");
        let sections = parse_sections(&html);
        assert_eq!(sections.len(), 1);
        let before_marker = sections[0].segment.split(SECTION_MARKER).next().unwrap();
        assert_eq!(before_marker.chars().count(), 400);
    }

    #[test]
    fn test_iterator_is_restartable() {
        let html = block("a", "<h2>one</h2>") + &block("b", "<h2>two</h2>");
        let it = Sections::new(&html);
        let first: Vec<_> = it.clone().collect();
        let second: Vec<_> = it.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_title_strategies_in_order() {
        assert_eq!(
            extract_section_title("<h2> <b>다이어트</b> &amp; 운동 </h2>", ""),
            "다이어트 & 운동"
        );

        let header = r#"<div class="sds-comps-header-left"><i></i><span class="t">캠핑 <em>인기글</em></span></div>"#;
        assert_eq!(extract_section_title(header, ""), "캠핑 인기글");

        let influencer = "<div><p>여행 인플루언서 참여 콘텐츠</p></div>";
        assert_eq!(extract_section_title(influencer, ""), "여행 인플루언서 참여 콘텐츠");

        assert_eq!(
            extract_section_title(
                "<div></div>",
                "ugc/prs_template_ugc_influencer_participation_desktop"
            ),
            INFLUENCER_BLOCK_LABEL
        );
        assert_eq!(extract_section_title("<div></div>", "web/other"), "");
    }

    #[test]
    fn test_empty_h2_falls_through() {
        let html = r#"<h2> </h2><div class="sds-comps-header-left"><span>fallback</span></div>"#;
        assert_eq!(extract_section_title(html, ""), "fallback");
    }

    #[test]
    fn test_missing_block_id_is_empty() {
        let html = format!("<div {SECTION_MARKER}><h2>t</h2></div>");
        let sections = parse_sections(&html);
        assert_eq!(sections[0].block_id, "");
    }
}
