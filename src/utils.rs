//! Text, URL and filesystem helpers used throughout the crate.
//!
//! This module provides:
//! - Whitespace normalisation and order-preserving de-duplication
//! - HTML entity decoding, tag stripping and script-escape decoding for
//!   markup-embedded URLs and JSON strings
//! - Length clamping for log fields and workbook cells
//! - Timestamp formatting and output directory validation

use chrono::Local;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static HTML_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX]?[0-9a-fA-F]+|[a-zA-Z]+);").expect("static regex"));
static UNICODE_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").expect("static regex"));
static FILE_NAME_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\r\n\t]"#).expect("static regex"));

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(value: &str) -> String {
    WHITESPACE.replace_all(value, " ").trim().to_string()
}

/// Remove every whitespace character.
pub fn remove_all_spaces(value: &str) -> String {
    WHITESPACE.replace_all(value, "").trim().to_string()
}

/// Trim, drop empties and de-duplicate while keeping first-seen order.
pub fn unique_strings<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let v = value.as_ref().trim();
        if v.is_empty() || !seen.insert(v.to_string()) {
            continue;
        }
        out.push(v.to_string());
    }
    out
}

/// Replace every tag with a space. Not an HTML parser: comments and
/// attribute values containing `>` are not handled.
pub fn strip_html_tags(html: &str) -> String {
    HTML_TAG.replace_all(html, " ").into_owned()
}

/// Decode the handful of named entities the result pages use plus any
/// decimal or hexadecimal numeric reference. Unknown entities are kept.
/// Extracted titles and URLs depend on this exact named set; do not widen
/// it to a full entity table.
pub fn decode_html_entities(text: &str) -> String {
    HTML_ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = caps[1].to_ascii_lowercase();
            match entity.as_str() {
                "amp" => return "&".to_string(),
                "lt" => return "<".to_string(),
                "gt" => return ">".to_string(),
                "quot" => return "\"".to_string(),
                "#39" => return "'".to_string(),
                "nbsp" => return " ".to_string(),
                _ => {}
            }
            if let Some(num) = entity.strip_prefix('#') {
                let parsed = match num.strip_prefix('x') {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse::<u32>().ok(),
                };
                if let Some(c) = parsed.and_then(char::from_u32) {
                    return c.to_string();
                }
            }
            caps[0].to_string()
        })
        .into_owned()
}

/// Undo the escaping script blocks apply to URLs (`\u002F`, `\/` and friends).
pub fn decode_script_escaped_url(text: &str) -> String {
    static ESCAPES: Lazy<[(Regex, &'static str); 4]> = Lazy::new(|| {
        [
            (Regex::new(r"(?i)\\u002F").expect("static regex"), "/"),
            (Regex::new(r"(?i)\\u003A").expect("static regex"), ":"),
            (Regex::new(r"(?i)\\u0026").expect("static regex"), "&"),
            (Regex::new(r"\\/").expect("static regex"), "/"),
        ]
    });
    let mut out = text.to_string();
    for (re, replacement) in ESCAPES.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// Decode a JSON-string fragment that was captured raw from markup:
/// `\uXXXX` sequences (surrogate pairs included) and simple backslash escapes.
pub fn decode_unicode_escapes(value: &str) -> String {
    let mut units: Vec<u16> = Vec::new();
    let mut out = String::with_capacity(value.len());
    let mut last = 0;

    let flush = |units: &mut Vec<u16>, out: &mut String| {
        if !units.is_empty() {
            out.push_str(&String::from_utf16_lossy(units));
            units.clear();
        }
    };

    for caps in UNICODE_ESCAPE.captures_iter(value) {
        let Some(m) = caps.get(0) else { continue };
        if m.start() != last {
            flush(&mut units, &mut out);
            out.push_str(&value[last..m.start()]);
        }
        if let Ok(unit) = u16::from_str_radix(&caps[1], 16) {
            units.push(unit);
        }
        last = m.end();
    }
    flush(&mut units, &mut out);
    out.push_str(&value[last..]);

    out.replace("\\n", "\n")
        .replace("\\r", " ")
        .replace("\\t", " ")
        .replace("\\\"", "\"")
        .replace("\\/", "/")
        .replace("\\\\", "\\")
}

/// Percent-decode one URL component, treating `+` as a space.
/// Returns an empty string when the input is not valid percent-encoding.
pub fn decode_url_component(value: &str) -> String {
    let raw = value.replace('+', "%20");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or_default()
}

/// Keep at most `max` characters, appending `...` when anything was cut.
pub fn truncate_text(text: &str, max: usize) -> String {
    let max = max.max(1);
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Clamp to `max` characters total, the ellipsis included.
pub fn clamp_text(text: &str, max: usize) -> String {
    let max = max.max(4);
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max - 3).collect();
    format!("{head}...")
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` bytes (backing off to a character
/// boundary) with a byte-count indicator appended.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Interpret a queue cell. Checkbox `true` plus the legacy spellings
/// `Y`, `YES`, `TRUE`, `1` and `RUN` count as marked.
pub fn is_queue_marked(value: &str) -> bool {
    let v = normalize_whitespace(value).to_uppercase();
    matches!(v.as_str(), "Y" | "YES" | "TRUE" | "1" | "RUN")
}

/// Make a string safe to embed in a file name (max 80 characters).
pub fn sanitize_file_name_part(value: &str) -> String {
    let trimmed = normalize_whitespace(value);
    if trimmed.is_empty() {
        return String::new();
    }
    let cleaned = FILE_NAME_UNSAFE.replace_all(&trimmed, " ");
    normalize_whitespace(&cleaned).chars().take(80).collect()
}

/// Local time formatted for workbook cells.
pub fn now_for_sheet() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Local time formatted for file names.
pub fn file_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
