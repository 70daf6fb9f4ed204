//! Keyword search-volume lookup against the SearchAd `keywordstool` API.
//!
//! Keywords are de-duplicated and sent in fixed-size chunks. When a chunk
//! is rejected with the provider's "invalid hint keyword" error (code 11001)
//! each keyword of that chunk is retried on its own, first as typed and then
//! with all spaces removed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::http::HttpClient;
use crate::models::{Volume, VolumeRecord};
use crate::retry::{with_retry, RetryPolicy};
use crate::utils::{normalize_whitespace, remove_all_spaces, unique_strings};

pub type VolumeMap = HashMap<String, VolumeRecord>;

static INVALID_HINT_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)11001|hintkeywords").expect("static regex"));

/// One metrics batch call.
pub trait VolumeSource {
    async fn fetch_chunk(&self, keywords: &[String]) -> ScoutResult<VolumeMap>;
}

#[derive(Debug, Clone)]
pub struct SearchAdCredentials {
    pub api_key: String,
    pub secret_key: String,
    pub customer_id: String,
}

impl SearchAdCredentials {
    /// Every value must be present and non-blank.
    pub fn new(
        api_key: Option<&str>,
        secret_key: Option<&str>,
        customer_id: Option<&str>,
    ) -> ScoutResult<Self> {
        fn required(value: Option<&str>, name: &str) -> ScoutResult<String> {
            match value.map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(ScoutError::validation(format!("Missing SearchAd credential: {name}"))),
            }
        }
        Ok(Self {
            api_key: required(api_key, "NAVER_SEARCHAD_API_KEY")?,
            secret_key: required(secret_key, "NAVER_SEARCHAD_SECRET_KEY")?,
            customer_id: required(customer_id, "NAVER_SEARCHAD_CUSTOMER_ID")?,
        })
    }
}

/// `base64(HMAC-SHA256(secret, "<timestamp>.<METHOD>.<uri>"))`
pub fn sign(timestamp: &str, method: &str, uri: &str, secret: &str) -> ScoutResult<String> {
    let message = format!("{timestamp}.{}.{uri}", method.to_uppercase());
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| ScoutError::validation(format!("invalid SearchAd secret: {e}")))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeywordToolResponse {
    #[serde(default)]
    keyword_list: Vec<KeywordToolItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeywordToolItem {
    #[serde(default)]
    rel_keyword: Option<String>,
    #[serde(default)]
    monthly_pc_qc_cnt: serde_json::Value,
    #[serde(default)]
    monthly_mobile_qc_cnt: serde_json::Value,
}

/// Decode a `keywordstool` body into a map keyed by keyword and by its
/// space-free form.
pub fn parse_keyword_tool(body: &str) -> ScoutResult<VolumeMap> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    let parsed: KeywordToolResponse = serde_json::from_str(body)?;

    let mut out = VolumeMap::new();
    for item in parsed.keyword_list {
        let keyword = normalize_whitespace(item.rel_keyword.as_deref().unwrap_or_default());
        if keyword.is_empty() {
            continue;
        }
        let record = VolumeRecord::new(
            Volume::from_json(&item.monthly_pc_qc_cnt),
            Volume::from_json(&item.monthly_mobile_qc_cnt),
        );
        let compact = remove_all_spaces(&keyword);
        out.insert(keyword, record.clone());
        if !compact.is_empty() {
            out.entry(compact).or_insert(record);
        }
    }
    Ok(out)
}

pub struct SearchAdClient<'a, C> {
    http: &'a C,
    config: &'a ScoutConfig,
    credentials: SearchAdCredentials,
}

impl<'a, C: HttpClient> SearchAdClient<'a, C> {
    pub fn new(http: &'a C, config: &'a ScoutConfig, credentials: SearchAdCredentials) -> Self {
        Self {
            http,
            config,
            credentials,
        }
    }
}

impl<C: HttpClient> VolumeSource for SearchAdClient<'_, C> {
    #[instrument(level = "info", skip_all, fields(keywords = keywords.len()))]
    async fn fetch_chunk(&self, keywords: &[String]) -> ScoutResult<VolumeMap> {
        let clean = unique_strings(keywords.iter().map(|k| normalize_whitespace(k)));
        if clean.is_empty() {
            return Ok(VolumeMap::new());
        }

        let cfg = &self.config.searchad;
        let base = format!("{}{}", cfg.endpoint.trim_end_matches('/'), cfg.uri);
        let joined = clean.join(",");
        let url = Url::parse_with_params(&base, &[("hintKeywords", joined.as_str()), ("showDetail", "1")])
            .map_err(|e| ScoutError::validation(format!("invalid SearchAd endpoint: {e}")))?;

        let body = with_retry(RetryPolicy::from_config(self.config), "SearchAd keywordstool", |_| async {
            let timestamp = chrono::Utc::now().timestamp_millis().to_string();
            let signature = sign(&timestamp, "GET", &cfg.uri, &self.credentials.secret_key)?;
            let headers = [
                ("Content-Type", "application/json; charset=UTF-8"),
                ("X-Timestamp", timestamp.as_str()),
                ("X-API-KEY", self.credentials.api_key.as_str()),
                ("X-Customer", self.credentials.customer_id.as_str()),
                ("X-Signature", signature.as_str()),
            ];
            let resp = self.http.get(url.as_str(), &headers, true).await?;
            if resp.is_success() {
                Ok(resp.body)
            } else {
                Err(ScoutError::http_status("SearchAd keywordstool", resp.status, &resp.body))
            }
        })
        .await?;

        parse_keyword_tool(&body)
    }
}

fn is_invalid_hint_keywords(err: &ScoutError) -> bool {
    INVALID_HINT_KEYWORDS.is_match(&err.to_string())
}

/// Look a keyword up as typed, then with spaces removed.
pub fn pick_volume(map: &VolumeMap, query: &str) -> VolumeRecord {
    let q = normalize_whitespace(query);
    if q.is_empty() {
        return VolumeRecord::default();
    }
    if let Some(r) = map.get(&q) {
        return r.clone();
    }
    let compact = remove_all_spaces(&q);
    map.get(&compact).cloned().unwrap_or_default()
}

fn keyword_candidates(keyword: &str) -> Vec<String> {
    unique_strings([normalize_whitespace(keyword), remove_all_spaces(keyword)])
}

/// Volumes for every query, chunked, with the per-keyword fallback for
/// chunks the provider rejects as malformed. Other errors propagate.
#[instrument(level = "info", skip_all, fields(queries = queries.len()))]
pub async fn fetch_volumes<S: VolumeSource>(
    source: &S,
    queries: &[String],
    chunk_size: usize,
) -> ScoutResult<VolumeMap> {
    let unique = unique_strings(queries.iter().map(|q| normalize_whitespace(q)));
    let mut output = VolumeMap::new();

    for chunk in unique.chunks(chunk_size.max(1)) {
        match source.fetch_chunk(chunk).await {
            Ok(map) => {
                output.extend(map);
                continue;
            }
            Err(e) if is_invalid_hint_keywords(&e) => {
                warn!(chunk = ?chunk, error = %e, "chunk rejected; resolving keywords one by one");
            }
            Err(e) => return Err(e),
        }

        for original in chunk {
            let mut resolved = None;
            for candidate in keyword_candidates(original) {
                match source.fetch_chunk(std::slice::from_ref(&candidate)).await {
                    Ok(map) => {
                        let record = pick_volume(&map, &candidate);
                        let found = record.has_value();
                        resolved = Some(record);
                        if found {
                            break;
                        }
                    }
                    Err(e) if is_invalid_hint_keywords(&e) => {
                        info!(candidate = %candidate, "candidate rejected");
                    }
                    Err(e) => return Err(e),
                }
            }

            let record = resolved.unwrap_or_default();
            let compact = remove_all_spaces(original);
            if !compact.is_empty() && !output.contains_key(&compact) {
                output.insert(compact, record.clone());
            }
            output.insert(original.clone(), record);
        }
    }

    Ok(output)
}
