//! Result-page retrieval.

use tracing::{info, instrument};
use url::Url;

use crate::config::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::http::{mobile_headers, HttpClient};
use crate::models::Section;
use crate::retry::{with_retry, RetryPolicy};
use crate::utils::normalize_whitespace;

use super::parser::parse_sections;

/// Fetch the mobile result page for `query`, following redirects.
/// Only a 2xx response with a non-empty body counts as success.
#[instrument(level = "info", skip(http, config))]
pub async fn fetch_serp_html<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    query: &str,
) -> ScoutResult<String> {
    let q = normalize_whitespace(query);
    if q.is_empty() {
        return Err(ScoutError::validation("SERP query is empty."));
    }

    let url = Url::parse_with_params(&config.serp_endpoint, &[("query", q.as_str())])
        .map_err(|e| ScoutError::validation(format!("invalid SERP endpoint: {e}")))?;
    let headers = mobile_headers(config);

    let html = with_retry(RetryPolicy::from_config(config), "Mobile SERP fetch", |_| async {
        let resp = http.get(url.as_str(), &headers, true).await?;
        if resp.is_success() && !resp.body.is_empty() {
            Ok(resp.body)
        } else {
            Err(ScoutError::http_status("Mobile SERP fetch", resp.status, &resp.body))
        }
    })
    .await?;

    info!(bytes = html.len(), "fetched result page");
    Ok(html)
}

/// Fetch and split one query's result page.
pub async fn fetch_sections<C: HttpClient>(
    http: &C,
    config: &ScoutConfig,
    query: &str,
) -> ScoutResult<Vec<Section>> {
    let html = fetch_serp_html(http, config, query).await?;
    let sections = parse_sections(&html);
    info!(query, sections = sections.len(), "parsed result page");
    Ok(sections)
}
