//! HTTP transport seam.
//!
//! [`HttpClient`] performs exactly one request and never interprets the
//! status code; callers turn non-2xx responses into [`ScoutError::Http`]
//! inside their retried closures. [`ReqwestClient`] is the production
//! implementation.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::config::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};

/// A fully buffered response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// `Location` header, present on redirects.
    pub location: Option<String>,
    pub body: String,
}

impl HttpResponse {
    #[cfg(test)]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            location: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// One HTTP exchange.
pub trait HttpClient {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        follow_redirects: bool,
    ) -> ScoutResult<HttpResponse>;

    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> ScoutResult<HttpResponse>;
}

/// Browser-like headers used for result pages and blog posts.
pub fn mobile_headers(config: &ScoutConfig) -> [(&str, &str); 3] {
    [
        ("User-Agent", config.mobile_user_agent.as_str()),
        ("Accept-Language", config.accept_language.as_str()),
        ("Cache-Control", "no-cache"),
    ]
}

#[derive(Debug, Clone)]
pub struct ReqwestClient {
    follow: reqwest::Client,
    no_follow: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> ScoutResult<Self> {
        let follow = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(10))
            .build()?;
        let no_follow = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self { follow, no_follow })
    }
}

fn header_map(headers: &[(&str, &str)]) -> ScoutResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ScoutError::validation(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ScoutError::validation(format!("invalid header value for {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn buffer(resp: reqwest::Response) -> ScoutResult<HttpResponse> {
    let status = resp.status().as_u16();
    let location = resp
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await?;
    Ok(HttpResponse {
        status,
        location,
        body,
    })
}

impl HttpClient for ReqwestClient {
    #[instrument(level = "debug", skip_all, fields(url = %url, follow = follow_redirects))]
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        follow_redirects: bool,
    ) -> ScoutResult<HttpResponse> {
        let t0 = Instant::now();
        let client = if follow_redirects {
            &self.follow
        } else {
            &self.no_follow
        };
        let resp = client.get(url).headers(header_map(headers)?).send().await?;
        let out = buffer(resp).await?;
        debug!(
            status = out.status,
            bytes = out.body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "GET complete"
        );
        Ok(out)
    }

    #[instrument(level = "debug", skip_all)]
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> ScoutResult<HttpResponse> {
        let t0 = Instant::now();
        let resp = self
            .follow
            .post(url)
            .headers(header_map(headers)?)
            .json(body)
            .send()
            .await?;
        let out = buffer(resp).await?;
        debug!(
            status = out.status,
            bytes = out.body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "POST complete"
        );
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;

    #[test]
    fn test_header_map_rejects_bad_values() {
        assert!(header_map(&[("X-Ok", "yes")]).is_ok());
        assert!(header_map(&[("X-Bad", "line\nbreak")]).is_err());
    }

    #[tokio::test]
    async fn test_fake_routes_in_order() {
        let http = FakeHttp::new().route_seq(
            "example.com",
            vec![status(503, ""), HttpResponse::ok("body")],
        );
        let first = http.get("https://example.com/a", &[], true).await.unwrap();
        let second = http.get("https://example.com/a", &[], true).await.unwrap();
        let third = http.get("https://example.com/a", &[], true).await.unwrap();
        assert_eq!(first.status, 503);
        assert!(second.is_success());
        assert_eq!(third.body, "body");
        assert_eq!(http.request_count(), 3);

        let missing = http.get("https://other.test/", &[], true).await.unwrap();
        assert_eq!(missing.status, 404);
    }

    #[test]
    fn test_response_classes() {
        assert!(redirect("https://x").is_redirect());
        assert!(!status(500, "").is_success());
    }
}
