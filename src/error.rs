//! Error taxonomy shared by every network-facing component.
//!
//! Failures fall into four groups:
//! - **Transient** network problems (timeouts, connection resets, HTTP 429/5xx)
//!   which [`crate::retry::with_retry`] retries with exponential backoff.
//! - **Validation** problems (empty query, missing secret, unknown product)
//!   which are surfaced immediately.
//! - **Quota exhaustion** from the text-generation provider, which is never
//!   retried and disables generation for the remainder of the run.
//! - **Parse misses**, which are not errors at all: extractors return
//!   `None`/empty collections instead.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::utils::{normalize_whitespace, truncate_text};

/// Longest body excerpt embedded in an HTTP error message.
const HTTP_SNIPPET_CHARS: usize = 240;

/// Longest error text persisted to the workbook.
pub const USER_ERROR_CHARS: usize = 2000;

static RETRYABLE_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)timed out|timeout|temporarily|connection|429|5\d\d|rate limit")
        .expect("static regex")
});

#[derive(Debug, Error)]
pub enum ScoutError {
    /// Non-2xx response from a remote service.
    #[error("{message}")]
    Http {
        message: String,
        status: u16,
        /// Explicit retry decision; `None` means "infer from status".
        retryable: Option<bool>,
    },

    /// The request never produced a response.
    #[error("{message}")]
    Transport {
        message: String,
        retryable: Option<bool>,
    },

    #[error("{0}")]
    Validation(String),

    /// A response arrived but could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Text generation was switched off earlier in this run.
    #[error("text generation disabled for this run: {0}")]
    Disabled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ScoutResult<T> = Result<T, ScoutError>;

impl ScoutError {
    /// Build an HTTP failure the way every caller reports it:
    /// `"<scope> failed (<status>): <body snippet>"`.
    pub fn http(scope: &str, status: u16, body: &str, retryable: Option<bool>) -> Self {
        let snippet = truncate_text(&normalize_whitespace(body), HTTP_SNIPPET_CHARS);
        let message = if snippet.is_empty() {
            format!("{scope} failed ({status})")
        } else {
            format!("{scope} failed ({status}): {snippet}")
        };
        ScoutError::Http {
            message,
            status,
            retryable,
        }
    }

    /// Convenience constructor for HTTP failures with the standard
    /// "429 or 5xx is transient" rule applied explicitly.
    pub fn http_status(scope: &str, status: u16, body: &str) -> Self {
        let retryable = status == 429 || status >= 500;
        Self::http(scope, status, body, Some(retryable))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ScoutError::Validation(message.into())
    }

    #[cfg(test)]
    pub fn status(&self) -> Option<u16> {
        match self {
            ScoutError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// An explicit flag wins; otherwise HTTP status 429 or 5xx is retryable,
    /// and finally the message is matched against known transient patterns.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoutError::Http {
                retryable: Some(flag),
                ..
            }
            | ScoutError::Transport {
                retryable: Some(flag),
                ..
            } => *flag,
            ScoutError::Http { status, message, .. } => {
                *status == 429 || (500..600).contains(status) || RETRYABLE_MESSAGE.is_match(message)
            }
            ScoutError::Transport { message, .. } => RETRYABLE_MESSAGE.is_match(message),
            ScoutError::Validation(_)
            | ScoutError::Decode(_)
            | ScoutError::Disabled(_)
            | ScoutError::Io(_) => false,
        }
    }

    /// Bounded message suitable for a workbook cell.
    pub fn user_message(&self) -> String {
        safe_error_message(&self.to_string())
    }
}

impl From<reqwest::Error> for ScoutError {
    fn from(e: reqwest::Error) -> Self {
        let retryable = if e.is_timeout() || e.is_connect() {
            Some(true)
        } else {
            None
        };
        ScoutError::Transport {
            message: e.to_string(),
            retryable,
        }
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(e: serde_json::Error) -> Self {
        ScoutError::Decode(e.to_string())
    }
}

/// Truncate any error text to the length persisted for end users.
pub fn safe_error_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return "Unknown error".to_string();
    }
    truncate_text(trimmed, USER_ERROR_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_flag_overrides_status() {
        let e = ScoutError::http("Gemini generateContent", 429, "quota", Some(false));
        assert!(!e.is_retryable());
        assert_eq!(e.status(), Some(429));
    }

    #[test]
    fn status_inferred_when_flag_missing() {
        assert!(ScoutError::http("x", 503, "", None).is_retryable());
        assert!(ScoutError::http("x", 429, "", None).is_retryable());
        assert!(!ScoutError::http("x", 404, "", None).is_retryable());
    }

    #[test]
    fn transport_message_patterns() {
        let e = ScoutError::Transport {
            message: "operation timed out".into(),
            retryable: None,
        };
        assert!(e.is_retryable());

        let e = ScoutError::Transport {
            message: "invalid certificate".into(),
            retryable: None,
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn http_message_carries_snippet() {
        let e = ScoutError::http("SearchAd keywordstool", 400, "  {\"code\": 11001,\n \"title\": \"bad\"} ", None);
        assert_eq!(
            e.to_string(),
            "SearchAd keywordstool failed (400): {\"code\": 11001, \"title\": \"bad\"}"
        );
        let bare = ScoutError::http("SERP", 500, "", None);
        assert_eq!(bare.to_string(), "SERP failed (500)");
    }

    #[test]
    fn validation_is_never_retryable() {
        assert!(!ScoutError::validation("empty query").is_retryable());
        assert!(!ScoutError::Disabled("quota".into()).is_retryable());
    }

    #[test]
    fn user_message_is_bounded() {
        let e = ScoutError::validation("x".repeat(5000));
        assert_eq!(e.user_message().chars().count(), USER_ERROR_CHARS + 3);
        assert_eq!(safe_error_message("   "), "Unknown error");
    }
}
