//! HTTP client for article pages
//!
//! Every request is bounded by a timeout so a slow publisher never stalls
//! a reassessment.

use std::time::Duration;

use reqwest::{Client, Url};
use rumor_core::RumorError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Article fetch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum characters of extracted text kept per article
    pub max_chars: usize,
    /// Maximum redirects followed
    pub max_redirects: usize,
    /// Response bytes read before the rest of the page is dropped
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_chars: 8000,
            max_redirects: 5,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Errors from article fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Publisher returned status {0}")]
    Status(u16),

    #[error("No readable content at {0}")]
    EmptyContent(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<FetchError> for RumorError {
    fn from(err: FetchError) -> Self {
        RumorError::ContentFetch(err.to_string())
    }
}

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Create an HTTP client for article pages. The user agent is set per request.
pub fn create_article_client(config: &FetchConfig) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(|e| FetchError::ClientBuild(e.to_string()))
}

/// Accept only absolute http(s) links
pub fn parse_article_url(link: &str) -> Result<Url, FetchError> {
    let url = Url::parse(link.trim()).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", link, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl(format!(
            "unsupported scheme {:?} in {}",
            other, link
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.max_chars, 8000);
        assert_eq!(config.max_body_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_random_user_agent() {
        let ua = random_user_agent();
        assert!(ua.contains("Mozilla"));
    }

    #[test]
    fn test_parse_article_url() {
        assert!(parse_article_url("https://www.estadiodeportivo.com/betis/fekir").is_ok());
        assert!(parse_article_url("  http://example.com/a ").is_ok());
        assert!(parse_article_url("ftp://example.com/a").is_err());
        assert!(parse_article_url("not a url").is_err());
    }

    #[test]
    fn test_fetch_error_maps_to_content_fetch() {
        let err: RumorError = FetchError::Status(404).into();
        assert!(matches!(err, RumorError::ContentFetch(_)));
    }
}
