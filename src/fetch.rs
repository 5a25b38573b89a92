//! Page fetching for the command line.
//!
//! One request per analysis, awaited, no retry.

use reqwest::redirect::Policy;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::AnalyzerSettings;

/// Errors from fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme '{0}' (only http and https can be analyzed)")]
    UnsupportedScheme(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// A fetched HTML document.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// HTTP client configured from [`AnalyzerSettings`].
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    /// Builds a client with the configured timeout, user agent and redirect limit.
    pub fn new(settings: &AnalyzerSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.request_timeout())
            .redirect(Policy::limited(settings.max_redirects))
            .build()?;

        Ok(Self { client })
    }

    /// Fetches `url`, failing on anything but a successful status.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = validate_url(url)?;
        info!("Fetching {}", parsed);

        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        debug!("{} answered {} (final URL {})", url, status, final_url);

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;
        debug!("Received {} bytes from {}", body.len(), final_url);

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}

/// Parses `url` and checks that it can be fetched.
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/").is_ok());
        assert!(validate_url("http://localhost:8080/page").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com/"),
            Err(FetchError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            validate_url("example.com"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_status_error_message() {
        assert_eq!(FetchError::Status(404).to_string(), "HTTP 404");
    }

    #[test]
    fn test_fetcher_builds_from_defaults() {
        assert!(PageFetcher::new(&AnalyzerSettings::default()).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_rejects_file_scheme_before_request() {
        let fetcher = PageFetcher::new(&AnalyzerSettings::default()).unwrap();
        let err = fetcher.fetch("file:///etc/hosts").await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(_)));
    }
}
