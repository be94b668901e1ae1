//! Registry tag listing client.
//!
//! Pages `GET {api}/repositories/{repository}/tags` on a Docker Hub style
//! API. Transport errors and 5xx responses are retried with exponential
//! backoff; everything else surfaces as [`SyncError::RegistryError`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use a3s_offline_core::error::{Result, SyncError};
use a3s_offline_core::SyncConfig;

/// One tag entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagEntry {
    pub name: String,
}

/// One page of a tag listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagPage {
    #[serde(default)]
    pub results: Vec<TagEntry>,
    /// URL of the next page, null on the last page
    #[serde(default)]
    pub next: Option<String>,
}

/// Source of paged tag listings.
#[async_trait]
pub trait TagSource: Send + Sync {
    /// Fetch one page (1-based) of tags for a repository.
    async fn fetch_page(&self, repository: &str, page: u32) -> Result<TagPage>;
}

/// HTTP client for the registry tag listing API.
pub struct RegistryClient {
    http: reqwest::Client,
    api_url: String,
    page_size: u32,
    attempts: u32,
    backoff: Duration,
}

impl RegistryClient {
    /// Create a client from the sync configuration.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.registry_request_timeout())
            .user_agent(concat!("a3s-offline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.registry_api_url.trim_end_matches('/').to_string(),
            page_size: config.registry_page_size,
            attempts: config.registry_attempts.max(1),
            backoff: config.registry_backoff(),
        })
    }

    fn page_url(&self, repository: &str, page: u32) -> String {
        format!(
            "{}/repositories/{}/tags?page_size={}&page={}&ordering=last_updated",
            self.api_url, repository, self.page_size, page
        )
    }

    async fn fetch_once(&self, url: &str, repository: &str) -> FetchOutcome {
        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => return FetchOutcome::Retry(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_server_error() {
            return FetchOutcome::Retry(format!("registry returned {}", status));
        }
        if !status.is_success() {
            return FetchOutcome::Fatal(SyncError::RegistryError {
                repository: repository.to_string(),
                message: format!("registry returned {}", status),
            });
        }

        match response.json::<TagPage>().await {
            Ok(page) => FetchOutcome::Done(page),
            Err(e) => FetchOutcome::Fatal(SyncError::RegistryError {
                repository: repository.to_string(),
                message: format!("invalid tag listing: {}", e),
            }),
        }
    }
}

enum FetchOutcome {
    Done(TagPage),
    Retry(String),
    Fatal(SyncError),
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

#[async_trait]
impl TagSource for RegistryClient {
    async fn fetch_page(&self, repository: &str, page: u32) -> Result<TagPage> {
        let url = self.page_url(repository, page);
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            tracing::debug!(repository, page, attempt, "Fetching tag page");

            match self.fetch_once(&url, repository).await {
                FetchOutcome::Done(page) => return Ok(page),
                FetchOutcome::Fatal(e) => return Err(e),
                FetchOutcome::Retry(message) => {
                    if attempt < self.attempts {
                        let delay = backoff_delay(self.backoff, attempt);
                        tracing::warn!(
                            repository,
                            page,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %message,
                            "Registry request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = message;
                }
            }
        }

        Err(SyncError::RegistryError {
            repository: repository.to_string(),
            message: format!("{} (after {} attempts)", last_error, self.attempts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url() {
        let client = RegistryClient::new(&SyncConfig::default()).unwrap();
        assert_eq!(
            client.page_url("library/redis", 3),
            "https://registry.hub.docker.com/v2/repositories/library/redis/tags?page_size=100&page=3&ordering=last_updated"
        );
    }

    #[test]
    fn test_page_url_trims_trailing_slash() {
        let config = SyncConfig {
            registry_api_url: "http://localhost:8080/v2/".to_string(),
            registry_page_size: 10,
            ..Default::default()
        };
        let client = RegistryClient::new(&config).unwrap();
        assert_eq!(
            client.page_url("minio/minio", 1),
            "http://localhost:8080/v2/repositories/minio/minio/tags?page_size=10&page=1&ordering=last_updated"
        );
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(8));
    }

    #[test]
    fn test_tag_page_deserialize() {
        let json = r#"{"count": 2, "next": "https://x/?page=2", "results": [{"name": "7.4.0", "full_size": 1}, {"name": "latest"}]}"#;
        let page: TagPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].name, "7.4.0");
        assert!(page.next.is_some());
    }

    #[test]
    fn test_tag_page_deserialize_last_page() {
        let page: TagPage = serde_json::from_str(r#"{"next": null, "results": []}"#).unwrap();
        assert!(page.results.is_empty());
        assert!(page.next.is_none());

        let page: TagPage = serde_json::from_str("{}").unwrap();
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_registry_exhausts_attempts() {
        let config = SyncConfig {
            registry_api_url: "http://127.0.0.1:1/v2".to_string(),
            registry_attempts: 2,
            registry_backoff_ms: 1,
            registry_request_timeout_secs: 2,
            ..Default::default()
        };
        let client = RegistryClient::new(&config).unwrap();
        let err = client.fetch_page("library/redis", 1).await.unwrap_err();
        match err {
            SyncError::RegistryError { repository, message } => {
                assert_eq!(repository, "library/redis");
                assert!(message.contains("after 2 attempts"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    #[ignore] // requires network access to Docker Hub
    async fn test_fetch_real_page() {
        let client = RegistryClient::new(&SyncConfig::default()).unwrap();
        let page = client.fetch_page("library/redis", 1).await.unwrap();
        assert!(!page.results.is_empty());
    }
}
