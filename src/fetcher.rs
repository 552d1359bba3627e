use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};

const USER_AGENT: &str = concat!("calendar_catalog/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BASE_BACKOFF_MS: u64 = 2000;
const MAX_BACKOFF_MS: u64 = 60_000;

/// Source of calendar pages. Paths are relative to the calendar domain.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_html(&self, path: &str) -> Result<String>;
    async fn fetch_json(&self, path: &str) -> Result<Value>;
}

/// reqwest-backed fetcher. Any non-success status is an error.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(base_url: &str, retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| CatalogError::Request {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
        })
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn get_with_retry(&self, path: &str) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            match self.get_once(path).await {
                Ok(res) => return Ok(res),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let delay = backoff(attempt);
                    warn!(
                        "[request] {} failed (attempt {}/{}), backing off {:.1}s: {}",
                        path,
                        attempt + 1,
                        self.retries,
                        delay.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| CatalogError::Request {
                url: url.clone(),
                source,
            })?;

        let status = res.status();
        if !status.is_success() {
            warn!(
                "[request] request to {} failed with error code {}",
                path,
                status.as_u16()
            );
            return Err(CatalogError::Fetch {
                url,
                status: status.as_u16(),
            });
        }
        debug!("[request] {} request complete", path);
        Ok(res)
    }
}

/// Doubling delay from `BASE_BACKOFF_MS`, capped at `MAX_BACKOFF_MS`.
fn backoff(attempt: u32) -> Duration {
    let ms = BASE_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch_html(&self, path: &str) -> Result<String> {
        let res = self.get_with_retry(path).await?;
        res.text().await.map_err(|source| CatalogError::Request {
            url: self.url(path),
            source,
        })
    }

    async fn fetch_json(&self, path: &str) -> Result<Value> {
        let body = self.fetch_html(path).await?;
        serde_json::from_str(&body).map_err(|e| CatalogError::Decode {
            url: self.url(path),
            message: e.to_string(),
        })
    }
}
