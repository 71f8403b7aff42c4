use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::config::UpstreamConfig;

/// Failure of a single outbound query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),

    #[error("network error: {0}")]
    Network(String),
}

impl UpstreamError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::HttpStatus(_) => "http_status",
            Self::Network(_) => "network",
        }
    }
}

/// Issues one search against the health-topics API and returns the raw XML body.
///
/// `query` is the literal search text; implementations take care of encoding it.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<String, UpstreamError>;
}

#[derive(Clone)]
pub struct MedlinePlusClient {
    client: Client,
    base_url: String,
    database: String,
    timeout: Duration,
}

impl MedlinePlusClient {
    /// Creates a client from the `[upstream]` configuration section.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            database: config.database.clone(),
            timeout,
        })
    }

    #[must_use]
    pub fn build_url(&self, query: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}db={}&term={}",
            self.base_url,
            separator,
            urlencoding::encode(&self.database),
            urlencoding::encode(query)
        )
    }

    fn classify(&self, err: &reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else if let Some(status) = err.status() {
            UpstreamError::HttpStatus(status.as_u16())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }

    async fn send(&self, url: &str) -> Result<String, UpstreamError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::HttpStatus(status.as_u16()));
        }

        response.text().await.map_err(|e| self.classify(&e))
    }
}

#[async_trait]
impl UpstreamClient for MedlinePlusClient {
    async fn fetch(&self, query: &str) -> Result<String, UpstreamError> {
        let url = self.build_url(query);
        debug!(url = %url, "Querying MedlinePlus");

        let start = Instant::now();
        let result = self.send(&url).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::counter!("upstream_requests_total", "outcome" => outcome).increment(1);
        metrics::histogram!("upstream_request_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        result
    }
}
