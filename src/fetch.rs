//! FAA airport status API client
//!
//! Fetches the current status of an airport from the FAA airport status
//! service and decodes the JSON reply into a [`StatusRecord`]. The reply is not
//! inspected beyond checking that it is a JSON object.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::record::StatusRecord;

/// Base URL for the FAA airport status service
const FAA_BASE_URL: &str = "http://services.faa.gov";

/// Errors that can occur when fetching airport status
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed (connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {0}")]
    Status(StatusCode),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Response was valid JSON but not an object
    #[error("Response body is not a JSON object")]
    NotAnObject,
}

impl FetchError {
    /// Whether another attempt might succeed
    fn is_transient(&self) -> bool {
        match self {
            FetchError::RequestFailed(_) => true,
            FetchError::Status(status) => status.is_server_error(),
            FetchError::ParseError(_) | FetchError::NotAnObject => false,
        }
    }
}

/// Source of airport status records
///
/// The resolver only depends on this trait, so tests can supply canned
/// records or failures without any network.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetches the current status for `code`
    async fn fetch(&self, code: &str) -> Result<StatusRecord, FetchError>;
}

/// Settings for [`FaaClient`]
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Scheme and host of the status service, without trailing slash
    pub base_url: String,
    /// Deadline for a single HTTP attempt
    pub timeout: Duration,
    /// Extra attempts after the first one fails with a transient error
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub initial_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: FAA_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

impl FetchConfig {
    /// Points the client at a different service root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}

/// Client for the FAA airport status service
#[derive(Debug, Clone)]
pub struct FaaClient {
    client: Client,
    config: FetchConfig,
}

impl FaaClient {
    /// Create a new FaaClient with the given settings
    ///
    /// # Returns
    /// * `Ok(FaaClient)` - Client with the per-attempt timeout applied
    /// * `Err(FetchError)` - If the HTTP client cannot be built
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Create a new FaaClient with a custom HTTP client
    ///
    /// The client's own timeout settings apply; `config.timeout` is ignored.
    pub fn with_client(client: Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    /// URL of the status document for `code`
    pub fn status_url(&self, code: &str) -> String {
        format!("{}/airport/status/{}?format=JSON", self.config.base_url, code)
    }

    /// Performs one request and decodes the body
    async fn fetch_once(&self, url: &str) -> Result<StatusRecord, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/JSON")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let text = response.text().await?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        StatusRecord::from_value(value).ok_or(FetchError::NotAnObject)
    }
}

#[async_trait]
impl StatusSource for FaaClient {
    /// Fetch the status for `code`, retrying transient failures
    ///
    /// Transport errors and 5xx responses are retried up to `max_retries`
    /// times with exponential backoff. Other failures return at once.
    #[instrument(skip(self))]
    async fn fetch(&self, code: &str) -> Result<StatusRecord, FetchError> {
        let url = self.status_url(code);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(&url).await {
                Ok(record) => {
                    debug!(code, attempt, attributes = record.len(), "Fetched airport status");
                    return Ok(record);
                }
                Err(e) if e.is_transient() && attempt <= self.config.max_retries => {
                    warn!(code, attempt, error = %e, "Upstream fetch failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
