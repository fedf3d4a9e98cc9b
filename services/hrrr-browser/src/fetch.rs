//! Image fetching from the tile service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use hrrr_common::BrowserError;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from a single image request.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request failed: {0}")]
    Network(String),

    #[error("request cancelled")]
    Cancelled,
}

impl From<FetchError> for BrowserError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Status { status, url } => BrowserError::UpstreamStatus { status, url },
            FetchError::Network(msg) => BrowserError::Network(msg),
            FetchError::Cancelled => BrowserError::Cancelled,
        }
    }
}

/// Something that can GET a rendered image by URL.
///
/// Dropping the returned future must abandon the request; the display
/// controller relies on that to cancel superseded fetches.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// `reqwest`-backed image source. HTTP caching is left to the client and
/// any intermediaries.
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(24)
            .user_agent(concat!("hrrr-browser/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        debug!(bytes = bytes.len(), "Fetched image");
        Ok(bytes)
    }
}
