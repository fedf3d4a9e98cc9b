//! Runtime configuration for the browser.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hrrr_common::{BoundingBox, LayerRegistry, TimeConverter, HRRR_CONUS_BBOX};
use reqwest::Url;

use crate::availability::{WarmConfig, HOURS_PER_DAY};
use crate::url_builder::ImageUrlBuilder;

/// Public TiTiler deployment used when nothing else is configured.
pub const DEFAULT_TILE_SERVICE_URL: &str = "https://raster.eoapi.dev";

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Base URL of the tile-rendering service
    pub tile_service_url: String,
    /// Area requested from the tile service and covered by the overlay
    pub bbox: BoundingBox,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Number of most recent hours the warm-up waits for
    pub prefetch_gate: usize,
    /// Upper bound on the warm-up wait
    pub prefetch_timeout: Duration,
    /// Delay before an image handed to the overlay is released
    pub release_delay: Duration,
    /// IANA timezone name; host timezone when unset
    pub timezone: Option<String>,
    pub log_level: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            tile_service_url: DEFAULT_TILE_SERVICE_URL.to_string(),
            bbox: HRRR_CONUS_BBOX,
            request_timeout: Duration::from_secs(30),
            prefetch_gate: 5,
            prefetch_timeout: Duration::from_secs(5),
            release_delay: Duration::from_secs(1),
            timezone: None,
            log_level: "info".to_string(),
        }
    }
}

impl BrowserConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.prefetch_gate == 0 {
            anyhow::bail!("prefetch_gate must be > 0");
        }
        if self.prefetch_gate > HOURS_PER_DAY as usize {
            anyhow::bail!("prefetch_gate must be <= {}", HOURS_PER_DAY);
        }
        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be > 0");
        }

        let url = Url::parse(&self.tile_service_url)
            .with_context(|| format!("Invalid tile service URL: {}", self.tile_service_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("tile service URL must be http or https, got {}", url.scheme());
        }

        if let Some(name) = &self.timezone {
            TimeConverter::from_name(name)?;
        }
        Ok(())
    }

    /// Time converter for the configured timezone.
    pub fn converter(&self) -> Result<TimeConverter> {
        match &self.timezone {
            Some(name) => Ok(TimeConverter::from_name(name)?),
            None => Ok(TimeConverter::local()),
        }
    }

    /// URL builder for the configured service and bounding box.
    pub fn url_builder(&self, layers: Arc<LayerRegistry>) -> ImageUrlBuilder {
        ImageUrlBuilder::new(self.tile_service_url.clone(), layers).with_bbox(self.bbox)
    }

    pub fn warm_config(&self) -> WarmConfig {
        WarmConfig {
            gate_size: self.prefetch_gate,
            gate_timeout: self.prefetch_timeout,
        }
    }
}
