//! Common test utilities for hrrr-browser tests
//!
//! Provides:
//! - `MockSource`: image source with per-URL latency and status
//! - `RecordingSink`: overlay sink that logs every call
//! - Builders for UTC-pinned and zoned configs, converters and a URL builder

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use hrrr_browser::{BrowserConfig, FetchError, ImageSource, ImageUrlBuilder, OverlayImage, OverlaySink};
use hrrr_common::{BrowserError, BrowserResult, LayerRegistry, TimeConverter, UtcSlot};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn slot(y: i32, m: u32, d: u32, hour: u32) -> UtcSlot {
    UtcSlot::new(date(y, m, d), hour).unwrap()
}

/// Config pinned to UTC so local and UTC hours coincide.
pub fn utc_config() -> BrowserConfig {
    BrowserConfig {
        tile_service_url: "http://tiles.test".to_string(),
        timezone: Some("UTC".to_string()),
        ..Default::default()
    }
}

/// Same as [`utc_config`] but in the named IANA zone.
pub fn zoned_config(zone: &str) -> BrowserConfig {
    BrowserConfig {
        timezone: Some(zone.to_string()),
        ..utc_config()
    }
}

pub fn utc() -> TimeConverter {
    TimeConverter::from_name("UTC").unwrap()
}

pub fn zone(name: &str) -> TimeConverter {
    TimeConverter::from_name(name).unwrap()
}

pub fn url_builder() -> ImageUrlBuilder {
    ImageUrlBuilder::new("http://tiles.test", Arc::new(LayerRegistry::builtin().clone()))
}

/// Cycle token as it appears in a request URL, e.g. `t05z`.
pub fn cycle(hour: u32) -> String {
    format!("t{:02}z", hour)
}

/// Date and cycle of one HRRR file as they appear (percent-encoded) in a
/// request URL.
pub fn file(y: i32, m: u32, d: u32, hour: u32) -> String {
    format!("hrrr.{:04}{:02}{:02}%2Fconus%2Fhrrr.t{:02}z", y, m, d, hour)
}

// ============================================================================
// Mock image source
// ============================================================================

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub delay: Duration,
    pub status: u16,
}

impl MockResponse {
    pub fn ok(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            status: 200,
        }
    }

    pub fn status(status: u16, delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            status,
        }
    }
}

/// Responds to URLs by the first route whose pattern the URL contains.
/// The body of a successful response is the URL itself.
pub struct MockSource {
    routes: Mutex<Vec<(String, MockResponse)>>,
    default: MockResponse,
    calls: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::with_default(MockResponse::ok(10))
    }

    pub fn with_default(default: MockResponse) -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn route(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.routes.lock().unwrap().push((pattern.into(), response));
        self
    }

    /// 404 for every listed hour.
    pub fn missing_hours(mut self, hours: &[u32]) -> Self {
        for &hour in hours {
            self = self.route(cycle(hour), MockResponse::status(404, 10));
        }
        self
    }

    /// Replace or add a route after construction.
    pub fn set_route(&self, pattern: impl Into<String>, response: MockResponse) {
        let pattern = pattern.into();
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|(p, _)| *p != pattern);
        routes.insert(0, (pattern, response));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|url| url.contains(pattern)).count()
    }

    fn response_for(&self, url: &str) -> MockResponse {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl ImageSource for MockSource {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let response = self.response_for(url);
        tokio::time::sleep(response.delay).await;

        if response.status == 200 {
            Ok(Bytes::from(url.to_string()))
        } else {
            Err(FetchError::Status {
                status: response.status,
                url: url.to_string(),
            })
        }
    }
}

// ============================================================================
// Recording overlay sink
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Created(UtcSlot),
    Updated(UtcSlot),
    Removed,
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub events: Vec<SinkEvent>,
    pub current: Option<UtcSlot>,
    /// Fail the next create/update call with an overlay error
    pub fail_next: bool,
}

/// Overlay sink whose log stays inspectable after the sink is boxed.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.log.lock().unwrap().events.clone()
    }

    pub fn current(&self) -> Option<UtcSlot> {
        self.log.lock().unwrap().current
    }

    pub fn fail_next(&self) {
        self.log.lock().unwrap().fail_next = true;
    }

    /// Slots that reached the overlay, in order.
    pub fn applied(&self) -> Vec<UtcSlot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Created(slot) | SinkEvent::Updated(slot) => Some(slot),
                SinkEvent::Removed => None,
            })
            .collect()
    }

    fn apply(&self, image: &OverlayImage, event: SinkEvent) -> BrowserResult<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_next {
            log.fail_next = false;
            return Err(BrowserError::Overlay("image rejected".to_string()));
        }
        log.current = Some(image.slot);
        log.events.push(event);
        Ok(())
    }
}

#[async_trait]
impl OverlaySink for RecordingSink {
    async fn has_overlay(&self) -> bool {
        self.log.lock().unwrap().current.is_some()
    }

    async fn create_overlay(&mut self, image: &OverlayImage) -> BrowserResult<()> {
        self.apply(image, SinkEvent::Created(image.slot))
    }

    async fn update_overlay(&mut self, image: &OverlayImage) -> BrowserResult<()> {
        self.apply(image, SinkEvent::Updated(image.slot))
    }

    async fn remove_overlay(&mut self) {
        let mut log = self.log.lock().unwrap();
        if log.current.take().is_some() {
            log.events.push(SinkEvent::Removed);
        }
    }
}
