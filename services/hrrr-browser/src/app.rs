//! Application state object.
//!
//! `BrowserApp` owns everything between the user's controls and the overlay.
//! Events are handled one at a time; the image fetch for each display is
//! spawned so the next event can supersede it before it lands. Call
//! [`BrowserApp::settle`] to wait for the latest display to finish.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use hrrr_common::{BrowserError, BrowserResult, LayerRegistry, LegendConfig, TimeConverter, UtcSlot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::availability::{nearest_hour, AvailabilityCache, CacheScope, WarmReport};
use crate::config::BrowserConfig;
use crate::display::{DisplayController, DisplayOutcome};
use crate::fetch::ImageSource;
use crate::overlay::OverlaySink;
use crate::url_builder::ImageUrlBuilder;
use crate::url_state::{History, QueryState, Selection, UrlStateSync};

const PREFETCH_MESSAGE: &str = "Pre-fetching images...";
const LOADING_MESSAGE: &str = "Loading...";

/// Something the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    DateChanged(NaiveDate),
    HourChanged(u32),
    LayerChanged(String),
    Refresh,
    /// Back/forward landed on a stored query string
    Navigate(String),
    /// The map reported an error for the overlay source
    OverlayError(String),
}

/// Loading indicator / error banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading(String),
    Error(String),
}

pub struct BrowserApp {
    layers: Arc<LayerRegistry>,
    converter: TimeConverter,
    builder: Arc<ImageUrlBuilder>,
    source: Arc<dyn ImageSource>,
    cache: Arc<AvailabilityCache>,
    display: Arc<DisplayController>,
    url_sync: UrlStateSync,
    history: Box<dyn History>,
    selection: Selection,
    status: Status,
    legend: Option<LegendConfig>,
    last_warm: Option<WarmReport>,
    pending: Option<JoinHandle<DisplayOutcome>>,
}

impl BrowserApp {
    pub fn new(
        config: &BrowserConfig,
        source: Arc<dyn ImageSource>,
        overlay: Box<dyn OverlaySink>,
        history: Box<dyn History>,
    ) -> Result<Self> {
        config.validate()?;
        let converter = config.converter()?;
        let layers = Arc::new(LayerRegistry::builtin().clone());
        let builder = Arc::new(config.url_builder(layers.clone()));
        let cache = Arc::new(AvailabilityCache::new(config.warm_config()));
        let display = Arc::new(DisplayController::new(
            source.clone(),
            builder.clone(),
            cache.clone(),
            overlay,
            config.release_delay,
        ));

        let selection = default_selection(&converter, &layers);
        let legend = LegendConfig::for_layer(layers.resolve(selection.layer.as_str()));

        Ok(Self {
            layers,
            converter,
            builder,
            source,
            cache,
            display,
            url_sync: UrlStateSync::new(),
            history,
            selection,
            status: Status::Idle,
            legend,
            last_warm: None,
            pending: None,
        })
    }

    /// Initialize from the query string the page was opened with.
    ///
    /// Without an explicit hour the selection jumps to the most recent hour
    /// the warm-up found.
    pub async fn start(&mut self, initial_query: &str) {
        let query = QueryState::parse(initial_query, &self.layers);
        self.selection = query.resolve(&default_selection(&self.converter, &self.layers));
        self.refresh_legend();
        info!(
            date = %self.selection.date,
            hour = self.selection.hour,
            layer = %self.selection.layer,
            "Initializing browser"
        );

        self.warm().await;
        if query.hour.is_none() {
            if let Some(hour) = self.available_hours().await.last().copied() {
                info!(hour = hour, "Jumping to most recent available hour");
                self.selection.hour = hour;
            }
        }

        self.url_sync.write(&mut *self.history, &self.selection);
        self.show().await;
    }

    pub async fn handle(&mut self, event: UiEvent) {
        match event {
            UiEvent::DateChanged(date) => {
                info!(date = %date, "Date changed");
                self.selection.date = date;
                self.change_scope().await;
                self.push_url();
            }
            UiEvent::LayerChanged(key) => {
                let layer = self.layers.resolve(&key).id.clone();
                info!(layer = %layer, "Layer changed");
                self.selection.layer = layer;
                self.refresh_legend();
                self.change_scope().await;
                self.push_url();
            }
            UiEvent::HourChanged(hour) => {
                if hour > 23 {
                    warn!(hour = hour, "Ignoring out-of-range hour");
                    return;
                }
                self.selection.hour = hour;
                self.show().await;
                self.push_url();
            }
            UiEvent::Refresh => {
                self.warm().await;
                self.show().await;
            }
            UiEvent::Navigate(query) => {
                let next = QueryState::parse(&query, &self.layers)
                    .resolve(&default_selection(&self.converter, &self.layers));
                info!(query = %query, "Navigated to history entry");
                self.selection = next;
                self.refresh_legend();

                if Some(self.scope()) != self.cache.scope().await {
                    self.display.reset().await;
                    self.warm().await;
                }
                self.show().await;
            }
            UiEvent::OverlayError(message) => {
                self.display.handle_overlay_error(&message);
            }
        }
    }

    /// Step back in history and redisplay. Returns false at the oldest entry.
    pub async fn go_back(&mut self) -> bool {
        match self.history.back() {
            Some(query) => {
                self.handle(UiEvent::Navigate(query)).await;
                true
            }
            None => false,
        }
    }

    /// Step forward in history and redisplay. Returns false at the newest entry.
    pub async fn go_forward(&mut self) -> bool {
        match self.history.forward() {
            Some(query) => {
                self.handle(UiEvent::Navigate(query)).await;
                true
            }
            None => false,
        }
    }

    /// Wait for the latest display request and update the status from it.
    pub async fn settle(&mut self) -> Option<DisplayOutcome> {
        let handle = self.pending.take()?;
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Display task failed");
                DisplayOutcome::Failed(BrowserError::Internal(e.to_string()))
            }
        };

        self.status = match &outcome {
            DisplayOutcome::Failed(e) => Status::Error(e.user_message().to_string()),
            _ => Status::Idle,
        };
        Some(outcome)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn legend(&self) -> Option<&LegendConfig> {
        self.legend.as_ref()
    }

    pub fn history(&self) -> &dyn History {
        &*self.history
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    pub fn display(&self) -> &DisplayController {
        &self.display
    }

    pub fn converter(&self) -> &TimeConverter {
        &self.converter
    }

    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    pub fn last_warm(&self) -> Option<&WarmReport> {
        self.last_warm.as_ref()
    }

    /// UTC file slot for the current selection.
    pub fn current_slot(&self) -> BrowserResult<UtcSlot> {
        Ok(self
            .converter
            .local_to_utc(self.selection.date, self.selection.hour)?)
    }

    /// Image URL for the current selection.
    pub fn image_url(&self) -> Option<String> {
        let slot = self.current_slot().ok()?;
        self.builder.for_slot(&slot, self.selection.layer.as_str())
    }

    /// Local hours of the selected date known to have data, ascending.
    pub async fn available_hours(&self) -> Vec<u32> {
        if self.cache.scope().await != Some(self.scope()) {
            return Vec::new();
        }
        self.cache.hours().await
    }

    fn scope(&self) -> CacheScope {
        CacheScope::new(self.selection.date, self.selection.layer.clone())
    }

    fn refresh_legend(&mut self) {
        self.legend = LegendConfig::for_layer(self.layers.resolve(self.selection.layer.as_str()));
    }

    /// Date or layer changed: drop the overlay, re-warm and snap the hour to
    /// the nearest one with data.
    async fn change_scope(&mut self) {
        self.display.reset().await;
        self.warm().await;

        let available = self.available_hours().await;
        if !available.is_empty() && !available.contains(&self.selection.hour) {
            if let Some(hour) = nearest_hour(available, self.selection.hour) {
                info!(
                    requested = self.selection.hour,
                    hour = hour,
                    "Snapping to nearest available hour"
                );
                self.selection.hour = hour;
            }
        }
        self.show().await;
    }

    async fn warm(&mut self) {
        let scope = self.scope();
        self.status = Status::Loading(PREFETCH_MESSAGE.to_string());
        let report = self
            .cache
            .warm(self.source.clone(), &self.builder, &self.converter, scope)
            .await;
        self.status = Status::Idle;
        self.last_warm = Some(report);
    }

    async fn show(&mut self) {
        let slot = match self.current_slot() {
            Ok(slot) => slot,
            Err(e) => {
                warn!(error = %e, "Cannot display selection");
                self.status = Status::Error(e.user_message().to_string());
                return;
            }
        };
        let layer = self.selection.layer.clone();

        let cached = self.cache.contains(&self.scope(), self.selection.hour).await;
        self.status = if cached {
            Status::Idle
        } else {
            Status::Loading(LOADING_MESSAGE.to_string())
        };

        // a replaced handle detaches; its ticket is already cancelled
        let ticket = self.display.begin().await;
        let display = self.display.clone();
        self.pending = Some(tokio::spawn(async move {
            display.run(ticket, slot, &layer).await
        }));
    }

    fn push_url(&mut self) {
        self.url_sync.write(&mut *self.history, &self.selection);
    }
}

fn default_selection(converter: &TimeConverter, layers: &LayerRegistry) -> Selection {
    Selection::new(converter.today(), 0, layers.default_layer().id.clone())
}
