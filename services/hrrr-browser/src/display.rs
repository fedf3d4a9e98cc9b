//! Foreground image display with last-request-wins cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hrrr_common::{BoundingBox, BrowserError, LayerId, UtcSlot};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::availability::AvailabilityCache;
use crate::fetch::{FetchError, ImageSource};
use crate::overlay::{OverlayImage, OverlaySink};
use crate::url_builder::ImageUrlBuilder;

/// What happened to one display request.
#[derive(Debug)]
pub enum DisplayOutcome {
    /// Overlay created for the first time (or re-created after an error)
    Created { slot: UtcSlot, bytes: usize },
    /// Existing overlay updated in place
    Updated { slot: UtcSlot, bytes: usize },
    /// A newer request started before this one finished
    Superseded,
    /// No URL could be built for the request
    Skipped,
    Failed(BrowserError),
}

impl DisplayOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DisplayOutcome::Created { .. } | DisplayOutcome::Updated { .. })
    }
}

/// A claimed position in the display request sequence.
#[derive(Debug)]
pub struct DisplayTicket {
    id: u64,
    token: CancellationToken,
}

impl DisplayTicket {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Live image handles, released a fixed delay after being handed to the overlay.
#[derive(Clone, Default)]
struct ImageHandles {
    live: Arc<Mutex<HashMap<u64, Bytes>>>,
    next_id: Arc<AtomicU64>,
}

impl ImageHandles {
    async fn register(&self, bytes: Bytes) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.lock().await.insert(id, bytes);
        id
    }

    fn release_after(&self, id: u64, delay: Duration) {
        let live = self.live.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if live.lock().await.remove(&id).is_some() {
                debug!(handle = id, "Released image handle");
            }
        });
    }

    async fn count(&self) -> usize {
        self.live.lock().await.len()
    }
}

/// Fetches images for (slot, layer) requests and swaps them into the overlay.
///
/// At most one request is in flight: starting a new one cancels the previous,
/// and only the most recent request's image is ever applied.
pub struct DisplayController {
    source: Arc<dyn ImageSource>,
    builder: Arc<ImageUrlBuilder>,
    cache: Arc<AvailabilityCache>,
    overlay: Mutex<Box<dyn OverlaySink>>,
    bbox: BoundingBox,
    /// Request id and cancellation token of the live request
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
    sequence: AtomicU64,
    initialized: AtomicBool,
    handles: ImageHandles,
    release_delay: Duration,
}

impl DisplayController {
    pub fn new(
        source: Arc<dyn ImageSource>,
        builder: Arc<ImageUrlBuilder>,
        cache: Arc<AvailabilityCache>,
        overlay: Box<dyn OverlaySink>,
        release_delay: Duration,
    ) -> Self {
        let bbox = builder.bbox();
        Self {
            source,
            builder,
            cache,
            overlay: Mutex::new(overlay),
            bbox,
            in_flight: Mutex::new(None),
            sequence: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            handles: ImageHandles::default(),
            release_delay,
        }
    }

    /// Fetch and show the image for `slot`, cancelling any earlier request.
    pub async fn display(&self, slot: UtcSlot, layer: &LayerId) -> DisplayOutcome {
        let ticket = self.begin().await;
        self.run(ticket, slot, layer).await
    }

    /// Claim the next request slot and cancel whatever is in flight.
    ///
    /// Callers that spawn the fetch should take the ticket first, so request
    /// order follows call order rather than task scheduling.
    pub async fn begin(&self) -> DisplayTicket {
        let token = CancellationToken::new();
        // id is assigned under the lock so installs happen in id order
        let mut in_flight = self.in_flight.lock().await;
        let id = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((previous_id, previous)) = in_flight.replace((id, token.clone())) {
            debug!(request = previous_id, "Aborting in-flight display request");
            previous.cancel();
        }
        DisplayTicket { id, token }
    }

    /// Fetch and apply the image for a ticket obtained from [`begin`](Self::begin).
    pub async fn run(&self, ticket: DisplayTicket, slot: UtcSlot, layer: &LayerId) -> DisplayOutcome {
        let DisplayTicket {
            id: request_id,
            token,
        } = ticket;

        let Some(url) = self.builder.for_slot(&slot, layer.as_str()) else {
            error!(slot = %slot, "Could not generate image URL");
            self.finish(request_id).await;
            return DisplayOutcome::Skipped;
        };

        if !self.cache.contains_slot(layer, &slot).await {
            debug!(slot = %slot, "Hour not in availability cache");
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(FetchError::Cancelled),
            r = self.source.fetch(&url) => r,
        };

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(FetchError::Cancelled) => {
                debug!(slot = %slot, "Display request superseded");
                return DisplayOutcome::Superseded;
            }
            Err(_) if !self.is_current(request_id, &token) => {
                debug!(slot = %slot, "Ignoring failure of superseded request");
                return DisplayOutcome::Superseded;
            }
            Err(e) => {
                error!(slot = %slot, error = %e, "Error loading image");
                self.finish(request_id).await;
                return DisplayOutcome::Failed(e.into());
            }
        };

        let outcome = {
            let mut overlay = self.overlay.lock().await;
            if !self.is_current(request_id, &token) {
                debug!(slot = %slot, "Dropping image of superseded request");
                return DisplayOutcome::Superseded;
            }

            let size = bytes.len();
            let handle = self.handles.register(bytes.clone()).await;
            let image = OverlayImage {
                handle,
                bytes,
                coordinates: self.bbox.corner_coordinates(),
                slot,
                layer: layer.clone(),
            };

            let outcome = if self.initialized.load(Ordering::SeqCst) && overlay.has_overlay().await {
                overlay
                    .update_overlay(&image)
                    .await
                    .map(|_| DisplayOutcome::Updated { slot, bytes: size })
            } else {
                info!(slot = %slot, layer = %layer, "Initializing image overlay");
                overlay.remove_overlay().await;
                overlay
                    .create_overlay(&image)
                    .await
                    .map(|_| DisplayOutcome::Created { slot, bytes: size })
            };
            self.handles.release_after(handle, self.release_delay);

            match outcome {
                Ok(outcome) => {
                    self.initialized.store(true, Ordering::SeqCst);
                    outcome
                }
                Err(e) => {
                    error!(slot = %slot, error = %e, "Overlay rejected image");
                    self.initialized.store(false, Ordering::SeqCst);
                    DisplayOutcome::Failed(e)
                }
            }
        };

        if outcome.is_applied() {
            self.cache.mark_slot(layer, slot).await;
        }
        self.finish(request_id).await;
        outcome
    }

    /// Abort the in-flight request, if any, without starting a new one.
    pub async fn cancel(&self) {
        let mut in_flight = self.in_flight.lock().await;
        self.sequence.fetch_add(1, Ordering::SeqCst);
        if let Some((id, token)) = in_flight.take() {
            debug!(request = id, "Cancelled display request");
            token.cancel();
        }
    }

    /// Cancel any pending request and remove the overlay ahead of a date or
    /// layer change.
    pub async fn reset(&self) {
        self.cancel().await;
        self.overlay.lock().await.remove_overlay().await;
        self.initialized.store(false, Ordering::SeqCst);
    }

    /// React to an error reported by the map for the overlay source: the next
    /// display re-creates the overlay instead of updating it.
    pub fn handle_overlay_error(&self, message: &str) {
        warn!(error = %message, "Overlay source error; will re-create on next display");
        self.initialized.store(false, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Image handles not yet released.
    pub async fn live_handles(&self) -> usize {
        self.handles.count().await
    }

    fn is_current(&self, request_id: u64, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.sequence.load(Ordering::SeqCst) == request_id
    }

    async fn finish(&self, request_id: u64) {
        let mut in_flight = self.in_flight.lock().await;
        if matches!(in_flight.as_ref(), Some((id, _)) if *id == request_id) {
            *in_flight = None;
        }
    }
}
