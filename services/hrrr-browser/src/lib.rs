//! HRRR imagery browser.
//!
//! Coordinates the pieces between a user's (date, hour, layer) selection and
//! the image shown on the map:
//! - `url_builder`: TiTiler request URLs for an HRRR file and color ramp
//! - `availability`: which UTC hours of the selected day have data
//! - `display`: last-request-wins image fetching into an overlay
//! - `url_state`: shareable query-string state and navigation history
//! - `app`: the application state object that wires UI events to all of the above

pub mod app;
pub mod availability;
pub mod config;
pub mod display;
pub mod fetch;
pub mod overlay;
pub mod url_builder;
pub mod url_state;

pub use app::{BrowserApp, Status, UiEvent};
pub use availability::{AvailabilityCache, CacheScope, WarmConfig, WarmReport};
pub use config::BrowserConfig;
pub use display::{DisplayController, DisplayOutcome, DisplayTicket};
pub use fetch::{FetchError, HttpImageSource, ImageSource};
pub use overlay::{FileOverlay, OverlayImage, OverlaySink};
pub use url_builder::ImageUrlBuilder;
pub use url_state::{History, NavigationHistory, QueryState, Selection, UrlStateSync};
