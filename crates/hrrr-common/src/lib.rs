//! Common types and utilities shared by the HRRR browser crates.

pub mod bbox;
pub mod error;
pub mod layer;
pub mod legend;
pub mod time;

pub use bbox::{BoundingBox, HRRR_CONUS_BBOX};
pub use error::{BrowserError, BrowserResult};
pub use layer::{ColorBreak, Layer, LayerId, LayerRegistry, DEFAULT_LAYER};
pub use legend::LegendConfig;
pub use time::{TimeConverter, TimeParseError, UtcSlot};
