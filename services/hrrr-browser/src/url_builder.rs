//! TiTiler request URLs for HRRR analysis files.

use std::sync::Arc;

use chrono::NaiveDate;
use hrrr_common::time::format_hour;
use hrrr_common::{BoundingBox, Layer, LayerRegistry, UtcSlot, HRRR_CONUS_BBOX};
use tracing::warn;

/// Public NOAA bucket holding HRRR GRIB2 output.
pub const HRRR_BUCKET_URL: &str = "https://noaa-hrrr-bdp-pds.s3.amazonaws.com";

/// Builds `/external/bbox/{bbox}.png` requests that crop and colorize one
/// band of an HRRR surface file.
#[derive(Debug, Clone)]
pub struct ImageUrlBuilder {
    base_url: String,
    bbox: BoundingBox,
    layers: Arc<LayerRegistry>,
}

impl ImageUrlBuilder {
    pub fn new(base_url: impl Into<String>, layers: Arc<LayerRegistry>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            bbox: HRRR_CONUS_BBOX,
            layers,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    /// Build the image URL for a UTC date, hour and layer key.
    ///
    /// Returns None when the date or hour is missing or the hour is past 23.
    /// Unknown layer keys fall back to the default layer.
    pub fn build(
        &self,
        utc_date: Option<NaiveDate>,
        utc_hour: Option<u32>,
        layer_key: &str,
    ) -> Option<String> {
        let (Some(date), Some(hour)) = (utc_date, utc_hour) else {
            warn!("Date or hour is missing, cannot build URL");
            return None;
        };
        if hour > 23 {
            warn!(hour = hour, "Hour out of range, cannot build URL");
            return None;
        }

        let layer = self.layers.resolve(layer_key);
        let colormap = match layer.colormap_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(layer = %layer.id, error = %e, "Failed to encode colormap");
                return None;
            }
        };

        let locator = source_locator(date, hour, layer);
        Some(format!(
            "{}/external/bbox/{}.png?url={}&colormap={}&dst_crs=epsg:3857",
            self.base_url,
            self.bbox.to_path_segment(),
            urlencoding::encode(&locator),
            urlencoding::encode(&colormap),
        ))
    }

    pub fn for_slot(&self, slot: &UtcSlot, layer_key: &str) -> Option<String> {
        self.build(Some(slot.date), Some(slot.hour), layer_key)
    }
}

/// GDAL VRT locator selecting one band of the remote GRIB2 file.
pub fn source_locator(date: NaiveDate, hour: u32, layer: &Layer) -> String {
    format!(
        "vrt://{}/hrrr.{}/conus/hrrr.{}.wrfsfcf00.grib2?bands={}",
        HRRR_BUCKET_URL,
        date.format("%Y%m%d"),
        format_hour(hour),
        layer.band
    )
}
