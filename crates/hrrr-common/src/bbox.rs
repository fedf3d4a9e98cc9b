//! Geographic bounding box of the HRRR image overlay.

use serde::{Deserialize, Serialize};

/// Coverage of the HRRR CONUS domain as rendered by the tile service.
pub const HRRR_CONUS_BBOX: BoundingBox = BoundingBox {
    min_lon: -134.12,
    min_lat: 21.12,
    max_lon: -60.9,
    max_lat: 52.62,
};

/// A geographic bounding box in degrees (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Parse a "minlon,minlat,maxlon,maxlat" string.
    pub fn parse(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        if bbox.min_lon >= bbox.max_lon || bbox.min_lat >= bbox.max_lat {
            return Err(BboxParseError::Inverted(s.to_string()));
        }
        Ok(bbox)
    }

    /// Path segment used by the tile service: "minlon,minlat,maxlon,maxlat".
    pub fn to_path_segment(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }

    /// Corner coordinates for an image overlay as `[lon, lat]` pairs,
    /// clockwise from the upper left: UL, UR, LR, LL.
    pub fn corner_coordinates(&self) -> [[f64; 2]; 4] {
        [
            [self.min_lon, self.max_lat],
            [self.max_lon, self.max_lat],
            [self.max_lon, self.min_lat],
            [self.min_lon, self.min_lat],
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bounding box format: {0}. Expected 'minlon,minlat,maxlon,maxlat'")]
    InvalidFormat(String),

    #[error("Invalid number in bounding box: {0}")]
    InvalidNumber(String),

    #[error("Bounding box has min >= max: {0}")]
    Inverted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conus_path_segment() {
        assert_eq!(
            HRRR_CONUS_BBOX.to_path_segment(),
            "-134.12,21.12,-60.9,52.62"
        );
    }

    #[test]
    fn test_corner_order() {
        let corners = HRRR_CONUS_BBOX.corner_coordinates();
        assert_eq!(corners[0], [-134.12, 52.62]);
        assert_eq!(corners[1], [-60.9, 52.62]);
        assert_eq!(corners[2], [-60.9, 21.12]);
        assert_eq!(corners[3], [-134.12, 21.12]);
    }

    #[test]
    fn test_parse_roundtrips_segment() {
        let bbox = BoundingBox::parse(&HRRR_CONUS_BBOX.to_path_segment()).unwrap();
        assert_eq!(bbox, HRRR_CONUS_BBOX);
    }
}
