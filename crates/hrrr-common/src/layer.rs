//! Layer definitions and color ramps for HRRR products.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Key of the layer used when none (or an unknown one) is requested.
pub const DEFAULT_LAYER: &str = "REFLECTIVITY";

/// Unique identifier for a layer, e.g. "REFLECTIVITY".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One breakpoint of a color ramp: values in `[min, max)` render as `color`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorBreak {
    pub min: f64,
    pub max: f64,
    /// RGBA, alpha 0-255
    pub color: [u8; 4],
}

impl ColorBreak {
    pub const fn new(min: f64, max: f64, color: [u8; 4]) -> Self {
        Self { min, max, color }
    }
}

/// A selectable HRRR data product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    /// Human-readable name shown in the layer picker
    pub name: String,
    /// GRIB2 band index in the wrfsfcf00 file
    pub band: u32,
    /// Ordered breakpoints, ascending by value
    pub colormap: Vec<ColorBreak>,
}

impl Layer {
    /// Serialize the color ramp the way the tile service expects it:
    /// `[[[min, max], [r, g, b, a]], ...]`.
    pub fn colormap_json(&self) -> Result<String, serde_json::Error> {
        let ramp: Vec<([f64; 2], [u8; 4])> = self
            .colormap
            .iter()
            .map(|b| ([b.min, b.max], b.color))
            .collect();
        serde_json::to_string(&ramp)
    }

    /// Lower bound of the first breakpoint.
    pub fn min_value(&self) -> Option<f64> {
        self.colormap.first().map(|b| b.min)
    }

    /// Upper bound of the last breakpoint.
    pub fn max_value(&self) -> Option<f64> {
        self.colormap.last().map(|b| b.max)
    }

    /// Check that breakpoints are non-empty, well-formed and ascending.
    pub fn validate(&self) -> Result<(), String> {
        if self.colormap.is_empty() {
            return Err(format!("{}: colormap is empty", self.id));
        }
        for (i, b) in self.colormap.iter().enumerate() {
            if b.min >= b.max {
                return Err(format!("{}: breakpoint {} has min >= max", self.id, i));
            }
            if i > 0 && b.min < self.colormap[i - 1].max {
                return Err(format!("{}: breakpoint {} overlaps previous", self.id, i));
            }
        }
        Ok(())
    }
}

/// The fixed set of layers the browser offers.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
    default_key: String,
}

static BUILTIN: Lazy<LayerRegistry> = Lazy::new(|| LayerRegistry {
    layers: vec![reflectivity(), smoke_mass_density()],
    default_key: DEFAULT_LAYER.to_string(),
});

impl LayerRegistry {
    /// The built-in REFLECTIVITY and MASSDEN layers.
    pub fn builtin() -> &'static LayerRegistry {
        &BUILTIN
    }

    pub fn get(&self, key: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id.0 == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn default_layer(&self) -> &Layer {
        // the registry is never empty
        self.get(&self.default_key).unwrap_or(&self.layers[0])
    }

    /// Look up a layer, falling back to the default for unknown keys.
    pub fn resolve(&self, key: &str) -> &Layer {
        match self.get(key) {
            Some(layer) => layer,
            None => {
                let fallback = self.default_layer();
                warn!(layer = %key, fallback = %fallback.id, "Layer not found, using default");
                fallback
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }
}

fn reflectivity() -> Layer {
    Layer {
        id: LayerId::new("REFLECTIVITY"),
        name: "Composite Reflectivity".to_string(),
        band: 1,
        colormap: vec![
            // light blue, weak returns
            ColorBreak::new(5.0, 10.0, [0, 236, 236, 255]),
            ColorBreak::new(10.0, 15.0, [1, 160, 246, 255]),
            ColorBreak::new(15.0, 20.0, [0, 0, 246, 255]),
            // greens
            ColorBreak::new(20.0, 25.0, [0, 255, 0, 255]),
            ColorBreak::new(25.0, 30.0, [0, 200, 0, 255]),
            ColorBreak::new(30.0, 35.0, [0, 144, 0, 255]),
            // yellows
            ColorBreak::new(35.0, 40.0, [255, 255, 0, 255]),
            ColorBreak::new(40.0, 45.0, [231, 192, 0, 255]),
            // orange to red
            ColorBreak::new(45.0, 50.0, [255, 144, 0, 255]),
            ColorBreak::new(50.0, 55.0, [255, 0, 0, 255]),
            ColorBreak::new(55.0, 60.0, [214, 0, 0, 255]),
            ColorBreak::new(60.0, 65.0, [192, 0, 0, 255]),
            // purples, extreme
            ColorBreak::new(65.0, 70.0, [255, 0, 255, 255]),
            ColorBreak::new(70.0, 75.0, [153, 85, 201, 255]),
        ],
    }
}

fn smoke_mass_density() -> Layer {
    Layer {
        id: LayerId::new("MASSDEN"),
        name: "Smoke (Mass Density)".to_string(),
        band: 76,
        colormap: vec![
            ColorBreak::new(0.0, 1e-9, [255, 255, 255, 0]),
            ColorBreak::new(1e-9, 2e-9, [177, 211, 225, 255]),
            ColorBreak::new(2e-9, 4e-9, [137, 188, 211, 255]),
            ColorBreak::new(4e-9, 6e-9, [94, 153, 193, 255]),
            ColorBreak::new(6e-9, 8e-9, [66, 131, 165, 255]),
            ColorBreak::new(8e-9, 12e-9, [72, 148, 102, 255]),
            ColorBreak::new(12e-9, 16e-9, [102, 172, 61, 255]),
            ColorBreak::new(16e-9, 20e-9, [183, 195, 79, 255]),
            ColorBreak::new(20e-9, 25e-9, [223, 182, 72, 255]),
            ColorBreak::new(25e-9, 30e-9, [221, 123, 49, 255]),
            ColorBreak::new(30e-9, 40e-9, [213, 74, 40, 255]),
            ColorBreak::new(40e-9, 60e-9, [192, 42, 33, 255]),
            ColorBreak::new(60e-9, 100e-9, [171, 23, 30, 255]),
            ColorBreak::new(100e-9, 200e-9, [140, 19, 24, 255]),
            ColorBreak::new(200e-9, 1000e-9, [127, 31, 172, 255]),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_layers_validate() {
        for layer in LayerRegistry::builtin().iter() {
            layer.validate().unwrap();
        }
    }

    #[test]
    fn test_resolve_unknown_falls_back_to_default() {
        let registry = LayerRegistry::builtin();
        assert_eq!(registry.resolve("NOPE").id.as_str(), DEFAULT_LAYER);
        assert_eq!(registry.resolve("MASSDEN").band, 76);
    }

    #[test]
    fn test_colormap_json_shape() {
        let layer = LayerRegistry::builtin().get("REFLECTIVITY").unwrap();
        let json = layer.colormap_json().unwrap();
        assert!(json.starts_with("[[[5.0,10.0],[0,236,236,255]]"));

        let parsed: Vec<([f64; 2], [u8; 4])> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 14);
        assert_eq!(parsed[13], ([70.0, 75.0], [153, 85, 201, 255]));
    }
}
