//! Legend derived from a layer's color ramp.

use serde::Serialize;

use crate::layer::Layer;

/// Everything a front-end needs to draw the legend bar for a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendConfig {
    pub title: String,
    pub units: String,
    pub min_label: String,
    pub max_label: String,
    pub stops: Vec<GradientStop>,
}

/// A color at a relative position (0-100) along the legend bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradientStop {
    pub percent: f64,
    pub color: [u8; 4],
}

impl GradientStop {
    /// CSS `rgba()` form with alpha scaled to 0-1.
    pub fn css_color(&self) -> String {
        let [r, g, b, a] = self.color;
        format!("rgba({}, {}, {}, {})", r, g, b, f64::from(a) / 255.0)
    }
}

impl LegendConfig {
    /// Build the legend for a layer. Returns None for a layer without breakpoints.
    pub fn for_layer(layer: &Layer) -> Option<Self> {
        let min = layer.min_value()?;
        let max = layer.max_value()?;

        let (title, units) = match layer.id.as_str() {
            "REFLECTIVITY" => ("Composite Reflectivity".to_string(), "(dBZ)".to_string()),
            "MASSDEN" => ("Smoke Mass Density".to_string(), "(μg/m³)".to_string()),
            _ => (layer.name.clone(), String::new()),
        };

        let last = layer.colormap.len().saturating_sub(1).max(1) as f64;
        let stops = layer
            .colormap
            .iter()
            .enumerate()
            .map(|(i, b)| GradientStop {
                percent: i as f64 / last * 100.0,
                color: b.color,
            })
            .collect();

        Some(Self {
            title,
            units,
            min_label: format_value(min, layer.id.as_str()),
            max_label: format_value(max, layer.id.as_str()),
            stops,
        })
    }

    /// CSS `linear-gradient(to right, ...)` for the legend bar.
    pub fn css_gradient(&self) -> String {
        let stops: Vec<String> = self
            .stops
            .iter()
            .map(|s| format!("{} {}%", s.css_color(), s.percent))
            .collect();
        format!("linear-gradient(to right, {})", stops.join(", "))
    }
}

/// Smoke density is stored in kg/m³ and labelled in μg/m³.
fn format_value(value: f64, layer_key: &str) -> String {
    if layer_key == "MASSDEN" {
        let scaled = value * 1e9;
        if value >= 1e-6 {
            format!("{:.0}", scaled)
        } else {
            format!("{:.1}", scaled)
        }
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{ColorBreak, LayerId, LayerRegistry};

    #[test]
    fn test_reflectivity_legend() {
        let layer = LayerRegistry::builtin().get("REFLECTIVITY").unwrap();
        let legend = LegendConfig::for_layer(layer).unwrap();

        assert_eq!(legend.title, "Composite Reflectivity");
        assert_eq!(legend.units, "(dBZ)");
        assert_eq!(legend.min_label, "5");
        assert_eq!(legend.max_label, "75");
        assert_eq!(legend.stops.len(), 14);
        assert_eq!(legend.stops[0].percent, 0.0);
        assert_eq!(legend.stops[13].percent, 100.0);
    }

    #[test]
    fn test_smoke_legend_scales_to_micrograms() {
        let layer = LayerRegistry::builtin().get("MASSDEN").unwrap();
        let legend = LegendConfig::for_layer(layer).unwrap();

        assert_eq!(legend.units, "(μg/m³)");
        assert_eq!(legend.min_label, "0.0");
        assert_eq!(legend.max_label, "1000");
        assert!(legend
            .css_gradient()
            .starts_with("linear-gradient(to right, rgba(255, 255, 255, 0) 0%"));
    }

    #[test]
    fn test_unknown_layer_uses_name_and_no_units() {
        let layer = Layer {
            id: LayerId::new("TMP"),
            name: "Temperature".to_string(),
            band: 71,
            colormap: vec![ColorBreak::new(-40.0, 50.0, [0, 0, 255, 255])],
        };
        let legend = LegendConfig::for_layer(&layer).unwrap();
        assert_eq!(legend.title, "Temperature");
        assert!(legend.units.is_empty());
        assert_eq!(legend.stops[0].percent, 0.0);
    }
}
