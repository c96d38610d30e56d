//! Altitude policy and the style rules it is derived from.

use serde::{Deserialize, Serialize};

use crate::{errors::AltitudeError, expression::NumericExpression, feature::Feature};

/// How a feature's Z values relate to the terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampingMode {
    /// Z is used as-is; no terrain is consulted.
    #[default]
    None,
    /// Z is an absolute height. Geometry is left alone; only height above
    /// terrain is measured.
    Absolute,
    /// Z is a height above the terrain and gets rewritten to an absolute height.
    #[serde(rename = "relative", alias = "relative_to_terrain")]
    RelativeToTerrain,
    /// Z is replaced by the terrain height (draping).
    #[serde(rename = "terrain", alias = "to_terrain")]
    ToTerrain,
}

impl ClampingMode {
    /// Whether resolving in this mode yields per-vertex heights above terrain.
    /// Draped geometry sits on the terrain, so there is nothing to measure.
    pub fn collects_hats(self) -> bool {
        matches!(
            self,
            ClampingMode::Absolute | ClampingMode::RelativeToTerrain
        )
    }
}

/// The altitude part of a style rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AltitudeSymbol {
    #[serde(default)]
    pub clamping: ClampingMode,
    /// Finest terrain resolution to sample, in map units. 0.0 samples the best
    /// available data.
    #[serde(default)]
    pub clamping_resolution: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_scale: Option<NumericExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_offset: Option<NumericExpression>,
}

/// A styling rule. Only the altitude symbol is of interest here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<AltitudeSymbol>,
}

impl Style {
    pub fn from_json(json: &str) -> Result<Self, AltitudeError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// What to do when a vertex cannot be moved between spatial references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformFailure {
    /// Treat the vertex like one with no terrain sample: its Z is left as it
    /// was and it contributes no statistics.
    #[default]
    SkipVertex,
    /// Stop resolving and report the failure. Features already visited keep
    /// their resolved values; the failing feature is left as it came in.
    Abort,
}

/// Resolved altitude settings, shared by every feature a resolver processes.
#[derive(Debug, Clone, PartialEq)]
pub struct AltitudePolicy {
    pub mode: ClampingMode,
    pub vertical_scale: NumericExpression,
    pub vertical_offset: NumericExpression,
    pub max_resolution: f64,
    pub on_transform_failure: TransformFailure,
}

impl Default for AltitudePolicy {
    fn default() -> Self {
        Self {
            mode: ClampingMode::None,
            vertical_scale: NumericExpression::constant(1.0),
            vertical_offset: NumericExpression::constant(0.0),
            max_resolution: 0.0,
            on_transform_failure: TransformFailure::SkipVertex,
        }
    }
}

impl AltitudePolicy {
    pub fn new(mode: ClampingMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Derives a policy from a style. A style without an altitude symbol
    /// yields the unclamped default.
    pub fn from_style(style: &Style) -> Self {
        style
            .altitude
            .as_ref()
            .map(Self::from_symbol)
            .unwrap_or_default()
    }

    pub fn from_symbol(symbol: &AltitudeSymbol) -> Self {
        let defaults = Self::default();
        Self {
            mode: symbol.clamping,
            vertical_scale: symbol
                .vertical_scale
                .clone()
                .unwrap_or(defaults.vertical_scale),
            vertical_offset: symbol
                .vertical_offset
                .clone()
                .unwrap_or(defaults.vertical_offset),
            max_resolution: symbol.clamping_resolution,
            on_transform_failure: defaults.on_transform_failure,
        }
    }

    pub fn with_vertical_scale(mut self, scale: NumericExpression) -> Self {
        self.vertical_scale = scale;
        self
    }

    pub fn with_vertical_offset(mut self, offset: NumericExpression) -> Self {
        self.vertical_offset = offset;
        self
    }

    pub fn with_max_resolution(mut self, resolution: f64) -> Self {
        self.max_resolution = resolution;
        self
    }

    pub fn with_transform_failure(mut self, on_failure: TransformFailure) -> Self {
        self.on_transform_failure = on_failure;
        self
    }

    /// Vertical scale and offset evaluated for one feature.
    pub fn scale_and_offset(&self, feature: &Feature) -> (f64, f64) {
        (
            feature.eval(&self.vertical_scale),
            feature.eval(&self.vertical_offset),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_without_altitude_is_unclamped() {
        let policy = AltitudePolicy::from_style(&Style::default());
        assert_eq!(policy.mode, ClampingMode::None);
        assert_eq!(policy.max_resolution, 0.0);
        assert_eq!(policy.vertical_scale.as_constant(), Some(1.0));
        assert_eq!(policy.vertical_offset.as_constant(), Some(0.0));
    }

    #[test]
    fn test_style_from_json() {
        let style = Style::from_json(
            r#"{
                "name": "buildings",
                "altitude": {
                    "clamping": "relative",
                    "clamping-resolution": 0.001,
                    "vertical-scale": "[floors] * 3",
                    "vertical-offset": 2
                }
            }"#,
        )
        .unwrap();

        let policy = AltitudePolicy::from_style(&style);
        assert_eq!(policy.mode, ClampingMode::RelativeToTerrain);
        assert_eq!(policy.max_resolution, 0.001);

        let feature = Feature::empty().with_attribute("floors", 4_i64);
        assert_eq!(policy.scale_and_offset(&feature), (12.0, 2.0));
    }

    #[test]
    fn test_clamping_keywords() {
        let parse = |s: &str| serde_json::from_str::<ClampingMode>(s).unwrap();
        assert_eq!(parse("\"none\""), ClampingMode::None);
        assert_eq!(parse("\"absolute\""), ClampingMode::Absolute);
        assert_eq!(parse("\"relative\""), ClampingMode::RelativeToTerrain);
        assert_eq!(parse("\"relative_to_terrain\""), ClampingMode::RelativeToTerrain);
        assert_eq!(parse("\"terrain\""), ClampingMode::ToTerrain);
        assert_eq!(parse("\"to_terrain\""), ClampingMode::ToTerrain);
    }

    #[test]
    fn test_invalid_expression_rejects_style() {
        let result = Style::from_json(r#"{"altitude": {"vertical-scale": "[floors"}}"#);
        assert!(matches!(result, Err(AltitudeError::Style(_))));
    }

    #[test]
    fn test_only_measuring_modes_collect_hats() {
        assert!(ClampingMode::Absolute.collects_hats());
        assert!(ClampingMode::RelativeToTerrain.collects_hats());
        assert!(!ClampingMode::ToTerrain.collects_hats());
        assert!(!ClampingMode::None.collects_hats());
    }
}
