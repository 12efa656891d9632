//! Environment-driven configuration.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::apply::QuantizationRequest;
use crate::error::{QuantizationError, Result};
use crate::format::ElementFormat;
use crate::policy::PolicyStore;
use crate::selector::LayerSelector;

pub const ENV_ENABLED: &str = "FAKEQUANT_ENABLED";
pub const ENV_TYPE: &str = "FAKEQUANT_TYPE";
pub const ENV_LAYER: &str = "FAKEQUANT_LAYER";
pub const ENV_COVERAGE: &str = "FAKEQUANT_COVERAGE";
pub const ENV_COMPARE: &str = "FAKEQUANT_COMPARE";

/// Fake quantization settings as an operator supplies them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeQuantConfig {
    pub enabled: bool,
    pub target_format: ElementFormat,
    pub target_layer: LayerSelector,
    pub coverage: f32,
    pub compare_mode: bool,
}

impl Default for FakeQuantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_format: ElementFormat::TruncatedHalf16,
            target_layer: LayerSelector::all(),
            coverage: 1.0,
            compare_mode: false,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_coverage(value: &str) -> Result<f32> {
    match value.trim().parse::<f32>() {
        Ok(c) if !c.is_nan() => Ok(c),
        _ => Err(QuantizationError::InvalidCoverage(value.to_string())),
    }
}

impl FakeQuantConfig {
    /// Read `FAKEQUANT_*` variables, failing on the first malformed value.
    pub fn try_from_env() -> Result<Self> {
        Self::try_from_lookup(|key| env::var(key).ok())
    }

    /// Read `FAKEQUANT_*` variables; malformed values are logged and left at
    /// their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// [`try_from_env`](Self::try_from_env) over an arbitrary variable source.
    pub fn try_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_ENABLED) {
            config.enabled = parse_flag(&v);
        }
        if let Some(v) = lookup(ENV_TYPE) {
            config.target_format = v.parse()?;
        }
        if let Some(v) = lookup(ENV_LAYER) {
            config.target_layer = v.parse()?;
        }
        if let Some(v) = lookup(ENV_COVERAGE) {
            config.coverage = parse_coverage(&v)?;
        }
        if let Some(v) = lookup(ENV_COMPARE) {
            config.compare_mode = parse_flag(&v);
        }
        Ok(config)
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_ENABLED) {
            config.enabled = parse_flag(&v);
        }
        if let Some(v) = lookup(ENV_TYPE) {
            match v.parse() {
                Ok(format) => config.target_format = format,
                Err(err) => warn!(var = ENV_TYPE, "{err}, using {}", config.target_format),
            }
        }
        if let Some(v) = lookup(ENV_LAYER) {
            match v.parse() {
                Ok(layer) => config.target_layer = layer,
                Err(err) => warn!(var = ENV_LAYER, "{err}, using all layers"),
            }
        }
        if let Some(v) = lookup(ENV_COVERAGE) {
            match parse_coverage(&v) {
                Ok(coverage) => config.coverage = coverage,
                Err(err) => warn!(var = ENV_COVERAGE, "{err}, using {}", config.coverage),
            }
        }
        if let Some(v) = lookup(ENV_COMPARE) {
            config.compare_mode = parse_flag(&v);
        }
        config
    }

    /// Per-call request for [`apply`](crate::apply::apply).
    pub fn to_request(&self) -> QuantizationRequest {
        QuantizationRequest {
            enabled: self.enabled,
            target_format: self.target_format,
            coverage: self.coverage,
            compare_mode: self.compare_mode,
        }
    }

    /// Push the enabled/format/layer triple into `store`.
    pub fn install(&self, store: &PolicyStore) {
        store.set(self.enabled, self.target_format, self.target_layer.target_layer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = FakeQuantConfig::try_from_lookup(vars(&[])).unwrap();
        assert_eq!(config, FakeQuantConfig::default());
        assert!(!config.enabled);
        assert_eq!(config.target_format, ElementFormat::TruncatedHalf16);
    }

    #[test]
    fn reads_every_variable() {
        let config = FakeQuantConfig::try_from_lookup(vars(&[
            (ENV_ENABLED, "true"),
            (ENV_TYPE, "f16"),
            (ENV_LAYER, "5"),
            (ENV_COVERAGE, "0.25"),
            (ENV_COMPARE, "1"),
        ]))
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.target_format, ElementFormat::Half16);
        assert_eq!(config.target_layer, LayerSelector::only(5));
        assert_eq!(config.coverage, 0.25);
        assert!(config.compare_mode);
    }

    #[test]
    fn strict_parsing_rejects_bad_values() {
        assert!(matches!(
            FakeQuantConfig::try_from_lookup(vars(&[(ENV_TYPE, "int2")])),
            Err(QuantizationError::InvalidFormatName(_))
        ));
        assert!(matches!(
            FakeQuantConfig::try_from_lookup(vars(&[(ENV_LAYER, "x")])),
            Err(QuantizationError::InvalidLayer(_))
        ));
        assert!(matches!(
            FakeQuantConfig::try_from_lookup(vars(&[(ENV_COVERAGE, "NaN")])),
            Err(QuantizationError::InvalidCoverage(_))
        ));
    }

    #[test]
    fn lenient_parsing_keeps_defaults() {
        let config = FakeQuantConfig::from_lookup(vars(&[
            (ENV_ENABLED, "1"),
            (ENV_TYPE, "int2"),
            (ENV_LAYER, "x"),
            (ENV_COVERAGE, "lots"),
        ]));
        assert!(config.enabled);
        assert_eq!(config.target_format, ElementFormat::TruncatedHalf16);
        assert_eq!(config.target_layer, LayerSelector::all());
        assert_eq!(config.coverage, 1.0);
    }

    #[test]
    fn non_true_flags_are_false() {
        let config = FakeQuantConfig::from_lookup(vars(&[(ENV_ENABLED, "yes")]));
        assert!(!config.enabled);
    }

    #[test]
    fn request_and_install_carry_the_settings() {
        let config = FakeQuantConfig {
            enabled: true,
            target_format: ElementFormat::Half16,
            target_layer: LayerSelector::only(2),
            coverage: 0.5,
            compare_mode: true,
        };
        let request = config.to_request();
        assert!(request.enabled && request.compare_mode);
        assert_eq!(request.coverage, 0.5);

        let store = PolicyStore::new();
        config.install(&store);
        assert!(store.applies_to("blk.2.ffn_norm"));
        assert!(!store.applies_to("blk.3.ffn_norm"));
    }

    #[test]
    fn serde_round_trip() {
        let config = FakeQuantConfig { enabled: true, ..FakeQuantConfig::default() };
        let json = serde_json::to_string(&config).unwrap();
        let back: FakeQuantConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        let partial: FakeQuantConfig = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert_eq!(partial.coverage, 1.0);
    }
}
