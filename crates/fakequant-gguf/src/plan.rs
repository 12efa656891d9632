//! Which tensors of a model file to rewrite.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use fakequant_core::naming::BlockConvention;
use fakequant_core::selector::extract_layer_with;
use fakequant_core::QuantizationError;
use serde::{Deserialize, Serialize};

/// Component selected when no pattern is given.
pub const DEFAULT_PATTERN: &str = "ffn_norm.weight";

/// Layer indices a plan covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerSet {
    #[default]
    All,
    Only(BTreeSet<u32>),
}

impl LayerSet {
    pub fn contains(&self, layer: u32) -> bool {
        match self {
            Self::All => true,
            Self::Only(layers) => layers.contains(&layer),
        }
    }
}

impl fmt::Display for LayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(layers) => {
                let joined: Vec<String> = layers.iter().map(u32::to_string).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

impl FromStr for LayerSet {
    type Err = QuantizationError;

    /// `"all"` or a comma-separated list such as `"0,1,2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        let layers = trimmed
            .split(',')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|_| QuantizationError::InvalidLayer(s.to_string()))?;
        Ok(Self::Only(layers))
    }
}

/// Component pattern plus layer set, over `blk.<index>.<component>` names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorPlan {
    pub pattern: String,
    pub layers: LayerSet,
}

impl Default for TensorPlan {
    fn default() -> Self {
        Self { pattern: DEFAULT_PATTERN.to_string(), layers: LayerSet::All }
    }
}

impl TensorPlan {
    pub fn new(pattern: impl Into<String>, layers: LayerSet) -> Self {
        Self { pattern: pattern.into(), layers }
    }

    /// Whether the tensor called `name` is in the plan. Names that do not
    /// carry a layer index are never selected.
    pub fn selects(&self, name: &str) -> bool {
        extract_layer_with(&BlockConvention, name, &self.pattern)
            .is_some_and(|layer| self.layers.contains(layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_layer_sets() {
        assert_eq!("all".parse::<LayerSet>().unwrap(), LayerSet::All);
        assert_eq!("0".parse::<LayerSet>().unwrap(), LayerSet::Only(BTreeSet::from([0])));
        assert_eq!(
            " 2, 0,1 ".parse::<LayerSet>().unwrap(),
            LayerSet::Only(BTreeSet::from([0, 1, 2]))
        );
        assert!(matches!("1,x".parse::<LayerSet>(), Err(QuantizationError::InvalidLayer(_))));
        assert!("".parse::<LayerSet>().is_err());
        assert!("-1".parse::<LayerSet>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let set: LayerSet = "3,1".parse().unwrap();
        assert_eq!(set.to_string(), "1,3");
        assert_eq!(LayerSet::All.to_string(), "all");
    }

    #[test]
    fn default_plan_selects_every_ffn_norm_weight() {
        let plan = TensorPlan::default();
        assert!(plan.selects("blk.0.ffn_norm.weight"));
        assert!(plan.selects("blk.31.ffn_norm.weight"));
        assert!(!plan.selects("blk.0.attn_norm.weight"));
        assert!(!plan.selects("blk.0.ffn_norm.bias"));
        assert!(!plan.selects("output_norm.weight"));
    }

    #[test]
    fn layer_list_restricts_selection() {
        let plan = TensorPlan::new(DEFAULT_PATTERN, "0,2".parse().unwrap());
        assert!(plan.selects("blk.0.ffn_norm.weight"));
        assert!(!plan.selects("blk.1.ffn_norm.weight"));
        assert!(plan.selects("blk.2.ffn_norm.weight"));
    }

    #[test]
    fn custom_pattern() {
        let plan = TensorPlan::new("attn_norm.weight", LayerSet::All);
        assert!(plan.selects("blk.4.attn_norm.weight"));
        assert!(!plan.selects("blk.4.ffn_norm.weight"));
    }
}
