//! Tensor naming conventions.
//!
//! A convention turns a tensor name into a `(block_index, component)` pair.
//! Selection logic only sees the parsed pair, so a model family with a
//! different naming scheme needs a new [`NamingConvention`], not new
//! selection code.
//!
//! Grammars (`DIGITS` is one or more ASCII digits that fit in `u32`,
//! `COMPONENT` is non-empty):
//!
//! | convention              | grammar                              | example           |
//! |-------------------------|--------------------------------------|-------------------|
//! | [`BlockConvention`]     | `"blk" "." DIGITS "." COMPONENT`     | `blk.21.ffn_norm` |
//! | [`GraphNodeConvention`] | `COMPONENT "-" DIGITS`               | `ffn_norm-21`     |

use std::fmt;

/// A tensor name split into its layer index and component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorName<'a> {
    pub block_index: u32,
    pub component: &'a str,
}

/// Parses tensor names into [`TensorName`]s.
pub trait NamingConvention: fmt::Debug + Send + Sync {
    /// Parse `name`; `None` if it does not follow the convention.
    fn parse<'a>(&self, name: &'a str) -> Option<TensorName<'a>>;
}

/// Parse a run of ASCII digits into a `u32`. Rejects signs and empty input.
fn parse_index(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// GGUF weight naming: `blk.<index>.<component>`.
///
/// The component is everything after the index and may contain dots, so
/// `blk.3.ffn_norm.weight` parses to `(3, "ffn_norm.weight")`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockConvention;

impl BlockConvention {
    pub const PREFIX: &'static str = "blk.";
}

impl NamingConvention for BlockConvention {
    fn parse<'a>(&self, name: &'a str) -> Option<TensorName<'a>> {
        let rest = name.strip_prefix(Self::PREFIX)?;
        let (digits, component) = rest.split_once('.')?;
        let block_index = parse_index(digits)?;
        if component.is_empty() {
            return None;
        }
        Some(TensorName { block_index, component })
    }
}

/// Compute-graph node naming: `<component>-<index>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphNodeConvention;

impl NamingConvention for GraphNodeConvention {
    fn parse<'a>(&self, name: &'a str) -> Option<TensorName<'a>> {
        let (component, digits) = name.rsplit_once('-')?;
        let block_index = parse_index(digits)?;
        if component.is_empty() {
            return None;
        }
        Some(TensorName { block_index, component })
    }
}
