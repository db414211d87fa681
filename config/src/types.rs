//! Loss configuration types shared between the cel crates.

use serde::{Deserialize, Serialize};

/// Policy for combining per-token losses into a scalar.
///
/// `Mean` normalizes by the number of non-ignored tokens, `Sum` does not.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "burn", derive(burn::config::Config))]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    #[default]
    Mean,
    Sum,
}

impl std::fmt::Display for Reduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Sum => write!(f, "sum"),
        }
    }
}

impl std::str::FromStr for Reduction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            _ => Err(format!("unknown reduction '{s}'. Use: mean, sum")),
        }
    }
}

/// Sentinel label value marking tokens excluded from the loss.
pub const DEFAULT_IGNORE_INDEX: i64 = -100;

/// Caller-facing configuration for the chunked fused loss head.
///
/// Serialized as part of the training run configuration; all fields have
/// defaults so older run files keep loading.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FusedCelConfig {
    /// Use the fused chunked path. When false, the loss head materializes
    /// full logits and runs the unfused implementation.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Number of chunks the token batch is split into. The token count must
    /// be evenly divisible by this.
    #[serde(default = "default_chunk_count")]
    pub chunk_count: usize,
    /// Label value excluded from loss and gradients.
    #[serde(default = "default_ignore_index")]
    pub ignore_index: i64,
    #[serde(default)]
    pub reduction: Reduction,
}

fn default_enabled() -> bool {
    true
}
fn default_chunk_count() -> usize {
    1
}
fn default_ignore_index() -> i64 {
    DEFAULT_IGNORE_INDEX
}

impl Default for FusedCelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_count: 1,
            ignore_index: DEFAULT_IGNORE_INDEX,
            reduction: Reduction::Mean,
        }
    }
}
