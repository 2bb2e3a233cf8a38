use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one candle sequence: an asset symbol at one timeframe scale.
///
/// Keys order by asset then scale, which fixes the block order of every
/// output file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChartKey {
    pub asset: String,
    pub scale: String,
}

impl ChartKey {
    pub fn new(asset: impl Into<String>, scale: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            scale: scale.into(),
        }
    }
}

impl fmt::Display for ChartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.asset, self.scale)
    }
}
