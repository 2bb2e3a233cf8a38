use crate::domain::errors::EngineError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target of the optional DTW cumulative-matrix debug dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceDumpTarget {
    pub asset: String,
    pub scale_1: String,
    pub scale_2: String,
}

impl DistanceDumpTarget {
    /// The dump target matches either orientation of a timeframe pair.
    pub fn matches(&self, asset: &str, scale_1: &str, scale_2: &str) -> bool {
        self.asset == asset
            && ((self.scale_1 == scale_1 && self.scale_2 == scale_2)
                || (self.scale_1 == scale_2 && self.scale_2 == scale_1))
    }
}

/// Process-wide run configuration, read-only for the duration of a run.
///
/// Loaded from a JSON file; every field has a default so a minimal file (or
/// none at all) still yields a usable run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deviations above this magnitude emit a one-shot per-chart diagnostic.
    pub critical_deviation: f64,
    /// Relative tolerance for merging nearby levels, and the bound on how far
    /// a candle's close may sit from a level for it to count as active.
    pub level_max_deviation: f64,
    /// Candles per level-detection frame.
    pub level_frame: usize,
    /// Level age, in days, at which its liveness feature reaches 1.
    pub level_max_lifetime: f64,
    /// Scale code of the chart levels are detected on.
    pub level_resolution: String,
    /// Minimum relative spread a zigzag segment must cover.
    pub min_price_change: f64,
    /// Allowed retracement, as a fraction of the segment range, before a
    /// segment is accepted.
    pub max_price_rollback: f64,
    /// Sakoe-Chiba band half-width for the DTW self-similarity.
    pub dtw_band_width: usize,
    /// Prediction horizon: number of forward regression targets per candle.
    pub prediction_timesteps: usize,
    /// Trailing volume-deviation window length in environment rows.
    pub volume_timesteps: usize,
    /// Reference scale for forward-looking movement tags.
    pub movement_scale: String,
    /// Hour-of-day of the reference candle used for movement tags.
    pub movement_hour: u32,
    /// When set, the raw DTW cumulative matrix of this pair is persisted.
    pub cumulative_distances: Option<DistanceDumpTarget>,
    /// TEMA indicator window; `None` disables the indicator.
    pub tema_timesteps: Option<usize>,
    /// CCI oscillator window; `None` disables the oscillator.
    pub cci_timesteps: Option<usize>,

    pub required_self_similarities: bool,
    pub required_pair_similarities: bool,
    pub required_pair_correlations: bool,
    pub required_price_deviations: bool,
    pub required_tagged_charts: bool,
    pub required_environment: bool,
    pub required_level_reduction: bool,

    /// Worker threads in the pipeline pool; 0 picks the machine default.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            critical_deviation: 0.1,
            level_max_deviation: 0.0075,
            level_frame: 20,
            level_max_lifetime: 180.0,
            level_resolution: "D".to_string(),
            min_price_change: 0.01,
            max_price_rollback: 0.33,
            dtw_band_width: 5,
            prediction_timesteps: 5,
            volume_timesteps: 5,
            movement_scale: "M60".to_string(),
            movement_hour: 10,
            cumulative_distances: None,
            tema_timesteps: None,
            cci_timesteps: None,
            required_self_similarities: true,
            required_pair_similarities: true,
            required_pair_correlations: true,
            required_price_deviations: true,
            required_tagged_charts: true,
            required_environment: true,
            required_level_reduction: true,
            workers: 0,
        }
    }
}

impl Config {
    /// Reads the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Fatal consistency checks, run once at engine construction.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.prediction_timesteps == 0 {
            return Err(EngineError::config("prediction_timesteps must be positive"));
        }
        if self.volume_timesteps > self.prediction_timesteps {
            return Err(EngineError::config(
                "volume_timesteps must not exceed prediction_timesteps",
            ));
        }
        if self.level_frame == 0 {
            return Err(EngineError::config("level_frame must be positive"));
        }
        if self.dtw_band_width == 0 {
            return Err(EngineError::config("dtw_band_width must be positive"));
        }
        if self.min_price_change <= 0.0 {
            return Err(EngineError::config("min_price_change must be positive"));
        }
        if self.max_price_rollback < 0.0 {
            return Err(EngineError::config("max_price_rollback must not be negative"));
        }
        if self.level_max_lifetime <= 0.0 {
            return Err(EngineError::config("level_max_lifetime must be positive"));
        }
        if self.tema_timesteps == Some(0) || self.cci_timesteps == Some(0) {
            return Err(EngineError::config("indicator windows must be positive"));
        }
        Ok(())
    }
}
