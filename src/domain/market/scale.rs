//! Timeframe scale codes.
//!
//! Scales are free-form tokens read from the scales list (`M60`, `H`, `D`,
//! ...). Only the dataset scale factors need to recognize specific codes.

/// Scale factor applied to price deviations before clamping in dataset rows.
///
/// Finer timeframes move less per candle, so their deviations are stretched
/// to use the same [-1, 1] range as daily data.
pub fn price_deviation_multiplier(scale: &str) -> f64 {
    match scale {
        "H" | "M60" => 40.0,
        "D" => 10.0,
        _ => 1.0,
    }
}

/// Scale factor applied to volume deviations before clamping.
pub fn volume_deviation_multiplier(_scale: &str) -> f64 {
    1.0
}
