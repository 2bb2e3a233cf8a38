//! Per-candle normalized price/volume deviations.
//!
//! The deviation fields are the foundation every downstream stage works on:
//! similarity runs on `price_deviation`, datasets serialize the scaled and
//! clamped variants.

use crate::domain::errors::EngineError;
use crate::domain::market::Candle;
use tracing::warn;

/// Fills the deviation fields of a chronologically ordered chart in place.
///
/// For the first candle `price_deviation_open` and `volume_deviation` are 0.
/// The first candle whose open or gap deviation exceeds `critical_deviation`
/// in magnitude emits one diagnostic record for the chart; further outliers
/// on the same chart stay silent.
///
/// Fails with a domain error when an open or prior close is ~0, since both
/// are divisors.
pub fn update_deviations(
    asset: &str,
    scale: &str,
    candles: &mut [Candle],
    critical_deviation: f64,
) -> Result<(), EngineError> {
    let mut reported = false;

    for i in 0..candles.len() {
        if candles[i].open.abs() <= f64::EPSILON {
            return Err(EngineError::domain(format!(
                "zero open price at {} {} {}",
                asset, scale, candles[i].time
            )));
        }

        candles[i].price_deviation = (candles[i].close - candles[i].open) / candles[i].open;

        if candles[i].price_deviation.abs() > critical_deviation && !reported {
            warn!(
                asset,
                scale,
                date = %candles[i].time,
                deviation = candles[i].price_deviation,
                "critical price deviation"
            );
            reported = true;
        }

        if i == 0 {
            candles[i].price_deviation_open = 0.0;
            candles[i].volume_deviation = 0.0;
        } else {
            let previous_close = candles[i - 1].close;
            if previous_close.abs() <= f64::EPSILON {
                return Err(EngineError::domain(format!(
                    "zero close price at {} {} {}",
                    asset,
                    scale,
                    candles[i - 1].time
                )));
            }

            candles[i].price_deviation_open = (candles[i].open - previous_close) / previous_close;

            if candles[i].price_deviation_open.abs() > critical_deviation && !reported {
                warn!(
                    asset,
                    scale,
                    date = %candles[i].time,
                    deviation = candles[i].price_deviation_open,
                    "critical open-gap deviation"
                );
                reported = true;
            }

            // Zero traded volume counts as 1 to keep the ratio defined.
            let previous_volume = candles[i - 1].volume.max(1) as f64;
            let volume = candles[i].volume as f64;
            candles[i].volume_deviation = (volume - previous_volume) / previous_volume;
        }

        candles[i].price_deviation_max = (candles[i].high - candles[i].open) / candles[i].open;
        candles[i].price_deviation_min = (candles[i].open - candles[i].low) / candles[i].open;
    }

    Ok(())
}
