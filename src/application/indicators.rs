//! Optional per-candle indicator and oscillator values.
//!
//! Both run after deviations and append one value per configured window to
//! `candle.indicators` / `candle.oscillators`.

use crate::domain::errors::EngineError;
use crate::domain::market::Candle;

fn ema(values: &[f64], k: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if let Some(&first) = values.first() {
        out.push(first);
        for &value in &values[1..] {
            let previous = out[out.len() - 1];
            out.push(k * value + (1.0 - k) * previous);
        }
    }
    out
}

/// Triple exponential moving average over closes.
pub fn tema(candles: &mut [Candle], timesteps: usize) -> Result<(), EngineError> {
    if timesteps == 0 {
        return Err(EngineError::domain("TEMA window must be positive"));
    }
    if candles.is_empty() {
        return Ok(());
    }

    let k = 2.0 / (timesteps as f64 + 1.0);
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let ema_1 = ema(&closes, k);
    let ema_2 = ema(&ema_1, k);
    let ema_3 = ema(&ema_2, k);

    candles[0].indicators.push(closes[0]);
    for i in 1..candles.len() {
        candles[i]
            .indicators
            .push(3.0 * ema_1[i] - 3.0 * ema_2[i] + ema_3[i]);
    }
    Ok(())
}

/// Commodity channel index over typical prices. Candles before the first
/// full window carry no value.
pub fn cci(candles: &mut [Candle], timesteps: usize) -> Result<(), EngineError> {
    if timesteps == 0 {
        return Err(EngineError::domain("CCI window must be positive"));
    }
    if candles.len() < timesteps {
        return Ok(());
    }

    let typical: Vec<f64> = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    let mut sma = Vec::with_capacity(typical.len() - timesteps + 1);
    sma.push(typical[..timesteps].iter().sum::<f64>() / timesteps as f64);
    for i in timesteps..typical.len() {
        let previous = sma[sma.len() - 1];
        sma.push(previous + (typical[i] - typical[i - timesteps]) / timesteps as f64);
    }

    for (j, i) in (timesteps - 1..typical.len()).enumerate() {
        let mad = typical[j..j + timesteps]
            .iter()
            .map(|&tp| (tp - sma[j]).abs())
            .sum::<f64>()
            / timesteps as f64;
        let value = if mad.abs() <= f64::EPSILON {
            0.0
        } else {
            (typical[i] - sma[j]) / (0.015 * mad)
        };
        candles[i].oscillators.push(value);
    }
    Ok(())
}
