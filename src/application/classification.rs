//! Per-candle classification and regression labels.
//!
//! Three labels are produced per candle: a persistent regime tag
//! (consolidating/long/short) from a zigzag segmentation, a forward-looking
//! movement tag from a coarser reference timeframe, and one regression
//! target per prediction-horizon step.

use crate::domain::errors::EngineError;
use crate::domain::market::{Candle, CandleTime};
use tracing::info;

pub mod tag {
    pub const CONSOLIDATING: &str = "C";
    pub const LONG: &str = "L";
    pub const SHORT: &str = "S";

    pub const OPEN_LONG: &str = "OL";
    pub const CLOSE_LONG: &str = "CL";
    pub const OPEN_SHORT: &str = "OS";
    pub const CLOSE_SHORT: &str = "CS";
}

/// Close-price extrema of a window body, by position.
struct BodyExtrema {
    first: usize,
    last: usize,
    min_close: f64,
    max_close: f64,
}

fn body_extrema(candles: &[Candle], from: usize, to: usize) -> BodyExtrema {
    let mut min_idx = from;
    let mut max_idx = from;
    for i in from..to {
        if candles[i].close < candles[min_idx].close {
            min_idx = i;
        }
        if candles[i].close > candles[max_idx].close {
            max_idx = i;
        }
    }
    let (first, last) = if min_idx <= max_idx {
        (min_idx, max_idx)
    } else {
        (max_idx, min_idx)
    };
    BodyExtrema {
        first,
        last,
        min_close: candles[min_idx].close,
        max_close: candles[max_idx].close,
    }
}

/// Zigzag segmentation: greedily finds alternating price swings and marks
/// their endpoints with open/close markers.
///
/// A trial window grows from the cursor one candle at a time; the trial-end
/// candle is measured against the extrema of the window body before it.
/// Bodies of fewer than three candles, or with a flat close range, keep
/// extending. The window also keeps extending while the body spread is below
/// `min_price_change`, or while the pullback from the later extremum stays
/// under `max_price_rollback` of the swing range — unless the gap between
/// the later extremum and the trial end has itself reached
/// `min_price_change`. On acceptance the two extrema are tagged
/// open/close-long (rising swing) or open/close-short (falling swing) and
/// the cursor jumps to the later extremum.
fn mark_segments(candles: &mut [Candle], min_price_change: f64, max_price_rollback: f64) {
    let mut cursor = 0;

    loop {
        let mut accepted = false;

        for end in cursor + 1..candles.len() {
            if end - cursor < 3 {
                continue;
            }

            let extrema = body_extrema(candles, cursor, end);
            if (extrema.max_close - extrema.min_close).abs() <= f64::EPSILON {
                continue;
            }

            let end_close = candles[end].close;
            let first_close = candles[extrema.first].close;
            let last_close = candles[extrema.last].close;

            let spread = (extrema.max_close - extrema.min_close) / extrema.min_close;
            let retrace = (last_close - end_close).abs();
            let range = (first_close - last_close).abs();
            let gap = (last_close - end_close).abs() / last_close.min(end_close);

            let keep_extending = (spread < min_price_change
                || (spread > min_price_change && retrace < max_price_rollback * range))
                && gap < min_price_change;
            if keep_extending {
                continue;
            }

            if first_close < last_close {
                candles[extrema.first].classification_tag = tag::OPEN_LONG.to_string();
                candles[extrema.last].classification_tag = tag::CLOSE_LONG.to_string();
            } else {
                candles[extrema.first].classification_tag = tag::OPEN_SHORT.to_string();
                candles[extrema.last].classification_tag = tag::CLOSE_SHORT.to_string();
            }

            cursor = extrema.last;
            accepted = true;
            break;
        }

        if !accepted {
            break;
        }
    }
}

/// Second pass: turns open/close markers into a persistent regime code.
///
/// Untagged candles inherit the running regime; a marker switches the regime
/// and is then itself overwritten by the post-transition regime code, so
/// every candle ends up tagged one of C, L, S.
fn propagate_states(candles: &mut [Candle]) {
    let mut state = tag::CONSOLIDATING;

    for candle in candles.iter_mut() {
        if !candle.classification_tag.is_empty() {
            state = match candle.classification_tag.as_str() {
                tag::OPEN_LONG => tag::LONG,
                tag::OPEN_SHORT => tag::SHORT,
                tag::CLOSE_LONG | tag::CLOSE_SHORT => tag::CONSOLIDATING,
                _ => state,
            };
        }
        candle.classification_tag = state.to_string();
    }
}

/// Runs segmentation then state propagation over one chart.
pub fn update_classification_tags(
    candles: &mut [Candle],
    min_price_change: f64,
    max_price_rollback: f64,
) {
    mark_segments(candles, min_price_change, max_price_rollback);
    propagate_states(candles);
}

/// One bar of the coarser reference timeframe used for movement tagging.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceBar {
    pub time: CandleTime,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl ReferenceBar {
    pub fn from_candle(candle: &Candle) -> Self {
        Self {
            time: candle.time,
            high: candle.high,
            low: candle.low,
            close: candle.close,
        }
    }
}

/// Forward-looking movement tags from a coarser reference timeframe.
///
/// For each candle past the first, the reference bar on the same date at
/// `reference_hour` is located; it needs both a predecessor and a successor
/// in the reference series, otherwise the candle is skipped. The upward
/// excursion of the next two reference highs and the downward excursion of
/// the next two reference lows are measured against the previous reference
/// close; the prior candle is tagged +1 when the upward excursion dominates,
/// -1 otherwise.
pub fn update_movement_tags(
    asset: &str,
    scale: &str,
    candles: &mut [Candle],
    reference: &[ReferenceBar],
    reference_hour: u32,
) {
    let mut unmatched = 0usize;

    for i in 1..candles.len() {
        let date = candles[i].time;

        let position = reference
            .iter()
            .position(|bar| bar.time.same_date(&date) && bar.time.hour == reference_hour);

        let Some(pos) = position else {
            unmatched += 1;
            continue;
        };
        if pos == 0 || pos + 1 >= reference.len() {
            unmatched += 1;
            continue;
        }

        let previous_close = reference[pos - 1].close;
        let delta_up = (reference[pos].high.max(reference[pos + 1].high) - previous_close).abs();
        let delta_down = (reference[pos].low.min(reference[pos + 1].low) - previous_close).abs();

        candles[i - 1].movement_tag = if delta_up - delta_down >= -f64::EPSILON {
            1
        } else {
            -1
        };
    }

    if unmatched > 0 {
        info!(
            asset,
            scale, unmatched, "movement tagging skipped candles without a usable reference bar"
        );
    }
}

/// Multi-horizon regression targets: relative close change `j+1` candles
/// ahead, 0 where the horizon runs past the chart end.
pub fn update_regression_tags(candles: &mut [Candle], horizon: usize) -> Result<(), EngineError> {
    for i in 0..candles.len() {
        if candles[i].close.abs() <= f64::EPSILON {
            return Err(EngineError::domain(format!(
                "zero close price at {}",
                candles[i].time
            )));
        }

        let mut tags = vec![0.0; horizon];
        for (j, tag) in tags.iter_mut().enumerate() {
            if i + j + 1 < candles.len() {
                *tag = (candles[i + j + 1].close - candles[i].close) / candles[i].close;
            }
        }
        candles[i].regression_tags = tags;
    }
    Ok(())
}
