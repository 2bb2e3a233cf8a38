//! Support/resistance level detection.
//!
//! A chart is cut into fixed-size frames; each frame's close extrema become
//! levels when they are interior to the frame or confirmed by the candle just
//! outside it. An optional greedy pass merges nearby levels, raising the
//! survivor's strength.

use crate::domain::market::{Candle, Level};

fn frame_extrema(frame: &[Candle]) -> (usize, usize) {
    let mut min_idx = 0;
    let mut max_idx = 0;
    for (i, candle) in frame.iter().enumerate() {
        if candle.close < frame[min_idx].close {
            min_idx = i;
        }
        if candle.close > frame[max_idx].close {
            max_idx = i;
        }
    }
    (min_idx, max_idx)
}

/// Whether a frame-local extremum qualifies as a level.
///
/// `start` is the frame's offset in the chart, `index` the extremum's offset
/// within the frame, `rising` selects the comparison direction for boundary
/// confirmation: a maximum needs the neighbour above it, a minimum below.
fn qualifies(
    candles: &[Candle],
    start: usize,
    frame_len: usize,
    index: usize,
    extremum_close: f64,
    rising: bool,
) -> bool {
    let beyond = |neighbour: f64| {
        if rising {
            neighbour > extremum_close
        } else {
            neighbour < extremum_close
        }
    };

    if index > 0 && index < frame_len - 1 {
        return true;
    }
    if index == 0 && start > 0 && beyond(candles[start - 1].close) {
        return true;
    }
    if index == frame_len - 1 && start + frame_len < candles.len() {
        return beyond(candles[start + frame_len].close);
    }
    false
}

/// Detects raw levels over consecutive non-overlapping frames of
/// `frame_size` candles (the last frame may be shorter). Both the frame
/// minimum and maximum are tested independently.
pub fn detect_levels(candles: &[Candle], frame_size: usize) -> Vec<Level> {
    let mut levels = Vec::new();

    let mut start = 0;
    while start < candles.len() {
        let frame_len = frame_size.min(candles.len() - start);
        let frame = &candles[start..start + frame_len];
        let (min_idx, max_idx) = frame_extrema(frame);

        if qualifies(candles, start, frame_len, min_idx, frame[min_idx].close, false) {
            levels.push(Level::new(frame[min_idx].time, frame[min_idx].close));
        }
        if qualifies(candles, start, frame_len, max_idx, frame[max_idx].close, true) {
            levels.push(Level::new(frame[max_idx].time, frame[max_idx].close));
        }

        start += frame_len;
    }

    levels
}

/// Greedy single forward merge pass: each surviving level absorbs every later
/// level within the relative tolerance, gaining one strength per absorption.
/// Absorbed levels are never re-clustered.
pub fn reduce_levels(mut levels: Vec<Level>, tolerance: f64) -> Vec<Level> {
    let mut i = 0;
    while i < levels.len() {
        let mut j = i + 1;
        while j < levels.len() {
            if (levels[i].price - levels[j].price).abs() / levels[i].price <= tolerance {
                levels[i].strength += 1;
                levels.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    levels
}

/// Assigns each candle its nearest support (highest level strictly below the
/// close) and resistance (lowest level strictly above) among levels that
/// began strictly before the candle. `levels` must be sorted ascending by
/// `begin`.
pub fn assign_supports_resistances(candles: &mut [Candle], levels: &[Level]) {
    for candle in candles.iter_mut() {
        for level in levels {
            if level.begin >= candle.time {
                break;
            }
            if level.price < candle.close
                && (candle.support.is_null() || candle.support.price < level.price)
            {
                candle.support = *level;
            }
            if level.price > candle.close
                && (candle.resistance.is_null() || candle.resistance.price > level.price)
            {
                candle.resistance = *level;
            }
        }
    }
}
