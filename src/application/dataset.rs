//! Feature-row assembly for the exported ML datasets.
//!
//! Two row layouts are produced: "tagged" rows carry calendar one-hots plus
//! the current candle's deviations and targets, "environment" rows add a
//! trailing deviation window and the movement tag.

use crate::config::Config;
use crate::domain::market::{scale, Candle, Level};

/// Feature values are clamped into the unit interval after scaling, signed
/// features symmetrically.
fn clamp_signed(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}

fn clamp_unsigned(value: f64) -> f64 {
    value.min(1.0)
}

/// Remaining-lifetime fraction of the level backing a candle, in [0, 1].
pub fn level_liveness(level: &Level, candle: &Candle, max_lifetime_days: f64) -> f64 {
    let level_epoch = level.begin.epoch_or_min();
    let candle_epoch = candle.time.epoch_or_min();
    let age_days = (candle_epoch - level_epoch) as f64 / 86_400.0;
    (age_days / max_lifetime_days).clamp(0.0, 1.0)
}

/// Picks the level a row describes: the support when its relative distance
/// from the close is inside `level_max_deviation`, the resistance when it is
/// inside the tolerance, closer than the support, and newer than it. The
/// resistance check does not require the support to have qualified.
pub fn active_level(candle: &Candle, level_max_deviation: f64) -> Option<&Level> {
    let support_deviation = (candle.close - candle.support.price) / candle.close;
    let resistance_deviation = (candle.resistance.price - candle.close) / candle.close;

    let mut chosen: Option<&Level> = None;
    if support_deviation < level_max_deviation {
        chosen = Some(&candle.support);
    }
    if resistance_deviation < level_max_deviation
        && resistance_deviation < support_deviation
        && candle.support.begin < candle.resistance.begin
    {
        chosen = Some(&candle.resistance);
    }

    chosen.filter(|level| !level.is_null())
}

fn push_month_one_hot(row: &mut Vec<String>, month: u32) {
    for m in 1..=12u32 {
        row.push(if m == month { "1".to_string() } else { "0".to_string() });
    }
}

/// Weekend candles carry an all-zero weekday block instead of being dropped.
fn push_weekday_one_hot(row: &mut Vec<String>, weekday: Option<u32>) {
    for d in 0..5u32 {
        row.push(if Some(d) == weekday { "1".to_string() } else { "0".to_string() });
    }
}

fn push_signed_deviation(row: &mut Vec<String>, value: f64) {
    row.push(format!("{:+.6}", clamp_signed(value)));
}

fn push_unsigned_deviation(row: &mut Vec<String>, value: f64) {
    row.push(format!("{:.6}", clamp_unsigned(value)));
}

fn push_regression_tags(row: &mut Vec<String>, candle: &Candle) {
    for tag in &candle.regression_tags {
        row.push(format!("{:+.6}", tag));
    }
}

/// Tagged-dataset row: 12 month one-hots, day-of-month fraction, 5 weekday
/// one-hots, level liveness, 4 clamped price deviations, the regression
/// targets and the classification tag.
pub fn tagged_row(candle: &Candle, scale_code: &str, config: &Config) -> Vec<String> {
    let multiplier = scale::price_deviation_multiplier(scale_code);
    let mut row = Vec::new();

    push_month_one_hot(&mut row, candle.time.month);
    row.push(format!("{:.3}", candle.time.day as f64 / 31.0));
    push_weekday_one_hot(&mut row, candle.time.weekday_index());

    let liveness = active_level(candle, config.level_max_deviation)
        .map(|level| level_liveness(level, candle, config.level_max_lifetime))
        .unwrap_or(0.0);
    row.push(format!("{:.6}", liveness));

    push_signed_deviation(&mut row, candle.price_deviation_open * multiplier);
    push_signed_deviation(&mut row, candle.price_deviation * multiplier);
    push_unsigned_deviation(&mut row, candle.price_deviation_max * multiplier);
    push_unsigned_deviation(&mut row, candle.price_deviation_min * multiplier);
    push_regression_tags(&mut row, candle);
    row.push(candle.classification_tag.clone());

    row
}

/// Environment-dataset row: 5 weekday one-hots, level liveness, a trailing
/// volume-deviation window, a trailing combined open+close deviation window,
/// 4 clamped price deviations (max, min, open, close), regression targets,
/// classification tag and movement tag. Returns None for untagged candles
/// and candles without a full trailing window.
pub fn environment_row(
    candles: &[Candle],
    index: usize,
    scale_code: &str,
    config: &Config,
) -> Option<Vec<String>> {
    let candle = &candles[index];
    if candle.movement_tag == 0 {
        return None;
    }
    if index + 1 < config.prediction_timesteps {
        return None;
    }

    let price_multiplier = scale::price_deviation_multiplier(scale_code);
    let volume_multiplier = scale::volume_deviation_multiplier(scale_code);
    let mut row = Vec::new();

    push_weekday_one_hot(&mut row, candle.time.weekday_index());

    let liveness = active_level(candle, config.level_max_deviation)
        .map(|level| level_liveness(level, candle, config.level_max_lifetime))
        .unwrap_or(0.0);
    row.push(format!("{:.6}", liveness));

    for past in candles[index + 1 - config.volume_timesteps..=index].iter() {
        push_signed_deviation(&mut row, past.volume_deviation * volume_multiplier);
    }
    for past in candles[index + 1 - config.prediction_timesteps..=index].iter() {
        let combined = past.price_deviation_open + past.price_deviation;
        push_signed_deviation(&mut row, combined * price_multiplier);
    }

    push_unsigned_deviation(&mut row, candle.price_deviation_max * price_multiplier);
    push_unsigned_deviation(&mut row, candle.price_deviation_min * price_multiplier);
    push_signed_deviation(&mut row, candle.price_deviation_open * price_multiplier);
    push_signed_deviation(&mut row, candle.price_deviation * price_multiplier);
    push_regression_tags(&mut row, candle);
    row.push(candle.classification_tag.clone());
    row.push(format!("{:+}", candle.movement_tag));

    Some(row)
}

/// Live feature row for model inference: the environment layout without the
/// target columns. Returns None for candles without a full trailing window.
pub fn snapshot_row(
    candles: &[Candle],
    index: usize,
    scale_code: &str,
    config: &Config,
) -> Option<Vec<String>> {
    let candle = &candles[index];
    if index + 1 < config.prediction_timesteps {
        return None;
    }

    let price_multiplier = scale::price_deviation_multiplier(scale_code);
    let volume_multiplier = scale::volume_deviation_multiplier(scale_code);
    let mut row = Vec::new();

    push_weekday_one_hot(&mut row, candle.time.weekday_index());

    let liveness = active_level(candle, config.level_max_deviation)
        .map(|level| level_liveness(level, candle, config.level_max_lifetime))
        .unwrap_or(0.0);
    row.push(format!("{:.6}", liveness));

    for past in candles[index + 1 - config.volume_timesteps..=index].iter() {
        push_signed_deviation(&mut row, past.volume_deviation * volume_multiplier);
    }
    for past in candles[index + 1 - config.prediction_timesteps..=index].iter() {
        let combined = past.price_deviation_open + past.price_deviation;
        push_signed_deviation(&mut row, combined * price_multiplier);
    }

    push_unsigned_deviation(&mut row, candle.price_deviation_max * price_multiplier);
    push_unsigned_deviation(&mut row, candle.price_deviation_min * price_multiplier);
    push_signed_deviation(&mut row, candle.price_deviation_open * price_multiplier);
    push_signed_deviation(&mut row, candle.price_deviation * price_multiplier);

    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::CandleTime;

    fn candle_on(raw_date: u32) -> Candle {
        let mut candle = Candle::new(
            CandleTime::from_raw(raw_date, 100000),
            100.0,
            101.0,
            99.0,
            100.5,
            1000,
        );
        candle.price_deviation_open = 0.002;
        candle.price_deviation = -0.001;
        candle.price_deviation_max = 0.004;
        candle.price_deviation_min = 0.003;
        candle.volume_deviation = 0.1;
        candle.regression_tags = vec![0.01, -0.02];
        candle.classification_tag = "C".to_string();
        candle
    }

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn test_tagged_row_layout() {
        // 2024-01-03 is a Wednesday.
        let candle = candle_on(20240103);
        let row = tagged_row(&candle, "D", &config());

        // 12 + 1 + 5 + 1 + 4 + 2 + 1
        assert_eq!(row.len(), 26);
        assert_eq!(row[0], "1"); // january
        assert_eq!(&row[1..12], vec!["0"; 11].as_slice());
        assert_eq!(row[12], format!("{:.3}", 3.0 / 31.0));
        assert_eq!(&row[13..18], ["0", "0", "1", "0", "0"]); // wednesday
        assert_eq!(row[18], "0.000000"); // no level
        assert_eq!(row[19], "+0.020000");
        assert_eq!(row[20], "-0.010000");
        assert_eq!(row[21], "0.040000");
        assert_eq!(row[23], "+0.010000");
        assert_eq!(row[24], "-0.020000");
        assert_eq!(row[25], "C");
    }

    #[test]
    fn test_weekend_rows_carry_a_zero_weekday_block() {
        // 2024-01-06 is a Saturday.
        let candle = candle_on(20240106);
        let row = tagged_row(&candle, "D", &config());
        assert_eq!(row.len(), 26);
        assert_eq!(&row[13..18], ["0", "0", "0", "0", "0"]);
    }

    #[test]
    fn test_deviation_clamping() {
        let mut candle = candle_on(20240103);
        candle.price_deviation_open = 0.5; // 0.5 * 10 clamps to 1
        candle.price_deviation = -0.5;
        candle.price_deviation_max = 0.9;
        let row = tagged_row(&candle, "D", &config());

        assert_eq!(row[19], "+1.000000");
        assert_eq!(row[20], "-1.000000");
        assert_eq!(row[21], "1.000000");
    }

    #[test]
    fn test_level_liveness_clamps_to_unit_interval() {
        let candle = candle_on(20240701);
        let fresh = Level::new(CandleTime::from_raw(20240630, 100000), 100.0);
        let stale = Level::new(CandleTime::from_raw(20230101, 100000), 100.0);
        let future = Level::new(CandleTime::from_raw(20250101, 100000), 100.0);

        let fresh_liveness = level_liveness(&fresh, &candle, 180.0);
        assert!(fresh_liveness > 0.0 && fresh_liveness < 0.01);
        assert_eq!(level_liveness(&stale, &candle, 180.0), 1.0);
        assert_eq!(level_liveness(&future, &candle, 180.0), 0.0);
    }

    #[test]
    fn test_active_level_prefers_close_support() {
        let mut candle = candle_on(20240103);
        candle.support = Level::new(CandleTime::from_raw(20240101, 100000), 100.2);
        let level = active_level(&candle, 0.0075).unwrap();
        assert_eq!(level.price, 100.2);
    }

    #[test]
    fn test_active_level_switches_to_closer_older_resistance() {
        let mut candle = candle_on(20240103);
        candle.support = Level::new(CandleTime::from_raw(20240101, 100000), 100.0);
        candle.resistance = Level::new(CandleTime::from_raw(20240102, 100000), 100.6);

        // resistance deviation 0.1/100.5 < support deviation 0.5/100.5 and
        // the support predates the resistance.
        let level = active_level(&candle, 0.0075).unwrap();
        assert_eq!(level.price, 100.6);
    }

    #[test]
    fn test_active_level_distant_support_yields_none() {
        let mut candle = candle_on(20240103);
        candle.support = Level::new(CandleTime::from_raw(20240101, 100000), 90.0);
        assert!(active_level(&candle, 0.0075).is_none());
    }

    #[test]
    fn test_active_level_resistance_qualifies_on_its_own() {
        // The support sits far outside the tolerance; the resistance still
        // qualifies independently.
        let mut candle = candle_on(20240103);
        candle.support = Level::new(CandleTime::from_raw(20240101, 100000), 90.0);
        candle.resistance = Level::new(CandleTime::from_raw(20240102, 100000), 100.6);

        let level = active_level(&candle, 0.0075).unwrap();
        assert_eq!(level.price, 100.6);
    }

    #[test]
    fn test_environment_row_layout_and_guards() {
        let mut candles: Vec<Candle> = (0..8).map(|i| candle_on(20240101 + i)).collect();
        for candle in candles.iter_mut() {
            candle.movement_tag = 1;
        }
        let cfg = config();

        // First prediction_timesteps - 1 candles lack a full window.
        assert!(environment_row(&candles, 2, "D", &cfg).is_none());

        // 2024-01-05 is a Friday, index 4 has a full window.
        let row = environment_row(&candles, 4, "D", &cfg).unwrap();
        // 5 + 1 + volume_timesteps + prediction_timesteps + 4 + horizon(2) + 2
        assert_eq!(row.len(), 5 + 1 + 5 + 5 + 4 + 2 + 2);
        assert_eq!(row[row.len() - 1], "+1");
        assert_eq!(row[row.len() - 2], "C");

        // The four current-candle deviations run max, min, open, close.
        let devs = &row[16..20];
        assert_eq!(devs, ["0.040000", "0.030000", "+0.020000", "-0.010000"]);

        candles[4].movement_tag = 0;
        assert!(environment_row(&candles, 4, "D", &cfg).is_none());
    }

    #[test]
    fn test_snapshot_row_drops_target_columns() {
        let candles: Vec<Candle> = (0..8).map(|i| candle_on(20240101 + i)).collect();
        let cfg = config();

        let row = snapshot_row(&candles, 4, "D", &cfg).unwrap();
        // 5 + 1 + volume_timesteps + prediction_timesteps + 4, no targets
        assert_eq!(row.len(), 5 + 1 + 5 + 5 + 4);
        assert!(snapshot_row(&candles, 2, "D", &cfg).is_none());
    }
}
