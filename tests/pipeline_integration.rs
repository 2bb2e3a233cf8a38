//! End-to-end run over a generated data directory.

use std::fs;

use chartmill::application::pipeline::Engine;
use chartmill::config::Config;
use chrono::{Datelike, Duration, NaiveDate};
use tempfile::TempDir;

const ASSETS: &[&str] = &["GAZP", "SBER"];
const SCALES: &[&str] = &["M60", "D"];

/// Weekday-only date sequence starting 2024-01-01 (a Monday).
fn trading_dates(count: usize) -> Vec<u32> {
    let mut dates = Vec::with_capacity(count);
    let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    while dates.len() < count {
        if day.weekday().num_days_from_monday() < 5 {
            dates.push(day.year() as u32 * 10_000 + day.month() * 100 + day.day());
        }
        day += Duration::days(1);
    }
    dates
}

fn write_chart(dir: &TempDir, asset: &str, scale: &str, closes: &[f64]) {
    let hour = if scale == "M60" { 10 } else { 18 };
    let dates = trading_dates(closes.len());
    let mut lines: Vec<String> = closes
        .iter()
        .zip(&dates)
        .map(|(close, date)| {
            // Full-precision prices, so no two deviations collapse into a
            // rounded-value tie.
            format!(
                "{},{:02}0000,{},{},{},{},{}",
                date,
                hour,
                close - 0.5,
                close + 1.0,
                close - 1.0,
                close,
                1000
            )
        })
        .collect();
    lines.reverse(); // candle files hold the newest candle first
    fs::write(
        dir.path().join(format!("charts/{}_{}.csv", asset, scale)),
        lines.join("\n"),
    )
    .unwrap();
}

fn seeded_data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("charts")).unwrap();
    fs::write(dir.path().join("assets.txt"), ASSETS.join("\n")).unwrap();
    fs::write(dir.path().join("scales.txt"), SCALES.join("\n")).unwrap();

    let closes: Vec<f64> = (0..60)
        .map(|i| 100.0 + (i as f64 * 0.5).sin() * 8.0 + i as f64 * 0.05)
        .collect();
    let shifted: Vec<f64> = closes.iter().map(|c| c * 1.5).collect();

    for scale in SCALES {
        write_chart(&dir, "GAZP", scale, &closes);
        write_chart(&dir, "SBER", scale, &shifted);
    }
    dir
}

fn run_config() -> Config {
    Config {
        level_resolution: "D".to_string(),
        movement_scale: "M60".to_string(),
        movement_hour: 10,
        ..Config::default()
    }
}

#[test]
fn full_run_writes_all_artifacts() {
    let dir = seeded_data_dir();
    let mut engine = Engine::new(run_config(), dir.path()).unwrap();
    engine.run().unwrap();

    for artifact in [
        "output/self_similarities.txt",
        "output/pair_similarities.txt",
        "output/pair_correlations.txt",
        "output/price_deviations.txt",
        "output/tagged_charts.csv",
        "output/environment.csv",
        "levels/supports_resistances.txt",
    ] {
        assert!(dir.path().join(artifact).exists(), "missing {}", artifact);
    }
}

#[test]
fn correlation_blocks_have_unit_diagonal_and_symmetric_entries() {
    let dir = seeded_data_dir();
    let mut engine = Engine::new(run_config(), dir.path()).unwrap();
    engine.run().unwrap();

    let text = fs::read_to_string(dir.path().join("output/pair_correlations.txt")).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    // First block: scale M60, 2 assets.
    assert_eq!(lines[0], "M60 2");
    let row_1: Vec<&str> = lines[2].split(' ').collect();
    let row_2: Vec<&str> = lines[3].split(' ').collect();
    assert_eq!(row_1[0], "+1.000000");
    assert_eq!(row_2[1], "+1.000000");
    assert_eq!(row_1[1], row_2[0]);

    // SBER is GAZP scaled by a constant; both deviation series are strictly
    // decreasing functions of the close, so the rank orders agree exactly.
    assert_eq!(row_1[1], "+1.000000");
}

#[test]
fn tagged_dataset_rows_are_well_formed() {
    let dir = seeded_data_dir();
    let mut engine = Engine::new(run_config(), dir.path()).unwrap();
    engine.run().unwrap();

    let text = fs::read_to_string(dir.path().join("output/tagged_charts.csv")).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    let mut parts = header.split(' ');
    assert_eq!(parts.next(), Some("GAZP"));
    assert_eq!(parts.next(), Some("D"));
    let rows: usize = parts.next().unwrap().parse().unwrap();
    assert!(rows > 0);

    let config = run_config();
    // 12 month + day + 5 weekday + liveness + 4 deviations + horizon + tag
    let expected_columns = 12 + 1 + 5 + 1 + 4 + config.prediction_timesteps + 1;
    let first_row = lines.next().unwrap();
    let fields: Vec<&str> = first_row.split(',').collect();
    assert_eq!(fields.len(), expected_columns);
    let tag = fields[expected_columns - 1];
    assert!(["C", "L", "S"].contains(&tag), "unexpected tag {:?}", tag);
}

#[test]
fn environment_rows_end_with_a_movement_direction() {
    let dir = seeded_data_dir();
    let mut engine = Engine::new(run_config(), dir.path()).unwrap();
    engine.run().unwrap();

    let text = fs::read_to_string(dir.path().join("output/environment.csv")).unwrap();
    let mut saw_rows = false;
    for line in text.lines() {
        if line.contains(' ') {
            continue; // block header
        }
        saw_rows = true;
        let fields: Vec<&str> = line.split(',').collect();
        let movement = *fields.last().unwrap();
        assert!(movement == "+1" || movement == "-1");
        let tag = fields[fields.len() - 2];
        assert!(["C", "L", "S"].contains(&tag));
    }
    assert!(saw_rows, "environment dataset came out empty");
}

#[test]
fn level_file_lists_blocks_per_asset() {
    let dir = seeded_data_dir();
    let mut engine = Engine::new(run_config(), dir.path()).unwrap();
    engine.run().unwrap();

    let text = fs::read_to_string(dir.path().join("levels/supports_resistances.txt")).unwrap();
    assert!(text.starts_with("GAZP "));
    assert!(text.contains("\nSBER "));

    // Levels persisted for an asset must be loadable back as dated prices.
    for line in text.lines().filter(|l| l.contains(',')) {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 5);
        assert!(fields[3].parse::<f64>().is_ok());
        assert!(fields[4].parse::<u32>().is_ok());
    }
}

#[test]
fn rerun_over_same_inputs_is_deterministic() {
    let dir = seeded_data_dir();
    let mut engine = Engine::new(run_config(), dir.path()).unwrap();
    engine.run().unwrap();
    let first = fs::read_to_string(dir.path().join("output/self_similarities.txt")).unwrap();

    let mut engine = Engine::new(run_config(), dir.path()).unwrap();
    engine.run().unwrap();
    let second = fs::read_to_string(dir.path().join("output/self_similarities.txt")).unwrap();

    assert_eq!(first, second);
}
