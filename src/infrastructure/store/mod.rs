//! Flat-file chart store.
//!
//! Layout under the data directory: `assets.txt` and `scales.txt` list the
//! universe one token per line; `charts/` holds one `{asset}_{scale}.csv`
//! per chart, most recent candle first; `levels/` and `output/` receive the
//! run artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::errors::EngineError;
use crate::domain::market::{Candle, Level, Matrix};

/// One exported dataset block: the chart it came from and its finished rows.
pub struct DatasetBlock {
    pub asset: String,
    pub scale: String,
    pub rows: Vec<Vec<String>>,
}

pub struct ChartStore {
    data_dir: PathBuf,
}

impl ChartStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn charts_dir(&self) -> PathBuf {
        self.data_dir.join("charts")
    }

    fn levels_dir(&self) -> PathBuf {
        self.data_dir.join("levels")
    }

    fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn ensure_directories(&self) -> Result<(), EngineError> {
        for dir in [self.charts_dir(), self.levels_dir(), self.output_dir()] {
            fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn chart_path(&self, asset: &str, scale: &str) -> PathBuf {
        self.charts_dir().join(format!("{}_{}.csv", asset, scale))
    }

    fn read_list(&self, name: &str) -> Result<Vec<String>, EngineError> {
        let path = self.data_dir.join(name);
        let text = fs::read_to_string(&path).map_err(|e| EngineError::io(&path, e))?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn load_assets(&self) -> Result<Vec<String>, EngineError> {
        self.read_list("assets.txt")
    }

    pub fn load_scales(&self) -> Result<Vec<String>, EngineError> {
        self.read_list("scales.txt")
    }

    /// Parses a candle stream in the file grammar, newest line first,
    /// returning candles in chronological order.
    pub fn parse_chart(text: &str) -> Result<Vec<Candle>, EngineError> {
        let mut candles = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Candle::parse_line)
            .collect::<Result<Vec<_>, _>>()?;
        candles.reverse();
        Ok(candles)
    }

    /// Loads one chart, `None` when its file is absent.
    pub fn load_candles(
        &self,
        asset: &str,
        scale: &str,
    ) -> Result<Option<Vec<Candle>>, EngineError> {
        let path = self.chart_path(asset, scale);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::io(&path, e)),
        };
        let candles = Self::parse_chart(&text)?;
        debug!(asset, scale, candles = candles.len(), "chart loaded");
        Ok(Some(candles))
    }

    pub fn save_candles(
        &self,
        asset: &str,
        scale: &str,
        candles: &[Candle],
    ) -> Result<(), EngineError> {
        let mut text = String::new();
        for candle in candles.iter().rev() {
            text.push_str(&candle.serialize_line());
            text.push('\n');
        }
        let path = self.chart_path(asset, scale);
        fs::write(&path, text).map_err(|e| EngineError::io(&path, e))
    }

    fn write_matrix_blocks(
        &self,
        file_name: &str,
        blocks: &[(String, Matrix)],
        signed: bool,
    ) -> Result<(), EngineError> {
        let mut text = String::new();
        for (key, matrix) in blocks {
            text.push_str(&format!("{} {}\n\n", key, matrix.rows()));
            for row in 0..matrix.rows() {
                let mut line = String::new();
                for col in 0..matrix.cols() {
                    if col > 0 {
                        line.push(' ');
                    }
                    let value = matrix.get(row, col);
                    if signed {
                        line.push_str(&format!("{:+.6}", value));
                    } else {
                        line.push_str(&format!("{:>8.6}", value));
                    }
                }
                text.push_str(&line);
                text.push('\n');
            }
            text.push('\n');
        }
        let path = self.output_dir().join(file_name);
        fs::write(&path, text).map_err(|e| EngineError::io(&path, e))
    }

    /// Per-asset blocks, one scale-by-scale distance grid each.
    pub fn save_self_similarities(&self, blocks: &[(String, Matrix)]) -> Result<(), EngineError> {
        self.write_matrix_blocks("self_similarities.txt", blocks, false)
    }

    /// Per-scale blocks, one asset-by-asset mean-gap grid each.
    pub fn save_pair_similarities(&self, blocks: &[(String, Matrix)]) -> Result<(), EngineError> {
        self.write_matrix_blocks("pair_similarities.txt", blocks, true)
    }

    /// Per-scale blocks, one asset-by-asset Spearman grid each.
    pub fn save_pair_correlations(&self, blocks: &[(String, Matrix)]) -> Result<(), EngineError> {
        self.write_matrix_blocks("pair_correlations.txt", blocks, true)
    }

    /// Raw banded cumulative-cost matrix of the configured chart pair. The
    /// grid follows a blank line after the dimension header, cells right
    /// aligned to width 7.
    pub fn save_cumulative_distances(&self, matrix: &Matrix) -> Result<(), EngineError> {
        let mut text = format!("{} {}\n\n", matrix.rows(), matrix.cols());
        for row in 0..matrix.rows() {
            for col in 0..matrix.cols() {
                text.push_str(&format!("{:>7.3} ", matrix.get(row, col)));
            }
            text.push('\n');
        }
        let path = self.output_dir().join("cumulative_distances.txt");
        fs::write(&path, text).map_err(|e| EngineError::io(&path, e))
    }

    pub fn save_supports_resistances(
        &self,
        blocks: &[(&str, &[Level])],
    ) -> Result<(), EngineError> {
        let mut text = String::new();
        for (asset, levels) in blocks {
            text.push_str(&format!("{} {}\n\n", asset, levels.len()));
            for level in *levels {
                text.push_str(&level.to_string());
                text.push('\n');
            }
            text.push('\n');
        }
        let path = self.levels_dir().join("supports_resistances.txt");
        fs::write(&path, text).map_err(|e| EngineError::io(&path, e))
    }

    /// Close-deviation series per chart, one dated row per candle.
    pub fn save_price_deviations(
        &self,
        blocks: &[(&str, &str, &[Candle])],
    ) -> Result<(), EngineError> {
        let mut text = String::new();
        for (asset, scale, candles) in blocks {
            text.push_str(&format!("{} {} {}\n", asset, scale, candles.len()));
            for candle in *candles {
                text.push_str(&format!(
                    "{},{:02},{:02},{:+.6}\n",
                    candle.time.year, candle.time.month, candle.time.day, candle.price_deviation
                ));
            }
            text.push('\n');
        }
        let path = self.output_dir().join("price_deviations.txt");
        fs::write(&path, text).map_err(|e| EngineError::io(&path, e))
    }

    /// Writes a dataset file: per-chart `<asset> <scale> <rows>` headers with
    /// the finished rows as CSV records under each.
    pub fn save_dataset(&self, file_name: &str, blocks: &[DatasetBlock]) -> Result<(), EngineError> {
        let path = self.output_dir().join(file_name);
        let mut out = Vec::new();

        for block in blocks {
            out.extend_from_slice(
                format!("{} {} {}\n", block.asset, block.scale, block.rows.len()).as_bytes(),
            );
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(Vec::new());
            for row in &block.rows {
                writer
                    .write_record(row)
                    .map_err(|e| EngineError::domain(format!("dataset row: {}", e)))?;
            }
            let encoded = writer
                .into_inner()
                .map_err(|e| EngineError::domain(format!("dataset flush: {}", e)))?;
            out.extend_from_slice(&encoded);
        }

        fs::write(&path, out).map_err(|e| EngineError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::CandleTime;
    use tempfile::TempDir;

    fn store() -> (TempDir, ChartStore) {
        let dir = TempDir::new().unwrap();
        let store = ChartStore::new(dir.path());
        store.ensure_directories().unwrap();
        (dir, store)
    }

    #[test]
    fn test_chart_round_trip_reverses_file_order() {
        let (_dir, store) = store();
        let candles = vec![
            Candle::new(CandleTime::from_raw(20240101, 100000), 1.0, 2.0, 0.5, 1.5, 10),
            Candle::new(CandleTime::from_raw(20240102, 100000), 1.5, 2.5, 1.0, 2.0, 20),
        ];
        store.save_candles("GAZP", "D", &candles).unwrap();

        let text = fs::read_to_string(store.chart_path("GAZP", "D")).unwrap();
        assert!(text.starts_with("20240102"), "newest candle first on disk");

        let loaded = store.load_candles("GAZP", "D").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].time, candles[0].time);
        assert_eq!(loaded[1].close, 2.0);
    }

    #[test]
    fn test_missing_chart_is_none() {
        let (_dir, store) = store();
        assert!(store.load_candles("GAZP", "D").unwrap().is_none());
    }

    #[test]
    fn test_list_files_skip_blank_lines() {
        let (dir, store) = store();
        fs::write(dir.path().join("assets.txt"), "GAZP\n\nSBER\n").unwrap();
        assert_eq!(store.load_assets().unwrap(), vec!["GAZP", "SBER"]);
    }

    #[test]
    fn test_matrix_block_format() {
        let (dir, store) = store();
        let mut matrix = Matrix::square(2);
        matrix.set(0, 1, 0.123456789);
        matrix.set(1, 0, 0.123456789);
        store
            .save_self_similarities(&[("GAZP".to_string(), matrix)])
            .unwrap();

        let text = fs::read_to_string(dir.path().join("output/self_similarities.txt")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "GAZP 2");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "0.000000 0.123457");
    }

    #[test]
    fn test_signed_blocks_carry_sign() {
        let (dir, store) = store();
        let mut matrix = Matrix::square(2);
        matrix.set(0, 0, 1.0);
        matrix.set(1, 1, 1.0);
        matrix.set(0, 1, -0.5);
        matrix.set(1, 0, -0.5);
        store
            .save_pair_correlations(&[("D".to_string(), matrix)])
            .unwrap();

        let text = fs::read_to_string(dir.path().join("output/pair_correlations.txt")).unwrap();
        assert!(text.contains("+1.000000 -0.500000"));
    }

    #[test]
    fn test_cumulative_grid_pads_cells_after_blank_header_line() {
        let (dir, store) = store();
        let mut matrix = Matrix::zeros(2, 3);
        matrix.set(0, 1, 1.5);
        matrix.set(1, 2, 123.456);
        store.save_cumulative_distances(&matrix).unwrap();

        let text =
            fs::read_to_string(dir.path().join("output/cumulative_distances.txt")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "2 3");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "  0.000   1.500   0.000 ");
        assert_eq!(lines[3], "  0.000   0.000 123.456 ");
    }

    #[test]
    fn test_dataset_blocks_have_headers_and_csv_rows() {
        let (dir, store) = store();
        let block = DatasetBlock {
            asset: "GAZP".to_string(),
            scale: "D".to_string(),
            rows: vec![vec!["1".to_string(), "0.5".to_string(), "C".to_string()]],
        };
        store.save_dataset("tagged_charts.csv", &[block]).unwrap();

        let text = fs::read_to_string(dir.path().join("output/tagged_charts.csv")).unwrap();
        assert_eq!(text, "GAZP D 1\n1,0.5,C\n");
    }
}
