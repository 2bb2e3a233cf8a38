//! Staged analytics pipeline.
//!
//! Every stage fans its unit of work out over an owned rayon pool, collects
//! per-task results into private buffers and merges them single-threaded
//! after the join. A stage starts only after the previous stage's merge, so
//! no stage ever observes a chart another task is still mutating.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::application::classification::{self, ReferenceBar};
use crate::application::dataset;
use crate::application::deviation;
use crate::application::indicators;
use crate::application::levels;
use crate::application::similarity;
use crate::config::Config;
use crate::domain::errors::EngineError;
use crate::domain::market::{Candle, ChartKey, Level, Matrix};
use crate::domain::ports::{HistoryProvider, SnapshotProvider};
use crate::infrastructure::store::{ChartStore, DatasetBlock};

pub struct Engine {
    config: Config,
    store: ChartStore,
    pool: rayon::ThreadPool,
    assets: Vec<String>,
    scales: Vec<String>,
    charts: BTreeMap<ChartKey, Vec<Candle>>,
    levels: BTreeMap<String, Vec<Level>>,
    history: Option<Box<dyn HistoryProvider>>,
    snapshots: Option<Box<dyn SnapshotProvider>>,
}

impl Engine {
    pub fn new(config: Config, data_dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .map_err(|e| EngineError::config(format!("cannot build worker pool: {}", e)))?;
        Ok(Self {
            config,
            store: ChartStore::new(data_dir),
            pool,
            assets: Vec::new(),
            scales: Vec::new(),
            charts: BTreeMap::new(),
            levels: BTreeMap::new(),
            history: None,
            snapshots: None,
        })
    }

    /// Wires a historical-data source; without one, absent chart files are
    /// simply skipped.
    pub fn with_history(mut self, provider: Box<dyn HistoryProvider>) -> Self {
        self.history = Some(provider);
        self
    }

    /// Wires a live-data source for [`Engine::snapshot_features`].
    pub fn with_snapshots(mut self, provider: Box<dyn SnapshotProvider>) -> Self {
        self.snapshots = Some(provider);
        self
    }

    pub fn chart(&self, asset: &str, scale: &str) -> Option<&[Candle]> {
        self.charts
            .get(&ChartKey::new(asset, scale))
            .map(Vec::as_slice)
    }

    pub fn levels_of(&self, asset: &str) -> Option<&[Level]> {
        self.levels.get(asset).map(Vec::as_slice)
    }

    /// Runs every enabled stage in order. Artifacts of completed stages stay
    /// on disk even when a later stage fails.
    pub fn run(&mut self) -> Result<(), EngineError> {
        self.store.ensure_directories()?;
        self.assets = self.store.load_assets()?;
        self.scales = self.store.load_scales()?;
        info!(
            assets = self.assets.len(),
            scales = self.scales.len(),
            "starting pipeline"
        );

        self.load_charts()?;
        if self.config.required_self_similarities {
            self.run_self_similarities()?;
        }
        if self.config.required_pair_similarities {
            self.run_pair_similarities()?;
        }
        if self.config.required_pair_correlations {
            self.run_pair_correlations()?;
        }
        if self.config.required_tagged_charts || self.config.required_environment {
            self.run_levels()?;
            self.run_tagging()?;
        }
        if self.config.required_tagged_charts {
            self.save_tagged_dataset()?;
        }
        if self.config.required_environment {
            self.save_environment_dataset()?;
        }
        if self.config.required_price_deviations {
            self.dump_price_deviations()?;
        }
        info!("pipeline finished");
        Ok(())
    }

    /// Load stage: every (asset, scale) chart in parallel. A chart comes out
    /// of this stage parsed, chronological, with deviations and optional
    /// indicators computed; charts too short for the prediction horizon are
    /// dropped here.
    fn load_charts(&mut self) -> Result<(), EngineError> {
        let mut keys = Vec::new();
        for asset in &self.assets {
            for scale in &self.scales {
                keys.push(ChartKey::new(asset.clone(), scale.clone()));
            }
        }

        let config = &self.config;
        let store = &self.store;
        let history = self.history.as_deref();

        let loaded = self.pool.install(|| {
            keys.into_par_iter()
                .map(|key| -> Result<Option<(ChartKey, Vec<Candle>)>, EngineError> {
                    if let Some(provider) = history {
                        provider.materialize(
                            &key.asset,
                            &key.scale,
                            &store.chart_path(&key.asset, &key.scale),
                        )?;
                    }
                    let Some(mut candles) = store.load_candles(&key.asset, &key.scale)? else {
                        info!(asset = %key.asset, scale = %key.scale, "no chart file, skipping");
                        return Ok(None);
                    };
                    if candles.len() < 2 * config.prediction_timesteps {
                        info!(
                            asset = %key.asset,
                            scale = %key.scale,
                            candles = candles.len(),
                            "chart too short for the prediction horizon, skipping"
                        );
                        return Ok(None);
                    }
                    deviation::update_deviations(
                        &key.asset,
                        &key.scale,
                        &mut candles,
                        config.critical_deviation,
                    )?;
                    if let Some(window) = config.tema_timesteps {
                        indicators::tema(&mut candles, window)?;
                    }
                    if let Some(window) = config.cci_timesteps {
                        indicators::cci(&mut candles, window)?;
                    }
                    Ok(Some((key, candles)))
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        self.charts = loaded.into_iter().flatten().collect();
        info!(charts = self.charts.len(), "charts loaded");
        Ok(())
    }

    fn deviation_series(&self, asset: &str, scale: &str) -> Option<Vec<f64>> {
        self.charts
            .get(&ChartKey::new(asset, scale))
            .map(|candles| candles.iter().map(|c| c.price_deviation).collect())
    }

    /// DTW distances between every pair of timeframes of each asset. Pairs
    /// with a missing chart score 0 and are logged.
    fn run_self_similarities(&mut self) -> Result<(), EngineError> {
        let mut tasks = Vec::new();
        for asset in &self.assets {
            for i in 0..self.scales.len() {
                for j in i + 1..self.scales.len() {
                    tasks.push((asset.as_str(), i, j));
                }
            }
        }

        let config = &self.config;
        let engine = &*self;
        type Entry = (String, usize, usize, f64, Option<Matrix>);
        let results = self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|(asset, i, j)| -> Result<Entry, EngineError> {
                    let scale_1 = &engine.scales[i];
                    let scale_2 = &engine.scales[j];
                    let (Some(dev_1), Some(dev_2)) = (
                        engine.deviation_series(asset, scale_1),
                        engine.deviation_series(asset, scale_2),
                    ) else {
                        info!(asset, scale_1, scale_2, "chart pair incomplete, distance 0");
                        return Ok((asset.to_string(), i, j, 0.0, None));
                    };
                    let result =
                        similarity::self_similarity(&dev_1, &dev_2, config.dtw_band_width)?;
                    let dump = config
                        .cumulative_distances
                        .as_ref()
                        .filter(|target| target.matches(asset, scale_1, scale_2))
                        .map(|_| result.cumulative);
                    Ok((asset.to_string(), i, j, result.distance, dump))
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut blocks: Vec<(String, Matrix)> = self
            .assets
            .iter()
            .map(|asset| (asset.clone(), Matrix::square(self.scales.len())))
            .collect();
        let mut dump = None;
        for (asset, i, j, distance, cumulative) in results {
            if let Some(block) = blocks.iter_mut().find(|(name, _)| *name == asset) {
                block.1.set(i, j, distance);
                block.1.set(j, i, distance);
            }
            if cumulative.is_some() {
                dump = cumulative;
            }
        }

        self.store.save_self_similarities(&blocks)?;
        if let Some(matrix) = dump {
            self.store.save_cumulative_distances(&matrix)?;
        }
        info!("self-similarities saved");
        Ok(())
    }

    /// Shared shape of the two cross-asset stages: per timeframe, one
    /// asset-by-asset matrix filled pairwise in parallel.
    fn run_asset_pair_stage<F>(
        &self,
        diagonal: f64,
        measure: F,
    ) -> Result<Vec<(String, Matrix)>, EngineError>
    where
        F: Fn(&[f64], &[f64]) -> Result<f64, EngineError> + Sync,
    {
        let mut tasks = Vec::new();
        for scale in &self.scales {
            for i in 0..self.assets.len() {
                for j in i + 1..self.assets.len() {
                    tasks.push((scale.as_str(), i, j));
                }
            }
        }

        let engine = &*self;
        let results = self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|(scale, i, j)| -> Result<(String, usize, usize, f64), EngineError> {
                    let asset_1 = &engine.assets[i];
                    let asset_2 = &engine.assets[j];
                    let (Some(dev_1), Some(dev_2)) = (
                        engine.deviation_series(asset_1, scale),
                        engine.deviation_series(asset_2, scale),
                    ) else {
                        info!(scale, asset_1, asset_2, "chart pair incomplete, value 0");
                        return Ok((scale.to_string(), i, j, 0.0));
                    };
                    Ok((scale.to_string(), i, j, measure(&dev_1, &dev_2)?))
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut blocks: Vec<(String, Matrix)> = self
            .scales
            .iter()
            .map(|scale| {
                let mut matrix = Matrix::square(self.assets.len());
                for d in 0..self.assets.len() {
                    matrix.set(d, d, diagonal);
                }
                (scale.clone(), matrix)
            })
            .collect();
        for (scale, i, j, value) in results {
            if let Some(block) = blocks.iter_mut().find(|(name, _)| *name == scale) {
                block.1.set(i, j, value);
                block.1.set(j, i, value);
            }
        }
        Ok(blocks)
    }

    fn run_pair_similarities(&mut self) -> Result<(), EngineError> {
        let blocks = self.run_asset_pair_stage(0.0, similarity::pair_similarity)?;
        self.store.save_pair_similarities(&blocks)?;
        info!("pair similarities saved");
        Ok(())
    }

    fn run_pair_correlations(&mut self) -> Result<(), EngineError> {
        let blocks = self.run_asset_pair_stage(1.0, similarity::pair_correlation)?;
        self.store.save_pair_correlations(&blocks)?;
        info!("pair correlations saved");
        Ok(())
    }

    /// Level stage: detect per asset on the configured resolution chart,
    /// optionally reduce, persist, then stamp supports/resistances onto
    /// every chart of the asset.
    fn run_levels(&mut self) -> Result<(), EngineError> {
        let config = &self.config;
        let engine = &*self;
        let detected = self.pool.install(|| {
            engine
                .assets
                .par_iter()
                .map(|asset| {
                    let key = ChartKey::new(asset.clone(), config.level_resolution.clone());
                    let Some(candles) = engine.charts.get(&key) else {
                        info!(asset = %asset, resolution = %config.level_resolution,
                            "no chart at level resolution, no levels");
                        return (asset.clone(), Vec::new());
                    };
                    let mut found = levels::detect_levels(candles, config.level_frame);
                    if config.required_level_reduction {
                        found = levels::reduce_levels(found, config.level_max_deviation);
                    }
                    found.sort_by(|a, b| a.begin.cmp(&b.begin));
                    (asset.clone(), found)
                })
                .collect::<Vec<_>>()
        });

        self.levels = detected.into_iter().collect();

        let blocks: Vec<(&str, &[Level])> = self
            .levels
            .iter()
            .map(|(asset, levels)| (asset.as_str(), levels.as_slice()))
            .collect();
        self.store.save_supports_resistances(&blocks)?;

        let levels = &self.levels;
        let charts = &mut self.charts;
        self.pool.install(|| {
            charts.par_iter_mut().for_each(|(key, candles)| {
                if let Some(asset_levels) = levels.get(&key.asset) {
                    levels::assign_supports_resistances(candles, asset_levels);
                }
            });
        });
        info!(assets = self.levels.len(), "levels saved and assigned");
        Ok(())
    }

    /// Tagging stage: regression targets, zigzag classification and movement
    /// tags for every chart. Movement-reference bars are snapshotted into
    /// read-only per-asset arrays first, so the parallel pass never reads a
    /// chart it might also be writing.
    fn run_tagging(&mut self) -> Result<(), EngineError> {
        let mut reference: BTreeMap<String, Vec<ReferenceBar>> = BTreeMap::new();
        for asset in &self.assets {
            let key = ChartKey::new(asset.clone(), self.config.movement_scale.clone());
            match self.charts.get(&key) {
                Some(candles) => {
                    reference.insert(
                        asset.clone(),
                        candles.iter().map(ReferenceBar::from_candle).collect(),
                    );
                }
                None => {
                    warn!(asset = %asset, scale = %self.config.movement_scale,
                        "no movement-reference chart, movement tags stay 0");
                }
            }
        }

        let config = &self.config;
        let charts = &mut self.charts;
        let reference = &reference;
        self.pool.install(|| {
            charts
                .par_iter_mut()
                .map(|(key, candles)| -> Result<(), EngineError> {
                    classification::update_regression_tags(candles, config.prediction_timesteps)?;
                    classification::update_classification_tags(
                        candles,
                        config.min_price_change,
                        config.max_price_rollback,
                    );
                    if let Some(bars) = reference.get(&key.asset) {
                        classification::update_movement_tags(
                            &key.asset,
                            &key.scale,
                            candles,
                            bars,
                            config.movement_hour,
                        );
                    }
                    Ok(())
                })
                .collect::<Result<(), _>>()
        })?;
        info!("charts tagged");
        Ok(())
    }

    fn save_tagged_dataset(&self) -> Result<(), EngineError> {
        let config = &self.config;
        let blocks = self.pool.install(|| {
            self.charts
                .par_iter()
                .map(|(key, candles)| DatasetBlock {
                    asset: key.asset.clone(),
                    scale: key.scale.clone(),
                    rows: candles
                        .iter()
                        .map(|candle| dataset::tagged_row(candle, &key.scale, config))
                        .collect(),
                })
                .collect::<Vec<_>>()
        });
        self.store.save_dataset("tagged_charts.csv", &blocks)?;
        info!("tagged dataset saved");
        Ok(())
    }

    fn save_environment_dataset(&self) -> Result<(), EngineError> {
        let config = &self.config;
        let blocks = self.pool.install(|| {
            self.charts
                .par_iter()
                .map(|(key, candles)| DatasetBlock {
                    asset: key.asset.clone(),
                    scale: key.scale.clone(),
                    rows: (0..candles.len())
                        .filter_map(|i| dataset::environment_row(candles, i, &key.scale, config))
                        .collect(),
                })
                .collect::<Vec<_>>()
        });
        self.store.save_dataset("environment.csv", &blocks)?;
        info!("environment dataset saved");
        Ok(())
    }

    fn dump_price_deviations(&self) -> Result<(), EngineError> {
        let blocks: Vec<(&str, &str, &[Candle])> = self
            .charts
            .iter()
            .map(|(key, candles)| (key.asset.as_str(), key.scale.as_str(), candles.as_slice()))
            .collect();
        self.store.save_price_deviations(&blocks)?;
        info!("price deviations saved");
        Ok(())
    }

    /// Live feature row of the newest candle of a chart, via the wired
    /// snapshot source. Levels from the last `run()` are applied, so this is
    /// meant to be called on an engine that has already run.
    pub fn snapshot_features(
        &self,
        asset: &str,
        scale: &str,
        count: usize,
    ) -> Result<Vec<String>, EngineError> {
        let provider = self
            .snapshots
            .as_deref()
            .ok_or_else(|| EngineError::config("no snapshot provider wired"))?;
        let raw = provider.fetch(asset, scale, count)?;
        let mut candles = ChartStore::parse_chart(&raw)?;
        if candles.is_empty() {
            return Err(EngineError::Snapshot {
                asset: asset.to_string(),
                scale: scale.to_string(),
                reason: "empty snapshot payload".to_string(),
            });
        }
        deviation::update_deviations(asset, scale, &mut candles, self.config.critical_deviation)?;
        if let Some(asset_levels) = self.levels.get(asset) {
            levels::assign_supports_resistances(&mut candles, asset_levels);
        }
        let newest = candles.len() - 1;
        dataset::snapshot_row(&candles, newest, scale, &self.config).ok_or_else(|| {
            EngineError::Snapshot {
                asset: asset.to_string(),
                scale: scale.to_string(),
                reason: "snapshot too short for a feature row".to_string(),
            }
        })
    }
}
