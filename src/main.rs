//! Chartmill - batch chart analytics
//!
//! Reads the asset/timeframe universe and candle files from a data
//! directory, runs the staged analytics pipeline and writes the similarity
//! matrices, support/resistance levels and ML dataset files back into it.
//!
//! # Usage
//! ```sh
//! RUST_LOG=info chartmill --data-dir ./data --config ./config.json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use chartmill::application::pipeline::Engine;
use chartmill::config::Config;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "chartmill", version, about = "Batch chart analytics pipeline")]
struct Args {
    /// Data directory holding assets.txt, scales.txt and charts/
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Configuration file; missing file means built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker thread override; 0 picks the machine default
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("chartmill {} starting", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var("CHARTMILL_CONFIG").ok().map(PathBuf::from));
    let mut config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    let mut engine = Engine::new(config, &args.data_dir)?;
    engine.run()?;
    Ok(())
}
