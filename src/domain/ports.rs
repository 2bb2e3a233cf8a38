//! Trait seams for the external collaborators of the engine.
//!
//! The engine itself never talks to a trading terminal or a remote data
//! vendor; it only consumes these two ports. Hosts wire their own
//! implementations in, tests wire fakes.

use crate::domain::errors::EngineError;
use std::path::Path;

/// Supplies the most recent raw candle rows for a chart, newest first, in the
/// candle-file line grammar. The engine parses the payload exactly like a
/// loaded file.
pub trait SnapshotProvider: Send + Sync {
    fn fetch(&self, asset: &str, scale: &str, count: usize) -> Result<String, EngineError>;
}

/// Materializes the historical candle file for a chart before it is read.
///
/// On return the file either exists at `path` or is absent; the loader treats
/// absence as "skip this chart, log and continue".
pub trait HistoryProvider: Send + Sync {
    fn materialize(&self, asset: &str, scale: &str, path: &Path) -> Result<(), EngineError>;
}
