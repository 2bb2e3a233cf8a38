use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the chart analytics engine.
///
/// Soft conditions (a chart too short for the prediction horizon, an
/// unmatched movement-reference candle) are not errors: the affected unit of
/// work is logged and omitted instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse candle line {line:?}: {reason}")]
    Parse { line: String, reason: String },

    #[error("domain error: {0}")]
    Domain(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no chart loaded for {asset} {scale}")]
    MissingChart { asset: String, scale: String },

    #[error("snapshot source failed for {asset} {scale}: {reason}")]
    Snapshot {
        asset: String,
        scale: String,
        reason: String,
    },
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn domain(reason: impl Into<String>) -> Self {
        EngineError::Domain(reason.into())
    }

    pub fn config(reason: impl Into<String>) -> Self {
        EngineError::Config(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting_carries_context() {
        let err = EngineError::MissingChart {
            asset: "GAZP".to_string(),
            scale: "M60".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("GAZP"));
        assert!(msg.contains("M60"));
    }

    #[test]
    fn test_parse_error_quotes_line() {
        let err = EngineError::Parse {
            line: "20200101,??".to_string(),
            reason: "bad time field".to_string(),
        };
        assert!(err.to_string().contains("\"20200101,??\""));
    }
}
