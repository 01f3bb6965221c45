//! Analyzer configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
    /// Path to Stockfish binary; unset or missing runs in degraded mode
    pub stockfish_path: Option<PathBuf>,

    /// Search depth per position
    pub depth: u32,

    /// Wall-clock cap per position
    pub movetime: Duration,

    /// Where the analysis records are written
    pub analysis_file: PathBuf,
}

impl AnalyzerConfig {
    pub fn new(analysis_file: impl Into<PathBuf>) -> Self {
        Self {
            stockfish_path: None,
            depth: 18,
            movetime: Duration::from_millis(100),
            analysis_file: analysis_file.into(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env(analysis_file: impl Into<PathBuf>) -> Self {
        let stockfish_path = env::var("STOCKFISH_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let depth = env::var("STOCKFISH_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(18);

        let movetime = env::var("STOCKFISH_MOVETIME_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(100));

        Self {
            stockfish_path,
            depth,
            movetime,
            analysis_file: analysis_file.into(),
        }
    }

    /// Engine path, if one is configured and exists on disk.
    pub fn engine_path(&self) -> Option<&PathBuf> {
        self.stockfish_path.as_ref().filter(|p| p.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_engine_path() {
        let mut cfg = AnalyzerConfig::new("analysis.json");
        assert!(cfg.engine_path().is_none());
        cfg.stockfish_path = Some(PathBuf::from("/definitely/not/stockfish"));
        assert!(cfg.engine_path().is_none());
    }
}
