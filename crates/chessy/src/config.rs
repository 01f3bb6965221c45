use std::env;
use std::path::{Path, PathBuf};

use analysis_worker::AnalyzerConfig;
use archive_sync::SyncConfig;

use crate::error::ServiceError;

#[derive(Clone, Debug)]
pub struct Config {
    pub output_dir: PathBuf,
    /// `None` when no username is configured
    pub sync: Option<SyncConfig>,
    pub analyzer: AnalyzerConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let output_dir = PathBuf::from(
            env::var("CHESSY_OUTPUT_DIR").unwrap_or_else(|_| "output".to_string()),
        );
        let sync = SyncConfig::from_env(games_dir(&output_dir)).ok();
        let analyzer = AnalyzerConfig::from_env(analysis_file(&output_dir));
        Self {
            output_dir,
            sync,
            analyzer,
        }
    }

    /// Defaults for `username` under `output_dir`, without an engine.
    pub fn for_user(output_dir: impl Into<PathBuf>, username: &str) -> Self {
        let output_dir = output_dir.into();
        Self {
            sync: Some(SyncConfig::new(username, games_dir(&output_dir))),
            analyzer: AnalyzerConfig::new(analysis_file(&output_dir)),
            output_dir,
        }
    }

    pub fn sync_config(&self) -> Result<&SyncConfig, ServiceError> {
        self.sync
            .as_ref()
            .ok_or_else(|| ServiceError::Config("CHESSCOM_USERNAME not set".into()))
    }

    pub fn username(&self) -> Result<&str, ServiceError> {
        Ok(&self.sync_config()?.username)
    }

    pub fn games_dir(&self) -> PathBuf {
        games_dir(&self.output_dir)
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.output_dir.join("analysis")
    }

    pub fn parsed_games_file(&self) -> Result<PathBuf, ServiceError> {
        Ok(self
            .analysis_dir()
            .join(format!("{}_games_parsed.json", self.username()?)))
    }

    pub fn eco_csv_file(&self) -> Result<PathBuf, ServiceError> {
        Ok(self
            .analysis_dir()
            .join(format!("{}_eco_performance.csv", self.username()?)))
    }
}

fn games_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("games")
}

fn analysis_file(output_dir: &Path) -> PathBuf {
    output_dir.join("analysis").join("game_analysis.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let cfg = Config::for_user("out", "alice");
        assert_eq!(cfg.parsed_games_file().unwrap(), PathBuf::from("out/analysis/alice_games_parsed.json"));
        assert_eq!(cfg.eco_csv_file().unwrap(), PathBuf::from("out/analysis/alice_eco_performance.csv"));
        assert_eq!(cfg.analyzer.analysis_file, PathBuf::from("out/analysis/game_analysis.json"));
        assert_eq!(cfg.sync_config().unwrap().archive_file(), PathBuf::from("out/games/alice_GameArchive.pgn"));
    }

    #[test]
    fn test_missing_username_is_config_error() {
        let cfg = Config {
            sync: None,
            ..Config::for_user("out", "alice")
        };
        assert!(matches!(cfg.parsed_games_file(), Err(ServiceError::Config(_))));
    }
}
