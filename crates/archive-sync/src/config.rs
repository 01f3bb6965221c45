//! Synchronizer configuration from environment variables

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::SyncError;

pub const DEFAULT_CONTACT: &str = "Not Provided";

/// Request pacing and throttling behavior for period fetches.
#[derive(Clone, Debug)]
pub struct RatePolicy {
    /// Minimum gap between the starts of two successive period requests
    pub request_delay: Duration,

    /// Sleep after an HTTP 429 before retrying the same request
    pub rate_limit_backoff: Duration,

    /// Retries of one request after a 429, 5xx or transport error
    pub max_retries: u32,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(1000),
            rate_limit_backoff: Duration::from_secs(60),
            max_retries: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Chess.com username whose archives are synchronized
    pub username: String,

    /// Contact address put in the User-Agent
    pub contact_email: String,

    /// Directory holding the archive, watermark and delta files
    pub games_dir: PathBuf,

    /// Concurrent period fetches
    pub workers: usize,

    pub rate: RatePolicy,
}

impl SyncConfig {
    pub fn new(username: impl Into<String>, games_dir: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            contact_email: DEFAULT_CONTACT.to_string(),
            games_dir: games_dir.into(),
            workers: 5,
            rate: RatePolicy::default(),
        }
    }

    /// Load configuration from environment variables. Only the username is
    /// required; everything else falls back to defaults.
    pub fn from_env(games_dir: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let username = env::var("CHESSCOM_USERNAME")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SyncError::Config("CHESSCOM_USERNAME not set".into()))?;

        let contact_email = env::var("CHESSCOM_CONTACT_EMAIL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTACT.to_string());

        let workers = env_parse("CHESSY_FETCH_WORKERS").unwrap_or(5usize).max(1);

        let defaults = RatePolicy::default();
        let rate = RatePolicy {
            request_delay: env_parse("CHESSY_REQUEST_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            rate_limit_backoff: env_parse("CHESSY_RATE_LIMIT_BACKOFF_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_backoff),
            max_retries: env_parse("CHESSY_MAX_RETRIES").unwrap_or(defaults.max_retries),
        };

        Ok(Self {
            username,
            contact_email,
            games_dir: games_dir.into(),
            workers,
            rate,
        })
    }

    pub fn archive_file(&self) -> PathBuf {
        archive_file(&self.games_dir, &self.username)
    }

    pub fn watermark_file(&self) -> PathBuf {
        self.games_dir.join("last_downloaded.txt")
    }
}

pub fn archive_file(games_dir: &Path, username: &str) -> PathBuf {
    games_dir.join(format!("{username}_GameArchive.pgn"))
}

/// Per-run delta file, e.g. `alice_GameArchive_2025.03.14.pgn`.
pub fn delta_file(games_dir: &Path, username: &str, date: NaiveDate) -> PathBuf {
    games_dir.join(format!(
        "{username}_GameArchive_{}.pgn",
        date.format("%Y.%m.%d")
    ))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let cfg = SyncConfig::new("alice", "out/games");
        assert_eq!(cfg.archive_file(), PathBuf::from("out/games/alice_GameArchive.pgn"));
        assert_eq!(cfg.watermark_file(), PathBuf::from("out/games/last_downloaded.txt"));
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(
            delta_file(&cfg.games_dir, "alice", date),
            PathBuf::from("out/games/alice_GameArchive_2025.03.04.pgn")
        );
    }

    #[test]
    fn test_default_rate_policy() {
        let rate = RatePolicy::default();
        assert_eq!(rate.request_delay, Duration::from_secs(1));
        assert_eq!(rate.rate_limit_backoff, Duration::from_secs(60));
        assert_eq!(rate.max_retries, 1);
    }
}
