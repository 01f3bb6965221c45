//! Raw archive store: the append-only PGN blob, the sync watermark and the
//! per-run delta files.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chess_core::pgn::{self, GameUnit};
use chess_core::store as files;
use chess_core::StoreError;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config;
use crate::period::PeriodKey;

pub struct ArchiveStore {
    games_dir: PathBuf,
    username: String,
    archive_file: PathBuf,
    watermark_file: PathBuf,
}

/// Identity of a raw game for append dedup: its `Link` tag, or the exact
/// text for games without one. Rematches on the same day between the same
/// players stay distinct; collapsing by (site, date, white, black) is left
/// to the parser.
pub fn game_identity(unit: &GameUnit<'_>) -> String {
    unit.game
        .tags
        .iter()
        .find(|(name, value)| name == "Link" && !value.trim().is_empty())
        .map(|(_, link)| format!("link:{}", link.trim()))
        .unwrap_or_else(|| format!("text:{}", unit.text))
}

impl ArchiveStore {
    pub fn new(games_dir: impl Into<PathBuf>, username: impl Into<String>) -> Self {
        let games_dir = games_dir.into();
        let username = username.into();
        Self {
            archive_file: config::archive_file(&games_dir, &username),
            watermark_file: games_dir.join("last_downloaded.txt"),
            games_dir,
            username,
        }
    }

    pub fn archive_file(&self) -> &Path {
        &self.archive_file
    }

    pub fn read_archive(&self) -> Result<String, StoreError> {
        files::read_text(&self.archive_file)
    }

    /// Append `text` and return the byte offset it starts at.
    pub fn append(&self, text: &str) -> Result<u64, StoreError> {
        let offset = files::file_len(&self.archive_file)?;
        files::append_text(&self.archive_file, text)?;
        Ok(offset)
    }

    /// Identities of every game already in `archive`.
    pub fn known_games(archive: &str) -> HashSet<String> {
        pgn::split_games(archive).map(|unit| game_identity(&unit)).collect()
    }

    /// The persisted watermark. An unreadable value is ignored so that the
    /// next sync refetches everything and dedup absorbs the overlap.
    pub fn watermark(&self) -> Result<Option<PeriodKey>, StoreError> {
        let text = files::read_text(&self.watermark_file)?;
        let value = text.trim();
        if value.is_empty() {
            return Ok(None);
        }
        match PeriodKey::parse(value) {
            Some(key) => Ok(Some(key)),
            None => {
                warn!(value, "Ignoring unrecognized watermark");
                Ok(None)
            }
        }
    }

    /// Move the watermark to `key`; it never moves backwards.
    pub fn advance_watermark(&self, key: PeriodKey) -> Result<PeriodKey, StoreError> {
        let current = self.watermark()?;
        if current.is_some_and(|c| c >= key) {
            return Ok(current.unwrap_or(key));
        }
        files::write_atomic(&self.watermark_file, key.to_string().as_bytes())?;
        info!(watermark = %key, "Advanced sync watermark");
        Ok(key)
    }

    /// Write this run's new games to a dated file for inspection.
    pub fn write_delta(&self, text: &str, date: NaiveDate) -> Result<PathBuf, StoreError> {
        let path = config::delta_file(&self.games_dir, &self.username, date);
        files::write_atomic(&path, text.as_bytes())?;
        Ok(path)
    }

    /// Empty the archive and forget the watermark.
    pub fn clear(&self) -> Result<(), StoreError> {
        files::write_atomic(&self.archive_file, b"")?;
        match fs::remove_file(&self.watermark_file) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&self.watermark_file, e)),
        }
        info!(archive = %self.archive_file.display(), "Cleared archive store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path(), "alice");
        assert_eq!(store.watermark().unwrap(), None);

        let mar = PeriodKey::new(2024, 3).unwrap();
        let jan = PeriodKey::new(2024, 1).unwrap();
        assert_eq!(store.advance_watermark(mar).unwrap(), mar);
        assert_eq!(store.advance_watermark(jan).unwrap(), mar);
        assert_eq!(store.watermark().unwrap(), Some(mar));
    }

    #[test]
    fn test_legacy_timestamp_watermark_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("last_downloaded.txt"), "2025.03.01-10.00.00").unwrap();
        let store = ArchiveStore::new(dir.path(), "alice");
        assert_eq!(store.watermark().unwrap(), None);
    }

    #[test]
    fn test_append_offsets_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path(), "alice");
        assert_eq!(store.append("abc\n").unwrap(), 0);
        assert_eq!(store.append("def\n").unwrap(), 4);
        store.advance_watermark(PeriodKey::new(2024, 1).unwrap()).unwrap();

        store.clear().unwrap();
        assert_eq!(store.read_archive().unwrap(), "");
        assert_eq!(store.watermark().unwrap(), None);
    }

    #[test]
    fn test_known_games_by_link_or_text() {
        let linked = "[Site \"s1\"]\n[White \"a\"]\n[Black \"b\"]\n[Link \"https://www.chess.com/game/live/1\"]\n\n1. e4 1-0";
        let rematch = "[Site \"s1\"]\n[White \"a\"]\n[Black \"b\"]\n[Link \"https://www.chess.com/game/live/2\"]\n\n1. d4 0-1";
        let bare = "[Site \"s1\"]\n[White \"a\"]\n[Black \"b\"]\n\n1. c4 1-0";
        let archive = format!("{linked}\n\n{rematch}\n\n{bare}\n\n");

        let known = ArchiveStore::known_games(&archive);
        assert_eq!(known.len(), 3);
        assert!(known.contains("link:https://www.chess.com/game/live/2"));
        assert!(known.contains(&format!("text:{bare}")));
    }
}
