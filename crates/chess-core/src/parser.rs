//! Game record parser: raw archive text -> deduplicated `GameRecord`s.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::StoreError;
use crate::game_data::{GameKey, GameRecord, PlayedAs};
use crate::pgn::{self, GameUnit};
use crate::store::{self, Saved};

/// Outcome of parsing one blob.
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub records: Vec<GameRecord>,
    /// Units seen in the blob, including dropped ones.
    pub units: usize,
    /// Units collapsed into an earlier record with the same key.
    pub duplicates: usize,
    /// Records where the configured username is neither White nor Black.
    pub unmatched: usize,
    /// A trailing unit without a termination marker was ignored.
    pub truncated_tail: bool,
}

/// Build one record from a game unit. `None` for units with neither tags nor moves.
pub fn parse_unit(
    unit: &GameUnit<'_>,
    base_offset: u64,
    username: &str,
    source_file: &str,
) -> Option<GameRecord> {
    let headers = unit.headers();
    let replayed = pgn::replay_game(&unit.game);

    if headers.is_empty() && replayed.plies() == 0 {
        return None;
    }

    if let Some((ply, san)) = &replayed.stopped_at {
        warn!(
            site = headers.get("Site").map(String::as_str).unwrap_or(""),
            ply,
            san = san.as_str(),
            "Movetext stopped replaying; keeping plies up to the last legal move"
        );
    }

    let white = pgn::header_or_unknown(&headers, "White");
    let played_as = PlayedAs::derive(&white, username);

    Some(GameRecord {
        black: pgn::header_or_unknown(&headers, "Black"),
        result: pgn::header_or_unknown(&headers, "Result"),
        date: pgn::date_or_unknown(&headers),
        time_control: pgn::header_or_unknown(&headers, "TimeControl"),
        eco: pgn::header_or_unknown(&headers, "ECO"),
        opening: pgn::opening_name(&headers),
        termination: pgn::header_or_unknown(&headers, "Termination"),
        ply_count: replayed.plies() as u32,
        played_as,
        source_file: source_file.to_string(),
        site: pgn::header_or_unknown(&headers, "Site"),
        locator: unit.locator(base_offset),
        white,
    })
}

/// Parse every game unit of `raw`.
///
/// `base_offset` is where `raw` starts inside the archive store, so that
/// locators stay archive-relative when only a delta is parsed. Never fails:
/// an empty blob yields no records and a truncated trailing unit is dropped.
pub fn parse(raw: &str, username: &str, source_file: &str, base_offset: u64) -> ParseReport {
    let mut report = ParseReport::default();
    let mut index: HashMap<GameKey, usize> = HashMap::new();
    let mut units = pgn::split_games(raw).peekable();

    while let Some(unit) = units.next() {
        report.units += 1;

        if units.peek().is_none() && !unit.is_terminated() {
            warn!(offset = unit.offset, "Ignoring truncated trailing game");
            report.truncated_tail = true;
            break;
        }

        let Some(record) = parse_unit(&unit, base_offset, username, source_file) else {
            continue;
        };

        if record.white != username && record.black != username {
            report.unmatched += 1;
            warn!(
                white = record.white.as_str(),
                black = record.black.as_str(),
                username,
                "Username matches neither player; recording as Black"
            );
        }

        match index.get(&record.key()) {
            Some(&i) => {
                report.duplicates += 1;
                report.records[i] = record;
            }
            None => {
                index.insert(record.key(), report.records.len());
                report.records.push(record);
            }
        }
    }

    report
}

/// Union of two record sets keyed by (site, date, white, black).
///
/// On a key collision the new record replaces the existing one in place;
/// new keys are appended in encounter order.
pub fn merge_incremental(existing: Vec<GameRecord>, new: Vec<GameRecord>) -> Vec<GameRecord> {
    let mut merged: Vec<GameRecord> = Vec::with_capacity(existing.len() + new.len());
    let mut index: HashMap<GameKey, usize> = HashMap::new();

    for record in existing.into_iter().chain(new) {
        match index.get(&record.key()) {
            Some(&i) => merged[i] = record,
            None => {
                index.insert(record.key(), merged.len());
                merged.push(record);
            }
        }
    }
    merged
}

/// Parser bound to a tracked user and a parsed-games file.
pub struct GameParser {
    username: String,
    parsed_games_file: PathBuf,
}

impl GameParser {
    pub fn new(username: impl Into<String>, parsed_games_file: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            parsed_games_file: parsed_games_file.into(),
        }
    }

    pub fn parsed_games_file(&self) -> &Path {
        &self.parsed_games_file
    }

    /// Parse the whole archive and replace the parsed-games file.
    pub fn parse_archive(&self, raw: &str, source_file: &str) -> Saved<ParseReport> {
        let report = parse(raw, &self.username, source_file, 0);
        info!(
            games = report.records.len(),
            units = report.units,
            duplicates = report.duplicates,
            unmatched = report.unmatched,
            "Parsed archive"
        );
        let saved = store::save_json(&self.parsed_games_file, &report.records);
        if saved.is_ok() {
            info!(
                count = report.records.len(),
                path = %self.parsed_games_file.display(),
                "Saved parsed games"
            );
        }
        Saved::new(report, saved)
    }

    /// Parse a delta blob that was appended at `base_offset` and merge it
    /// into the persisted set.
    pub fn parse_delta(&self, delta: &str, source_file: &str, base_offset: u64) -> Saved<Vec<GameRecord>> {
        let report = parse(delta, &self.username, source_file, base_offset);
        self.append_to_parsed_data(report.records)
    }

    /// Merge `new_records` into the persisted set and save the union.
    pub fn append_to_parsed_data(&self, new_records: Vec<GameRecord>) -> Saved<Vec<GameRecord>> {
        let existing = match self.load() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Could not read existing parsed data");
                Vec::new()
            }
        };
        let added = new_records.len();
        let merged = merge_incremental(existing, new_records);
        let saved = store::save_json(&self.parsed_games_file, &merged);
        if saved.is_ok() {
            info!(added, total = merged.len(), "Updated parsed data");
        }
        Saved::new(merged, saved)
    }

    pub fn load(&self) -> Result<Vec<GameRecord>, StoreError> {
        store::load_records(&self.parsed_games_file)
    }
}
