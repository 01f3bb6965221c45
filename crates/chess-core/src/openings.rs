//! Opening (ECO) performance: per-code win/draw/loss tallies split by the
//! color the tracked user played.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StoreError;
use crate::game_data::{GameRecord, PlayedAs};
use crate::store::{self, Saved};

/// (games, wins, draws, losses) for one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideTally {
    pub games: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
}

impl SideTally {
    fn record(&mut self, score: i8) {
        self.games += 1;
        match score {
            1 => self.wins += 1,
            0 => self.draws += 1,
            _ => self.losses += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpeningTally {
    pub white: SideTally,
    pub black: SideTally,
}

impl OpeningTally {
    pub fn total_games(&self) -> u32 {
        self.white.games + self.black.games
    }
}

/// Tallies keyed by opening code, iterated in ascending code order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpeningPerformance {
    pub by_code: BTreeMap<String, OpeningTally>,
}

/// One row of the persisted table. Column names are part of the file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningRow {
    #[serde(rename = "ECO")]
    pub eco: String,
    #[serde(rename = "White_Games")]
    pub white_games: u32,
    #[serde(rename = "White_Wins")]
    pub white_wins: u32,
    #[serde(rename = "White_Draws")]
    pub white_draws: u32,
    #[serde(rename = "White_Losses")]
    pub white_losses: u32,
    #[serde(rename = "Black_Games")]
    pub black_games: u32,
    #[serde(rename = "Black_Wins")]
    pub black_wins: u32,
    #[serde(rename = "Black_Draws")]
    pub black_draws: u32,
    #[serde(rename = "Black_Losses")]
    pub black_losses: u32,
    #[serde(rename = "Total_Games")]
    pub total_games: u32,
}

/// Fold records into per-opening tallies.
///
/// Records without an opening code or with an unrecognized result are left
/// out entirely. Pure: the same input always gives the same table.
pub fn aggregate(records: &[GameRecord]) -> OpeningPerformance {
    let mut perf = OpeningPerformance::default();

    for record in records {
        if !record.has_opening_code() {
            continue;
        }
        let Some(outcome) = record.outcome() else {
            continue;
        };

        let tally = perf.by_code.entry(record.eco.trim().to_string()).or_default();
        let side = match record.played_as {
            PlayedAs::White => &mut tally.white,
            PlayedAs::Black => &mut tally.black,
        };
        side.record(outcome.score_for(record.played_as));
    }

    perf
}

impl OpeningPerformance {
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    pub fn rows(&self) -> Vec<OpeningRow> {
        self.by_code
            .iter()
            .map(|(eco, t)| OpeningRow {
                eco: eco.clone(),
                white_games: t.white.games,
                white_wins: t.white.wins,
                white_draws: t.white.draws,
                white_losses: t.white.losses,
                black_games: t.black.games,
                black_wins: t.black.wins,
                black_draws: t.black.draws,
                black_losses: t.black.losses,
                total_games: t.total_games(),
            })
            .collect()
    }

    /// CSV text: one header row, one row per code, sorted by code.
    pub fn to_csv(&self) -> Result<String, StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let rows = self.rows();
        if rows.is_empty() {
            writer.write_record(HEADER)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::io("<csv buffer>", e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

const HEADER: [&str; 10] = [
    "ECO",
    "White_Games",
    "White_Wins",
    "White_Draws",
    "White_Losses",
    "Black_Games",
    "Black_Wins",
    "Black_Draws",
    "Black_Losses",
    "Total_Games",
];

/// Aggregate and replace the CSV file at `path`.
pub fn aggregate_and_save(records: &[GameRecord], path: &Path) -> Saved<OpeningPerformance> {
    let perf = aggregate(records);
    let saved = perf
        .to_csv()
        .and_then(|csv| store::write_atomic(path, csv.as_bytes()));
    if saved.is_ok() {
        info!(openings = perf.len(), path = %path.display(), "ECO statistics saved");
    }
    Saved::new(perf, saved)
}

/// Read the persisted table back. A missing file is an empty table.
pub fn load_rows(path: &Path) -> Result<Vec<OpeningRow>, StoreError> {
    let text = store::read_text(path)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_data::{GameLocator, UNKNOWN};

    fn rec(eco: &str, played_as: PlayedAs, result: &str) -> GameRecord {
        GameRecord {
            white: "w".into(),
            black: "b".into(),
            result: result.into(),
            date: "2025.01.01".into(),
            time_control: "600".into(),
            eco: eco.into(),
            opening: UNKNOWN.into(),
            termination: UNKNOWN.into(),
            ply_count: 10,
            played_as,
            source_file: "a.pgn".into(),
            site: "s".into(),
            locator: GameLocator::default(),
        }
    }

    #[test]
    fn test_mirrored_attribution() {
        let records = vec![
            rec("C20", PlayedAs::White, "1-0"),
            rec("C20", PlayedAs::White, "0-1"),
            rec("C20", PlayedAs::Black, "1/2-1/2"),
            rec("C20", PlayedAs::Black, "0-1"),
            rec("C20", PlayedAs::Black, "1-0"),
        ];
        let perf = aggregate(&records);
        let t = perf.by_code["C20"];
        assert_eq!(t.white, SideTally { games: 2, wins: 1, draws: 0, losses: 1 });
        assert_eq!(t.black, SideTally { games: 3, wins: 1, draws: 1, losses: 1 });
        assert_eq!(t.total_games(), 5);
    }

    #[test]
    fn test_unknown_code_or_result_dropped() {
        let records = vec![
            rec(UNKNOWN, PlayedAs::White, "1-0"),
            rec("", PlayedAs::White, "1-0"),
            rec("B01", PlayedAs::White, "*"),
            rec("B01", PlayedAs::White, UNKNOWN),
        ];
        assert!(aggregate(&records).is_empty());
    }

    #[test]
    fn test_csv_sorted_and_deterministic() {
        let records = vec![
            rec("C20", PlayedAs::White, "1-0"),
            rec("A00", PlayedAs::Black, "0-1"),
            rec("B12", PlayedAs::White, "1/2-1/2"),
        ];
        let first = aggregate(&records).to_csv().unwrap();
        let second = aggregate(&records).to_csv().unwrap();
        assert_eq!(first, second);

        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines[0], HEADER.join(","));
        assert!(lines[1].starts_with("A00,"));
        assert!(lines[2].starts_with("B12,"));
        assert_eq!(lines[3], "C20,1,1,0,0,0,0,0,0,1");
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let csv = OpeningPerformance::default().to_csv().unwrap();
        assert_eq!(csv.trim_end(), HEADER.join(","));
    }

    #[test]
    fn test_save_and_load_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eco.csv");
        let records = vec![rec("C20", PlayedAs::White, "1-0")];
        let saved = aggregate_and_save(&records, &path);
        assert!(saved.is_saved());

        let rows = load_rows(&path).unwrap();
        assert_eq!(rows, saved.value.rows());
    }
}
