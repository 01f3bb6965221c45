//! Summary statistics over analysis records, from the tracked user's side.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::StoreError;
use crate::game_data::AnalysisRecord;
use crate::store;
use crate::time_control::format_time_control;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GameStatistics {
    pub total_games: usize,
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    pub blunders: u64,
    pub inaccuracies: u64,
    /// Percentage of wins over all games, rounded to one decimal.
    pub win_percentage: f64,
    /// Blunder counts grouped by labelled time control (`5min +2sec (Blitz)`).
    pub by_time_control: BTreeMap<String, TimeControlStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeControlStats {
    pub games: usize,
    pub blunders: u64,
    /// Blunders per game, rounded to two decimals.
    pub avg_blunders: f64,
}

pub fn summarize(records: &[AnalysisRecord]) -> GameStatistics {
    let mut stats = GameStatistics {
        total_games: records.len(),
        ..Default::default()
    };

    for r in records {
        if let Some(outcome) = r.game.outcome() {
            match outcome.score_for(r.game.played_as) {
                1 => stats.wins += 1,
                0 => stats.draws += 1,
                _ => stats.losses += 1,
            }
        }
        stats.blunders += u64::from(r.blunders);
        stats.inaccuracies += u64::from(r.inaccuracies);

        let group = stats
            .by_time_control
            .entry(format_time_control(&r.game.time_control))
            .or_default();
        group.games += 1;
        group.blunders += u64::from(r.blunders);
    }

    for group in stats.by_time_control.values_mut() {
        let avg = group.blunders as f64 / group.games as f64;
        group.avg_blunders = (avg * 100.0).round() / 100.0;
    }

    if stats.total_games > 0 {
        let pct = stats.wins as f64 / stats.total_games as f64 * 100.0;
        stats.win_percentage = (pct * 10.0).round() / 10.0;
    }
    stats
}

/// Statistics of the persisted analysis file; a missing file gives zeros.
pub fn load_statistics(analysis_file: &Path) -> Result<GameStatistics, StoreError> {
    let records: Vec<AnalysisRecord> = store::load_records(analysis_file)?;
    Ok(summarize(&records))
}
