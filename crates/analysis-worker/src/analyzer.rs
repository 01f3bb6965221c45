//! Batch game analysis: locate each game in the raw archive, replay it,
//! evaluate the position after every move and count mistakes by phase.
//!
//! The engine is acquired once per batch and released on every exit path.
//! Without an engine each game still gets a record with zero mistakes.

use chess_core::pgn;
use chess_core::store::{self, Saved};
use chess_core::{AnalysisRecord, GameRecord};
use tracing::{error, info, warn};

use crate::analysis::{self, PhaseErrorTally};
use crate::config::AnalyzerConfig;
use crate::error::WorkerError;
use crate::evaluator::{PositionEvaluator, StockfishEvaluator};
use crate::stockfish::SearchLimit;

/// Result of one `analyze` call
#[derive(Debug, Clone, Default)]
pub struct AnalysisRun {
    pub records: Vec<AnalysisRecord>,
    pub tally: PhaseErrorTally,
    /// Stopped early by the progress callback
    pub cancelled: bool,
    /// Some or all games were analyzed without an engine
    pub degraded: bool,
}

pub struct GameAnalyzer {
    config: AnalyzerConfig,
}

impl GameAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Spawn Stockfish if it is configured and present.
    pub async fn open_engine(&self) -> Option<StockfishEvaluator> {
        let Some(path) = self.config.engine_path() else {
            warn!(
                path = ?self.config.stockfish_path,
                "Stockfish not available. Skipping detailed move analysis."
            );
            return None;
        };
        let limit = SearchLimit {
            depth: self.config.depth,
            movetime: self.config.movetime,
        };
        match StockfishEvaluator::spawn(path, limit).await {
            Ok(engine) => Some(engine),
            Err(e) => {
                error!(error = %e, "Could not start Stockfish; analyzing without engine");
                None
            }
        }
    }

    /// Analyze `records` against the raw archive text and persist the result.
    ///
    /// `progress(done, total)` runs after every game; returning `false`
    /// cancels the batch, and the records finished so far are still saved.
    pub async fn analyze<F>(&self, records: &[GameRecord], raw: &str, progress: F) -> Saved<AnalysisRun>
    where
        F: FnMut(usize, usize) -> bool,
    {
        let engine = self.open_engine().await;
        self.analyze_with(engine, records, raw, progress).await
    }

    pub async fn analyze_with<E, F>(
        &self,
        evaluator: Option<E>,
        records: &[GameRecord],
        raw: &str,
        mut progress: F,
    ) -> Saved<AnalysisRun>
    where
        E: PositionEvaluator,
        F: FnMut(usize, usize) -> bool,
    {
        let total = records.len();
        let mut engine = evaluator;
        let mut run = AnalysisRun {
            degraded: engine.is_none(),
            ..Default::default()
        };
        let mut restarted = false;

        info!(games = total, engine = engine.is_some(), "Starting analysis");

        for (i, record) in records.iter().enumerate() {
            let mut lost_engine = false;

            let analyzed = match engine.as_mut() {
                None => AnalysisRecord::unanalyzed(record),
                Some(e) => match analyze_game(e, record, raw).await {
                    Ok((analyzed, tally)) => {
                        run.tally.merge(&tally);
                        analyzed
                    }
                    Err(err) => {
                        error!(site = %record.site, error = %err, "Engine failed during game");
                        if !restarted && e.restart().await.is_ok() {
                            info!("Restarted Stockfish");
                            restarted = true;
                        } else {
                            lost_engine = true;
                        }
                        AnalysisRecord::unanalyzed(record)
                    }
                },
            };
            run.records.push(analyzed);

            if lost_engine {
                warn!("Continuing without engine");
                if let Some(mut e) = engine.take() {
                    e.shutdown().await;
                }
                run.degraded = true;
            }

            if !progress(i + 1, total) {
                info!(done = i + 1, total, "Analysis cancelled");
                run.cancelled = true;
                break;
            }
        }

        if let Some(mut e) = engine.take() {
            e.shutdown().await;
        }

        info!(
            analyzed = run.records.len(),
            opening = run.tally.opening,
            middlegame = run.tally.middlegame,
            endgame = run.tally.endgame,
            time_trouble = run.tally.time_trouble,
            "Blunders by phase"
        );

        let saved = store::save_json(&self.config.analysis_file, &run.records);
        if saved.is_ok() {
            info!(path = %self.config.analysis_file.display(), "Analysis results saved");
        }
        Saved::new(run, saved)
    }
}

/// Analyze one game. Per-position evaluation failures count as zero swing;
/// only a fatal engine error is returned.
async fn analyze_game<E: PositionEvaluator>(
    engine: &mut E,
    record: &GameRecord,
    raw: &str,
) -> Result<(AnalysisRecord, PhaseErrorTally), WorkerError> {
    let Some(unit) = pgn::locate_game(raw, record) else {
        warn!(site = %record.site, date = %record.date, "Game not found in archive");
        return Ok((AnalysisRecord::unanalyzed(record), PhaseErrorTally::default()));
    };

    let replayed = pgn::replay_unit(unit);
    if replayed.start_fen.is_empty() {
        warn!(site = %record.site, "Invalid start position");
        return Ok((AnalysisRecord::unanalyzed(record), PhaseErrorTally::default()));
    }

    let mut evals = Vec::with_capacity(replayed.plies());

    for (i, fen) in replayed.fens.iter().enumerate() {
        let ply = i + 1;
        match engine.evaluate(fen).await {
            Ok(eval) => evals.push(Some(eval)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(site = %record.site, ply, error = %e, "Error analyzing move");
                evals.push(None);
            }
        }
    }

    let score = analysis::score_game(&evals);
    let analyzed = AnalysisRecord {
        game: record.clone(),
        blunders: score.blunders,
        inaccuracies: score.inaccuracies,
        move_count: replayed.plies() as u32,
    };
    Ok((analyzed, score.tally))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Evaluation;
    use crate::evaluator::mock::ScriptedEvaluator;
    use chess_core::parser;

    const GAME: &str = "[Event \"Live Chess\"]\n[Site \"s1\"]\n[Date \"2025.01.01\"]\n[White \"alice\"]\n[Black \"bob\"]\n[Result \"1-0\"]\n[ECO \"C20\"]\n\n1. e4 e5 2. Nf3 Nc6 1-0\n\n";

    fn archive(n: usize) -> String {
        (0..n).map(|i| GAME.replace("s1", &format!("s{i}"))).collect()
    }

    fn setup(n: usize) -> (tempfile::TempDir, GameAnalyzer, String, Vec<GameRecord>) {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = GameAnalyzer::new(AnalyzerConfig::new(dir.path().join("analysis.json")));
        let raw = archive(n);
        let records = parser::parse(&raw, "alice", "archive.pgn", 0).records;
        (dir, analyzer, raw, records)
    }

    fn saved_records(analyzer: &GameAnalyzer) -> Vec<AnalysisRecord> {
        store::load_records(&analyzer.config().analysis_file).unwrap()
    }

    #[tokio::test]
    async fn test_degraded_mode() {
        let (_dir, analyzer, raw, records) = setup(5);
        let saved = analyzer
            .analyze_with(None::<ScriptedEvaluator>, &records, &raw, |_, _| true)
            .await;

        assert!(saved.is_saved());
        let run = saved.into_inner();
        assert!(run.degraded);
        assert_eq!(run.records.len(), 5);
        assert!(run.records.iter().all(|r| r.blunders == 0 && r.inaccuracies == 0 && r.move_count == 4));
        assert_eq!(saved_records(&analyzer).len(), 5);
    }

    #[tokio::test]
    async fn test_blunder_found_and_attributed() {
        let (_dir, analyzer, raw, records) = setup(1);
        // Side-to-move scores after e4, e5, Nf3, Nc6
        let engine = ScriptedEvaluator::new(Evaluation::Centipawns(0))
            .then(Ok(Evaluation::Centipawns(20)))
            .then(Ok(Evaluation::Centipawns(-30)))
            .then(Ok(Evaluation::Centipawns(-400)))
            .then(Ok(Evaluation::Centipawns(40)));
        let probe = engine.probe();

        let run = analyzer
            .analyze_with(Some(engine), &records, &raw, |_, _| true)
            .await
            .into_inner();

        // Only positions after a move are evaluated
        assert_eq!(probe.calls(), 4);
        assert!(probe.was_shut_down());
        assert_eq!(run.records[0].blunders, 1);
        assert_eq!(run.records[0].inaccuracies, 0);
        assert_eq!(run.records[0].move_count, 4);
        assert_eq!(run.tally.opening, 1);
        assert_eq!(run.tally.time_trouble, 1);
    }

    #[tokio::test]
    async fn test_move_error_is_isolated() {
        let (_dir, analyzer, raw, records) = setup(2);
        let engine = ScriptedEvaluator::new(Evaluation::Centipawns(10))
            .then(Ok(Evaluation::Centipawns(10)))
            .then(Err(WorkerError::Timeout(std::time::Duration::from_millis(100))));

        let run = analyzer
            .analyze_with(Some(engine), &records, &raw, |_, _| true)
            .await
            .into_inner();

        assert!(!run.degraded);
        assert_eq!(run.records.len(), 2);
        assert_eq!(run.records[0].move_count, 4);
    }

    #[tokio::test]
    async fn test_fatal_error_restarts_once_then_degrades() {
        let (_dir, analyzer, raw, records) = setup(3);
        let engine = ScriptedEvaluator::new(Evaluation::Centipawns(0))
            .then(Err(WorkerError::EngineExited("gone".into())))
            .then(Err(WorkerError::EngineExited("gone again".into())));
        let probe = engine.probe();

        let run = analyzer
            .analyze_with(Some(engine), &records, &raw, |_, _| true)
            .await
            .into_inner();

        assert_eq!(probe.restarts(), 1);
        assert!(probe.was_shut_down());
        assert!(run.degraded);
        assert_eq!(run.records.len(), 3);
        assert!(run.records.iter().all(|r| r.blunders == 0));
    }

    #[tokio::test]
    async fn test_cancel_persists_partial_results() {
        let (_dir, analyzer, raw, records) = setup(5);
        let engine = ScriptedEvaluator::new(Evaluation::Centipawns(0));
        let probe = engine.probe();
        let mut seen = Vec::new();

        let run = analyzer
            .analyze_with(Some(engine), &records, &raw, |done, total| {
                seen.push((done, total));
                done < 2
            })
            .await
            .into_inner();

        assert!(run.cancelled);
        assert_eq!(seen, vec![(1, 5), (2, 5)]);
        assert_eq!(run.records.len(), 2);
        assert_eq!(saved_records(&analyzer).len(), 2);
        assert!(probe.was_shut_down());
    }

    #[tokio::test]
    async fn test_missing_game_is_unanalyzed() {
        let (_dir, analyzer, raw, mut records) = setup(1);
        records[0].site = "elsewhere".into();
        let engine = ScriptedEvaluator::new(Evaluation::Centipawns(0));
        let probe = engine.probe();

        let run = analyzer
            .analyze_with(Some(engine), &records, &raw, |_, _| true)
            .await
            .into_inner();

        assert_eq!(probe.calls(), 0);
        assert_eq!(run.records[0].move_count, records[0].ply_count);
    }
}
