//! Pipeline facade: sync, parse, analyze and aggregate, each reporting
//! through a `TaskHandle`.

use std::path::Path;

use analysis_worker::{AnalysisRun, GameAnalyzer, PositionEvaluator, StockfishEvaluator};
use archive_sync::{ArchiveStore, GameFilter, HttpTransport, SyncOutcome, Synchronizer};
use chess_core::openings::{self, OpeningPerformance, OpeningRow};
use chess_core::parser::{GameParser, ParseReport};
use chess_core::stats::{self, GameStatistics};
use chess_core::store::{self, Saved};
use chess_core::GameRecord;
use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::error::ServiceError;
use crate::task::TaskHandle;

/// Counts produced by `process_new_games`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub parsed_games: usize,
    pub analyzed_games: usize,
    pub openings_analyzed: usize,
    pub cancelled: bool,
}

pub struct ChessyService {
    config: Config,
}

impl ChessyService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn parser(&self) -> Result<GameParser, ServiceError> {
        Ok(GameParser::new(self.config.username()?, self.config.parsed_games_file()?))
    }

    fn archive_store(&self) -> Result<ArchiveStore, ServiceError> {
        let sync = self.config.sync_config()?;
        Ok(ArchiveStore::new(&sync.games_dir, &sync.username))
    }

    /// One sync pass against Chess.com.
    pub async fn sync(&self, filter: &GameFilter, task: &TaskHandle) -> Result<SyncOutcome, ServiceError> {
        let synchronizer = Synchronizer::from_config(self.config.sync_config()?)?;
        self.sync_with(&synchronizer, filter, task).await
    }

    pub async fn sync_with<T: HttpTransport>(
        &self,
        synchronizer: &Synchronizer<T>,
        filter: &GameFilter,
        task: &TaskHandle,
    ) -> Result<SyncOutcome, ServiceError> {
        if filter.is_active() {
            task.message(format!("Using filters: {}", describe_filter(filter)));
        }
        let outcome = synchronizer.sync(filter).await?;
        task.message(format!(
            "Fetched {} of {} periods ({} skipped, {} failed); {} new games",
            outcome.fetched,
            outcome.periods.len(),
            outcome.skipped,
            outcome.failed,
            outcome.games_added
        ));
        Ok(outcome)
    }

    /// Sync and fold the new games into the parsed data. Returns the number
    /// of new games, with the error if the parsed data could not be saved.
    pub async fn check_for_updates(&self, filter: &GameFilter, task: &TaskHandle) -> Result<Saved<usize>, ServiceError> {
        let synchronizer = Synchronizer::from_config(self.config.sync_config()?)?;
        self.check_for_updates_with(&synchronizer, filter, task).await
    }

    pub async fn check_for_updates_with<T: HttpTransport>(
        &self,
        synchronizer: &Synchronizer<T>,
        filter: &GameFilter,
        task: &TaskHandle,
    ) -> Result<Saved<usize>, ServiceError> {
        let outcome = self.sync_with(synchronizer, filter, task).await?;
        if !outcome.has_new_games() {
            return Ok(Saved::new(0, Ok(())));
        }
        let merged = self.merge_synced(&outcome, task)?;
        Ok(Saved {
            value: outcome.games_added,
            save_error: merged.save_error,
        })
    }

    /// Parse just the text a sync appended and merge it into the parsed set.
    pub fn merge_synced(&self, outcome: &SyncOutcome, task: &TaskHandle) -> Result<Saved<Vec<GameRecord>>, ServiceError> {
        let parser = self.parser()?;
        let source = self.config.sync_config()?.archive_file();
        let merged = parser.parse_delta(&outcome.new_text, &source.to_string_lossy(), outcome.base_offset);
        task.message(format!("Parsed data now holds {} games", merged.value.len()));
        Ok(merged)
    }

    /// Re-parse the whole archive, replacing the parsed-games file.
    pub fn parse(&self, task: &TaskHandle) -> Result<Saved<ParseReport>, ServiceError> {
        let store = self.archive_store()?;
        let raw = store.read_archive()?;
        let report = self
            .parser()?
            .parse_archive(&raw, &store.archive_file().to_string_lossy());
        task.message(format!(
            "Parsed {} games ({} duplicates, {} without the tracked user)",
            report.value.records.len(),
            report.value.duplicates,
            report.value.unmatched
        ));
        Ok(report)
    }

    /// Parse a separate PGN file and merge it into the parsed set.
    pub fn parse_incremental(&self, file: &Path, task: &TaskHandle) -> Result<Saved<Vec<GameRecord>>, ServiceError> {
        let delta = store::read_text(file)?;
        let archive = self.archive_store()?.read_archive()?;
        // Locators stay valid when the file's text was appended to the archive.
        let base_offset = match archive.rfind(delta.as_str()) {
            Some(at) if !delta.is_empty() => at as u64,
            _ => 0,
        };
        let merged = self
            .parser()?
            .parse_delta(&delta, &file.to_string_lossy(), base_offset);
        task.message(format!("Parsed data now holds {} games", merged.value.len()));
        Ok(merged)
    }

    /// Analyze the parsed games with Stockfish if available.
    pub async fn analyze(&self, limit: Option<usize>, task: &TaskHandle) -> Result<Saved<AnalysisRun>, ServiceError> {
        let analyzer = GameAnalyzer::new(self.config.analyzer.clone());
        let engine: Option<StockfishEvaluator> = analyzer.open_engine().await;
        self.analyze_with(&analyzer, engine, limit, task).await
    }

    pub async fn analyze_with<E: PositionEvaluator>(
        &self,
        analyzer: &GameAnalyzer,
        engine: Option<E>,
        limit: Option<usize>,
        task: &TaskHandle,
    ) -> Result<Saved<AnalysisRun>, ServiceError> {
        let mut records = self.parser()?.load()?;
        if let Some(n) = limit {
            records.truncate(n);
        }
        let raw = self.archive_store()?.read_archive()?;

        task.message(format!("Analyzing {} games", records.len()));
        task.set_progress(0, records.len());
        let run = analyzer
            .analyze_with(engine, &records, &raw, |done, total| {
                task.set_progress(done, total);
                !task.is_cancelled()
            })
            .await;

        if run.value.degraded {
            task.message("Stockfish not available; mistake counts are zero");
        }
        task.message(format!(
            "Analyzed {} games; blunders by phase: opening {}, middlegame {}, endgame {}; time trouble {}",
            run.value.records.len(),
            run.value.tally.opening,
            run.value.tally.middlegame,
            run.value.tally.endgame,
            run.value.tally.time_trouble
        ));
        Ok(run)
    }

    /// Rebuild the opening table from the parsed games.
    pub fn openings(&self, task: &TaskHandle) -> Result<Saved<OpeningPerformance>, ServiceError> {
        let records = self.parser()?.load()?;
        let perf = openings::aggregate_and_save(&records, &self.config.eco_csv_file()?);
        task.message(format!("Tallied {} openings", perf.value.len()));
        Ok(perf)
    }

    pub fn eco_performance(&self) -> Result<Vec<OpeningRow>, ServiceError> {
        Ok(openings::load_rows(&self.config.eco_csv_file()?)?)
    }

    pub fn statistics(&self) -> Result<GameStatistics, ServiceError> {
        Ok(stats::load_statistics(&self.config.analyzer.analysis_file)?)
    }

    /// Parse the whole archive, analyze it and rebuild the opening table.
    pub async fn process_new_games(&self, task: &TaskHandle) -> Result<PipelineSummary, ServiceError> {
        let analyzer = GameAnalyzer::new(self.config.analyzer.clone());
        let engine: Option<StockfishEvaluator> = analyzer.open_engine().await;
        self.process_with(&analyzer, engine, task).await
    }

    pub async fn process_with<E: PositionEvaluator>(
        &self,
        analyzer: &GameAnalyzer,
        engine: Option<E>,
        task: &TaskHandle,
    ) -> Result<PipelineSummary, ServiceError> {
        let mut summary = PipelineSummary::default();

        let store = self.archive_store()?;
        if store.read_archive()?.trim().is_empty() {
            warn!("No game archive found. Please download games first.");
            task.message("No game archive found");
            return Ok(summary);
        }

        let parsed = self.parse(task)?;
        summary.parsed_games = parsed.value.records.len();
        if summary.parsed_games == 0 {
            return Ok(summary);
        }

        let run = self.analyze_with(analyzer, engine, None, task).await?;
        summary.analyzed_games = run.value.records.len();
        summary.cancelled = run.value.cancelled;

        let perf = self.openings(task)?;
        summary.openings_analyzed = perf.value.len();
        Ok(summary)
    }

    /// Empty the archive store and forget the watermark.
    pub fn clear(&self, task: &TaskHandle) -> Result<(), ServiceError> {
        self.archive_store()?.clear()?;
        task.message("Cleared game archive and sync watermark");
        Ok(())
    }
}

fn describe_filter(filter: &GameFilter) -> String {
    let mut parts = Vec::new();
    if filter.from.is_some() || filter.to.is_some() {
        let show = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "..".into());
        parts.push(format!("date range: {} to {}", show(filter.from), show(filter.to)));
    }
    if let Some(class) = filter.time_class {
        parts.push(format!("time control: {class}"));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_filter() {
        let filter = GameFilter {
            from: chrono::NaiveDate::from_ymd_opt(2024, 1, 1),
            to: None,
            time_class: Some(chess_core::time_control::TimeClass::Rapid),
        };
        assert_eq!(describe_filter(&filter), "date range: 2024-01-01 to .., time control: rapid");
    }
}
