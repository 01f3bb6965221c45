//! End to end through the service facade: archive -> parsed games ->
//! analysis -> opening table.

mod common;

use analysis_worker::evaluator::mock::ScriptedEvaluator;
use analysis_worker::{Evaluation, GameAnalyzer};
use archive_sync::clients::mock::ScriptedTransport;
use archive_sync::{ArchiveStore, ChessComClient, GameFilter, Synchronizer};
use chess_core::PlayedAs;
use chessy::config::Config;
use chessy::service::{ChessyService, PipelineSummary};
use chessy::task::{TaskHandle, TaskStatus};
use common::*;

fn alice_archive() -> String {
    [
        game("s1", "2025.01.01", "Alice", "Bob", "1-0", "C20"),
        game("s2", "2025.01.02", "Alice", "Carol", "0-1", "C20"),
        game("s3", "2025.01.03", "Bob", "Alice", "1/2-1/2", "C20"),
    ]
    .concat()
}

fn service_with_archive(dir: &std::path::Path, username: &str, archive: &str) -> ChessyService {
    let config = Config::for_user(dir, username);
    ArchiveStore::new(config.games_dir(), username).append(archive).unwrap();
    ChessyService::new(config)
}

#[tokio::test]
async fn openings_are_attributed_to_the_color_played() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with_archive(dir.path(), "Alice", &alice_archive());
    let task = TaskHandle::new("parse");

    let parsed = service.parse(&task).unwrap();
    let sides: Vec<PlayedAs> = parsed.value.records.iter().map(|r| r.played_as).collect();
    assert_eq!(sides, vec![PlayedAs::White, PlayedAs::White, PlayedAs::Black]);

    let perf = service.openings(&task).unwrap();
    assert!(perf.is_saved());

    let rows = service.eco_performance().unwrap();
    assert_eq!(rows.len(), 1);
    let c20 = &rows[0];
    assert_eq!(c20.eco, "C20");
    assert_eq!(
        (c20.white_games, c20.white_wins, c20.white_draws, c20.white_losses),
        (2, 1, 0, 1)
    );
    assert_eq!(
        (c20.black_games, c20.black_wins, c20.black_draws, c20.black_losses),
        (1, 0, 1, 0)
    );
    assert_eq!(c20.total_games, 3);
}

#[tokio::test]
async fn process_without_engine_is_degraded_but_complete() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with_archive(dir.path(), "Alice", &alice_archive());
    let analyzer = GameAnalyzer::new(service.config().analyzer.clone());
    let task = TaskHandle::new("process");

    let summary = service
        .process_with(&analyzer, None::<ScriptedEvaluator>, &task)
        .await
        .unwrap();
    assert_eq!(
        summary,
        PipelineSummary {
            parsed_games: 3,
            analyzed_games: 3,
            openings_analyzed: 1,
            cancelled: false,
        }
    );

    let stats = service.statistics().unwrap();
    assert_eq!(stats.total_games, 3);
    assert_eq!((stats.wins, stats.losses, stats.draws), (1, 1, 1));
    assert_eq!(stats.blunders, 0);
    assert_eq!(stats.win_percentage, 33.3);
    assert!(task
        .snapshot()
        .messages
        .iter()
        .any(|m| m.contains("Stockfish not available")));
}

#[tokio::test]
async fn process_on_empty_archive_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let service = ChessyService::new(Config::for_user(dir.path(), "Alice"));
    let analyzer = GameAnalyzer::new(service.config().analyzer.clone());

    let summary = service
        .process_with(&analyzer, None::<ScriptedEvaluator>, &TaskHandle::new("process"))
        .await
        .unwrap();
    assert_eq!(summary, PipelineSummary::default());
}

#[tokio::test]
async fn engine_blunder_reaches_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let archive = game("s1", "2025.01.01", "Alice", "Bob", "1-0", "C20");
    let service = service_with_archive(dir.path(), "Alice", &archive);
    let analyzer = GameAnalyzer::new(service.config().analyzer.clone());
    let task = TaskHandle::new("analyze");
    service.parse(&task).unwrap();

    // Side-to-move scores after each ply; after Nf3 Black is down 400.
    let engine = ScriptedEvaluator::new(Evaluation::Centipawns(0))
        .then(Ok(Evaluation::Centipawns(0)))
        .then(Ok(Evaluation::Centipawns(0)))
        .then(Ok(Evaluation::Centipawns(-400)))
        .then(Ok(Evaluation::Centipawns(0)));
    let probe = engine.probe();

    let run = service.analyze_with(&analyzer, Some(engine), None, &task).await.unwrap();
    assert_eq!(run.value.tally.opening, 1);
    assert_eq!(probe.calls(), 4);
    assert!(probe.was_shut_down());

    let stats = service.statistics().unwrap();
    assert_eq!(stats.blunders, 1);
    assert_eq!(stats.inaccuracies, 0);
}

#[tokio::test]
async fn cancelled_task_keeps_finished_games() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with_archive(dir.path(), "Alice", &alice_archive());
    let analyzer = GameAnalyzer::new(service.config().analyzer.clone());
    let task = TaskHandle::new("analyze");
    service.parse(&task).unwrap();

    task.start();
    task.cancel();
    let run = service
        .analyze_with(&analyzer, None::<ScriptedEvaluator>, None, &task)
        .await
        .unwrap();
    task.complete();

    assert!(run.value.cancelled);
    assert_eq!(run.value.records.len(), 1);
    assert_eq!(service.statistics().unwrap().total_games, 1);
    assert_eq!(task.status(), TaskStatus::Cancelled);
}

#[tokio::test]
async fn synced_games_flow_into_parsed_data_and_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::for_user(dir.path(), "alice");
    let transport = ScriptedTransport::new()
        .respond(&archives_url("alice"), 200, &listing("alice", &[(2024, 1), (2024, 2)]))
        .respond(&pgn_url("alice", 2024, 1), 200, &game("s1", "2024.01.03", "alice", "bob", "1-0", "C20"))
        .respond(&pgn_url("alice", 2024, 2), 200, &game("s2", "2024.02.03", "bob", "alice", "0-1", "B01"));
    let client = ChessComClient::with_transport(transport, fast_rate()).with_base_url(BASE);
    let synchronizer = Synchronizer::new(client, ArchiveStore::new(config.games_dir(), "alice"), "alice", 5);
    let service = ChessyService::new(config);
    let task = TaskHandle::new("sync");
    let filter = GameFilter::default();

    let outcome = service.sync_with(&synchronizer, &filter, &task).await.unwrap();
    assert_eq!(outcome.games_added, 2);
    let merged = service.merge_synced(&outcome, &task).unwrap();
    assert_eq!(merged.value.len(), 2);

    // A new month appears with one more game.
    let transport = synchronizer.client().transport();
    transport.set(&archives_url("alice"), 200, &listing("alice", &[(2024, 1), (2024, 2), (2024, 3)]));
    transport.set(&pgn_url("alice", 2024, 3), 200, &game("s3", "2024.03.09", "alice", "dave", "1/2-1/2", "A00"));
    let outcome = service.sync_with(&synchronizer, &filter, &task).await.unwrap();
    assert_eq!(outcome.games_added, 1);
    assert!(outcome.base_offset > 0);
    let merged = service.merge_synced(&outcome, &task).unwrap();
    assert_eq!(merged.value.len(), 3);

    // Every locator, including the delta's, finds its game in the archive.
    let analyzer = GameAnalyzer::new(service.config().analyzer.clone());
    let engine = ScriptedEvaluator::new(Evaluation::Centipawns(10));
    let probe = engine.probe();
    let run = service.analyze_with(&analyzer, Some(engine), None, &task).await.unwrap();
    assert_eq!(run.value.records.len(), 3);
    assert!(run.value.records.iter().all(|r| r.move_count == 4));
    assert_eq!(probe.calls(), 12);
}

#[tokio::test]
async fn unsaved_parsed_data_is_reported_with_the_new_games() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::for_user(dir.path(), "alice");
    // A directory where the parsed-games file belongs makes the save fail
    std::fs::create_dir_all(config.parsed_games_file().unwrap()).unwrap();
    let transport = ScriptedTransport::new()
        .respond(&archives_url("alice"), 200, &listing("alice", &[(2024, 1)]))
        .respond(&pgn_url("alice", 2024, 1), 200, &game("s1", "2024.01.03", "alice", "bob", "1-0", "C20"));
    let client = ChessComClient::with_transport(transport, fast_rate()).with_base_url(BASE);
    let synchronizer = Synchronizer::new(client, ArchiveStore::new(config.games_dir(), "alice"), "alice", 5);
    let service = ChessyService::new(config);
    let task = TaskHandle::new("sync");

    let updates = service
        .check_for_updates_with(&synchronizer, &GameFilter::default(), &task)
        .await
        .unwrap();
    assert_eq!(updates.value, 1);
    assert!(updates.save_error.is_some());
    // The archive still received the game
    assert!(synchronizer.store().read_archive().unwrap().contains("[Site \"s1\"]"));

    let again = service
        .check_for_updates_with(&synchronizer, &GameFilter::default(), &task)
        .await
        .unwrap();
    assert_eq!(again.value, 0);
    assert!(again.is_saved());
}

#[tokio::test]
async fn clear_empties_archive_and_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with_archive(dir.path(), "Alice", &alice_archive());
    let store = ArchiveStore::new(service.config().games_dir(), "Alice");
    store
        .advance_watermark(archive_sync::PeriodKey::new(2025, 1).unwrap())
        .unwrap();

    service.clear(&TaskHandle::new("clear")).unwrap();

    assert!(store.read_archive().unwrap().is_empty());
    assert_eq!(store.watermark().unwrap(), None);
}
