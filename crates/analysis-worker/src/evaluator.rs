//! Position evaluation seam between the analyzer and the engine process.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::analysis::Evaluation;
use crate::error::WorkerError;
use crate::stockfish::{SearchLimit, StockfishEngine};

/// Scores positions relative to the side to move.
/// Implemented by `StockfishEvaluator` and by the scripted test evaluator.
#[async_trait]
pub trait PositionEvaluator: Send {
    async fn evaluate(&mut self, fen: &str) -> Result<Evaluation, WorkerError>;

    /// Replace a dead engine with a fresh one.
    async fn restart(&mut self) -> Result<(), WorkerError> {
        Err(WorkerError::Stockfish("restart not supported".into()))
    }

    /// Release the engine. Called once when a batch ends.
    async fn shutdown(&mut self) {}
}

pub struct StockfishEvaluator {
    path: PathBuf,
    limit: SearchLimit,
    engine: StockfishEngine,
}

impl StockfishEvaluator {
    pub async fn spawn(path: &Path, limit: SearchLimit) -> Result<Self, WorkerError> {
        let engine = StockfishEngine::new(path).await?;
        info!(path = %path.display(), depth = limit.depth, movetime_ms = limit.movetime.as_millis() as u64, "Stockfish ready");
        Ok(Self {
            path: path.to_path_buf(),
            limit,
            engine,
        })
    }
}

#[async_trait]
impl PositionEvaluator for StockfishEvaluator {
    async fn evaluate(&mut self, fen: &str) -> Result<Evaluation, WorkerError> {
        let result = self.engine.evaluate(fen, &self.limit).await?;
        result
            .evaluation()
            .ok_or_else(|| WorkerError::NoScore(fen.to_string()))
    }

    async fn restart(&mut self) -> Result<(), WorkerError> {
        let fresh = StockfishEngine::new(&self.path).await?;
        let mut old = std::mem::replace(&mut self.engine, fresh);
        old.quit().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.engine.quit().await;
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Serves queued results in order, then a fixed fallback score.
    pub struct ScriptedEvaluator {
        script: VecDeque<Result<Evaluation, WorkerError>>,
        fallback: Evaluation,
        restart_ok: bool,
        calls: Arc<AtomicUsize>,
        restarts: Arc<AtomicUsize>,
        shut_down: Arc<AtomicBool>,
    }

    /// Observes a `ScriptedEvaluator` after it has been moved into a batch.
    #[derive(Clone)]
    pub struct Probe {
        calls: Arc<AtomicUsize>,
        restarts: Arc<AtomicUsize>,
        shut_down: Arc<AtomicBool>,
    }

    impl Probe {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn restarts(&self) -> usize {
            self.restarts.load(Ordering::SeqCst)
        }

        pub fn was_shut_down(&self) -> bool {
            self.shut_down.load(Ordering::SeqCst)
        }
    }

    impl ScriptedEvaluator {
        pub fn new(fallback: Evaluation) -> Self {
            Self {
                script: VecDeque::new(),
                fallback,
                restart_ok: true,
                calls: Arc::new(AtomicUsize::new(0)),
                restarts: Arc::new(AtomicUsize::new(0)),
                shut_down: Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn then(mut self, result: Result<Evaluation, WorkerError>) -> Self {
            self.script.push_back(result);
            self
        }

        pub fn failing_restart(mut self) -> Self {
            self.restart_ok = false;
            self
        }

        pub fn probe(&self) -> Probe {
            Probe {
                calls: self.calls.clone(),
                restarts: self.restarts.clone(),
                shut_down: self.shut_down.clone(),
            }
        }
    }

    #[async_trait]
    impl PositionEvaluator for ScriptedEvaluator {
        async fn evaluate(&mut self, _fen: &str) -> Result<Evaluation, WorkerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.pop_front().unwrap_or(Ok(self.fallback))
        }

        async fn restart(&mut self) -> Result<(), WorkerError> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            if self.restart_ok {
                Ok(())
            } else {
                Err(WorkerError::Stockfish("restart refused".into()))
            }
        }

        async fn shutdown(&mut self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }
}
