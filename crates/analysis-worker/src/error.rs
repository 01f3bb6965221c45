//! Worker error types

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Stockfish error: {0}")]
    Stockfish(String),

    #[error("Stockfish exited: {0}")]
    EngineExited(String),

    #[error("Stockfish gave no score for {0}")]
    NoScore(String),

    #[error("Evaluation timed out after {0:?}")]
    Timeout(Duration),
}

impl WorkerError {
    /// The engine process can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::EngineExited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_engine_exit_is_fatal() {
        assert!(WorkerError::EngineExited("eof".into()).is_fatal());
        assert!(!WorkerError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!WorkerError::NoScore("8/8/8/8/8/8/8/8 w - - 0 1".into()).is_fatal());
        assert!(!WorkerError::Stockfish("bad".into()).is_fatal());
    }
}
