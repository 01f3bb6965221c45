//! Engine-assisted move analysis of archived games.

pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod stockfish;

pub use analysis::{Evaluation, GamePhase, MoveQuality, PhaseErrorTally};
pub use analyzer::{AnalysisRun, GameAnalyzer};
pub use config::AnalyzerConfig;
pub use error::WorkerError;
pub use evaluator::{PositionEvaluator, StockfishEvaluator};
