//! Shared chess domain for the game archive pipeline: parsed game records,
//! PGN handling, time controls, opening statistics and flat-file persistence.

pub mod error;
pub mod game_data;
pub mod openings;
pub mod parser;
pub mod pgn;
pub mod stats;
pub mod store;
pub mod time_control;

pub use error::StoreError;
pub use game_data::{AnalysisRecord, GameKey, GameLocator, GameOutcome, GameRecord, PlayedAs};
pub use store::Saved;
