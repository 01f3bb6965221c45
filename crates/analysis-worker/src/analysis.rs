//! Move quality, game phase and time-trouble policy: pure functions only
//! (No Engine/Board/File dependencies)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification thresholds (centipawn swing)
pub const BLUNDER_THRESHOLD: i32 = 300;
pub const INACCURACY_THRESHOLD: i32 = 100;

/// Last ply of each phase; everything after the middlegame is endgame.
pub const OPENING_LAST_PLY: usize = 10;
pub const MIDDLEGAME_LAST_PLY: usize = 30;

/// A ply is in time trouble when fewer than this many plies follow it.
pub const TIME_TROUBLE_PLIES: usize = 5;

/// Engine score relative to the side to move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated)
    Mate(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveQuality {
    Ok,
    Inaccuracy,
    Blunder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GamePhase::Opening => "Opening",
            GamePhase::Middlegame => "Middlegame",
            GamePhase::Endgame => "Endgame",
        })
    }
}

/// Blunders per phase plus time-trouble blunders for one analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseErrorTally {
    pub opening: u32,
    pub middlegame: u32,
    pub endgame: u32,
    pub time_trouble: u32,
}

impl PhaseErrorTally {
    pub fn record_blunder(&mut self, ply: usize, total_plies: usize) {
        match phase_for_ply(ply) {
            GamePhase::Opening => self.opening += 1,
            GamePhase::Middlegame => self.middlegame += 1,
            GamePhase::Endgame => self.endgame += 1,
        }
        if is_time_trouble(ply, total_plies) {
            self.time_trouble += 1;
        }
    }

    pub fn merge(&mut self, other: &PhaseErrorTally) {
        self.opening += other.opening;
        self.middlegame += other.middlegame;
        self.endgame += other.endgame;
        self.time_trouble += other.time_trouble;
    }
}

/// Mistake counts of one game
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameScore {
    pub blunders: u32,
    pub inaccuracies: u32,
    pub tally: PhaseErrorTally,
}

pub fn classify_swing(swing: i32) -> MoveQuality {
    if swing >= BLUNDER_THRESHOLD {
        MoveQuality::Blunder
    } else if swing >= INACCURACY_THRESHOLD {
        MoveQuality::Inaccuracy
    } else {
        MoveQuality::Ok
    }
}

/// Phase of a 1-based ply index
pub fn phase_for_ply(ply: usize) -> GamePhase {
    if ply <= OPENING_LAST_PLY {
        GamePhase::Opening
    } else if ply <= MIDDLEGAME_LAST_PLY {
        GamePhase::Middlegame
    } else {
        GamePhase::Endgame
    }
}

pub fn is_time_trouble(ply: usize, total_plies: usize) -> bool {
    ply >= 1 && ply <= total_plies && total_plies - ply < TIME_TROUBLE_PLIES
}

/// Swing of a move: the size of the side-to-move score in the position it
/// leads to. A mate score carries no centipawn value and counts as zero.
pub fn move_swing(eval: Evaluation) -> i32 {
    match eval {
        Evaluation::Centipawns(cp) => cp.saturating_abs(),
        Evaluation::Mate(_) => 0,
    }
}

/// Score a game from the evaluation of the position after each ply.
///
/// `evals[i]` belongs to ply `i + 1`. A missing evaluation is a zero swing.
pub fn score_game(evals: &[Option<Evaluation>]) -> GameScore {
    let total_plies = evals.len();
    let mut score = GameScore::default();

    for (i, eval) in evals.iter().enumerate() {
        let swing = eval.map_or(0, move_swing);
        match classify_swing(swing) {
            MoveQuality::Blunder => {
                score.blunders += 1;
                score.tally.record_blunder(i + 1, total_plies);
            }
            MoveQuality::Inaccuracy => score.inaccuracies += 1,
            MoveQuality::Ok => {}
        }
    }

    score
}
