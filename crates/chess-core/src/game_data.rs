use serde::{Deserialize, Serialize};

/// Value stored for any tag missing from the PGN header section.
pub const UNKNOWN: &str = "Unknown";

/// PGN's own spelling of an unknown date.
pub const UNKNOWN_DATE: &str = "????.??.??";

/// Side played by the tracked user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayedAs {
    White,
    Black,
}

impl PlayedAs {
    /// Exact, case-sensitive name match against the White player.
    /// Anything else is Black, including a username that matches neither side.
    pub fn derive(white: &str, username: &str) -> Self {
        if white == username {
            PlayedAs::White
        } else {
            PlayedAs::Black
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayedAs::White => "White",
            PlayedAs::Black => "Black",
        }
    }
}

/// Recognized PGN result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameOutcome {
    pub fn from_result(result: &str) -> Option<Self> {
        match result {
            "1-0" => Some(GameOutcome::WhiteWins),
            "0-1" => Some(GameOutcome::BlackWins),
            "1/2-1/2" => Some(GameOutcome::Draw),
            _ => None,
        }
    }

    /// Result from the point of view of `side`: 1 win, 0 draw, -1 loss.
    pub fn score_for(self, side: PlayedAs) -> i8 {
        match (self, side) {
            (GameOutcome::Draw, _) => 0,
            (GameOutcome::WhiteWins, PlayedAs::White) | (GameOutcome::BlackWins, PlayedAs::Black) => 1,
            _ => -1,
        }
    }
}

/// Byte range of one game unit inside the raw archive store.
///
/// The store is append-only, so a locator written at parse time stays valid
/// until the store is explicitly cleared. A zero length means "no locator"
/// (records loaded from files written before locators existed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLocator {
    pub offset: u64,
    pub length: u64,
}

impl GameLocator {
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.length as usize
    }
}

/// Composite natural key used for deduplication and re-matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameKey {
    pub site: String,
    pub date: String,
    pub white: String,
    pub black: String,
}

impl GameKey {
    pub fn new(site: &str, date: &str, white: &str, black: &str) -> Self {
        Self {
            site: site.to_string(),
            date: date.to_string(),
            white: white.to_string(),
            black: black.to_string(),
        }
    }
}

/// One parsed game. Every field is always present; missing tags hold
/// [`UNKNOWN`] so downstream folds never deal with absent keys.
///
/// Field names on disk follow the established `games_parsed.json` layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub white: String,
    pub black: String,
    #[serde(rename = "Result")]
    pub result: String,
    pub date: String,
    #[serde(rename = "TimeControl")]
    pub time_control: String,
    #[serde(rename = "ECO")]
    pub eco: String,
    pub opening: String,
    #[serde(rename = "Termination")]
    pub termination: String,
    /// Half-moves successfully replayed from the movetext.
    #[serde(rename = "NumMoves")]
    pub ply_count: u32,
    #[serde(rename = "PlayedAs")]
    pub played_as: PlayedAs,
    pub source_file: String,
    pub site: String,
    #[serde(default)]
    pub locator: GameLocator,
}

impl GameRecord {
    pub fn key(&self) -> GameKey {
        GameKey::new(&self.site, &self.date, &self.white, &self.black)
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        GameOutcome::from_result(&self.result)
    }

    pub fn has_opening_code(&self) -> bool {
        let eco = self.eco.trim();
        !eco.is_empty() && eco != UNKNOWN
    }
}

/// A game record enriched with engine mistake counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(flatten)]
    pub game: GameRecord,
    pub blunders: u32,
    pub inaccuracies: u32,
    pub move_count: u32,
}

impl AnalysisRecord {
    /// Record for a game that could not be analyzed: no mistakes, stored ply count.
    pub fn unanalyzed(game: &GameRecord) -> Self {
        Self {
            game: game.clone(),
            blunders: 0,
            inaccuracies: 0,
            move_count: game.ply_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> GameRecord {
        GameRecord {
            white: "Alice".into(),
            black: "Bob".into(),
            result: "1-0".into(),
            date: "2025.01.15".into(),
            time_control: "300+2".into(),
            eco: "C20".into(),
            opening: UNKNOWN.into(),
            termination: UNKNOWN.into(),
            ply_count: 12,
            played_as: PlayedAs::White,
            source_file: "archive.pgn".into(),
            site: "Chess.com".into(),
            locator: GameLocator { offset: 10, length: 200 },
        }
    }

    #[test]
    fn test_played_as_is_exact_match() {
        assert_eq!(PlayedAs::derive("Alice", "Alice"), PlayedAs::White);
        assert_eq!(PlayedAs::derive("alice", "Alice"), PlayedAs::Black);
        // Neither player: still Black
        assert_eq!(PlayedAs::derive("Carol", "Alice"), PlayedAs::Black);
    }

    #[test]
    fn test_outcome_scores_mirror_by_color() {
        let o = GameOutcome::from_result("1-0").unwrap();
        assert_eq!(o.score_for(PlayedAs::White), 1);
        assert_eq!(o.score_for(PlayedAs::Black), -1);
        assert_eq!(GameOutcome::from_result("1/2-1/2").unwrap().score_for(PlayedAs::Black), 0);
        assert!(GameOutcome::from_result("*").is_none());
    }

    #[test]
    fn test_serialized_keys() {
        let json = serde_json::to_value(record()).unwrap();
        for key in [
            "white", "black", "Result", "date", "TimeControl", "ECO", "opening",
            "Termination", "NumMoves", "PlayedAs", "source_file", "site", "locator",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(json["PlayedAs"], "White");
    }

    #[test]
    fn test_analysis_record_flattens_game() {
        let analysis = AnalysisRecord::unanalyzed(&record());
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["white"], "Alice");
        assert_eq!(json["blunders"], 0);
        assert_eq!(json["move_count"], 12);

        let back: AnalysisRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, analysis);
    }

    #[test]
    fn test_missing_locator_defaults_to_empty() {
        let mut json = serde_json::to_value(record()).unwrap();
        json.as_object_mut().unwrap().remove("locator");
        let back: GameRecord = serde_json::from_value(json).unwrap();
        assert!(back.locator.is_empty());
    }
}
