//! PGN handling on pgn-reader: game units with their byte spans inside a
//! blob, tag maps, and main-line replay on a shakmaty board.

use std::collections::HashMap;
use std::io::Cursor;
use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use tracing::warn;

use crate::game_data::{GameKey, GameLocator, GameRecord, UNKNOWN, UNKNOWN_DATE};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const TERMINATION_MARKERS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// Tags in file order and the main-line moves of one game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnGame {
    pub tags: Vec<(String, String)>,
    pub moves: Vec<San>,
}

impl PgnGame {
    /// Tag map; the first occurrence of a name wins.
    pub fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        for (name, value) in &self.tags {
            headers.entry(name.clone()).or_insert_with(|| value.clone());
        }
        headers
    }
}

fn push_tag(tags: &mut Vec<(String, String)>, name: &[u8], value: RawTag<'_>) {
    tags.push((
        String::from_utf8_lossy(name).into_owned(),
        value.decode_utf8_lossy().into_owned(),
    ));
}

/// Collects tags and main-line SANs; variations are skipped.
struct GameCollector;

impl Visitor for GameCollector {
    type Tags = Vec<(String, String)>;
    type Movetext = PgnGame;
    type Output = PgnGame;

    fn begin_tags(&mut self) -> ControlFlow<PgnGame, Self::Tags> {
        ControlFlow::Continue(Vec::new())
    }

    fn tag(&mut self, tags: &mut Self::Tags, name: &[u8], value: RawTag<'_>) -> ControlFlow<PgnGame> {
        push_tag(tags, name, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<PgnGame, PgnGame> {
        ControlFlow::Continue(PgnGame {
            tags,
            moves: Vec::new(),
        })
    }

    fn begin_variation(&mut self, _game: &mut PgnGame) -> ControlFlow<PgnGame, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, game: &mut PgnGame, san_plus: SanPlus) -> ControlFlow<PgnGame> {
        game.moves.push(san_plus.san);
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, game: PgnGame) -> PgnGame {
        game
    }
}

/// Reads the tag section only and skips the movetext.
struct TagCollector;

impl Visitor for TagCollector {
    type Tags = Vec<(String, String)>;
    type Movetext = ();
    type Output = Vec<(String, String)>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(Vec::new())
    }

    fn tag(&mut self, tags: &mut Self::Tags, name: &[u8], value: RawTag<'_>) -> ControlFlow<Self::Output> {
        push_tag(tags, name, value);
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, ()> {
        ControlFlow::Break(tags)
    }

    fn end_game(&mut self, _movetext: ()) -> Self::Output {
        Vec::new()
    }
}

fn reader(text: &str) -> Reader<Cursor<&[u8]>> {
    Reader::new(Cursor::new(text.as_bytes()))
}

/// First game of `pgn`, if any.
pub fn read_first_game(pgn: &str) -> Option<PgnGame> {
    reader(pgn).read_game(&mut GameCollector).ok().flatten()
}

/// Tags of the first game of `pgn`, in file order.
fn read_tags(pgn: &str) -> Vec<(String, String)> {
    reader(pgn)
        .read_game(&mut TagCollector)
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Tag map of the first game of `pgn`; the first occurrence wins.
pub fn parse_headers(pgn: &str) -> HashMap<String, String> {
    PgnGame {
        tags: read_tags(pgn),
        moves: Vec::new(),
    }
    .headers()
}

/// One game inside a larger PGN blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameUnit<'a> {
    /// Byte offset of `text` inside the blob that was split.
    pub offset: usize,
    /// From the game's first tag up to the next game, trailing blanks trimmed.
    pub text: &'a str,
    pub game: PgnGame,
}

impl<'a> GameUnit<'a> {
    pub fn locator(&self, base_offset: u64) -> GameLocator {
        GameLocator {
            offset: base_offset + self.offset as u64,
            length: self.text.len() as u64,
        }
    }

    pub fn headers(&self) -> HashMap<String, String> {
        self.game.headers()
    }

    /// Movetext ends with a game termination marker.
    pub fn is_terminated(&self) -> bool {
        ends_with_marker(self.text)
    }
}

fn ends_with_marker(text: &str) -> bool {
    let mut tail = text.trim_end();
    // A trailing {comment} may follow the result
    while tail.ends_with('}') {
        match tail.rfind('{') {
            Some(open) => tail = tail[..open].trim_end(),
            None => break,
        }
    }
    TERMINATION_MARKERS.iter().any(|marker| {
        tail.strip_suffix(marker).is_some_and(|rest| {
            rest.is_empty() || rest.ends_with(|c: char| c.is_whitespace() || c == '}' || c == ')')
        })
    })
}

/// Streaming iterator over the games of a PGN blob.
///
/// pgn-reader decides where one game ends and the next begins. A unit's text
/// starts at the line holding the game's first tag, found by reading tag
/// sections back at line starts until one matches the game's tags, so
/// tag-looking lines inside comments never start a unit. Movetext without a
/// tag section of its own stays part of the unit before it.
pub struct GameUnits<'a> {
    raw: &'a str,
    reader: Reader<Cursor<&'a [u8]>>,
    /// Search for the next tag section starts here.
    cursor: usize,
    next: Option<(usize, PgnGame)>,
    primed: bool,
}

impl<'a> GameUnits<'a> {
    fn read_anchored(&mut self) -> Option<(usize, PgnGame)> {
        loop {
            let game = match self.reader.read_game(&mut GameCollector) {
                Ok(Some(game)) => game,
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "Stopped reading PGN");
                    return None;
                }
            };

            let start = if !game.tags.is_empty() {
                find_tag_section(self.raw, self.cursor, &game.tags)
            } else if self.cursor == 0 {
                first_non_blank(self.raw)
            } else {
                continue;
            };
            self.cursor = next_line_start(self.raw, start);
            return Some((start, game));
        }
    }
}

impl<'a> Iterator for GameUnits<'a> {
    type Item = GameUnit<'a>;

    fn next(&mut self) -> Option<GameUnit<'a>> {
        if !self.primed {
            self.primed = true;
            self.next = self.read_anchored();
        }
        let (start, game) = self.next.take()?;
        self.next = self.read_anchored();
        let end = self.next.as_ref().map_or(self.raw.len(), |(at, _)| *at);

        Some(GameUnit {
            offset: start,
            text: self.raw[start..end.max(start)].trim_end(),
            game,
        })
    }
}

pub fn split_games(raw: &str) -> GameUnits<'_> {
    GameUnits {
        raw,
        reader: reader(raw),
        cursor: 0,
        next: None,
        primed: false,
    }
}

/// Position of the first `[` at or after `from` that opens a tag section
/// equal to `tags`. Falls back to the first tag-looking line.
fn find_tag_section(raw: &str, from: usize, tags: &[(String, String)]) -> usize {
    let mut fallback = None;
    for line in line_starts(raw, from) {
        let indent = raw[line..].len() - raw[line..].trim_start_matches([' ', '\t']).len();
        let at = line + indent;
        if !raw[at..].starts_with('[') {
            continue;
        }
        fallback.get_or_insert(at);
        if read_tags(&raw[at..]) == tags {
            return at;
        }
    }
    fallback.unwrap_or(from)
}

fn line_starts(raw: &str, from: usize) -> impl Iterator<Item = usize> + '_ {
    let first = (from == 0 || raw.as_bytes().get(from - 1) == Some(&b'\n')).then_some(from);
    first
        .into_iter()
        .chain(raw[from..].match_indices('\n').map(move |(i, _)| from + i + 1))
        .filter(move |&at| at < raw.len())
}

fn next_line_start(raw: &str, at: usize) -> usize {
    raw[at..].find('\n').map_or(raw.len(), |i| at + i + 1)
}

fn first_non_blank(raw: &str) -> usize {
    raw.len() - raw.trim_start().len()
}

/// A main line replayed from its starting position.
#[derive(Debug, Clone, Default)]
pub struct ReplayedGame {
    pub start_fen: String,
    /// FEN after each successfully applied ply.
    pub fens: Vec<String>,
    /// First move that could not be applied, with its ply index (1-based).
    pub stopped_at: Option<(usize, String)>,
}

impl ReplayedGame {
    pub fn plies(&self) -> usize {
        self.fens.len()
    }
}

/// Replay SAN moves from the standard position, stopping at the first
/// illegal move.
pub fn replay(moves: &[San]) -> ReplayedGame {
    replay_from(Chess::default(), moves)
}

pub fn replay_from(start: Chess, moves: &[San]) -> ReplayedGame {
    let mut game = ReplayedGame {
        start_fen: Fen::from_position(&start, EnPassantMode::Legal).to_string(),
        ..ReplayedGame::default()
    };
    let mut pos = start;

    for (i, san) in moves.iter().enumerate() {
        let Ok(mv) = san.to_move(&pos) else {
            game.stopped_at = Some((i + 1, san.to_string()));
            break;
        };
        pos = match pos.play(mv) {
            Ok(next) => next,
            Err(_) => {
                game.stopped_at = Some((i + 1, san.to_string()));
                break;
            }
        };
        game.fens
            .push(Fen::from_position(&pos, EnPassantMode::Legal).to_string());
    }

    game
}

/// Replay a parsed game, honoring a `SetUp`/`FEN` start. A start FEN that
/// does not parse yields an empty replay.
pub fn replay_game(game: &PgnGame) -> ReplayedGame {
    match start_position(&game.headers()) {
        Some(start) => replay_from(start, &game.moves),
        None => ReplayedGame::default(),
    }
}

/// Replay the first game of `pgn`.
pub fn replay_unit(pgn: &str) -> ReplayedGame {
    read_first_game(pgn)
        .map(|game| replay_game(&game))
        .unwrap_or_default()
}

/// Starting position declared by the tags: the standard position unless
/// `SetUp "1"` supplies a `FEN`. `None` if that FEN is invalid.
pub fn start_position(headers: &HashMap<String, String>) -> Option<Chess> {
    if headers.get("SetUp").map(String::as_str) != Some("1") {
        return Some(Chess::default());
    }
    let Some(fen) = headers.get("FEN") else {
        return Some(Chess::default());
    };
    let mode = match headers.get("Variant").map(String::as_str) {
        Some("Chess960") => CastlingMode::Chess960,
        _ => CastlingMode::Standard,
    };
    fen.parse::<Fen>().ok()?.into_position::<Chess>(mode).ok()
}

/// Header value or the unknown sentinel.
pub fn header_or_unknown(headers: &HashMap<String, String>, name: &str) -> String {
    headers
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Opening name from the `Opening` tag, or derived from Chess.com's `ECOUrl`
/// (".../openings/Vienna-Game-Copycat-Variation" -> "Vienna Game Copycat Variation").
pub fn opening_name(headers: &HashMap<String, String>) -> String {
    if let Some(name) = headers.get("Opening").filter(|v| !v.trim().is_empty()) {
        return name.trim().to_string();
    }
    headers
        .get("ECOUrl")
        .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
        .filter(|slug| !slug.is_empty())
        .map(|slug| slug.replace('-', " "))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub fn date_or_unknown(headers: &HashMap<String, String>) -> String {
    headers
        .get("Date")
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_DATE)
        .to_string()
}

/// Composite key of a raw game unit, using the same sentinels as parsing.
pub fn unit_key(headers: &HashMap<String, String>) -> GameKey {
    GameKey {
        site: header_or_unknown(headers, "Site"),
        date: date_or_unknown(headers),
        white: header_or_unknown(headers, "White"),
        black: header_or_unknown(headers, "Black"),
    }
}

/// Find the original text of `record` in `raw`.
///
/// The locator is tried first and accepted only if the game found there still
/// carries the record's key; otherwise the blob is scanned for the first game
/// with a matching (site, date, white, black).
pub fn locate_game<'a>(raw: &'a str, record: &GameRecord) -> Option<&'a str> {
    let key = record.key();

    if !record.locator.is_empty() {
        if let Some(text) = raw.get(record.locator.range()) {
            if unit_key(&parse_headers(text)) == key {
                return Some(text);
            }
        }
    }

    split_games(raw)
        .find(|unit| unit_key(&unit.headers()) == key)
        .map(|unit| unit.text)
}
