//! Game input: PGN text in, move lists and metadata out.

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Color};
use std::ops::ControlFlow;
use thiserror::Error;
use tracing::debug;

/// Errors from reading game input.
#[derive(Error, Debug)]
pub enum GameError {
    /// The PGN text could not be read.
    #[error("Failed to read PGN: {0}")]
    Read(#[from] std::io::Error),
    /// The text contains no game.
    #[error("No game found in PGN")]
    NoGame,
    /// The `FEN` tag does not parse.
    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },
    /// The `FEN` tag parses but is not a legal chess position.
    #[error("Illegal starting position '{fen}': {reason}")]
    IllegalPosition { fen: String, reason: String },
}

/// Parse a FEN into a playable position.
pub fn position_from_fen(fen: &str) -> Result<Chess, GameError> {
    let parsed: Fen = fen.trim().parse().map_err(|e: shakmaty::fen::ParseFenError| {
        GameError::InvalidFen {
            fen: fen.to_string(),
            reason: e.to_string(),
        }
    })?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e: shakmaty::PositionError<Chess>| GameError::IllegalPosition {
            fen: fen.to_string(),
            reason: e.to_string(),
        })
}

/// Identifier of a game: the last path segment of its URL.
pub fn game_id_from_url(url: &str) -> String {
    if url.is_empty() {
        return "unknown_game".to_string();
    }
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// One game as read from PGN: its tags and main-line moves in SAN.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameRecord {
    pub tags: Vec<(String, String)>,
    pub moves: Vec<String>,
}

impl GameRecord {
    /// Value of a tag, by exact name.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Starting position: the `FEN` tag if present, else the standard start.
    pub fn starting_position(&self) -> Result<Chess, GameError> {
        match self.tag("FEN") {
            Some(fen) => position_from_fen(fen),
            None => Ok(Chess::default()),
        }
    }

    /// Side played by `username`, compared case-insensitively against the
    /// `White` and `Black` tags.
    pub fn color_of(&self, username: &str) -> Option<Color> {
        let matches = |tag: &str| {
            self.tag(tag)
                .is_some_and(|name| name.eq_ignore_ascii_case(username))
        };
        if matches("White") {
            Some(Color::White)
        } else if matches("Black") {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Link to the game: `Link` tag, else a URL-valued `Site` tag.
    pub fn url(&self) -> Option<&str> {
        self.tag("Link").or_else(|| {
            self.tag("Site")
                .filter(|site| site.starts_with("http://") || site.starts_with("https://"))
        })
    }

    /// Number of full moves in the main line.
    pub fn full_moves(&self) -> usize {
        self.moves.len().div_ceil(2)
    }
}

/// A game ready for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInput {
    pub game_url: String,
    pub tracked: Color,
    /// FEN of the starting position; `None` for the standard start.
    pub start_fen: Option<String>,
    /// Moves in SAN or UCI notation.
    pub moves: Vec<String>,
}

impl GameInput {
    pub fn new(game_url: &str, tracked: Color, moves: Vec<String>) -> Self {
        Self {
            game_url: game_url.to_string(),
            tracked,
            start_fen: None,
            moves,
        }
    }

    /// Same game starting from a custom position.
    pub fn with_start_fen(mut self, fen: &str) -> Self {
        self.start_fen = Some(fen.to_string());
        self
    }

    /// Identifier derived from the URL.
    pub fn game_id(&self) -> String {
        game_id_from_url(&self.game_url)
    }

    pub fn starting_position(&self) -> Result<Chess, GameError> {
        match &self.start_fen {
            Some(fen) => position_from_fen(fen),
            None => Ok(Chess::default()),
        }
    }

    /// Build from a parsed PGN game. `index` names games without a link.
    pub fn from_record(record: &GameRecord, tracked: Color, index: usize) -> Self {
        let game_url = record
            .url()
            .map(str::to_string)
            .unwrap_or_else(|| format!("local_pgn_{}", index));
        Self {
            game_url,
            tracked,
            start_fen: record.tag("FEN").map(str::to_string),
            moves: record.moves.clone(),
        }
    }
}

/// Collects tags and main-line SAN for each game.
struct RecordCollector;

impl Visitor for RecordCollector {
    type Tags = Vec<(String, String)>;
    type Movetext = GameRecord;
    type Output = GameRecord;

    fn begin_tags(&mut self) -> ControlFlow<GameRecord, Self::Tags> {
        ControlFlow::Continue(Vec::new())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<GameRecord> {
        tags.push((
            String::from_utf8_lossy(name).into_owned(),
            value.decode_utf8_lossy().into_owned(),
        ));
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<GameRecord, GameRecord> {
        ControlFlow::Continue(GameRecord {
            tags,
            moves: Vec::new(),
        })
    }

    fn san(&mut self, record: &mut GameRecord, san_plus: SanPlus) -> ControlFlow<GameRecord> {
        record.moves.push(san_plus.to_string());
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _record: &mut GameRecord) -> ControlFlow<GameRecord, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, record: GameRecord) -> GameRecord {
        record
    }
}

/// Read every game in a PGN text.
pub fn read_games(pgn: &str) -> Result<Vec<GameRecord>, GameError> {
    let mut reader = Reader::new(pgn.as_bytes());
    let mut games = Vec::new();
    while let Some(game) = reader.read_game(&mut RecordCollector)? {
        games.push(game);
    }
    Ok(games)
}

/// Read the first game in a PGN text.
pub fn read_game(pgn: &str) -> Result<GameRecord, GameError> {
    let mut reader = Reader::new(pgn.as_bytes());
    reader
        .read_game(&mut RecordCollector)?
        .filter(|g| !g.tags.is_empty() || !g.moves.is_empty())
        .ok_or(GameError::NoGame)
}

/// Games from a PGN text in which `username` played, with at least
/// `min_moves` full moves, in file order.
pub fn games_for_player(
    pgn: &str,
    username: &str,
    min_moves: usize,
) -> Result<Vec<GameInput>, GameError> {
    let mut selected = Vec::new();
    for (index, record) in read_games(pgn)?.iter().enumerate() {
        let Some(tracked) = record.color_of(username) else {
            debug!(index, "skipping game without {}", username);
            continue;
        };
        if record.full_moves() < min_moves {
            debug!(index, moves = record.full_moves(), min_moves, "skipping short game");
            continue;
        }
        selected.push(GameInput::from_record(record, tracked, index));
    }
    Ok(selected)
}
