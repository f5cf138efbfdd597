//! Board and move encodings shared by the walker, the oracle and the records.

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move};
use thiserror::Error;

/// FEN of a position, en passant square only when a capture is legal.
pub fn fen_string(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// SAN of a legal move in the position it is played from, with check or
/// mate suffix.
pub fn san_string(pos: &Chess, mv: &Move) -> String {
    SanPlus::from_move(pos.clone(), mv.clone()).to_string()
}

/// Long algebraic (UCI) form of a move.
pub fn uci_string(mv: &Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}

/// Lowercase color name used in the serialized records.
pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Why a textual move could not be turned into a legal move.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveParseError {
    /// Neither valid SAN nor valid UCI syntax.
    #[error("unparseable move '{0}'")]
    Syntax(String),
    /// Well-formed, but not legal in the current position.
    #[error("illegal move '{0}' in current position")]
    Illegal(String),
}

/// Resolve a move given in SAN (with optional check suffix) or UCI notation
/// against a position.
pub fn resolve_move(pos: &Chess, text: &str) -> Result<Move, MoveParseError> {
    let text = text.trim();
    if let Ok(san_plus) = text.parse::<SanPlus>() {
        if let Ok(mv) = san_plus.san.to_move(pos) {
            return Ok(mv);
        }
    }
    match text.parse::<UciMove>() {
        Ok(uci) => uci
            .to_move(pos)
            .map_err(|_| MoveParseError::Illegal(text.to_string())),
        Err(_) if text.parse::<SanPlus>().is_ok() => {
            Err(MoveParseError::Illegal(text.to_string()))
        }
        Err(_) => Err(MoveParseError::Syntax(text.to_string())),
    }
}
