//! Replays a move list against a starting position.
//!
//! The walker owns the board for the duration of one game. It advances one
//! ply per iteration and reports whether that ply belonged to the tracked
//! side (a [`TurnEvent`]), to the opponent, or could not be applied.

use crate::notation::{resolve_move, san_string, uci_string, MoveParseError};
use shakmaty::{Chess, Color, Move, Position};
use tracing::warn;

/// One tracked-side move, with the board on both sides of it.
#[derive(Debug, Clone)]
pub struct TurnEvent {
    /// Zero-based index into the move list.
    pub ply: usize,
    /// Full-move number of the position the move was played from.
    pub move_number: u32,
    /// Side that played the move (always the tracked side).
    pub mover: Color,
    /// Position before the move.
    pub before: Chess,
    /// Position after the move.
    pub after: Chess,
    /// The move itself.
    pub mv: Move,
    /// SAN as played, check suffix included.
    pub san: String,
    /// UCI long algebraic form.
    pub uci: String,
}

/// Result of advancing the walker by one ply.
#[derive(Debug, Clone)]
pub enum WalkStep {
    /// The tracked side moved.
    Turn(TurnEvent),
    /// The other side moved; the board advanced with nothing to evaluate.
    OpponentMove { ply: usize, san: String },
    /// The ply could not be applied and the board was left unchanged.
    Skipped {
        ply: usize,
        text: String,
        reason: MoveParseError,
    },
}

/// Lazy replay of a game from the tracked side's point of view.
pub struct GameWalker<'a> {
    moves: &'a [String],
    tracked: Color,
    position: Chess,
    next: usize,
}

impl<'a> GameWalker<'a> {
    /// Walk `moves` (SAN or UCI) starting from `start`.
    pub fn new(start: Chess, moves: &'a [String], tracked: Color) -> Self {
        Self {
            moves,
            tracked,
            position: start,
            next: 0,
        }
    }

    /// Current board, after every ply yielded so far.
    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// Number of plies consumed, applied or skipped.
    pub fn plies_seen(&self) -> usize {
        self.next
    }
}

impl Iterator for GameWalker<'_> {
    type Item = WalkStep;

    fn next(&mut self) -> Option<WalkStep> {
        let text = self.moves.get(self.next)?;
        let ply = self.next;
        self.next += 1;

        let mv = match resolve_move(&self.position, text) {
            Ok(mv) => mv,
            Err(reason) => {
                warn!(ply, mv = %text, %reason, "skipping ply");
                return Some(WalkStep::Skipped {
                    ply,
                    text: text.clone(),
                    reason,
                });
            }
        };

        let before = self.position.clone();
        let mover = before.turn();
        let move_number = before.fullmoves().get();
        let san = san_string(&before, &mv);

        let after = match before.clone().play(mv.clone()) {
            Ok(after) => after,
            Err(_) => {
                let reason = MoveParseError::Illegal(text.clone());
                warn!(ply, mv = %text, %reason, "skipping ply");
                return Some(WalkStep::Skipped {
                    ply,
                    text: text.clone(),
                    reason,
                });
            }
        };
        self.position = after.clone();

        if mover != self.tracked {
            return Some(WalkStep::OpponentMove { ply, san });
        }

        Some(WalkStep::Turn(TurnEvent {
            ply,
            move_number,
            mover,
            uci: uci_string(&mv),
            before,
            after,
            mv,
            san,
        }))
    }
}

/// Convenience: only the tracked side's turns.
pub fn tracked_turns(
    start: Chess,
    moves: &[String],
    tracked: Color,
) -> impl Iterator<Item = TurnEvent> + '_ {
    GameWalker::new(start, moves, tracked).filter_map(|step| match step {
        WalkStep::Turn(event) => Some(event),
        _ => None,
    })
}
