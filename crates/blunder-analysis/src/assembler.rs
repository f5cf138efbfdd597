//! Turns a confirmed blunder into a puzzle.

use crate::classifier::Classification;
use crate::engine::EvaluationOracle;
use crate::evaluation::SearchBudget;
use crate::records::PuzzleBlunder;
use crate::walker::TurnEvent;
use std::fmt;
use tracing::{debug, info, warn};

/// Why a blunder produced no puzzle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// The oracle failed to suggest a move in the post-blunder position.
    NoPunishment(String),
    /// The post-blunder position has no legal moves (mate or stalemate).
    NoLegalMoves,
    /// The record could not be built.
    InvalidRecord(String),
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::NoPunishment(e) => write!(f, "no punishing move: {}", e),
            DiscardReason::NoLegalMoves => f.write_str("no legal moves after the blunder"),
            DiscardReason::InvalidRecord(e) => write!(f, "invalid puzzle record: {}", e),
        }
    }
}

/// Outcome of assembling one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    Puzzle(PuzzleBlunder),
    Discarded(DiscardReason),
}

/// Queries the oracle for the punishing and the reference moves.
#[derive(Debug, Clone, Default)]
pub struct PuzzleAssembler {
    budget: SearchBudget,
}

impl PuzzleAssembler {
    pub fn new(budget: SearchBudget) -> Self {
        Self { budget }
    }

    /// Build a puzzle for a blundering turn.
    ///
    /// The punishing move comes from the post-blunder position and is
    /// mandatory. The reference move comes from the pre-blunder position and
    /// is dropped to `None` on failure.
    pub fn assemble<O: EvaluationOracle>(
        &self,
        oracle: &mut O,
        event: &TurnEvent,
        classification: &Classification,
        game_url: &str,
    ) -> Assembly {
        let punishment = oracle.best_move(&event.after, &self.budget);
        let correct_move = match oracle.best_move(&event.before, &self.budget) {
            Ok(mv) => mv,
            Err(e) => {
                warn!(move_number = event.move_number, error = %e, "reference move unavailable");
                None
            }
        };

        let solution = match punishment {
            Ok(Some(mv)) => mv,
            Ok(None) => return Assembly::Discarded(DiscardReason::NoLegalMoves),
            Err(e) => return Assembly::Discarded(DiscardReason::NoPunishment(e.to_string())),
        };
        debug!(%solution, correct_move = ?correct_move, "assembling puzzle");

        match PuzzleBlunder::new(event, &solution, correct_move, classification, game_url) {
            Ok(puzzle) => {
                info!(
                    move_number = puzzle.move_number(),
                    blundered = puzzle.blundered_move(),
                    solution = %solution,
                    difficulty = puzzle.difficulty_label(),
                    eval_change = puzzle.eval_change(),
                    "puzzle created"
                );
                Assembly::Puzzle(puzzle)
            }
            Err(e) => Assembly::Discarded(DiscardReason::InvalidRecord(e.to_string())),
        }
    }
}
