//! Chess position evaluation types.

use std::time::Duration;

/// Integer stand-in for a forced mate, in centipawns.
pub const MATE_SCORE: i32 = 9999;

/// Represents a chess position evaluation.
///
/// Evaluations are always relative to the side to move in the position that
/// was searched: positive means the side to move is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalScore {
    /// Centipawn evaluation.
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, zero or negative =
    /// side to move gets mated).
    Mate(i32),
}

impl EvalScore {
    /// Neutral score used when the oracle could not produce one.
    pub const NEUTRAL: EvalScore = EvalScore::Centipawns(0);

    /// Collapse to a signed centipawn integer, mapping mates to the
    /// [`MATE_SCORE`] sentinel.
    pub fn to_centipawns(self) -> i32 {
        match self {
            EvalScore::Centipawns(cp) => cp,
            EvalScore::Mate(n) if n > 0 => MATE_SCORE,
            EvalScore::Mate(_) => -MATE_SCORE,
        }
    }

    /// Whether the score reports a forced mate for either side.
    pub fn is_mate(self) -> bool {
        matches!(self, EvalScore::Mate(_))
    }
}

impl From<uci::Score> for EvalScore {
    fn from(score: uci::Score) -> Self {
        match score {
            uci::Score::Cp(cp) => EvalScore::Centipawns(cp),
            uci::Score::Mate(n) => EvalScore::Mate(n),
        }
    }
}

/// Re-express a score for the player who just moved.
///
/// The oracle scores the post-move position for the side now to move, which
/// is the opponent of the mover; the mover's view is the negation.
pub fn for_previous_mover(post_move_score: i32) -> i32 {
    -post_move_score
}

/// Time and depth limits for a single oracle query.
///
/// Whichever limit is hit first ends the search; the answer found so far is
/// returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    /// Wall-clock limit per query.
    pub movetime: Option<Duration>,
    /// Depth limit per query.
    pub depth: Option<u32>,
}

impl SearchBudget {
    pub fn new(movetime: Option<Duration>, depth: Option<u32>) -> Self {
        Self { movetime, depth }
    }

    pub(crate) fn go_options(&self) -> uci::GoOptions {
        uci::GoOptions {
            movetime: self.movetime.map(|t| t.as_millis() as u64),
            depth: self.depth,
        }
    }
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            movetime: Some(Duration::from_secs(20)),
            depth: Some(22),
        }
    }
}
