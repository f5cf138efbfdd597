//! Output records: one evaluation per tracked turn, one puzzle per confirmed
//! blunder.

use crate::classifier::{BlunderKind, Classification};
use crate::notation::fen_string;
use crate::walker::TurnEvent;
use chrono::Utc;
use serde::Serialize;
use shakmaty::Color;
use thiserror::Error;

/// Errors from building a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Puzzle solution move is empty")]
    EmptySolution,
    #[error("Move is not flagged as a blunder")]
    NotABlunder,
}

/// Serialize [`Color`] as `"white"` / `"black"`.
pub mod color_serde {
    use crate::notation::color_name;
    use serde::Serializer;
    use shakmaty::Color;

    pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(color_name(*color))
    }
}

/// Evaluation of one tracked-side move.
///
/// Both evaluations are from the mover's point of view. `eval_change` and
/// `is_blunder` are derived at construction and cannot be set directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionEvaluation {
    game_id: String,
    move_number: u32,
    fen: String,
    #[serde(with = "color_serde")]
    player_turn: Color,
    move_san: String,
    prev_eval: i32,
    curr_eval: i32,
    eval_change: i32,
    is_blunder: bool,
    blunder_type: Option<BlunderKind>,
    timestamp: String,
}

impl PositionEvaluation {
    /// Build a record; `eval_change` and `is_blunder` are derived.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        game_id: &str,
        move_number: u32,
        fen: &str,
        player_turn: Color,
        move_san: &str,
        prev_eval: i32,
        curr_eval: i32,
        blunder_type: Option<BlunderKind>,
    ) -> Self {
        Self {
            game_id: game_id.to_string(),
            move_number,
            fen: fen.to_string(),
            player_turn,
            move_san: move_san.to_string(),
            prev_eval,
            curr_eval,
            eval_change: prev_eval.saturating_sub(curr_eval),
            is_blunder: blunder_type == Some(BlunderKind::Blunder),
            blunder_type,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Record for a walked turn.
    pub fn from_turn(
        game_id: &str,
        event: &TurnEvent,
        prev_eval: i32,
        curr_eval: i32,
        classification: &Classification,
    ) -> Self {
        Self::new(
            game_id,
            event.move_number,
            &fen_string(&event.before),
            event.mover,
            &event.san,
            prev_eval,
            curr_eval,
            classification.kind,
        )
    }

    /// Copy of this record tagged by the secondary pass.
    pub fn tagged(&self, kind: BlunderKind) -> Self {
        Self {
            blunder_type: Some(kind),
            ..self.clone()
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn move_number(&self) -> u32 {
        self.move_number
    }

    /// Position before the move.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn player_turn(&self) -> Color {
        self.player_turn
    }

    pub fn move_san(&self) -> &str {
        &self.move_san
    }

    pub fn prev_eval(&self) -> i32 {
        self.prev_eval
    }

    pub fn curr_eval(&self) -> i32 {
        self.curr_eval
    }

    /// `prev_eval - curr_eval`, saturating.
    pub fn eval_change(&self) -> i32 {
        self.eval_change
    }

    /// Whether the primary rule flagged this move.
    pub fn is_blunder(&self) -> bool {
        self.is_blunder
    }

    pub fn blunder_type(&self) -> Option<BlunderKind> {
        self.blunder_type
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

/// A puzzle built from a confirmed blunder.
///
/// The puzzle is solved by the side that did *not* blunder, starting from
/// the position right after the blunder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PuzzleBlunder {
    fen: String,
    pre_blunder_fen: String,
    solution: Vec<String>,
    #[serde(with = "color_serde")]
    player_color: Color,
    #[serde(with = "color_serde")]
    original_player_color: Color,
    move_number: u32,
    blundered_move: String,
    blundered_move_uci: String,
    correct_move: Option<String>,
    eval_change: i32,
    difficulty: u8,
    difficulty_label: String,
    blunder_type: BlunderKind,
    game_url: String,
    timestamp: String,
    show_solution_text: bool,
}

impl PuzzleBlunder {
    /// Build a puzzle from the blundering turn.
    ///
    /// # Arguments
    ///
    /// * `event` - The turn on which the tracked side blundered
    /// * `solution` - Punishing move (UCI) in the post-blunder position
    /// * `correct_move` - Reference move (UCI) in the pre-blunder position
    /// * `classification` - Verdict for the turn
    /// * `game_url` - Source game
    ///
    /// # Errors
    ///
    /// - `RecordError::EmptySolution` if `solution` is blank
    /// - `RecordError::NotABlunder` if the classification has no kind
    pub fn new(
        event: &TurnEvent,
        solution: &str,
        correct_move: Option<String>,
        classification: &Classification,
        game_url: &str,
    ) -> Result<Self, RecordError> {
        let solution = solution.trim();
        if solution.is_empty() {
            return Err(RecordError::EmptySolution);
        }
        let blunder_type = classification.kind.ok_or(RecordError::NotABlunder)?;

        Ok(Self {
            fen: fen_string(&event.after),
            pre_blunder_fen: fen_string(&event.before),
            solution: vec![solution.to_string()],
            player_color: event.mover.other(),
            original_player_color: event.mover,
            move_number: event.move_number,
            blundered_move: event.san.clone(),
            blundered_move_uci: event.uci.clone(),
            correct_move,
            eval_change: classification.eval_change.saturating_abs(),
            difficulty: classification.difficulty.level(),
            difficulty_label: classification.difficulty.label().to_string(),
            blunder_type,
            game_url: game_url.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            show_solution_text: false,
        })
    }

    /// Position the solver starts from.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn pre_blunder_fen(&self) -> &str {
        &self.pre_blunder_fen
    }

    pub fn solution(&self) -> &[String] {
        &self.solution
    }

    /// Side the solver plays.
    pub fn player_color(&self) -> Color {
        self.player_color
    }

    /// Side that blundered.
    pub fn original_player_color(&self) -> Color {
        self.original_player_color
    }

    pub fn move_number(&self) -> u32 {
        self.move_number
    }

    pub fn blundered_move(&self) -> &str {
        &self.blundered_move
    }

    pub fn blundered_move_uci(&self) -> &str {
        &self.blundered_move_uci
    }

    pub fn correct_move(&self) -> Option<&str> {
        self.correct_move.as_deref()
    }

    pub fn eval_change(&self) -> i32 {
        self.eval_change
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn difficulty_label(&self) -> &str {
        &self.difficulty_label
    }

    pub fn blunder_type(&self) -> BlunderKind {
        self.blunder_type
    }

    pub fn game_url(&self) -> &str {
        &self.game_url
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}
