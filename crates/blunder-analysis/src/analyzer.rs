//! Game analysis pipeline.
//!
//! This module provides the [`GameAnalyzer`], which walks one game at a time:
//! evaluate before the move, evaluate after, classify, and on a blunder ask
//! the [`PuzzleAssembler`] for a puzzle. Every tracked turn yields a
//! [`PositionEvaluation`]; nothing in a single game is fatal.

use crate::assembler::{Assembly, PuzzleAssembler};
use crate::classifier::{BlunderClassifier, BlunderPolicy, PolicyError};
use crate::engine::EvaluationOracle;
use crate::evaluation::{for_previous_mover, EvalScore, SearchBudget};
use crate::game::{game_id_from_url, read_game, GameInput};
use crate::records::{PositionEvaluation, PuzzleBlunder};
use crate::walker::{GameWalker, WalkStep};
use shakmaty::Chess;
use tracing::{debug, info, warn};

/// Configuration for game analysis.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    /// Limits for every oracle query.
    pub budget: SearchBudget,
    /// Classification thresholds.
    pub policy: BlunderPolicy,
}

/// What happened to one ply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlyOutcome {
    /// Tracked move, evaluated on both sides.
    Evaluated {
        ply: usize,
        move_number: u32,
        is_blunder: bool,
        /// Evaluations replaced by the neutral score (0, 1 or 2).
        fallbacks: u8,
    },
    /// Opponent move, applied without evaluation.
    Advanced { ply: usize },
    /// Not applied.
    Skipped { ply: usize, reason: String },
}

/// How far the analysis of a game got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    /// Every ply was visited.
    Completed,
    /// The game could not be read; nothing was analyzed.
    Unparsed(String),
}

/// Everything produced for one game.
#[derive(Debug, Clone)]
pub struct GameReport {
    pub game_id: String,
    pub game_url: String,
    pub outcome: GameOutcome,
    pub evaluations: Vec<PositionEvaluation>,
    pub puzzles: Vec<PuzzleBlunder>,
    pub plies: Vec<PlyOutcome>,
    /// Oracle evaluations replaced by the neutral score.
    pub eval_fallbacks: usize,
    /// Blunders that produced no puzzle.
    pub discarded_puzzles: usize,
}

impl GameReport {
    fn new(game_url: &str) -> Self {
        Self {
            game_id: game_id_from_url(game_url),
            game_url: game_url.to_string(),
            outcome: GameOutcome::Completed,
            evaluations: Vec::new(),
            puzzles: Vec::new(),
            plies: Vec::new(),
            eval_fallbacks: 0,
            discarded_puzzles: 0,
        }
    }

    fn unparsed(game_url: &str, reason: String) -> Self {
        warn!(game_url, %reason, "could not parse game");
        Self {
            outcome: GameOutcome::Unparsed(reason),
            ..Self::new(game_url)
        }
    }

    /// Number of plies that could not be applied.
    pub fn skipped_plies(&self) -> usize {
        self.plies
            .iter()
            .filter(|p| matches!(p, PlyOutcome::Skipped { .. }))
            .count()
    }

    /// Number of evaluations flagged by the primary rule.
    pub fn blunder_count(&self) -> usize {
        self.evaluations.iter().filter(|e| e.is_blunder()).count()
    }
}

/// Analyzes games for blunders and mines puzzles from them.
///
/// Owns its oracle; queries are issued strictly one after another.
pub struct GameAnalyzer<O: EvaluationOracle> {
    oracle: O,
    classifier: BlunderClassifier,
    assembler: PuzzleAssembler,
    budget: SearchBudget,
}

impl<O: EvaluationOracle> GameAnalyzer<O> {
    /// Creates a new game analyzer around an oracle.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy in `config` is inconsistent.
    pub fn new(oracle: O, config: AnalysisConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            oracle,
            classifier: BlunderClassifier::new(config.policy)?,
            assembler: PuzzleAssembler::new(config.budget),
            budget: config.budget,
        })
    }

    pub fn classifier(&self) -> &BlunderClassifier {
        &self.classifier
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Give the oracle back, ending the session.
    pub fn into_oracle(self) -> O {
        self.oracle
    }

    /// Analyze the first game of a PGN text from `username`'s side.
    pub fn analyze_pgn(&mut self, pgn: &str, username: &str) -> GameReport {
        let record = match read_game(pgn) {
            Ok(record) => record,
            Err(e) => return GameReport::unparsed("", e.to_string()),
        };
        let Some(tracked) = record.color_of(username) else {
            let url = record.url().unwrap_or_default().to_string();
            return GameReport::unparsed(&url, format!("{} did not play in this game", username));
        };
        self.analyze(&GameInput::from_record(&record, tracked, 0))
    }

    /// Analyze one game.
    ///
    /// Never fails: an unreadable start position yields an empty report with
    /// [`GameOutcome::Unparsed`], per-ply problems are recorded in
    /// [`GameReport::plies`].
    pub fn analyze(&mut self, game: &GameInput) -> GameReport {
        let mut report = GameReport::new(&game.game_url);
        let start = match game.starting_position() {
            Ok(pos) => pos,
            Err(e) => return GameReport::unparsed(&game.game_url, e.to_string()),
        };

        info!(
            game_id = %report.game_id,
            tracked = ?game.tracked,
            plies = game.moves.len(),
            "analyzing game"
        );

        let mut session_open = false;
        for step in GameWalker::new(start, &game.moves, game.tracked) {
            let event = match step {
                WalkStep::Turn(event) => event,
                WalkStep::OpponentMove { ply, .. } => {
                    report.plies.push(PlyOutcome::Advanced { ply });
                    continue;
                }
                WalkStep::Skipped { ply, reason, .. } => {
                    report.plies.push(PlyOutcome::Skipped {
                        ply,
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            if !session_open {
                if let Err(e) = self.oracle.new_game() {
                    warn!(error = %e, "oracle did not acknowledge new game");
                }
                session_open = true;
            }

            let mut fallbacks = 0u8;
            let prev_eval = match self.evaluate(&event.before, event.move_number) {
                Some(score) => score.to_centipawns(),
                None => {
                    fallbacks += 1;
                    EvalScore::NEUTRAL.to_centipawns()
                }
            };
            let curr_eval = match self.evaluate(&event.after, event.move_number) {
                Some(score) => for_previous_mover(score.to_centipawns()),
                None => {
                    fallbacks += 1;
                    EvalScore::NEUTRAL.to_centipawns()
                }
            };
            report.eval_fallbacks += usize::from(fallbacks);

            let verdict = self.classifier.classify(prev_eval, curr_eval, event.mover);
            debug!(
                move_number = event.move_number,
                san = %event.san,
                prev_eval,
                curr_eval,
                eval_change = verdict.eval_change,
                "evaluated move"
            );

            report.evaluations.push(PositionEvaluation::from_turn(
                &report.game_id,
                &event,
                prev_eval,
                curr_eval,
                &verdict,
            ));
            report.plies.push(PlyOutcome::Evaluated {
                ply: event.ply,
                move_number: event.move_number,
                is_blunder: verdict.is_blunder,
                fallbacks,
            });

            if !verdict.is_blunder {
                continue;
            }
            info!(
                move_number = event.move_number,
                san = %event.san,
                eval_change = verdict.eval_change,
                "blunder found"
            );
            match self
                .assembler
                .assemble(&mut self.oracle, &event, &verdict, &game.game_url)
            {
                Assembly::Puzzle(puzzle) => report.puzzles.push(puzzle),
                Assembly::Discarded(reason) => {
                    warn!(move_number = event.move_number, %reason, "puzzle discarded");
                    report.discarded_puzzles += 1;
                }
            }
        }

        info!(
            game_id = %report.game_id,
            evaluations = report.evaluations.len(),
            blunders = report.blunder_count(),
            puzzles = report.puzzles.len(),
            skipped = report.skipped_plies(),
            fallbacks = report.eval_fallbacks,
            "game analyzed"
        );
        report
    }

    fn evaluate(&mut self, pos: &Chess, move_number: u32) -> Option<EvalScore> {
        match self.oracle.evaluate(pos, &self.budget) {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(move_number, error = %e, "evaluation failed, using neutral score");
                None
            }
        }
    }
}
