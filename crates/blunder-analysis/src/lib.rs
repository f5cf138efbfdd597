//! Blunder detection and puzzle mining with Stockfish integration.
//!
//! This crate replays recorded games, asks an evaluation oracle to score the
//! position before and after each of the tracked player's moves, flags moves
//! that throw away an equal position, and turns those blunders into puzzles
//! solved from the opponent's side.
//!
//! # Overview
//!
//! - [`EvalScore`] - Position evaluation (centipawn or mate score)
//! - [`EvaluationOracle`] - What the pipeline needs from an engine
//! - [`StockfishOracle`] - UCI engine process implementing the oracle
//! - [`GameWalker`] - Replays a move list, one step per ply
//! - [`BlunderClassifier`] - Primary blunder rule, difficulty, secondary pass
//! - [`PuzzleAssembler`] - Builds a [`PuzzleBlunder`] from a confirmed blunder
//! - [`GameAnalyzer`] - Drives all of the above for one game at a time
//!
//! # Example
//!
//! ```ignore
//! use blunder_analysis::{AnalysisConfig, EngineOptions, GameAnalyzer, StockfishOracle};
//!
//! let oracle = StockfishOracle::spawn("stockfish", &EngineOptions::default())?;
//! let mut analyzer = GameAnalyzer::new(oracle, AnalysisConfig::default())?;
//! let report = analyzer.analyze_pgn(&pgn, "alice");
//! println!("{} puzzles", report.puzzles.len());
//! ```

pub mod analyzer;
pub mod assembler;
pub mod classifier;
pub mod engine;
pub mod evaluation;
pub mod game;
pub mod notation;
pub mod records;
pub mod stats;
pub mod walker;

pub use analyzer::{AnalysisConfig, GameAnalyzer, GameOutcome, GameReport, PlyOutcome};
pub use assembler::{Assembly, DiscardReason, PuzzleAssembler};
pub use classifier::{
    BlunderClassifier, BlunderKind, BlunderPolicy, Classification, Difficulty, PolicyError,
    Strictness,
};
pub use engine::{
    check_engine, EngineError, EngineOptions, EvaluationOracle, StockfishOracle, UciSession,
};
pub use evaluation::{EvalScore, SearchBudget, MATE_SCORE};
pub use game::{games_for_player, read_games, GameError, GameInput, GameRecord};
pub use records::{PositionEvaluation, PuzzleBlunder, RecordError};
pub use stats::{EvaluationStatistics, PuzzleStatistics};
pub use walker::{GameWalker, TurnEvent, WalkStep};
