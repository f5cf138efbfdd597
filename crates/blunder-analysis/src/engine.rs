//! Evaluation oracle: the seam between the analysis pipeline and a UCI engine.
//!
//! [`EvaluationOracle`] is what the analyzer and puzzle assembler talk to.
//! [`UciSession`] implements it over any line-oriented transport, and
//! [`StockfishOracle`] binds a session to a spawned engine process.

use crate::evaluation::{EvalScore, SearchBudget};
use crate::notation::fen_string;
use shakmaty::Chess;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, trace};
use uci::{EngineMessage, GuiCommand, UciChannel, UciError};

/// Maximum number of lines to read before giving up on a UCI response.
///
/// Long searches emit many `info` lines, so this is generous.
pub const MAX_UCI_LINES: usize = 100_000;

/// Errors that can occur when working with chess engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to spawn the engine process.
    #[error("Failed to spawn engine: {0}")]
    SpawnError(#[from] std::io::Error),
    /// Engine executable was not found at the specified path.
    #[error("Engine not found at path: {0}")]
    NotFound(String),
    /// Engine failed to initialize properly (UCI handshake failed).
    #[error("Engine initialization failed")]
    InitFailed,
    /// Engine returned an invalid or unexpected response.
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
    /// Transport or protocol failure while talking to the engine.
    #[error("UCI protocol error: {0}")]
    Protocol(#[from] UciError),
}

/// Position evaluation service.
///
/// All scores are from the perspective of the side to move in the queried
/// position. Failures are reported, never papered over; callers decide what
/// a missing answer means.
pub trait EvaluationOracle {
    /// Score a position within the given budget.
    fn evaluate(&mut self, pos: &Chess, budget: &SearchBudget) -> Result<EvalScore, EngineError>;

    /// Best move for the side to move, in UCI notation.
    ///
    /// `Ok(None)` means the position has no legal moves.
    fn best_move(
        &mut self,
        pos: &Chess,
        budget: &SearchBudget,
    ) -> Result<Option<String>, EngineError>;

    /// Signal that subsequent queries belong to a different game.
    fn new_game(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

impl<O: EvaluationOracle + ?Sized> EvaluationOracle for &mut O {
    fn evaluate(&mut self, pos: &Chess, budget: &SearchBudget) -> Result<EvalScore, EngineError> {
        (**self).evaluate(pos, budget)
    }

    fn best_move(
        &mut self,
        pos: &Chess,
        budget: &SearchBudget,
    ) -> Result<Option<String>, EngineError> {
        (**self).best_move(pos, budget)
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        (**self).new_game()
    }
}

/// Engine options applied once after the `uci` handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Search threads (`setoption name Threads`).
    pub threads: Option<u32>,
    /// Transposition table size in MB (`setoption name Hash`).
    pub hash_mb: Option<u32>,
}

impl EngineOptions {
    fn commands(&self) -> Vec<GuiCommand> {
        let mut cmds = Vec::new();
        if let Some(threads) = self.threads {
            cmds.push(GuiCommand::SetOption {
                name: "Threads".to_string(),
                value: threads.to_string(),
            });
        }
        if let Some(hash) = self.hash_mb {
            cmds.push(GuiCommand::SetOption {
                name: "Hash".to_string(),
                value: hash.to_string(),
            });
        }
        cmds
    }
}

/// What one `go` search produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchOutcome {
    /// Score of the deepest scored `info` line, if any.
    pub score: Option<EvalScore>,
    /// Depth that score was reported at.
    pub depth: Option<u32>,
    /// Principal variation of that line.
    pub pv: Vec<String>,
    /// `None` when the engine answered `bestmove (none)`.
    pub best_move: Option<String>,
}

/// A UCI conversation over an arbitrary transport.
pub struct UciSession<R: BufRead, W: Write> {
    channel: UciChannel<R, W>,
    name: String,
}

impl<R: BufRead, W: Write> UciSession<R, W> {
    /// Perform the UCI handshake and apply options.
    ///
    /// # Errors
    ///
    /// - `EngineError::InitFailed` if `uciok` or `readyok` never arrives
    /// - `EngineError::Protocol` if the transport fails
    pub fn handshake(reader: R, writer: W, options: &EngineOptions) -> Result<Self, EngineError> {
        let mut session = Self {
            channel: UciChannel::new(reader, writer),
            name: String::new(),
        };

        session.channel.send(&GuiCommand::Uci)?;
        let mut name = None;
        session.wait_for(
            |msg| match msg {
                EngineMessage::Id { name: Some(n), .. } => {
                    name = Some(n.clone());
                    false
                }
                EngineMessage::UciOk => true,
                _ => false,
            },
            EngineError::InitFailed,
        )?;
        session.name = name.unwrap_or_else(|| "Unknown Engine".to_string());

        for cmd in options.commands() {
            session.channel.send(&cmd)?;
        }
        session.sync()?;

        info!(engine = %session.name, "UCI engine ready");
        Ok(session)
    }

    /// Returns the engine's name as reported via UCI protocol.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access the outgoing transport.
    pub fn writer(&self) -> &W {
        self.channel.writer()
    }

    /// Search a position and collect the final report.
    pub fn search(&mut self, pos: &Chess, budget: &SearchBudget) -> Result<SearchOutcome, EngineError> {
        let fen = fen_string(pos);
        trace!(%fen, "search");
        self.channel.send(&GuiCommand::position_fen(&fen))?;
        self.channel.send(&GuiCommand::Go(budget.go_options()))?;

        let mut outcome = SearchOutcome::default();
        for _ in 0..MAX_UCI_LINES {
            let msg = match self.channel.read_message() {
                Ok(msg) => msg,
                Err(UciError::ParseError(e)) => {
                    trace!(error = %e, "ignoring unparseable engine line");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match msg {
                EngineMessage::Info(info) if info.has_score() => {
                    outcome.score = info.score.map(EvalScore::from);
                    outcome.depth = info.depth;
                    outcome.pv = info.pv;
                }
                EngineMessage::BestMove { mv, .. } => {
                    outcome.best_move = mv;
                    debug!(
                        depth = ?outcome.depth,
                        score = ?outcome.score,
                        best_move = ?outcome.best_move,
                        "search finished"
                    );
                    return Ok(outcome);
                }
                _ => {}
            }
        }

        Err(EngineError::InvalidResponse(
            "Too many lines without bestmove".to_string(),
        ))
    }

    fn sync(&mut self) -> Result<(), EngineError> {
        self.channel.send(&GuiCommand::IsReady)?;
        self.wait_for(
            |msg| matches!(msg, EngineMessage::ReadyOk),
            EngineError::InitFailed,
        )
    }

    fn wait_for<F>(&mut self, mut done: F, exhausted: EngineError) -> Result<(), EngineError>
    where
        F: FnMut(&EngineMessage) -> bool,
    {
        for _ in 0..MAX_UCI_LINES {
            let msg = match self.channel.read_message() {
                Ok(msg) => msg,
                Err(UciError::ParseError(e)) => {
                    trace!(error = %e, "ignoring unparseable engine line");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if done(&msg) {
                return Ok(());
            }
        }
        Err(exhausted)
    }

    fn quit(&mut self) -> Result<(), EngineError> {
        self.channel.send(&GuiCommand::Quit)?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> EvaluationOracle for UciSession<R, W> {
    fn evaluate(&mut self, pos: &Chess, budget: &SearchBudget) -> Result<EvalScore, EngineError> {
        self.search(pos, budget)?
            .score
            .ok_or_else(|| EngineError::InvalidResponse("No score reported".to_string()))
    }

    fn best_move(
        &mut self,
        pos: &Chess,
        budget: &SearchBudget,
    ) -> Result<Option<String>, EngineError> {
        Ok(self.search(pos, budget)?.best_move)
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        self.channel.send(&GuiCommand::UciNewGame)?;
        self.sync()
    }
}

/// Stockfish (or any UCI engine) running as a child process.
///
/// The process is told to quit and reaped when the oracle is dropped, on
/// every exit path.
pub struct StockfishOracle {
    session: UciSession<BufReader<ChildStdout>, ChildStdin>,
    process: Child,
}

impl StockfishOracle {
    /// Spawn the engine and complete the handshake.
    ///
    /// # Arguments
    ///
    /// * `engine_path` - Executable path or a name resolved through `PATH`
    /// * `options` - Threads/Hash settings
    ///
    /// # Errors
    ///
    /// - `EngineError::NotFound` if the executable cannot be located
    /// - `EngineError::SpawnError` if the engine process fails to start
    /// - `EngineError::InitFailed` if UCI initialization fails
    pub fn spawn(engine_path: &str, options: &EngineOptions) -> Result<Self, EngineError> {
        let mut process = Command::new(engine_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => EngineError::NotFound(engine_path.to_string()),
                _ => EngineError::SpawnError(e),
            })?;

        let stdin = process.stdin.take().ok_or(EngineError::InitFailed)?;
        let stdout = process.stdout.take().ok_or(EngineError::InitFailed)?;

        match UciSession::handshake(BufReader::new(stdout), stdin, options) {
            Ok(session) => Ok(Self { session, process }),
            Err(e) => {
                let _ = process.kill();
                let _ = process.wait();
                Err(e)
            }
        }
    }

    /// Returns the engine's name as reported via UCI protocol.
    pub fn name(&self) -> &str {
        self.session.name()
    }
}

impl EvaluationOracle for StockfishOracle {
    fn evaluate(&mut self, pos: &Chess, budget: &SearchBudget) -> Result<EvalScore, EngineError> {
        self.session.evaluate(pos, budget)
    }

    fn best_move(
        &mut self,
        pos: &Chess,
        budget: &SearchBudget,
    ) -> Result<Option<String>, EngineError> {
        self.session.best_move(pos, budget)
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        self.session.new_game()
    }
}

impl Drop for StockfishOracle {
    fn drop(&mut self) {
        let _ = self.session.quit();
        let _ = self.process.wait();
    }
}

/// Pre-flight check: start the engine, score the initial position with a
/// shallow search, shut it down.
///
/// Returns the engine's reported name.
pub fn check_engine(engine_path: &str) -> Result<String, EngineError> {
    let mut oracle = StockfishOracle::spawn(engine_path, &EngineOptions::default())?;
    let probe = SearchBudget::new(Some(std::time::Duration::from_millis(100)), Some(1));
    let score = oracle.evaluate(&Chess::default(), &probe)?;
    debug!(engine = %oracle.name(), ?score, "engine pre-flight passed");
    Ok(oracle.name().to_string())
}
