//! UCI (Universal Chess Interface) protocol library, client side.
//!
//! This crate provides the command vocabulary an analysis client sends to a
//! UCI engine and parsing for the engine's replies.
//!
//! # Commands sent
//!
//! - `uci` - Initialize engine, get id and options
//! - `isready` / `readyok` - Synchronization
//! - `ucinewgame` - Reset engine state between games
//! - `setoption name <id> value <x>` - Configure the engine
//! - `position fen <fen>` - Set position
//! - `go [depth <d>] [movetime <ms>]` - Start search
//! - `quit` - Exit engine
//!
//! # Replies parsed
//!
//! - `id name|author ...`, `uciok`, `readyok`
//! - `info ... score cp|mate ... pv ...`
//! - `bestmove <move> [ponder <move>]`, including `bestmove (none)`

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{EngineInfo, Score};

use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Engine closed the connection")]
    Closed,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id { name: Option<String>, author: Option<String> },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found. `mv` is `None` when the engine reports `(none)`,
    /// i.e. the side to move has no legal moves.
    BestMove { mv: Option<String>, ponder: Option<String> },
    /// Anything else (option declarations, banners, copyprotection...).
    Other(String),
}

impl EngineMessage {
    /// Parse one line of engine output.
    pub fn parse(line: &str) -> Result<Self, UciError> {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("uciok") => Ok(EngineMessage::UciOk),
            Some("readyok") => Ok(EngineMessage::ReadyOk),
            Some("id") => {
                let rest = |prefix: &str| line.strip_prefix(prefix).map(|s| s.trim().to_string());
                match parts.next() {
                    Some("name") => Ok(EngineMessage::Id {
                        name: rest("id name"),
                        author: None,
                    }),
                    Some("author") => Ok(EngineMessage::Id {
                        name: None,
                        author: rest("id author"),
                    }),
                    _ => Err(UciError::ParseError(format!("Malformed id line: '{}'", line))),
                }
            }
            Some("info") => EngineInfo::parse(line)
                .map(EngineMessage::Info)
                .ok_or_else(|| UciError::ParseError(format!("Malformed info line: '{}'", line))),
            Some("bestmove") => {
                let mv = match parts.next() {
                    Some("(none)") | Some("0000") => None,
                    Some(m) => Some(m.to_string()),
                    None => {
                        return Err(UciError::ParseError(
                            "bestmove without a move".to_string(),
                        ))
                    }
                };
                let ponder = match (parts.next(), parts.next()) {
                    (Some("ponder"), Some(p)) => Some(p.to_string()),
                    _ => None,
                };
                Ok(EngineMessage::BestMove { mv, ponder })
            }
            _ => Ok(EngineMessage::Other(line.to_string())),
        }
    }
}

/// Line-oriented UCI channel to an engine.
///
/// Generic over the transport so the same code drives a child process or an
/// in-memory script.
pub struct UciChannel<R: BufRead, W: Write> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> UciChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Send a command to the engine.
    pub fn send(&mut self, cmd: &GuiCommand) -> Result<(), UciError> {
        writeln!(self.writer, "{}", cmd.to_uci())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read and parse the next message from the engine.
    ///
    /// Returns [`UciError::Closed`] on end of stream.
    pub fn read_message(&mut self) -> Result<EngineMessage, UciError> {
        let mut line = String::new();
        let bytes = self.reader.read_line(&mut line)?;
        if bytes == 0 {
            return Err(UciError::Closed);
        }
        EngineMessage::parse(&line)
    }

    /// Access the underlying writer (tests inspect what was sent).
    pub fn writer(&self) -> &W {
        &self.writer
    }
}
