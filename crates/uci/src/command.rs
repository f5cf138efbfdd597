//! Commands sent from the analysis client to a UCI engine.

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Check if engine is ready.
    IsReady,
    /// Tell the engine the next search belongs to a different game.
    UciNewGame,
    /// Set an engine option.
    SetOption { name: String, value: String },
    /// Set up the position to search.
    Position { fen: String },
    /// Start calculating.
    Go(GoOptions),
    /// Quit the engine.
    Quit,
}

/// Options for the `go` command.
///
/// Both limits may be set at once; the engine stops at whichever is hit first
/// and still answers with the best move found so far.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search for exactly this time in milliseconds.
    pub movetime: Option<u64>,
    /// Search to this depth.
    pub depth: Option<u32>,
}

impl GoOptions {
    fn to_uci(&self) -> String {
        let mut parts = vec!["go".to_string()];
        if let Some(d) = self.depth {
            parts.push(format!("depth {}", d));
        }
        if let Some(t) = self.movetime {
            parts.push(format!("movetime {}", t));
        }
        parts.join(" ")
    }
}

impl GuiCommand {
    /// Format the command as a single protocol line (no trailing newline).
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            GuiCommand::Position { fen } => format!("position fen {}", fen.trim()),
            GuiCommand::Go(opts) => opts.to_uci(),
            GuiCommand::Quit => "quit".to_string(),
        }
    }

    /// Shorthand for `position fen <fen>`.
    pub fn position_fen(fen: &str) -> Self {
        GuiCommand::Position {
            fen: fen.to_string(),
        }
    }
}
