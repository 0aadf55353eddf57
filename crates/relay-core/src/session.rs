//! Per-game turn and move history bookkeeping

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// The other side
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Name as printed in engine prompts
    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "White",
            Side::Black => "Black",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted exchange with the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Move submitted by a human player
    pub submitted: String,
    /// Engine reply, always present in single player mode
    pub reply: Option<String>,
}

/// Prompt an engine prints while waiting for input, e.g. `White (3) :`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptCursor {
    /// Side the prompt asks a move from
    pub side: Side,
    /// Move number printed in the prompt
    pub number: usize,
}

impl PromptCursor {
    /// Prompt shown after `entries` history entries have been recorded.
    ///
    /// Single player entries hold a full move (human + engine), so the
    /// number grows with every entry and the human always plays white.
    /// Multiplayer entries hold one ply, so the side alternates and the
    /// number grows every second entry.
    pub fn after(entries: usize, multiplayer: bool) -> Self {
        if multiplayer {
            let side = if entries % 2 == 0 {
                Side::White
            } else {
                Side::Black
            };
            Self {
                side,
                number: entries / 2 + 1,
            }
        } else {
            Self {
                side: Side::White,
                number: entries + 1,
            }
        }
    }

    /// History entries after which this prompt is shown, the inverse of
    /// [`PromptCursor::after`]
    pub fn entries(self, multiplayer: bool) -> usize {
        let full_moves = self.number.saturating_sub(1);
        if multiplayer {
            full_moves * 2 + usize::from(self.side == Side::Black)
        } else {
            full_moves
        }
    }
}

/// Bookkeeping for one running game
#[derive(Debug, Clone)]
pub struct GameSession {
    white: String,
    black: Option<String>,
    turn: Side,
    history: Vec<MoveRecord>,
    /// Prompts the engine advanced without an accepted exchange
    prompt_offset: usize,
}

impl GameSession {
    /// Game against the engine
    pub fn single(white: impl Into<String>) -> Self {
        Self::new(white.into(), None)
    }

    /// Two humans with the engine acting as referee
    pub fn multiplayer(white: impl Into<String>, black: impl Into<String>) -> Self {
        Self::new(white.into(), Some(black.into()))
    }

    /// Create a session, multiplayer when `black` is set
    pub fn new(white: String, black: Option<String>) -> Self {
        Self {
            white,
            black,
            turn: Side::White,
            history: Vec::new(),
            prompt_offset: 0,
        }
    }

    pub fn white(&self) -> &str {
        &self.white
    }

    pub fn black(&self) -> Option<&str> {
        self.black.as_deref()
    }

    pub fn is_multiplayer(&self) -> bool {
        self.black.is_some()
    }

    pub fn turn(&self) -> Side {
        self.turn
    }

    /// Player expected to submit the next move
    pub fn player_to_move(&self) -> &str {
        match (self.turn, self.black.as_deref()) {
            (Side::Black, Some(black)) => black,
            _ => &self.white,
        }
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    fn prompt_entries(&self) -> usize {
        self.history.len() + self.prompt_offset
    }

    /// Prompt the engine shows while waiting for the next move
    pub fn current_prompt(&self) -> PromptCursor {
        PromptCursor::after(self.prompt_entries(), self.is_multiplayer())
    }

    /// Prompt the engine shows once the pending exchange is complete
    pub fn next_prompt(&self) -> PromptCursor {
        PromptCursor::after(self.prompt_entries() + 1, self.is_multiplayer())
    }

    /// Align the prompt index with a prompt the engine printed.
    ///
    /// Engines can count a prompt for input they did not accept as a move.
    /// History is left alone, only later prompt patterns move. A prompt
    /// behind the recorded history is ignored.
    pub fn resync(&mut self, shown: PromptCursor) {
        let entries = shown.entries(self.is_multiplayer());
        self.prompt_offset = entries.saturating_sub(self.history.len());
    }

    /// Full move number for FEN trailers, counted from accepted moves only
    pub fn fullmove_number(&self) -> usize {
        PromptCursor::after(self.history.len(), self.is_multiplayer()).number
    }

    /// Record an accepted exchange. Failed exchanges are never recorded,
    /// so they never advance the prompt index.
    pub fn record(&mut self, submitted: impl Into<String>, reply: Option<String>) {
        self.history.push(MoveRecord {
            submitted: submitted.into(),
            reply,
        });
        if self.is_multiplayer() {
            self.turn = self.turn.opposite();
        }
    }

    /// Forget the game in progress
    pub fn restart(&mut self) {
        self.history.clear();
        self.turn = Side::White;
        self.prompt_offset = 0;
    }
}
