//! Queued commands and their results

use relay_core::{RelayError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Request against one game
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Submit a move for the player to move
    Move(String),
    /// Render the canonical board
    Board,
    /// Position as FEN
    Fen,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move(position) => write!(f, "move {}", position),
            Action::Board => f.write_str("board"),
            Action::Fen => f.write_str("fen"),
        }
    }
}

/// Successful outcome of an [`Action`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Move {
        played: String,
        /// Engine reply, `None` in multiplayer games
        reply: Option<String>,
    },
    Board {
        board: String,
    },
    Position {
        fen: String,
    },
}

/// Receives every finished command exactly once
pub type ResultSink = Arc<dyn Fn(Command) + Send + Sync>;

/// A request, its target game and where to deliver the outcome
pub struct Command {
    /// Player whose game the command runs against
    pub target: String,
    pub action: Action,
    /// Set once the command has been performed
    pub result: Option<Result<Response>>,
    sink: ResultSink,
}

impl Command {
    pub fn new<F>(target: impl Into<String>, action: Action, sink: F) -> Self
    where
        F: Fn(Command) + Send + Sync + 'static,
    {
        Self::with_sink(target, action, Arc::new(sink))
    }

    /// Create a command sharing an existing sink
    pub fn with_sink(target: impl Into<String>, action: Action, sink: ResultSink) -> Self {
        Self {
            target: target.into(),
            action,
            result: None,
            sink,
        }
    }

    pub fn is_done(&self) -> bool {
        self.result.is_some()
    }

    /// Whether the engine rejected the move
    pub fn is_invalid_move(&self) -> bool {
        matches!(&self.result, Some(Err(e)) if e.is_invalid_move())
    }

    /// Store the outcome and hand the command to its sink
    pub(crate) fn complete(mut self, result: Result<Response>) {
        self.result = Some(result);
        let sink = self.sink.clone();
        sink(self);
    }

    pub(crate) fn abandon(self) {
        self.complete(Err(RelayError::QueueStopped));
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("target", &self.target)
            .field("action", &self.action)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

/// Console notification for a finished command: `e4 e5` after a single
/// player move, `Invalid move: e9` after a rejection.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            None => write!(f, "{} for {} (pending)", self.action, self.target),
            Some(Ok(Response::Move {
                played,
                reply: Some(reply),
            })) => write!(f, "{} {}", played, reply),
            Some(Ok(Response::Move {
                played,
                reply: None,
            })) => f.write_str(played),
            Some(Ok(Response::Board { board })) => f.write_str(board),
            Some(Ok(Response::Position { fen })) => f.write_str(fen),
            Some(Err(e @ RelayError::InvalidMove(_))) => write!(f, "{}", e),
            Some(Err(e)) => write!(f, "{} for {} failed: {}", self.action, self.target, e),
        }
    }
}
