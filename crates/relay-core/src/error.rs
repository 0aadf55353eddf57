//! Error types for the chess relay

use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Engine rejected the submitted move
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// Engine reached a prompt or state without a recognizable reply
    #[error("Unknown engine state: {0}")]
    UnknownEngineState(String),

    /// A game is already running for this player
    #[error("{0} is already playing a game")]
    GameAlreadyExists(String),

    /// No game is running for this player
    #[error("No game exists for {0}")]
    NoSuchGame(String),

    /// Engine process exited before answering
    #[error("Engine process terminated")]
    ProcessTerminated,

    /// Engine binary could not be started
    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    /// Pipe or file failure
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Command dropped because the queue stopped
    #[error("Play queue stopped")]
    QueueStopped,
}

impl RelayError {
    /// Whether the engine explicitly rejected the move
    pub fn is_invalid_move(&self) -> bool {
        matches!(self, RelayError::InvalidMove(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe => RelayError::ProcessTerminated,
            _ => RelayError::Io(err.to_string()),
        }
    }
}
