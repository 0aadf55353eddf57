//! # relay-core
//!
//! Core types shared by every layer of the chess engine relay.
//!
//! This crate provides:
//! - The error taxonomy returned by engines and the play queue
//! - Per-game turn and move history bookkeeping
//! - Prompt index derivation for engines that number their prompts
//! - The canonical board rendering and FEN trailer normalization
//! - Engine and queue configuration

pub mod board;
pub mod config;
pub mod error;
pub mod notation;
pub mod session;

pub use board::{Board, Piece};
pub use config::{EngineConfig, EngineKind, QueueConfig, RelayConfig};
pub use error::{RelayError, Result};
pub use notation::normalize_fen;
pub use session::{GameSession, MoveRecord, PromptCursor, Side};
