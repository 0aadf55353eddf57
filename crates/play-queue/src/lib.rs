//! # play-queue
//!
//! Asynchronous command queue in front of per-game chess engines.
//!
//! Callers create games with [`PlayQueue::new_game`] and submit
//! [`Command`]s that name a player. Every command runs on its own worker
//! and is handed back through its result sink once the engine answered.

pub mod command;
pub mod queue;
pub mod registry;

pub use command::{Action, Command, Response, ResultSink};
pub use queue::{NewGame, PlayQueue};
pub use registry::{EngineHandle, GameRegistry};
