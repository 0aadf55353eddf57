//! Bridge between the relay and console chess engines
//!
//! This crate provides:
//! - A blocking line buffer fed by a background pipe reader
//! - A lazily started child process transport
//! - The expect matcher that turns engine chatter into replies
//! - `EngineAdapter` implementations for GNU Chess and Crafty

pub mod adapter;
pub mod channel;
pub mod crafty;
pub mod gnuchess;
pub mod matcher;
pub mod transport;

pub use adapter::{EngineAdapter, open_engine};
pub use channel::BufferedChannel;
pub use crafty::Crafty;
pub use gnuchess::GnuChess;
pub use matcher::{Handler, Outcome, Rule, expect};
pub use transport::{LineSource, ProcessTransport};
