//! Engine adapter capability
//!
//! One implementation per supported engine, chosen when a game is
//! created. Every adapter owns exactly one [`ProcessTransport`] and the
//! [`GameSession`] it drives.

use crate::crafty::Crafty;
use crate::gnuchess::GnuChess;
use crate::matcher::{Handler, Outcome, Rule, expect, highest_index};
use crate::transport::ProcessTransport;
use async_trait::async_trait;
use regex::Regex;
use relay_core::{Board, EngineConfig, EngineKind, GameSession, PromptCursor, Result};
use tracing::debug;

/// Generic requests every engine understands
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Engine behind this adapter
    fn kind(&self) -> EngineKind;

    /// Turn and history of the game
    fn session(&self) -> &GameSession;

    /// Whether the engine process is running
    fn is_alive(&self) -> bool;

    /// Reset the engine to the starting position
    async fn new_game(&mut self) -> Result<()>;

    /// Submit a move for the player to move.
    ///
    /// Returns the engine's reply in single player mode and `None` in
    /// multiplayer mode. Rejected moves leave the session untouched.
    async fn make_move(&mut self, position: &str) -> Result<Option<String>>;

    /// Current position as a canonical board
    async fn render_board(&mut self) -> Result<Board>;

    /// Current position as FEN
    async fn position_notation(&mut self) -> Result<String>;

    /// Tell the engine to quit and kill its process
    async fn end_game(&mut self) -> Result<()>;
}

/// Create the adapter for `kind`
pub fn open_engine(
    kind: EngineKind,
    config: EngineConfig,
    session: GameSession,
) -> Box<dyn EngineAdapter> {
    match kind {
        EngineKind::GnuChess => Box::new(GnuChess::new(config, session)),
        EngineKind::Crafty => Box::new(Crafty::new(config, session)),
    }
}

/// Patterns of one move exchange, built for the session's current index.
/// Indexed patterns carry the move number in an `n` group.
pub(crate) struct MovePatterns {
    /// Engine move announcement
    pub reply: Regex,
    /// Lowest move number of an indexed reply, `None` when unnumbered
    pub reply_from: Option<usize>,
    /// Rejection notice
    pub illegal: Regex,
    /// Prompt shown once the exchange is complete, indexed
    pub next_prompt: Regex,
}

/// Send `position` and wait for the engine's verdict.
///
/// Single player: reply, then illegal, then the next prompt without a
/// reply. Multiplayer: illegal, then the next prompt as acknowledgement.
/// Prompts are matched from the expected number upwards. When the engine
/// turns out to be ahead, the session follows the prompt it printed.
pub(crate) async fn submit_move(
    transport: &ProcessTransport,
    session: &mut GameSession,
    patterns: MovePatterns,
    position: &str,
) -> Result<Option<String>> {
    let MovePatterns {
        reply,
        reply_from,
        illegal,
        next_prompt,
    } = patterns;
    let next = session.next_prompt();

    let prompt_rule =
        |handler| Rule::new(next_prompt.clone(), handler).from_index(next.number);
    let rules = if session.is_multiplayer() {
        vec![
            Rule::new(illegal, Handler::Illegal),
            prompt_rule(Handler::Acknowledge),
        ]
    } else {
        let reply_rule = Rule::new(reply, Handler::ParseMove);
        vec![
            match reply_from {
                Some(min) => reply_rule.from_index(min),
                None => reply_rule,
            },
            Rule::new(illegal, Handler::Illegal),
            prompt_rule(Handler::Unknown),
        ]
    };

    transport.reset();
    transport.write(position).await?;
    let outcome = expect(transport, &rules).await;

    if let Some(Outcome::Unknown(line)) = &outcome {
        if let Some(number) = highest_index(&next_prompt, line) {
            debug!("Engine is at prompt {} {}, following it", next.side, number);
            session.resync(PromptCursor {
                side: next.side,
                number,
            });
        }
    }
    let reply = Outcome::resolve(outcome, position)?;

    debug!(
        "{} played {} (reply {:?})",
        session.player_to_move(),
        position,
        reply
    );
    session.record(position, reply.clone());
    Ok(reply)
}

/// Write `command` with stale output discarded first
pub(crate) async fn send(transport: &ProcessTransport, command: &str) -> Result<()> {
    transport.reset();
    transport.write(command).await
}

/// Send `farewell`, give the engine `save_wait` to exit on its own, then kill
pub(crate) async fn shut_down(transport: &ProcessTransport, farewell: &str) -> Result<()> {
    if transport.is_alive() {
        match transport.write(farewell).await {
            Ok(()) => {
                let exited = tokio::time::timeout(transport.config().save_wait(), async {
                    while let Ok(Some(_)) = transport.read().await {}
                })
                .await;
                if exited.is_err() {
                    debug!("Engine ignored {:?}, killing it", farewell);
                }
            }
            Err(e) => debug!("Engine did not take {:?}: {}", farewell, e),
        }
    }
    transport.kill().await;
    Ok(())
}
