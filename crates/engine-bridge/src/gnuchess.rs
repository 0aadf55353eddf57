//! GNU Chess adapter
//!
//! GNU Chess prompts with `White (3) : `, announces its own moves with
//! `My move is : e5` and only writes positions to a file (`save <path>`).

use crate::adapter::{EngineAdapter, MovePatterns, send, shut_down, submit_move};
use crate::matcher::{collect, compile};
use crate::transport::ProcessTransport;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use relay_core::{
    Board, EngineConfig, EngineKind, GameSession, RelayError, Result, Side, normalize_fen,
};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

static MY_MOVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"My move is\s*:").expect("static regex is valid"));
static ILLEGAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Illegal move").expect("static regex is valid"));
static BOARD_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[.rnbqkpRNBQKP]\s*){8}$").expect("static regex is valid")
});

const SAVE_POLL: Duration = Duration::from_millis(20);

/// Prompt for `side` with its move number in the `n` group
fn prompt_pattern(side: Side) -> Result<Regex> {
    compile(&format!(r"\b{} \((?P<n>\d+)\) :", side))
}

/// Adapter for `gnuchess`
pub struct GnuChess {
    transport: ProcessTransport,
    session: GameSession,
}

impl GnuChess {
    pub fn new(mut config: EngineConfig, session: GameSession) -> Self {
        // Easy mode switches pondering off
        if config.pondering {
            config.args.retain(|arg| arg != "-e");
        }
        Self {
            transport: ProcessTransport::new(config),
            session,
        }
    }

    fn move_patterns(&self) -> Result<MovePatterns> {
        Ok(MovePatterns {
            reply: MY_MOVE.clone(),
            reply_from: None,
            illegal: ILLEGAL.clone(),
            next_prompt: prompt_pattern(self.session.next_prompt().side)?,
        })
    }
}

#[async_trait]
impl EngineAdapter for GnuChess {
    fn kind(&self) -> EngineKind {
        EngineKind::GnuChess
    }

    fn session(&self) -> &GameSession {
        &self.session
    }

    fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    async fn new_game(&mut self) -> Result<()> {
        self.session.restart();
        send(&self.transport, "new").await?;
        if self.session.is_multiplayer() {
            self.transport.write("manual").await?;
        }
        info!("GNU Chess game started for {}", self.session.white());
        Ok(())
    }

    async fn make_move(&mut self, position: &str) -> Result<Option<String>> {
        let patterns = self.move_patterns()?;
        submit_move(&self.transport, &mut self.session, patterns, position).await
    }

    async fn render_board(&mut self) -> Result<Board> {
        send(&self.transport, "show board").await?;
        let rows = collect(&self.transport, &BOARD_ROW, 8)
            .await
            .ok_or(RelayError::ProcessTerminated)?;
        Board::from_compact_rows(&rows)
            .ok_or_else(|| RelayError::UnknownEngineState(rows.join("\n")))
    }

    async fn position_notation(&mut self) -> Result<String> {
        let file = tempfile::Builder::new()
            .prefix("chess-relay-")
            .suffix(".epd")
            .tempfile()?;
        send(&self.transport, &format!("save {}", file.path().display())).await?;

        let saved = read_saved_position(file.path(), self.transport.config().save_wait()).await?;
        // Dropping the handle removes the file
        drop(file);

        let line = saved.ok_or_else(|| {
            RelayError::UnknownEngineState("GNU Chess did not save the position in time".into())
        })?;
        normalize_fen(&line, self.session.fullmove_number())
            .ok_or(RelayError::UnknownEngineState(line))
    }

    async fn end_game(&mut self) -> Result<()> {
        info!("Ending GNU Chess game for {}", self.session.white());
        shut_down(&self.transport, "quit").await
    }
}

/// Poll the dump file until it holds a complete line or `wait` elapses
async fn read_saved_position(path: &Path, wait: Duration) -> Result<Option<String>> {
    let deadline = Instant::now() + wait;
    loop {
        let contents = tokio::fs::read_to_string(path).await?;
        let complete = contents.contains('\n');
        if complete || Instant::now() >= deadline {
            let line = contents.lines().map(str::trim).find(|l| !l.is_empty());
            debug!("Saved position: {:?}", line);
            return Ok(line.map(str::to_string));
        }
        tokio::time::sleep(SAVE_POLL).await;
    }
}
