//! Crafty adapter

use crate::adapter::{EngineAdapter, MovePatterns, send, shut_down, submit_move};
use crate::matcher::{Handler, Outcome, Rule, collect, compile, expect};
use crate::transport::ProcessTransport;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use relay_core::{
    Board, EngineConfig, EngineKind, GameSession, RelayError, Result, Side, normalize_fen,
};
use tracing::info;

static ILLEGAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Illegal move").expect("static regex is valid"));
static RANK_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[1-8]\s+\|(?:(?:<[RNBQKP]>|-[RNBQKP]-| \. |   )\|){8}\s*$")
        .expect("static regex is valid")
});
static SETBOARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"setboard\s+\S.*$").expect("static regex is valid"));

/// Seed for crafty's node count based move noise
const NOISE: &str = "937459712";

/// Prompt for `side` with its move number in the `n` group
fn prompt_pattern(side: Side) -> Result<Regex> {
    compile(&format!(r"\b{}\((?P<n>\d+)\):", side))
}

/// Crafty announces its reply as `Black(n): <move>` on the prompt number
/// of the human's move
static REPLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bBlack\((?P<n>\d+)\): +\S").expect("static regex is valid"));

fn startup_commands(config: &EngineConfig) -> Vec<String> {
    let mut commands = vec!["log off".to_string(), format!("noise {}", NOISE)];
    if !config.pondering {
        commands.push("ponder off".into());
    }
    commands
}

/// Adapter for `crafty`
pub struct Crafty {
    transport: ProcessTransport,
    session: GameSession,
}

impl Crafty {
    pub fn new(config: EngineConfig, session: GameSession) -> Self {
        let startup = startup_commands(&config);
        Self {
            transport: ProcessTransport::with_startup(config, startup),
            session,
        }
    }
}

#[async_trait]
impl EngineAdapter for Crafty {
    fn kind(&self) -> EngineKind {
        EngineKind::Crafty
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
        self.transport
            .write(&format!("name {}", self.session.white()))
            .await?;
        if self.session.is_multiplayer() {
            self.transport.write("force").await?;
        }
        info!("Crafty game started for {}", self.session.white());
        Ok(())
    }

    async fn make_move(&mut self, position: &str) -> Result<Option<String>> {
        let patterns = MovePatterns {
            reply: REPLY.clone(),
            reply_from: Some(self.session.current_prompt().number),
            illegal: ILLEGAL.clone(),
            next_prompt: prompt_pattern(self.session.next_prompt().side)?,
        };
        submit_move(&self.transport, &mut self.session, patterns, position).await
    }

    async fn render_board(&mut self) -> Result<Board> {
        send(&self.transport, "display").await?;
        let rows = collect(&self.transport, &RANK_ROW, 8)
            .await
            .ok_or(RelayError::ProcessTerminated)?;
        Board::from_grid_rows(&rows).ok_or_else(|| RelayError::UnknownEngineState(rows.join("\n")))
    }

    async fn position_notation(&mut self) -> Result<String> {
        send(&self.transport, "savepos").await?;
        let rules = [Rule::new(SETBOARD.clone(), Handler::Capture)];
        let line = Outcome::resolve(expect(&self.transport, &rules).await, "savepos")?
            .ok_or_else(|| RelayError::UnknownEngineState("savepos".into()))?;
        normalize_fen(&line, self.session.fullmove_number())
            .ok_or(RelayError::UnknownEngineState(line))
    }

    async fn end_game(&mut self) -> Result<()> {
        info!("Ending Crafty game for {}", self.session.white());
        shut_down(&self.transport, "end").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FAKE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/fake_crafty.sh");

    fn fake_config(transcript: &str) -> EngineConfig {
        EngineConfig::with_program(
            "/bin/sh",
            vec![FAKE.to_string(), "0".to_string(), transcript.to_string()],
        )
    }

    async fn started(session: GameSession) -> Crafty {
        let mut engine = Crafty::new(fake_config("/dev/null"), session);
        engine.new_game().await.unwrap();
        engine
    }

    #[test]
    fn test_startup_commands() {
        let mut config = EngineConfig::crafty();
        assert_eq!(
            startup_commands(&config),
            vec!["log off", "noise 937459712", "ponder off"]
        );
        config.pondering = true;
        assert_eq!(startup_commands(&config), vec!["log off", "noise 937459712"]);
    }

    #[test]
    fn test_reply_rule() {
        let rule = Rule::new(REPLY.clone(), Handler::ParseMove).from_index(3);
        assert!(rule.matches("              Black(3): Nf6"));
        assert!(rule.matches("White(3):               Black(4): Nf6"));
        assert!(!rule.matches("Black(3): "));
        assert!(!rule.matches("              Black(2): Nf6"));
    }

    #[tokio::test]
    async fn test_single_player_exchange() {
        let transcript = tempfile::NamedTempFile::new().unwrap();
        let path = transcript.path().to_string_lossy().to_string();
        let mut engine = Crafty::new(fake_config(&path), GameSession::single("alice"));
        engine.new_game().await.unwrap();

        assert_eq!(engine.make_move("e4").await, Ok(Some("e5".into())));
        assert_eq!(
            engine.make_move("e9").await,
            Err(RelayError::InvalidMove("e9".into()))
        );
        assert_eq!(engine.make_move("Nf3").await, Ok(Some("Nc6".into())));
        assert_eq!(engine.session().history().len(), 2);
        engine.end_game().await.unwrap();
        assert!(!engine.is_alive());

        let sent = std::fs::read_to_string(&path).unwrap();
        let sent: Vec<&str> = sent.lines().collect();
        assert_eq!(
            sent,
            vec![
                "log off",
                "noise 937459712",
                "ponder off",
                "new",
                "name alice",
                "e4",
                "e9",
                "Nf3",
                "end"
            ]
        );
    }

    #[tokio::test]
    async fn test_move_after_unknown_state_follows_engine_prompt() {
        let mut engine = started(GameSession::single("alice")).await;
        assert!(matches!(
            engine.make_move("stall").await,
            Err(RelayError::UnknownEngineState(_))
        ));
        assert!(engine.session().history().is_empty());
        assert_eq!(engine.session().current_prompt().number, 2);

        let retry = tokio::time::timeout(Duration::from_secs(5), engine.make_move("e4"))
            .await
            .expect("retry should not hang");
        assert_eq!(retry, Ok(Some("Nc6".into())));
        let retry = tokio::time::timeout(Duration::from_secs(5), engine.make_move("d4"))
            .await
            .expect("retry should not hang");
        assert_eq!(retry, Ok(Some("Nf6".into())));
        assert_eq!(engine.session().history().len(), 2);
        assert_eq!(
            engine.position_notation().await.unwrap(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3"
        );
        engine.end_game().await.unwrap();
    }

    #[tokio::test]
    async fn test_force_mode_referee() {
        let mut engine = started(GameSession::multiplayer("alice", "bob")).await;
        assert_eq!(engine.make_move("e4").await, Ok(None));
        assert_eq!(engine.make_move("e5").await, Ok(None));
        assert_eq!(engine.session().current_prompt().number, 2);
        assert_eq!(engine.session().turn(), Side::White);
        engine.end_game().await.unwrap();
    }

    #[tokio::test]
    async fn test_display_is_parsed() {
        let mut engine = started(GameSession::single("alice")).await;
        let board = engine.render_board().await.unwrap();

        let mut expected = Board::starting();
        expected.place(6, 4, None);
        expected.place(4, 4, relay_core::Piece::from_letter('P'));
        assert_eq!(board, expected);
        engine.end_game().await.unwrap();
    }

    #[tokio::test]
    async fn test_savepos_trailer_rebuilt() {
        let mut engine = started(GameSession::single("alice")).await;
        assert_eq!(
            engine.position_notation().await.unwrap(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
        engine.make_move("e4").await.unwrap();
        assert_eq!(
            engine.position_notation().await.unwrap(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2"
        );
        engine.end_game().await.unwrap();
    }
}
