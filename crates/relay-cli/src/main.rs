//! chess-relay
//!
//! Reads console commands on stdin, relays them to chess engines through
//! the play queue and prints every finished command on stdout. Logs go to
//! stderr.

mod console;

use anyhow::Result;
use clap::Parser;
use console::Request;
use play_queue::{Command, PlayQueue, ResultSink};
use relay_core::{EngineKind, RelayConfig};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "chess-relay", version, about = "Play chess against console engines")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine for games that do not name one (gnuchess or crafty)
    #[arg(long)]
    engine: Option<EngineKind>,

    /// GNU Chess binary
    #[arg(long)]
    gnuchess: Option<PathBuf>,

    /// Crafty binary
    #[arg(long)]
    crafty: Option<PathBuf>,

    /// Let engines think on the player's time
    #[arg(long, default_value_t = false)]
    ponder: bool,

    /// Print results as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

fn load_config(args: &Args) -> Result<RelayConfig> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };
    if let Some(engine) = args.engine {
        config.default_engine = engine;
    }
    if let Some(program) = &args.gnuchess {
        config.gnuchess.program = program.clone();
    }
    if let Some(program) = &args.crafty {
        config.crafty.program = program.clone();
    }
    if args.ponder {
        config.gnuchess.pondering = true;
        config.crafty.pondering = true;
    }
    Ok(config)
}

fn print_result(command: Command, as_json: bool) {
    if !as_json {
        println!("@{} {}", command.target, command);
        return;
    }
    let line = match &command.result {
        Some(Ok(response)) => json!({
            "player": command.target,
            "action": command.action.to_string(),
            "result": response,
        }),
        Some(Err(e)) => json!({
            "player": command.target,
            "action": command.action.to_string(),
            "error": e.to_string(),
        }),
        None => return,
    };
    println!("{}", line);
}

fn notice(player: &str, text: &str, as_json: bool) {
    if as_json {
        println!("{}", json!({ "player": player, "notice": text }));
    } else {
        println!("@{} {}", player, text);
    }
}

/// Handle one console request. Returns false once the relay should exit.
async fn handle(queue: &PlayQueue, request: Request, sink: &ResultSink, as_json: bool) -> bool {
    match request {
        Request::New(game) => {
            let white = game.white.clone();
            let text = match queue.new_game(game).await {
                Ok(()) => "game started, white moves first".to_string(),
                Err(e) => e.to_string(),
            };
            notice(&white, &text, as_json);
        }
        Request::Play { player, action } => {
            let command = Command::with_sink(player.clone(), action, sink.clone());
            if let Err(e) = queue.submit(command) {
                notice(&player, &e.to_string(), as_json);
            }
        }
        Request::End(player) => {
            let text = match queue.end_game(&player).await {
                Ok(()) => "game ended".to_string(),
                Err(e) => e.to_string(),
            };
            notice(&player, &text, as_json);
        }
        Request::Games => {
            let players = queue.players();
            match queue.game_count() {
                0 => println!("No games running"),
                1 => println!("1 game: {}", players.join(" ")),
                n => println!("{} games: {}", n, players.join(" ")),
            }
        }
        Request::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args)?;
    info!(
        "chess-relay starting (default engine {})",
        config.default_engine
    );

    let queue = PlayQueue::start(config);
    let as_json = args.json;
    let sink: ResultSink = Arc::new(move |command: Command| print_result(command, as_json));

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = tokio::select! {
            read = reader.read_line(&mut line) => read?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };

        if bytes_read == 0 {
            info!("Input closed (EOF)");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        debug!("Received: {}", trimmed);

        match console::parse(trimmed) {
            Ok(request) => {
                if !handle(&queue, request, &sink, as_json).await {
                    break;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }

    queue.stop().await;
    info!("chess-relay stopped");
    Ok(())
}
