//! Console command parsing
//!
//! ```text
//! new <white> [vs <black>] [with <engine>]
//! move <player> <move>
//! board <player>
//! fen <player>
//! end <player>
//! games
//! quit
//! ```

use anyhow::{Context, Result, bail};
use play_queue::{Action, NewGame};
use relay_core::EngineKind;

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    New(NewGame),
    Play { player: String, action: Action },
    End(String),
    Games,
    Quit,
}

pub fn parse(line: &str) -> Result<Request> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        bail!("Empty command");
    };

    let request = match (verb.to_ascii_lowercase().as_str(), args) {
        ("new", [white, rest @ ..]) => Request::New(parse_new(white, rest)?),
        ("move", [player, position]) => Request::Play {
            player: player.to_string(),
            action: Action::Move(position.to_string()),
        },
        ("board", [player]) => Request::Play {
            player: player.to_string(),
            action: Action::Board,
        },
        ("fen", [player]) => Request::Play {
            player: player.to_string(),
            action: Action::Fen,
        },
        ("end", [player]) => Request::End(player.to_string()),
        ("games", []) => Request::Games,
        ("quit" | "exit", []) => Request::Quit,
        ("new" | "move" | "board" | "fen" | "end" | "games" | "quit" | "exit", _) => {
            bail!("Wrong arguments for {}", verb)
        }
        _ => bail!("Unknown command: {}", verb),
    };
    Ok(request)
}

fn parse_new(white: &str, mut rest: &[&str]) -> Result<NewGame> {
    let mut game = NewGame::single(white);
    while let [keyword, value, tail @ ..] = rest {
        match *keyword {
            "vs" => game.black = Some(value.to_string()),
            "with" => {
                let kind: EngineKind = value
                    .parse()
                    .with_context(|| format!("Bad engine {:?}", value))?;
                game.engine = Some(kind);
            }
            other => bail!("Unexpected {:?}, expected vs or with", other),
        }
        rest = tail;
    }
    if !rest.is_empty() {
        bail!("Missing value after {:?}", rest[0]);
    }
    if game.black.as_deref() == Some(white) {
        bail!("{} cannot play against themselves", white);
    }
    Ok(game)
}
