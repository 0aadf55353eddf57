//! Game registry keyed by player name

use engine_bridge::EngineAdapter;
use relay_core::{RelayError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to one game's engine. The lock serializes every exchange
/// with that engine's process.
pub type EngineHandle = Arc<Mutex<Box<dyn EngineAdapter>>>;

/// Running games. A multiplayer game is reachable through both players.
#[derive(Default)]
pub struct GameRegistry {
    games: HashMap<String, EngineHandle>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that none of `players` is already in a game
    pub fn ensure_free(&self, players: &[&str]) -> Result<()> {
        match players.iter().find(|p| self.games.contains_key(**p)) {
            Some(player) => Err(RelayError::GameAlreadyExists(player.to_string())),
            None => Ok(()),
        }
    }

    /// Register a game under every one of its players
    pub fn insert(&mut self, players: &[&str], engine: EngineHandle) -> Result<()> {
        self.ensure_free(players)?;
        for player in players {
            self.games.insert(player.to_string(), engine.clone());
        }
        Ok(())
    }

    /// Game `player` takes part in
    pub fn get(&self, player: &str) -> Result<EngineHandle> {
        self.games
            .get(player)
            .cloned()
            .ok_or_else(|| RelayError::NoSuchGame(player.to_string()))
    }

    /// Remove the game `player` takes part in, for all of its players
    pub fn remove(&mut self, player: &str) -> Result<EngineHandle> {
        let engine = self
            .games
            .remove(player)
            .ok_or_else(|| RelayError::NoSuchGame(player.to_string()))?;
        self.games.retain(|_, other| !Arc::ptr_eq(other, &engine));
        Ok(engine)
    }

    /// Remove every game, each returned once
    pub fn drain(&mut self) -> Vec<EngineHandle> {
        let mut engines: Vec<EngineHandle> = Vec::new();
        for (_, engine) in self.games.drain() {
            if !engines.iter().any(|seen| Arc::ptr_eq(seen, &engine)) {
                engines.push(engine);
            }
        }
        engines
    }

    pub fn contains(&self, player: &str) -> bool {
        self.games.contains_key(player)
    }

    /// Players currently in a game
    pub fn players(&self) -> Vec<&str> {
        let mut players: Vec<&str> = self.games.keys().map(String::as_str).collect();
        players.sort_unstable();
        players
    }

    /// Number of distinct games
    pub fn count(&self) -> usize {
        let mut seen: Vec<&EngineHandle> = Vec::new();
        for engine in self.games.values() {
            if !seen.iter().any(|other| Arc::ptr_eq(other, engine)) {
                seen.push(engine);
            }
        }
        seen.len()
    }
}
