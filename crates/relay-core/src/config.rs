//! Engine and queue configuration

use crate::error::{RelayError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Supported engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[serde(alias = "gnu")]
    GnuChess,
    Crafty,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::GnuChess => "gnuchess",
            EngineKind::Crafty => "crafty",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gnuchess" | "gnu" => Ok(EngineKind::GnuChess),
            "crafty" => Ok(EngineKind::Crafty),
            other => Err(RelayError::Config(format!("Unknown engine: {}", other))),
        }
    }
}

/// How to launch and talk to one engine binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine binary
    pub program: PathBuf,
    /// Command line arguments
    pub args: Vec<String>,
    /// Let the engine think on the player's time
    pub pondering: bool,
    /// Bounded wait for engines that dump positions to a file
    pub save_wait_ms: u64,
    /// Output without a trailing newline (prompts) is surfaced as a line
    /// once the pipe has been quiet for this long
    pub partial_line_ms: u64,
}

impl EngineConfig {
    /// GNU Chess defaults (`gnuchess -e`, easy mode disables pondering)
    pub fn gnuchess() -> Self {
        Self {
            program: PathBuf::from("/usr/games/gnuchess"),
            args: vec!["-e".into()],
            ..Self::base()
        }
    }

    /// Crafty defaults
    pub fn crafty() -> Self {
        Self {
            program: PathBuf::from("/usr/games/crafty"),
            ..Self::base()
        }
    }

    /// Defaults for `kind`
    pub fn for_kind(kind: EngineKind) -> Self {
        match kind {
            EngineKind::GnuChess => Self::gnuchess(),
            EngineKind::Crafty => Self::crafty(),
        }
    }

    /// Run a custom program, e.g. a scripted engine
    pub fn with_program(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            program: PathBuf::new(),
            args: Vec::new(),
            pondering: false,
            save_wait_ms: 500,
            partial_line_ms: 50,
        }
    }

    pub fn save_wait(&self) -> Duration {
        Duration::from_millis(self.save_wait_ms)
    }

    pub fn partial_line_flush(&self) -> Duration {
        Duration::from_millis(self.partial_line_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::base()
    }
}

/// Command queue tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded wait of the dispatch loop between stop checks
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// Engine section of a config file. Fields left out keep the defaults
/// of the engine the section belongs to.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EngineSection {
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
    pondering: Option<bool>,
    save_wait_ms: Option<u64>,
    partial_line_ms: Option<u64>,
}

impl EngineSection {
    fn over(self, mut config: EngineConfig) -> EngineConfig {
        if let Some(program) = self.program {
            config.program = program;
        }
        if let Some(args) = self.args {
            config.args = args;
        }
        if let Some(pondering) = self.pondering {
            config.pondering = pondering;
        }
        if let Some(ms) = self.save_wait_ms {
            config.save_wait_ms = ms;
        }
        if let Some(ms) = self.partial_line_ms {
            config.partial_line_ms = ms;
        }
        config
    }
}

fn gnuchess_section<'de, D>(deserializer: D) -> std::result::Result<EngineConfig, D::Error>
where
    D: Deserializer<'de>,
{
    EngineSection::deserialize(deserializer).map(|section| section.over(EngineConfig::gnuchess()))
}

fn crafty_section<'de, D>(deserializer: D) -> std::result::Result<EngineConfig, D::Error>
where
    D: Deserializer<'de>,
{
    EngineSection::deserialize(deserializer).map(|section| section.over(EngineConfig::crafty()))
}

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    #[serde(default = "EngineConfig::gnuchess", deserialize_with = "gnuchess_section")]
    pub gnuchess: EngineConfig,
    #[serde(default = "EngineConfig::crafty", deserialize_with = "crafty_section")]
    pub crafty: EngineConfig,
    pub queue: QueueConfig,
    /// Engine used when a new game does not name one
    pub default_engine: EngineKind,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            gnuchess: EngineConfig::gnuchess(),
            crafty: EngineConfig::crafty(),
            queue: QueueConfig::default(),
            default_engine: EngineKind::GnuChess,
        }
    }
}

impl RelayConfig {
    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Engine settings for `kind`
    pub fn engine(&self, kind: EngineKind) -> &EngineConfig {
        match kind {
            EngineKind::GnuChess => &self.gnuchess,
            EngineKind::Crafty => &self.crafty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.gnuchess.program, PathBuf::from("/usr/games/gnuchess"));
        assert_eq!(config.gnuchess.args, vec!["-e".to_string()]);
        assert!(config.crafty.args.is_empty());
        assert_eq!(config.engine(EngineKind::Crafty).save_wait(), Duration::from_millis(500));
        assert_eq!(config.queue.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"default_engine": "crafty", "crafty": {{"program": "/opt/crafty", "pondering": true}}}}"#
        )
        .unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_engine, EngineKind::Crafty);
        assert_eq!(config.crafty.program, PathBuf::from("/opt/crafty"));
        assert!(config.crafty.pondering);
        assert!(config.crafty.args.is_empty());
        assert_eq!(config.crafty.partial_line_ms, 50);
        assert_eq!(config.gnuchess, EngineConfig::gnuchess());
    }

    #[test]
    fn test_engine_section_keeps_its_own_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"gnuchess": {{"pondering": true}}, "crafty": {{"save_wait_ms": 900}}}}"#
        )
        .unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.gnuchess.program, PathBuf::from("/usr/games/gnuchess"));
        assert_eq!(config.gnuchess.args, vec!["-e".to_string()]);
        assert!(config.gnuchess.pondering);
        assert_eq!(config.crafty.program, PathBuf::from("/usr/games/crafty"));
        assert_eq!(config.crafty.save_wait_ms, 900);
        assert_eq!(config.crafty.partial_line_ms, 50);
    }

    #[test]
    fn test_engine_section_rejects_bad_types() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"gnuchess": {{"pondering": "yes"}}}}"#).unwrap();
        let err = RelayConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_bad_file() {
        let err = RelayConfig::from_file("/nonexistent/relay.json").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!("GnuChess".parse::<EngineKind>().unwrap(), EngineKind::GnuChess);
        assert_eq!("crafty".parse::<EngineKind>().unwrap(), EngineKind::Crafty);
        assert!("stockfish".parse::<EngineKind>().is_err());
    }
}
