//! Expect matcher over engine output
//!
//! Rules are tried in declaration order against every drained batch. The
//! first rule with at least one matching line wins, so more specific
//! patterns (an illegal move notice) must come before generic ones (a
//! prompt that would also match).

use crate::transport::LineSource;
use regex::Regex;
use relay_core::{RelayError, Result};
use tracing::{debug, warn};

/// What to do with the lines a rule matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Engine move announcement, the move follows the last `:`
    ParseMove,
    /// Return the text the pattern matched in the first matching line
    Capture,
    /// Engine rejected the submitted move
    Illegal,
    /// Engine reached a prompt without the expected reply
    Unknown,
    /// Expected prompt reached, nothing to extract
    Acknowledge,
}

/// A pattern and its handler
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Regex,
    pub handler: Handler,
    /// Lowest move number the pattern's `n` group may capture
    pub min_index: Option<usize>,
}

impl Rule {
    pub fn new(pattern: Regex, handler: Handler) -> Self {
        Self {
            pattern,
            handler,
            min_index: None,
        }
    }

    /// Only match lines where the `n` group reads at least `min`, so
    /// prompts and replies left over from earlier moves are skipped
    pub fn from_index(mut self, min: usize) -> Self {
        self.min_index = Some(min);
        self
    }

    pub fn matches(&self, line: &str) -> bool {
        match self.min_index {
            Some(min) => highest_index(&self.pattern, line).is_some_and(|n| n >= min),
            None => self.pattern.is_match(line),
        }
    }
}

/// Largest move number captured by the `n` group of `pattern` in `line`
pub fn highest_index(pattern: &Regex, line: &str) -> Option<usize> {
    pattern
        .captures_iter(line)
        .filter_map(|caps| caps.name("n")?.as_str().parse().ok())
        .max()
}

/// Result of a successful expect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Extracted reply or captured line
    Value(String),
    /// Rejection notice as printed by the engine
    Illegal(String),
    /// Unexpected line that ended the exchange
    Unknown(String),
    Acknowledged,
}

impl Outcome {
    /// Turn an expect result into a reply for `submitted`:
    /// `Ok(None)` for acknowledgements, errors for rejections, unknown
    /// states and a dead process.
    pub fn resolve(outcome: Option<Outcome>, submitted: &str) -> Result<Option<String>> {
        match outcome {
            Some(Outcome::Value(value)) => Ok(Some(value)),
            Some(Outcome::Acknowledged) => Ok(None),
            Some(Outcome::Illegal(_)) => Err(RelayError::InvalidMove(submitted.to_string())),
            Some(Outcome::Unknown(line)) => {
                warn!("Unknown engine state after {:?}: {:?}", submitted, line);
                Err(RelayError::UnknownEngineState(line))
            }
            None => Err(RelayError::ProcessTerminated),
        }
    }
}

/// Engine move from an announcement such as `My move is : e5` or
/// `Black(12): Nf6`
pub fn parse_move(line: &str) -> String {
    line.rsplit(':').next().unwrap_or(line).trim().to_string()
}

fn apply(rule: &Rule, matched: &[&String]) -> Outcome {
    let first = matched.first().map(|l| l.as_str()).unwrap_or_default();
    match rule.handler {
        Handler::ParseMove => {
            let last = matched.last().map(|l| l.as_str()).unwrap_or_default();
            Outcome::Value(parse_move(last))
        }
        Handler::Capture => {
            let text = rule.pattern.find(first).map_or(first, |m| m.as_str());
            Outcome::Value(text.trim().to_string())
        }
        Handler::Illegal => Outcome::Illegal(first.trim().to_string()),
        Handler::Unknown => Outcome::Unknown(first.trim().to_string()),
        Handler::Acknowledge => Outcome::Acknowledged,
    }
}

/// Read batches until a rule matches. `None` means the source ended first.
pub async fn expect<S>(source: &S, rules: &[Rule]) -> Option<Outcome>
where
    S: LineSource + ?Sized,
{
    while let Some(batch) = source.next_batch().await {
        for rule in rules {
            let matched: Vec<&String> = batch
                .iter()
                .filter(|line| rule.matches(line))
                .collect();
            if !matched.is_empty() {
                debug!("Matched {:?} on {:?}", rule.handler, matched);
                return Some(apply(rule, &matched));
            }
        }
    }
    debug!("Engine output ended before any rule matched");
    None
}

/// Read batches until `count` lines matching `pattern` were seen
pub async fn collect<S>(source: &S, pattern: &Regex, count: usize) -> Option<Vec<String>>
where
    S: LineSource + ?Sized,
{
    let mut lines = Vec::with_capacity(count);
    while lines.len() < count {
        let batch = source.next_batch().await?;
        lines.extend(batch.into_iter().filter(|line| pattern.is_match(line)));
    }
    lines.truncate(count);
    Some(lines)
}

/// Compile a pattern built at runtime
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| RelayError::Config(format!("Bad pattern {}: {}", pattern, e)))
}
