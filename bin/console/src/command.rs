//! Console input classification.

use parley_conversation::StoreStats;
use std::fmt::Write as _;

/// One line of console input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// `/clear`
    Clear,
    /// `/stats`
    Stats,
    /// Any other `/word`.
    Unknown(&'a str),
    /// Free text for the assistant.
    Message(&'a str),
}

impl<'a> Input<'a> {
    /// Classifies a line. Blank lines yield `None`.
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Message(line));
        };

        let name = rest.split_whitespace().next().unwrap_or_default();
        let input = match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "clear" => Self::Clear,
            "stats" => Self::Stats,
            _ => Self::Unknown(name),
        };
        Some(input)
    }
}

/// Renders store statistics for display.
#[must_use]
pub fn render_stats(stats: &StoreStats) -> String {
    let mut out = String::from("Conversation memory:\n");
    let _ = writeln!(out, "  users: {}", stats.total_keys);
    let _ = writeln!(out, "  turns: {}", stats.total_turns);
    if stats.keys_with_history.is_empty() {
        out.push_str("  active: none");
    } else {
        let keys: Vec<String> = stats
            .keys_with_history
            .iter()
            .map(ToString::to_string)
            .collect();
        let _ = write!(out, "  active: {}", keys.join(", "));
    }
    out
}
