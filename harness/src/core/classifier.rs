//! Log line classification
//!
//! Turns one line of child output into a [`LogRecord`], or drops it when it
//! is noise: a blank line, a bare prompt, or a startup banner.
//!
//! Interactive prompts (`iex(2)> `) are stripped from the front of a line
//! before anything else, so output printed right after a prompt is still
//! classified and counted.
//!
//! The structured shape is
//! `<timestamp> <metadata × metadata_width> <level> <message...>`, tokenized
//! on whitespace. Lines that do not fit degrade to an `Unknown` passthrough
//! record; classification never fails.

use serde::{Deserialize, Serialize};
use shared::{LogLevel, LogRecord};

/// Fixed-offset grammar for structured log lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineGrammar {
    /// Minimum number of whitespace-separated tokens for a structured line
    pub min_tokens: usize,
    /// Number of metadata tokens between the timestamp and the level
    pub metadata_width: usize,
    /// Number of `:` separators a timestamp token must contain
    pub timestamp_separators: usize,
}

impl Default for LineGrammar {
    fn default() -> Self {
        Self {
            min_tokens: 3,
            metadata_width: 0,
            timestamp_separators: 2,
        }
    }
}

impl LineGrammar {
    pub fn with_metadata_width(mut self, width: usize) -> Self {
        self.metadata_width = width;
        self
    }

    /// Offset of the level token
    pub fn level_index(&self) -> usize {
        1 + self.metadata_width
    }

    /// Token count needed to be structured: at least `min_tokens`, and always
    /// enough for the timestamp, the metadata window, the level and one word.
    pub fn required_tokens(&self) -> usize {
        self.min_tokens.max(self.level_index() + 2)
    }

    fn is_timestamp(&self, token: &str) -> bool {
        token.matches(':').count() == self.timestamp_separators
    }
}

/// Prefixes of startup banner lines, matched at the start of the line
pub const DEFAULT_BANNER_MARKERS: &[&str] = &["Interactive Elixir", "Erlang/OTP"];

/// Openers of interactive prompts such as `iex(2)>` and `...(2)>`
pub const DEFAULT_PROMPT_PREFIXES: &[&str] = &["iex(", "...("];

/// Pure line classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineClassifier {
    pub grammar: LineGrammar,
    pub banner_markers: Vec<String>,
    pub prompt_prefixes: Vec<String>,
}

/// Strip one `<prefix><counter>)>` prompt. The counter may not contain
/// whitespace; `iex(node@host)3>` is accepted.
fn strip_prompt<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let body = line.strip_prefix(prefix)?;
    let end = body.find('>')?;
    let counter = &body[..end];
    (counter.contains(')') && !counter.contains(char::is_whitespace)).then(|| &body[end + 1..])
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new(LineGrammar::default())
    }
}

impl LineClassifier {
    pub fn new(grammar: LineGrammar) -> Self {
        Self {
            grammar,
            banner_markers: DEFAULT_BANNER_MARKERS.iter().map(|m| m.to_string()).collect(),
            prompt_prefixes: DEFAULT_PROMPT_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_banner_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.banner_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prompt_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prompt_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// The line with every leading prompt removed, trimmed
    pub fn content<'a>(&self, line: &'a str) -> &'a str {
        let mut rest = line.trim();
        // Each strip consumes at least the closing `>`, so this terminates
        while let Some(stripped) = self.prompt_prefixes.iter().find_map(|p| strip_prompt(rest, p)) {
            rest = stripped.trim_start();
        }
        rest
    }

    /// Whether a line is noise that produces no record
    pub fn is_noise(&self, line: &str) -> bool {
        self.is_noise_content(self.content(line))
    }

    fn is_noise_content(&self, content: &str) -> bool {
        content.is_empty() || self.banner_markers.iter().any(|marker| content.starts_with(marker.as_str()))
    }

    /// Classify one line. `None` means the line was dropped.
    pub fn classify(&self, line: &str) -> Option<LogRecord> {
        let raw = self.content(line);
        if self.is_noise_content(raw) {
            return None;
        }

        let tokens: Vec<&str> = raw.split_whitespace().collect();

        if tokens.len() < self.grammar.required_tokens() || !self.grammar.is_timestamp(tokens[0]) {
            return Some(LogRecord::unstructured(raw));
        }

        let level_index = self.grammar.level_index();

        Some(LogRecord {
            timestamp: tokens[0].to_string(),
            level: LogLevel::from_token(tokens[level_index]),
            metadata: tokens[1..level_index].iter().map(|t| t.to_string()).collect(),
            message: tokens[level_index + 1..].join(" "),
            raw: raw.to_string(),
        })
    }
}
