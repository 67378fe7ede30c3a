//! Classified log records

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::SharedError;

/// Severity parsed from a structured log line
///
/// `Unknown` marks lines that did not match the structured shape and were
/// passed through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Notice,
    Warning,
    Error,
    Unknown,
}

impl LogLevel {
    /// Map a level token such as `[info]` to a level.
    ///
    /// Only `[info]`, `[notice]` and `[warning]` are recognized; every other
    /// token, including garbled or missing brackets, is an error.
    pub fn from_token(token: &str) -> Self {
        match token {
            "[info]" => LogLevel::Info,
            "[notice]" => LogLevel::Notice,
            "[warning]" => LogLevel::Warning,
            _ => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Notice => write!(f, "notice"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('[').trim_end_matches(']').to_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "notice" => Ok(LogLevel::Notice),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "unknown" => Ok(LogLevel::Unknown),
            _ => Err(SharedError::InvalidLogLevel { input: s.to_string() }),
        }
    }
}

/// One classified line of child process output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: LogLevel,
    pub metadata: Vec<String>,
    pub message: String,
    pub raw: String,
}

impl LogRecord {
    /// Passthrough record for a line that is not structured
    pub fn unstructured(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            timestamp: String::new(),
            level: LogLevel::Unknown,
            metadata: Vec::new(),
            message: raw.clone(),
            raw,
        }
    }

    /// Failure marker: `error` anywhere in the raw line, ignoring case.
    ///
    /// Independent of `level`; a `[warning]` line mentioning an error counts,
    /// an `[error]`-level line without the word does not.
    pub fn is_failure(&self) -> bool {
        self.raw.to_lowercase().contains("error")
    }
}
