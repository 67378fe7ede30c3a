//! Core types used throughout the harness

mod record;

pub use record::{LogLevel, LogRecord};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::SharedError;

/// Role a managed process plays in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => write!(f, "server"),
            Role::Client => write!(f, "client"),
        }
    }
}

/// Identifier for a process in the fleet
///
/// There is at most one server; clients are numbered from zero. Ordering puts
/// the server first and clients by ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcessKey {
    Server,
    Client(usize),
}

impl ProcessKey {
    pub fn role(&self) -> Role {
        match self {
            ProcessKey::Server => Role::Server,
            ProcessKey::Client(_) => Role::Client,
        }
    }

    pub fn client_id(&self) -> Option<usize> {
        match self {
            ProcessKey::Server => None,
            ProcessKey::Client(id) => Some(*id),
        }
    }

    /// Human readable label used as the output prefix
    pub fn display_name(&self) -> String {
        match self {
            ProcessKey::Server => "Server".to_string(),
            ProcessKey::Client(id) => format!("Client {id}"),
        }
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKey::Server => write!(f, "server"),
            ProcessKey::Client(id) => write!(f, "client_{id}"),
        }
    }
}

impl std::str::FromStr for ProcessKey {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if normalized == "server" {
            return Ok(ProcessKey::Server);
        }

        normalized
            .strip_prefix("client_")
            .or_else(|| normalized.strip_prefix("client "))
            .and_then(|id| id.parse::<usize>().ok())
            .map(ProcessKey::Client)
            .ok_or_else(|| SharedError::InvalidProcessKey { input: s.to_string() })
    }
}

/// Lifecycle state of a managed process
///
/// `Spawning → Running → (Draining | Terminated)`. `Draining` means the output
/// streams ended but the process has not been terminated or reaped yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Spawning,
    Running,
    Draining,
    Terminated,
}

impl ProcessState {
    /// Whether the process can still accept commands on its input stream
    pub fn accepts_input(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Spawning => write!(f, "spawning"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Draining => write!(f, "draining"),
            ProcessState::Terminated => write!(f, "terminated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_key_ordering() {
        let mut keys = vec![ProcessKey::Client(2), ProcessKey::Client(0), ProcessKey::Server];
        keys.sort();
        assert_eq!(keys, vec![ProcessKey::Server, ProcessKey::Client(0), ProcessKey::Client(2)]);
    }

    #[test]
    fn test_process_key_display_round_trip() {
        for key in [ProcessKey::Server, ProcessKey::Client(7)] {
            let parsed: ProcessKey = key.to_string().parse().unwrap();
            assert_eq!(parsed, key);
        }
        assert_eq!(ProcessKey::Client(3).display_name(), "Client 3");
        assert_eq!("Client 3".parse::<ProcessKey>().unwrap(), ProcessKey::Client(3));
    }

    #[test]
    fn test_invalid_process_key() {
        let err = "producer_1".parse::<ProcessKey>().unwrap_err();
        assert_eq!(err, SharedError::InvalidProcessKey { input: "producer_1".to_string() });
    }

    #[test]
    fn test_state_accepts_input() {
        assert!(ProcessState::Running.accepts_input());
        assert!(!ProcessState::Draining.accepts_input());
        assert!(!ProcessState::Spawning.accepts_input());
        assert!(!ProcessState::Terminated.accepts_input());
    }
}
