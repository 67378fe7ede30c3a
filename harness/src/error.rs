//! Harness-specific error types

use shared::{ProcessKey, ProcessState, SharedError};
use std::time::Duration;
use thiserror::Error;

/// Why a command could not be delivered to a child's input stream
#[derive(Error, Debug)]
pub enum WriteFailure {
    #[error("process is {state}")]
    NotRunning { state: ProcessState },

    #[error("input stream closed")]
    StreamClosed,

    #[error("write did not complete within {after:?}")]
    TimedOut { after: Duration },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Failed to spawn {process}: {source}")]
    SpawnFailed {
        process: ProcessKey,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to {process}: {reason}")]
    WriteFailed { process: ProcessKey, reason: WriteFailure },

    #[error("{process} did not exit within {timeout:?}")]
    TerminationTimeout { process: ProcessKey, timeout: Duration },

    #[error("Server already spawned")]
    ServerAlreadySpawned,

    #[error("Server must be spawned before {process}")]
    ServerNotSpawned { process: ProcessKey },

    #[error("Client {id} already spawned")]
    DuplicateClient { id: usize },

    #[error("Unknown process: {process}")]
    UnknownProcess { process: ProcessKey },

    #[error("Configuration error: {field}: {message}")]
    ConfigurationError { field: String, message: String },

    #[error("Unknown scenario '{name}'. Available: {available}")]
    UnknownScenario { name: String, available: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn write(process: ProcessKey, reason: impl Into<WriteFailure>) -> Self {
        Self::WriteFailed {
            process,
            reason: reason.into(),
        }
    }

    /// Process the error is about, if it concerns a single process
    pub fn process(&self) -> Option<ProcessKey> {
        match self {
            Self::SpawnFailed { process, .. }
            | Self::WriteFailed { process, .. }
            | Self::TerminationTimeout { process, .. }
            | Self::ServerNotSpawned { process }
            | Self::UnknownProcess { process } => Some(*process),
            Self::DuplicateClient { id } => Some(ProcessKey::Client(*id)),
            _ => None,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
