//! Shared error types for the fleet harness

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid process key: {input}")]
    InvalidProcessKey { input: String },

    #[error("Invalid log level: {input}")]
    InvalidLogLevel { input: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
