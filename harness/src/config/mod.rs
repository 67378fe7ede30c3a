//! Configuration Management
//!
//! Configuration structures and builders for a harness run: how to launch
//! the server and clients, how to parse their output, what to send them and
//! how long to wait between phases.

pub mod builder;
pub mod commands;
pub mod env;
pub mod harness;

// Re-export main types
pub use builder::HarnessConfigBuilder;
pub use commands::{AckPatterns, CommandTemplates};
pub use harness::{HarnessConfig, LaunchSpec, PhaseTiming};
