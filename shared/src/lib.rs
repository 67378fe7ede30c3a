//! Shared types for the fleet harness
//!
//! Identifiers, classified log records and logging setup used by every
//! component of the harness. Kept free of process and runtime concerns so the
//! record model can be reused by report consumers.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
