//! Common test utilities and infrastructure
//!
//! Fake applications (shell scripts standing in for the server and clients)
//! and helpers for building harness configurations around them.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::TestHelpers;
