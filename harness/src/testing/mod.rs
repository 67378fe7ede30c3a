//! Testing Framework
//!
//! Run reports and assertion helpers over collected records.

pub mod assertions;
pub mod report;

// Re-export main types
pub use assertions::{AssertionResult, RunAssertions};
pub use report::{RunReport, SpawnFailureRecord};
