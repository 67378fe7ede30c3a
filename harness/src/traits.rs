//! Trait definitions with mockall annotations for testing
//!
//! The output sink is the seam between the drain tasks and whatever consumes
//! classified records (console, file, in-memory collector).

use shared::{LogRecord, ProcessKey};

/// Consumer of classified child output
///
/// Called from drain tasks, one call per record, in the order the process
/// emitted the lines. Implementations must not block for long: a slow sink
/// slows down draining of that process.
#[mockall::automock]
pub trait OutputSink: Send + Sync {
    /// Receive one record from `origin`
    fn emit(&self, origin: &ProcessKey, record: &LogRecord);
}
