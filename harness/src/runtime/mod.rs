//! Runtime Management
//!
//! Process lifecycles, output draining and record collection during a run.

pub mod collector;
pub mod drain;
pub mod fleet;
pub mod process;
pub mod sinks;

// Re-export main types
pub use collector::{CollectedRecord, CollectorStats, RecordCollector, RecordMark, RecordQuery};
pub use drain::{OutputPipeline, ProcessCounters};
pub use fleet::{
    BroadcastReport, ClientSelector, Fleet, FleetPhase, ProcessSummary, TeardownReport, WriteFailureRecord,
};
pub use process::{ManagedProcess, Termination, TerminationOutcome};
pub use sinks::{ConsoleSink, FanoutSink, JsonLinesSink};
