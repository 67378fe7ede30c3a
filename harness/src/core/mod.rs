//! Core harness logic: line classification and fleet-wide counters
//!
//! Nothing in here touches processes or I/O.

pub mod activity;
pub mod classifier;
pub mod tally;

pub use activity::ActivityMonitor;
pub use classifier::{LineClassifier, LineGrammar, DEFAULT_BANNER_MARKERS, DEFAULT_PROMPT_PREFIXES};
pub use tally::ErrorTally;
