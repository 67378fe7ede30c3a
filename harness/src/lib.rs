//! Fleet test harness
//!
//! End-to-end harness for a messaging application made of one server process
//! and a fleet of client processes. The harness spawns every process, drives it
//! with line commands on stdin and classifies the log lines it writes back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harness::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> HarnessResult<()> {
//! let config = HarnessConfig::builder()
//!     .clients(3)
//!     .server_dir("./server")
//!     .client_dir("./client")
//!     .build();
//! config.validate()?;
//!
//! let sinks: Vec<Arc<dyn OutputSink>> = vec![Arc::new(ConsoleSink)];
//! let report = ScenarioOrchestrator::new("mesh", config, sinks)
//!     .run(Topology::FullMesh)
//!     .await;
//!
//! println!("{}", report.summary_line());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod config;
pub mod core;
pub mod error;
pub mod runtime;
pub mod scenarios;
pub mod testing;
pub mod traits;

// Main interfaces - re-exported at crate root for convenience
pub use config::{AckPatterns, CommandTemplates, HarnessConfig, HarnessConfigBuilder, LaunchSpec, PhaseTiming};
pub use error::{HarnessError, HarnessResult, WriteFailure};
pub use runtime::{Fleet, ManagedProcess};
pub use scenarios::{ScenarioOrchestrator, TestScenarios, Topology};

// Supporting types
pub use crate::core::{ErrorTally, LineClassifier, LineGrammar};
pub use runtime::{ClientSelector, CollectedRecord, RecordCollector, RecordQuery};
pub use runtime::{ConsoleSink, FanoutSink, JsonLinesSink};
pub use testing::{AssertionResult, RunAssertions, RunReport};
pub use traits::OutputSink;
