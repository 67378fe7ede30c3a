//! Run report
//!
//! Summary of one scenario run: the error tally, what every process did, and
//! everything that went wrong along the way.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::ProcessKey;
use uuid::Uuid;

use crate::error::HarnessResult;
use crate::runtime::{FleetPhase, ProcessSummary, TeardownReport, WriteFailureRecord};
use crate::scenarios::BarrierOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnFailureRecord {
    pub process: ProcessKey,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub clients_requested: usize,
    /// Failure-matching records across the whole fleet
    pub error_tally: u64,
    pub commands_sent: u64,
    pub processes: Vec<ProcessSummary>,
    pub spawn_failures: Vec<SpawnFailureRecord>,
    pub write_failures: Vec<WriteFailureRecord>,
    pub termination_timeouts: Vec<ProcessKey>,
    pub teardown_order: Vec<ProcessKey>,
    pub barriers: Vec<BarrierOutcome>,
    pub phases_completed: Vec<FleetPhase>,
    /// Set when the server could not be started
    pub fatal: Option<String>,
    /// Set when client phases were skipped
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(scenario: impl Into<String>, clients_requested: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.into(),
            started_at: Utc::now(),
            finished_at: None,
            clients_requested,
            error_tally: 0,
            commands_sent: 0,
            processes: Vec::new(),
            spawn_failures: Vec::new(),
            write_failures: Vec::new(),
            termination_timeouts: Vec::new(),
            teardown_order: Vec::new(),
            barriers: Vec::new(),
            phases_completed: Vec::new(),
            fatal: None,
            aborted: None,
        }
    }

    pub fn record_teardown(&mut self, teardown: TeardownReport) {
        self.teardown_order = teardown.order;
        self.termination_timeouts = teardown.timeouts;
    }

    pub fn finish(&mut self, error_tally: u64, processes: Vec<ProcessSummary>) {
        self.error_tally = error_tally;
        self.commands_sent = processes.iter().map(|p| p.commands).sum();
        self.processes = processes;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn barrier_timeouts(&self) -> usize {
        self.barriers.iter().filter(|b| b.timed_out()).count()
    }

    /// True when nothing at all went wrong, tally included
    pub fn is_clean(&self) -> bool {
        self.error_tally == 0
            && self.fatal.is_none()
            && self.aborted.is_none()
            && self.spawn_failures.is_empty()
            && self.write_failures.is_empty()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at.map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn summary_line(&self) -> String {
        format!("Errors: {}", self.error_tally)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> HarnessResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Write several reports as one JSON array
    pub fn write_all_json(reports: &[RunReport], path: impl AsRef<Path>) -> HarnessResult<()> {
        let json = serde_json::to_string_pretty(reports)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::BarrierKind;

    #[test]
    fn test_clean_report() {
        let mut report = RunReport::new("mesh", 3);
        report.finish(0, Vec::new());

        assert!(report.is_clean());
        assert_eq!(report.summary_line(), "Errors: 0");
        assert!(report.duration_ms().is_some());
    }

    #[test]
    fn test_failures_make_report_dirty() {
        let mut report = RunReport::new("fanout", 3);
        report.barriers.push(BarrierOutcome {
            label: "signup".to_string(),
            kind: BarrierKind::Quiet,
            satisfied: false,
            waited_ms: 30_000,
        });
        report.finish(2, Vec::new());

        assert!(!report.is_clean());
        assert_eq!(report.barrier_timeouts(), 1);
        assert_eq!(report.summary_line(), "Errors: 2");
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = RunReport::new("mesh", 1);
        report.spawn_failures.push(SpawnFailureRecord {
            process: ProcessKey::Client(0),
            error: "No such file or directory".to_string(),
        });
        report.write_json(&path).unwrap();

        let parsed: RunReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.spawn_failures[0].process, ProcessKey::Client(0));
    }
}
