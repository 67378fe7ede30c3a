//! Run Assertion Framework
//!
//! High-level checks over the records collected during a run and over its
//! final report.

use std::time::Duration;

use shared::{ProcessKey, ProcessState};

use crate::runtime::{RecordCollector, RecordQuery};
use crate::testing::report::RunReport;

#[derive(Debug)]
pub struct RunAssertions {
    collector: RecordCollector,
}

#[derive(Debug, Clone)]
pub struct AssertionResult {
    pub success: bool,
    pub message: String,
    pub details: Option<String>,
    pub records_found: usize,
}

impl AssertionResult {
    pub fn success(message: String, records_found: usize) -> Self {
        Self {
            success: true,
            message,
            details: None,
            records_found,
        }
    }

    pub fn failure(message: String, details: Option<String>) -> Self {
        Self {
            success: false,
            message,
            details,
            records_found: 0,
        }
    }

}

impl RunAssertions {
    pub fn new(collector: RecordCollector) -> Self {
        Self { collector }
    }

    pub fn get_collector(&self) -> &RecordCollector {
        &self.collector
    }

    /// Assert that a process produced a record containing the given text
    pub async fn assert_process_logged(
        &self,
        process: ProcessKey,
        message_contains: &str,
        timeout: Duration,
    ) -> AssertionResult {
        tracing::info!("🔍 Asserting {} logged '{}'", process.display_name(), message_contains);

        let query = RecordQuery::new().process(process).containing(message_contains);
        if self.collector.wait_for_records(&query, 1, timeout).await {
            AssertionResult::success(
                format!("{} logged '{}'", process.display_name(), message_contains),
                self.collector.count(&query),
            )
        } else {
            AssertionResult::failure(
                format!("{} did not log '{}' within timeout", process.display_name(), message_contains),
                Some(format!("Timeout: {:?}", timeout)),
            )
        }
    }

    /// Assert that every expected process produced at least one record
    pub async fn assert_all_processes_active(&self, expected: &[ProcessKey], timeout: Duration) -> AssertionResult {
        tracing::info!("👥 Asserting {} processes are active", expected.len());

        let mut missing = Vec::new();
        for process in expected {
            let query = RecordQuery::new().process(*process);
            if !self.collector.wait_for_records(&query, 1, timeout).await {
                missing.push(process.display_name());
            }
        }

        if missing.is_empty() {
            AssertionResult::success("All expected processes are active".to_string(), expected.len())
        } else {
            AssertionResult::failure(
                format!(
                    "Not all processes are active ({}/{})",
                    expected.len() - missing.len(),
                    expected.len()
                ),
                Some(format!("Missing processes: {:?}", missing)),
            )
        }
    }

    /// Assert no collected record matches the failure predicate
    pub fn assert_no_errors(&self) -> AssertionResult {
        let failures = self.collector.query(&RecordQuery::new().failures());

        if failures.is_empty() {
            AssertionResult::success("No error records found".to_string(), 0)
        } else {
            let samples: Vec<String> = failures
                .iter()
                .take(5)
                .map(|c| format!("{}: {}", c.process.display_name(), c.record.raw))
                .collect();

            AssertionResult::failure(
                format!("Found {} error records", failures.len()),
                Some(format!("Sample errors: {}", samples.join("; "))),
            )
        }
    }

    /// Assert the report's tally equals the number of failure records seen
    pub fn assert_tally_consistent(&self, report: &RunReport) -> AssertionResult {
        let failures = self.collector.count(&RecordQuery::new().failures()) as u64;

        if failures == report.error_tally {
            AssertionResult::success(format!("Tally matches {} failure records", failures), failures as usize)
        } else {
            AssertionResult::failure(
                format!("Tally {} does not match {} failure records", report.error_tally, failures),
                None,
            )
        }
    }

    /// Assert exact per-process command counts; processes not listed must
    /// have sent nothing beyond `baseline`
    pub fn assert_command_counts(
        &self,
        report: &RunReport,
        expected: &[(ProcessKey, u64)],
        baseline: u64,
    ) -> AssertionResult {
        let mismatches: Vec<String> = report
            .processes
            .iter()
            .filter_map(|summary| {
                let want = expected
                    .iter()
                    .find(|(key, _)| *key == summary.process)
                    .map(|(_, count)| *count)
                    .unwrap_or(if summary.process == ProcessKey::Server { 0 } else { baseline });
                (summary.commands != want)
                    .then(|| format!("{}: sent {}, expected {}", summary.name, summary.commands, want))
            })
            .collect();

        if mismatches.is_empty() {
            AssertionResult::success(
                format!("Command counts match for {} processes", report.processes.len()),
                report.processes.len(),
            )
        } else {
            AssertionResult::failure(
                format!("{} processes sent unexpected command counts", mismatches.len()),
                Some(mismatches.join("; ")),
            )
        }
    }

    /// Assert every process ended in `Terminated`
    pub fn assert_all_terminated(&self, report: &RunReport) -> AssertionResult {
        let running: Vec<&str> = report
            .processes
            .iter()
            .filter(|s| s.state != ProcessState::Terminated)
            .map(|s| s.name.as_str())
            .collect();

        if running.is_empty() {
            AssertionResult::success("All processes terminated".to_string(), report.processes.len())
        } else {
            AssertionResult::failure(
                format!("{} processes not terminated", running.len()),
                Some(format!("{:?}", running)),
            )
        }
    }
}
