//! Record Collector
//!
//! In-memory sink that keeps classified records from every process in the
//! fleet. Provides query, statistics and wait capabilities used by barriers
//! and by assertions after a run.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use shared::{LogLevel, LogRecord, ProcessKey, Role};
use tokio::sync::Notify;

use crate::traits::OutputSink;

/// Default number of records kept before the oldest are evicted
pub const DEFAULT_CAPACITY: usize = 100_000;

#[derive(Debug, Clone)]
pub struct RecordCollector {
    inner: Arc<CollectorInner>,
}

#[derive(Debug)]
struct CollectorInner {
    records: Mutex<CollectorState>,
    arrivals: Notify,
    capacity: usize,
}

#[derive(Debug, Default)]
struct CollectorState {
    records: VecDeque<CollectedRecord>,
    next_seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedRecord {
    pub seq: u64,
    pub process: ProcessKey,
    pub record: LogRecord,
    pub received_at: SystemTime,
}

/// Position in the record stream; records collected afterwards have a
/// sequence number at or above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordMark(u64);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordQuery {
    pub process_filter: Option<ProcessKey>,
    pub role_filter: Option<Role>,
    pub level_filter: Option<LogLevel>,
    pub message_contains: Option<String>,
    pub failures_only: bool,
    pub since: Option<RecordMark>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(mut self, process: ProcessKey) -> Self {
        self.process_filter = Some(process);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role_filter = Some(role);
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level_filter = Some(level);
        self
    }

    pub fn containing(mut self, text: impl Into<String>) -> Self {
        self.message_contains = Some(text.into());
        self
    }

    pub fn failures(mut self) -> Self {
        self.failures_only = true;
        self
    }

    pub fn since(mut self, mark: RecordMark) -> Self {
        self.since = Some(mark);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, collected: &CollectedRecord) -> bool {
        if let Some(process) = self.process_filter {
            if collected.process != process {
                return false;
            }
        }

        if let Some(role) = self.role_filter {
            if collected.process.role() != role {
                return false;
            }
        }

        if let Some(level) = self.level_filter {
            if collected.record.level != level {
                return false;
            }
        }

        // Matched against the raw line so unstructured records are searchable
        if let Some(ref text) = self.message_contains {
            if !collected.record.raw.contains(text.as_str()) {
                return false;
            }
        }

        if self.failures_only && !collected.record.is_failure() {
            return false;
        }

        if let Some(RecordMark(seq)) = self.since {
            if collected.seq < seq {
                return false;
            }
        }

        true
    }
}

#[derive(Debug, Clone)]
pub struct CollectorStats {
    pub total_records: usize,
    pub records_by_process: HashMap<ProcessKey, usize>,
    pub records_by_level: HashMap<LogLevel, usize>,
    pub failures: usize,
}

impl Default for RecordCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCollector {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                records: Mutex::new(CollectorState::default()),
                arrivals: Notify::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CollectorState> {
        self.inner.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store one record and wake any waiters
    pub fn push(&self, process: ProcessKey, record: LogRecord) {
        {
            let mut state = self.state();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.records.push_back(CollectedRecord {
                seq,
                process,
                record,
                received_at: SystemTime::now(),
            });

            if state.records.len() > self.inner.capacity {
                state.records.pop_front();
            }
        }

        self.inner.arrivals.notify_waiters();
    }

    /// Current end of the stream
    pub fn mark(&self) -> RecordMark {
        RecordMark(self.state().next_seq)
    }

    /// Get all retained records in arrival order
    pub fn get_all_records(&self) -> Vec<CollectedRecord> {
        self.state().records.iter().cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.state().records.len()
    }

    /// Clear all collected records; marks taken earlier stay valid
    pub fn clear(&self) {
        self.state().records.clear();
        tracing::debug!("🗑️ Cleared all collected records");
    }

    /// Query records with filters, in arrival order
    pub fn query(&self, query: &RecordQuery) -> Vec<CollectedRecord> {
        let state = self.state();
        let matching = state.records.iter().filter(|r| query.matches(r)).cloned();

        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    pub fn count(&self, query: &RecordQuery) -> usize {
        self.state().records.iter().filter(|r| query.matches(r)).count()
    }

    /// Get collector statistics
    pub fn get_stats(&self) -> CollectorStats {
        let state = self.state();

        let mut records_by_process = HashMap::new();
        let mut records_by_level = HashMap::new();
        let mut failures = 0;

        for collected in state.records.iter() {
            *records_by_process.entry(collected.process).or_insert(0) += 1;
            *records_by_level.entry(collected.record.level).or_insert(0) += 1;
            if collected.record.is_failure() {
                failures += 1;
            }
        }

        CollectorStats {
            total_records: state.records.len(),
            records_by_process,
            records_by_level,
            failures,
        }
    }

    /// Wait until at least `count` records match `query`.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for_records(&self, query: &RecordQuery, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let arrival = self.inner.arrivals.notified();
            tokio::pin!(arrival);
            // Register before checking so a push between check and await is not missed
            arrival.as_mut().enable();

            let found = self.count(query);
            if found >= count {
                tracing::debug!("✅ Found {} matching records (wanted {})", found, count);
                return true;
            }

            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                tracing::debug!("⏰ Timeout waiting for {} records, found {}", count, self.count(query));
                return false;
            }
        }
    }

    /// Wait for a record whose raw line contains `text`
    pub async fn wait_for_message(&self, text: &str, timeout: Duration) -> bool {
        self.wait_for_records(&RecordQuery::new().containing(text), 1, timeout).await
    }
}

impl OutputSink for RecordCollector {
    fn emit(&self, origin: &ProcessKey, record: &LogRecord) {
        self.push(*origin, record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LineClassifier;

    fn record(line: &str) -> LogRecord {
        LineClassifier::default().classify(line).unwrap()
    }

    #[test]
    fn test_query_filters() {
        let collector = RecordCollector::new();
        collector.push(ProcessKey::Server, record("10:00:00.000 [notice] Listening on 4011"));
        collector.push(ProcessKey::Client(0), record("10:00:01.000 [info] Signed up user0"));
        collector.push(ProcessKey::Client(1), record("10:00:01.500 [warning] Send error, retrying"));
        collector.push(ProcessKey::Client(1), record("plain output"));

        assert_eq!(collector.count(&RecordQuery::new().role(Role::Client)), 3);
        assert_eq!(collector.count(&RecordQuery::new().process(ProcessKey::Client(1))), 2);
        assert_eq!(collector.count(&RecordQuery::new().level(LogLevel::Unknown)), 1);
        assert_eq!(collector.count(&RecordQuery::new().failures()), 1);
        assert_eq!(collector.count(&RecordQuery::new().containing("Listening")), 1);

        let limited = collector.query(&RecordQuery::new().limit(2));
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].process, ProcessKey::Server);
    }

    #[test]
    fn test_mark_limits_to_later_records() {
        let collector = RecordCollector::new();
        collector.push(ProcessKey::Client(0), record("10:00:00.000 [info] ack one"));
        let mark = collector.mark();
        collector.push(ProcessKey::Client(0), record("10:00:00.100 [info] ack two"));

        let since = collector.query(&RecordQuery::new().containing("ack").since(mark));
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].record.message, "ack two");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let collector = RecordCollector::with_capacity(2);
        for i in 0..3 {
            collector.push(ProcessKey::Server, LogRecord::unstructured(format!("line {i}")));
        }

        let records = collector.get_all_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record.raw, "line 1");
        assert_eq!(records[0].seq, 1);
    }

    #[test]
    fn test_stats() {
        let collector = RecordCollector::new();
        collector.push(ProcessKey::Server, record("10:00:00.000 [info] up"));
        collector.push(ProcessKey::Server, record("boom error"));

        let stats = collector.get_stats();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.records_by_process[&ProcessKey::Server], 2);
        assert_eq!(stats.records_by_level[&LogLevel::Info], 1);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn test_wait_for_records_wakes_on_push() {
        let collector = RecordCollector::new();
        let producer = collector.clone();

        let pushes = tokio::spawn(async move {
            for i in 0..3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                producer.push(ProcessKey::Client(i), LogRecord::unstructured(format!("ack {i}")));
            }
        });

        let query = RecordQuery::new().containing("ack");
        assert!(collector.wait_for_records(&query, 3, Duration::from_secs(5)).await);
        pushes.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_message_times_out() {
        let collector = RecordCollector::new();
        collector.push(ProcessKey::Server, LogRecord::unstructured("something else"));

        assert!(!collector.wait_for_message("never", Duration::from_millis(50)).await);
    }
}
