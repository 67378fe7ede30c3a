//! Child process output draining
//!
//! Each managed process gets exactly one drain task covering both stdout and
//! stderr. The task reads until both streams end, classifies every line,
//! bumps the failure counters and forwards records to the sink. It never
//! touches the input stream, so command issuance is never held up by it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shared::{process_debug, process_warn, ProcessKey, ProcessState};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::{ActivityMonitor, ErrorTally, LineClassifier};
use crate::traits::OutputSink;

/// Everything a drain task needs besides its own streams
#[derive(Clone)]
pub struct OutputPipeline {
    pub classifier: Arc<LineClassifier>,
    pub tally: ErrorTally,
    pub activity: ActivityMonitor,
    pub sink: Arc<dyn OutputSink>,
}

impl OutputPipeline {
    pub fn new(classifier: LineClassifier, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            classifier: Arc::new(classifier),
            tally: ErrorTally::new(),
            activity: ActivityMonitor::new(),
            sink,
        }
    }

    /// Process one raw line from `origin`
    pub fn ingest(&self, origin: &ProcessKey, counters: &ProcessCounters, line: &str) {
        self.activity.touch();
        counters.lines.fetch_add(1, Ordering::AcqRel);

        let Some(record) = self.classifier.classify(line) else {
            return;
        };

        counters.records.fetch_add(1, Ordering::AcqRel);
        if record.is_failure() {
            counters.errors.fetch_add(1, Ordering::AcqRel);
            self.tally.increment();
        }

        self.sink.emit(origin, &record);
    }
}

/// Per-process counters, updated by the drain task and by `send`
#[derive(Debug, Default)]
pub struct ProcessCounters {
    pub lines: AtomicU64,
    pub records: AtomicU64,
    pub errors: AtomicU64,
    pub commands: AtomicU64,
}

impl ProcessCounters {
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Acquire)
    }

    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Acquire)
    }

    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Acquire)
    }
}

/// Newline-delimited reader that tolerates invalid UTF-8
///
/// Partially read bytes stay in `buf` when a read is cancelled by `select!`,
/// so the next call resumes the same line.
struct LineSource<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineSource<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(&['\n', '\r'][..])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}

async fn next_from<R: AsyncRead + Unpin>(source: &mut Option<LineSource<R>>) -> std::io::Result<Option<String>> {
    match source {
        Some(source) => source.next_line().await,
        None => std::future::pending().await,
    }
}

enum StreamName {
    Stdout,
    Stderr,
}

/// Spawn the drain task for one process
pub fn spawn_drain(
    origin: ProcessKey,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    pipeline: OutputPipeline,
    counters: Arc<ProcessCounters>,
    state: Arc<watch::Sender<ProcessState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = stdout.map(LineSource::new);
        let mut stderr = stderr.map(LineSource::new);

        while stdout.is_some() || stderr.is_some() {
            let (stream, result) = tokio::select! {
                result = next_from(&mut stdout) => (StreamName::Stdout, result),
                result = next_from(&mut stderr) => (StreamName::Stderr, result),
            };

            match result {
                Ok(Some(line)) => pipeline.ingest(&origin, &counters, &line),
                Ok(None) => match stream {
                    StreamName::Stdout => stdout = None,
                    StreamName::Stderr => stderr = None,
                },
                Err(e) => {
                    process_warn!(origin, "⚠️ Output stream read failed: {}", e);
                    match stream {
                        StreamName::Stdout => stdout = None,
                        StreamName::Stderr => stderr = None,
                    }
                }
            }
        }

        let marked = state.send_if_modified(|current| {
            if *current == ProcessState::Running {
                *current = ProcessState::Draining;
                true
            } else {
                false
            }
        });

        process_debug!(
            origin,
            "📭 Output drained after {} lines ({} failures){}",
            counters.lines(),
            counters.errors(),
            if marked { ", process now draining" } else { "" }
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockOutputSink;
    use shared::LogLevel;

    #[test]
    fn test_ingest_counts_failures_and_forwards_records() {
        let mut sink = MockOutputSink::new();
        sink.expect_emit()
            .withf(|origin, record| *origin == ProcessKey::Client(2) && record.level == LogLevel::Info)
            .times(1)
            .return_const(());
        sink.expect_emit()
            .withf(|_, record| record.is_failure())
            .times(1)
            .return_const(());

        let pipeline = OutputPipeline::new(LineClassifier::default(), Arc::new(sink));
        let counters = ProcessCounters::default();
        let origin = ProcessKey::Client(2);

        pipeline.ingest(&origin, &counters, "10:00:00.000 [info] Contact added");
        pipeline.ingest(&origin, &counters, "");
        pipeline.ingest(&origin, &counters, "Interactive Elixir (1.15.7)");
        pipeline.ingest(&origin, &counters, "** (UndefinedFunctionError) function undefined");

        assert_eq!(counters.lines(), 4);
        assert_eq!(counters.records(), 2);
        assert_eq!(counters.errors(), 1);
        assert_eq!(pipeline.tally.get(), 1);
        assert_eq!(pipeline.activity.lines(), 4);
    }

    #[test]
    fn test_dropped_lines_never_count() {
        let mut sink = MockOutputSink::new();
        sink.expect_emit().never();

        let pipeline = OutputPipeline::new(LineClassifier::default(), Arc::new(sink));
        let counters = ProcessCounters::default();

        pipeline.ingest(&ProcessKey::Server, &counters, "iex(3)> ");
        pipeline.ingest(&ProcessKey::Server, &counters, "Erlang/OTP 26 [error-logger]");
        assert_eq!(pipeline.tally.get(), 0);
        assert_eq!(counters.errors(), 0);
        assert_eq!(counters.lines(), 2);
    }

    #[test]
    fn test_error_after_prompt_is_tallied() {
        let mut sink = MockOutputSink::new();
        sink.expect_emit()
            .withf(|_, record| record.raw.starts_with("** (UndefinedFunctionError)"))
            .times(1)
            .return_const(());

        let pipeline = OutputPipeline::new(LineClassifier::default(), Arc::new(sink));
        let counters = ProcessCounters::default();

        pipeline.ingest(
            &ProcessKey::Client(0),
            &counters,
            "iex(2)> ** (UndefinedFunctionError) function Client.Account.signup/2 is undefined",
        );
        assert_eq!(pipeline.tally.get(), 1);
        assert_eq!(counters.records(), 1);
        assert_eq!(counters.errors(), 1);
    }

    #[tokio::test]
    async fn test_line_source_handles_partial_and_invalid_lines() {
        let data: &[u8] = b"first\r\nsecond \xff\nlast-without-newline";
        let mut source = LineSource::new(data);

        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("second \u{fffd}"));
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("last-without-newline"));
        assert_eq!(source.next_line().await.unwrap(), None);
    }
}
