//! Output sinks for classified records

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{LogLevel, LogRecord, ProcessKey};

use crate::error::HarnessResult;
use crate::traits::OutputSink;

/// Render a record as one console line, prefixed with the process name
pub fn format_record(origin: &ProcessKey, record: &LogRecord) -> String {
    let name = origin.display_name();

    if record.level == LogLevel::Unknown {
        return format!("[{name}] {}", record.raw);
    }

    let mut line = format!("[{name}] {}", record.timestamp);
    for field in &record.metadata {
        line.push(' ');
        line.push_str(field);
    }
    line.push_str(&format!(" [{}] {}", record.level, record.message));
    line
}

/// Prints every record to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn emit(&self, origin: &ProcessKey, record: &LogRecord) {
        println!("{}", format_record(origin, record));
    }
}

#[derive(Serialize)]
struct RecordLine<'a> {
    process: &'a ProcessKey,
    received_at: DateTime<Utc>,
    record: &'a LogRecord,
}

/// Appends every record as one JSON object per line
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn flush(&self) -> HarnessResult<()> {
        if let Ok(mut writer) = self.writer.lock() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl OutputSink for JsonLinesSink {
    fn emit(&self, origin: &ProcessKey, record: &LogRecord) {
        let line = RecordLine {
            process: origin,
            received_at: Utc::now(),
            record,
        };

        let Ok(mut writer) = self.writer.lock() else {
            return;
        };

        let written = serde_json::to_writer(&mut *writer, &line)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));

        if let Err(e) = written {
            tracing::warn!("⚠️ Failed to write record from {}: {}", origin, e);
        }
    }
}

/// Forwards every record to each inner sink in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OutputSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl OutputSink for FanoutSink {
    fn emit(&self, origin: &ProcessKey, record: &LogRecord) {
        for sink in &self.sinks {
            sink.emit(origin, record);
        }
    }
}
