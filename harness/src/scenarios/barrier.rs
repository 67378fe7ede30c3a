//! Synchronization points between scenario phases
//!
//! Every barrier is bounded. A barrier that times out is reported and the run
//! carries on.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::ActivityMonitor;
use crate::runtime::{RecordCollector, RecordQuery};

/// Create an external readiness signal. Send `true` to release waiters.
pub fn ready_signal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[derive(Debug, Clone)]
pub enum Barrier {
    /// Sleep for a fixed time
    Delay(Duration),
    /// Wait until an external signal reports ready
    Signal { ready: watch::Receiver<bool>, timeout: Duration },
    /// Wait until the fleet produced no output for `grace`
    Quiet { grace: Duration, timeout: Duration },
    /// Wait until `count` records match `query`
    Acknowledged {
        query: RecordQuery,
        count: usize,
        timeout: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierKind {
    Delay,
    Signal,
    Quiet,
    Acknowledged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierOutcome {
    pub label: String,
    pub kind: BarrierKind,
    pub satisfied: bool,
    pub waited_ms: u64,
}

impl BarrierOutcome {
    pub fn timed_out(&self) -> bool {
        !self.satisfied
    }
}

impl Barrier {
    pub fn kind(&self) -> BarrierKind {
        match self {
            Barrier::Delay(_) => BarrierKind::Delay,
            Barrier::Signal { .. } => BarrierKind::Signal,
            Barrier::Quiet { .. } => BarrierKind::Quiet,
            Barrier::Acknowledged { .. } => BarrierKind::Acknowledged,
        }
    }

    pub async fn wait(self, label: &str, activity: &ActivityMonitor, collector: &RecordCollector) -> BarrierOutcome {
        let kind = self.kind();
        let started = Instant::now();

        let satisfied = match self {
            Barrier::Delay(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            Barrier::Signal { mut ready, timeout } => tokio::time::timeout(timeout, ready.wait_for(|ready| *ready))
                .await
                .map(|signal| signal.is_ok())
                .unwrap_or(false),
            Barrier::Quiet { grace, timeout } => activity.wait_for_quiet(grace, timeout).await,
            Barrier::Acknowledged { query, count, timeout } => collector.wait_for_records(&query, count, timeout).await,
        };

        let waited = started.elapsed();
        if satisfied {
            debug!("🚦 Barrier '{}' ({:?}) passed after {:?}", label, kind, waited);
        } else {
            warn!("⏰ Barrier '{}' ({:?}) timed out after {:?}, proceeding", label, kind, waited);
        }

        BarrierOutcome {
            label: label.to_string(),
            kind,
            satisfied,
            waited_ms: waited.as_millis() as u64,
        }
    }
}
