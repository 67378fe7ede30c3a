//! Output activity tracking for settle barriers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Records when the fleet last produced output
///
/// Drain tasks call [`ActivityMonitor::touch`] for every line they read,
/// including lines the classifier drops. Barriers use it to decide that the
/// fleet has settled.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    inner: Arc<ActivityInner>,
}

#[derive(Debug)]
struct ActivityInner {
    base: Instant,
    last_ms: AtomicU64,
    lines: AtomicU64,
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ActivityInner {
                base: Instant::now(),
                last_ms: AtomicU64::new(0),
                lines: AtomicU64::new(0),
            }),
        }
    }

    pub fn touch(&self) {
        let elapsed = self.inner.base.elapsed().as_millis() as u64;
        self.inner.last_ms.fetch_max(elapsed, Ordering::AcqRel);
        self.inner.lines.fetch_add(1, Ordering::AcqRel);
    }

    /// Total lines read across the fleet
    pub fn lines(&self) -> u64 {
        self.inner.lines.load(Ordering::Acquire)
    }

    pub fn last_activity(&self) -> Instant {
        self.inner.base + Duration::from_millis(self.inner.last_ms.load(Ordering::Acquire))
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }

    /// Wait until no output has been seen for `grace`.
    ///
    /// Quiet time is counted from the later of the last output and the start
    /// of the wait, so the call always lasts at least `grace`. Returns `false`
    /// if the fleet was still busy when `timeout` elapsed.
    pub async fn wait_for_quiet(&self, grace: Duration, timeout: Duration) -> bool {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            let idle = Instant::now().saturating_duration_since(self.last_activity().max(started));
            if idle >= grace {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            tokio::time::sleep((grace - idle).min(deadline - now)).await;
        }
    }
}
