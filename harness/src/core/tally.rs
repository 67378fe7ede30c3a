//! Fleet-wide failure counter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared failure tally
///
/// Every drain task holds a clone and increments it once per record matching
/// the failure predicate. Read the final value only after the drain tasks have
/// finished.
#[derive(Debug, Clone, Default)]
pub struct ErrorTally {
    count: Arc<AtomicU64>,
}

impl ErrorTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one and return the new total
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_count() {
        let tally = ErrorTally::new();
        let other = tally.clone();

        assert_eq!(tally.increment(), 1);
        assert_eq!(other.increment(), 2);
        assert_eq!(tally.get(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let tally = ErrorTally::new();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let tally = tally.clone();
                tokio::spawn(async move {
                    for _ in 0..1_000 {
                        tally.increment();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(tally.get(), 8_000);
    }
}
