//! Consumer loop statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime statistics for the queue consumer
#[derive(Debug, Default)]
pub struct ConsumerStats {
    /// Cycles started
    pub cycles: AtomicU64,
    /// Messages returned by successful polls
    pub messages_received: AtomicU64,
    /// Events handed to the dispatch channel
    pub dispatched: AtomicU64,
    /// Foreign messages made visible again
    pub released: AtomicU64,
    /// Poison or anomalous messages deleted
    pub deleted: AtomicU64,
    /// Messages left untouched because an attribute was missing
    pub skipped: AtomicU64,
    /// Failed polls
    pub poll_failures: AtomicU64,
    /// Failed visibility changes and deletes
    pub operation_failures: AtomicU64,
    /// Re-registration signals delivered to the trigger channel
    pub reregistrations_requested: AtomicU64,
    /// Queue clients rebuilt after an identity update
    pub client_rebuilds: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub cycles: u64,
    pub messages_received: u64,
    pub dispatched: u64,
    pub released: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub poll_failures: u64,
    pub operation_failures: u64,
    pub reregistrations_requested: u64,
    pub client_rebuilds: u64,
}

impl ConsumerStats {
    pub(crate) fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            operation_failures: self.operation_failures.load(Ordering::Relaxed),
            reregistrations_requested: self.reregistrations_requested.load(Ordering::Relaxed),
            client_rebuilds: self.client_rebuilds.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = ConsumerStats::default();
        ConsumerStats::increment(&stats.cycles);
        ConsumerStats::increment(&stats.cycles);
        ConsumerStats::increment(&stats.deleted);
        stats.messages_received.fetch_add(5, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cycles, 2);
        assert_eq!(snapshot.deleted, 1);
        assert_eq!(snapshot.messages_received, 5);
        assert_eq!(snapshot.dispatched, 0);
    }
}
