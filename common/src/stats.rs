//! Per-node operation counters and uptime

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use serde::{Deserialize, Serialize};

/// A JSON-serializable snapshot of a node's [`Stats`], returned by
/// `GET_STATS`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Number of PUT operations served locally
    pub puts: u64,
    /// Number of GET operations served locally
    pub gets: u64,
    /// Number of DELETE operations served locally
    pub deletes: u64,
    /// Number of REPLICATE operations applied, inbound or outbound
    pub replications: u64,
    /// Number of requests forwarded to another node
    pub forwards: u64,
    /// Seconds since this node started
    pub uptime_secs: f64,
    /// Number of keys currently stored locally
    pub key_count: usize,
    /// Number of peers currently in the peer table
    pub peer_count: usize,
}

/// Atomic counters tracking the operations a node has served
///
/// Each counter is its own atomic rather than a struct behind a mutex: the
/// counters are incremented from many concurrently-running connection
/// handlers and read only occasionally by `GET_STATS`, so contention-free
/// atomics are preferable to a lock for a hot, rarely-read field.
#[derive(Debug)]
pub struct Stats {
    /// Count of local PUTs
    puts: AtomicU64,
    /// Count of local GETs
    gets: AtomicU64,
    /// Count of local DELETEs
    deletes: AtomicU64,
    /// Count of REPLICATE operations applied
    replications: AtomicU64,
    /// Count of requests forwarded to another node
    forwards: AtomicU64,
    /// The instant this node started, used to compute uptime
    start_time: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            replications: AtomicU64::new(0),
            forwards: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl Stats {
    /// Record a served PUT
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served GET
    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served DELETE
    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an applied REPLICATE
    pub fn record_replication(&self) {
        self.replications.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a forwarded request
    pub fn record_forward(&self) {
        self.forwards.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters into a serializable struct
    pub fn snapshot(&self, key_count: usize, peer_count: usize) -> StatsSnapshot {
        StatsSnapshot {
            puts: self.puts.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            replications: self.replications.load(Ordering::Relaxed),
            forwards: self.forwards.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs_f64(),
            key_count,
            peer_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let stats = Stats::default();
        stats.record_put();
        stats.record_put();
        stats.record_get();

        let snap = stats.snapshot(3, 1);
        assert_eq!(snap.puts, 2);
        assert_eq!(snap.gets, 1);
        assert_eq!(snap.deletes, 0);
        assert_eq!(snap.key_count, 3);
        assert_eq!(snap.peer_count, 1);
    }
}
