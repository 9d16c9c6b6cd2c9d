//! Periodically logs a one-line summary of this node's counters
//!
//! Not part of the wire protocol -- `GET_STATS` answers that on demand --
//! this is purely an observability convenience so counters show up in the
//! node's own logs without a client having to ask.

use std::{convert::Infallible, sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{is_cancelled, worker::Worker, CancelChannel};

use crate::router::Router;

/// How often [`StatsReporter`] logs a summary, absent an explicit override
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for [`StatsReporter`]
pub struct StatsReporterConfig {
    /// The router whose stats this worker reports
    pub router: Arc<Router>,
    /// The wakeup period
    pub interval: Duration,
}

/// Wakes every `interval` and logs a summary of this node's counters at
/// `info`
pub struct StatsReporter {
    router: Arc<Router>,
    interval: Duration,
}

#[async_trait]
impl Worker for StatsReporter {
    type Config = StatsReporterConfig;
    type Error = Infallible;

    fn new(config: Self::Config) -> Result<Self, Self::Error> {
        Ok(Self { router: config.router, interval: config.interval })
    }

    fn name(&self) -> &'static str {
        "stats-reporter"
    }

    async fn run(self, mut cancel: CancelChannel) -> Result<(), Self::Error> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.router.stats().snapshot(
                        self.router.kv.len(),
                        self.router.peers.len(),
                    );
                    tracing::info!(
                        puts = snapshot.puts,
                        gets = snapshot.gets,
                        deletes = snapshot.deletes,
                        replications = snapshot.replications,
                        forwards = snapshot.forwards,
                        keys = snapshot.key_count,
                        peers = snapshot.peer_count,
                        uptime_secs = snapshot.uptime_secs,
                        "node stats",
                    );
                },
                _ = cancel.changed() => {
                    if is_cancelled(&cancel) {
                        break;
                    }
                },
            }
        }
        Ok(())
    }
}
