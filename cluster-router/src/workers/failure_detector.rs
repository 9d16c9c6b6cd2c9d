//! Periodically drops peers whose heartbeat has gone stale

use std::{convert::Infallible, sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{is_cancelled, worker::Worker, CancelChannel};

use crate::router::Router;

/// How often [`FailureDetector`] wakes, absent an explicit override
pub const DEFAULT_DETECTOR_INTERVAL: Duration = Duration::from_secs(5);
/// How long a peer may go without a heartbeat before it is dropped
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`FailureDetector`]
pub struct FailureDetectorConfig {
    /// The router whose peer table this worker prunes
    pub router: Arc<Router>,
    /// The wakeup period
    pub interval: Duration,
    /// The staleness threshold past which a peer is considered gone
    pub timeout: Duration,
}

/// Wakes every `interval`, and removes every peer whose last heartbeat is
/// older than `timeout` from both the peer table and (by extension) ring
/// membership
///
/// This is the single transition a peer goes through on failure: it stops
/// being a replication/forwarding target and stops being heartbeated.
/// There is no automatic re-probing; a peer that returns must rejoin.
pub struct FailureDetector {
    router: Arc<Router>,
    interval: Duration,
    timeout: Duration,
}

#[async_trait]
impl Worker for FailureDetector {
    type Config = FailureDetectorConfig;
    type Error = Infallible;

    fn new(config: Self::Config) -> Result<Self, Self::Error> {
        Ok(Self { router: config.router, interval: config.interval, timeout: config.timeout })
    }

    fn name(&self) -> &'static str {
        "failure-detector"
    }

    async fn run(self, mut cancel: CancelChannel) -> Result<(), Self::Error> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for id in self.router.peers.expire(self.timeout) {
                        tracing::info!(peer = %id, "peer heartbeat expired, dropped from cluster");
                    }
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
