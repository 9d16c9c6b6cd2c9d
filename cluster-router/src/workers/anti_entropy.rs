//! Periodically re-syncs data gaps against a peer's snapshot

use std::{convert::Infallible, sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{is_cancelled, worker::Worker, CancelChannel};

use crate::router::Router;

/// The delay before the first anti-entropy pass, absent an override
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(10);
/// The steady-state period between passes, absent an override
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for [`AntiEntropySyncer`]
pub struct AntiEntropySyncerConfig {
    /// The router this worker syncs data into
    pub router: Arc<Router>,
    /// Delay before the first pass, giving the cluster a moment to settle
    /// after startup
    pub initial_delay: Duration,
    /// Period between passes thereafter
    pub interval: Duration,
}

/// Wakes once after `initial_delay`, then every `interval` after that, and
/// runs one gap-filling anti-entropy pass each time
///
/// A pass contacts known peers in turn until one answers GET_ALL_DATA
/// successfully, then writes every key this node is responsible for but
/// does not already hold. It never overwrites an existing local value:
/// this is a convergence gap-filler, not a reconciler, and it deliberately
/// does not propagate deletes (a key removed while this node was down will
/// reappear until explicitly deleted again).
pub struct AntiEntropySyncer {
    router: Arc<Router>,
    initial_delay: Duration,
    interval: Duration,
}

#[async_trait]
impl Worker for AntiEntropySyncer {
    type Config = AntiEntropySyncerConfig;
    type Error = Infallible;

    fn new(config: Self::Config) -> Result<Self, Self::Error> {
        Ok(Self { router: config.router, initial_delay: config.initial_delay, interval: config.interval })
    }

    fn name(&self) -> &'static str {
        "anti-entropy-syncer"
    }

    async fn run(self, mut cancel: CancelChannel) -> Result<(), Self::Error> {
        tokio::select! {
            _ = tokio::time::sleep(self.initial_delay) => {},
            _ = cancel.changed() => return Ok(()),
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the interval's first tick fires immediately; treat it as "now"

        loop {
            self.router.anti_entropy_pass().await;
            tokio::select! {
                _ = ticker.tick() => {},
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
