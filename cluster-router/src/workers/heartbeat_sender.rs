//! Periodically announces this node's liveness to every known peer

use std::{convert::Infallible, sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{is_cancelled, worker::Worker, CancelChannel};
use wire_protocol::Request;

use crate::router::Router;

/// How often [`HeartbeatSender`] wakes, absent an explicit override
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Configuration for [`HeartbeatSender`]
pub struct HeartbeatSenderConfig {
    /// The router whose peer table and client this worker uses
    pub router: Arc<Router>,
    /// The wakeup period
    pub interval: Duration,
}

/// Wakes every `interval` and issues HEARTBEAT to every current peer
///
/// Sends are fire-and-forget and run concurrently: a peer that is slow or
/// unreachable cannot delay the round for the others, and its failure is
/// simply retried on the next tick.
pub struct HeartbeatSender {
    router: Arc<Router>,
    interval: Duration,
}

#[async_trait]
impl Worker for HeartbeatSender {
    type Config = HeartbeatSenderConfig;
    type Error = Infallible;

    fn new(config: Self::Config) -> Result<Self, Self::Error> {
        Ok(Self { router: config.router, interval: config.interval })
    }

    fn name(&self) -> &'static str {
        "heartbeat-sender"
    }

    async fn run(self, mut cancel: CancelChannel) -> Result<(), Self::Error> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.send_round(),
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

impl HeartbeatSender {
    /// Send one HEARTBEAT to every peer currently in the table, without
    /// waiting for any of the replies
    fn send_round(&self) {
        let request = Request::Heartbeat { node_id: self.router.self_id.clone() };
        for (id, record) in self.router.peers.snapshot() {
            let client = self.router.client.clone();
            let request = request.clone();
            tokio::spawn(async move {
                let response = client.send(&record.host, record.port, &request).await;
                if !response.is_success() {
                    tracing::debug!(peer = %id, "heartbeat send failed, next tick will retry");
                }
            });
        }
    }
}
