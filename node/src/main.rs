//! CLI entry point for a single cluster node
//!
//! Parses the node's address and replication factor, optionally joins an
//! existing cluster through a seed, then runs the server loop and the four
//! background workers (heartbeat sender, failure detector, anti-entropy
//! syncer, stats reporter) until a shutdown signal arrives.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use cluster_router::{
    workers::{
        AntiEntropySyncer, AntiEntropySyncerConfig, FailureDetector, FailureDetectorConfig,
        HeartbeatSender, HeartbeatSenderConfig, StatsReporter, StatsReporterConfig,
        DEFAULT_DETECTOR_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT,
        DEFAULT_INITIAL_DELAY, DEFAULT_REPORT_INTERVAL, DEFAULT_SYNC_INTERVAL,
    },
    Router, RouterConfig,
};
use common::{new_cancel_channel, worker::Worker, NodeId};
use node_server::{Server, ServerConfig};
use util::telemetry::{setup_system_logger, LevelFilter};

/// A node in a peer-to-peer replicated key-value cluster
///
/// With just a port, the node starts a fresh, single-member cluster. With
/// a seed host and port as well, it joins an existing cluster through that
/// seed at startup.
#[derive(Debug, Parser)]
#[command(name = "node", about = "A peer-to-peer replicated key-value store node")]
struct Cli {
    /// The port this node listens on for both clients and peers
    port: u16,
    /// An existing cluster member's host, to join through at startup
    seed_host: Option<String>,
    /// The seed's port; required together with `seed_host`
    seed_port: Option<u16>,

    /// The address this node binds its listening socket to and advertises
    /// to peers
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// The target number of replicas per key, capped by live membership
    #[arg(long = "replication-factor", default_value_t = 2)]
    replication_factor: usize,

    /// The log verbosity used when `RUST_LOG` is not set
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli.log_level.parse().unwrap_or(LevelFilter::INFO);
    setup_system_logger(level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "node exiting");
            ExitCode::FAILURE
        },
    }
}

/// Build the node, join a seed if one was given, and run until shutdown
async fn run(cli: Cli) -> eyre::Result<()> {
    if cli.seed_host.is_some() != cli.seed_port.is_some() {
        eyre::bail!("seed_host and seed_port must be given together, or not at all");
    }

    let self_id = NodeId::new(&cli.host, cli.port);
    let router = Arc::new(Router::new(RouterConfig {
        self_id,
        self_host: cli.host.clone(),
        self_port: cli.port,
        replication_factor: cli.replication_factor,
    }));

    let (cancel_tx, cancel_rx) = new_cancel_channel();

    let server = Server::new(ServerConfig {
        router: Arc::clone(&router),
        host: cli.host.clone(),
        port: cli.port,
    })?;
    let mut server_task = tokio::spawn(server.run(cancel_rx.clone()));

    // The seed contact itself races nothing: the server above is already
    // listening, so an inbound gossip JOIN naming this node can be answered
    // before the join sequence below even returns.
    if let (Some(seed_host), Some(seed_port)) = (cli.seed_host.as_deref(), cli.seed_port) {
        tracing::info!(seed_host, seed_port, "joining cluster through seed");
        router.join_cluster(seed_host, seed_port).await?;
    }

    spawn_background_workers(&router, cancel_rx.clone());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        },
        result = &mut server_task => {
            // The accept loop only ever returns on its own when the initial
            // bind failed; every other exit path waits on `cancel`.
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.into()),
                Err(join_err) => Err(join_err.into()),
            };
        },
    }

    let _ = cancel_tx.send(true);
    let _ = server_task.await;
    Ok(())
}

/// Spawn the four long-running background workers, logging (rather than
/// propagating) any error from their run loops -- only the server's own
/// bind failure is fatal to the process
fn spawn_background_workers(router: &Arc<Router>, cancel: common::CancelChannel) {
    let heartbeat = HeartbeatSender::new(HeartbeatSenderConfig {
        router: Arc::clone(router),
        interval: DEFAULT_HEARTBEAT_INTERVAL,
    })
    .expect("heartbeat sender construction is infallible");
    tokio::spawn(run_and_log(heartbeat, cancel.clone()));

    let detector = FailureDetector::new(FailureDetectorConfig {
        router: Arc::clone(router),
        interval: DEFAULT_DETECTOR_INTERVAL,
        timeout: DEFAULT_HEARTBEAT_TIMEOUT,
    })
    .expect("failure detector construction is infallible");
    tokio::spawn(run_and_log(detector, cancel.clone()));

    let anti_entropy = AntiEntropySyncer::new(AntiEntropySyncerConfig {
        router: Arc::clone(router),
        initial_delay: DEFAULT_INITIAL_DELAY,
        interval: DEFAULT_SYNC_INTERVAL,
    })
    .expect("anti-entropy syncer construction is infallible");
    tokio::spawn(run_and_log(anti_entropy, cancel.clone()));

    let stats = StatsReporter::new(StatsReporterConfig {
        router: Arc::clone(router),
        interval: DEFAULT_REPORT_INTERVAL,
    })
    .expect("stats reporter construction is infallible");
    tokio::spawn(run_and_log(stats, cancel));
}

/// Run a worker to completion, logging its name and error (if any) when it
/// exits rather than letting a periodic-task failure go unnoticed
async fn run_and_log<W: Worker>(worker: W, cancel: common::CancelChannel) {
    let name = worker.name();
    if let Err(err) = worker.run(cancel).await {
        tracing::error!(worker = name, error = %err, "background worker exited with an error");
    }
}
