//! The four long-running background tasks every node runs alongside its
//! connection acceptor: heartbeat sender, failure detector, anti-entropy
//! syncer, and stats reporter
//!
//! Each is a [`common::worker::Worker`] built from an `Arc<Router>` plus its
//! own timing configuration; every periodic concern gets its own
//! independent timer loop rather than a single combined scheduler.

mod anti_entropy;
mod failure_detector;
mod heartbeat_sender;
mod stats_reporter;

pub use anti_entropy::{
    AntiEntropySyncer, AntiEntropySyncerConfig, DEFAULT_INITIAL_DELAY, DEFAULT_SYNC_INTERVAL,
};
pub use failure_detector::{
    FailureDetector, FailureDetectorConfig, DEFAULT_DETECTOR_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT,
};
pub use heartbeat_sender::{HeartbeatSender, HeartbeatSenderConfig, DEFAULT_HEARTBEAT_INTERVAL};
pub use stats_reporter::{StatsReporter, StatsReporterConfig, DEFAULT_REPORT_INTERVAL};
