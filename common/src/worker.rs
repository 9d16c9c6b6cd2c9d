//! A common lifecycle for the node's long-running background tasks
//!
//! Every periodic task on a node -- the heartbeat sender, the failure
//! detector, the anti-entropy syncer, the stats reporter, and the
//! connection-accepting server loop -- is built from a config struct,
//! then run to completion (or cancellation), selecting on a shared cancel
//! signal alongside its own timers and I/O.

use async_trait::async_trait;

use crate::CancelChannel;

/// A long-running node subsystem built from a config and driven to
/// completion by [`Worker::run`]
#[async_trait]
pub trait Worker: Sized + Send + 'static {
    /// The configuration needed to construct this worker
    type Config: Send;
    /// The error type this worker's setup and execution loop may return
    type Error: std::error::Error + Send + Sync + 'static;

    /// Construct the worker from its configuration
    fn new(config: Self::Config) -> Result<Self, Self::Error>;

    /// A short name for this worker, used in logs
    fn name(&self) -> &'static str;

    /// Run the worker's execution loop until `cancel` is signalled
    ///
    /// Implementations must select on `cancel` alongside their own
    /// timers/IO so that shutdown is observed promptly rather than on the
    /// next multi-second tick.
    async fn run(self, cancel: CancelChannel) -> Result<(), Self::Error>;
}
