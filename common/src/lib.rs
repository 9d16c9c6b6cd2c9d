//! Shared types used throughout the workspace
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

mod node_id;
mod stats;
pub mod worker;

pub use node_id::{NodeId, NodeIdError};
pub use stats::{Stats, StatsSnapshot};

/// The sending half of the cluster-wide shutdown signal
pub type CancelSender = tokio::sync::watch::Sender<bool>;
/// The receiving half of the cluster-wide shutdown signal
///
/// Every long-running task clones a receiver and selects on it alongside its
/// own work; the sender flips it to `true` exactly once, at shutdown.
pub type CancelChannel = tokio::sync::watch::Receiver<bool>;

/// Build a fresh cancellation channel, unset (not cancelled)
pub fn new_cancel_channel() -> (CancelSender, CancelChannel) {
    tokio::sync::watch::channel(false)
}

/// Returns true if the channel has been signalled to cancel
pub fn is_cancelled(chan: &CancelChannel) -> bool {
    *chan.borrow()
}
