//! The router's own error taxonomy, rendered into `{status: "error",
//! message}` responses at the wire boundary
//!
//! These are the errors the router detects itself, as distinct from a
//! forwarded request's response, which already arrives in the wire's
//! success/error shape and is passed through verbatim rather than routed
//! through this type.

use thiserror::Error;
use wire_protocol::Response;

/// Errors the router can raise while deciding how to serve a request
#[derive(Debug, Error)]
pub enum RouterError {
    /// GET or DELETE of a key this node is responsible for, but does not
    /// hold
    #[error("key not found")]
    KeyNotFound,
    /// This node is not responsible for the key and the primary replica is
    /// not (or no longer) a known peer
    #[error("responsible node unavailable")]
    ResponsibleNodeUnavailable,
    /// A routing decision would have forwarded a request to this node's
    /// own id, which always indicates a stale peer-table entry
    #[error("refusing to forward a request to self")]
    SelfForward,
    /// The startup JOIN sequence against a seed failed; fatal to process
    /// startup
    #[error("join failed: {0}")]
    JoinFailed(String),
}

impl RouterError {
    /// Render this error into the wire's `{status: "error", message}` shape
    pub fn into_response(self) -> Response {
        Response::error(self.to_string())
    }
}
