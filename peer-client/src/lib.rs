//! A client for making outbound RPCs to other cluster nodes
//!
//! Every call opens a fresh TCP connection, writes one request line, reads
//! one response line, and closes the connection. There is no connection
//! pooling or keep-alive: the protocol is one-shot by design (see
//! `wire-protocol`), and a node's peer set is small enough that per-call
//! connection setup is not a meaningful cost.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::time::Duration;

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
};
use wire_protocol::{read_response, write_message, Request, Response};

/// The total budget for connect + send + receive on a single call
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A thin, stateless handle for talking to peers
///
/// Cloning is cheap; there is no shared mutable state, so a single
/// `PeerClient` can be shared across every router and background worker in
/// a process.
#[derive(Clone, Debug)]
pub struct PeerClient {
    /// The total time budget for a single RPC, including connection setup
    timeout: Duration,
}

impl Default for PeerClient {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }
}

impl PeerClient {
    /// Construct a client with the default 5-second timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a client with a custom per-call timeout, for tests
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Send `request` to `host:port` and return its response
    ///
    /// Never panics and never propagates an I/O or protocol error to the
    /// caller: connection failures, timeouts, and malformed replies all
    /// collapse into an `{status: "error", message}` [`Response`], which is
    /// exactly the shape a peer's own handler would have produced for a
    /// request it couldn't satisfy. Callers that need to distinguish "peer
    /// said no" from "couldn't reach peer" should inspect `message`.
    pub async fn send(&self, host: &str, port: u16, request: &Request) -> Response {
        match tokio::time::timeout(self.timeout, self.call(host, port, request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::debug!(%host, port, command = request.command_name(), error = %err, "peer RPC failed");
                Response::error(err.to_string())
            },
            Err(_) => {
                tracing::debug!(%host, port, command = request.command_name(), "peer RPC timed out");
                Response::error("timed out waiting for peer")
            },
        }
    }

    /// The actual connect/write/read sequence, without the timeout wrapper
    async fn call(
        &self,
        host: &str,
        port: u16,
        request: &Request,
    ) -> Result<Response, wire_protocol::WireError> {
        let mut stream = TcpStream::connect((host, port)).await?;
        write_message(&mut stream, request).await?;
        stream.shutdown().await.ok(); // half-close our write side; peer replies, then we read to EOF
        let mut reader = BufReader::new(stream);
        read_response(&mut reader).await
    }
}
