//! The TCP accept loop: binds the node's listening socket, spawns one task
//! per accepted connection, and dispatches each connection's single request
//! through a shared [`cluster_router::Router`]
//!
//! This is the only component in the workspace that owns a listening
//! socket; everything downstream of `accept()` -- decoding, routing,
//! replication, membership -- is the router's job.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use cluster_router::Router;
use common::{is_cancelled, worker::Worker, CancelChannel};
use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};
use wire_protocol::{read_request, write_message, Response, WireError};

/// How often the accept loop's blocking `accept()` call times out, purely
/// so the shutdown signal is checked promptly rather than once per
/// incoming connection
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that can prevent the server loop from starting
#[derive(Debug, Error)]
pub enum ServerError {
    /// `host:port` did not parse as a socket address
    #[error("invalid bind address `{0}`")]
    InvalidAddress(String),
    /// The listening socket could not be created or bound
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),
}

/// Configuration for [`Server`]
pub struct ServerConfig {
    /// The fully-wired router every accepted connection dispatches through
    pub router: Arc<Router>,
    /// The address to bind the listening socket to
    pub host: String,
    /// The port to bind the listening socket to
    pub port: u16,
}

/// The connection-accepting server loop for one node
pub struct Server {
    router: Arc<Router>,
    host: String,
    port: u16,
}

#[async_trait]
impl Worker for Server {
    type Config = ServerConfig;
    type Error = ServerError;

    fn new(config: Self::Config) -> Result<Self, Self::Error> {
        Ok(Self { router: config.router, host: config.host, port: config.port })
    }

    fn name(&self) -> &'static str {
        "server"
    }

    /// Bind the listening socket and accept connections until `cancel`
    /// fires
    ///
    /// A bind failure is returned immediately as `Err`; the caller treats
    /// this as fatal to process startup. Every other error (a failed
    /// accept, a connection handler's own I/O error) is logged and the
    /// loop continues -- a single bad connection must never take down the
    /// acceptor.
    async fn run(self, mut cancel: CancelChannel) -> Result<(), Self::Error> {
        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", self.host, self.port)))?;

        let socket =
            if addr.is_ipv4() { TcpSocket::new_v4() } else { TcpSocket::new_v6() }
                .map_err(|err| ServerError::Bind(addr, err))?;
        socket.set_reuseaddr(true).map_err(|err| ServerError::Bind(addr, err))?;
        socket.bind(addr).map_err(|err| ServerError::Bind(addr, err))?;
        let listener = socket.listen(1024).map_err(|err| ServerError::Bind(addr, err))?;

        tracing::info!(%addr, "node listening for client and peer connections");

        loop {
            tokio::select! {
                biased;
                _ = cancel.changed() => {
                    if is_cancelled(&cancel) {
                        break;
                    }
                },
                accepted = tokio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()) => {
                    match accepted {
                        Ok(Ok((stream, peer_addr))) => {
                            let router = Arc::clone(&self.router);
                            tokio::spawn(async move {
                                if let Err(err) = handle_connection(stream, router).await {
                                    tracing::debug!(%peer_addr, error = %err, "connection closed without a reply");
                                }
                            });
                        },
                        Ok(Err(err)) => tracing::warn!(error = %err, "accept failed"),
                        Err(_) => {}, // poll interval elapsed with no incoming connection
                    }
                },
            }
        }

        tracing::info!(%addr, "server loop shut down");
        Ok(())
    }
}

/// Handle a single accepted connection: read one line, decode it, dispatch
/// it, write one line back, then let the connection close
///
/// Malformed JSON and unknown commands still get an
/// `{status:"error", message}` reply; only a connection that closes before
/// a full line arrives, or a genuine I/O failure, ends without one.
async fn handle_connection(stream: TcpStream, router: Arc<Router>) -> Result<(), WireError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = tokio::io::BufReader::new(read_half);

    let response = match read_request(&mut reader).await {
        Ok(request) => router.handle(request).await,
        Err(WireError::InvalidJson) => Response::error("Invalid JSON"),
        Err(WireError::UnknownCommand(cmd)) => Response::error(format!("Unknown command: {cmd}")),
        Err(err @ WireError::ConnectionClosed) => return Err(err),
        Err(err @ WireError::Io(_)) => return Err(err),
    };

    write_message(&mut write_half, &response).await
}
