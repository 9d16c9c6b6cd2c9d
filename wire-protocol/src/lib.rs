//! The wire protocol: one JSON object per TCP connection, terminated by a
//! single newline byte, in each direction.
//!
//! There is no other framing. A [`Request`] is decoded from the first line
//! a connection sends; a [`Response`] is the single line sent back before
//! the connection is closed.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::collections::HashMap;

use common::{NodeId, StatsSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Everything that can go wrong turning bytes into a [`Request`] or a
/// [`Response`] into bytes
#[derive(Debug, Error)]
pub enum WireError {
    /// The line was not a well-formed JSON object
    #[error("Invalid JSON")]
    InvalidJson,
    /// The JSON object's `command` field did not name a known request type
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    /// The connection was closed before a full line was read
    #[error("connection closed before a full message was read")]
    ConnectionClosed,
    /// An I/O error occurred while reading or writing
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A decoded request, tagged by its `command` field on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Request {
    /// Write `key = value`
    #[serde(rename = "PUT")]
    Put {
        /// The key to write
        key: String,
        /// The value to associate with `key`
        value: String,
    },
    /// Read the current value of `key`
    #[serde(rename = "GET")]
    Get {
        /// The key to read
        key: String,
    },
    /// Remove `key`
    #[serde(rename = "DELETE")]
    Delete {
        /// The key to remove
        key: String,
    },
    /// Apply a write or delete sent by a replica peer
    #[serde(rename = "REPLICATE")]
    Replicate {
        /// The key to apply
        key: String,
        /// The value to write; absent means delete
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Announce a new node to the cluster
    #[serde(rename = "JOIN")]
    Join {
        /// The joining node's id
        node_id: NodeId,
        /// The joining node's bind host
        host: String,
        /// The joining node's bind port
        port: u16,
    },
    /// A liveness ping from a peer
    #[serde(rename = "HEARTBEAT")]
    Heartbeat {
        /// The sending peer's id
        node_id: NodeId,
    },
    /// Request a full snapshot of the responder's local data
    #[serde(rename = "GET_ALL_DATA")]
    GetAllData {},
    /// Push a batch of key-value pairs for gap-filling anti-entropy
    #[serde(rename = "SYNC_DATA")]
    SyncData {
        /// The key-value pairs being offered
        data: HashMap<String, String>,
    },
    /// Request the responder's counters and uptime
    #[serde(rename = "GET_STATS")]
    GetStats {},
}

impl Request {
    /// The uppercase command name this request is carried under on the wire
    pub fn command_name(&self) -> &'static str {
        match self {
            Request::Put { .. } => "PUT",
            Request::Get { .. } => "GET",
            Request::Delete { .. } => "DELETE",
            Request::Replicate { .. } => "REPLICATE",
            Request::Join { .. } => "JOIN",
            Request::Heartbeat { .. } => "HEARTBEAT",
            Request::GetAllData {} => "GET_ALL_DATA",
            Request::SyncData { .. } => "SYNC_DATA",
            Request::GetStats {} => "GET_STATS",
        }
    }
}

/// A response, always either a success (with command-dependent payload
/// fields) or an error carrying a human-readable message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// `"success"` or `"error"`
    pub status: String,
    /// Present on error responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Present on a successful GET
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Present on a successful JOIN: the full peer set, including self
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<HashMap<NodeId, (String, u16)>>,
    /// Present on a successful GET_ALL_DATA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, String>>,
    /// Present on a successful GET_STATS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
}

impl Response {
    /// A bare `{status: "success"}`, for PUT/DELETE/REPLICATE/HEARTBEAT/SYNC_DATA
    pub fn success() -> Self {
        Self { status: "success".to_string(), ..Default::default() }
    }

    /// A successful GET reply
    pub fn success_value(value: String) -> Self {
        Self { value: Some(value), ..Self::success() }
    }

    /// A successful JOIN reply
    pub fn success_peers(peers: HashMap<NodeId, (String, u16)>) -> Self {
        Self { peers: Some(peers), ..Self::success() }
    }

    /// A successful GET_ALL_DATA reply
    pub fn success_data(data: HashMap<String, String>) -> Self {
        Self { data: Some(data), ..Self::success() }
    }

    /// A successful GET_STATS reply
    pub fn success_stats(stats: StatsSnapshot) -> Self {
        Self { stats: Some(stats), ..Self::success() }
    }

    /// An error reply carrying `message`
    pub fn error(message: impl Into<String>) -> Self {
        Self { status: "error".to_string(), message: Some(message.into()), ..Default::default() }
    }

    /// Whether this is a `{status: "success", ...}` response
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Decode one line of input as a [`Request`]
///
/// Distinguishes a line that is not valid JSON at all from one whose
/// `command` field names something we don't understand: the server
/// deliberately replies with a different message for each.
pub fn decode_request(line: &str) -> Result<Request, WireError> {
    let value: Value = serde_json::from_str(line.trim_end()).map_err(|_| WireError::InvalidJson)?;
    let command = value.get("command").and_then(Value::as_str).ok_or(WireError::InvalidJson)?;

    const KNOWN: &[&str] = &[
        "PUT",
        "GET",
        "DELETE",
        "REPLICATE",
        "JOIN",
        "HEARTBEAT",
        "GET_ALL_DATA",
        "SYNC_DATA",
        "GET_STATS",
    ];
    if !KNOWN.contains(&command) {
        return Err(WireError::UnknownCommand(command.to_string()));
    }

    serde_json::from_value(value).map_err(|_| WireError::InvalidJson)
}

/// Read a single newline-terminated JSON value from `reader`
///
/// Returns [`WireError::ConnectionClosed`] if the stream ends without a
/// line ever being produced.
pub async fn read_line<R>(reader: &mut R) -> Result<String, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(WireError::ConnectionClosed);
    }
    Ok(line)
}

/// Read one line from `reader` and decode it as a [`Request`]
pub async fn read_request<R>(reader: &mut R) -> Result<Request, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?;
    decode_request(&line)
}

/// Read one line from `reader` and decode it as a [`Response`]
pub async fn read_response<R>(reader: &mut R) -> Result<Response, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?;
    serde_json::from_str(line.trim_end()).map_err(|_| WireError::InvalidJson)
}

/// Serialize `value` as one JSON line (with a trailing `\n`) and write it
/// to `writer`, flushing afterward
pub async fn write_message<T, W>(writer: &mut W, value: &T) -> Result<(), WireError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(value).map_err(|_| WireError::InvalidJson)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_put() {
        let req = decode_request(r#"{"command":"PUT","key":"name","value":"Alice"}"#).unwrap();
        assert_eq!(req, Request::Put { key: "name".into(), value: "Alice".into() });
    }

    #[test]
    fn decodes_replicate_delete_token() {
        let req = decode_request(r#"{"command":"REPLICATE","key":"name"}"#).unwrap();
        assert_eq!(req, Request::Replicate { key: "name".into(), value: None });
    }

    #[test]
    fn malformed_json_is_distinguished_from_unknown_command() {
        assert!(matches!(decode_request("not json at all"), Err(WireError::InvalidJson)));
        assert!(matches!(
            decode_request(r#"{"command":"FROBNICATE"}"#),
            Err(WireError::UnknownCommand(cmd)) if cmd == "FROBNICATE"
        ));
    }

    #[test]
    fn missing_command_field_is_invalid_json() {
        assert!(matches!(decode_request(r#"{"key":"name"}"#), Err(WireError::InvalidJson)));
    }

    #[test]
    fn success_value_serializes_with_only_relevant_fields() {
        let resp = Response::success_value("Alice".into());
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"status":"success","value":"Alice"}"#);
    }

    #[test]
    fn error_response_round_trips() {
        let resp = Response::error("key not found");
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, back);
        assert!(!back.is_success());
    }

    #[tokio::test]
    async fn read_request_reads_one_line_and_stops() {
        let input = b"{\"command\":\"GET_STATS\"}\nextra garbage that should not be read\n".to_vec();
        let mut reader = tokio::io::BufReader::new(&input[..]);
        let req = read_request(&mut reader).await.unwrap();
        assert_eq!(req, Request::GetStats {});
    }

    #[tokio::test]
    async fn write_message_appends_newline() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Response::success()).await.unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));
        assert_eq!(buf, b"{\"status\":\"success\"}\n");
    }
}
