//! The canonical identifier of a node in the cluster

use std::fmt::{self, Display};

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};

/// Error parsing a [`NodeId`] from its wire representation
#[derive(Clone, Debug, thiserror::Error)]
pub enum NodeIdError {
    /// The string did not contain a `host:port` pair
    #[error("invalid node id `{0}`, expected `host:port`")]
    Malformed(String),
}

/// A node's identifier, always of the canonical form `host:port`
///
/// Constructing one from `(host, port)` guarantees the id always equals
/// `host + ":" + port`, for this node and for every peer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Build the canonical id for a `(host, port)` pair
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self(format!("{}:{port}", host.as_ref()))
    }

    /// Parse a previously-canonicalized id, e.g. one received over the wire
    pub fn parse(s: impl Into<String>) -> Result<Self, NodeIdError> {
        let s = s.into();
        match s.rsplit_once(':') {
            Some((_host, port)) if port.parse::<u16>().is_ok() => Ok(Self(s)),
            _ => Err(NodeIdError::Malformed(s)),
        }
    }

    /// The node's string form, as used in wire messages and logs
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the id back into its host and port components
    ///
    /// Panics if the id was not constructed via [`NodeId::new`] or
    /// [`NodeId::parse`], which is not reachable from outside this module.
    pub fn host_port(&self) -> (&str, u16) {
        let (host, port) = self.0.rsplit_once(':').expect("NodeId invariant violated");
        (host, port.parse().expect("NodeId invariant violated"))
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NodeId::parse(s).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_matches_host_and_port() {
        let id = NodeId::new("127.0.0.1", 5001);
        assert_eq!(id.as_str(), "127.0.0.1:5001");
        assert_eq!(id.host_port(), ("127.0.0.1", 5001));
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert!(NodeId::parse("127.0.0.1").is_err());
    }

    #[test]
    fn parse_round_trips_through_serde() {
        let id = NodeId::new("10.0.0.2", 9000);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"10.0.0.2:9000\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
