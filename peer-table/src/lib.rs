//! The peer table: current cluster membership plus per-peer heartbeat
//! bookkeeping, guarded by a single mutex
//!
//! The table never holds an entry for the local node: `add` is a
//! deliberate no-op when asked to insert the table's own id, so that JOIN
//! of self, which the router must accept without error, is trivially safe
//! to implement as "always call `add`".
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::{
    collections::{BTreeSet, HashMap},
    sync::Mutex,
    time::{Duration, Instant},
};

use common::NodeId;

/// A single peer's address and liveness bookkeeping
#[derive(Clone, Debug)]
pub struct PeerRecord {
    /// The peer's bind host
    pub host: String,
    /// The peer's bind port
    pub port: u16,
    /// The last time a heartbeat (or JOIN) was received from this peer,
    /// read from the monotonic clock rather than wall-clock time
    last_seen: Instant,
}

impl PeerRecord {
    /// Seconds elapsed since the last heartbeat from this peer
    pub fn age(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// The current cluster membership as seen by this node
pub struct PeerTable {
    /// This node's own id, excluded from every operation below
    self_id: NodeId,
    /// Known peers, keyed by id
    peers: Mutex<HashMap<NodeId, PeerRecord>>,
}

impl PeerTable {
    /// Construct an empty table for the given local node id
    pub fn new(self_id: NodeId) -> Self {
        Self { self_id, peers: Mutex::new(HashMap::new()) }
    }

    /// This node's own id
    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    /// Add or refresh a peer's address
    ///
    /// A no-op if `id` is this node's own id. Returns whether the peer is
    /// new to the table (an existing peer has its address overwritten but
    /// does not count as newly added).
    pub fn add(&self, id: NodeId, host: String, port: u16) -> bool {
        if id == self.self_id {
            return false;
        }

        let mut peers = self.peers.lock().expect("peer table lock poisoned");
        let is_new = !peers.contains_key(&id);
        peers.insert(id, PeerRecord { host, port, last_seen: Instant::now() });
        is_new
    }

    /// Remove a peer, returning its last known record if it was present
    pub fn remove(&self, id: &NodeId) -> Option<PeerRecord> {
        self.peers.lock().expect("peer table lock poisoned").remove(id)
    }

    /// Update a known peer's last-seen timestamp to now
    ///
    /// Returns `false` if the peer is not currently known (the caller may
    /// choose to treat an unknown peer's heartbeat as a reason to `add` it,
    /// which the router does for peers it learns about via gossip).
    pub fn touch(&self, id: &NodeId) -> bool {
        let mut peers = self.peers.lock().expect("peer table lock poisoned");
        match peers.get_mut(id) {
            Some(record) => {
                record.last_seen = Instant::now();
                true
            },
            None => false,
        }
    }

    /// Remove and return every peer whose last heartbeat is older than
    /// `timeout`
    pub fn expire(&self, timeout: Duration) -> Vec<NodeId> {
        let mut peers = self.peers.lock().expect("peer table lock poisoned");
        let expired: Vec<NodeId> = peers
            .iter()
            .filter(|(_, record)| record.age() > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            peers.remove(id);
        }
        expired
    }

    /// Whether `id` is currently a known peer
    pub fn contains(&self, id: &NodeId) -> bool {
        self.peers.lock().expect("peer table lock poisoned").contains_key(id)
    }

    /// The address of a known peer, if any
    pub fn address(&self, id: &NodeId) -> Option<(String, u16)> {
        self.peers
            .lock()
            .expect("peer table lock poisoned")
            .get(id)
            .map(|r| (r.host.clone(), r.port))
    }

    /// A copy of the current membership, for ring computation or gossip
    ///
    /// The lock is released before the caller does any I/O: no blocking
    /// network call ever runs while this mutex is held.
    pub fn snapshot(&self) -> HashMap<NodeId, PeerRecord> {
        self.peers.lock().expect("peer table lock poisoned").clone()
    }

    /// The current view: `{self} ∪ peers`, as consumed by the hash ring
    pub fn view(&self) -> BTreeSet<NodeId> {
        let mut view: BTreeSet<NodeId> =
            self.peers.lock().expect("peer table lock poisoned").keys().cloned().collect();
        view.insert(self.self_id.clone());
        view
    }

    /// The number of known peers (excluding self)
    pub fn len(&self) -> usize {
        self.peers.lock().expect("peer table lock poisoned").len()
    }

    /// Whether the table has no known peers
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for PeerRecord {
    fn clone(&self) -> Self {
        Self { host: self.host.clone(), port: self.port, last_seen: self.last_seen }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PeerTable {
        PeerTable::new(NodeId::new("127.0.0.1", 5001))
    }

    #[test]
    fn self_add_is_a_no_op() {
        let t = table();
        let added = t.add(NodeId::new("127.0.0.1", 5001), "127.0.0.1".into(), 5001);
        assert!(!added);
        assert!(t.is_empty());
        assert!(!t.view().is_empty()); // view still contains self
        assert_eq!(t.view().len(), 1);
    }

    #[test]
    fn add_remove_round_trips() {
        let t = table();
        let peer = NodeId::new("127.0.0.1", 5002);
        assert!(t.add(peer.clone(), "127.0.0.1".into(), 5002));
        assert!(t.contains(&peer));
        assert_eq!(t.len(), 1);

        let removed = t.remove(&peer);
        assert!(removed.is_some());
        assert!(!t.contains(&peer));
    }

    #[test]
    fn view_includes_self_and_peers() {
        let t = table();
        t.add(NodeId::new("127.0.0.1", 5002), "127.0.0.1".into(), 5002);
        t.add(NodeId::new("127.0.0.1", 5003), "127.0.0.1".into(), 5003);

        let view = t.view();
        assert_eq!(view.len(), 3);
        assert!(view.contains(&NodeId::new("127.0.0.1", 5001)));
    }

    #[test]
    fn expire_removes_only_stale_peers() {
        let t = table();
        let stale = NodeId::new("127.0.0.1", 5002);
        let fresh = NodeId::new("127.0.0.1", 5003);
        t.add(stale.clone(), "127.0.0.1".into(), 5002);
        std::thread::sleep(Duration::from_millis(20));
        t.add(fresh.clone(), "127.0.0.1".into(), 5003);

        let expired = t.expire(Duration::from_millis(10));
        assert_eq!(expired, vec![stale.clone()]);
        assert!(!t.contains(&stale));
        assert!(t.contains(&fresh));
    }

    #[test]
    fn touch_refreshes_liveness() {
        let t = table();
        let peer = NodeId::new("127.0.0.1", 5002);
        t.add(peer.clone(), "127.0.0.1".into(), 5002);

        std::thread::sleep(Duration::from_millis(20));
        assert!(t.touch(&peer));
        // Touching reset the clock, so a 10ms timeout should not expire it.
        assert!(t.expire(Duration::from_millis(10)).is_empty());
    }

    #[test]
    fn touch_on_unknown_peer_returns_false() {
        let t = table();
        assert!(!t.touch(&NodeId::new("127.0.0.1", 5999)));
    }
}
