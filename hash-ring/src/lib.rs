//! The consistent-hashing ring that maps a key to its replica set
//!
//! `replicas` is a pure function of `(key, view, replication_factor)`: it
//! holds no state of its own and is the only place in the workspace that
//! decides which nodes own a given key. Every other component -- the
//! router, the anti-entropy syncer, the recovery sequence -- calls back
//! into this crate rather than re-deriving ownership.
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]

use std::collections::BTreeSet;

use common::NodeId;
use md5::{Digest, Md5};

/// Hash a UTF-8 string to a 128-bit integer via MD5
///
/// MD5 is used for its uniform distribution and fixed 128-bit width, not
/// for cryptographic strength -- the only requirement is that every node
/// computes the same value for the same input.
fn ring_hash(s: &str) -> u128 {
    let digest = Md5::digest(s.as_bytes());
    u128::from_be_bytes(digest.into())
}

/// Compute the ordered replica set for `key` given the current membership
/// `view` and replication factor `rf`
///
/// The ring has no virtual nodes: each member of `view` occupies exactly
/// one position, sorted by its hash with a lexicographic tie-break on the
/// node id itself (relevant only in the vanishingly unlikely event of a
/// hash collision between two distinct ids). The walk is a single
/// continuous clockwise pass starting at the first position whose hash is
/// `>= hash(key)`, wrapping back to the start of the ring if needed, and
/// collecting up to `min(rf, view.len())` entries.
///
/// Returns an empty vector if `view` is empty.
pub fn replicas(key: &str, view: &BTreeSet<NodeId>, rf: usize) -> Vec<NodeId> {
    if view.is_empty() {
        return Vec::new();
    }

    let mut ring: Vec<(u128, &NodeId)> = view.iter().map(|id| (ring_hash(id.as_str()), id)).collect();
    ring.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    let key_hash = ring_hash(key);
    let start = ring
        .iter()
        .position(|(hash, _)| *hash >= key_hash)
        .unwrap_or(0);

    let n = ring.len();
    let take = rf.min(n);
    (0..take).map(|offset| ring[(start + offset) % n].1.clone()).collect()
}

/// The first entry of `replicas(key, view, rf)`: the node a non-owner
/// forwards client requests to
pub fn primary(key: &str, view: &BTreeSet<NodeId>, rf: usize) -> Option<NodeId> {
    replicas(key, view, rf).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn view(ids: &[&str]) -> BTreeSet<NodeId> {
        ids.iter().map(|s| NodeId::parse(*s).unwrap()).collect()
    }

    #[test]
    fn deterministic_regardless_of_insertion_order() {
        let v1 = view(&["10.0.0.1:9000", "10.0.0.2:9000", "10.0.0.3:9000"]);
        let v2: BTreeSet<NodeId> = v1.iter().rev().cloned().collect();
        assert_eq!(replicas("name", &v1, 2), replicas("name", &v2, 2));
    }

    #[test]
    fn replica_count_is_capped_by_view_size() {
        let v = view(&["a:1", "b:2"]);
        assert_eq!(replicas("k", &v, 5).len(), 2);
        assert_eq!(replicas("k", &v, 1).len(), 1);
        assert_eq!(replicas("k", &v, 0).len(), 0);
    }

    #[test]
    fn empty_view_yields_no_replicas() {
        let v: BTreeSet<NodeId> = BTreeSet::new();
        assert!(replicas("k", &v, 2).is_empty());
    }

    #[test]
    fn replica_set_has_no_duplicate_nodes() {
        let v = view(&["a:1", "b:2", "c:3", "d:4", "e:5"]);
        for key in ["alpha", "beta", "gamma", "delta"] {
            let r = replicas(key, &v, 3);
            assert_eq!(r.len(), r.iter().unique().count());
        }
    }

    #[test]
    fn every_node_computes_the_same_replica_set() {
        // Simulates three independently-constructed views of the same
        // membership, as three nodes would each hold locally.
        let views: Vec<BTreeSet<NodeId>> = (0..3)
            .map(|_| view(&["127.0.0.1:5001", "127.0.0.1:5002", "127.0.0.1:5003"]))
            .collect();
        let results: Vec<_> = views.iter().map(|v| replicas("product:1", v, 2)).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}
