//! The request router: dispatches client and peer commands, applies the
//! local-serve/forward/replicate policy, and drives membership join and
//! anti-entropy recovery
//!
//! A `Router` owns every piece of per-node state that isn't the TCP
//! listener itself: the KV store, the peer table, the stats counters, and
//! an outbound [`PeerClient`]. `node-server` holds an `Arc<Router>` per
//! accepted connection; the four background workers in [`crate::workers`]
//! each hold one too.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use common::{NodeId, Stats};
use kv_store::KvStore;
use peer_client::PeerClient;
use peer_table::PeerTable;
use wire_protocol::{Request, Response};

use crate::error::RouterError;

/// Everything needed to construct a [`Router`]
pub struct RouterConfig {
    /// This node's own id (`host:port`)
    pub self_id: NodeId,
    /// This node's bind host, as advertised to peers
    pub self_host: String,
    /// This node's bind port, as advertised to peers
    pub self_port: u16,
    /// The replication factor applied to every key
    pub replication_factor: usize,
}

/// The number of times an outbound REPLICATE is attempted before the
/// router gives up and leaves convergence to anti-entropy
const REPLICATION_ATTEMPTS: u32 = 3;
/// The per-attempt linear backoff multiplier for outbound REPLICATE
const REPLICATION_BACKOFF_UNIT: Duration = Duration::from_millis(500);

/// The top-level per-node coordinator
pub struct Router {
    pub(crate) self_id: NodeId,
    self_host: String,
    self_port: u16,
    pub(crate) replication_factor: usize,
    pub(crate) kv: Arc<KvStore>,
    pub(crate) peers: Arc<PeerTable>,
    pub(crate) stats: Arc<Stats>,
    pub(crate) client: PeerClient,
}

impl Router {
    /// Construct a fresh router from `config`, with empty KV store, empty
    /// peer table, and zeroed stats
    pub fn new(config: RouterConfig) -> Self {
        Self {
            peers: Arc::new(PeerTable::new(config.self_id.clone())),
            self_id: config.self_id,
            self_host: config.self_host,
            self_port: config.self_port,
            replication_factor: config.replication_factor,
            kv: Arc::new(KvStore::new()),
            stats: Arc::new(Stats::default()),
            client: PeerClient::new(),
        }
    }

    /// This node's own id
    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    /// The current peer table, for components (e.g. `node-server`) that
    /// need the peer count or membership view directly
    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    /// The stats counters
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Dispatch one decoded request and produce its response
    ///
    /// This is the single entry point `node-server` calls per connection.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Put { key, value } => self.handle_put(key, value).await,
            Request::Get { key } => self.handle_get(key).await,
            Request::Delete { key } => self.handle_delete(key).await,
            Request::Replicate { key, value } => self.handle_replicate(key, value),
            Request::Join { node_id, host, port } => self.handle_join(node_id, host, port),
            Request::Heartbeat { node_id } => self.handle_heartbeat(node_id),
            Request::GetAllData {} => self.handle_get_all_data(),
            Request::SyncData { data } => self.handle_sync_data(data),
            Request::GetStats {} => self.handle_get_stats(),
        }
    }

    /// PUT: write-and-replicate if responsible, else forward to the primary
    async fn handle_put(&self, key: String, value: String) -> Response {
        let view = self.peers.view();
        let replicas = hash_ring::replicas(&key, &view, self.replication_factor);

        if replicas.contains(&self.self_id) {
            self.kv.put(key.clone(), value.clone());
            self.stats.record_put();
            self.spawn_replication(&replicas, &key, Some(value));
            Response::success()
        } else {
            self.stats.record_forward();
            match replicas.first() {
                Some(primary) => self.forward(primary, Request::Put { key, value }).await,
                None => RouterError::ResponsibleNodeUnavailable.into_response(),
            }
        }
    }

    /// GET: read locally if responsible, else forward to the primary
    async fn handle_get(&self, key: String) -> Response {
        let view = self.peers.view();
        let replicas = hash_ring::replicas(&key, &view, self.replication_factor);

        if replicas.contains(&self.self_id) {
            self.stats.record_get();
            match self.kv.get(&key) {
                Some(value) => Response::success_value(value),
                None => RouterError::KeyNotFound.into_response(),
            }
        } else {
            self.stats.record_forward();
            match replicas.first() {
                Some(primary) => self.forward(primary, Request::Get { key }).await,
                None => RouterError::ResponsibleNodeUnavailable.into_response(),
            }
        }
    }

    /// DELETE: delete-and-replicate if responsible, else forward to the
    /// primary
    async fn handle_delete(&self, key: String) -> Response {
        let view = self.peers.view();
        let replicas = hash_ring::replicas(&key, &view, self.replication_factor);

        if replicas.contains(&self.self_id) {
            if self.kv.delete(&key) {
                self.stats.record_delete();
                self.spawn_replication(&replicas, &key, None);
                Response::success()
            } else {
                RouterError::KeyNotFound.into_response()
            }
        } else {
            self.stats.record_forward();
            match replicas.first() {
                Some(primary) => self.forward(primary, Request::Delete { key }).await,
                None => RouterError::ResponsibleNodeUnavailable.into_response(),
            }
        }
    }

    /// REPLICATE: apply unconditionally, with no responsibility re-check
    ///
    /// The sender already decided this node is a replica; re-validating
    /// here would deadlock convergence whenever the two nodes' views are
    /// transiently out of sync.
    fn handle_replicate(&self, key: String, value: Option<String>) -> Response {
        match value {
            Some(value) => self.kv.put(key, value),
            None => {
                self.kv.delete(&key);
            },
        }
        self.stats.record_replication();
        Response::success()
    }

    /// JOIN: add the peer (a no-op if it names this node), gossip-forward
    /// to every other known peer, and reply with the full peer set
    fn handle_join(&self, node_id: NodeId, host: String, port: u16) -> Response {
        if node_id != self.self_id {
            let is_new = self.peers.add(node_id.clone(), host.clone(), port);
            if is_new {
                self.gossip_join(node_id, host, port);
            }
        }
        Response::success_peers(self.peers_with_self())
    }

    /// Best-effort forward of a JOIN to every currently-known peer other
    /// than the one that just joined, so membership propagates in O(1)
    /// heartbeat intervals instead of waiting on anti-entropy
    fn gossip_join(&self, node_id: NodeId, host: String, port: u16) {
        for (id, record) in self.peers.snapshot() {
            if id == node_id {
                continue;
            }
            let client = self.client.clone();
            let request = Request::Join { node_id: node_id.clone(), host: host.clone(), port };
            tokio::spawn(async move {
                client.send(&record.host, record.port, &request).await;
            });
        }
    }

    /// HEARTBEAT: refresh the sender's last-seen timestamp
    fn handle_heartbeat(&self, node_id: NodeId) -> Response {
        self.peers.touch(&node_id);
        Response::success()
    }

    /// GET_ALL_DATA: a full snapshot of this node's local KV store
    fn handle_get_all_data(&self) -> Response {
        Response::success_data(self.kv.snapshot())
    }

    /// SYNC_DATA: write every `(k, v)` this node is responsible for,
    /// unconditionally overwriting any existing value
    fn handle_sync_data(&self, data: HashMap<String, String>) -> Response {
        let view = self.peers.view();
        for (key, value) in data {
            if hash_ring::replicas(&key, &view, self.replication_factor).contains(&self.self_id) {
                self.kv.put(key, value);
            }
        }
        Response::success()
    }

    /// GET_STATS: counters, uptime, key count, peer count
    fn handle_get_stats(&self) -> Response {
        Response::success_stats(self.stats.snapshot(self.kv.len(), self.peers.len()))
    }

    /// Forward `request` to `target`, refusing to ever send a request to
    /// this node's own id (a guard against stale peer-table entries)
    async fn forward(&self, target: &NodeId, request: Request) -> Response {
        if target == &self.self_id {
            return RouterError::SelfForward.into_response();
        }
        match self.peers.address(target) {
            Some((host, port)) => self.client.send(&host, port, &request).await,
            None => RouterError::ResponsibleNodeUnavailable.into_response(),
        }
    }

    /// Spawn one best-effort, independently-retried REPLICATE task per
    /// other member of `replicas`
    ///
    /// Fire-and-forget: the caller (a client-facing PUT/DELETE) has
    /// already returned its response by the time these tasks run.
    fn spawn_replication(&self, replicas: &[NodeId], key: &str, value: Option<String>) {
        for target in replicas {
            if target == &self.self_id {
                continue;
            }
            let Some((host, port)) = self.peers.address(target) else { continue };
            let client = self.client.clone();
            let stats = Arc::clone(&self.stats);
            let key = key.to_string();
            let value = value.clone();
            let target = target.clone();
            tokio::spawn(async move {
                replicate_with_retry(&client, &target, &host, port, key, value, &stats).await;
            });
        }
    }

    /// The current peer set, plus this node's own entry, keyed by id
    fn peers_with_self(&self) -> HashMap<NodeId, (String, u16)> {
        let mut map: HashMap<NodeId, (String, u16)> = self
            .peers
            .snapshot()
            .into_iter()
            .map(|(id, record)| (id, (record.host, record.port)))
            .collect();
        map.insert(self.self_id.clone(), (self.self_host.clone(), self.self_port));
        map
    }

    /// Contact `seed_host:seed_port`, merge its peer set into this node's
    /// table, unconditionally record the seed itself, and run the initial
    /// recovery pass
    ///
    /// Called once at startup when a node is given a seed to join through.
    /// A failure here is fatal to process startup (the caller exits 1).
    pub async fn join_cluster(&self, seed_host: &str, seed_port: u16) -> Result<(), RouterError> {
        let request = Request::Join { node_id: self.self_id.clone(), host: self.self_host.clone(), port: self.self_port };
        let response = self.client.send(seed_host, seed_port, &request).await;

        if !response.is_success() {
            let message = response.message.unwrap_or_else(|| "join failed".to_string());
            return Err(RouterError::JoinFailed(message));
        }
        let Some(peers) = response.peers else {
            return Err(RouterError::JoinFailed("seed reply carried no peer set".to_string()));
        };

        for (id, (host, port)) in peers {
            self.peers.add(id, host, port);
        }
        let seed_id = NodeId::new(seed_host, seed_port);
        self.peers.add(seed_id, seed_host.to_string(), seed_port);

        self.run_recovery().await;
        Ok(())
    }

    /// Initial recovery: contact peers in turn until one successfully
    /// answers GET_ALL_DATA, unconditionally writing every key this node is
    /// now responsible for
    ///
    /// Run once, immediately after a successful join.
    pub async fn run_recovery(&self) {
        self.sync_pass(true).await;
    }

    /// One periodic anti-entropy pass: contact peers in turn until one
    /// successfully answers GET_ALL_DATA, filling in only keys this node
    /// does not already hold locally
    ///
    /// Existing local values are never overwritten by this pass (that
    /// would risk resurrecting a tombstone); it is a gap-filler, not a
    /// reconciler.
    pub(crate) async fn anti_entropy_pass(&self) {
        self.sync_pass(false).await;
    }

    /// Shared body of initial recovery and periodic anti-entropy: contact
    /// peers in turn, stopping at the first one that answers successfully
    async fn sync_pass(&self, overwrite: bool) -> bool {
        for (id, record) in self.peers.snapshot() {
            let response = self.client.send(&record.host, record.port, &Request::GetAllData {}).await;
            if !response.is_success() {
                tracing::debug!(peer = %id, "anti-entropy peer did not answer, trying next");
                continue;
            }
            if let Some(data) = response.data {
                self.apply_sync_data(data, overwrite);
            }
            return true;
        }
        false
    }

    /// Apply a peer's data snapshot, writing only keys this node is
    /// currently responsible for under the hash ring
    fn apply_sync_data(&self, data: HashMap<String, String>, overwrite: bool) {
        let view = self.peers.view();
        for (key, value) in data {
            if !hash_ring::replicas(&key, &view, self.replication_factor).contains(&self.self_id) {
                continue;
            }
            if overwrite {
                self.kv.put(key, value);
            } else {
                self.kv.put_if_absent(key, value);
            }
        }
    }
}

/// Deliver one REPLICATE, retrying up to [`REPLICATION_ATTEMPTS`] times
/// with linear backoff, giving up (and logging) after the last attempt
///
/// The client the replication is fanned out for has already received its
/// response; nothing here can surface back to it.
#[allow(clippy::too_many_arguments)]
async fn replicate_with_retry(
    client: &PeerClient,
    target: &NodeId,
    host: &str,
    port: u16,
    key: String,
    value: Option<String>,
    stats: &Stats,
) {
    let request = Request::Replicate { key: key.clone(), value: value.clone() };

    for attempt in 1..=REPLICATION_ATTEMPTS {
        let response = client.send(host, port, &request).await;
        if response.is_success() {
            stats.record_replication();
            return;
        }

        if attempt < REPLICATION_ATTEMPTS {
            tokio::time::sleep(REPLICATION_BACKOFF_UNIT * attempt).await;
        } else {
            tracing::warn!(peer = %target, %key, attempts = attempt, "giving up on replication after final retry");
        }
    }
}
