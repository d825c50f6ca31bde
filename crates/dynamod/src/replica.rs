//! Replica coordinator: quorum Put/Get, crash gating and anti-entropy

use crate::availability::CrashGate;
use crate::gossiper::Gossiper;
use crate::storage::Storage;
use dynamo_core::frontier::Insertion;
use dynamo_core::{DynamoNode, DynamoResult, PutArgs, Result};
use dynamo_net::PeerClient;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Static identity and quorum sizes of one replica
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Replica id stamped into vector clocks
    pub node_id: String,
    /// This node's address in preference lists
    pub self_node: DynamoNode,
    /// W: replicas (including this one) a Put writes to directly
    pub write_quorum: usize,
    /// R: replicas (including this one) a Get reads from
    pub read_quorum: usize,
}

/// Installed preference list and its per-peer outboxes
#[derive(Default)]
struct Placement {
    preference_list: Vec<DynamoNode>,
    self_index: Option<usize>,
    gossipers: HashMap<DynamoNode, Arc<Gossiper>>,
}

impl Placement {
    fn new(preference_list: Vec<DynamoNode>, self_node: &DynamoNode) -> Self {
        let self_index = preference_list.iter().position(|n| n == self_node);
        let mut placement = Self {
            preference_list,
            self_index,
            gossipers: HashMap::new(),
        };
        let peers: Vec<DynamoNode> = placement.peers().cloned().collect();
        for peer in peers {
            placement
                .gossipers
                .entry(peer)
                .or_insert_with(|| Arc::new(Gossiper::new()));
        }
        placement
    }

    /// Non-self slots in preference order. A node missing from its own list
    /// has no peers.
    fn peers(&self) -> impl Iterator<Item = &DynamoNode> + '_ {
        let self_index = self.self_index;
        self.preference_list
            .iter()
            .enumerate()
            .filter(move |(i, _)| self_index.is_some() && Some(*i) != self_index)
            .map(|(_, node)| node)
    }

    /// Peers paired with their outboxes, detached from the lock
    fn routes(&self) -> Vec<(DynamoNode, Arc<Gossiper>)> {
        self.peers()
            .filter_map(|peer| {
                self.gossipers
                    .get(peer)
                    .map(|gossiper| (peer.clone(), gossiper.clone()))
            })
            .collect()
    }
}

/// Outcome of one anti-entropy pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GossipReport {
    /// Entries confirmed delivered
    pub delivered: usize,
    /// Entries still queued afterwards
    pub pending: usize,
}

/// Replica statistics
#[derive(Debug, Clone)]
pub struct ReplicaStats {
    pub key_count: usize,
    pub entry_count: usize,
    /// Time left in the crash window, if crashed
    pub crash_remaining: Option<Duration>,
    /// Pending outbox entries per peer, in preference order
    pub pending: Vec<(DynamoNode, usize)>,
}

/// One Dynamo node's coordinator
pub struct Replica {
    config: ReplicaConfig,
    store: Storage,
    gate: CrashGate,
    placement: RwLock<Placement>,
    peers: Arc<dyn PeerClient>,
}

impl Replica {
    /// Create a replica with an empty store and no preference list
    pub fn new(config: ReplicaConfig, peers: Arc<dyn PeerClient>) -> Self {
        let gate = CrashGate::new(config.node_id.clone());
        Self {
            config,
            store: Storage::new(),
            gate,
            placement: RwLock::new(Placement::default()),
            peers,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn self_node(&self) -> &DynamoNode {
        &self.config.self_node
    }

    /// Position of this node in its preference list
    pub fn self_index(&self) -> Option<usize> {
        self.placement.read().self_index
    }

    pub fn preference_list(&self) -> Vec<DynamoNode> {
        self.placement.read().preference_list.clone()
    }

    /// Outbox for `peer`, if it is in the installed preference list
    pub fn gossiper(&self, peer: &DynamoNode) -> Option<Arc<Gossiper>> {
        self.placement.read().gossipers.get(peer).cloned()
    }

    /// Install the preference list, replacing outboxes and connections
    pub async fn send_preference_list(&self, list: Vec<DynamoNode>) {
        let placement = Placement::new(list, &self.config.self_node);
        let peers: Vec<DynamoNode> = placement.peers().cloned().collect();
        if placement.self_index.is_none() {
            warn!(
                "Node {} is not in its preference list; running without peers",
                self.config.self_node
            );
        }
        info!(
            "Installed preference list of {} nodes (self index {:?})",
            placement.preference_list.len(),
            placement.self_index
        );
        *self.placement.write() = placement;

        self.peers.connect_peers(&peers).await;
    }

    /// Coordinated write.
    ///
    /// Stamps the context at this replica, writes locally, then replicates
    /// directly to peers until W copies exist. Unreachable peers, and every
    /// peer after the quorum is met, get the entry queued for gossip.
    pub async fn put(&self, mut args: PutArgs) -> Result<()> {
        self.gate.check()?;

        args.context.clock.increment(&self.config.node_id);
        self.put_once(&args)?;

        let entry = args.to_entry();
        let routes = self.placement.read().routes();
        let mut written = 1;
        for (peer, gossiper) in routes {
            if written >= self.config.write_quorum {
                gossiper.append(&args.key, entry.clone());
                continue;
            }
            match self.peers.put_once(&peer, &args).await {
                Ok(accepted) => {
                    if !accepted {
                        debug!("Peer {} already holds {} at {}", peer, args.key, args.context.clock);
                    }
                    written += 1;
                }
                Err(e) => {
                    warn!("Peer {} unreachable, queueing {} for gossip: {}", peer, args.key, e);
                    gossiper.append(&args.key, entry.clone());
                }
            }
        }

        debug!(
            "Put {} at {} reached {}/{} replicas",
            args.key, args.context.clock, written, self.config.write_quorum
        );
        Ok(())
    }

    /// Quorum read: local versions merged with up to R-1 peers', reduced to
    /// the causal frontier. Unreachable peers are skipped.
    pub async fn get(&self, key: &str) -> Result<DynamoResult> {
        let mut result = self.get_once(key)?;

        let routes = self.placement.read().routes();
        let mut read = 1;
        for (peer, _) in routes {
            if read >= self.config.read_quorum {
                break;
            }
            match self.peers.get_once(&peer, key).await {
                Ok(remote) => {
                    result.merge(remote);
                    read += 1;
                }
                Err(e) => debug!("Skipping {} for read of {}: {}", peer, key, e),
            }
        }

        result.remove_ancestors();
        Ok(result)
    }

    /// Local write primitive, also invoked by peers during replication
    pub fn put_once(&self, args: &PutArgs) -> Result<Insertion> {
        self.gate.check()?;
        self.store.put(&args.key, args.to_entry())
    }

    /// Local read primitive
    pub fn get_once(&self, key: &str) -> Result<DynamoResult> {
        self.gate.check()?;
        Ok(DynamoResult::new(self.store.get(key)))
    }

    /// Become unavailable for `seconds`
    pub fn crash(&self, seconds: u64) -> Result<()> {
        self.gate.crash(Duration::from_secs(seconds))?;
        info!("Node {} crashed for {}s", self.config.node_id, seconds);
        Ok(())
    }

    pub fn is_crashed(&self) -> bool {
        self.gate.is_crashed()
    }

    /// Anti-entropy pass.
    ///
    /// For every stored key and every peer with entries queued for it, sends
    /// the queue in order and stops that key's queue at the first failure.
    pub async fn gossip(&self) -> Result<GossipReport> {
        self.gate.check()?;

        let routes = self.placement.read().routes();
        let mut report = GossipReport::default();

        for key in self.store.keys() {
            for (peer, gossiper) in &routes {
                while let Some(entry) = gossiper.front(&key) {
                    let args = PutArgs::new(key.clone(), entry.context.clone(), entry.value.clone());
                    match self.peers.put_once(peer, &args).await {
                        Ok(_) => {
                            gossiper.consume_entry(&key, &entry);
                            report.delivered += 1;
                        }
                        Err(e) => {
                            debug!("Gossip of {} to {} stopped: {}", key, peer, e);
                            break;
                        }
                    }
                }
            }
        }

        report.pending = routes.iter().map(|(_, g)| g.pending_count()).sum();
        if report.delivered > 0 {
            info!(
                "Gossip delivered {} entries, {} still pending",
                report.delivered, report.pending
            );
        }
        Ok(report)
    }

    /// Get replica statistics
    pub fn stats(&self) -> ReplicaStats {
        let routes = self.placement.read().routes();
        ReplicaStats {
            key_count: self.store.key_count(),
            entry_count: self.store.entry_count(),
            crash_remaining: self.gate.remaining(),
            pending: routes
                .into_iter()
                .map(|(peer, gossiper)| (peer, gossiper.pending_count()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dynamo_core::{Context, Error, ObjectEntry, VectorClock};
    use dynamo_net::{Fault, TransportError};
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// Routes peer calls straight to in-process replicas
    #[derive(Default)]
    struct InProcessPeers {
        replicas: RwLock<HashMap<DynamoNode, Arc<Replica>>>,
        partitioned: RwLock<HashSet<DynamoNode>>,
        /// Calls a node will still answer before it becomes unreachable
        call_budget: Mutex<HashMap<DynamoNode, usize>>,
        connects: Mutex<Vec<Vec<DynamoNode>>>,
    }

    impl InProcessPeers {
        fn partition(&self, node: &DynamoNode) {
            self.partitioned.write().insert(node.clone());
        }

        fn heal(&self, node: &DynamoNode) {
            self.partitioned.write().remove(node);
        }

        fn limit_calls(&self, node: &DynamoNode, calls: usize) {
            self.call_budget.lock().insert(node.clone(), calls);
        }

        fn reach(&self, node: &DynamoNode) -> std::result::Result<Arc<Replica>, TransportError> {
            if self.partitioned.read().contains(node) {
                return Err(TransportError::ConnectionClosed);
            }
            if let Some(budget) = self.call_budget.lock().get_mut(node) {
                if *budget == 0 {
                    return Err(TransportError::ConnectionClosed);
                }
                *budget -= 1;
            }
            self.replicas
                .read()
                .get(node)
                .cloned()
                .ok_or(TransportError::ConnectionClosed)
        }
    }

    #[async_trait]
    impl PeerClient for InProcessPeers {
        async fn connect_peers(&self, peers: &[DynamoNode]) {
            self.connects.lock().push(peers.to_vec());
        }

        async fn put_once(
            &self,
            peer: &DynamoNode,
            args: &PutArgs,
        ) -> std::result::Result<bool, TransportError> {
            match self.reach(peer)?.put_once(args) {
                Ok(_) => Ok(true),
                Err(e) if e.is_rejection() => Ok(false),
                Err(e) => Err(TransportError::Remote(Fault::from(&e))),
            }
        }

        async fn get_once(
            &self,
            peer: &DynamoNode,
            key: &str,
        ) -> std::result::Result<DynamoResult, TransportError> {
            self.reach(peer)?
                .get_once(key)
                .map_err(|e| TransportError::Remote(Fault::from(&e)))
        }
    }

    struct Cluster {
        nodes: Vec<DynamoNode>,
        replicas: Vec<Arc<Replica>>,
        net: Arc<InProcessPeers>,
    }

    impl Cluster {
        async fn new(size: usize, w: usize, r: usize) -> Self {
            let net = Arc::new(InProcessPeers::default());
            let nodes: Vec<DynamoNode> = (0..size)
                .map(|i| DynamoNode::new("localhost", 8080 + i as u16))
                .collect();
            let mut replicas = Vec::new();
            for (i, node) in nodes.iter().enumerate() {
                let replica = Arc::new(Replica::new(
                    ReplicaConfig {
                        node_id: i.to_string(),
                        self_node: node.clone(),
                        write_quorum: w,
                        read_quorum: r,
                    },
                    net.clone(),
                ));
                net.replicas.write().insert(node.clone(), replica.clone());
                replicas.push(replica);
            }
            for (i, replica) in replicas.iter().enumerate() {
                replica
                    .send_preference_list(dynamo_core::rotate_preference_list(&nodes, i))
                    .await;
            }
            Self { nodes, replicas, net }
        }
    }

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        VectorClock::from_entries(entries.iter().map(|(id, c)| (*id, *c)))
    }

    fn put_args(key: &str, clock_entries: &[(&str, u64)], value: &str) -> PutArgs {
        PutArgs::new(key, Context::new(clock(clock_entries)), value.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_preference_list_install() {
        let cluster = Cluster::new(3, 1, 1).await;
        let replica = &cluster.replicas[1];

        assert_eq!(replica.self_index(), Some(0));
        assert!(replica.gossiper(&cluster.nodes[0]).is_some());
        assert!(replica.gossiper(&cluster.nodes[2]).is_some());
        assert!(replica.gossiper(&cluster.nodes[1]).is_none());

        let connects = cluster.net.connects.lock().clone();
        assert_eq!(connects.len(), 3);
        assert_eq!(connects[1], vec![cluster.nodes[2].clone(), cluster.nodes[0].clone()]);
    }

    #[tokio::test]
    async fn test_put_stamps_coordinator_clock() {
        let cluster = Cluster::new(3, 1, 1).await;
        let node0 = &cluster.replicas[0];

        node0.put(PutArgs::fresh("s1", b"abcde".to_vec())).await.unwrap();

        let result = node0.get("s1").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].value, b"abcde");
        assert_eq!(result.entries[0].context.clock, clock(&[("0", 1)]));
    }

    #[tokio::test]
    async fn test_put_replicates_until_quorum_then_queues() {
        let cluster = Cluster::new(3, 2, 1).await;
        let node0 = &cluster.replicas[0];

        node0.put(PutArgs::fresh("s1", b"v".to_vec())).await.unwrap();

        // W=2: node1 written directly, node2 only queued
        assert_eq!(cluster.replicas[1].get_once("s1").unwrap().len(), 1);
        assert!(cluster.replicas[2].get_once("s1").unwrap().is_empty());
        assert!(node0.gossiper(&cluster.nodes[1]).unwrap().is_empty());
        assert_eq!(node0.gossiper(&cluster.nodes[2]).unwrap().pending("s1").len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_queued_and_next_peer_tried() {
        let cluster = Cluster::new(3, 2, 1).await;
        cluster.net.partition(&cluster.nodes[1]);
        let node0 = &cluster.replicas[0];

        node0.put(PutArgs::fresh("s1", b"v".to_vec())).await.unwrap();

        assert_eq!(node0.gossiper(&cluster.nodes[1]).unwrap().pending("s1").len(), 1);
        assert_eq!(cluster.replicas[2].get_once("s1").unwrap().len(), 1);
        assert!(node0.gossiper(&cluster.nodes[2]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_crashed_peer_counts_as_unreachable() {
        let cluster = Cluster::new(2, 2, 1).await;
        cluster.replicas[1].crash(60).unwrap();

        cluster.replicas[0]
            .put(PutArgs::fresh("s1", b"v".to_vec()))
            .await
            .unwrap();

        let pending = cluster.replicas[0]
            .gossiper(&cluster.nodes[1])
            .unwrap()
            .pending("s1");
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_local_write_sends_nothing() {
        let cluster = Cluster::new(3, 3, 1).await;
        let node0 = &cluster.replicas[0];
        node0.put_once(&put_args("s1", &[("0", 2)], "newer")).unwrap();

        let result = node0.put(put_args("s1", &[], "stale")).await;

        assert!(matches!(result, Err(Error::StaleWrite { .. })));
        assert!(cluster.replicas[1].get_once("s1").unwrap().is_empty());
        assert_eq!(node0.stats().pending.iter().map(|(_, n)| n).sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn test_fresh_context_rewrite_is_duplicate() {
        let cluster = Cluster::new(1, 1, 1).await;
        let node0 = &cluster.replicas[0];

        node0.put(PutArgs::fresh("s1", b"a".to_vec())).await.unwrap();
        let again = node0.put(PutArgs::fresh("s1", b"b".to_vec())).await;
        assert!(matches!(again, Err(Error::DuplicateWrite { .. })));

        // Writing from the read context moves the version forward
        let read = node0.get("s1").await.unwrap();
        let context = read.entries[0].context.clone();
        node0.put(PutArgs::new("s1", context, b"b".to_vec())).await.unwrap();

        let result = node0.get("s1").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].value, b"b");
        assert!(result.entries[0].context.clock.version_is("0", 2));
    }

    #[tokio::test]
    async fn test_get_returns_concurrent_siblings() {
        let cluster = Cluster::new(3, 1, 2).await;
        cluster.replicas[0]
            .put_once(&put_args("s1", &[("a", 1)], "x"))
            .unwrap();
        cluster.replicas[1]
            .put_once(&put_args("s1", &[("b", 1)], "y"))
            .unwrap();

        let result = cluster.replicas[0].get("s1").await.unwrap();
        let mut values: Vec<_> = result.entries.iter().map(|e| e.value.clone()).collect();
        values.sort();
        assert_eq!(values, vec![b"x".to_vec(), b"y".to_vec()]);
    }

    #[tokio::test]
    async fn test_get_drops_dominated_ancestor() {
        let cluster = Cluster::new(3, 1, 2).await;
        cluster.replicas[0]
            .put_once(&put_args("s1", &[("a", 1)], "old"))
            .unwrap();
        cluster.replicas[1]
            .put_once(&put_args("s1", &[("a", 2)], "new"))
            .unwrap();

        let result = cluster.replicas[0].get("s1").await.unwrap();
        assert_eq!(
            result.entries,
            vec![ObjectEntry::new(Context::new(clock(&[("a", 2)])), b"new".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_get_skips_unreachable_peers() {
        let cluster = Cluster::new(3, 1, 2).await;
        cluster.net.partition(&cluster.nodes[1]);
        cluster.replicas[2]
            .put_once(&put_args("s1", &[("a", 1)], "far"))
            .unwrap();

        let result = cluster.replicas[0].get("s1").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].value, b"far");
    }

    #[tokio::test]
    async fn test_get_merges_identical_copies() {
        let cluster = Cluster::new(3, 3, 3).await;
        cluster.replicas[0]
            .put(PutArgs::fresh("s1", b"v".to_vec()))
            .await
            .unwrap();

        let result = cluster.replicas[0].get("s1").await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crash_gates_every_operation() {
        let cluster = Cluster::new(3, 1, 1).await;
        let node0 = &cluster.replicas[0];
        node0.crash(3).unwrap();
        assert_eq!(node0.stats().crash_remaining, Some(Duration::from_secs(3)));

        assert!(matches!(
            node0.put(PutArgs::fresh("s1", b"abcde".to_vec())).await,
            Err(Error::Unavailable(_))
        ));
        assert!(matches!(node0.get("s1").await, Err(Error::Unavailable(_))));
        assert!(matches!(node0.gossip().await, Err(Error::Unavailable(_))));
        assert!(matches!(node0.get_once("s1"), Err(Error::Unavailable(_))));
        assert!(matches!(node0.crash(3), Err(Error::AlreadyCrashed(_))));
        // Nothing leaked out while crashed
        assert!(node0.stats().pending.iter().all(|(_, n)| *n == 0));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(node0.stats().crash_remaining, None);

        node0.put(PutArgs::fresh("s1", b"abcde".to_vec())).await.unwrap();
        let result = node0.get("s1").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].value, b"abcde");
        assert!(result.entries[0].context.clock.version_is("0", 1));
    }

    #[tokio::test]
    async fn test_gossip_converges_unreachable_peer() {
        let cluster = Cluster::new(3, 1, 1).await;
        let node0 = &cluster.replicas[0];
        let node1 = &cluster.nodes[1];
        cluster.net.partition(node1);

        node0.put(PutArgs::fresh("s1", b"abcde".to_vec())).await.unwrap();

        // Still unreachable: gossip keeps the entry
        let report = node0.gossip().await.unwrap();
        assert_eq!(report.delivered, 1); // node2 was reachable
        assert_eq!(node0.gossiper(node1).unwrap().pending("s1").len(), 1);

        cluster.net.heal(node1);
        let report = node0.gossip().await.unwrap();
        assert_eq!(report, GossipReport { delivered: 1, pending: 0 });

        let result = cluster.replicas[1].get_once("s1").unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].context.clock, clock(&[("0", 1)]));
        assert!(node0.gossiper(node1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gossip_stops_at_first_failure_per_key() {
        let cluster = Cluster::new(2, 1, 1).await;
        let node0 = &cluster.replicas[0];
        let node1 = &cluster.nodes[1];

        // Two concurrent versions queued in order for node1
        node0.put(put_args("s1", &[("x", 1)], "first")).await.unwrap();
        node0.put(put_args("s1", &[("y", 1)], "second")).await.unwrap();
        let outbox = node0.gossiper(node1).unwrap();
        assert_eq!(outbox.pending("s1").len(), 2);

        cluster.net.limit_calls(node1, 1);
        let report = node0.gossip().await.unwrap();
        assert_eq!(report, GossipReport { delivered: 1, pending: 1 });

        let remaining = outbox.pending("s1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].value, b"second");
        let delivered = cluster.replicas[1].get_once("s1").unwrap();
        assert_eq!(delivered.entries[0].value, b"first");

        cluster.net.limit_calls(node1, usize::MAX);
        node0.gossip().await.unwrap();
        assert!(outbox.is_empty());
        assert_eq!(cluster.replicas[1].get_once("s1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gossip_is_idempotent() {
        let cluster = Cluster::new(3, 1, 1).await;
        let node0 = &cluster.replicas[0];
        node0.put(PutArgs::fresh("s1", b"v".to_vec())).await.unwrap();

        assert_eq!(node0.gossip().await.unwrap().delivered, 2);
        assert_eq!(node0.gossip().await.unwrap(), GossipReport::default());
        for replica in &cluster.replicas {
            assert_eq!(replica.get_once("s1").unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_node_missing_from_list_has_no_peers() {
        let cluster = Cluster::new(3, 3, 3).await;
        let node0 = &cluster.replicas[0];
        node0
            .send_preference_list(cluster.nodes[1..].to_vec())
            .await;

        assert_eq!(node0.self_index(), None);
        node0.put(PutArgs::fresh("s1", b"v".to_vec())).await.unwrap();
        assert!(cluster.replicas[1].get_once("s1").unwrap().is_empty());
        assert!(node0.stats().pending.is_empty());
    }

    #[tokio::test]
    async fn test_reinstall_discards_outboxes() {
        let cluster = Cluster::new(3, 1, 1).await;
        let node0 = &cluster.replicas[0];
        node0.put(PutArgs::fresh("s1", b"v".to_vec())).await.unwrap();
        assert!(!node0.gossiper(&cluster.nodes[1]).unwrap().is_empty());

        node0.send_preference_list(cluster.nodes.clone()).await;
        assert!(node0.gossiper(&cluster.nodes[1]).unwrap().is_empty());
        assert_eq!(node0.preference_list(), cluster.nodes);
    }
}
