#![allow(dead_code)]

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use ryther_broadcast::network::{
    MessageType, NetworkMessage, ResponseCallback, Transport, TransportError,
};
use ryther_broadcast::node::{BroadcastNode, NodeConfig};
use ryther_broadcast::{NodeId, Value};

pub type SimNode = BroadcastNode<SimTransport>;

/// In-process network of broadcast nodes with controllable link loss.
pub struct SimNetwork {
    nodes: RwLock<HashMap<NodeId, Arc<SimNode>>>,

    /// Directed links currently dropping everything
    cut: RwLock<HashSet<(NodeId, NodeId)>>,

    /// Every message handed to a transport, delivered or not
    log: Mutex<Vec<NetworkMessage>>,

    next_msg_id: AtomicU64,
}

/// Transport endpoint of one simulated node.
pub struct SimTransport {
    network: Weak<SimNetwork>,
}

impl SimNetwork {
    /// Start initialized nodes wired with the given adjacency lists.
    pub fn start(topology: &[(&str, &[&str])]) -> Arc<Self> {
        let network = Arc::new(Self {
            nodes: RwLock::new(HashMap::new()),
            cut: RwLock::new(HashSet::new()),
            log: Mutex::new(Vec::new()),
            next_msg_id: AtomicU64::new(1),
        });

        let node_ids: Vec<NodeId> = topology.iter().map(|(id, _)| id.to_string()).collect();
        let assignment: HashMap<NodeId, Vec<NodeId>> = topology
            .iter()
            .map(|(id, peers)| (id.to_string(), peers.iter().map(|p| p.to_string()).collect()))
            .collect();

        for id in &node_ids {
            let transport = Arc::new(SimTransport {
                network: Arc::downgrade(&network),
            });
            let node = Arc::new(BroadcastNode::new(NodeConfig::default(), transport));

            node.handle_request(&client_request(
                id,
                MessageType::Init {
                    node_id: id.clone(),
                    node_ids: node_ids.clone(),
                },
            ))
            .unwrap();
            node.handle_request(&client_request(
                id,
                MessageType::Topology {
                    topology: assignment.clone(),
                },
            ))
            .unwrap();

            network.nodes.write().insert(id.clone(), node);
        }

        network
    }

    pub fn node(&self, id: &str) -> Arc<SimNode> {
        self.nodes.read()[id].clone()
    }

    /// Client broadcast to `id`; returns the node's reply.
    pub fn broadcast(&self, id: &str, value: Value) -> MessageType {
        self.node(id)
            .handle_request(&client_request(id, MessageType::Broadcast { message: value }))
            .unwrap()
            .unwrap()
    }

    /// Values stored at `id`, sorted.
    pub fn read(&self, id: &str) -> Vec<Value> {
        match self
            .node(id)
            .handle_request(&client_request(id, MessageType::Read))
            .unwrap()
        {
            Some(MessageType::ReadOk { mut messages }) => {
                messages.sort_unstable();
                messages
            }
            other => panic!("Expected ReadOk, got {:?}", other),
        }
    }

    /// Reassign one node's peers.
    pub fn set_peers(&self, id: &str, peers: &[&str]) {
        let topology = HashMap::from([(
            id.to_string(),
            peers.iter().map(|p| p.to_string()).collect(),
        )]);
        self.node(id)
            .handle_request(&client_request(id, MessageType::Topology { topology }))
            .unwrap();
    }

    /// Drop traffic from `from` to `to`.
    pub fn cut(&self, from: &str, to: &str) {
        self.cut.write().insert((from.to_string(), to.to_string()));
    }

    /// Drop traffic both ways between `a` and `b`.
    pub fn partition(&self, a: &str, b: &str) {
        self.cut(a, b);
        self.cut(b, a);
    }

    /// Restore every link.
    pub fn heal(&self) {
        self.cut.write().clear();
    }

    fn is_cut(&self, from: &str, to: &str) -> bool {
        self.cut.read().contains(&(from.to_string(), to.to_string()))
    }

    /// Broadcast values sent from `from` to `to`, in send order.
    pub fn broadcasts_sent(&self, from: &str, to: &str) -> Vec<Value> {
        self.log
            .lock()
            .iter()
            .filter(|m| m.src == from && m.dest == to)
            .filter_map(|m| match m.body.payload {
                MessageType::Broadcast { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Every node that `from` sent a broadcast to.
    pub fn broadcast_targets(&self, from: &str) -> HashSet<NodeId> {
        self.log
            .lock()
            .iter()
            .filter(|m| m.src == from && matches!(m.body.payload, MessageType::Broadcast { .. }))
            .map(|m| m.dest.clone())
            .collect()
    }

    /// Total messages handed to transports so far.
    pub fn sent_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether no node has a dissemination in flight.
    pub fn quiescent(&self) -> bool {
        self.nodes
            .read()
            .values()
            .all(|node| node.stats().disseminations_active == 0)
    }

    /// Advance (virtual) time until `check` holds, or give up after `limit`.
    pub async fn wait_until(&self, limit: Duration, check: impl Fn(&Self) -> bool) -> bool {
        let step = Duration::from_millis(100);
        let mut waited = Duration::ZERO;
        while waited < limit {
            if check(self) {
                return true;
            }
            tokio::time::sleep(step).await;
            waited += step;
        }
        check(self)
    }
}

impl Transport for SimTransport {
    fn send(&self, message: NetworkMessage) -> Result<(), TransportError> {
        let network = self.network.upgrade().ok_or(TransportError::Closed)?;
        network.log.lock().push(message);
        Ok(())
    }

    fn rpc(
        &self,
        mut message: NetworkMessage,
        on_response: ResponseCallback,
    ) -> Result<(), TransportError> {
        let network = self.network.upgrade().ok_or(TransportError::Closed)?;
        message.body.msg_id = Some(network.next_msg_id.fetch_add(1, Ordering::Relaxed));
        network.log.lock().push(message.clone());

        if network.is_cut(&message.src, &message.dest) {
            return Ok(());
        }
        let Some(target) = network.nodes.read().get(&message.dest).cloned() else {
            return Ok(());
        };

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Ok(Some(payload)) = target.handle_request(&message) {
                let reply = message.reply(payload);
                if !network.is_cut(&reply.src, &reply.dest) {
                    on_response(reply);
                }
            }
        });
        Ok(())
    }
}

pub fn client_request(dest: &str, payload: MessageType) -> NetworkMessage {
    let mut msg = NetworkMessage::new("c1", dest, payload);
    msg.body.msg_id = Some(1);
    msg
}
