//! Gossip peer assignment.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

use crate::types::NodeId;

/// Holds the peers this node gossips to, as assigned by the harness.
#[derive(Debug, Default)]
pub struct TopologyManager {
    /// Current peer set
    peers: RwLock<Vec<NodeId>>,
}

impl TopologyManager {
    /// Create a manager with no peers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the peer set with `topology[local_id]`.
    ///
    /// Entries for other nodes are discarded. A topology with no entry for
    /// this node leaves it with no peers.
    pub fn set_peers(&self, local_id: &str, topology: &HashMap<NodeId, Vec<NodeId>>) {
        let peers = topology.get(local_id).cloned().unwrap_or_default();

        info!(node = %local_id, peers = ?peers, "Topology assigned");
        *self.peers.write() = peers;
    }

    /// Snapshot of the current peer set.
    pub fn peers(&self) -> Vec<NodeId> {
        self.peers.read().clone()
    }
}
