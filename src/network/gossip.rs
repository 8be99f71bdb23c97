//! Gossip dissemination of newly observed values.
//!
//! One [`Disseminator`] runs per accepted value. Each round it sends the
//! value to every peer that has not acknowledged it yet, then sleeps for
//! the retry interval. It finishes once every peer in its snapshot has
//! acknowledged. There is no retry limit and no backoff.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::message::{MessageType, NetworkMessage};
use super::transport::Transport;
use crate::types::{NodeId, Value};

/// Configuration for gossip dissemination.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Pause between delivery rounds
    pub retry_interval_ms: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 1000,
        }
    }
}

impl GossipConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Dissemination progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisseminationState {
    /// Some peers have not acknowledged
    Active,

    /// Every peer acknowledged
    Done,
}

/// Drives delivery of one value to a fixed peer snapshot.
pub struct Disseminator<T: Transport> {
    /// Our node ID, used as the sender
    local_id: NodeId,

    /// Value being delivered
    value: Value,

    /// Peers fixed at creation
    peers: Vec<NodeId>,

    /// Peers that acknowledged; only grows
    acked: Arc<Mutex<HashSet<NodeId>>>,

    /// Outbound transport
    transport: Arc<T>,

    /// Pause between rounds
    retry_interval: Duration,
}

impl<T: Transport> Disseminator<T> {
    /// Create a disseminator for `value` over a snapshot of `peers`.
    ///
    /// `local_id` is removed from the snapshot, as are duplicates.
    pub fn new(
        local_id: NodeId,
        value: Value,
        peers: Vec<NodeId>,
        transport: Arc<T>,
        config: &GossipConfig,
    ) -> Self {
        let mut seen = HashSet::new();
        let peers = peers
            .into_iter()
            .filter(|peer| *peer != local_id && seen.insert(peer.clone()))
            .collect();

        Self {
            local_id,
            value,
            peers,
            acked: Arc::new(Mutex::new(HashSet::new())),
            transport,
            retry_interval: config.retry_interval(),
        }
    }

    /// Value being delivered.
    pub fn value(&self) -> Value {
        self.value
    }

    /// The fixed peer snapshot.
    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    /// Peers that have not acknowledged yet, in snapshot order.
    pub fn outstanding(&self) -> Vec<NodeId> {
        let acked = self.acked.lock();
        self.peers
            .iter()
            .filter(|peer| !acked.contains(*peer))
            .cloned()
            .collect()
    }

    /// Current state.
    pub fn state(&self) -> DisseminationState {
        if self.outstanding().is_empty() {
            DisseminationState::Done
        } else {
            DisseminationState::Active
        }
    }

    /// Send the value once to every outstanding peer.
    ///
    /// Returns the number of requests issued. Acknowledgments arrive
    /// asynchronously through the transport callbacks.
    pub fn send_round(&self) -> usize {
        let outstanding = self.outstanding();

        for peer in &outstanding {
            let request = NetworkMessage::new(
                self.local_id.clone(),
                peer.clone(),
                MessageType::Broadcast {
                    message: self.value,
                },
            );

            let acked = Arc::clone(&self.acked);
            let target = peer.clone();
            let value = self.value;
            let on_response = Box::new(move |reply: NetworkMessage| {
                match reply.body.payload {
                    MessageType::BroadcastOk => {
                        acked.lock().insert(target);
                    }
                    other => {
                        debug!(
                            peer = %target,
                            value,
                            kind = other.kind(),
                            "Unexpected reply to broadcast, will retry"
                        );
                    }
                }
            });

            if let Err(e) = self.transport.rpc(request, on_response) {
                trace!(peer = %peer, value = self.value, error = %e, "Send failed, will retry");
            }
        }

        outstanding.len()
    }

    /// Deliver until every peer has acknowledged.
    pub async fn run(self) {
        let mut round: u64 = 0;

        while self.state() == DisseminationState::Active {
            let sent = self.send_round();
            round += 1;
            debug!(value = self.value, round, sent, "Dissemination round");

            tokio::time::sleep(self.retry_interval).await;
        }

        info!(
            value = self.value,
            peers = self.peers.len(),
            rounds = round,
            "Dissemination complete"
        );
    }
}
