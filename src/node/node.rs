//! Broadcast node: request handlers and the dispatch loop.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use crate::network::gossip::{DisseminationState, Disseminator};
use crate::network::message::{MessageType, NetworkMessage};
use crate::network::peer::TopologyManager;
use crate::network::transport::{StdioTransport, Transport, TransportError};
use crate::types::{NodeId, Value};

use super::config::NodeConfig;
use super::ids::IdGenerator;
use super::messages::MessageStore;

/// Errors from handling a single inbound message.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Node has not received init")]
    NotInitialized,

    #[error("Node already initialized as {current}, refusing {requested}")]
    AlreadyInitialized { current: NodeId, requested: NodeId },

    #[error("Unexpected message type: {0}")]
    UnexpectedMessage(&'static str),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Statistics about node operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Broadcast requests handled
    pub broadcasts_received: u64,

    /// Broadcasts carrying an already-seen value
    pub duplicates: u64,

    /// Disseminators spawned
    pub disseminations_started: u64,

    /// Disseminators still waiting for acknowledgments
    pub disseminations_active: u64,
}

#[derive(Default)]
struct Counters {
    broadcasts_received: AtomicU64,
    duplicates: AtomicU64,
    disseminations_started: AtomicU64,
    disseminations_active: Arc<AtomicU64>,
}

/// A single broadcast participant.
pub struct BroadcastNode<T: Transport> {
    /// Configuration
    config: NodeConfig,

    /// Our node ID, set once by init
    node_id: OnceLock<NodeId>,

    /// Every node in the cluster, as announced by init
    node_ids: RwLock<Vec<NodeId>>,

    /// Values seen so far
    messages: MessageStore,

    /// Gossip peers
    topology: TopologyManager,

    /// Unique id source
    ids: IdGenerator,

    /// Outbound transport
    transport: Arc<T>,

    /// Statistics
    counters: Counters,
}

impl<T: Transport> BroadcastNode<T> {
    /// Create a node that is not yet initialized.
    pub fn new(config: NodeConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            node_id: OnceLock::new(),
            node_ids: RwLock::new(Vec::new()),
            messages: MessageStore::new(),
            topology: TopologyManager::new(),
            ids: IdGenerator::new(),
            transport,
            counters: Counters::default(),
        }
    }

    /// Our node ID, once initialized.
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.get().map(String::as_str)
    }

    /// Cluster membership from init.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.node_ids.read().clone()
    }

    /// Stored values.
    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Gossip peers.
    pub fn topology(&self) -> &TopologyManager {
        &self.topology
    }

    /// Get node statistics.
    pub fn stats(&self) -> NodeStats {
        let c = &self.counters;
        NodeStats {
            broadcasts_received: c.broadcasts_received.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            disseminations_started: c.disseminations_started.load(Ordering::Relaxed),
            disseminations_active: c.disseminations_active.load(Ordering::Relaxed),
        }
    }

    fn local_id(&self) -> Result<&str, NodeError> {
        self.node_id().ok_or(NodeError::NotInitialized)
    }

    /// Handle a request and send its reply, if any.
    pub fn handle(&self, request: NetworkMessage) -> Result<(), NodeError> {
        if let Some(payload) = self.handle_request(&request)? {
            self.transport.send(request.reply(payload))?;
        }
        Ok(())
    }

    /// Handle a request and return the reply payload.
    ///
    /// Must be called from within a Tokio runtime: a newly seen broadcast
    /// value spawns its dissemination task.
    pub fn handle_request(
        &self,
        request: &NetworkMessage,
    ) -> Result<Option<MessageType>, NodeError> {
        let reply = match &request.body.payload {
            MessageType::Init { node_id, node_ids } => self.on_init(node_id, node_ids)?,
            MessageType::Broadcast { message } => self.on_broadcast(*message)?,
            MessageType::Read => self.on_read(),
            MessageType::Topology { topology } => self.on_topology(topology)?,
            MessageType::Generate => self.on_generate()?,
            MessageType::InitOk
            | MessageType::BroadcastOk
            | MessageType::ReadOk { .. }
            | MessageType::TopologyOk
            | MessageType::GenerateOk { .. }
            | MessageType::Error { .. } => {
                return Err(NodeError::UnexpectedMessage(request.body.payload.kind()));
            }
        };
        Ok(Some(reply))
    }

    fn on_init(&self, node_id: &str, node_ids: &[NodeId]) -> Result<MessageType, NodeError> {
        let current = self.node_id.get_or_init(|| node_id.to_string());
        if current != node_id {
            return Err(NodeError::AlreadyInitialized {
                current: current.clone(),
                requested: node_id.to_string(),
            });
        }

        *self.node_ids.write() = node_ids.to_vec();
        info!(node = %node_id, cluster = node_ids.len(), "Node initialized");
        Ok(MessageType::InitOk)
    }

    fn on_broadcast(&self, value: Value) -> Result<MessageType, NodeError> {
        let local_id = self.local_id()?;
        self.counters
            .broadcasts_received
            .fetch_add(1, Ordering::Relaxed);

        if !self.messages.add(value) {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(value, "Duplicate broadcast ignored");
            return Ok(MessageType::BroadcastOk);
        }

        let disseminator = Disseminator::new(
            local_id.to_string(),
            value,
            self.topology.peers(),
            Arc::clone(&self.transport),
            &self.config.gossip,
        );
        info!(value, peers = disseminator.peers().len(), "New value accepted");

        if disseminator.state() == DisseminationState::Active {
            self.counters
                .disseminations_started
                .fetch_add(1, Ordering::Relaxed);
            let active = Arc::clone(&self.counters.disseminations_active);
            active.fetch_add(1, Ordering::Relaxed);

            tokio::spawn(async move {
                disseminator.run().await;
                active.fetch_sub(1, Ordering::Relaxed);
            });
        }

        Ok(MessageType::BroadcastOk)
    }

    fn on_read(&self) -> MessageType {
        MessageType::ReadOk {
            messages: self.messages.snapshot(),
        }
    }

    fn on_topology(
        &self,
        topology: &HashMap<NodeId, Vec<NodeId>>,
    ) -> Result<MessageType, NodeError> {
        let local_id = self.local_id()?;
        self.topology.set_peers(local_id, topology);
        Ok(MessageType::TopologyOk)
    }

    fn on_generate(&self) -> Result<MessageType, NodeError> {
        let local_id = self.local_id()?;
        Ok(MessageType::GenerateOk {
            id: self.ids.next_id(local_id),
        })
    }
}

impl BroadcastNode<StdioTransport> {
    /// Process inbound messages from `reader` until end of input.
    ///
    /// Replies to our own requests are routed to their callbacks; every
    /// other message is handled as a request. A message that fails to
    /// decode or handle is logged and dropped without a reply.
    pub async fn run<R>(self: Arc<Self>, reader: R) -> Result<(), NodeError>
    where
        R: AsyncRead + Unpin,
    {
        let transport = Arc::clone(&self.transport);
        let cleanup = tokio::spawn(async move {
            let mut interval = tokio::time::interval(transport.config().cleanup_interval());
            loop {
                interval.tick().await;
                transport.cleanup();
            }
        });

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(error = %e, bytes = buf.len(), "Dropping undecodable line");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            if let Err(e) = self.dispatch(line) {
                warn!(error = %e, "Dropping inbound message");
            }
        }

        info!("Input closed, stopping dispatch");
        cleanup.abort();
        Ok(())
    }

    fn dispatch(&self, line: &str) -> Result<(), NodeError> {
        let message = NetworkMessage::from_json(line)?;

        if message.is_reply() {
            let src = message.src.clone();
            let kind = message.body.payload.kind();
            if !self.transport.complete(message) {
                debug!(src = %src, kind, "Unmatched reply");
            }
            return Ok(());
        }

        self.handle(message)
    }
}
