//! Ryther Broadcast Library
//!
//! A single node of a gossip broadcast protocol:
//! - Deduplicated, insertion-ordered value storage
//! - Topology-scoped peer gossip
//! - Retry-until-acknowledged dissemination over an unreliable transport

pub mod network;
pub mod node;
pub mod types;

// Re-export core types for convenience
pub use types::{NodeId, Value};
pub use network::{
    Disseminator, MessageType, NetworkMessage, StdioTransport, TopologyManager, Transport,
};
pub use node::{BroadcastNode, MessageStore, NodeConfig};
