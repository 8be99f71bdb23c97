//! Networking layer for the broadcast node.
//!
//! Implements:
//! - Typed wire messages
//! - Transport with request/reply correlation
//! - Gossip peer assignment
//! - Retry-until-acknowledged dissemination

pub mod gossip;
pub mod message;
pub mod peer;
pub mod transport;

pub use gossip::{DisseminationState, Disseminator, GossipConfig};
pub use message::{Body, MessageType, NetworkMessage};
pub use peer::TopologyManager;
pub use transport::{ResponseCallback, StdioTransport, Transport, TransportConfig, TransportError};
