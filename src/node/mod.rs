//! Broadcast node.
//!
//! Combines the protocol components into a runnable node:
//! - Deduplicated value storage
//! - Request handlers
//! - Unique id generation

pub mod config;
pub mod ids;
pub mod messages;
pub mod node;

pub use config::{ConfigError, LogConfig, NodeConfig};
pub use ids::IdGenerator;
pub use messages::MessageStore;
pub use node::{BroadcastNode, NodeError, NodeStats};
