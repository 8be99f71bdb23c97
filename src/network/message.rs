//! Network message types.
//!
//! Every message is a JSON envelope `{src, dest, body}`. The body carries
//! the optional correlation ids and a `type` tag that selects the payload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{NodeId, Value};

/// Complete network message with addressing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkMessage {
    /// Sender node
    pub src: NodeId,

    /// Destination node
    pub dest: NodeId,

    /// Message body
    pub body: Body,
}

/// Message body: correlation ids plus the typed payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Identifier assigned by the sender, present on requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,

    /// Identifier of the request this body answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,

    /// Message payload
    #[serde(flatten)]
    pub payload: MessageType,
}

/// Network message types, tagged by the body's `type` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    // === Handshake ===
    /// Identity assignment from the harness
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,

    // === Broadcast ===
    /// New value from a client or a gossiping peer
    Broadcast { message: Value },
    BroadcastOk,

    /// Request for every value seen so far
    Read,
    ReadOk { messages: Vec<Value> },

    /// Gossip graph assignment
    Topology {
        topology: HashMap<NodeId, Vec<NodeId>>,
    },
    TopologyOk,

    // === Unique ids ===
    Generate,
    GenerateOk { id: String },

    // === Utility ===
    /// Error reply from a remote node
    Error {
        code: u32,
        #[serde(default)]
        text: String,
    },
}

impl MessageType {
    /// Wire name of this payload's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageType::Init { .. } => "init",
            MessageType::InitOk => "init_ok",
            MessageType::Broadcast { .. } => "broadcast",
            MessageType::BroadcastOk => "broadcast_ok",
            MessageType::Read => "read",
            MessageType::ReadOk { .. } => "read_ok",
            MessageType::Topology { .. } => "topology",
            MessageType::TopologyOk => "topology_ok",
            MessageType::Generate => "generate",
            MessageType::GenerateOk { .. } => "generate_ok",
            MessageType::Error { .. } => "error",
        }
    }
}

impl NetworkMessage {
    /// Create a new message without correlation ids.
    pub fn new(src: impl Into<NodeId>, dest: impl Into<NodeId>, payload: MessageType) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            body: Body {
                msg_id: None,
                in_reply_to: None,
                payload,
            },
        }
    }

    /// Build the reply to this message, addressed back to its sender.
    pub fn reply(&self, payload: MessageType) -> Self {
        Self {
            src: self.dest.clone(),
            dest: self.src.clone(),
            body: Body {
                msg_id: None,
                in_reply_to: self.body.msg_id,
                payload,
            },
        }
    }

    /// Whether this message answers an earlier request.
    pub fn is_reply(&self) -> bool {
        self.body.in_reply_to.is_some()
    }

    /// Serialize to a single JSON line (without the trailing newline).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
