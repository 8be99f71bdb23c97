//! Core identifiers shared across the node.

/// Opaque node identifier assigned by the harness (e.g. `"n1"`, `"c3"`).
pub type NodeId = String;

/// A broadcast value. Values are opaque to the protocol beyond equality.
pub type Value = i64;
