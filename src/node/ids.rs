//! Cluster-unique identifier generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Produces ids unique across the cluster by prefixing a local counter
/// with the node's own id.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for `node_id`, e.g. `"n1-0"`, `"n1-1"`.
    pub fn next_id(&self, node_id: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", node_id, n)
    }
}
