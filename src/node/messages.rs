//! Deduplicated store of every value this node has seen.

use parking_lot::Mutex;
use std::collections::HashSet;

use crate::types::Value;

#[derive(Debug, Default)]
struct Inner {
    /// Values in arrival order
    ordered: Vec<Value>,

    /// Membership index (for deduplication)
    seen: HashSet<Value>,
}

/// Thread-safe, insertion-ordered set of observed values.
#[derive(Debug, Default)]
pub struct MessageStore {
    inner: Mutex<Inner>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value`, returning `true` if it was not already present.
    ///
    /// Check and insert happen under one lock, so among concurrent callers
    /// adding the same value exactly one sees `true`.
    pub fn add(&self, value: Value) -> bool {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(value) {
            return false;
        }
        inner.ordered.push(value);
        true
    }

    /// Copy of all stored values in arrival order.
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.lock().ordered.clone()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.inner.lock().ordered.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().ordered.is_empty()
    }
}
