//! Transport layer for network communication.
//!
//! [`Transport`] is the narrow interface the broadcast core talks to.
//! [`StdioTransport`] implements it over line-delimited JSON: outbound
//! messages are queued to a single writer task and replies are matched
//! back to their callbacks by `in_reply_to`.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::message::NetworkMessage;

/// Invoked with the reply to an [`Transport::rpc`] request.
pub type ResponseCallback = Box<dyn FnOnce(NetworkMessage) + Send + Sync + 'static>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Outbound channel closed")]
    Closed,
}

/// Message delivery to other nodes.
///
/// Delivery is best effort. A lost request simply never invokes its
/// callback; callers detect that by the absence of a reply.
pub trait Transport: Send + Sync + 'static {
    /// Send a message without waiting for a reply.
    fn send(&self, message: NetworkMessage) -> Result<(), TransportError>;

    /// Send a request and register `on_response` for its reply.
    ///
    /// The transport assigns the request's `msg_id`.
    fn rpc(
        &self,
        message: NetworkMessage,
        on_response: ResponseCallback,
    ) -> Result<(), TransportError>;
}

/// Transport configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Age after which an unanswered callback is dropped
    pub rpc_timeout_ms: u64,

    /// How often stale callbacks are swept
    pub cleanup_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 5000,
            cleanup_interval_ms: 1000,
        }
    }
}

impl TransportConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Sweep period, never zero.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }
}

/// Outstanding request awaiting its reply.
struct PendingCall {
    /// When the request was queued
    sent_at: Instant,

    /// Reply handler
    callback: ResponseCallback,
}

/// Line-delimited JSON transport.
pub struct StdioTransport {
    /// Configuration
    config: TransportConfig,

    /// Next request id to hand out
    next_msg_id: AtomicU64,

    /// Callbacks by request id
    pending: DashMap<u64, PendingCall>,

    /// Queue feeding the writer task, `None` once closed
    outgoing_tx: Mutex<Option<mpsc::UnboundedSender<NetworkMessage>>>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<NetworkMessage>>>,
}

impl StdioTransport {
    /// Create a new transport. Nothing is written until a writer is spawned.
    pub fn new(config: TransportConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            config,
            next_msg_id: AtomicU64::new(1),
            pending: DashMap::new(),
            outgoing_tx: Mutex::new(Some(tx)),
            outgoing_rx: Mutex::new(Some(rx)),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Take the outbound message receiver.
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<NetworkMessage>> {
        self.outgoing_rx.lock().take()
    }

    /// Spawn the task that writes queued messages to `writer`, one per line.
    ///
    /// Returns `None` if the outbound receiver was already taken.
    pub fn spawn_writer<W>(&self, writer: W) -> Option<JoinHandle<()>>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut rx = self.take_receiver()?;

        Some(tokio::spawn(async move {
            let mut writer = writer;
            while let Some(message) = rx.recv().await {
                let mut line = match message.to_json() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "Dropping unencodable message");
                        continue;
                    }
                };
                line.push('\n');

                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        }))
    }

    /// Stop accepting outbound messages.
    ///
    /// Messages already queued are still written; the writer task exits
    /// once the queue is empty.
    pub fn close(&self) {
        if self.outgoing_tx.lock().take().is_some() {
            debug!("Outbound queue closed");
        }
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Route a reply to its callback.
    ///
    /// Returns `false` if no callback is registered for it (not a reply,
    /// already answered, or expired).
    pub fn complete(&self, reply: NetworkMessage) -> bool {
        let Some(id) = reply.body.in_reply_to else {
            return false;
        };

        match self.pending.remove(&id) {
            Some((_, call)) => {
                (call.callback)(reply);
                true
            }
            None => {
                trace!(in_reply_to = id, src = %reply.src, "No pending request for reply");
                false
            }
        }
    }

    /// Drop callbacks whose requests have gone unanswered too long.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let timeout = self.config.rpc_timeout();
        let before = self.pending.len();

        self.pending
            .retain(|_, call| now.duration_since(call.sent_at) < timeout);

        let removed = before.saturating_sub(self.pending.len());
        if removed > 0 {
            debug!(removed, "Expired unanswered requests");
        }
        removed
    }

    fn allocate_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Transport for StdioTransport {
    fn send(&self, message: NetworkMessage) -> Result<(), TransportError> {
        match self.outgoing_tx.lock().as_ref() {
            Some(tx) => tx.send(message).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn rpc(
        &self,
        mut message: NetworkMessage,
        on_response: ResponseCallback,
    ) -> Result<(), TransportError> {
        let id = self.allocate_msg_id();
        message.body.msg_id = Some(id);

        self.pending.insert(
            id,
            PendingCall {
                sent_at: Instant::now(),
                callback: on_response,
            },
        );

        if let Err(e) = self.send(message) {
            self.pending.remove(&id);
            return Err(e);
        }
        Ok(())
    }
}
