//! The transport adapter.
//!
//! One durable, FIFO, point-to-point channel per destination node — the
//! reference's `channel<id>` RabbitMQ queue, here a `tokio::mpsc` channel
//! registered under the destination's id. Delivery to a registered, live
//! node is reliable and ordered; delivery to an unregistered node, or to a
//! node currently in its post-failure downtime, is silently discarded.
//!
//! Messages cross the channel as the wire-encoded bytes from
//! [`Message::encode`], decoded back with [`Message::decode`] on arrival, so
//! the codec's framing (spec §6) is the actual on-the-wire representation
//! rather than a format only exercised in its own unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::RwLock;

use crate::message::{Message, NodeId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("no channel registered for destination {0}")]
    UnknownDestination(NodeId),
    #[error("destination {0} is currently down (post-failure downtime)")]
    NodeUnavailable(NodeId),
}

const CHANNEL_CAPACITY: usize = 1024;

struct Channel {
    sender: Sender<Vec<u8>>,
    alive: Arc<AtomicBool>,
}

/// The receiving end of a node's registered channel. Decodes each frame
/// with [`Message::decode`] before handing it to the caller; a malformed
/// frame is logged and skipped rather than returned, since a single
/// corrupt frame should not take down the receiver loop.
pub struct MessageReceiver {
    id: NodeId,
    inner: Receiver<Vec<u8>>,
}

impl MessageReceiver {
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let bytes = self.inner.recv().await?;
            match Message::decode(&bytes) {
                Ok(message) => return Some(message),
                Err(error) => {
                    tracing::error!(
                        "node {} received an unparseable frame: {error}",
                        self.id
                    );
                },
            }
        }
    }
}

/// A broker of one mpsc channel per node, shared by every node and the
/// supervisor.
#[derive(Clone, Default)]
pub struct Transport {
    channels: Arc<RwLock<HashMap<NodeId, Channel>>>,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `channel<id>` and returns its receiving end. The channel
    /// starts out alive.
    pub async fn register(&self, id: NodeId) -> MessageReceiver {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let channel = Channel {
            sender,
            alive: Arc::new(AtomicBool::new(true)),
        };
        self.channels.write().await.insert(id, channel);
        MessageReceiver { id, inner: receiver }
    }

    /// Marks `id`'s channel alive or down. A down channel silently drops
    /// every [`send`](Self::send) aimed at it, modeling the downtime window
    /// between a node failing and it broadcasting `RESTART`.
    pub async fn set_alive(&self, id: NodeId, alive: bool) {
        if let Some(channel) = self.channels.read().await.get(&id) {
            channel.alive.store(alive, Ordering::Release);
        }
    }

    /// Encodes `message` to its wire frame and publishes it on `dest`'s
    /// channel. Returns an error if `dest` has no open channel or is
    /// currently marked down; callers should log and swallow this rather
    /// than propagate it as a hard failure.
    pub async fn send(&self, dest: NodeId, message: Message) -> Result<(), TransportError> {
        let channels = self.channels.read().await;
        let channel = channels
            .get(&dest)
            .ok_or(TransportError::UnknownDestination(dest))?;
        if !channel.alive.load(Ordering::Acquire) {
            return Err(TransportError::NodeUnavailable(dest));
        }
        // The receiver may have been dropped between the lookup above and
        // this send; that is the same "discard" outcome as a down channel.
        let _ = channel.sender.send(message.encode()).await;
        Ok(())
    }
}
