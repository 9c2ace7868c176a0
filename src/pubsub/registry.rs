//! Channel Registry
//!
//! Maps each channel to the connections subscribed to it. Every connection
//! owns an unbounded mpsc inbox; the registry stores the sending half so a
//! publisher can push frames without touching the subscriber's socket.
//!
//! ```text
//!   PUBLISH news hi                                  connection 7
//!        │                                         ┌──────────────┐
//!        ▼            snapshot under lock          │ select! {    │
//!   ┌──────────┐  ───────────────────────────────▶ │   read_buf   │
//!   │  PubSub  │   send outside lock (inbox tx)    │   inbox.recv │──▶ socket
//!   └──────────┘                                   │ }            │
//!                                                  └──────────────┘
//! ```
//!
//! The registry lock is independent of the store's and is never held while
//! waiting on a socket.

use crate::protocol::RespValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

/// Identifies one accepted connection for the lifetime of the process.
pub type ConnectionId = u64;

/// Sending half of a connection's outbound message queue.
pub type Inbox = mpsc::UnboundedSender<RespValue>;

/// Channel registry shared by every connection.
#[derive(Debug, Default)]
pub struct PubSub {
    channels: Mutex<HashMap<String, HashMap<ConnectionId, Inbox>>>,
    next_id: AtomicU64,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh connection id.
    pub fn allocate_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers `id` on `channel`. Subscribing twice is a no-op.
    pub async fn subscribe(&self, id: ConnectionId, inbox: &Inbox, channel: &str) {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_default()
            .entry(id)
            .or_insert_with(|| inbox.clone());
    }

    /// Removes `id` from `channel`, dropping the channel once nobody is left.
    pub async fn unsubscribe(&self, id: ConnectionId, channel: &str) {
        let mut channels = self.channels.lock().await;
        Self::detach(&mut channels, id, channel);
    }

    /// Removes `id` from every listed channel in one pass.
    pub async fn unsubscribe_all<'a, I>(&self, id: ConnectionId, subscribed: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut channels = self.channels.lock().await;
        for channel in subscribed {
            Self::detach(&mut channels, id, channel);
        }
    }

    fn detach(
        channels: &mut HashMap<String, HashMap<ConnectionId, Inbox>>,
        id: ConnectionId,
        channel: &str,
    ) {
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Delivers `message` to every current subscriber of `channel`.
    ///
    /// The subscriber set is snapshotted under the lock and delivered to
    /// after releasing it. Sends to connections that already went away are
    /// ignored.
    ///
    /// # Returns
    ///
    /// The number of subscribers in the snapshot.
    pub async fn publish(&self, channel: &str, message: &str) -> usize {
        let recipients: Vec<Inbox> = {
            let channels = self.channels.lock().await;
            match channels.get(channel) {
                Some(subscribers) => subscribers.values().cloned().collect(),
                None => return 0,
            }
        };

        let frame = RespValue::string_array(["message", channel, message]);
        for inbox in &recipients {
            let _ = inbox.send(frame.clone());
        }

        trace!(channel, receivers = recipients.len(), "Message published");
        recipients.len()
    }

    /// Number of channels with at least one subscriber.
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }

    #[cfg(test)]
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(channel)
            .map_or(0, HashMap::len)
    }
}
