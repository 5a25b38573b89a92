//! Runtime message channel between extension contexts.
//!
//! Stands in for the browser's `runtime.sendMessage` / `onMessage` pair:
//! content-script and popup sides hold a cloneable [`MessageChannel`], the
//! background side drains it through a [`MessageProcessor`]. Requests that
//! expect a reply carry a oneshot sender; fire-and-forget posts do not.
//!
//! The queue is unbounded: posts never block and never drop, and its
//! lifetime is bounded by the tab that feeds it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, warn};

use super::messages::{ExtensionMessage, MessageSender, TabId, TrackersResponse};

/// Event ID counter for correlation
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Default time to wait for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply produced by the background for a request.
pub type Reply = Option<TrackersResponse>;

/// An event with its correlation id and optional reply slot.
pub type Envelope = (u64, RuntimeEvent, Option<oneshot::Sender<Reply>>);

/// Something the background reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// A runtime message and who sent it.
    Message {
        message: ExtensionMessage,
        sender: MessageSender,
    },

    /// A browser tab was closed.
    TabRemoved { tab_id: TabId },
}

/// Channel error types
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Message channel closed")]
    Closed,

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Sending half of the runtime message bus.
#[derive(Clone)]
pub struct MessageChannel {
    event_tx: mpsc::UnboundedSender<Envelope>,
    event_rx: Arc<RwLock<Option<mpsc::UnboundedReceiver<Envelope>>>>,
    default_timeout: Duration,
}

impl MessageChannel {
    /// Create a new channel
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            event_tx,
            event_rx: Arc::new(RwLock::new(Some(event_rx))),
            default_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// Set the default reply timeout
    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    /// Send a message and wait for the background's reply.
    pub async fn send_message(
        &self,
        message: ExtensionMessage,
        sender: MessageSender,
    ) -> Result<Reply, ChannelError> {
        self.send_message_timeout(message, sender, self.default_timeout)
            .await
    }

    /// Send a message with a custom reply timeout.
    pub async fn send_message_timeout(
        &self,
        message: ExtensionMessage,
        sender: MessageSender,
        timeout: Duration,
    ) -> Result<Reply, ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let event_id = NEXT_EVENT_ID.fetch_add(1, Ordering::SeqCst);

        debug!("Sending {} as event {}", message.kind(), event_id);

        self.event_tx
            .send((event_id, RuntimeEvent::Message { message, sender }, Some(reply_tx)))
            .map_err(|_| ChannelError::Closed)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                error!("Reply channel closed for event {}", event_id);
                Err(ChannelError::Closed)
            }
            Err(_) => {
                warn!("Event {} got no reply after {:?}", event_id, timeout);
                Err(ChannelError::Timeout(timeout))
            }
        }
    }

    /// Post a message without waiting for a reply.
    ///
    /// Never blocks or drops, so it can be called from synchronous
    /// interception sinks.
    pub fn post_message(
        &self,
        message: ExtensionMessage,
        sender: MessageSender,
    ) -> Result<(), ChannelError> {
        self.post(RuntimeEvent::Message { message, sender })
    }

    /// Post a raw JSON message as received from page context.
    pub fn post_json(&self, json: &str, sender: MessageSender) -> Result<(), ChannelError> {
        let message: ExtensionMessage =
            serde_json::from_str(json).map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
        self.post_message(message, sender)
    }

    /// Signal that a tab was closed.
    pub fn notify_tab_removed(&self, tab_id: TabId) -> Result<(), ChannelError> {
        self.post(RuntimeEvent::TabRemoved { tab_id })
    }

    fn post(&self, event: RuntimeEvent) -> Result<(), ChannelError> {
        let event_id = NEXT_EVENT_ID.fetch_add(1, Ordering::SeqCst);
        self.event_tx
            .send((event_id, event, None))
            .map_err(|_| ChannelError::Closed)
    }

    /// Take the event receiver (for the background side)
    pub async fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Envelope>> {
        self.event_rx.write().await.take()
    }

    /// Check if the channel is still open
    pub fn is_open(&self) -> bool {
        !self.event_tx.is_closed()
    }
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Background-side consumer of a [`MessageChannel`].
pub struct MessageProcessor {
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl MessageProcessor {
    /// Create a processor; `None` if the receiver was already taken.
    pub async fn new(channel: &MessageChannel) -> Option<Self> {
        channel
            .take_receiver()
            .await
            .map(|receiver| Self { receiver })
    }

    /// Receive the next event and its reply slot, if any.
    pub async fn recv(&mut self) -> Option<(RuntimeEvent, Option<oneshot::Sender<Reply>>)> {
        self.receiver
            .recv()
            .await
            .map(|(_, event, reply_tx)| (event, reply_tx))
    }

    /// Process events until every sender is dropped.
    pub async fn process<F, Fut>(&mut self, mut handler: F)
    where
        F: FnMut(RuntimeEvent) -> Fut,
        Fut: std::future::Future<Output = Reply>,
    {
        while let Some((event_id, event, reply_tx)) = self.receiver.recv().await {
            debug!("Processing event {}", event_id);

            let reply = handler(event).await;

            if let Some(reply_tx) = reply_tx {
                if reply_tx.send(reply).is_err() {
                    warn!("Failed to deliver reply for event {}", event_id);
                }
            }
        }
    }
}
