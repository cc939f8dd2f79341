//! Message Bus for chat events
//!
//! The MessageBus decouples the gateway listener, which receives live chat
//! events, from the round orchestrator, which only wants them while a
//! collection window is open. It uses bounded channels to prevent unbounded
//! memory growth and supports both specific event subscriptions and global
//! "All" subscriptions.
//!
//! A subscription ends when its receiver is dropped; closed senders are
//! pruned on the next publish.

use sdk::types::ChatEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A chat message was posted
    MessageCreated,
    /// The gateway connection came up
    Connected,
    /// The gateway connection dropped
    Disconnected,
    /// Subscribe to all event types
    All,
}

impl EventType {
    /// Get the event type for a chat event
    pub fn of(event: &ChatEvent) -> Self {
        match event {
            ChatEvent::MessageCreated { .. } => EventType::MessageCreated,
            ChatEvent::Connected => EventType::Connected,
            ChatEvent::Disconnected { .. } => EventType::Disconnected,
        }
    }
}

/// Message bus for pub/sub delivery of chat events
pub struct MessageBus {
    /// Map of event types to lists of subscribers
    /// Each subscriber gets a bounded channel with CHANNEL_BUFFER_SIZE capacity
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<ChatEvent>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    ///
    /// Only events published after this call are delivered.
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers
    ///
    /// The event is sent to all subscribers of its type as well as all
    /// subscribers of `EventType::All`. Publishing never waits on a slow
    /// subscriber: if a channel is full the event is dropped for that
    /// subscriber and a warning is logged.
    pub async fn publish(&self, event: ChatEvent) {
        let mut channels = self.channels.lock().await;
        let event_type = EventType::of(&event);

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(event_type = ?event_type, "Subscriber channel full, dropping event");
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Number of live subscribers across all event types
    pub async fn subscriber_count(&self) -> usize {
        let channels = self.channels.lock().await;
        channels
            .values()
            .flat_map(|subscribers| subscribers.iter())
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
