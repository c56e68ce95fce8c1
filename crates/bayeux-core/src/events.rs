//! Lifecycle event bus.
//!
//! The engine and its backend publish lifecycle notifications on a
//! broadcast channel. Observers subscribe and receive every event emitted
//! after they subscribed; emitting never blocks and never runs observer code.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of events buffered per observer.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// An engine lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A client completed a handshake.
    Handshake { client_id: String },
    /// A client was destroyed.
    Disconnect { client_id: String },
    /// A client's resources were released.
    Close { client_id: String },
    /// A client subscribed to a channel it was not yet subscribed to.
    Subscribe { client_id: String, channel: String },
    /// A client left a channel it was subscribed to.
    Unsubscribe { client_id: String, channel: String },
    /// A connection object was created for a client.
    ConnectionOpen { client_id: String },
    /// A connection object was torn down.
    ConnectionClose { client_id: String },
    /// A message was published.
    Publish {
        client_id: Option<String>,
        channel: String,
        data: Option<Value>,
    },
}

impl Event {
    /// The event's wire-style name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::Handshake { .. } => "handshake",
            Event::Disconnect { .. } => "disconnect",
            Event::Close { .. } => "close",
            Event::Subscribe { .. } => "subscribe",
            Event::Unsubscribe { .. } => "unsubscribe",
            Event::ConnectionOpen { .. } => "connection:open",
            Event::ConnectionClose { .. } => "connection:close",
            Event::Publish { .. } => "publish",
        }
    }

    /// The client the event concerns, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        match self {
            Event::Handshake { client_id }
            | Event::Disconnect { client_id }
            | Event::Close { client_id }
            | Event::Subscribe { client_id, .. }
            | Event::Unsubscribe { client_id, .. }
            | Event::ConnectionOpen { client_id }
            | Event::ConnectionClose { client_id } => Some(client_id),
            Event::Publish { client_id, .. } => client_id.as_deref(),
        }
    }
}

/// Broadcast bus for [`Event`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per observer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register an observer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event to every current observer.
    pub fn emit(&self, event: Event) {
        trace!(event = event.name(), client = ?event.client_id(), "Emitting event");
        // No observers is not an error.
        let _ = self.sender.send(event);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
