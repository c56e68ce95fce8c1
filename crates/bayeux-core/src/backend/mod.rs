//! Pluggable state backends.
//!
//! A [`Backend`] owns client identity, the subscription index, per-client
//! message queues and client inactivity timers. The engine calls it with its
//! state lock held, so every operation observes and leaves a consistent
//! snapshot. Operations answer synchronously through their return values.

mod memory;

pub use memory::MemoryBackend;

use crate::engine::EngineRef;
use crate::events::EventBus;
use crate::namespace::ClientId;
use crate::timeouts::Expiry;
use bayeux_protocol::Message;
use std::time::Duration;

/// The delivery side a backend hands queued messages to.
pub trait Delivery {
    /// Whether a connection is currently registered for the client.
    fn has_connection(&self, client_id: &str) -> bool;

    /// Deliver messages to the client's connection.
    ///
    /// Returns `false` if no connection is registered.
    fn deliver(&mut self, client_id: &str, messages: Vec<Message>) -> bool;
}

/// Handles available to a backend at construction time.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Weak handle used by timer callbacks to re-enter the engine.
    pub engine: EngineRef,
    /// Lifecycle event bus.
    pub events: EventBus,
    /// Engine connection timeout; inactivity is measured against it.
    pub timeout: Duration,
}

/// Counters reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Live clients.
    pub clients: usize,
    /// Channels with at least one subscriber.
    pub channels: usize,
    /// Total (client, channel) subscriptions.
    pub subscriptions: usize,
    /// Messages waiting in client queues.
    pub queued: usize,
}

/// Client, subscription and queue state.
pub trait Backend: Send {
    /// Allocate a fresh client id, mark it live and start its inactivity
    /// timer. Emits `handshake`.
    fn create_client(&mut self) -> ClientId;

    /// Whether the id is live.
    fn client_exists(&self, client_id: &str) -> bool;

    /// Destroy a client: unsubscribe from everything, cancel its timer,
    /// release the id and drop its queue. Emits `disconnect` then `close`.
    ///
    /// Returns `false` for an unknown client.
    fn destroy_client(&mut self, client_id: &str) -> bool;

    /// Re-arm the client's inactivity timer.
    fn ping(&mut self, client_id: &str);

    /// Add a subscription. Returns `true` and emits `subscribe` if the
    /// client was not already subscribed.
    fn subscribe(&mut self, client_id: &str, channel: &str) -> bool;

    /// Remove a subscription. Returns `true` and emits `unsubscribe` if the
    /// client was subscribed.
    fn unsubscribe(&mut self, client_id: &str, channel: &str) -> bool;

    /// Enqueue a copy of `message` for every client subscribed to any of
    /// `channels` (each client at most once) and drain the queues of
    /// connected recipients. Emits `publish`.
    fn publish(&mut self, message: &Message, channels: &[String], delivery: &mut dyn Delivery);

    /// Deliver the client's queued messages if it has a connection.
    fn empty_queue(&mut self, client_id: &str, delivery: &mut dyn Delivery);

    /// Claim an elapsed inactivity timer. Returns the client to destroy, or
    /// `None` if the timer was cancelled or re-armed in the meantime.
    fn expire(&mut self, expiry: &Expiry<ClientId>) -> Option<ClientId>;

    /// Cancel every timer and forget all state.
    fn disconnect(&mut self);

    /// Current counters.
    fn stats(&self) -> BackendStats {
        BackendStats::default()
    }
}
