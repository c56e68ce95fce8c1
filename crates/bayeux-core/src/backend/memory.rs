//! In-process backend.

use super::{Backend, BackendContext, BackendStats, Delivery};
use crate::engine::EngineRef;
use crate::events::{Event, EventBus};
use crate::namespace::{ClientId, Namespace};
use crate::timeouts::{DeferredScheduler, Expiry};
use bayeux_protocol::Message;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, trace};

/// Keeps all state in local maps.
///
/// Subscriptions are indexed both ways so publish looks up subscribers by
/// channel and destroy looks up channels by client.
pub struct MemoryBackend {
    namespace: Namespace,
    /// client -> subscribed channels
    clients: HashMap<ClientId, HashSet<String>>,
    /// channel -> subscribed clients
    channels: HashMap<String, HashSet<ClientId>>,
    /// client -> queued messages
    messages: HashMap<ClientId, Vec<Message>>,
    timers: DeferredScheduler<ClientId>,
    events: EventBus,
    engine: EngineRef,
    timeout: Duration,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new(context: BackendContext) -> Self {
        Self {
            namespace: Namespace::new(),
            clients: HashMap::new(),
            channels: HashMap::new(),
            messages: HashMap::new(),
            timers: DeferredScheduler::new(),
            events: context.events,
            engine: context.engine,
            timeout: context.timeout,
        }
    }

    /// Number of clients subscribed to a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, HashSet::len)
    }

    /// The channels a client is subscribed to.
    #[must_use]
    pub fn client_channels(&self, client_id: &str) -> Vec<String> {
        self.clients
            .get(client_id)
            .map(|channels| channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of messages queued for a client.
    #[must_use]
    pub fn queued(&self, client_id: &str) -> usize {
        self.messages.get(client_id).map_or(0, Vec::len)
    }
}

impl Backend for MemoryBackend {
    fn create_client(&mut self) -> ClientId {
        let client_id = self.namespace.generate();
        debug!(client = %client_id, "Created new client");
        self.ping(&client_id);
        self.events.emit(Event::Handshake {
            client_id: client_id.clone(),
        });
        client_id
    }

    fn client_exists(&self, client_id: &str) -> bool {
        self.namespace.exists(client_id)
    }

    fn destroy_client(&mut self, client_id: &str) -> bool {
        if !self.namespace.exists(client_id) {
            return false;
        }

        for channel in self.client_channels(client_id) {
            self.unsubscribe(client_id, &channel);
        }
        self.clients.remove(client_id);

        self.timers.cancel(&client_id.to_string());
        self.namespace.release(client_id);
        self.messages.remove(client_id);

        debug!(client = %client_id, "Destroyed client");
        self.events.emit(Event::Disconnect {
            client_id: client_id.to_string(),
        });
        self.events.emit(Event::Close {
            client_id: client_id.to_string(),
        });
        true
    }

    fn ping(&mut self, client_id: &str) {
        let client_id = client_id.to_string();
        trace!(client = %client_id, "Ping");
        self.timers.cancel(&client_id);
        self.timers
            .schedule(client_id, self.timeout * 2, self.engine.backend_timer());
    }

    fn subscribe(&mut self, client_id: &str, channel: &str) -> bool {
        let added = self
            .clients
            .entry(client_id.to_string())
            .or_default()
            .insert(channel.to_string());
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(client_id.to_string());

        if added {
            debug!(client = %client_id, channel = %channel, "Subscribed");
            self.events.emit(Event::Subscribe {
                client_id: client_id.to_string(),
                channel: channel.to_string(),
            });
        }
        added
    }

    fn unsubscribe(&mut self, client_id: &str, channel: &str) -> bool {
        let removed = self
            .clients
            .get_mut(client_id)
            .is_some_and(|channels| channels.remove(channel));

        if let Some(subscribers) = self.channels.get_mut(channel) {
            subscribers.remove(client_id);
            if subscribers.is_empty() {
                self.channels.remove(channel);
            }
        }

        if removed {
            debug!(client = %client_id, channel = %channel, "Unsubscribed");
            self.events.emit(Event::Unsubscribe {
                client_id: client_id.to_string(),
                channel: channel.to_string(),
            });
        }
        removed
    }

    fn publish(&mut self, message: &Message, channels: &[String], delivery: &mut dyn Delivery) {
        let recipients: HashSet<ClientId> = channels
            .iter()
            .filter_map(|channel| self.channels.get(channel))
            .flatten()
            .cloned()
            .collect();

        trace!(
            channel = %message.channel_name(),
            recipients = recipients.len(),
            "Publishing message"
        );

        for client_id in recipients {
            self.messages
                .entry(client_id.clone())
                .or_default()
                .push(message.clone());
            self.empty_queue(&client_id, delivery);
        }

        self.events.emit(Event::Publish {
            client_id: message.client_id.clone(),
            channel: message.channel_name().to_string(),
            data: message.data.clone(),
        });
    }

    fn empty_queue(&mut self, client_id: &str, delivery: &mut dyn Delivery) {
        if !delivery.has_connection(client_id) {
            return;
        }
        if let Some(queue) = self.messages.remove(client_id) {
            delivery.deliver(client_id, queue);
        }
    }

    fn expire(&mut self, expiry: &Expiry<ClientId>) -> Option<ClientId> {
        self.timers
            .expire(expiry)
            .then(|| expiry.name.clone())
    }

    fn disconnect(&mut self) {
        self.timers.cancel_all();
        self.namespace = Namespace::new();
        self.clients.clear();
        self.channels.clear();
        self.messages.clear();
        debug!("Memory backend reset");
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            clients: self.namespace.len(),
            channels: self.channels.len(),
            subscriptions: self.clients.values().map(HashSet::len).sum(),
            queued: self.messages.values().map(Vec::len).sum(),
        }
    }
}
