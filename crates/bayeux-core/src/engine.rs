//! The message engine.
//!
//! [`Engine`] composes a [`Backend`] with the registry of live client
//! connections. All of its state sits behind a single mutex so that a
//! protocol handler can validate and act in one [`Engine::transaction`].
//!
//! Timer callbacks hold only a weak [`EngineRef`]; when they fire they take
//! the same lock and claim their expiry before acting, so a timer that was
//! cancelled or re-armed in the meantime is ignored.
//!
//! Flush callbacks and [`Socket::send`] run with the lock held and must not
//! call back into the engine.

use crate::backend::{Backend, BackendContext, BackendStats, Delivery, MemoryBackend};
use crate::connection::{ClientConnection, ConnectionTimer};
use crate::events::{Event, EventBus, DEFAULT_EVENT_CAPACITY};
use crate::namespace::ClientId;
use crate::socket::Socket;
use crate::timeouts::Expiry;
use bayeux_protocol::{channel, Advice, Message};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Receives the messages that answer a pending `/meta/connect`.
pub type FlushCallback = Box<dyn FnOnce(Vec<Message>) + Send>;

/// Engine errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// No client id was given.
    #[error("Missing client id")]
    MissingClientId,

    /// The client id is not live.
    #[error("Unknown client: {0}")]
    UnknownClient(String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default long-poll hold; clients are destroyed after twice this
    /// long without a ping.
    pub timeout: Duration,
    /// Reconnect interval advertised to clients.
    pub interval: Duration,
    /// Maximum time delivered messages wait before a connection flushes.
    pub max_delay: Duration,
    /// Events buffered per lifecycle observer.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::ZERO,
            max_delay: Duration::ZERO,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Per-request connect options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Hold time overriding the engine timeout.
    pub timeout: Option<Duration>,
}

impl ConnectOptions {
    /// Take the hold time from client advice (milliseconds).
    #[must_use]
    pub fn from_advice(advice: Option<&Advice>) -> Self {
        Self {
            timeout: advice
                .and_then(|advice| advice.timeout)
                .map(Duration::from_millis),
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Backend counters.
    pub backend: BackendStats,
    /// Registered connections.
    pub connections: usize,
    /// Connections with a live socket.
    pub sockets: usize,
}

struct Shared {
    state: Mutex<EngineState>,
}

/// Weak handle to the engine, used by timers.
#[derive(Clone, Default)]
pub struct EngineRef {
    shared: Weak<Shared>,
}

impl EngineRef {
    /// A handle that refers to no engine; timers built from it do nothing.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> Option<R> {
        let shared = self.shared.upgrade()?;
        let mut state = shared.state.lock();
        Some(f(&mut state))
    }

    /// Callback for a backend inactivity timer.
    #[must_use]
    pub fn backend_timer(&self) -> impl FnOnce(Expiry<ClientId>) + Send + 'static {
        let engine = self.clone();
        move |expiry| {
            engine.with_state(|state| state.expire_client(&expiry));
        }
    }

    pub(crate) fn connection_timer(
        &self,
        client_id: ClientId,
    ) -> impl FnOnce(Expiry<ConnectionTimer>) + Send + 'static {
        let engine = self.clone();
        move |expiry| {
            engine.with_state(|state| state.connections.expire(&client_id, &expiry));
        }
    }
}

impl std::fmt::Debug for EngineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRef")
            .field("live", &(self.shared.strong_count() > 0))
            .finish()
    }
}

/// Registry of live client connections.
pub struct Connections {
    connections: HashMap<ClientId, ClientConnection>,
    engine: EngineRef,
    events: EventBus,
    max_delay: Duration,
}

impl Connections {
    fn new(engine: EngineRef, events: EventBus, max_delay: Duration) -> Self {
        Self {
            connections: HashMap::new(),
            engine,
            events,
            max_delay,
        }
    }

    /// Look up a connection.
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&ClientConnection> {
        self.connections.get(client_id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn get_or_create(&mut self, client_id: &str) -> &mut ClientConnection {
        self.connections
            .entry(client_id.to_string())
            .or_insert_with(|| {
                trace!(client = %client_id, "Opening connection");
                self.events.emit(Event::ConnectionOpen {
                    client_id: client_id.to_string(),
                });
                ClientConnection::new(client_id, self.engine.clone(), self.max_delay)
            })
    }

    fn open_socket(&mut self, client_id: &str, socket: Arc<dyn Socket>) {
        self.get_or_create(client_id).attach_socket(socket);
    }

    fn close(&mut self, client_id: &str) {
        let Some(mut connection) = self.connections.remove(client_id) else {
            return;
        };
        connection.close_socket();
        trace!(client = %client_id, "Closed connection");
        self.events.emit(Event::ConnectionClose {
            client_id: client_id.to_string(),
        });
    }

    /// Flush the connection and tear it down. A non-graceful flush detaches
    /// the socket first so it is left open for reuse by the transport.
    fn flush(&mut self, client_id: &str, graceful: bool) {
        let Some(connection) = self.connections.get_mut(client_id) else {
            return;
        };
        if !graceful {
            connection.detach_socket();
        }
        connection.flush();
        self.close(client_id);
    }

    fn expire(&mut self, client_id: &str, expiry: &Expiry<ConnectionTimer>) {
        let Some(connection) = self.connections.get_mut(client_id) else {
            return;
        };
        if !connection.claim(expiry) {
            return;
        }
        trace!(client = %client_id, timer = ?expiry.name, "Connection timer fired");
        if !connection.flush() {
            self.close(client_id);
        }
    }
}

impl Delivery for Connections {
    fn has_connection(&self, client_id: &str) -> bool {
        self.connections.contains_key(client_id)
    }

    fn deliver(&mut self, client_id: &str, messages: Vec<Message>) -> bool {
        if messages.is_empty() {
            return false;
        }
        let Some(connection) = self.connections.get_mut(client_id) else {
            return false;
        };
        for message in messages {
            connection.deliver(message);
        }
        true
    }
}

/// Engine state, accessed under the engine lock.
pub struct EngineState {
    backend: Box<dyn Backend>,
    connections: Connections,
    timeout: Duration,
}

impl EngineState {
    /// Allocate a new client.
    pub fn create_client(&mut self) -> ClientId {
        self.backend.create_client()
    }

    /// Whether the client id is live.
    #[must_use]
    pub fn client_exists(&self, client_id: &str) -> bool {
        self.backend.client_exists(client_id)
    }

    /// Destroy a client and gracefully flush its connection.
    ///
    /// Returns `false` if the client did not exist.
    pub fn destroy_client(&mut self, client_id: &str) -> bool {
        if !self.backend.destroy_client(client_id) {
            return false;
        }
        self.connections.flush(client_id, true);
        true
    }

    /// Refresh the client's inactivity timer.
    pub fn ping(&mut self, client_id: &str) {
        self.backend.ping(client_id);
    }

    /// Subscribe a client to a channel or pattern.
    pub fn subscribe(&mut self, client_id: &str, channel: &str) -> bool {
        self.backend.subscribe(client_id, channel)
    }

    /// Unsubscribe a client from a channel or pattern.
    pub fn unsubscribe(&mut self, client_id: &str, channel: &str) -> bool {
        self.backend.unsubscribe(client_id, channel)
    }

    /// Register a pending connect and drain queued messages into it.
    pub fn connect(&mut self, client_id: &str, options: ConnectOptions, on_flush: FlushCallback) {
        debug!(client = %client_id, timeout = ?options.timeout, "Accepting connection");
        self.backend.ping(client_id);
        let hold = options.timeout.unwrap_or(self.timeout);
        self.connections
            .get_or_create(client_id)
            .connect(hold, on_flush);
        self.backend.empty_queue(client_id, &mut self.connections);
    }

    /// Whether a connection is registered for the client.
    #[must_use]
    pub fn has_connection(&self, client_id: &str) -> bool {
        self.connections.has_connection(client_id)
    }

    /// Attach a socket, creating the connection if needed.
    pub fn open_socket(&mut self, client_id: &str, socket: Arc<dyn Socket>) {
        self.connections.open_socket(client_id, socket);
    }

    /// Deliver messages to the client's connection. Returns `false` if it
    /// has none.
    pub fn deliver(&mut self, client_id: &str, messages: Vec<Message>) -> bool {
        self.connections.deliver(client_id, messages)
    }

    /// Close the connection and its socket without flushing.
    pub fn close_connection(&mut self, client_id: &str) {
        self.connections.close(client_id);
    }

    /// Flush and tear down the client's connection.
    pub fn flush_connection(&mut self, client_id: &str, graceful: bool) {
        self.connections.flush(client_id, graceful);
    }

    /// Route a message to every matching subscriber.
    pub fn publish(&mut self, message: &Message) {
        let channels = channel::expand(message.channel_name());
        self.backend
            .publish(message, &channels, &mut self.connections);
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            backend: self.backend.stats(),
            connections: self.connections.len(),
            sockets: self
                .connections
                .connections
                .values()
                .filter(|c| c.has_socket())
                .count(),
        }
    }

    fn close(&mut self) {
        let ids: Vec<ClientId> = self.connections.connections.keys().cloned().collect();
        for client_id in ids {
            self.connections.flush(&client_id, true);
        }
        self.backend.disconnect();
    }

    fn expire_client(&mut self, expiry: &Expiry<ClientId>) {
        if let Some(client_id) = self.backend.expire(expiry) {
            debug!(client = %client_id, "Client inactive; destroying");
            self.destroy_client(&client_id);
        }
    }
}

/// Handle to a running engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
    events: EventBus,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine backed by a [`MemoryBackend`].
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backend(config, MemoryBackend::new)
    }

    /// Create an engine with a custom backend.
    #[must_use]
    pub fn with_backend<B, F>(config: EngineConfig, factory: F) -> Self
    where
        B: Backend + 'static,
        F: FnOnce(BackendContext) -> B,
    {
        info!(
            timeout = ?config.timeout,
            interval = ?config.interval,
            max_delay = ?config.max_delay,
            "Creating engine"
        );
        let events = EventBus::new(config.event_capacity);
        let shared = Arc::new_cyclic(|weak| {
            let engine = EngineRef {
                shared: weak.clone(),
            };
            let backend = factory(BackendContext {
                engine: engine.clone(),
                events: events.clone(),
                timeout: config.timeout,
            });
            Shared {
                state: Mutex::new(EngineState {
                    backend: Box::new(backend),
                    connections: Connections::new(engine, events.clone(), config.max_delay),
                    timeout: config.timeout,
                }),
            }
        });

        Self {
            shared,
            events,
            config,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Default connection hold time.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Advertised reconnect interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// The lifecycle event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a lifecycle observer.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Run `f` with exclusive access to the engine state.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.shared.state.lock();
        f(&mut state)
    }

    /// Allocate a new client.
    pub fn create_client(&self) -> ClientId {
        self.transaction(EngineState::create_client)
    }

    /// Whether the client id is live.
    #[must_use]
    pub fn client_exists(&self, client_id: &str) -> bool {
        self.transaction(|state| state.client_exists(client_id))
    }

    /// Destroy a client. Idempotent.
    pub fn destroy_client(&self, client_id: &str) -> bool {
        self.transaction(|state| state.destroy_client(client_id))
    }

    /// Refresh the client's inactivity timer.
    pub fn ping(&self, client_id: &str) {
        self.transaction(|state| state.ping(client_id));
    }

    /// Subscribe a client to a channel or pattern.
    pub fn subscribe(&self, client_id: &str, channel: &str) -> bool {
        self.transaction(|state| state.subscribe(client_id, channel))
    }

    /// Unsubscribe a client from a channel or pattern.
    pub fn unsubscribe(&self, client_id: &str, channel: &str) -> bool {
        self.transaction(|state| state.unsubscribe(client_id, channel))
    }

    /// Register a pending connect. `on_flush` is called exactly once with
    /// the messages that answer it, unless a later connect supersedes it.
    pub fn connect(&self, client_id: &str, options: ConnectOptions, on_flush: FlushCallback) {
        self.transaction(|state| state.connect(client_id, options, on_flush));
    }

    /// Whether a connection is registered for the client.
    #[must_use]
    pub fn has_connection(&self, client_id: &str) -> bool {
        self.transaction(|state| state.has_connection(client_id))
    }

    /// Attach a live socket to a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or not live.
    pub fn open_socket(&self, client_id: &str, socket: Arc<dyn Socket>) -> Result<(), EngineError> {
        if client_id.is_empty() {
            return Err(EngineError::MissingClientId);
        }
        self.transaction(|state| {
            if !state.client_exists(client_id) {
                return Err(EngineError::UnknownClient(client_id.to_string()));
            }
            state.open_socket(client_id, socket);
            Ok(())
        })
    }

    /// Deliver messages to the client's connection.
    pub fn deliver(&self, client_id: &str, messages: Vec<Message>) -> bool {
        self.transaction(|state| state.deliver(client_id, messages))
    }

    /// Close the client's connection without flushing it.
    pub fn close_connection(&self, client_id: &str) {
        self.transaction(|state| state.close_connection(client_id));
    }

    /// Flush and tear down the client's connection.
    pub fn flush_connection(&self, client_id: &str, graceful: bool) {
        self.transaction(|state| state.flush_connection(client_id, graceful));
    }

    /// Route a message to every matching subscriber.
    pub fn publish(&self, message: &Message) {
        self.transaction(|state| state.publish(message));
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.transaction(|state| state.stats())
    }

    /// Flush every connection and reset the backend.
    pub fn close(&self) {
        info!("Closing engine");
        self.transaction(EngineState::close);
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    fn engine(timeout_ms: u64) -> Engine {
        Engine::new(EngineConfig {
            timeout: Duration::from_millis(timeout_ms),
            ..EngineConfig::default()
        })
    }

    fn waiter() -> (oneshot::Receiver<Vec<Message>>, FlushCallback) {
        let (tx, rx) = oneshot::channel();
        (
            rx,
            Box::new(move |messages| {
                let _ = tx.send(messages);
            }),
        )
    }

    #[derive(Default)]
    struct RecordingSocket {
        sent: Mutex<Vec<Message>>,
        closed: Mutex<bool>,
    }

    impl Socket for RecordingSocket {
        fn send(&self, message: Message) {
            self.sent.lock().push(message);
        }

        fn close(&self) {
            *self.closed.lock() = true;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_timeout_flushes_once() {
        let engine = engine(60_000);
        let id = engine.create_client();
        let (rx, on_flush) = waiter();

        let started = Instant::now();
        engine.connect(
            &id,
            ConnectOptions {
                timeout: Some(Duration::from_millis(500)),
            },
            on_flush,
        );

        let messages = rx.await.unwrap();
        let elapsed = started.elapsed();
        assert!(messages.is_empty());
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(510));
        assert!(!engine.has_connection(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_answers_pending_connect() {
        let engine = engine(60_000);
        let id = engine.create_client();
        engine.subscribe(&id, "/foo/*");

        let (rx, on_flush) = waiter();
        engine.connect(&id, ConnectOptions::default(), on_flush);
        engine.publish(&Message::publish("/foo/bar", json!("hi")).with_client_id("someone"));

        let messages = rx.await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel_name(), "/foo/bar");
        assert!(messages[0].client_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_drains_queued_messages() {
        let engine = engine(60_000);
        let id = engine.create_client();
        engine.subscribe(&id, "/**");
        engine.publish(&Message::publish("/a", json!(1)));
        engine.publish(&Message::publish("/a/b", json!(2)));
        assert_eq!(engine.stats().backend.queued, 2);

        let (rx, on_flush) = waiter();
        engine.connect(&id, ConnectOptions::default(), on_flush);
        assert_eq!(rx.await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_requires_messages_and_connection() {
        let engine = engine(60_000);
        let id = engine.create_client();
        assert!(!engine.deliver(&id, vec![Message::new("/a")]));

        let (_rx, on_flush) = waiter();
        engine.connect(&id, ConnectOptions::default(), on_flush);
        assert!(!engine.deliver(&id, Vec::new()));
        assert!(engine.deliver(&id, vec![Message::new("/a")]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_in_one_tick_share_a_flush() {
        let engine = engine(60_000);
        let id = engine.create_client();
        engine.subscribe(&id, "/chat");

        let (rx, on_flush) = waiter();
        engine.connect(&id, ConnectOptions::default(), on_flush);
        engine.publish(&Message::publish("/chat", json!(1)));
        engine.publish(&Message::publish("/chat", json!(2)));

        let messages = rx.await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].data, Some(json!(1)));
        assert_eq!(messages[1].data, Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_delay_batches_deliveries() {
        let engine = Engine::new(EngineConfig {
            timeout: Duration::from_secs(60),
            max_delay: Duration::from_millis(50),
            ..EngineConfig::default()
        });
        let id = engine.create_client();
        engine.subscribe(&id, "/chat");

        let (mut rx, on_flush) = waiter();
        let started = Instant::now();
        engine.connect(&id, ConnectOptions::default(), on_flush);
        engine.publish(&Message::publish("/chat", json!(1)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        engine.publish(&Message::publish("/chat", json!(2)));

        let messages = rx.await.unwrap();
        let elapsed = started.elapsed();
        assert_eq!(messages.len(), 2);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_client_is_destroyed() {
        let engine = engine(100);
        let mut events = engine.subscribe_events();
        let id = engine.create_client();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.client_exists(&id));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!engine.client_exists(&id));

        let names: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(names, ["handshake", "disconnect", "close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_defers_destruction() {
        let engine = engine(100);
        let id = engine.create_client();

        tokio::time::sleep(Duration::from_millis(150)).await;
        engine.ping(&id);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.client_exists(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_client_is_idempotent() {
        let engine = engine(60_000);
        let id = engine.create_client();
        let (rx, on_flush) = waiter();
        engine.connect(&id, ConnectOptions::default(), on_flush);

        assert!(engine.destroy_client(&id));
        assert!(!engine.destroy_client(&id));
        assert!(rx.await.unwrap().is_empty());
        assert!(!engine.has_connection(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_delivery_and_close() {
        let engine = engine(60_000);
        let id = engine.create_client();
        engine.subscribe(&id, "/chat");

        let socket = Arc::new(RecordingSocket::default());
        engine.open_socket(&id, socket.clone()).unwrap();
        engine.publish(&Message::publish("/chat", json!("hello")));
        assert_eq!(socket.sent.lock().len(), 1);

        engine.close_connection(&id);
        assert!(*socket.closed.lock());
        assert!(!engine.has_connection(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_graceful_flush_leaves_socket_open() {
        let engine = engine(60_000);
        let id = engine.create_client();
        let socket = Arc::new(RecordingSocket::default());
        engine.open_socket(&id, socket.clone()).unwrap();

        engine.flush_connection(&id, false);
        assert!(!*socket.closed.lock());
        assert!(!engine.has_connection(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_socket_rejects_unknown_client() {
        let engine = engine(60_000);
        let socket: Arc<dyn Socket> = Arc::new(RecordingSocket::default());

        assert_eq!(
            engine.open_socket("", socket.clone()),
            Err(EngineError::MissingClientId)
        );
        assert_eq!(
            engine.open_socket("ghost", socket),
            Err(EngineError::UnknownClient("ghost".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_events() {
        let engine = engine(60_000);
        let id = engine.create_client();
        let mut events = engine.subscribe_events();

        let (_rx, on_flush) = waiter();
        engine.connect(&id, ConnectOptions::default(), on_flush);
        engine.flush_connection(&id, true);

        let names: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(names, ["connection:open", "connection:close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_everything() {
        let engine = engine(60_000);
        let id = engine.create_client();
        let (rx, on_flush) = waiter();
        engine.connect(&id, ConnectOptions::default(), on_flush);

        engine.close();
        assert!(rx.await.unwrap().is_empty());
        assert!(!engine.client_exists(&id));
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[test]
    fn test_connect_options_from_advice() {
        let advice = Advice {
            timeout: Some(1500),
            ..Advice::default()
        };
        assert_eq!(
            ConnectOptions::from_advice(Some(&advice)).timeout,
            Some(Duration::from_millis(1500))
        );
        assert_eq!(ConnectOptions::from_advice(None).timeout, None);
    }
}
