//! Per-client connection state.
//!
//! A [`ClientConnection`] buffers messages for one client and decides when
//! they are handed to the transport. Long-poll connections are answered
//! through a one-shot flush callback; socket connections receive messages
//! as soon as they are delivered.

use crate::engine::{EngineRef, FlushCallback};
use crate::namespace::ClientId;
use crate::socket::Socket;
use crate::timeouts::{DeferredScheduler, Expiry};
use bayeux_protocol::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Timers owned by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionTimer {
    /// Bounded delay before queued messages are flushed.
    Delivery,
    /// Long-poll hold; guarantees a response once it elapses.
    Hold,
}

/// Mailbox and timer state for one client.
pub struct ClientConnection {
    client_id: ClientId,
    mailbox: Vec<Message>,
    socket: Option<Arc<dyn Socket>>,
    on_flush: Option<FlushCallback>,
    timers: DeferredScheduler<ConnectionTimer>,
    max_delay: Duration,
    engine: EngineRef,
}

impl ClientConnection {
    /// Create an empty connection.
    #[must_use]
    pub fn new(client_id: impl Into<ClientId>, engine: EngineRef, max_delay: Duration) -> Self {
        Self {
            client_id: client_id.into(),
            mailbox: Vec::new(),
            socket: None,
            on_flush: None,
            timers: DeferredScheduler::new(),
            max_delay,
            engine,
        }
    }

    /// The client this connection belongs to.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Number of messages waiting for a flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Whether a live socket is attached.
    #[must_use]
    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }

    /// Whether a long-poll response is waiting for a flush.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.on_flush.is_some()
    }

    /// Whether the given timer is armed.
    #[must_use]
    pub fn is_armed(&self, timer: ConnectionTimer) -> bool {
        self.timers.is_pending(&timer)
    }

    /// Attach a live socket; later deliveries bypass the mailbox.
    pub fn attach_socket(&mut self, socket: Arc<dyn Socket>) {
        self.socket = Some(socket);
    }

    /// Detach the socket without closing it.
    pub fn detach_socket(&mut self) -> Option<Arc<dyn Socket>> {
        self.socket.take()
    }

    /// Deliver a message to the client.
    ///
    /// The `clientId` field is stripped. With a socket attached the message
    /// is sent immediately; otherwise it is queued and the delivery timer
    /// is armed.
    pub fn deliver(&mut self, mut message: Message) {
        message.client_id = None;

        if let Some(socket) = &self.socket {
            trace!(client = %self.client_id, channel = %message.channel_name(), "Sending over socket");
            socket.send(message);
            return;
        }

        self.mailbox.push(message);
        self.begin_delivery_timeout();
    }

    /// Register a pending long-poll response and arm the timers.
    ///
    /// `hold` bounds how long the response may be withheld when nothing is
    /// delivered. Replacing an earlier callback drops it unanswered.
    pub fn connect(&mut self, hold: Duration, on_flush: FlushCallback) {
        if self.on_flush.replace(on_flush).is_some() {
            debug!(client = %self.client_id, "Superseding pending connect");
        }
        self.begin_delivery_timeout();
        self.begin_connection_timeout(hold);
    }

    /// Hand the mailbox to the pending response.
    ///
    /// Cancels both timers and consumes the flush callback. Returns `true`
    /// if a socket is attached and the connection should persist.
    pub fn flush(&mut self) -> bool {
        self.timers.cancel(&ConnectionTimer::Hold);
        self.timers.cancel(&ConnectionTimer::Delivery);

        let messages = std::mem::take(&mut self.mailbox);
        trace!(client = %self.client_id, count = messages.len(), "Flushing connection");
        if let Some(on_flush) = self.on_flush.take() {
            on_flush(messages);
        }

        self.socket.is_some()
    }

    /// Claim an elapsed timer of this connection.
    pub(crate) fn claim(&mut self, expiry: &Expiry<ConnectionTimer>) -> bool {
        self.timers.expire(expiry)
    }

    /// Close and release the attached socket, if any.
    pub(crate) fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
    }

    fn begin_delivery_timeout(&mut self) {
        if self.mailbox.is_empty() {
            return;
        }
        let on_expire = self.engine.connection_timer(self.client_id.clone());
        self.timers
            .schedule(ConnectionTimer::Delivery, self.max_delay, on_expire);
    }

    fn begin_connection_timeout(&mut self, hold: Duration) {
        let on_expire = self.engine.connection_timer(self.client_id.clone());
        self.timers.schedule(ConnectionTimer::Hold, hold, on_expire);
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("client_id", &self.client_id)
            .field("pending", &self.mailbox.len())
            .field("socket", &self.socket.is_some())
            .field("waiting", &self.on_flush.is_some())
            .finish()
    }
}
