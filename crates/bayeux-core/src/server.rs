//! Bayeux protocol handling.
//!
//! [`Server`] validates incoming messages, dispatches meta messages to
//! their handlers, routes publishes through the engine and runs both
//! extension stages. Transport adapters call [`Server::process`] with each
//! decoded batch and send back whatever it returns.

use crate::engine::{ConnectOptions, Engine, EngineError};
use crate::extensions::{Extension, ExtensionPipeline, Stage};
use crate::socket::{RequestContext, Socket};
use bayeux_protocol::channel;
use bayeux_protocol::version::{is_supported_connection_type, EVENTSOURCE};
use bayeux_protocol::{
    Advice, Message, ProtocolError, Reconnect, Subscription, Version, BAYEUX_VERSION,
    CONNECTION_TYPES,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Meta channels with a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaMethod {
    Handshake,
    Connect,
    Disconnect,
    Subscribe,
    Unsubscribe,
}

impl MetaMethod {
    /// Resolve an exact `/meta/<method>` channel.
    fn from_channel(name: &str) -> Option<Self> {
        match name {
            channel::HANDSHAKE => Some(Self::Handshake),
            channel::CONNECT => Some(Self::Connect),
            channel::DISCONNECT => Some(Self::Disconnect),
            channel::SUBSCRIBE => Some(Self::Subscribe),
            channel::UNSUBSCRIBE => Some(Self::Unsubscribe),
            _ => None,
        }
    }
}

/// The protocol front of an [`Engine`].
#[derive(Debug, Clone)]
pub struct Server {
    engine: Engine,
    extensions: ExtensionPipeline,
}

impl Server {
    /// Wrap an engine.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            extensions: ExtensionPipeline::new(),
        }
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Register an extension at the end of the pipeline.
    pub fn add_extension(&self, extension: Arc<dyn Extension>) {
        self.extensions.add(extension);
    }

    /// Remove an extension. Returns `true` if it was registered.
    pub fn remove_extension(&self, extension: &Arc<dyn Extension>) -> bool {
        self.extensions.remove(extension)
    }

    /// Shut the engine down.
    pub fn close(&self) {
        self.engine.close();
    }

    /// Attach a live transport to a client.
    ///
    /// Messages sent through the socket pass the outgoing extension stage
    /// first, with `request` as their context.
    ///
    /// # Errors
    ///
    /// Returns an error if the client id is empty or not live.
    pub fn open_socket(
        &self,
        client_id: &str,
        socket: Arc<dyn Socket>,
        request: Option<RequestContext>,
    ) -> Result<(), EngineError> {
        let piped = PipedSocket::spawn(socket, self.extensions.clone(), request);
        self.engine.open_socket(client_id, Arc::new(piped))
    }

    /// Detach a client's transport and flush its connection.
    ///
    /// With `graceful` the socket is closed; otherwise it is left open so
    /// the transport can rebind it to another client.
    pub fn close_socket(&self, client_id: &str, graceful: bool) {
        self.engine.flush_connection(client_id, graceful);
    }

    /// Process a batch of messages and return the replies.
    ///
    /// Each message runs through the incoming stage, its handler and the
    /// outgoing stage independently; replies keep the input order. A batch
    /// processed without a request context is trusted and may subscribe to
    /// meta and service channels.
    pub async fn process(
        &self,
        messages: Vec<Message>,
        request: Option<&RequestContext>,
    ) -> Vec<Message> {
        let local = request.is_none();
        trace!(count = messages.len(), local, "Processing batch");

        let handled = messages
            .into_iter()
            .map(|message| self.process_one(message, request, local));
        join_all(handled).await.into_iter().flatten().collect()
    }

    async fn process_one(
        &self,
        message: Message,
        request: Option<&RequestContext>,
        local: bool,
    ) -> Vec<Message> {
        let Some(message) = self.extensions.pipe(Stage::Incoming, message, request).await else {
            return Vec::new();
        };

        let replies = self.handle(message, local).await;
        let piped = replies
            .into_iter()
            .map(|reply| self.extensions.pipe(Stage::Outgoing, reply, request));
        join_all(piped).await.into_iter().flatten().collect()
    }

    async fn handle(&self, message: Message, local: bool) -> Vec<Message> {
        let name = message.channel_name();

        if channel::is_meta(name) {
            return self.handle_meta(message, local).await;
        }

        let mut response = Message::response_to(&message);
        if !channel::is_name(name) {
            response.fail(ProtocolError::channel_invalid([name]));
        }
        if !response.has_error() {
            self.engine.publish(&message);
        } else {
            debug!(channel = %name, error = ?response.error, "Publish rejected");
        }
        vec![response]
    }

    async fn handle_meta(&self, message: Message, local: bool) -> Vec<Message> {
        let Some(method) = MetaMethod::from_channel(message.channel_name()) else {
            let mut response = Message::response_to(&message);
            response.fail(ProtocolError::channel_forbidden([message.channel_name()]));
            return vec![response];
        };

        let connection_type = message.connection_type.clone();
        let mut responses = match method {
            MetaMethod::Handshake => vec![self.handshake(&message)],
            MetaMethod::Connect => self.connect(&message).await,
            MetaMethod::Disconnect => vec![self.disconnect(&message)],
            MetaMethod::Subscribe => vec![self.subscribe(&message, local)],
            MetaMethod::Unsubscribe => vec![self.unsubscribe(&message, local)],
        };

        if let Some(response) = responses.first_mut() {
            self.advise(response, connection_type.as_deref());
        }
        responses
    }

    fn handshake(&self, message: &Message) -> Message {
        let mut response = Message::response_to(message);
        response.version = Some(BAYEUX_VERSION.to_string());
        response.supported_connection_types =
            Some(CONNECTION_TYPES.iter().map(ToString::to_string).collect());

        match message.version.as_deref() {
            None => response.fail(ProtocolError::parameter_missing(["version"])),
            Some(version) => {
                let compatible = version
                    .parse::<Version>()
                    .is_ok_and(|v| v.is_compatible_with(&BAYEUX_VERSION));
                if !compatible {
                    response.fail(ProtocolError::version_mismatch([version]));
                }
            }
        }

        match &message.supported_connection_types {
            None => response.fail(ProtocolError::parameter_missing([
                "supportedConnectionTypes",
            ])),
            Some(types) => {
                if !types.iter().any(|t| is_supported_connection_type(t)) {
                    response.fail(ProtocolError::conntype_mismatch(
                        types.iter().map(String::as_str),
                    ));
                }
            }
        }

        if response.has_error() {
            debug!(error = ?response.error, "Handshake rejected");
            response.client_id = None;
            return response;
        }

        response.client_id = Some(self.engine.create_client());
        response
    }

    async fn connect(&self, message: &Message) -> Vec<Message> {
        let mut response = Message::response_to(message);
        let client_id = message.client_id.as_deref();
        let connection_type = message.connection_type.as_deref();
        let (tx, rx) = oneshot::channel();

        let accepted = self.engine.transaction(|state| {
            if !client_id.is_some_and(|id| state.client_exists(id)) {
                response.fail(ProtocolError::client_unknown([client_id.unwrap_or_default()]));
            }
            if client_id.is_none() {
                response.fail(ProtocolError::parameter_missing(["clientId"]));
            }
            if !connection_type.is_some_and(is_supported_connection_type) {
                response.fail(ProtocolError::conntype_mismatch([
                    connection_type.unwrap_or_default()
                ]));
            }
            if connection_type.is_none() {
                response.fail(ProtocolError::parameter_missing(["connectionType"]));
            }

            let Some(client_id) = client_id.filter(|_| !response.has_error()) else {
                return false;
            };

            let mut options = ConnectOptions::from_advice(message.advice.as_ref());
            if connection_type == Some(EVENTSOURCE) {
                options.timeout = Some(Duration::ZERO);
            }
            state.connect(
                client_id,
                options,
                Box::new(move |messages| {
                    let _ = tx.send(messages);
                }),
            );
            true
        });

        if !accepted {
            debug!(error = ?response.error, "Connect rejected");
            response.client_id = None;
            return vec![response];
        }

        let delivered = rx.await.unwrap_or_else(|_| {
            trace!(client = ?client_id, "Connect superseded");
            Vec::new()
        });

        let mut replies = Vec::with_capacity(delivered.len() + 1);
        replies.push(response);
        replies.extend(delivered);
        replies
    }

    fn disconnect(&self, message: &Message) -> Message {
        let mut response = Message::response_to(message);
        let client_id = message.client_id.as_deref();

        self.engine.transaction(|state| {
            if !client_id.is_some_and(|id| state.client_exists(id)) {
                response.fail(ProtocolError::client_unknown([client_id.unwrap_or_default()]));
            }
            if client_id.is_none() {
                response.fail(ProtocolError::parameter_missing(["clientId"]));
            }
            if let Some(client_id) = client_id.filter(|_| !response.has_error()) {
                state.destroy_client(client_id);
            }
        });

        if response.has_error() {
            response.client_id = None;
        }
        response
    }

    fn subscribe(&self, message: &Message, local: bool) -> Message {
        self.change_subscription(message, local, true)
    }

    fn unsubscribe(&self, message: &Message, local: bool) -> Message {
        self.change_subscription(message, local, false)
    }

    fn change_subscription(&self, message: &Message, local: bool, subscribe: bool) -> Message {
        let mut response = Message::response_to(message);
        let client_id = message.client_id.as_deref();
        let requested = message.subscription.as_ref();

        self.engine.transaction(|state| {
            if !client_id.is_some_and(|id| state.client_exists(id)) {
                response.fail(ProtocolError::client_unknown([client_id.unwrap_or_default()]));
            }
            if client_id.is_none() {
                response.fail(ProtocolError::parameter_missing(["clientId"]));
            }
            if requested.map_or(true, Subscription::is_empty) {
                response.fail(ProtocolError::parameter_missing(["subscription"]));
            }
            response.subscription = Some(requested.cloned().unwrap_or_default());

            let (Some(client_id), Some(requested)) = (client_id, requested) else {
                return;
            };
            for name in requested.channels() {
                if response.has_error() {
                    break;
                }
                if !local && !channel::is_subscribable(name) {
                    response.fail(ProtocolError::channel_forbidden([name]));
                }
                if !channel::is_valid(name) {
                    response.fail(ProtocolError::channel_invalid([name]));
                }
                if response.has_error() {
                    break;
                }

                if subscribe {
                    state.subscribe(client_id, name);
                } else {
                    state.unsubscribe(client_id, name);
                }
            }
        });

        if response.has_error() {
            debug!(client = ?client_id, error = ?response.error, subscribe, "Subscription change rejected");
        }
        response
    }

    /// Attach reconnect advice to handshake and connect responses.
    fn advise(&self, response: &mut Message, connection_type: Option<&str>) {
        let name = response.channel_name();
        if name != channel::HANDSHAKE && name != channel::CONNECT {
            return;
        }

        let (interval, timeout) = if connection_type == Some(EVENTSOURCE) {
            (self.engine.timeout(), Duration::ZERO)
        } else {
            (self.engine.interval(), self.engine.timeout())
        };

        let failed = response.has_error();
        let advice = response.advice.get_or_insert_with(Advice::default);
        if failed {
            advice.reconnect = Some(Reconnect::Handshake);
        } else {
            advice.reconnect = Some(Reconnect::Retry);
            advice.interval = Some(millis(interval));
            advice.timeout = Some(millis(timeout));
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

enum SocketCommand {
    Send(Message),
    Close,
}

/// Runs outgoing extensions before handing messages to the transport.
///
/// The engine sends with its lock held, so work is handed to a task.
struct PipedSocket {
    commands: mpsc::UnboundedSender<SocketCommand>,
}

impl PipedSocket {
    fn spawn(
        inner: Arc<dyn Socket>,
        extensions: ExtensionPipeline,
        request: Option<RequestContext>,
    ) -> Self {
        let (commands, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    SocketCommand::Send(message) => {
                        if let Some(message) = extensions
                            .pipe(Stage::Outgoing, message, request.as_ref())
                            .await
                        {
                            inner.send(message);
                        }
                    }
                    SocketCommand::Close => {
                        inner.close();
                        break;
                    }
                }
            }
        });
        Self { commands }
    }

    fn command(&self, command: SocketCommand) {
        if self.commands.send(command).is_err() {
            warn!("Socket writer has stopped");
        }
    }
}

impl Socket for PipedSocket {
    fn send(&self, message: Message) {
        self.command(SocketCommand::Send(message));
    }

    fn close(&self) {
        self.command(SocketCommand::Close);
    }
}
