//! # bayeux-core
//!
//! Engine, state backend and protocol handling for the Bayeux broker.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Server** - Validates and dispatches Bayeux messages
//! - **Engine** - Client lifecycle, subscriptions and delivery
//! - **Backend** - Pluggable client/subscription/queue state
//! - **Connection** - Per-client mailbox with long-poll and socket delivery
//! - **Extensions** - Incoming/outgoing message hooks
//! - **Events** - Lifecycle notifications
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│   Server    │────▶│   Engine    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//!        │            ┌─────────────┐     ┌─────────────┐
//!        │            │ Extensions  │     │   Backend   │
//!        │            └─────────────┘     └─────────────┘
//!        │                                       │
//!        │            ┌─────────────┐            │
//!        └────────────│ Connection  │◀───────────┘
//!                     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use bayeux_core::{Engine, EngineConfig, Server};
//! use bayeux_protocol::Message;
//!
//! # async fn run() {
//! let server = Server::new(Engine::new(EngineConfig::default()));
//! let handshake = Message {
//!     version: Some("1.0".into()),
//!     supported_connection_types: Some(vec!["long-polling".into()]),
//!     ..Message::new("/meta/handshake")
//! };
//! let replies = server.process(vec![handshake], None).await;
//! assert_eq!(replies[0].successful, Some(true));
//! # }
//! ```

pub mod backend;
pub mod connection;
pub mod engine;
pub mod events;
pub mod extensions;
pub mod namespace;
pub mod server;
pub mod socket;
pub mod timeouts;

pub use backend::{Backend, BackendContext, BackendStats, Delivery, MemoryBackend};
pub use connection::ClientConnection;
pub use engine::{
    ConnectOptions, Engine, EngineConfig, EngineError, EngineRef, EngineState, EngineStats,
    FlushCallback,
};
pub use events::{Event, EventBus};
pub use extensions::{Extension, ExtensionPipeline, Hook, Stage};
pub use namespace::{ClientId, Namespace};
pub use server::Server;
pub use socket::{RequestContext, Socket};
