//! # bayeux-protocol
//!
//! Wire protocol definitions for the Bayeux publish/subscribe engine.
//!
//! This crate is pure: it defines channel names, message envelopes,
//! the protocol error catalog and the JSON batch codec, with no runtime
//! state.
//!
//! ## Channels
//!
//! - `/meta/*` - protocol control (handshake, connect, subscribe, ...)
//! - `/service/*` - point-to-point, not subscribable by remote clients
//! - anything else - broadcast channels, subscribable with `*` / `**`
//!
//! ## Example
//!
//! ```rust
//! use bayeux_protocol::{channel, codec, Message};
//!
//! assert_eq!(channel::expand("/foo/bar"), ["/**", "/foo/bar", "/foo/*", "/foo/**"]);
//!
//! let batch = codec::decode(br#"{"channel":"/chat","data":"hi"}"#).unwrap();
//! let encoded = codec::encode(&batch).unwrap();
//! assert_eq!(&encoded[..], br#"[{"channel":"/chat","data":"hi"}]"#);
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod version;

pub use codec::{decode, encode, CodecError};
pub use error::{ErrorCode, ProtocolError};
pub use message::{client_id_from_messages, Advice, Message, Reconnect, Subscription};
pub use version::{Version, BAYEUX_VERSION, CONNECTION_TYPES};
