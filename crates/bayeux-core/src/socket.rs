//! Transport seam.
//!
//! Transport adapters hand the engine a [`Socket`] when a client has a live
//! push-capable connection (WebSocket, EventSource, raw TCP). Implementations
//! must not block: `send` typically enqueues onto a writer task.

use bayeux_protocol::Message;
use std::collections::HashMap;
use std::fmt;

/// A live transport attached to a client.
pub trait Socket: Send + Sync {
    /// Queue a message for delivery to the client.
    fn send(&self, message: Message);

    /// Close the underlying transport.
    fn close(&self);
}

impl fmt::Debug for dyn Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Socket")
    }
}

/// Context of the request that carried a batch of messages.
///
/// Opaque to the engine; extensions that declare they need it receive it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Transport that carried the request (e.g. `"http"`, `"websocket"`).
    pub transport: String,
    /// Remote peer address, if known.
    pub remote_addr: Option<String>,
    /// Request headers, lower-cased names.
    pub headers: HashMap<String, String>,
}

impl RequestContext {
    /// Create a context for a transport.
    #[must_use]
    pub fn new(transport: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            ..Self::default()
        }
    }

    /// Set the remote address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header by name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_headers() {
        let ctx = RequestContext::new("http")
            .with_remote_addr("127.0.0.1:9000")
            .with_header("Origin", "https://example.com");

        assert_eq!(ctx.header("origin"), Some("https://example.com"));
        assert_eq!(ctx.header("ORIGIN"), Some("https://example.com"));
        assert_eq!(ctx.header("cookie"), None);
        assert_eq!(ctx.remote_addr.as_deref(), Some("127.0.0.1:9000"));
    }
}
