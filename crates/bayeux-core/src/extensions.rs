//! Message extensions.
//!
//! Extensions observe and rewrite messages on their way into and out of the
//! server. Each one declares, per stage, whether it has a hook and whether
//! the hook wants the request context. Returning `None` from a hook drops
//! the message.

use crate::socket::RequestContext;
use async_trait::async_trait;
use bayeux_protocol::Message;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Pipeline direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Messages received from clients.
    Incoming,
    /// Responses and deliveries sent to clients.
    Outgoing,
}

/// What an extension implements for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hook {
    /// No hook; the stage passes the message through.
    #[default]
    Absent,
    /// The hook takes the message only.
    Message,
    /// The hook takes the message and the request context.
    MessageAndRequest,
}

/// A message extension.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Which hook this extension implements for `stage`.
    fn hook(&self, stage: Stage) -> Hook;

    /// Called once when the extension is added to a server.
    fn added(&self) {}

    /// Called once when the extension is removed from a server.
    fn removed(&self) {}

    async fn incoming(
        &self,
        message: Message,
        _request: Option<&RequestContext>,
    ) -> Option<Message> {
        Some(message)
    }

    async fn outgoing(
        &self,
        message: Message,
        _request: Option<&RequestContext>,
    ) -> Option<Message> {
        Some(message)
    }
}

/// An ordered, shared list of extensions.
#[derive(Clone, Default)]
pub struct ExtensionPipeline {
    extensions: Arc<RwLock<Vec<Arc<dyn Extension>>>>,
}

impl ExtensionPipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extension.
    pub fn add(&self, extension: Arc<dyn Extension>) {
        self.extensions.write().push(extension.clone());
        debug!(count = self.len(), "Extension added");
        extension.added();
    }

    /// Remove every occurrence of an extension. Returns `true` if it was
    /// present.
    pub fn remove(&self, extension: &Arc<dyn Extension>) -> bool {
        let removed = {
            let mut extensions = self.extensions.write();
            let before = extensions.len();
            extensions.retain(|e| !Arc::ptr_eq(e, extension));
            before - extensions.len()
        };
        for _ in 0..removed {
            extension.removed();
        }
        if removed > 0 {
            debug!(count = self.len(), "Extension removed");
        }
        removed > 0
    }

    /// Number of registered extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.read().len()
    }

    /// Whether no extensions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.read().is_empty()
    }

    /// Thread `message` through every extension's hook for `stage`, in
    /// registration order. Stops at the first hook that drops it.
    pub async fn pipe(
        &self,
        stage: Stage,
        message: Message,
        request: Option<&RequestContext>,
    ) -> Option<Message> {
        let chain: Vec<Arc<dyn Extension>> = self.extensions.read().clone();
        let mut message = message;

        for extension in chain {
            let request = match extension.hook(stage) {
                Hook::Absent => continue,
                Hook::Message => None,
                Hook::MessageAndRequest => request,
            };
            let next = match stage {
                Stage::Incoming => extension.incoming(message, request).await,
                Stage::Outgoing => extension.outgoing(message, request).await,
            };
            match next {
                Some(next) => message = next,
                None => {
                    trace!(?stage, "Message dropped by extension");
                    return None;
                }
            }
        }

        Some(message)
    }
}

impl std::fmt::Debug for ExtensionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionPipeline")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tags incoming messages with its name in `ext.seen`.
    struct Tagger(&'static str);

    #[async_trait]
    impl Extension for Tagger {
        fn hook(&self, stage: Stage) -> Hook {
            match stage {
                Stage::Incoming => Hook::Message,
                Stage::Outgoing => Hook::Absent,
            }
        }

        async fn incoming(
            &self,
            mut message: Message,
            _request: Option<&RequestContext>,
        ) -> Option<Message> {
            let mut seen = message
                .ext
                .as_ref()
                .and_then(|ext| ext["seen"].as_array().cloned())
                .unwrap_or_default();
            seen.push(json!(self.0));
            message.ext = Some(json!({ "seen": seen }));
            Some(message)
        }
    }

    /// Drops every outgoing message and counts lifecycle calls.
    #[derive(Default)]
    struct Blackhole {
        added: AtomicUsize,
        removed: AtomicUsize,
    }

    #[async_trait]
    impl Extension for Blackhole {
        fn hook(&self, stage: Stage) -> Hook {
            match stage {
                Stage::Incoming => Hook::Absent,
                Stage::Outgoing => Hook::Message,
            }
        }

        fn added(&self) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }

        fn removed(&self) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }

        async fn outgoing(
            &self,
            _message: Message,
            _request: Option<&RequestContext>,
        ) -> Option<Message> {
            None
        }
    }

    /// Records whether it was handed the request context.
    struct Inspector;

    #[async_trait]
    impl Extension for Inspector {
        fn hook(&self, _stage: Stage) -> Hook {
            Hook::MessageAndRequest
        }

        async fn incoming(
            &self,
            mut message: Message,
            request: Option<&RequestContext>,
        ) -> Option<Message> {
            message.ext = request.map(|r| json!({ "transport": r.transport }));
            Some(message)
        }
    }

    #[tokio::test]
    async fn test_incoming_runs_in_order() {
        let pipeline = ExtensionPipeline::new();
        pipeline.add(Arc::new(Tagger("a")));
        pipeline.add(Arc::new(Tagger("b")));

        let out = pipeline
            .pipe(
                Stage::Incoming,
                Message::new("/x").with_ext(json!({ "seen": ["client"] })),
                None,
            )
            .await
            .unwrap();
        assert_eq!(out.ext, Some(json!({ "seen": ["client", "a", "b"] })));
    }

    #[tokio::test]
    async fn test_absent_hook_is_skipped() {
        let pipeline = ExtensionPipeline::new();
        pipeline.add(Arc::new(Blackhole::default()));

        let message = Message::new("/x");
        let out = pipeline.pipe(Stage::Incoming, message.clone(), None).await;
        assert_eq!(out, Some(message.clone()));
        assert!(pipeline.pipe(Stage::Outgoing, message, None).await.is_none());
    }

    #[tokio::test]
    async fn test_request_passed_only_when_declared() {
        let pipeline = ExtensionPipeline::new();
        pipeline.add(Arc::new(Inspector));

        let request = RequestContext::new("websocket");
        let out = pipeline
            .pipe(Stage::Incoming, Message::new("/x"), Some(&request))
            .await
            .unwrap();
        assert_eq!(out.ext, Some(json!({ "transport": "websocket" })));
    }

    #[test]
    fn test_add_remove_lifecycle() {
        let pipeline = ExtensionPipeline::new();
        let blackhole = Arc::new(Blackhole::default());
        let extension: Arc<dyn Extension> = blackhole.clone();

        pipeline.add(extension.clone());
        assert_eq!(pipeline.len(), 1);
        assert_eq!(blackhole.added.load(Ordering::SeqCst), 1);

        assert!(pipeline.remove(&extension));
        assert!(!pipeline.remove(&extension));
        assert!(pipeline.is_empty());
        assert_eq!(blackhole.removed.load(Ordering::SeqCst), 1);
    }
}
