//! EventSource transport.
//!
//! `GET {mount}/{clientId}` opens a server-sent event stream bound to an
//! existing client. Each delivered message is sent as one event whose data
//! is a one-element JSON array. Clients send their own messages over HTTP.

use crate::handlers::{bad_request, request_context, AppState};
use crate::metrics::{self, ConnectionMetricsGuard};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use bayeux_core::{Server, Socket};
use bayeux_protocol::{codec, Message};
use futures_util::stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

enum Outbound {
    Send(Message),
    Close,
}

/// The engine's handle on an event stream.
struct EventSourceHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Socket for EventSourceHandle {
    fn send(&self, message: Message) {
        let _ = self.outbound.send(Outbound::Send(message));
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Releases the client's connection when the stream is dropped.
struct StreamGuard {
    server: Server,
    client_id: String,
    _metrics: ConnectionMetricsGuard,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        debug!(client = %self.client_id, "EventSource closed");
        self.server.close_socket(&self.client_id, true);
    }
}

/// Whether the request asks for an event stream.
fn is_event_source(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

/// `GET {mount}/{clientId}`.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_event_source(&headers) {
        return bad_request("Not an EventSource request");
    }

    let (outbound, rx) = mpsc::unbounded_channel();
    let handle = Arc::new(EventSourceHandle { outbound });
    let request = request_context("eventsource", &headers);
    if let Err(e) = state.server.open_socket(&client_id, handle, Some(request)) {
        return bad_request(&e.to_string());
    }
    debug!(client = %client_id, "Opened EventSource connection");

    let guard = StreamGuard {
        server: state.server.clone(),
        client_id,
        _metrics: ConnectionMetricsGuard::new(),
    };
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        loop {
            match rx.recv().await {
                Some(Outbound::Send(message)) => match codec::encode_string(&[message]) {
                    Ok(data) => {
                        metrics::record_message(data.len(), "outbound");
                        let event = SseEvent::default().data(data);
                        return Some((Ok::<_, Infallible>(event), (rx, guard)));
                    }
                    Err(e) => warn!(error = %e, "Failed to encode message"),
                },
                Some(Outbound::Close) | None => return None,
            }
        }
    });

    let sse = Sse::new(events);
    match state.config.ping_interval() {
        Some(period) => sse.keep_alive(KeepAlive::new().interval(period)).into_response(),
        None => sse.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_event_source() {
        let mut headers = HeaderMap::new();
        assert!(!is_event_source(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        assert!(is_event_source(&headers));
    }

    #[tokio::test]
    async fn test_guard_releases_connection() {
        let state = AppState::new(crate::config::Config::default());
        let client_id = state.server.engine().create_client();

        let (outbound, _rx) = mpsc::unbounded_channel();
        state
            .server
            .open_socket(&client_id, Arc::new(EventSourceHandle { outbound }), None)
            .unwrap();
        assert!(state.server.engine().has_connection(&client_id));

        drop(StreamGuard {
            server: state.server.clone(),
            client_id: client_id.clone(),
            _metrics: ConnectionMetricsGuard::new(),
        });
        assert!(!state.server.engine().has_connection(&client_id));
    }
}
