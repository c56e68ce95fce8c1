//! WebSocket transport.
//!
//! Each text frame carries a batch. The socket is bound to the client named
//! by the batch's `/meta/connect` message so deliveries are pushed straight
//! to it; replies to a batch are written as one JSON array.

use crate::handlers::AppState;
use crate::metrics::{self, ConnectionMetricsGuard};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use bayeux_core::{RequestContext, Socket};
use bayeux_protocol::{client_id_from_messages, codec, Message};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration};
use tracing::{debug, warn};

/// Frames queued for the writer task.
#[derive(Debug)]
enum Outbound {
    Batch(Vec<Message>),
    Ping,
    Close,
}

/// The engine's handle on a WebSocket.
struct WebSocketHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Socket for WebSocketHandle {
    fn send(&self, message: Message) {
        let _ = self.outbound.send(Outbound::Batch(vec![message]));
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Handle an upgraded WebSocket until either side closes it.
pub async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, request: RequestContext) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    debug!("WebSocket connected");

    let (mut sink, mut stream) = socket.split();
    let (outbound, mut rx) = mpsc::unbounded_channel::<Outbound>();

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let frame = match frame {
                Outbound::Batch(messages) => match codec::encode_string(&messages) {
                    Ok(text) => {
                        metrics::record_message(text.len(), "outbound");
                        WsMessage::Text(text)
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to encode batch");
                        continue;
                    }
                },
                Outbound::Ping => WsMessage::Ping(Vec::new()),
                Outbound::Close => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    let handle: Arc<dyn Socket> = Arc::new(WebSocketHandle {
        outbound: outbound.clone(),
    });
    let ping_period = state
        .config
        .ping_interval()
        .unwrap_or(Duration::from_secs(3600));
    let mut ping = interval_at(tokio::time::Instant::now() + ping_period, ping_period);
    let pinging = state.config.ping_interval().is_some();
    let mut client_id: Option<String> = None;

    loop {
        tokio::select! {
            _ = ping.tick(), if pinging => {
                if outbound.send(Outbound::Ping).is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                let messages = match frame {
                    Some(Ok(WsMessage::Text(text))) => decode(text.as_bytes()),
                    Some(Ok(WsMessage::Binary(data))) => decode(&data),
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                };
                let Some(messages) = messages else {
                    continue;
                };

                rebind(&state, &handle, &request, &mut client_id, &messages);

                // A held connect must not block later frames.
                let server = state.server.clone();
                let outbound = outbound.clone();
                let request = request.clone();
                tokio::spawn(async move {
                    let start = Instant::now();
                    let replies = server.process(messages, Some(&request)).await;
                    metrics::record_latency(start.elapsed().as_secs_f64());
                    if !replies.is_empty() {
                        let _ = outbound.send(Outbound::Batch(replies));
                    }
                });
            }
        }
    }

    if let Some(client_id) = client_id {
        state.server.close_socket(&client_id, true);
    }
    debug!("WebSocket disconnected");
}

fn decode(data: &[u8]) -> Option<Vec<Message>> {
    match codec::decode(data) {
        Ok(messages) => {
            metrics::record_message(data.len(), "inbound");
            Some(messages)
        }
        Err(e) => {
            warn!(error = %e, "Malformed WebSocket frame");
            metrics::record_error("decode");
            None
        }
    }
}

/// Bind the socket to the client connecting in this batch, releasing a
/// previously bound client without closing the socket.
fn rebind(
    state: &AppState,
    handle: &Arc<dyn Socket>,
    request: &RequestContext,
    client_id: &mut Option<String>,
    messages: &[Message],
) {
    let Some(cid) = client_id_from_messages(messages) else {
        return;
    };
    if client_id.as_deref() == Some(cid) {
        return;
    }

    if let Some(previous) = client_id.take() {
        debug!(from = %previous, to = %cid, "Rebinding WebSocket");
        state.server.close_socket(&previous, false);
    }
    match state
        .server
        .open_socket(cid, handle.clone(), Some(request.clone()))
    {
        Ok(()) => *client_id = Some(cid.to_string()),
        Err(e) => debug!(client = %cid, error = %e, "Not binding WebSocket"),
    }
}
