//! HTTP endpoints.
//!
//! Routes requests on the mount path to the long-polling, WebSocket and
//! EventSource transports and runs the server.

use crate::config::Config;
use crate::metrics;
use crate::{eventsource, observer, websocket};
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bayeux_core::{Engine, RequestContext, Server};
use bayeux_protocol::{codec, Message};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The protocol server.
    pub server: Server,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            server: Server::new(Engine::new(config.engine_config())),
            config,
        }
    }
}

/// Query parameters of a GET request.
#[derive(Debug, Deserialize)]
struct MessageParams {
    message: Option<String>,
}

/// Run the HTTP server until interrupted.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    let _observer = observer::spawn(state.server.engine().clone());
    let app = router(state.clone());

    let listener = TcpListener::bind(addr).await?;
    info!("Bayeux server listening on {}", addr);
    info!("Endpoint: http://{}{}", addr, state.config.mount);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.server.close();
    info!("Bayeux server stopped");
    Ok(())
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let mount = state.config.mount.clone();
    let mut app = Router::new()
        .route(&mount, get(get_handler).post(post_handler))
        .route("/health", get(health_handler));

    if state.config.transport.eventsource {
        let path = format!("{}/:client_id", mount.trim_end_matches('/'));
        app = app.route(&path, get(eventsource::handler));
    }

    app.layer(DefaultBodyLimit::max(state.config.limits.max_message_size))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.server.engine().stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": stats.backend.clients,
        "connections": stats.connections,
    }))
}

/// `GET {mount}`: WebSocket upgrade, or a batch in the `message` parameter.
async fn get_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
    Query(params): Query<MessageParams>,
) -> Response {
    if let Some(ws) = ws {
        if !state.config.transport.websocket {
            return bad_request("WebSocket transport disabled");
        }
        let request = request_context("websocket", &headers);
        let limit = state.config.limits.max_message_size;
        return ws
            .max_message_size(limit)
            .on_upgrade(move |socket| websocket::handle_websocket(socket, state, request));
    }

    let Some(message) = params.message else {
        return bad_request("Received request with no message");
    };
    let request = request_context("http", &headers);
    handle_batch(&state, message.as_bytes(), &request).await
}

/// `POST {mount}` with a JSON body.
async fn post_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = request_context("http", &headers);
    handle_batch(&state, &body, &request).await
}

async fn handle_batch(
    state: &AppState,
    body: &[u8],
    request: &RequestContext,
) -> Response {
    let messages = match codec::decode(body) {
        Ok(messages) => messages,
        Err(e) => {
            metrics::record_error("decode");
            return bad_request(&e.to_string());
        }
    };
    metrics::record_message(body.len(), "inbound");
    debug!(count = messages.len(), "Received batch via HTTP");

    let start = Instant::now();
    let replies = state.server.process(messages, Some(request)).await;
    metrics::record_latency(start.elapsed().as_secs_f64());

    json_response(&replies)
}

fn json_response(replies: &[Message]) -> Response {
    let body = match codec::encode(replies) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to encode replies");
            metrics::record_error("encode");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    metrics::record_message(body.len(), "outbound");

    (
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-store"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response()
}

/// Reject malformed input.
pub(crate) fn bad_request(reason: &str) -> Response {
    warn!(reason, "Bad request");
    (StatusCode::BAD_REQUEST, "Bad request").into_response()
}

/// Capture the request headers for extensions.
pub(crate) fn request_context(transport: &str, headers: &HeaderMap) -> RequestContext {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .fold(RequestContext::new(transport), |ctx, (name, value)| {
            ctx.with_header(name, value)
        })
}
