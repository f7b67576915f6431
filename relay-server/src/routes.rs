//! Route definitions for the relay.
//!
//! Provides the GraphRAG WebSocket, WebSocket discovery, uploads, and health checks.

use crate::conversation::{ConversationController, RelayServices};
use crate::message::{InboundFrame, ServerMessage};
use crate::uploads::{upload_base64_handler, upload_handler};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, State,
    },
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use relay_common::config::Config;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Path of the GraphRAG WebSocket.
pub const WS_PATH: &str = "/ws/graphrag";

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: RelayServices,
}

impl AppState {
    pub fn new(config: Config, services: RelayServices) -> Self {
        Self {
            config: Arc::new(config),
            services,
        }
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// WebSocket discovery response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebSocketInfoResponse {
    pub status: String,
    pub websocket_url: String,
}

/// Build every route on top of `state`.
pub fn build_all_routes(state: AppState) -> Router {
    let upload_limit = state.config.uploads.max_bytes + MULTIPART_OVERHEAD;

    let upload_routes = Router::new()
        .route("/upload", post(upload_handler))
        .route("/upload/base64", post(upload_base64_handler))
        .layer(DefaultBodyLimit::max(upload_limit));

    Router::new()
        .route(WS_PATH, get(ws_handler))
        .route("/api/websocket", get(websocket_info_handler))
        .merge(upload_routes)
        .with_state(state)
        .merge(health_routes())
}

/// Build health check routes.
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(health_handler))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let services = state.services.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, services))
}

/// Run one connection: a writer task draining the outbound channel, and the
/// conversation loop on the read half.
async fn handle_socket(socket: WebSocket, services: RelayServices) {
    let (mut sink, stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let handle = services.registry.initialize(tx);
    let span = relay_common::connection_span!(handle.id());

    let writer = tokio::spawn(
        async move {
            while let Some(message) = rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    tracing::debug!("Client went away while sending");
                    return;
                }
            }
            // Every sender is gone: the conversation is over.
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
        .instrument(span.clone()),
    );

    let inbound = std::pin::pin!(stream.filter_map(|result| {
        futures_util::future::ready(match result {
            Ok(Message::Text(text)) => Some(InboundFrame::Text(text)),
            Ok(Message::Binary(_)) => Some(InboundFrame::Binary),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Ok(Message::Close(_)) => Some(InboundFrame::Close),
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive failed");
                Some(InboundFrame::Close)
            }
        })
    }));

    let controller = ConversationController::new(services, handle);
    controller.run(inbound).instrument(span).await;

    if let Err(e) = writer.await {
        tracing::warn!(error = %e, "WebSocket writer task failed");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket discovery handler.
async fn websocket_info_handler(State(state): State<AppState>) -> Json<WebSocketInfoResponse> {
    let config = &state.config;
    let scheme = if config.is_production() { "wss" } else { "ws" };

    Json(WebSocketInfoResponse {
        status: "success".into(),
        websocket_url: format!(
            "{scheme}://{}:{}{WS_PATH}",
            config.public_host(),
            config.port()
        ),
    })
}

/// Health check handler.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "graphrag-relay".into(),
    })
}
