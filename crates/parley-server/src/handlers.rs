//! HTTP and WebSocket handlers for the Parley server.
//!
//! REST endpoints cover channels and history; live updates are pushed over a
//! WebSocket, one JSON text frame per batch.

use crate::config::Config;
use crate::metrics::{self, SubscriberMetricsGuard};
use crate::registry::{ChannelRegistry, RegistryError};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use parley_core::{BatchStream, ChatError, ChatService, Message, MessageId, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The chat core.
    pub chat: Arc<ChatService>,
    /// Channel names.
    pub registry: ChannelRegistry,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let chat = Arc::new(ChatService::with_config(
            config.live.chat_config(),
            Arc::new(SystemClock),
        ));

        Self {
            registry: ChannelRegistry::new(Arc::clone(&chat)),
            chat,
            config,
        }
    }
}

/// Errors returned by the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Chat core rejected the request.
    Chat(ChatError),
    /// Channel registry rejected the request.
    Registry(RegistryError),
    /// Requested resource does not exist.
    NotFound(String),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self::Chat(err)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::Chat(err @ ChatError::UnknownChannel(_)) => {
                (StatusCode::NOT_FOUND, "unknown_channel", err.to_string())
            }
            Self::Chat(err @ ChatError::InvalidArgument(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_argument", err.to_string())
            }
            Self::Registry(err) => (StatusCode::BAD_REQUEST, "invalid_channel", err.to_string()),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", what),
        };

        metrics::record_error(kind);
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/channels", get(list_channels).post(create_channel))
        .route("/channels/:id", get(get_channel))
        .route("/channels/:id/messages", get(fetch_history).post(post_message))
        .route("/channels/:id/live", get(live_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!("Live endpoint: ws://{}/channels/{{id}}/live", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct CreateChannel {
    name: String,
}

async fn list_channels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.list())
}

async fn create_channel(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateChannel>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state.registry.create(&request.name)?;
    metrics::set_channels(state.chat.directory().len());
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registry
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Channel not found: {id}")))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    after: Option<String>,
}

async fn fetch_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let limit = state.config.history.page_size(query.limit);
    let after = query.after.map(MessageId::from);

    let page = state.chat.fetch_history(&id, limit, after.as_ref())?;
    metrics::record_history_request();

    Ok(Json(page.iter().map(|m| Message::clone(m)).collect()))
}

#[derive(Debug, Deserialize)]
struct PostMessage {
    author: String,
    body: String,
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<PostMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.chat.post_message(&id, request.author, request.body)?;
    metrics::record_post();
    Ok((StatusCode::CREATED, Json(Message::clone(&message))))
}

/// WebSocket upgrade handler for live updates.
///
/// The subscription is opened before the upgrade completes, so nothing posted
/// after the handshake is missed.
async fn live_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let batches = state.chat.live_messages(&id)?;
    Ok(ws.on_upgrade(move |socket| forward_batches(socket, state, id, batches)))
}

/// One live frame.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveFrame<'a> {
    channel_id: &'a str,
    messages: Vec<&'a Message>,
}

/// Push live batches to the socket until either side goes away.
async fn forward_batches(
    socket: WebSocket,
    state: Arc<AppState>,
    channel_id: String,
    mut batches: BatchStream,
) {
    let _metrics_guard = SubscriberMetricsGuard::new();
    let (mut sender, mut receiver) = socket.split();

    debug!(channel = %channel_id, "Live socket connected");

    loop {
        tokio::select! {
            batch = batches.next() => {
                let Some(batch) = batch else { break };
                let frame = LiveFrame {
                    channel_id: &channel_id,
                    messages: batch.iter().map(AsRef::as_ref).collect(),
                };

                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(channel = %channel_id, error = %e, "Failed to encode live batch");
                        metrics::record_error("encode");
                        continue;
                    }
                };

                metrics::record_batch(batch.len());
                metrics::set_dropped(state.chat.live_stats().dropped);
                if sender.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!(channel = %channel_id, "Live socket closed by client");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Live sockets are push-only
                    }
                    Some(Err(e)) => {
                        warn!(channel = %channel_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                }
            }
        }
    }

    debug!(channel = %channel_id, "Live socket disconnected");
}
