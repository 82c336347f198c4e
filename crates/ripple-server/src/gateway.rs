//! WebSocket gateway: the transport edge of the realtime core.
//!
//! Each accepted socket runs one actor loop that owns both halves of the
//! connection: inbound frames are decoded and dispatched to the hub in
//! arrival order, outbound events drain from the connection's outbox.
//! Nothing here touches chat semantics; that all lives in `ripple-core`.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::routes;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use ripple_core::{ConnectionId, DeliveryConfig, Hub, HubConfig, MemoryStore};
use ripple_protocol::{codec, ClientEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The realtime core.
    pub hub: Hub<MemoryStore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state over an in-memory store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let hub_config = HubConfig {
            delivery: DeliveryConfig {
                store_timeout: config.store_timeout(),
                max_content_length: config.limits.max_content_length,
            },
            max_rooms_per_connection: Some(config.limits.max_rooms_per_connection),
        };

        Self {
            hub: Hub::with_config(Arc::new(MemoryStore::new()), hub_config),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .merge(routes::router())
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Ripple server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (connection_id, mut outbox) = state.hub.connect();
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Read buffer for partial frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    let mut ping_timer =
        tokio::time::interval(Duration::from_millis(state.config.heartbeat.interval_ms));
    // Skip the first immediate tick
    ping_timer.tick().await;
    let pong_deadline = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            biased;

            // Drain the connection's outbox to the socket.
            Some(event) = outbox.recv() => {
                match codec::encode(&event) {
                    Ok(data) => {
                        metrics::record_event("outbound");
                        if sender.send(Message::Binary(data.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(connection = %connection_id, error = %e, "Failed to encode event");
                    }
                }
            }

            _ = ping_timer.tick() => {
                if last_pong.elapsed() > pong_deadline {
                    warn!(connection = %connection_id, "Heartbeat timed out");
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);
                        if !process_buffer(&state, &connection_id, &mut read_buffer).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        // Treat text as bytes into the same frame stream
                        read_buffer.extend_from_slice(text.as_bytes());
                        if !process_buffer(&state, &connection_id, &mut read_buffer).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.hub.disconnect(&connection_id);

    let stats = state.hub.stats();
    metrics::set_active_rooms(stats.rooms);
    metrics::set_users_online(stats.online_users);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode and dispatch every complete event in the read buffer.
///
/// Returns `false` if the stream is unrecoverable (framing lost) and the
/// connection should close.
async fn process_buffer(
    state: &Arc<AppState>,
    connection_id: &ConnectionId,
    read_buffer: &mut BytesMut,
) -> bool {
    let start = Instant::now();

    loop {
        match codec::decode_from::<ClientEvent>(read_buffer) {
            Ok(Some(event)) => {
                metrics::record_event("inbound");
                if matches!(event, ClientEvent::SendMessage { .. }) {
                    metrics::record_message();
                }

                // Sequential dispatch keeps this connection's events in
                // arrival order.
                state.hub.handle_event(connection_id, event).await;
            }
            Ok(None) => break,
            Err(e) => {
                // Once a frame fails to decode the length framing cannot
                // be trusted any more.
                warn!(connection = %connection_id, error = %e, "Protocol error, closing");
                metrics::record_error("protocol");
                return false;
            }
        }
    }

    metrics::record_latency(start.elapsed().as_secs_f64());

    let stats = state.hub.stats();
    metrics::set_active_rooms(stats.rooms);
    metrics::set_users_online(stats.online_users);

    true
}
