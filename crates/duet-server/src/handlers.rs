//! HTTP handlers for the Duet server.
//!
//! Routes:
//! - `GET <websocket_path>?room=<token>` - join a room and relay
//! - `GET /create-room` - mint a fresh room token
//! - `GET /health` - liveness and room count

use crate::config::Config;
use crate::metrics;
use crate::relay::RelayService;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::{header, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use duet_core::RegistryConfig;
use duet_protocol::{CreateRoomResponse, RelayCodec};
use duet_transport::WebSocketConnection;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// Room admission and relay.
    pub relay: RelayService,
    /// Server configuration.
    pub config: Config,
    /// Pre-validated `Access-Control-Allow-Origin` value.
    allow_origin: HeaderValue,
}

impl AppState {
    /// Create new app state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured CORS origin is not a valid header value.
    pub fn new(config: Config) -> Result<Self> {
        let registry_config = RegistryConfig {
            max_rooms: config.limits.max_rooms,
        };
        let codec = RelayCodec::new(config.limits.max_message_size);
        let allow_origin = HeaderValue::from_str(&config.cors.allow_origin)
            .with_context(|| format!("Invalid CORS origin: {}", config.cors.allow_origin))?;

        Ok(Self {
            relay: RelayService::new(registry_config, codec),
            config,
            allow_origin,
        })
    }
}

/// Query parameters of the WebSocket endpoint.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct JoinParams {
    /// Room token.
    pub room: Option<String>,
}

impl JoinParams {
    /// Pick the parameters out of decoded query pairs.
    ///
    /// A repeated `room` keeps its first value.
    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let room = pairs
            .into_iter()
            .find_map(|(key, value)| (key == "room").then_some(value));
        Self { room }
    }
}

/// Build the axum router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/create-room", get(create_room_handler))
        .route("/health", get(health_handler))
        .layer(middleware::map_response_with_state(
            Arc::clone(&state),
            cors_headers,
        ))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let state = Arc::new(AppState::new(config)?);
    let addr = state.config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Duet server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}?room=<token>",
        addr, state.config.transport.websocket_path
    );

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Duet server stopped");
    Ok(())
}

/// Bind the configured address and serve `state` in a background task.
///
/// Returns the bound address, which differs from the configured one when
/// port 0 was requested.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn start_server_with_state(
    state: Arc<AppState>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let addr = state.config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let bound = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let service = app(state).into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            error!(error = %e, "Server task failed");
        }
    });

    Ok((bound, handle))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Add the CORS origin header to every response.
async fn cors_headers(State(state): State<Arc<AppState>>, mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, state.allow_origin.clone());
    response
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": state.relay.registry().room_count(),
    }))
}

/// Mint a new room token.
///
/// The room itself only comes into existence when its first client joins.
async fn create_room_handler() -> Json<CreateRoomResponse> {
    let room_id = uuid::Uuid::new_v4().to_string();
    debug!(room = %room_id, "Minted room token");
    Json(CreateRoomResponse::new(room_id))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(pairs): Query<Vec<(String, String)>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let params = JoinParams::from_pairs(pairs);
    ws.on_upgrade(move |socket| handle_websocket(socket, remote, params.room, state))
}

/// Handle an upgraded WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    remote: SocketAddr,
    room: Option<String>,
    state: Arc<AppState>,
) {
    let conn = WebSocketConnection::new(socket, Some(remote));
    let outcome = state.relay.handle(conn, room).await;
    debug!(remote = %remote, outcome = ?outcome, "WebSocket session ended");
}
