//! Axum-based WebSocket server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    http::HeaderValue,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use inkroom_core::error::{InkroomError, Result};

use crate::admin;
use crate::connection::handle_ws_connection;
use crate::state::GatewayState;

/// Build the gateway router: `/ws/{room_id}`, `/health`, and the admin API.
pub fn router(state: Arc<GatewayState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins());

    #[allow(unused_mut)]
    let mut app = Router::new()
        .route("/ws/{room_id}", get(ws_handler))
        .route("/health", get(health_handler))
        .merge(admin::routes());

    #[cfg(feature = "metrics")]
    if let Some(handle) = crate::metrics::prometheus_handle() {
        app = app.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn start_gateway(state: Arc<GatewayState>) -> Result<()> {
    let addr = format!("{}:{}", state.config.bind_addr(), state.config.gateway_port());
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| InkroomError::Gateway(format!("failed to bind {addr}: {e}")))?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: Arc<GatewayState>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    let max_message_bytes = state.config.max_message_bytes();
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_ws_connection(state, room_id, socket))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "connections": state.active_connections(),
        "rooms": state.rooms.room_count().await,
    }))
}

/// `"*"` allows any origin without credentials; an explicit list allows
/// credentials and mirrors the requested methods and headers.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
