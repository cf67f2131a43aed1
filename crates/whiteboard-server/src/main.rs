//! Whiteboard Relay Server
//!
//! Accepts WebSocket connections and relays drawing, object and cursor
//! events between clients in the same session. The session registry,
//! snapshot store and fan-out logic live in `whiteboard-core`; this binary
//! is the transport shell around them.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join_session", "session_id": "room1", "username": "Alice" }
//! { "type": "drawing", "x": 100, "y": 200, "color": "#000000" }
//! { "type": "save_canvas", "canvas_state": { ... } }
//! ```

mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use whiteboard_core::Hub;

/// Bind address used when `WHITEBOARD_ADDR` is unset or unparsable.
const DEFAULT_ADDR: &str = "0.0.0.0:8080";

fn bind_addr() -> SocketAddr {
    std::env::var("WHITEBOARD_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| DEFAULT_ADDR.parse().unwrap())
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "whiteboard_server=info,whiteboard_core=info,tower_http=info".into()
            }),
        )
        .init();

    let hub = Arc::new(Hub::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(hub.clone());

    let addr = bind_addr();
    info!("whiteboard relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    hub.shutdown();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Index page
async fn index() -> &'static str {
    "Whiteboard Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr_parses() {
        let addr: SocketAddr = DEFAULT_ADDR.parse().unwrap();
        assert_eq!(addr.port(), 8080);
    }
}
