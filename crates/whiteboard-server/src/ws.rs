//! Per-connection WebSocket plumbing.
//!
//! Each accepted socket registers with the hub and then pumps two streams:
//! inbound frames from the client (parsed and handed to the hub, one
//! synchronous call per frame) and the connection's outbound queue (filled
//! by the hub, drained into the socket in order). Delivery order per
//! recipient therefore follows the hub's send order.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::warn;
use whiteboard_core::{ClientMessage, Hub, ServerMessage};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn_id = hub.connect(tx);

    loop {
        tokio::select! {
            // Inbound frames from the client
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                        Ok(msg) => hub.handle(conn_id, msg),
                        Err(e) => {
                            warn!("invalid message from {conn_id}: {e}");
                            let reply = ServerMessage::Error {
                                message: e.to_string(),
                            };
                            if send_json(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary/ping/pong are not part of the protocol
                    Some(Err(e)) => {
                        warn!("websocket error for {conn_id}: {e}");
                        break;
                    }
                }
            }

            // Messages queued for this connection by the hub
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    // Queue closed: the hub dropped this connection.
                    None => break,
                }
            }
        }
    }

    hub.disconnect(conn_id);
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap();
    sender.send(Message::Text(json.into())).await
}
