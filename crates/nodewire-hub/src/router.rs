//! Router assembly and per-connection websocket plumbing.
//!
//! One accepted connection becomes two halves: this task's receive loop
//! feeding [`Hub::handle_text`], and a spawned writer task draining the
//! session outbox into the socket. Closing the connection (or any
//! transport error) tears down only this session; in-flight broadcasts to
//! other sessions are unaffected.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use nodewire_core::{Graph, Node};

use crate::error::HubError;
use crate::hub::Hub;

/// Builds the axum router.
///
/// `/ws` is the message channel; `/graph` and `/nodes/{id}` are a
/// read-only JSON debug surface over canonical state. CORS is permissive
/// (editor instances connect from arbitrary origins) and TraceLayer
/// provides request-level logging.
pub fn build_router(hub: Hub) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/graph", get(get_graph))
        .route("/nodes/{id}", get(get_node))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(hub)
}

async fn health() -> &'static str {
    "ok"
}

/// `GET /graph` -- canonical graph snapshot.
async fn get_graph(State(hub): State<Hub>) -> Json<Graph> {
    Json(hub.graph())
}

/// `GET /nodes/{id}` -- one canonical node.
async fn get_node(
    State(hub): State<Hub>,
    Path(id): Path<String>,
) -> Result<Json<Node>, HubError> {
    hub.node(&id)
        .map(Json)
        .ok_or_else(|| HubError::NotFound(format!("node '{}'", id)))
}

/// `GET /ws` -- upgrades to the persistent message channel.
async fn ws_handler(State(hub): State<Hub>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Hub) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbox, mut queued) = mpsc::unbounded_channel::<String>();
    let session_id = hub.register(outbox);
    info!(session_id = %session_id, "client connected");

    // Writer: drains the outbox into the socket. No hub lock is ever held
    // here; the hub only enqueues.
    let writer = tokio::spawn(async move {
        while let Some(text) = queued.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Receive loop: reads until the connection closes.
    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => hub.handle_text(session_id, text.as_str()),
            Ok(Message::Close(_)) => break,
            // Binary/ping/pong frames carry no protocol meaning here.
            Ok(_) => {}
            Err(err) => {
                debug!(session_id = %session_id, error = %err, "receive error");
                break;
            }
        }
    }

    hub.deregister(session_id);
    writer.abort();
    info!(session_id = %session_id, "client disconnected");
}
