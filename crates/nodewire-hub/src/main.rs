//! Binary entrypoint for the nodewire synchronization hub.
//!
//! Reads configuration from environment variables:
//! - `NODEWIRE_PORT`: listen port (default: "8000")
//! - `NODEWIRE_GRAPH_PATH`: optional snapshot file; loaded at boot when it
//!   exists and rewritten on every accepted snapshot/update

use nodewire_core::Graph;
use nodewire_hub::{build_router, Hub};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port = std::env::var("NODEWIRE_PORT").unwrap_or_else(|_| "8000".to_string());
    let graph_path = std::env::var("NODEWIRE_GRAPH_PATH").ok();

    let mut hub = Hub::new(match &graph_path {
        Some(path) if std::path::Path::new(path).exists() => {
            Graph::load_from_path(path).expect("failed to load graph snapshot")
        }
        _ => Graph::new(),
    });
    if let Some(path) = graph_path {
        hub = hub.with_graph_path(path.into());
    }

    let app = build_router(hub);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("nodewire hub starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
