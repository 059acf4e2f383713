//! Session error types.

use thiserror::Error;

/// Errors surfaced to the embedding editor.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Dialing or upgrading the websocket failed.
    #[error("connect: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection is gone; reconnect and resync to continue.
    #[error("connection closed")]
    Closed,

    /// A request/response exchange timed out.
    #[error("request timed out")]
    Timeout,

    /// The peer answered with something the session could not decode.
    #[error("protocol: {0}")]
    Protocol(String),
}
