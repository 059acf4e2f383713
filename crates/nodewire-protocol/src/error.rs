//! Protocol error types.

use thiserror::Error;

/// Errors produced while parsing wire messages.
///
/// A hub or session treats all of these as degradations, never as
/// connection-fatal: non-JSON input falls back to the plain-text echo path
/// and a bad payload rejects only the one message that carried it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not JSON at all (plain-text fallback applies).
    #[error("not json: {0}")]
    NotJson(#[source] serde_json::Error),

    /// The frame is JSON but not an object with a `type` tag.
    #[error("not an event: missing 'type' tag")]
    NotAnEvent,

    /// The payload did not match the shape the event kind requires.
    #[error("bad payload for '{kind}': {source}")]
    BadPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
