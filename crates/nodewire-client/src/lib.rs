//! Client session: the per-editor-instance transport adapter.
//!
//! Owns the websocket connection to the hub and a local [`Graph`] replica.
//! Outgoing: UI actions become fire-and-forget events or correlated
//! request/response envelopes. Incoming: remote events are applied to the
//! replica, then a change signal tells the embedder to re-run the
//! evaluation engine and refresh previews.
//!
//! No replay protocol exists: after a reconnect the session requests a
//! fresh `graph_snapshot` to resynchronize, since events missed while
//! disconnected are gone.

pub mod error;
pub mod replica;
pub mod session;

pub use error::SessionError;
pub use replica::apply_event;
pub use session::Session;
