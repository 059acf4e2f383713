//! Wire protocol for the nodewire hub and client sessions.
//!
//! Two message forms travel over the same text channel:
//!
//! - [`Envelope`]: the request/response form
//!   (`{action, data, request_id?, timestamp, version}`), used for snapshot
//!   requests and the process/terminal/node action vocabulary.
//! - [`event::RawEvent`]: the lighter fire-and-forget form
//!   (`{type, payload}`) carrying graph-mutation events.
//!
//! Parsing is transport-independent and deliberately lenient: unknown
//! fields are always preserved, unknown actions and event kinds route
//! through explicit `Other`/`Unknown` variants, and `request_id` is an
//! opaque correlation token that is never interpreted.

pub mod envelope;
pub mod error;
pub mod event;

pub use envelope::{Action, Envelope, PROTOCOL_VERSION};
pub use error::ProtocolError;
pub use event::{EventKind, MovePayload, NodeUpdatePayload, RawEvent};
