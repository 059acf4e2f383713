//! Synchronization hub: the single server-side process holding canonical
//! graph state.
//!
//! Accepts any number of concurrent websocket clients, relays
//! graph-mutation events to every *other* connected session, and answers
//! snapshot requests. A client error terminates only that client; the hub
//! never exits because of one.

pub mod error;
pub mod hub;
pub mod router;

pub use error::HubError;
pub use hub::{Hub, SessionId};
pub use router::build_router;
