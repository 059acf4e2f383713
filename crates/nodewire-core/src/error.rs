//! Core error types for nodewire-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! failure modes in the graph data model and snapshot I/O.

use thiserror::Error;

use crate::id::NodeId;

/// Core errors produced by the graph data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id was not found in the graph.
    #[error("node not found: '{id}'")]
    NodeNotFound { id: NodeId },

    /// Inserting a node whose id is already present.
    #[error("duplicate node id: '{id}'")]
    DuplicateNode { id: NodeId },

    /// A node declares two ports with the same name on the same side.
    #[error("duplicate port '{port}' on node '{id}'")]
    DuplicatePort { id: NodeId, port: String },

    /// A connection endpoint names a port the node does not expose.
    #[error("port not found: '{port}' on node '{id}'")]
    PortNotFound { id: NodeId, port: String },

    /// A connection failed validation.
    #[error("invalid connection: {reason}")]
    InvalidConnection { reason: String },

    /// Snapshot file I/O failed.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failed.
    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),
}
