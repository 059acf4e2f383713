//! Core graph data model for the nodewire editor.
//!
//! Plain data: nodes with named ports, directed connections between ports,
//! and a [`Graph`] container serializable to/from the single-document JSON
//! snapshot format shared by the hub, the clients, and the on-disk save
//! file. No I/O beyond wholesale snapshot save/load, no networking.

pub mod connection;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;

// Re-export commonly used types
pub use connection::{Connection, PortRef};
pub use error::CoreError;
pub use graph::Graph;
pub use id::NodeId;
pub use node::{Node, NodeKind, Port};
