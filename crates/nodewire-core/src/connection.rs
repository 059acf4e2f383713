//! Connections: directed edges between node ports.
//!
//! Wire shape matches the editor's payload builders:
//! `{"from": {"node": ..., "port": ...}, "to": {"node": ..., "port": ...}}`.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// A `(node, port)` endpoint reference.
///
/// A reference used in a connection must name an existing port at
/// connection-creation time; after the node is deleted the reference is
/// tolerated as dangling (readers treat it as "no value") until pruned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// Referenced node.
    pub node: NodeId,
    /// Port name on that node.
    pub port: String,
}

impl PortRef {
    /// Creates a port reference.
    pub fn new(node: impl Into<NodeId>, port: impl Into<String>) -> Self {
        PortRef {
            node: node.into(),
            port: port.into(),
        }
    }
}

/// A directed edge from one node's output port to another node's input
/// port.
///
/// Fan-out is allowed (many connections from one output port). Fan-in is
/// not modeled: at most one connection should feed a given input port, and
/// the validated creation path enforces it by replacing the previous
/// feeder. The unchecked append path keeps last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Source: an output port.
    pub from: PortRef,
    /// Destination: an input port.
    pub to: PortRef,
}

impl Connection {
    /// Creates a connection between two port references.
    pub fn new(from: PortRef, to: PortRef) -> Self {
        Connection { from, to }
    }

    /// Convenience constructor from raw parts.
    pub fn between(
        start_node: impl Into<NodeId>,
        start_port: impl Into<String>,
        end_node: impl Into<NodeId>,
        end_port: impl Into<String>,
    ) -> Self {
        Connection {
            from: PortRef::new(start_node, start_port),
            to: PortRef::new(end_node, end_port),
        }
    }

    /// Returns `true` if either endpoint references the given node.
    pub fn touches(&self, id: &NodeId) -> bool {
        &self.from.node == id || &self.to.node == id
    }
}
