//! The graph container: node map plus ordered connection list.
//!
//! [`Graph`] is the single shared data model. The hub owns the canonical
//! copy, every client session owns a local replica, and the evaluation
//! engine walks either one. The two copies are eventually consistent, not
//! transactionally consistent -- mutation here is plain and local.
//!
//! Serialization is the wholesale snapshot document
//! `{"nodes": [...], "connections": [...]}` (the prototype's `links` key is
//! accepted as an alias). Nodes are held in an [`IndexMap`] so iteration and
//! re-serialization preserve insertion order; connection list order is the
//! evaluation order.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::connection::Connection;
use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::Node;

/// A mapping of node id to node plus a sequence of connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Optional document identity carried through snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    /// Nodes in insertion order, keyed by id on the inside, serialized as a
    /// list on the wire.
    #[serde(default, with = "nodes_as_list")]
    pub nodes: IndexMap<NodeId, Node>,
    /// Connections in creation order.
    #[serde(default, alias = "links")]
    pub connections: Vec<Connection>,
    /// Open extension map for document-level fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Graph::default()
    }

    // -----------------------------------------------------------------------
    // Node operations
    // -----------------------------------------------------------------------

    /// Inserts a node, rejecting duplicate ids and duplicate port names.
    pub fn insert_node(&mut self, node: Node) -> Result<(), CoreError> {
        node.validate()?;
        if self.nodes.contains_key(&node.id) {
            return Err(CoreError::DuplicateNode {
                id: node.id.clone(),
            });
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Inserts or replaces a node without validation.
    ///
    /// Used when applying remote events: the sender's copy is authoritative
    /// and a structurally odd node must not reject the whole message.
    pub fn upsert_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Returns a node by id.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Returns a mutable node by id.
    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Removes a node and every connection touching it.
    ///
    /// Returns the removed node, or `None` if the id was unknown.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let removed = self.nodes.shift_remove(id)?;
        self.connections.retain(|c| !c.touches(&removed.id));
        Some(removed)
    }

    /// Updates a node's position.
    ///
    /// Returns `false` when the id is unknown -- callers ignore the miss
    /// (a move racing a delete is not an error).
    pub fn move_node(&mut self, id: &str, x: f64, y: f64) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.x = x;
                node.y = y;
                true
            }
            None => false,
        }
    }

    /// Replaces a node's content payload.
    ///
    /// Returns `false` when the id is unknown.
    pub fn set_content(&mut self, id: &str, content: impl Into<String>) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.content = content.into();
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Connection operations
    // -----------------------------------------------------------------------

    /// Creates a validated connection.
    ///
    /// Both endpoints must exist, `from.port` must be an output port of the
    /// start node and `to.port` an input port of the end node. If another
    /// connection already feeds the destination input port it is replaced
    /// (single fan-in, enforced at creation time).
    pub fn connect(&mut self, conn: Connection) -> Result<(), CoreError> {
        let start = self
            .nodes
            .get(&conn.from.node)
            .ok_or_else(|| CoreError::NodeNotFound {
                id: conn.from.node.clone(),
            })?;
        if !start.has_output(&conn.from.port) {
            return Err(CoreError::PortNotFound {
                id: conn.from.node.clone(),
                port: conn.from.port.clone(),
            });
        }
        let end = self
            .nodes
            .get(&conn.to.node)
            .ok_or_else(|| CoreError::NodeNotFound {
                id: conn.to.node.clone(),
            })?;
        if !end.has_input(&conn.to.port) {
            return Err(CoreError::PortNotFound {
                id: conn.to.node.clone(),
                port: conn.to.port.clone(),
            });
        }
        if conn.from.node == conn.to.node && conn.from.port == conn.to.port {
            return Err(CoreError::InvalidConnection {
                reason: "connection loops a port back to itself".to_string(),
            });
        }
        // Single fan-in: a new feeder replaces the previous one.
        self.connections.retain(|c| c.to != conn.to);
        self.connections.push(conn);
        Ok(())
    }

    /// Appends a connection without validation.
    ///
    /// Used when applying remote events; dangling or fan-in-violating
    /// entries are tolerated by readers (last delivery wins downstream).
    pub fn push_connection(&mut self, conn: Connection) {
        self.connections.push(conn);
    }

    /// Removes a connection by exact value. Returns `true` if one was
    /// removed.
    pub fn disconnect(&mut self, conn: &Connection) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c != conn);
        self.connections.len() != before
    }

    /// Drops connections whose endpoints no longer resolve to an existing
    /// node and port. Returns the number of connections removed.
    pub fn prune_dangling(&mut self) -> usize {
        let nodes = &self.nodes;
        let before = self.connections.len();
        self.connections.retain(|c| {
            let from_ok = nodes
                .get(&c.from.node)
                .is_some_and(|n| n.has_output(&c.from.port));
            let to_ok = nodes
                .get(&c.to.node)
                .is_some_and(|n| n.has_input(&c.to.port));
            from_ok && to_ok
        });
        before - self.connections.len()
    }

    // -----------------------------------------------------------------------
    // Snapshot document
    // -----------------------------------------------------------------------

    /// Serializes the graph to the snapshot JSON document.
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserializes a graph from a snapshot JSON document.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Writes the snapshot document wholesale to a file.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), CoreError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads a snapshot document wholesale from a file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Serializes the node map as a JSON list, re-keying by node id on the way
/// back in. A duplicate id in an incoming document resolves last-wins.
mod nodes_as_list {
    use indexmap::IndexMap;
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::{Deserialize, Serialize};

    use crate::id::NodeId;
    use crate::node::Node;

    pub fn serialize<S: Serializer>(
        nodes: &IndexMap<NodeId, Node>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(nodes.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<NodeId, Node>, D::Error> {
        let list = Vec::<Node>::deserialize(deserializer)?;
        let mut map = IndexMap::with_capacity(list.len());
        for node in list {
            map.insert(node.id.clone(), node);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, Port};

    fn var(id: &str) -> Node {
        Node::new(id, NodeKind::Variable).with_output(Port::new("out"))
    }

    fn sink(id: &str) -> Node {
        Node::new(id, NodeKind::Output).with_input(Port::new("in"))
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let mut graph = Graph::new();
        graph.insert_node(var("n1")).unwrap();
        assert!(matches!(
            graph.insert_node(var("n1")),
            Err(CoreError::DuplicateNode { .. })
        ));
    }

    #[test]
    fn remove_node_drops_touching_connections() {
        let mut graph = Graph::new();
        graph.insert_node(var("a")).unwrap();
        graph.insert_node(sink("b")).unwrap();
        graph.connect(Connection::between("a", "out", "b", "in")).unwrap();
        assert_eq!(graph.connections.len(), 1);

        graph.remove_node("a");
        assert!(graph.connections.is_empty());
        assert!(graph.get_node("a").is_none());
    }

    #[test]
    fn move_node_unknown_id_is_ignored() {
        let mut graph = Graph::new();
        graph.insert_node(var("a")).unwrap();
        assert!(graph.move_node("a", 3.0, 4.0));
        assert!(!graph.move_node("ghost", 1.0, 1.0));
        let node = graph.get_node("a").unwrap();
        assert_eq!((node.x, node.y), (3.0, 4.0));
    }

    #[test]
    fn connect_validates_endpoints_and_ports() {
        let mut graph = Graph::new();
        graph.insert_node(var("a")).unwrap();
        graph.insert_node(sink("b")).unwrap();

        assert!(matches!(
            graph.connect(Connection::between("ghost", "out", "b", "in")),
            Err(CoreError::NodeNotFound { .. })
        ));
        assert!(matches!(
            graph.connect(Connection::between("a", "nope", "b", "in")),
            Err(CoreError::PortNotFound { .. })
        ));
        assert!(matches!(
            graph.connect(Connection::between("a", "out", "b", "nope")),
            Err(CoreError::PortNotFound { .. })
        ));
        graph.connect(Connection::between("a", "out", "b", "in")).unwrap();
    }

    #[test]
    fn connect_replaces_previous_feeder() {
        let mut graph = Graph::new();
        graph.insert_node(var("a")).unwrap();
        graph.insert_node(var("b")).unwrap();
        graph.insert_node(sink("s")).unwrap();

        graph.connect(Connection::between("a", "out", "s", "in")).unwrap();
        graph.connect(Connection::between("b", "out", "s", "in")).unwrap();

        assert_eq!(graph.connections.len(), 1);
        assert_eq!(graph.connections[0].from.node.as_str(), "b");
    }

    #[test]
    fn push_connection_skips_validation() {
        let mut graph = Graph::new();
        graph.push_connection(Connection::between("x", "out", "y", "in"));
        assert_eq!(graph.connections.len(), 1);
    }

    #[test]
    fn prune_dangling_keeps_resolvable_connections() {
        let mut graph = Graph::new();
        graph.insert_node(var("a")).unwrap();
        graph.insert_node(sink("b")).unwrap();
        graph.push_connection(Connection::between("a", "out", "b", "in"));
        graph.push_connection(Connection::between("ghost", "out", "b", "in"));
        graph.push_connection(Connection::between("a", "out", "b", "missing_port"));

        assert_eq!(graph.prune_dangling(), 2);
        assert_eq!(graph.connections.len(), 1);
    }

    #[test]
    fn snapshot_document_round_trip() {
        let mut graph = Graph::new();
        graph.graph_id = Some("g1".to_string());
        graph.insert_node(var("a").with_content("1").at(5.0, 6.0)).unwrap();
        graph.insert_node(sink("b")).unwrap();
        graph.connect(Connection::between("a", "out", "b", "in")).unwrap();

        let json = graph.to_json().unwrap();
        let back = Graph::from_json(&json).unwrap();
        assert_eq!(back, graph);

        // Node order survives the round trip.
        let ids: Vec<&str> = back.nodes.keys().map(|k| k.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn prototype_links_alias_is_accepted() {
        let doc = serde_json::json!({
            "nodes": [{"id": "a", "type": "variable", "outputs": [{"id": "out"}]}],
            "links": [{"from": {"node": "a", "port": "out"},
                       "to": {"node": "b", "port": "in"}}]
        });
        let graph = Graph::from_json(&doc.to_string()).unwrap();
        assert_eq!(graph.connections.len(), 1);
    }

    #[test]
    fn save_and_load_path() {
        let mut graph = Graph::new();
        graph.insert_node(var("a")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        graph.save_to_path(&path).unwrap();

        let back = Graph::load_from_path(&path).unwrap();
        assert_eq!(back, graph);
    }
}
