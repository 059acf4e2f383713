//! Node and port types.
//!
//! A [`Node`] is plain data: identity, a kind tag, a 2-D position, a
//! free-form text payload, ordered input/output port lists, and an open
//! `meta` map for extension fields (layout color, the `snapshot` freeze
//! flag, ...). Behavior is attached elsewhere -- the evaluation engine maps
//! kinds to behaviors, the model itself stays inert.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::id::NodeId;

/// A named input or output slot on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Port name, unique per node side.
    pub id: String,
    /// Optional declared data type (advisory, not enforced).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
}

impl Port {
    /// Creates an untyped port.
    pub fn new(id: impl Into<String>) -> Self {
        Port {
            id: id.into(),
            dtype: None,
        }
    }

    /// Creates a port with a declared data type.
    pub fn typed(id: impl Into<String>, dtype: impl Into<String>) -> Self {
        Port {
            id: id.into(),
            dtype: Some(dtype.into()),
        }
    }
}

/// Node kind tag.
///
/// Serialized as the lowercase strings used on the wire. Kinds the model
/// does not know about round-trip through [`NodeKind::Other`] so a newer
/// peer never breaks an older one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Generic,
    Variable,
    Process,
    Output,
    GroupOutput,
    /// Any kind string this build does not recognize.
    #[serde(untagged)]
    Other(String),
}

impl NodeKind {
    /// Returns `true` for sink-role kinds (display/aggregate incoming
    /// values rather than produce new ones).
    pub fn is_sink(&self) -> bool {
        matches!(self, NodeKind::Output | NodeKind::GroupOutput)
    }
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Generic
    }
}

/// A unit in the graph: typed ports plus free-form content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identity, unique within a graph.
    pub id: NodeId,
    /// Kind tag driving evaluation behavior.
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Horizontal position in scene coordinates.
    #[serde(default)]
    pub x: f64,
    /// Vertical position in scene coordinates.
    #[serde(default)]
    pub y: f64,
    /// Free-form string payload (text, code, preview output).
    #[serde(default)]
    pub content: String,
    /// Ordered input ports; names unique per node.
    #[serde(default)]
    pub inputs: Vec<Port>,
    /// Ordered output ports; names unique per node.
    #[serde(default)]
    pub outputs: Vec<Port>,
    /// Open extension map (layout color, snapshot freeze flag, ...).
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Node {
    /// Creates a node with the given id and kind, empty everything else.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Node {
            id: id.into(),
            kind,
            title: String::new(),
            x: 0.0,
            y: 0.0,
            content: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            meta: Map::new(),
        }
    }

    /// Builder: sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder: sets the content payload.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Builder: sets the position.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Builder: appends an input port.
    pub fn with_input(mut self, port: Port) -> Self {
        self.inputs.push(port);
        self
    }

    /// Builder: appends an output port.
    pub fn with_output(mut self, port: Port) -> Self {
        self.outputs.push(port);
        self
    }

    /// Returns `true` if the node exposes an input port with this name.
    pub fn has_input(&self, port: &str) -> bool {
        self.inputs.iter().any(|p| p.id == port)
    }

    /// Returns `true` if the node exposes an output port with this name.
    pub fn has_output(&self, port: &str) -> bool {
        self.outputs.iter().any(|p| p.id == port)
    }

    /// Returns `true` when the node is flagged as a frozen snapshot copy.
    ///
    /// Frozen sinks are never overwritten by evaluation, regardless of
    /// incoming values. The flag lives in `meta` under `"snapshot"`.
    pub fn is_frozen(&self) -> bool {
        matches!(self.meta.get("snapshot"), Some(Value::Bool(true)))
    }

    /// Validates port-name uniqueness per side.
    pub fn validate(&self) -> Result<(), CoreError> {
        for ports in [&self.inputs, &self.outputs] {
            for (i, port) in ports.iter().enumerate() {
                if ports[..i].iter().any(|p| p.id == port.id) {
                    return Err(CoreError::DuplicatePort {
                        id: self.id.clone(),
                        port: port.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_lowercase() {
        assert_eq!(
            serde_json::to_string(&NodeKind::GroupOutput).unwrap(),
            "\"group_output\""
        );
        assert_eq!(serde_json::to_string(&NodeKind::Variable).unwrap(), "\"variable\"");
    }

    #[test]
    fn unknown_kind_round_trips() {
        let kind: NodeKind = serde_json::from_str("\"terminal\"").unwrap();
        assert_eq!(kind, NodeKind::Other("terminal".to_string()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"terminal\"");
    }

    #[test]
    fn sink_kinds() {
        assert!(NodeKind::Output.is_sink());
        assert!(NodeKind::GroupOutput.is_sink());
        assert!(!NodeKind::Variable.is_sink());
        assert!(!NodeKind::Other("terminal".into()).is_sink());
    }

    #[test]
    fn node_deserializes_from_wire_shape() {
        // Shape produced by the editor's payload builders.
        let json = serde_json::json!({
            "id": "n1",
            "type": "variable",
            "title": "Count",
            "x": 10.0,
            "y": -4.5,
            "content": "7",
            "inputs": [],
            "outputs": [{"id": "out"}],
            "meta": {"color": "#66CCFF"}
        });
        let node: Node = serde_json::from_value(json).unwrap();
        assert_eq!(node.kind, NodeKind::Variable);
        assert!(node.has_output("out"));
        assert!(!node.has_input("out"));
        assert_eq!(node.meta.get("color").unwrap(), "#66CCFF");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let node: Node = serde_json::from_value(serde_json::json!({"id": "bare"})).unwrap();
        assert_eq!(node.kind, NodeKind::Generic);
        assert_eq!(node.content, "");
        assert!(node.inputs.is_empty());
    }

    #[test]
    fn frozen_flag_reads_meta() {
        let mut node = Node::new("out1", NodeKind::Output);
        assert!(!node.is_frozen());
        node.meta.insert("snapshot".into(), Value::Bool(true));
        assert!(node.is_frozen());
        // Non-boolean values do not freeze.
        node.meta.insert("snapshot".into(), Value::String("yes".into()));
        assert!(!node.is_frozen());
    }

    #[test]
    fn validate_rejects_duplicate_ports() {
        let node = Node::new("n", NodeKind::Process)
            .with_input(Port::new("a"))
            .with_input(Port::new("a"));
        assert!(matches!(
            node.validate(),
            Err(CoreError::DuplicatePort { .. })
        ));

        let ok = Node::new("n", NodeKind::Process)
            .with_input(Port::new("a"))
            .with_output(Port::new("a"));
        // Same name on opposite sides is fine.
        assert!(ok.validate().is_ok());
    }
}
