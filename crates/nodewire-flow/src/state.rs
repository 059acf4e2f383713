//! Per-run value state, held by the engine's caller between passes.
//!
//! Values live outside [`Graph`](nodewire_core::Graph) on purpose: the
//! graph is the shared, serialized data model, while input/output values
//! are transient evaluation artifacts owned by whichever editor instance
//! runs the engine. Keeping the state across passes lets a node that fails
//! to compute in one iteration keep its previous outputs in effect.

use std::collections::{BTreeMap, HashMap};

use nodewire_core::NodeId;
use serde_json::Value;

/// Values keyed by port name. Ordered so sink concatenation and change
/// comparison are deterministic.
pub type PortValues = BTreeMap<String, Value>;

/// Current input and output values of a single node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeState {
    /// Latest value delivered to each input port.
    pub inputs: PortValues,
    /// Outputs from the node's most recent successful compute.
    pub outputs: PortValues,
}

/// Value state for a whole graph, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalState {
    nodes: HashMap<NodeId, NodeState>,
}

impl EvalState {
    /// Creates an empty state.
    pub fn new() -> Self {
        EvalState::default()
    }

    /// Returns a node's state, if any values have been recorded for it.
    pub fn node(&self, id: &str) -> Option<&NodeState> {
        self.nodes.get(id)
    }

    /// Returns the value currently at a node's input port.
    pub fn input(&self, id: &str, port: &str) -> Option<&Value> {
        self.nodes.get(id)?.inputs.get(port)
    }

    /// Returns the value currently at a node's output port.
    pub fn output(&self, id: &str, port: &str) -> Option<&Value> {
        self.nodes.get(id)?.outputs.get(port)
    }

    /// Returns a node's input map, empty if none recorded.
    pub fn inputs(&self, id: &str) -> PortValues {
        self.nodes
            .get(id)
            .map(|n| n.inputs.clone())
            .unwrap_or_default()
    }

    /// Returns `true` if the node has produced an output map at all.
    ///
    /// Distinguishes "no behavior ran" (content fallback applies on
    /// propagation) from "behavior ran but this port is absent".
    pub fn has_outputs(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| !n.outputs.is_empty())
    }

    /// Delivers a value to an input port, returning the previous value.
    pub fn set_input(&mut self, id: &NodeId, port: &str, value: Value) -> Option<Value> {
        self.nodes
            .entry(id.clone())
            .or_default()
            .inputs
            .insert(port.to_string(), value)
    }

    /// Replaces a node's output map.
    pub fn set_outputs(&mut self, id: &NodeId, outputs: PortValues) {
        self.nodes.entry(id.clone()).or_default().outputs = outputs;
    }

    /// Clears a node's input values (sink reset before a pass).
    pub fn clear_inputs(&mut self, id: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.inputs.clear();
        }
    }

    /// Drops state for nodes no longer present in the graph.
    pub fn retain_nodes(&mut self, keep: impl Fn(&NodeId) -> bool) {
        self.nodes.retain(|id, _| keep(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_input_returns_previous() {
        let mut state = EvalState::new();
        let id = NodeId::from("n1");
        assert_eq!(state.set_input(&id, "in", json!(1)), None);
        assert_eq!(state.set_input(&id, "in", json!(2)), Some(json!(1)));
        assert_eq!(state.input("n1", "in"), Some(&json!(2)));
    }

    #[test]
    fn has_outputs_distinguishes_empty_map() {
        let mut state = EvalState::new();
        let id = NodeId::from("n1");
        assert!(!state.has_outputs("n1"));
        state.set_outputs(&id, PortValues::new());
        assert!(!state.has_outputs("n1"));
        state.set_outputs(&id, PortValues::from([("out".to_string(), json!("v"))]));
        assert!(state.has_outputs("n1"));
    }

    #[test]
    fn clear_inputs_keeps_outputs() {
        let mut state = EvalState::new();
        let id = NodeId::from("n1");
        state.set_input(&id, "in", json!(1));
        state.set_outputs(&id, PortValues::from([("out".to_string(), json!(2))]));
        state.clear_inputs("n1");
        assert_eq!(state.input("n1", "in"), None);
        assert_eq!(state.output("n1", "out"), Some(&json!(2)));
    }
}
