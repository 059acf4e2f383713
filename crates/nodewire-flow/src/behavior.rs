//! Node behaviors: the "compute outputs" capability.
//!
//! A behavior turns a node's content and current input values into an
//! output-port-name to value map. Behaviors are looked up by node kind in
//! a [`BehaviorRegistry`]; kinds with no registered behavior are inert
//! pass-through/display nodes (their content still propagates via the
//! engine's fallback).

use std::collections::HashMap;

use nodewire_core::{Node, NodeKind};
use serde_json::Value;

use crate::error::EvalError;
use crate::state::PortValues;

/// The compute capability attached to a node kind.
pub trait NodeBehavior: Send + Sync {
    /// Computes the node's output values from its content and inputs.
    ///
    /// A failure here is contained to the node for the current iteration;
    /// its previous outputs, if any, remain in effect.
    fn compute(&self, node: &Node, inputs: &PortValues) -> Result<PortValues, EvalError>;
}

/// Maps node kinds to behaviors.
pub struct BehaviorRegistry {
    behaviors: HashMap<NodeKind, Box<dyn NodeBehavior>>,
}

impl BehaviorRegistry {
    /// Creates an empty registry (every node inert).
    pub fn new() -> Self {
        BehaviorRegistry {
            behaviors: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in variable/process behaviors.
    pub fn with_builtins() -> Self {
        let mut registry = BehaviorRegistry::new();
        registry.register(NodeKind::Variable, VariableBehavior);
        registry.register(NodeKind::Process, ProcessBehavior);
        registry
    }

    /// Registers (or replaces) the behavior for a kind.
    pub fn register(&mut self, kind: NodeKind, behavior: impl NodeBehavior + 'static) {
        self.behaviors.insert(kind, Box::new(behavior));
    }

    /// Returns the behavior for a kind, if one is registered.
    pub fn get(&self, kind: &NodeKind) -> Option<&dyn NodeBehavior> {
        self.behaviors.get(kind).map(|b| b.as_ref())
    }
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        BehaviorRegistry::with_builtins()
    }
}

/// Variable nodes expose their content on every declared output port.
pub struct VariableBehavior;

impl NodeBehavior for VariableBehavior {
    fn compute(&self, node: &Node, _inputs: &PortValues) -> Result<PortValues, EvalError> {
        let value = Value::String(node.content.clone());
        Ok(node
            .outputs
            .iter()
            .map(|p| (p.id.clone(), value.clone()))
            .collect())
    }
}

/// Process nodes join their textual inputs and expose the result on every
/// declared output port.
pub struct ProcessBehavior;

impl NodeBehavior for ProcessBehavior {
    fn compute(&self, node: &Node, inputs: &PortValues) -> Result<PortValues, EvalError> {
        let joined = inputs
            .values()
            .filter(|v| !v.is_null())
            .map(stringify)
            .collect::<Vec<_>>()
            .join("\n");
        let value = Value::String(joined);
        Ok(node
            .outputs
            .iter()
            .map(|p| (p.id.clone(), value.clone()))
            .collect())
    }
}

/// Renders a value the way a preview displays it: strings bare, everything
/// else as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
