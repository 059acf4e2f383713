//! The evaluation pass: compute, propagate, stabilize, publish to sinks.
//!
//! One pass walks the graph up to [`DEFAULT_MAX_ITERS`] times. Each
//! iteration computes every eligible node's outputs, then pushes values
//! along every connection in list order. The pass stops early once an
//! iteration changes no input value; the iteration bound is the cycle
//! safety net -- the engine never spins indefinitely on a cyclic graph.
//!
//! Ordering note: when several connections feed the same input port (a
//! fan-in the model does not support), the last one in connection-list
//! order wins. Callers that need a specific winner must enforce single
//! fan-in at the model layer (`Graph::connect` does).

use nodewire_core::{Graph, NodeId, PortRef};
use serde_json::Value;
use tracing::debug;

use crate::behavior::{stringify, BehaviorRegistry};
use crate::error::EvalError;
use crate::state::EvalState;

/// Default iteration budget per pass.
pub const DEFAULT_MAX_ITERS: usize = 8;

/// A contained per-node failure recorded during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeError {
    /// The node whose compute step failed.
    pub node: NodeId,
    /// Iteration (1-based) in which the failure occurred.
    pub iteration: usize,
    /// The failure itself.
    pub error: EvalError,
}

/// Outcome of one evaluation pass.
///
/// Failures are data, not control flow: the pass always runs to
/// completion and reports what it skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalReport {
    /// Iterations actually run (0 when no node was eligible).
    pub iterations: usize,
    /// `true` when the pass reached a fixed point before the bound.
    pub converged: bool,
    /// Per-node compute failures, in occurrence order.
    pub errors: Vec<NodeError>,
    /// Sink nodes whose content was rewritten by the post-pass.
    pub updated_sinks: Vec<NodeId>,
}

impl EvalReport {
    /// `true` when nothing was eligible for evaluation.
    pub fn is_noop(&self) -> bool {
        self.iterations == 0
    }
}

/// The dataflow evaluator.
///
/// Holds the behavior registry and the iteration budget; per-run value
/// state lives in the caller-owned [`EvalState`].
pub struct Evaluator {
    registry: BehaviorRegistry,
    max_iters: usize,
}

impl Evaluator {
    /// Creates an evaluator with the default iteration budget.
    pub fn new(registry: BehaviorRegistry) -> Self {
        Evaluator {
            registry,
            max_iters: DEFAULT_MAX_ITERS,
        }
    }

    /// Builder: overrides the iteration budget (minimum 1).
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters.max(1);
        self
    }

    /// Runs one full evaluation pass over the graph.
    ///
    /// Best-effort per node and per connection: a failing compute step is
    /// skipped for that iteration (previous outputs stay in effect), a
    /// dangling connection endpoint contributes no value. The only no-op
    /// case is a graph with no eligible nodes at all.
    pub fn evaluate(&self, graph: &mut Graph, state: &mut EvalState) -> EvalReport {
        let mut report = EvalReport::default();

        let eligible: Vec<NodeId> = graph
            .nodes
            .values()
            .filter(|n| self.registry.get(&n.kind).is_some())
            .map(|n| n.id.clone())
            .collect();
        if eligible.is_empty() {
            report.converged = true;
            return report;
        }

        // Reset sink inputs so stale values from a previous run do not
        // linger after the producing connection was removed.
        for node in graph.nodes.values() {
            if node.kind.is_sink() {
                state.clear_inputs(node.id.as_str());
            }
        }

        for iteration in 1..=self.max_iters {
            report.iterations = iteration;

            for id in &eligible {
                let Some(node) = graph.get_node(id.as_str()) else {
                    continue;
                };
                let Some(behavior) = self.registry.get(&node.kind) else {
                    continue;
                };
                let inputs = state.inputs(id.as_str());
                match behavior.compute(node, &inputs) {
                    Ok(outputs) => state.set_outputs(id, outputs),
                    Err(error) => {
                        debug!(node = %id, %error, iteration, "node skipped for this iteration");
                        report.errors.push(NodeError {
                            node: id.clone(),
                            iteration,
                            error,
                        });
                    }
                }
            }

            let mut changed = false;
            for conn in graph.connections.clone() {
                let Some(value) = source_value(graph, state, &conn.from) else {
                    continue;
                };
                if graph.get_node(conn.to.node.as_str()).is_none() {
                    // Dangling destination: no value to deliver anywhere.
                    continue;
                }
                let prev = state.set_input(&conn.to.node, &conn.to.port, value.clone());
                if prev.as_ref() != Some(&value) {
                    changed = true;
                }
            }

            if !changed {
                report.converged = true;
                break;
            }
        }

        self.publish_sinks(graph, state, &mut report);

        debug!(
            iterations = report.iterations,
            converged = report.converged,
            errors = report.errors.len(),
            "evaluation pass complete"
        );
        report
    }

    /// Post-pass: push combined input values into non-frozen sink content.
    fn publish_sinks(&self, graph: &mut Graph, state: &EvalState, report: &mut EvalReport) {
        let mut updates: Vec<(NodeId, String)> = Vec::new();
        for node in graph.nodes.values() {
            if !node.kind.is_sink() || node.is_frozen() {
                continue;
            }
            let mut parts: Vec<String> = Vec::new();
            for value in state.inputs(node.id.as_str()).values() {
                match value {
                    Value::Null => {}
                    // List values flatten element-wise.
                    Value::Array(items) => {
                        parts.extend(items.iter().filter(|v| !v.is_null()).map(stringify));
                    }
                    other => parts.push(stringify(other)),
                }
            }
            // No incoming values: keep existing content (snapshot-friendly).
            if parts.is_empty() {
                continue;
            }
            let combined = parts.join("\n");
            if combined != node.content {
                updates.push((node.id.clone(), combined));
            }
        }
        for (id, content) in updates {
            graph.set_content(id.as_str(), content);
            report.updated_sinks.push(id);
        }
    }
}

/// Resolves the value at a connection's source port.
///
/// Reads the start node's output map when it has one; a node that exposes
/// no output map at all falls back to its raw textual content. A dangling
/// start endpoint resolves to nothing.
fn source_value(graph: &Graph, state: &EvalState, from: &PortRef) -> Option<Value> {
    if state.has_outputs(from.node.as_str()) {
        return state.output(from.node.as_str(), &from.port).cloned();
    }
    graph
        .get_node(from.node.as_str())
        .map(|n| Value::String(n.content.clone()))
}
