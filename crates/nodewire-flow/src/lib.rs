//! Dataflow evaluation engine for nodewire graphs.
//!
//! Runs locally inside each editor instance: given the current graph, it
//! computes per-node output values, propagates them along connections to a
//! fixed point (or an iteration bound on cyclic graphs), then pushes
//! combined values into sink nodes' content for live previews. Purely
//! synchronous, single-threaded, and best-effort -- a single bad node or
//! broken connection never aborts a pass.
//!
//! # Usage
//!
//! ```ignore
//! let evaluator = Evaluator::new(BehaviorRegistry::with_builtins());
//! let mut state = EvalState::default();
//! let report = evaluator.evaluate(&mut graph, &mut state);
//! if !report.converged {
//!     // cyclic graph, stopped at the iteration bound
//! }
//! ```

pub mod behavior;
pub mod engine;
pub mod error;
pub mod state;

pub use behavior::{BehaviorRegistry, NodeBehavior, ProcessBehavior, VariableBehavior};
pub use engine::{EvalReport, Evaluator, NodeError, DEFAULT_MAX_ITERS};
pub use error::EvalError;
pub use state::{EvalState, NodeState, PortValues};
