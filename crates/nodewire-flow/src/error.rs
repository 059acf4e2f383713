//! Evaluation error types.
//!
//! Errors here are per-node, per-iteration facts collected into the
//! [`EvalReport`](crate::EvalReport) -- they are never propagated out of a
//! pass. Containment is a loop invariant of the engine, not an accident of
//! error suppression.

use thiserror::Error;

/// A node behavior's compute step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The behavior could not produce outputs from the inputs it was given.
    #[error("compute failed: {reason}")]
    ComputeFailed { reason: String },

    /// The behavior requires an input value that has not arrived yet.
    ///
    /// Common on the first iterations of a pass; the node is retried once
    /// upstream values propagate.
    #[error("missing input '{port}'")]
    MissingInput { port: String },
}
