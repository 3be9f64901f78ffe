//! Error types for scalargrad.

use thiserror::Error;

/// Errors that can occur while building or differentiating a graph.
#[derive(Debug, Error)]
pub enum GradError {
    /// A primitive was applied to a mix of graph nodes and raw numbers.
    ///
    /// Applications must be all-node (graph building) or all-number
    /// (plain numeric evaluation); mixing the two is a usage error.
    #[error("primitive '{primitive}' applied to a mix of graph nodes and raw numbers")]
    MixedArgumentKind { primitive: String },

    /// A primitive was applied to an empty argument list.
    #[error("primitive '{primitive}' applied to no arguments")]
    EmptyArguments { primitive: String },

    /// A primitive's derivative rule returned the wrong number of partials.
    ///
    /// Detected lazily: this only surfaces when a backward pass actually
    /// reaches the offending node.
    #[error("primitive '{primitive}' returned {returned} partials for {expected} parents")]
    DerivativeArityMismatch {
        primitive: String,
        expected: usize,
        returned: usize,
    },
}
