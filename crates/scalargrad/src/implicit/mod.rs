//! Implicit layers: primitives whose forward value is the solution of an
//! equation (a fixed point or an optimum) rather than a closed-form
//! expression.
//!
//! Both layers here differentiate via the implicit function theorem instead
//! of unrolling their solving procedure: the backward rule builds a small
//! local subgraph at the solution, runs an independent [`backward`] pass on
//! it, and combines the resulting partials algebraically. The local nodes are
//! never shared with the outer graph, so the nested pass needs no special
//! handling — and the outer trace stays a small constant size regardless of
//! how many iterations the solve took.
//!
//! Iterative solves that hit their iteration budget, and implicit formulas
//! that divide by a near-zero denominator, are recoverable conditions: the
//! layer keeps the best current estimate, records a [`SolveStatus`] /
//! ill-conditioning flag, and emits a `log::warn!`.
//!
//! [`backward`]: crate::backward

mod argmin;
mod fixed_point;

pub use argmin::Argmin;
pub use fixed_point::FixedPoint;

use crate::scalar::Scalar;

/// Outcome of the most recent iterative solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveStatus {
    /// The iteration reached its tolerance.
    Converged {
        /// Iterations consumed.
        iterations: usize,
    },
    /// The iteration budget ran out; the reported value is the best estimate.
    Exhausted {
        /// Residual at the final iterate.
        residual: f64,
    },
}

/// Denominators below this magnitude make an implicit derivative unreliable.
pub(crate) const DENOMINATOR_FLOOR: f64 = 1e-12;

/// Wraps raw parameter values as fresh leaves for a local subgraph.
pub(crate) fn leaves(values: &[f64]) -> Vec<Scalar> {
    values.iter().copied().map(Scalar::new).collect()
}
