//! Fixed-point layer: solve `x = f(x, params…)` and differentiate implicitly.

use super::{leaves, SolveStatus, DENOMINATOR_FLOOR};
use crate::backward::backward;
use crate::error::GradError;
use crate::primitive::{apply_scalars, Primitive};
use crate::scalar::Scalar;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A primitive whose value is the fixed point of `f`.
///
/// Forward iterates `x ← f(x, params…)` from a configurable start until the
/// step size falls below the tolerance or the iteration budget runs out.
/// Backward applies the implicit function theorem at the solution:
///
/// ```text
/// ∂x*/∂pᵢ = (∂f/∂pᵢ) / (1 − ∂f/∂x)
/// ```
///
/// with the partials of `f` obtained from an independent backward pass over a
/// local subgraph. The map `f` is expressed with ordinary graph operations.
///
/// # Example
///
/// ```
/// use scalargrad::implicit::FixedPoint;
/// use scalargrad::{backward, ops, Scalar};
/// use std::rc::Rc;
///
/// // x = cos(a*x + b)
/// let solver = Rc::new(FixedPoint::new("CosFix", |x, p| {
///     ops::cos(&(&(&p[0] * x) + &p[1]))
/// }));
/// let a = Scalar::new(0.5);
/// let b = Scalar::new(0.2);
/// let x = solver.call(&[a.clone(), b.clone()]);
/// backward(&x).unwrap();
/// assert!(a.grad().is_some() && b.grad().is_some());
/// ```
pub struct FixedPoint<F> {
    name: String,
    map: F,
    initial: f64,
    tolerance: f64,
    max_iterations: usize,
    status: Cell<Option<SolveStatus>>,
    ill_conditioned: Cell<bool>,
}

impl<F> FixedPoint<F>
where
    F: Fn(&Scalar, &[Scalar]) -> Scalar,
{
    /// Creates a solver for `x = map(x, params…)`.
    ///
    /// Defaults: start at 0.0, tolerance 1e-10, 200 iterations.
    pub fn new(name: impl Into<String>, map: F) -> Self {
        Self {
            name: name.into(),
            map,
            initial: 0.0,
            tolerance: 1e-10,
            max_iterations: 200,
            status: Cell::new(None),
            ill_conditioned: Cell::new(false),
        }
    }

    /// Sets the starting iterate.
    #[must_use]
    pub fn with_initial(mut self, initial: f64) -> Self {
        self.initial = initial;
        self
    }

    /// Sets the convergence tolerance on the step size.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the iteration budget.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Applies the solver to graph parameters, recording one node.
    #[must_use]
    pub fn call(self: &Rc<Self>, params: &[Scalar]) -> Scalar
    where
        F: 'static,
    {
        apply_scalars(Rc::clone(self) as Rc<dyn Primitive>, params)
    }

    /// Outcome of the most recent solve, if any.
    pub fn last_status(&self) -> Option<SolveStatus> {
        self.status.get()
    }

    /// Whether the most recent backward hit a near-zero `1 − ∂f/∂x`.
    pub fn ill_conditioned(&self) -> bool {
        self.ill_conditioned.get()
    }

    /// One numeric evaluation of the map; the throwaway local nodes are
    /// dropped immediately.
    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        let xs = Scalar::new(x);
        (self.map)(&xs, &leaves(params)).value()
    }

    /// Runs the iteration, recording the solve status.
    fn solve(&self, params: &[f64]) -> f64 {
        let mut x = self.initial;
        let mut residual = f64::INFINITY;
        for iteration in 1..=self.max_iterations {
            let next = self.evaluate(x, params);
            residual = (next - x).abs();
            x = next;
            if residual <= self.tolerance {
                self.status.set(Some(SolveStatus::Converged { iterations: iteration }));
                return x;
            }
        }
        log::warn!(
            "fixed-point solve '{}' exhausted {} iterations (residual {:e}); keeping best estimate",
            self.name,
            self.max_iterations,
            residual
        );
        self.status.set(Some(SolveStatus::Exhausted { residual }));
        x
    }
}

impl<F> fmt::Debug for FixedPoint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPoint")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("tolerance", &self.tolerance)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl<F> Primitive for FixedPoint<F>
where
    F: Fn(&Scalar, &[Scalar]) -> Scalar,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        self.solve(inputs)
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        // Recompute the solution, then differentiate f once at that point on
        // a local subgraph disjoint from the outer graph.
        let solution = self.solve(inputs);
        let xs = Scalar::new(solution);
        let params = leaves(inputs);
        let fx = (self.map)(&xs, &params);
        backward(&fx)?;

        let df_dx = xs.grad().unwrap_or(0.0);
        let denominator = 1.0 - df_dx;
        if denominator.abs() < DENOMINATOR_FLOOR {
            self.ill_conditioned.set(true);
            log::warn!(
                "implicit derivative of '{}' is unreliable: 1 - df/dx = {:e}",
                self.name,
                denominator
            );
        } else {
            self.ill_conditioned.set(false);
        }
        Ok(params
            .iter()
            .map(|p| p.grad().unwrap_or(0.0) / denominator)
            .collect())
    }

    fn config(&self) -> Option<String> {
        Some(format!("tol={:e},max_iter={}", self.tolerance, self.max_iterations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use approx::assert_relative_eq;

    #[test]
    fn test_converges_to_cosine_fixed_point() {
        // x = cos(x), the classic contraction; x* ≈ 0.7390851332151607.
        let solver = Rc::new(FixedPoint::new("CosFix", |x: &Scalar, _: &[Scalar]| ops::cos(x))
            .with_initial(1.0)
            .with_tolerance(1e-12));
        let p = Scalar::new(0.0);
        let x = solver.call(&[p]);
        assert_relative_eq!(x.value(), 0.739_085_133_215_160_7, epsilon = 1e-9);
        assert!(matches!(
            solver.last_status(),
            Some(SolveStatus::Converged { .. })
        ));
    }

    #[test]
    fn test_exhausted_budget_reports_status() {
        // x ← 2x + p diverges from any nonzero start.
        let solver = Rc::new(
            FixedPoint::new("Runaway", |x: &Scalar, p: &[Scalar]| {
                &(x + x) + &p[0]
            })
            .with_initial(1.0)
            .with_max_iterations(5),
        );
        let p = Scalar::new(1.0);
        let x = solver.call(&[p]);
        assert!(x.value().is_finite());
        assert!(matches!(
            solver.last_status(),
            Some(SolveStatus::Exhausted { .. })
        ));
    }

    #[test]
    fn test_unit_slope_flags_ill_conditioned() {
        // f(x, p) = x + p has df/dx = 1, so 1 - df/dx = 0. With p = 0 the
        // start is already a fixed point; the derivative is undefined but the
        // backward pass must not crash.
        let solver = Rc::new(
            FixedPoint::new("Shift", |x: &Scalar, p: &[Scalar]| x + &p[0]).with_initial(1.0),
        );
        let p = Scalar::new(0.0);
        let x = solver.call(&[p.clone()]);
        crate::backward(&x).unwrap();
        assert!(solver.ill_conditioned());
        assert!(!p.grad().unwrap_or(0.0).is_finite());
    }
}
