//! Optimization layer: solve `y = argmin_x g(x, params…)` by gradient descent
//! and differentiate through the stationarity condition.

use super::{leaves, SolveStatus, DENOMINATOR_FLOOR};
use crate::backward::backward;
use crate::error::GradError;
use crate::primitive::{apply_scalars, Primitive};
use crate::scalar::Scalar;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A primitive whose value minimizes an objective expressed with graph
/// operations.
///
/// Forward runs gradient descent, obtaining each step's slope `∂g/∂x` from an
/// independent backward pass over a local subgraph. Backward differentiates
/// the stationarity condition `∂g/∂x = 0` at the optimum:
///
/// ```text
/// ∂y/∂pᵢ = −(∂²g/∂x∂pᵢ) / (∂²g/∂x²)
/// ```
///
/// The second derivatives are central differences of the first-order slopes,
/// so the whole rule costs two extra local backward passes regardless of how
/// many descent steps the forward solve took.
pub struct Argmin<F> {
    name: String,
    objective: F,
    initial: f64,
    learning_rate: f64,
    tolerance: f64,
    max_iterations: usize,
    fd_step: f64,
    status: Cell<Option<SolveStatus>>,
    ill_conditioned: Cell<bool>,
}

impl<F> Argmin<F>
where
    F: Fn(&Scalar, &[Scalar]) -> Scalar,
{
    /// Creates a minimizer for `objective(x, params…)`.
    ///
    /// Defaults: start at 0.0, learning rate 0.1, slope tolerance 1e-10,
    /// 1000 iterations, finite-difference step 1e-5.
    pub fn new(name: impl Into<String>, objective: F) -> Self {
        Self {
            name: name.into(),
            objective,
            initial: 0.0,
            learning_rate: 0.1,
            tolerance: 1e-10,
            max_iterations: 1000,
            fd_step: 1e-5,
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

    /// Sets the descent step size.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the convergence tolerance on `|∂g/∂x|`.
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

    /// Applies the minimizer to graph parameters, recording one node.
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

    /// Whether the most recent backward hit a near-zero `∂²g/∂x²`.
    pub fn ill_conditioned(&self) -> bool {
        self.ill_conditioned.get()
    }

    /// First-order partials of the objective at `(x, params)` from one local
    /// backward pass: `(∂g/∂x, [∂g/∂pᵢ…])`.
    fn slopes(&self, x: f64, params: &[f64]) -> Result<(f64, Vec<f64>), GradError> {
        let xs = Scalar::new(x);
        let ps = leaves(params);
        let objective = (self.objective)(&xs, &ps);
        backward(&objective)?;
        Ok((
            xs.grad().unwrap_or(0.0),
            ps.iter().map(|p| p.grad().unwrap_or(0.0)).collect(),
        ))
    }

    /// Runs the descent, recording the solve status.
    fn descend(&self, params: &[f64]) -> f64 {
        let mut x = self.initial;
        let mut residual = f64::INFINITY;
        for iteration in 1..=self.max_iterations {
            let slope = match self.slopes(x, params) {
                Ok((slope, _)) => slope,
                Err(err) => {
                    // A broken objective surfaces properly once the outer
                    // backward pass reaches this node; forward keeps the
                    // current iterate and records no solve outcome.
                    log::error!("objective gradient failed inside '{}': {err}", self.name);
                    self.status.set(None);
                    return x;
                }
            };
            residual = slope.abs();
            if residual <= self.tolerance {
                self.status.set(Some(SolveStatus::Converged { iterations: iteration }));
                return x;
            }
            x -= self.learning_rate * slope;
        }
        log::warn!(
            "descent '{}' exhausted {} iterations (|slope| {:e}); keeping best estimate",
            self.name,
            self.max_iterations,
            residual
        );
        self.status.set(Some(SolveStatus::Exhausted { residual }));
        x
    }
}

impl<F> fmt::Debug for Argmin<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argmin")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("learning_rate", &self.learning_rate)
            .field("tolerance", &self.tolerance)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl<F> Primitive for Argmin<F>
where
    F: Fn(&Scalar, &[Scalar]) -> Scalar,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        self.descend(inputs)
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        let optimum = self.descend(inputs);
        let h = self.fd_step;
        let (slope_above, partials_above) = self.slopes(optimum + h, inputs)?;
        let (slope_below, partials_below) = self.slopes(optimum - h, inputs)?;

        let curvature = (slope_above - slope_below) / (2.0 * h);
        if curvature.abs() < DENOMINATOR_FLOOR {
            self.ill_conditioned.set(true);
            log::warn!(
                "implicit derivative of '{}' is unreliable: d2g/dx2 = {:e}",
                self.name,
                curvature
            );
        } else {
            self.ill_conditioned.set(false);
        }
        Ok(partials_above
            .iter()
            .zip(&partials_below)
            .map(|(above, below)| {
                let mixed = (above - below) / (2.0 * h);
                -mixed / curvature
            })
            .collect())
    }

    fn config(&self) -> Option<String> {
        Some(format!(
            "lr={},tol={:e},max_iter={}",
            self.learning_rate, self.tolerance, self.max_iterations
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use approx::assert_relative_eq;

    #[test]
    fn test_quadratic_minimum() {
        // g(x, p) = (x - p)^2, minimized at x = p with dy/dp = 1.
        let layer = Rc::new(
            Argmin::new("Quadratic", |x: &Scalar, p: &[Scalar]| {
                let neg_p = ops::times(&p[0], &Scalar::new(-1.0));
                ops::pow(&(x + &neg_p), 2.0)
            })
            .with_tolerance(1e-12),
        );
        let p = Scalar::new(1.75);
        let y = layer.call(&[p.clone()]);
        assert_relative_eq!(y.value(), 1.75, epsilon = 1e-9);
        crate::backward(&y).unwrap();
        assert_relative_eq!(p.grad().unwrap(), 1.0, epsilon = 1e-6);
        assert!(!layer.ill_conditioned());
    }

    #[test]
    fn test_broken_objective_keeps_iterate_and_surfaces_at_backward() {
        use crate::error::GradError;
        use crate::primitive::Op;

        // The objective's primitive returns no partials, so every inner
        // backward pass fails. Forward keeps the starting iterate and records
        // no solve outcome; the contract violation surfaces once the outer
        // backward pass reaches the node.
        let layer = Rc::new(
            Argmin::new("Broken", |x: &Scalar, _: &[Scalar]| {
                apply_scalars(Rc::new(Op::new("Stub", |v| v[0], |_| vec![])), &[x.clone()])
            })
            .with_initial(1.5),
        );
        let p = Scalar::new(2.0);
        let y = layer.call(&[p]);
        assert_eq!(y.value(), 1.5);
        assert_eq!(layer.last_status(), None);
        let result = crate::backward(&y);
        assert!(matches!(
            result,
            Err(GradError::DerivativeArityMismatch { .. })
        ));
    }

    #[test]
    fn test_exhausted_budget_reports_status() {
        let layer = Rc::new(
            Argmin::new("Slow", |x: &Scalar, p: &[Scalar]| {
                let neg_p = ops::times(&p[0], &Scalar::new(-1.0));
                ops::pow(&(x + &neg_p), 2.0)
            })
            .with_learning_rate(1e-6)
            .with_max_iterations(3),
        );
        let p = Scalar::new(5.0);
        let y = layer.call(&[p]);
        assert!(y.value().is_finite());
        assert!(matches!(
            layer.last_status(),
            Some(SolveStatus::Exhausted { .. })
        ));
    }
}
