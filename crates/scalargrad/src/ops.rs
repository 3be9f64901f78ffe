//! Built-in primitive library: arithmetic, power, modulo, absolute value,
//! trigonometric, exponential and logarithm.
//!
//! Each primitive is a small struct implementing [`Primitive`]; the free
//! functions below apply them to graph nodes. `+` and `*` on `&Scalar` are
//! sugar for [`plus`] and [`times`].

use crate::error::GradError;
use crate::primitive::{apply_scalars, Primitive};
use crate::scalar::Scalar;
use std::ops::{Add, Mul};
use std::rc::Rc;

/// Addition of two values.
#[derive(Debug, Clone, Copy)]
pub struct Plus;

impl Primitive for Plus {
    fn name(&self) -> &str {
        "Plus"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0] + inputs[1]
    }

    fn backward(&self, _inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![1.0, 1.0])
    }
}

/// Sum of any number of values.
#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl Primitive for Sum {
    fn name(&self) -> &str {
        "Sum"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs.iter().sum()
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![1.0; inputs.len()])
    }
}

/// Product of two values.
#[derive(Debug, Clone, Copy)]
pub struct Times;

impl Primitive for Times {
    fn name(&self) -> &str {
        "Times"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0] * inputs[1]
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![inputs[1], inputs[0]])
    }
}

/// Raise to a fixed exponent. The exponent is configuration, not a parent.
#[derive(Debug, Clone, Copy)]
pub struct Pow {
    /// Fixed exponent applied to the single input.
    pub exponent: f64,
}

impl Primitive for Pow {
    fn name(&self) -> &str {
        "Pow"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0].powf(self.exponent)
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![self.exponent * inputs[0].powf(self.exponent - 1.0)])
    }

    fn config(&self) -> Option<String> {
        Some(format!("p={}", self.exponent))
    }
}

/// Euclidean remainder by a fixed modulus; derivative 1 away from the folds.
#[derive(Debug, Clone, Copy)]
pub struct Modulo {
    /// Fixed modulus applied to the single input.
    pub modulus: f64,
}

impl Primitive for Modulo {
    fn name(&self) -> &str {
        "Mod"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0].rem_euclid(self.modulus)
    }

    fn backward(&self, _inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![1.0])
    }

    fn config(&self) -> Option<String> {
        Some(format!("m={}", self.modulus))
    }
}

/// Absolute value; derivative is the sign of the input.
#[derive(Debug, Clone, Copy)]
pub struct Abs;

impl Primitive for Abs {
    fn name(&self) -> &str {
        "Abs"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0].abs()
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![if inputs[0] < 0.0 { -1.0 } else { 1.0 }])
    }
}

/// Sine.
#[derive(Debug, Clone, Copy)]
pub struct Sin;

impl Primitive for Sin {
    fn name(&self) -> &str {
        "Sin"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0].sin()
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![inputs[0].cos()])
    }
}

/// Cosine.
#[derive(Debug, Clone, Copy)]
pub struct Cos;

impl Primitive for Cos {
    fn name(&self) -> &str {
        "Cos"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0].cos()
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![-inputs[0].sin()])
    }
}

/// Natural exponential.
#[derive(Debug, Clone, Copy)]
pub struct Exp;

impl Primitive for Exp {
    fn name(&self) -> &str {
        "Exp"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0].exp()
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![inputs[0].exp()])
    }
}

/// Natural logarithm.
#[derive(Debug, Clone, Copy)]
pub struct Log;

impl Primitive for Log {
    fn name(&self) -> &str {
        "Log"
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        inputs[0].ln()
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok(vec![1.0 / inputs[0]])
    }
}

/// `x + y` with gradient tracking.
#[must_use]
pub fn plus(x: &Scalar, y: &Scalar) -> Scalar {
    apply_scalars(Rc::new(Plus), &[x.clone(), y.clone()])
}

/// Sum of all `terms` with gradient tracking.
#[must_use]
pub fn sum(terms: &[Scalar]) -> Scalar {
    apply_scalars(Rc::new(Sum), terms)
}

/// `x * y` with gradient tracking.
#[must_use]
pub fn times(x: &Scalar, y: &Scalar) -> Scalar {
    apply_scalars(Rc::new(Times), &[x.clone(), y.clone()])
}

/// `x^exponent` with gradient tracking.
#[must_use]
pub fn pow(x: &Scalar, exponent: f64) -> Scalar {
    apply_scalars(Rc::new(Pow { exponent }), &[x.clone()])
}

/// `x mod modulus` (Euclidean) with gradient tracking.
#[must_use]
pub fn modulo(x: &Scalar, modulus: f64) -> Scalar {
    apply_scalars(Rc::new(Modulo { modulus }), &[x.clone()])
}

/// `|x|` with gradient tracking.
#[must_use]
pub fn abs(x: &Scalar) -> Scalar {
    apply_scalars(Rc::new(Abs), &[x.clone()])
}

/// `sin(x)` with gradient tracking.
#[must_use]
pub fn sin(x: &Scalar) -> Scalar {
    apply_scalars(Rc::new(Sin), &[x.clone()])
}

/// `cos(x)` with gradient tracking.
#[must_use]
pub fn cos(x: &Scalar) -> Scalar {
    apply_scalars(Rc::new(Cos), &[x.clone()])
}

/// `exp(x)` with gradient tracking.
#[must_use]
pub fn exp(x: &Scalar) -> Scalar {
    apply_scalars(Rc::new(Exp), &[x.clone()])
}

/// `ln(x)` with gradient tracking.
#[must_use]
pub fn log(x: &Scalar) -> Scalar {
    apply_scalars(Rc::new(Log), &[x.clone()])
}

impl Add for &Scalar {
    type Output = Scalar;

    fn add(self, rhs: Self) -> Scalar {
        plus(self, rhs)
    }
}

impl Mul for &Scalar {
    type Output = Scalar;

    fn mul(self, rhs: Self) -> Scalar {
        times(self, rhs)
    }
}
