//! The `Primitive` trait and the dual-mode application entry point.

use crate::error::GradError;
use crate::scalar::Scalar;
use std::fmt;
use std::rc::Rc;

/// A named differentiable operation with paired forward/backward rules.
///
/// A primitive is stateless and reentrant: the same instance may be applied
/// any number of times, including from within another primitive's own rules
/// (the implicit-layer pattern builds a local subgraph and runs an independent
/// backward pass inside [`backward`](Primitive::backward)).
///
/// Non-differentiable configuration (an exponent, a modulus, a tolerance) is
/// carried by the implementing type itself, so each primitive's auxiliary
/// shape is statically known and is replayed automatically at backward time.
pub trait Primitive: fmt::Debug {
    /// Label for display and error messages.
    fn name(&self) -> &str;

    /// Pure forward computation at the given inputs.
    fn forward(&self, inputs: &[f64]) -> f64;

    /// One partial derivative per input, evaluated at the forward-pass inputs
    /// (not at the output).
    ///
    /// The returned length must equal the number of inputs; the engine checks
    /// this against the node's parents when a backward pass reaches the node.
    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError>;

    /// Display form of the configuration, if any (e.g. `"p=2"`).
    fn config(&self) -> Option<String> {
        None
    }
}

/// A positional argument to [`apply`]: either a graph node or a raw number.
///
/// Mixing the two kinds in one application is not supported and surfaces as
/// [`GradError::MixedArgumentKind`].
#[derive(Debug, Clone)]
pub enum Operand {
    /// A node participating in differentiation.
    Node(Scalar),
    /// A plain number; selects numeric passthrough when all arguments are raw.
    Value(f64),
}

impl From<Scalar> for Operand {
    fn from(node: Scalar) -> Self {
        Operand::Node(node)
    }
}

impl From<&Scalar> for Operand {
    fn from(node: &Scalar) -> Self {
        Operand::Node(node.clone())
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Value(value)
    }
}

/// Result of [`apply`]: a new graph node, or a plain number in numeric mode.
#[derive(Debug, Clone)]
pub enum Output {
    /// New node recording the application in the graph.
    Node(Scalar),
    /// Plain forward result; no node was constructed.
    Value(f64),
}

impl Output {
    /// The numeric result, whichever mode produced it.
    pub fn value(&self) -> f64 {
        match self {
            Output::Node(node) => node.value(),
            Output::Value(value) => *value,
        }
    }

    /// The graph node, if one was constructed.
    pub fn node(self) -> Option<Scalar> {
        match self {
            Output::Node(node) => Some(node),
            Output::Value(_) => None,
        }
    }
}

/// Applies a primitive in node mode or numeric mode.
///
/// All-node arguments compute the forward value from the parents' values and
/// record a new node with the primitive as producer. All-number arguments
/// degenerate to a plain `forward` call with no graph construction.
///
/// # Errors
///
/// [`GradError::MixedArgumentKind`] when node and number arguments are mixed;
/// [`GradError::EmptyArguments`] when `args` is empty.
pub fn apply(primitive: Rc<dyn Primitive>, args: &[Operand]) -> Result<Output, GradError> {
    let mut nodes: Vec<Scalar> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    for arg in args {
        match arg {
            Operand::Node(node) => nodes.push(node.clone()),
            Operand::Value(value) => values.push(*value),
        }
    }
    if nodes.is_empty() && values.is_empty() {
        return Err(GradError::EmptyArguments {
            primitive: primitive.name().to_string(),
        });
    }
    if !nodes.is_empty() && !values.is_empty() {
        return Err(GradError::MixedArgumentKind {
            primitive: primitive.name().to_string(),
        });
    }
    if nodes.is_empty() {
        Ok(Output::Value(primitive.forward(&values)))
    } else {
        Ok(Output::Node(apply_scalars(primitive, &nodes)))
    }
}

/// Applies a primitive to graph nodes, recording the application.
///
/// This is the statically all-node path used by the typed helpers in
/// [`ops`](crate::ops) and by implicit layers building local subgraphs.
#[must_use]
pub fn apply_scalars(primitive: Rc<dyn Primitive>, args: &[Scalar]) -> Scalar {
    let inputs: Vec<f64> = args.iter().map(Scalar::value).collect();
    let value = primitive.forward(&inputs);
    Scalar::with_producer(value, primitive, args)
}

/// A primitive defined by a pair of closures.
///
/// Covers one-off or user-supplied operations without a dedicated type:
///
/// ```
/// use scalargrad::{backward, apply_scalars, Op, Scalar};
/// use std::rc::Rc;
///
/// let double = Rc::new(Op::new("Double", |v| 2.0 * v[0], |_| vec![2.0]));
/// let x = Scalar::new(3.14);
/// let y = apply_scalars(double, &[x.clone()]);
/// backward(&y).unwrap();
/// assert_eq!(x.grad(), Some(2.0));
/// ```
pub struct Op {
    name: String,
    forward: Box<dyn Fn(&[f64]) -> f64>,
    backward: Box<dyn Fn(&[f64]) -> Vec<f64>>,
}

impl Op {
    /// Creates a primitive from a name and forward/backward closures.
    pub fn new<F, B>(name: impl Into<String>, forward: F, backward: B) -> Self
    where
        F: Fn(&[f64]) -> f64 + 'static,
        B: Fn(&[f64]) -> Vec<f64> + 'static,
    {
        Self {
            name: name.into(),
            forward: Box::new(forward),
            backward: Box::new(backward),
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Op").field("name", &self.name).finish()
    }
}

impl Primitive for Op {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, inputs: &[f64]) -> f64 {
        (self.forward)(inputs)
    }

    fn backward(&self, inputs: &[f64]) -> Result<Vec<f64>, GradError> {
        Ok((self.backward)(inputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Plus, Times};

    #[test]
    fn test_apply_node_mode() {
        let x = Scalar::new(2.0);
        let y = Scalar::new(3.0);
        let out = apply(Rc::new(Plus), &[Operand::from(&x), Operand::from(&y)]).unwrap();
        let node = out.node().unwrap();
        assert_eq!(node.value(), 5.0);
        assert_eq!(node.producer().unwrap().name(), "Plus");
        assert_eq!(node.parents().len(), 2);
        assert!(node.parents()[0].ptr_eq(&x));
        assert!(node.parents()[1].ptr_eq(&y));
    }

    #[test]
    fn test_apply_numeric_mode() {
        let out = apply(Rc::new(Times), &[Operand::from(2.0), Operand::from(3.0)]).unwrap();
        assert!(matches!(out, Output::Value(_)));
        assert_eq!(out.value(), 6.0);
    }

    #[test]
    fn test_apply_mixed_kinds_is_error() {
        let x = Scalar::new(2.0);
        let result = apply(Rc::new(Plus), &[Operand::from(&x), Operand::from(3.0)]);
        assert!(matches!(
            result,
            Err(GradError::MixedArgumentKind { .. })
        ));
    }

    #[test]
    fn test_apply_empty_is_error() {
        let result = apply(Rc::new(Plus), &[]);
        assert!(matches!(result, Err(GradError::EmptyArguments { .. })));
    }

    #[test]
    fn test_op_closure_primitive() {
        let halve = Op::new("Halve", |v| v[0] / 2.0, |_| vec![0.5]);
        assert_eq!(halve.name(), "Halve");
        assert_eq!(halve.forward(&[8.0]), 4.0);
        assert_eq!(halve.backward(&[8.0]).unwrap(), vec![0.5]);
    }
}
