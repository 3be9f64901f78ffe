//! The `Scalar` node type: one computed (or input) value and its provenance.

use crate::primitive::Primitive;
use smallvec::SmallVec;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

// Process-wide construction counter. Creation order is a topological order of
// the graph: a node can only reference parents that already exist, so its
// sequence number is strictly greater than theirs. The backward pass relies on
// this (see `trace`).
static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
}

struct ScalarInner {
    /// Forward value; immutable once constructed.
    value: f64,
    /// The primitive that computed `value`; `None` for leaves.
    producer: Option<Rc<dyn Primitive>>,
    /// Differentiable arguments to the producer, in call order.
    parents: SmallVec<[Scalar; 2]>,
    /// Gradient accumulator; unset until a backward pass touches it.
    grad: Cell<Option<f64>>,
    /// Construction sequence number; strictly greater than every parent's.
    seq: u64,
}

/// A differentiable scalar value in the computation graph.
///
/// `Scalar` is a cheap-to-clone handle (`Rc` internally). The wrapped value is
/// immutable; only the gradient accumulator mutates, during [`backward`] and
/// [`reset_grad`].
///
/// [`backward`]: crate::backward
/// [`reset_grad`]: crate::reset_grad
///
/// # Example
///
/// ```
/// use scalargrad::{backward, ops, Scalar};
///
/// let x = Scalar::new(3.0);
/// let y = ops::pow(&x, 2.0);
/// backward(&y).unwrap();
/// assert_eq!(x.grad(), Some(6.0));
/// ```
#[derive(Clone)]
pub struct Scalar {
    inner: Rc<ScalarInner>,
}

impl Scalar {
    /// Creates a leaf node (an external input) from a raw value.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            inner: Rc::new(ScalarInner {
                value,
                producer: None,
                parents: SmallVec::new(),
                grad: Cell::new(None),
                seq: next_seq(),
            }),
        }
    }

    /// Creates a node computed by `producer` from `parents`.
    ///
    /// The new node's sequence number is assigned here, after every parent
    /// already exists, which keeps creation order a valid topological order.
    /// Prefer [`apply_scalars`](crate::apply_scalars) over calling this
    /// directly.
    #[must_use]
    pub fn with_producer(value: f64, producer: Rc<dyn Primitive>, parents: &[Scalar]) -> Self {
        Self {
            inner: Rc::new(ScalarInner {
                value,
                producer: Some(producer),
                parents: parents.iter().cloned().collect(),
                grad: Cell::new(None),
                seq: next_seq(),
            }),
        }
    }

    /// The forward value.
    pub fn value(&self) -> f64 {
        self.inner.value
    }

    /// The accumulated gradient, or `None` if no backward pass has reached
    /// this node since the last reset.
    pub fn grad(&self) -> Option<f64> {
        self.inner.grad.get()
    }

    /// Construction sequence number.
    pub fn seq(&self) -> u64 {
        self.inner.seq
    }

    /// The primitive that produced this node, if any.
    pub fn producer(&self) -> Option<&Rc<dyn Primitive>> {
        self.inner.producer.as_ref()
    }

    /// The differentiable arguments this node was computed from.
    pub fn parents(&self) -> &[Scalar] {
        &self.inner.parents
    }

    /// Whether this node is an external input.
    pub fn is_leaf(&self) -> bool {
        self.inner.producer.is_none()
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Scalar) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity key for deduplication during traversal.
    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner).cast()
    }

    /// Accumulates a gradient contribution, treating unset as 0.0.
    pub(crate) fn add_grad(&self, g: f64) {
        let current = self.inner.grad.get().unwrap_or(0.0);
        self.inner.grad.set(Some(current + g));
    }

    /// Overwrites the gradient (used to seed the root of a backward pass).
    pub(crate) fn seed_grad(&self, g: f64) {
        self.inner.grad.set(Some(g));
    }

    /// Clears the gradient back to unset.
    pub(crate) fn clear_grad(&self) {
        self.inner.grad.set(None);
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.producer() {
            None => write!(f, "{}", self.value())?,
            Some(producer) => {
                let mut args: Vec<String> =
                    self.parents().iter().map(|p| p.value().to_string()).collect();
                if let Some(config) = producer.config() {
                    args.push(config);
                }
                write!(f, "{} = {}({})", self.value(), producer.name(), args.join(","))?;
            }
        }
        if let Some(grad) = self.grad() {
            write!(f, " <grad={grad}>")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scalar")
            .field("value", &self.value())
            .field("seq", &self.seq())
            .field("grad", &self.grad())
            .field("producer", &self.producer().map(|p| p.name().to_string()))
            .finish()
    }
}

// Comparison is by value, not identity: primitives that branch on sign or
// magnitude compare nodes like numbers.

impl PartialEq for Scalar {
    fn eq(&self, other: &Scalar) -> bool {
        self.value() == other.value()
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Scalar) -> Option<std::cmp::Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl PartialEq<f64> for Scalar {
    fn eq(&self, other: &f64) -> bool {
        self.value() == *other
    }
}

impl PartialOrd<f64> for Scalar {
    fn partial_cmp(&self, other: &f64) -> Option<std::cmp::Ordering> {
        self.value().partial_cmp(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;

    #[test]
    fn test_leaf_construction() {
        let x = Scalar::new(1.5);
        assert_eq!(x.value(), 1.5);
        assert!(x.is_leaf());
        assert!(x.parents().is_empty());
        assert_eq!(x.grad(), None);
    }

    #[test]
    fn test_with_producer_keeps_parent_handles() {
        use crate::ops::Plus;
        use std::rc::Rc;

        let x = Scalar::new(2.0);
        let y = Scalar::new(3.0);
        let z = Scalar::with_producer(5.0, Rc::new(Plus), &[x.clone(), y.clone()]);
        assert_eq!(z.parents().len(), 2);
        assert!(z.parents()[0].ptr_eq(&x));
        assert!(z.parents()[1].ptr_eq(&y));
        // Parent handles are shared, not duplicated nodes.
        assert_eq!(Rc::strong_count(&x.inner), 2);
    }

    #[test]
    fn test_seq_monotonic() {
        let a = Scalar::new(1.0);
        let b = Scalar::new(2.0);
        let c = ops::plus(&a, &b);
        assert!(b.seq() > a.seq());
        assert!(c.seq() > a.seq());
        assert!(c.seq() > b.seq());
    }

    #[test]
    fn test_seq_exceeds_all_parents() {
        let x = Scalar::new(3.0);
        let y = ops::pow(&x, 2.0);
        let z = ops::plus(&y, &x);
        for parent in z.parents() {
            assert!(parent.seq() < z.seq());
        }
    }

    #[test]
    fn test_value_comparison() {
        let a = Scalar::new(1.0);
        let b = Scalar::new(2.0);
        assert!(a < b);
        assert!(b > a);
        assert!(a < 1.5);
        assert!(b > 1.5);
        assert_eq!(a, 1.0);
        // Equal values compare equal even across distinct nodes.
        assert_eq!(a, Scalar::new(1.0));
        assert!(!a.ptr_eq(&Scalar::new(1.0)));
    }

    #[test]
    fn test_display_leaf() {
        let x = Scalar::new(3.25);
        assert_eq!(format!("{x}"), "3.25");
        x.add_grad(2.0);
        assert_eq!(format!("{x}"), "3.25 <grad=2>");
    }

    #[test]
    fn test_display_produced() {
        let x = Scalar::new(3.0);
        let y = ops::pow(&x, 2.0);
        assert_eq!(format!("{y}"), "9 = Pow(3,p=2)");
    }
}
