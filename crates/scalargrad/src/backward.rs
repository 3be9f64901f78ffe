//! Graph linearization and the backward (gradient accumulation) pass.

use crate::error::GradError;
use crate::scalar::Scalar;
use std::collections::HashSet;

/// All nodes reachable from `root` through parent links, `root` included,
/// deduplicated by node identity and sorted by sequence number **descending**.
///
/// Creation order is a topological order of the graph (a node is always
/// constructed after its parents), so descending order visits every consumer
/// of a node strictly before the node itself. That is what makes single-pass
/// gradient accumulation in [`backward`] correct on non-tree graphs: by the
/// time a node is processed, every consumer has already contributed its share
/// to the node's gradient.
#[must_use]
pub fn trace(root: &Scalar) -> Vec<Scalar> {
    let mut seen: HashSet<*const ()> = HashSet::new();
    let mut stack = vec![root.clone()];
    let mut nodes = Vec::new();
    while let Some(node) = stack.pop() {
        if !seen.insert(node.as_ptr()) {
            continue;
        }
        stack.extend(node.parents().iter().cloned());
        nodes.push(node);
    }
    nodes.sort_by(|a, b| b.seq().cmp(&a.seq()));
    nodes
}

/// Computes the derivative of `root` with respect to every node in its graph.
///
/// Seeds `root` with gradient 1.0, then walks the trace applying the chain
/// rule at each produced node: each parent receives `local_partial * grad`,
/// summed over all of the parent's consumers. Read the results off the leaves
/// with [`Scalar::grad`].
///
/// Gradients accumulate across calls; use [`reset_grad`] between independent
/// passes over graphs that share nodes.
///
/// # Errors
///
/// [`GradError::DerivativeArityMismatch`] when a producer's derivative rule
/// returns a different number of partials than the node has parents.
pub fn backward(root: &Scalar) -> Result<(), GradError> {
    root.seed_grad(1.0);
    for node in trace(root) {
        let Some(producer) = node.producer() else {
            continue;
        };
        let inputs: Vec<f64> = node.parents().iter().map(Scalar::value).collect();
        let partials = producer.backward(&inputs)?;
        if partials.len() != node.parents().len() {
            return Err(GradError::DerivativeArityMismatch {
                primitive: producer.name().to_string(),
                expected: node.parents().len(),
                returned: partials.len(),
            });
        }
        // Complete by construction: every consumer of this node has a larger
        // sequence number and was processed above.
        let grad = node.grad().unwrap_or(0.0);
        for (parent, partial) in node.parents().iter().zip(partials) {
            parent.add_grad(partial * grad);
        }
    }
    Ok(())
}

/// Clears the gradient of every node reachable from `root` back to unset.
pub fn reset_grad(root: &Scalar) {
    for node in trace(root) {
        node.clear_grad();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use crate::primitive::{apply_scalars, Op};
    use std::rc::Rc;

    #[test]
    fn test_trace_of_leaf() {
        let x = Scalar::new(1.0);
        let nodes = trace(&x);
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].ptr_eq(&x));
    }

    #[test]
    fn test_trace_dedups_shared_nodes() {
        let x = Scalar::new(2.0);
        let y = ops::times(&x, &x);
        let nodes = trace(&y);
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_trace_is_reverse_topological() {
        let x = Scalar::new(2.0);
        let a = ops::pow(&x, 2.0);
        let b = ops::plus(&a, &x);
        let c = ops::times(&b, &a);
        let nodes = trace(&c);
        for window in nodes.windows(2) {
            assert!(window[0].seq() > window[1].seq());
        }
        // Every parent of every traced node appears in the trace, after it.
        for (i, node) in nodes.iter().enumerate() {
            for parent in node.parents() {
                let pos = nodes
                    .iter()
                    .position(|n| n.ptr_eq(parent))
                    .expect("parent missing from trace");
                assert!(pos > i);
            }
        }
    }

    #[test]
    fn test_linear_chain_rule() {
        // y = c * x  =>  dy/dx = c
        for c in [-3.0, 0.0, 0.5, 7.25] {
            let scale = Rc::new(Op::new("Scale", move |v| c * v[0], move |_| vec![c]));
            let x = Scalar::new(1.7);
            let y = apply_scalars(scale, &[x.clone()]);
            backward(&y).unwrap();
            assert_eq!(x.grad(), Some(c));
        }
    }

    #[test]
    fn test_double_composition() {
        let double = Rc::new(Op::new("Double", |v| 2.0 * v[0], |_| vec![2.0]));
        let x = Scalar::new(3.14);
        let y = apply_scalars(double.clone(), &[x.clone()]);
        let z = apply_scalars(double, &[y]);
        assert_eq!(z.value(), 12.56);
        backward(&z).unwrap();
        assert_eq!(x.grad(), Some(4.0));
    }

    #[test]
    fn test_shared_subexpression_accumulation() {
        // y = x * x: x is consumed twice, dy/dx = 2x.
        let x = Scalar::new(5.0);
        let y = ops::times(&x, &x);
        backward(&y).unwrap();
        assert_eq!(x.grad(), Some(10.0));
    }

    #[test]
    fn test_diamond_accumulation() {
        // w = x^2; z = w + w*x. dz/dx = 2x + 3x^2 = 10 + 75 = 85 at x=5.
        let x = Scalar::new(5.0);
        let w = ops::pow(&x, 2.0);
        let z = ops::plus(&w, &ops::times(&w, &x));
        backward(&z).unwrap();
        assert_eq!(x.grad(), Some(85.0));
    }

    #[test]
    fn test_reset_then_backward_is_idempotent() {
        let x = Scalar::new(3.0);
        let y = ops::pow(&x, 3.0);
        backward(&y).unwrap();
        let first = x.grad();
        reset_grad(&y);
        assert_eq!(x.grad(), None);
        backward(&y).unwrap();
        assert_eq!(x.grad(), first);
    }

    #[test]
    fn test_backward_without_reset_doubles() {
        let x = Scalar::new(3.0);
        let y = ops::pow(&x, 2.0);
        backward(&y).unwrap();
        assert_eq!(x.grad(), Some(6.0));
        backward(&y).unwrap();
        assert_eq!(x.grad(), Some(12.0));
    }

    #[test]
    fn test_derivative_arity_mismatch() {
        // Two parents, one partial returned.
        let bad = Rc::new(Op::new("Bad", |v| v[0] + v[1], |_| vec![1.0]));
        let x = Scalar::new(1.0);
        let y = Scalar::new(2.0);
        let z = apply_scalars(bad, &[x, y]);
        let result = backward(&z);
        assert!(matches!(
            result,
            Err(GradError::DerivativeArityMismatch {
                expected: 2,
                returned: 1,
                ..
            })
        ));
    }
}
