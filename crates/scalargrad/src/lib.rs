//! scalargrad - reverse-mode automatic differentiation on scalar values.
//!
//! Callers compose differentiable operations ("primitives") into a graph of
//! [`Scalar`] nodes, then recover exact partial derivatives of any result with
//! respect to any input. Derivatives are written by hand only at the
//! primitive level.
//!
//! # Architecture
//!
//! ```text
//! Scalar  ──produced by──►  Primitive (trait)
//!    │                          │
//!    ▼                          ▼
//! parents: [Scalar]      forward / backward rules
//!    │
//!    ▼
//! trace(root)  ──descending creation order──►  backward(root)
//!                                                  │
//!                                                  ▼
//!                                        grad accumulated per node
//! ```
//!
//! Every node carries a sequence number from a monotone construction counter.
//! Because a node can only be built after its parents, sorting by that
//! counter is a topological sort; walking it in descending order guarantees a
//! node's gradient is fully accumulated from all consumers before it is
//! propagated further upstream, even on non-tree graphs.
//!
//! # Example
//!
//! ```
//! use scalargrad::{backward, ops, reset_grad, Scalar};
//!
//! // z = v + w + t + p with w = 2v, t = w*v, p = t^2
//! let v = Scalar::new(3.0);
//! let w = &v + &v;
//! let t = &w * &v;
//! let p = ops::pow(&t, 2.0);
//! let z = ops::sum(&[v.clone(), w, t, p]);
//! assert_eq!(z.value(), 351.0);
//!
//! backward(&z).unwrap();
//! assert_eq!(v.grad(), Some(447.0)); // 16v^3 + 4v + 3
//!
//! reset_grad(&z);
//! assert_eq!(v.grad(), None);
//! ```
//!
//! # Key types
//!
//! - [`Scalar`]: a value with provenance for differentiation
//! - [`Primitive`]: a named differentiable operation; [`Op`] builds one from
//!   closures
//! - [`backward`] / [`trace`] / [`reset_grad`]: the engine pass
//! - [`ops`]: the built-in primitive library
//! - [`implicit`]: fixed-point and argmin layers differentiated via the
//!   implicit function theorem

pub mod backward;
pub mod error;
pub mod implicit;
pub mod ops;
pub mod primitive;
pub mod scalar;

pub use backward::{backward, reset_grad, trace};
pub use error::GradError;
pub use primitive::{apply, apply_scalars, Op, Operand, Output, Primitive};
pub use scalar::Scalar;
