//! # dl_tensor - Tensors with reverse-mode autodiff over pluggable backends
//!
//! Tensors are eager: every operation computes its values immediately and,
//! when an input requires gradients, records how the result was produced.
//! A backward pass walks those records from a result back to its leaves.
//!
//! ## Overview
//!
//! - [`Shape`], [`Layout`] and [`Index`] - shapes, strides and subscripts
//! - [`Backend`] - the kernel and buffer contract a device implements
//! - [`Tensor`] - values, layout and provenance behind a shared handle
//! - [`Gradients`] - result of a backward pass
//! - [`gradcheck`] - finite-difference verification
//!
//! Binary operations broadcast only when the lower-rank shape is a suffix of
//! the higher-rank one (or a scalar); use [`Tensor::expand`] to replicate
//! size-1 axes explicitly.
//!
//! ## Example
//!
//! ```ignore
//! use dl_tensor::prelude::*;
//! use dl_backend_cpu::CpuTensor;
//!
//! let a = CpuTensor::<f32>::var("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [3, 2])?;
//! let b = CpuTensor::<f32>::from_vec(vec![1.0, 2.0], [2])?;
//!
//! let result = (&a + &b) * 2.0;
//! let grads = result.gradients(&[&a], false)?;
//! assert_eq!(grads[0].to_vec(), vec![2.0; 6]);
//! ```

pub mod backend;
pub mod backward;
pub mod config;
pub mod element;
pub mod error;
pub mod gradcheck;
pub mod graph;
pub mod index;
pub mod node;
mod ops;
pub mod shape;
pub mod tensor;

pub use backend::{ArgReduce, Backend, BufferRef, Gemm};
pub use backward::Gradients;
pub use config::{BackwardOptions, GradCheckConfig};
pub use element::{BinaryOp, DType, Element, UnaryOp};
pub use error::{Result, TensorError};
pub use gradcheck::{check_gradients, numerical_gradients, GradCheckReport};
pub use index::Index;
pub use node::{Context, NodeId, TensorOp};
pub use shape::{Indices, Layout, Shape, Strides};
pub use tensor::Tensor;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::Backend;
    pub use crate::backward::Gradients;
    pub use crate::config::BackwardOptions;
    pub use crate::element::Element;
    pub use crate::error::{Result, TensorError};
    pub use crate::index::Index;
    pub use crate::s;
    pub use crate::shape::Shape;
    pub use crate::tensor::Tensor;
}
