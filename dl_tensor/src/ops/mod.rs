//! Tensor operations. Each submodule adds inherent methods to [`Tensor`].
//!
//! [`Tensor`]: crate::Tensor

mod elementwise;
mod join;
mod layout;
mod matmul;
mod reduce;
mod subscript;
