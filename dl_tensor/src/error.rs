//! Error type shared by every tensor operation.

use std::fmt;

use thiserror::Error;

use crate::element::DType;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TensorError>;

/// Failures raised by tensor operations.
///
/// Every check that can produce one of these runs before the operation
/// allocates or writes a buffer, so an `Err` leaves all tensors untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// Operand shapes are incompatible, or a reshape/permute target is invalid.
    #[error("{op}: shape mismatch, expected {expected}, got {actual}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        actual: String,
    },

    /// The operation requires a different number of dimensions.
    #[error("{op}: expected rank {expected}, got {actual}")]
    RankMismatch {
        op: &'static str,
        expected: String,
        actual: usize,
    },

    /// An axis argument is outside the tensor's dimensions.
    #[error("{op}: axis {axis} is out of range for a tensor with {ndim} dimensions")]
    InvalidAxis {
        op: &'static str,
        axis: usize,
        ndim: usize,
    },

    /// The element type has no kernel for this operation.
    #[error("{op} is not supported for element type {dtype}")]
    UnsupportedOperation { op: &'static str, dtype: DType },

    /// Integer division with a zero divisor.
    #[error("{op}: division by zero for element type {dtype}")]
    DivisionByZero { op: &'static str, dtype: DType },

    /// An index (after negative normalization) falls outside its axis.
    #[error("index {index} is out of bounds for axis {axis} with size {size}")]
    IndexOutOfBounds {
        axis: usize,
        index: isize,
        size: usize,
    },
}

impl TensorError {
    pub(crate) fn shape_mismatch(
        op: &'static str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        TensorError::ShapeMismatch {
            op,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn rank_mismatch(
        op: &'static str,
        expected: impl fmt::Display,
        actual: usize,
    ) -> Self {
        TensorError::RankMismatch {
            op,
            expected: expected.to_string(),
            actual,
        }
    }

    /// Short name of the failure kind, handy in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            TensorError::ShapeMismatch { .. } => "shape-mismatch",
            TensorError::RankMismatch { .. } => "rank-mismatch",
            TensorError::InvalidAxis { .. } => "invalid-axis",
            TensorError::UnsupportedOperation { .. } => "unsupported-operation",
            TensorError::DivisionByZero { .. } => "division-by-zero",
            TensorError::IndexOutOfBounds { .. } => "index-out-of-bounds",
        }
    }
}
