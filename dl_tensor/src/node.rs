//! Operation records attached to tensors produced by an operation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::Backend;
use crate::element::{BinaryOp, Element, UnaryOp};
use crate::index::Index;
use crate::tensor::Tensor;

/// Global counter for unique node IDs.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_node_id() -> NodeId {
    NodeId(NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Unique identifier for a tensor in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Primitive operations that can appear in the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorOp {
    /// Materialized copy of the source.
    Identity,

    // === Unary element-wise ===
    Neg,
    Square,
    Exp,
    Log,
    Sqrt,
    Tanh,
    Sin,
    Cos,
    Tan,
    Relu,
    Sigmoid,
    /// Power with a fixed exponent.
    Pow {
        exponent: f64,
    },

    // === Binary element-wise (suffix broadcasting) ===
    Add,
    Sub,
    Mul,
    Div,

    // === Linear algebra ===
    MatMul {
        transpose_lhs: bool,
        transpose_rhs: bool,
    },

    // === Shape ===
    /// Reshape sharing the source buffer.
    View,
    Permute {
        order: Vec<usize>,
    },
    /// Replication along new leading axes and size-1 axes.
    Expand,
    /// Joins the sources along `axis`; `lengths[i]` is the extent of source `i`.
    Concat {
        axis: usize,
        lengths: Vec<usize>,
    },
    /// Reverses the order of elements along `axis`.
    Reverse {
        axis: usize,
    },

    // === Indexing ===
    /// Read of a sub-tensor.
    Select {
        index: Vec<Index>,
    },
    /// Write of `sources[1]` into the region of `sources[0]`.
    Replace {
        index: Vec<Index>,
    },
    Gather {
        axis: usize,
        indices: Arc<[usize]>,
    },
    Scatter {
        axis: usize,
        indices: Arc<[usize]>,
    },

    // === Reductions ===
    Sum {
        axes: Vec<usize>,
        keepdims: bool,
    },
}

impl TensorOp {
    /// Short label used in logs and graph dumps.
    pub fn symbol(&self) -> &'static str {
        match self {
            TensorOp::Identity => "identity",
            TensorOp::Neg => "neg",
            TensorOp::Square => "square",
            TensorOp::Exp => "exp",
            TensorOp::Log => "log",
            TensorOp::Sqrt => "sqrt",
            TensorOp::Tanh => "tanh",
            TensorOp::Sin => "sin",
            TensorOp::Cos => "cos",
            TensorOp::Tan => "tan",
            TensorOp::Relu => "relu",
            TensorOp::Sigmoid => "sigmoid",
            TensorOp::Pow { .. } => "pow",
            TensorOp::Add => "+",
            TensorOp::Sub => "-",
            TensorOp::Mul => "×",
            TensorOp::Div => "÷",
            TensorOp::MatMul { .. } => "mmul",
            TensorOp::View => "view",
            TensorOp::Permute { .. } => "permute",
            TensorOp::Expand => "expand",
            TensorOp::Concat { .. } => "concat",
            TensorOp::Reverse { .. } => "reverse",
            TensorOp::Select { .. } => "select",
            TensorOp::Replace { .. } => "replace",
            TensorOp::Gather { .. } => "gather",
            TensorOp::Scatter { .. } => "scatter",
            TensorOp::Sum { .. } => "sum",
        }
    }
}

impl From<BinaryOp> for TensorOp {
    fn from(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => TensorOp::Add,
            BinaryOp::Sub => TensorOp::Sub,
            BinaryOp::Mul => TensorOp::Mul,
            BinaryOp::Div => TensorOp::Div,
        }
    }
}

impl TensorOp {
    /// Graph record for a differentiable unary kernel. Heaviside has none.
    pub(crate) fn from_unary(op: UnaryOp) -> Option<TensorOp> {
        Some(match op {
            UnaryOp::Neg => TensorOp::Neg,
            UnaryOp::Square => TensorOp::Square,
            UnaryOp::Exp => TensorOp::Exp,
            UnaryOp::Log => TensorOp::Log,
            UnaryOp::Sqrt => TensorOp::Sqrt,
            UnaryOp::Tanh => TensorOp::Tanh,
            UnaryOp::Sin => TensorOp::Sin,
            UnaryOp::Cos => TensorOp::Cos,
            UnaryOp::Tan => TensorOp::Tan,
            UnaryOp::Relu => TensorOp::Relu,
            UnaryOp::Sigmoid => TensorOp::Sigmoid,
            UnaryOp::Heaviside => return None,
        })
    }
}

/// How a tensor was produced: the operation and the tensors it read.
///
/// Only built when at least one source requires gradients.
pub struct Context<E: Element, B: Backend> {
    pub(crate) op: TensorOp,
    pub(crate) sources: Vec<Tensor<E, B>>,
}

impl<E: Element, B: Backend> Context<E, B> {
    pub fn op(&self) -> &TensorOp {
        &self.op
    }

    pub fn sources(&self) -> &[Tensor<E, B>] {
        &self.sources
    }
}

impl<E: Element, B: Backend> fmt::Debug for Context<E, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("op", &self.op.symbol())
            .field(
                "sources",
                &self.sources.iter().map(|s| s.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
