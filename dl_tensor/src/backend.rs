//! Backend trait - the device kernel and memory contract.
//!
//! The tensor layer never touches element memory directly. It allocates
//! buffers, moves data between them and runs numeric kernels exclusively
//! through the functions below, so a backend only has to get these right for
//! autodiff to work on its device.
//!
//! Buffers are reference-counted handles: cloning a buffer shares the same
//! memory, and the memory is released when the last handle is dropped. Views
//! rely on this to alias their parent's storage.
//!
//! Unless stated otherwise a kernel reads `count` contiguous elements from
//! each source region and writes `count` contiguous elements to the
//! destination region. Source and destination regions may overlap, including
//! being the same buffer.

use std::fmt;

use crate::element::{BinaryOp, Element, UnaryOp};
use crate::error::Result;
use crate::shape::{Layout, Shape};

/// A position inside a buffer.
#[derive(Debug)]
pub struct BufferRef<'a, T> {
    pub buffer: &'a T,
    pub offset: usize,
}

impl<'a, T> BufferRef<'a, T> {
    pub fn new(buffer: &'a T, offset: usize) -> Self {
        BufferRef { buffer, offset }
    }

    /// Region starting at the front of a buffer.
    pub fn start(buffer: &'a T) -> Self {
        BufferRef { buffer, offset: 0 }
    }

    /// The same buffer, `delta` elements further in.
    pub fn advance(&self, delta: usize) -> Self {
        BufferRef {
            buffer: self.buffer,
            offset: self.offset + delta,
        }
    }
}

impl<T> Clone for BufferRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BufferRef<'_, T> {}

/// Which extremum an arg-reduction looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgReduce {
    Max,
    Min,
}

/// Dimensions of `dst[m, n] = alpha * op(lhs)[m, k] * op(rhs)[k, n] + beta * dst`.
///
/// `lhs` is stored as `[m, k]`, or `[k, m]` when `transpose_lhs` is set;
/// likewise `rhs` is `[k, n]` or `[n, k]`. All three matrices are row-major
/// and contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gemm {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub transpose_lhs: bool,
    pub transpose_rhs: bool,
}

/// Compute backend: buffer management plus numeric kernels, per element type.
pub trait Backend: Clone + Copy + fmt::Debug + Send + Sync + 'static {
    /// Shared handle to device memory holding elements of type `E`.
    type Buffer<E: Element>: Clone + fmt::Debug + Send + Sync;

    /// Backend name for diagnostics.
    const NAME: &'static str;

    // === Memory ===

    /// Allocate a zero-filled buffer.
    fn allocate<E: Element>(count: usize) -> Self::Buffer<E>;

    /// Move host data into a new buffer.
    fn from_vec<E: Element>(data: Vec<E>) -> Self::Buffer<E>;

    /// Number of elements the buffer can hold.
    fn capacity<E: Element>(buffer: &Self::Buffer<E>) -> usize;

    /// Whether two handles refer to the same memory.
    fn same_buffer<E: Element>(a: &Self::Buffer<E>, b: &Self::Buffer<E>) -> bool;

    /// Copy `count` elements back to the host.
    fn read<E: Element>(src: BufferRef<'_, Self::Buffer<E>>, count: usize) -> Vec<E>;

    /// Set `count` elements to `value`.
    fn fill<E: Element>(dst: BufferRef<'_, Self::Buffer<E>>, count: usize, value: E);

    /// Copy `count` contiguous elements.
    fn assign<E: Element>(
        src: BufferRef<'_, Self::Buffer<E>>,
        dst: BufferRef<'_, Self::Buffer<E>>,
        count: usize,
    );

    /// Copy between two arbitrarily strided layouts of the same shape.
    /// Zero strides in `src_layout` replicate elements.
    fn copy_strided<E: Element>(
        src: &Self::Buffer<E>,
        src_layout: &Layout,
        dst: &Self::Buffer<E>,
        dst_layout: &Layout,
    );

    // === Element-wise ===

    /// `dst = op(src)`. Fails when `E` does not support `op`.
    fn unary<E: Element>(
        op: UnaryOp,
        src: BufferRef<'_, Self::Buffer<E>>,
        dst: BufferRef<'_, Self::Buffer<E>>,
        count: usize,
    ) -> Result<()>;

    /// `dst = src ^ exponent`. Fails where `E` cannot represent the power.
    fn pow<E: Element>(
        src: BufferRef<'_, Self::Buffer<E>>,
        exponent: E,
        dst: BufferRef<'_, Self::Buffer<E>>,
        count: usize,
    ) -> Result<()>;

    /// `dst = lhs op rhs`, vector-vector.
    fn binary<E: Element>(
        op: BinaryOp,
        lhs: BufferRef<'_, Self::Buffer<E>>,
        rhs: BufferRef<'_, Self::Buffer<E>>,
        dst: BufferRef<'_, Self::Buffer<E>>,
        count: usize,
    );

    /// `dst = lhs op rhs`, vector-scalar.
    fn binary_scalar<E: Element>(
        op: BinaryOp,
        lhs: BufferRef<'_, Self::Buffer<E>>,
        rhs: E,
        dst: BufferRef<'_, Self::Buffer<E>>,
        count: usize,
    );

    /// `dst = lhs op rhs`, scalar-vector.
    fn scalar_binary<E: Element>(
        op: BinaryOp,
        lhs: E,
        rhs: BufferRef<'_, Self::Buffer<E>>,
        dst: BufferRef<'_, Self::Buffer<E>>,
        count: usize,
    );

    // === Reductions ===

    /// Sum of `count` elements.
    fn sum<E: Element>(src: BufferRef<'_, Self::Buffer<E>>, count: usize) -> E;

    /// Sum a contiguous tensor of `shape` over `axes` (sorted, unique).
    /// `dst` receives the remaining axes in row-major order.
    fn reduce_sum<E: Element>(
        src: BufferRef<'_, Self::Buffer<E>>,
        shape: &Shape,
        axes: &[usize],
        dst: BufferRef<'_, Self::Buffer<E>>,
    );

    /// Position and value of the extremum among `count` elements.
    /// Ties resolve to the first position.
    fn arg_reduce<E: Element>(
        op: ArgReduce,
        src: BufferRef<'_, Self::Buffer<E>>,
        count: usize,
    ) -> (usize, E);

    /// Per-lane position of the extremum along `axis` of a contiguous tensor
    /// of `shape`. The result has one entry per element of `shape` with
    /// `axis` removed, in row-major order.
    fn arg_reduce_axis<E: Element>(
        op: ArgReduce,
        src: BufferRef<'_, Self::Buffer<E>>,
        shape: &Shape,
        axis: usize,
    ) -> Vec<usize>;

    // === Linear algebra ===

    /// General matrix multiply, see [`Gemm`].
    fn gemm<E: Element>(
        lhs: BufferRef<'_, Self::Buffer<E>>,
        rhs: BufferRef<'_, Self::Buffer<E>>,
        dst: BufferRef<'_, Self::Buffer<E>>,
        dims: Gemm,
        alpha: E,
        beta: E,
    );

    /// Write the transpose of a contiguous `[rows, cols]` matrix.
    fn transpose<E: Element>(
        src: BufferRef<'_, Self::Buffer<E>>,
        dst: BufferRef<'_, Self::Buffer<E>>,
        rows: usize,
        cols: usize,
    );

    // === Gather / scatter ===

    /// `dst[.., j, ..] = src[.., indices[..j..], j, ..]`: pick one element per
    /// lane along `axis` of a contiguous tensor of `shape`. `dst` has `shape`
    /// with `axis` removed.
    fn gather<E: Element>(
        src: BufferRef<'_, Self::Buffer<E>>,
        shape: &Shape,
        axis: usize,
        indices: &[usize],
        dst: BufferRef<'_, Self::Buffer<E>>,
    );

    /// Inverse of [`Backend::gather`]: add each element of `src` (which has
    /// `shape` with `axis` removed) into `dst` (of `shape`) at the position
    /// named by `indices` along `axis`.
    fn scatter_add<E: Element>(
        src: BufferRef<'_, Self::Buffer<E>>,
        shape: &Shape,
        axis: usize,
        indices: &[usize],
        dst: BufferRef<'_, Self::Buffer<E>>,
    );
}
