//! The tensor value type: a layout over a shared buffer plus graph provenance.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use num_traits::Zero;
use rand::Rng;

use crate::backend::{Backend, BufferRef};
use crate::element::{BinaryOp, Element};
use crate::error::{Result, TensorError};
use crate::node::{next_node_id, Context, NodeId, TensorOp};
use crate::shape::{Layout, Shape, Strides};

/// Lazily allocated gradient buffer, row-major over the tensor's shape.
pub(crate) type GradSlot<E, B> = Arc<RwLock<Option<<B as Backend>::Buffer<E>>>>;

/// Internal node structure.
pub(crate) struct TensorNode<E: Element, B: Backend> {
    pub(crate) id: NodeId,
    pub(crate) values: B::Buffer<E>,
    pub(crate) layout: Layout,
    pub(crate) requires_grad: bool,
    pub(crate) context: Option<Context<E, B>>,
    /// Tensor whose buffer `values` aliases, for views.
    pub(crate) parent: Option<Tensor<E, B>>,
    pub(crate) grad: GradSlot<E, B>,
    pub(crate) name: Option<String>,
}

/// An N-dimensional array that records how it was computed.
///
/// Cloning is cheap and yields a handle to the same tensor. Operations are
/// eager: the result's values are computed before the operation returns. When
/// any input requires gradients the result also carries a [`Context`] naming
/// the operation and its inputs, which the backward engine later walks.
pub struct Tensor<E: Element, B: Backend>(pub(crate) Arc<TensorNode<E, B>>);

impl<E: Element, B: Backend> Clone for Tensor<E, B> {
    fn clone(&self) -> Self {
        Tensor(Arc::clone(&self.0))
    }
}

fn read_slot<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_slot<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl<E: Element, B: Backend> Tensor<E, B> {
    pub(crate) fn from_parts(
        values: B::Buffer<E>,
        layout: Layout,
        requires_grad: bool,
        context: Option<Context<E, B>>,
        parent: Option<Tensor<E, B>>,
        name: Option<String>,
    ) -> Self {
        debug_assert!(layout.extent() <= B::capacity(&values));
        Tensor(Arc::new(TensorNode {
            id: next_node_id(),
            values,
            layout,
            requires_grad,
            context,
            parent,
            grad: Arc::new(RwLock::new(None)),
            name,
        }))
    }

    /// Result of an operation. The context is only recorded when a source
    /// requires gradients.
    pub(crate) fn from_op(
        values: B::Buffer<E>,
        layout: Layout,
        parent: Option<Tensor<E, B>>,
        op: TensorOp,
        sources: Vec<Tensor<E, B>>,
    ) -> Self {
        let requires_grad = sources.iter().any(Tensor::requires_grad);
        let context = requires_grad.then(|| Context { op, sources });
        Self::from_parts(values, layout, requires_grad, context, parent, None)
    }

    /// Leaf over a fresh contiguous buffer.
    pub(crate) fn from_buffer(values: B::Buffer<E>, shape: Shape) -> Self {
        Self::from_parts(values, Layout::contiguous(shape), false, None, None, None)
    }

    // === Constructors ===

    /// Create a tensor from row-major data.
    pub fn from_vec(data: Vec<E>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(TensorError::shape_mismatch(
                "from_vec",
                format!("{} elements for shape {}", shape.numel(), shape),
                data.len(),
            ));
        }
        Ok(Self::from_buffer(B::from_vec(data), shape))
    }

    pub fn from_slice(data: &[E], shape: impl Into<Shape>) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Create a 0-dimensional tensor.
    pub fn scalar(value: E) -> Self {
        Self::from_buffer(B::from_vec(vec![value]), Shape::scalar())
    }

    pub fn zeros(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Self::from_buffer(B::allocate(shape.numel()), shape)
    }

    pub fn ones(shape: impl Into<Shape>) -> Self {
        Self::full(shape, E::one())
    }

    pub fn full(shape: impl Into<Shape>, value: E) -> Self {
        let shape = shape.into();
        let values = B::allocate(shape.numel());
        B::fill(BufferRef::start(&values), shape.numel(), value);
        Self::from_buffer(values, shape)
    }

    /// Values drawn uniformly from `[low, high)`; every element is `low` when
    /// the interval is empty.
    pub fn uniform(shape: impl Into<Shape>, low: f64, high: f64) -> Self {
        let shape = shape.into();
        let mut rng = rand::thread_rng();
        let data = (0..shape.numel())
            .map(|_| {
                if high > low {
                    E::from_f64(rng.gen_range(low..high))
                } else {
                    E::from_f64(low)
                }
            })
            .collect();
        Self::from_buffer(B::from_vec(data), shape)
    }

    /// Create a named leaf that requires gradients.
    pub fn var(name: &str, data: Vec<E>, shape: impl Into<Shape>) -> Result<Self> {
        let t = Self::from_vec(data, shape)?;
        Ok(Self::from_parts(
            t.0.values.clone(),
            t.0.layout.clone(),
            true,
            None,
            None,
            Some(name.to_string()),
        ))
    }

    /// A leaf sharing this tensor's values that requires gradients.
    ///
    /// Any recorded context is dropped: the returned tensor starts a new graph.
    pub fn requiring_grad(&self) -> Self {
        Self::from_parts(
            self.0.values.clone(),
            self.0.layout.clone(),
            true,
            None,
            self.0.parent.clone(),
            self.0.name.clone(),
        )
    }

    /// A leaf sharing this tensor's values, cut off from the graph.
    pub fn detached(&self) -> Self {
        Self::from_parts(
            self.0.values.clone(),
            self.0.layout.clone(),
            false,
            None,
            self.0.parent.clone(),
            self.0.name.clone(),
        )
    }

    // === Accessors ===

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn shape(&self) -> &Shape {
        &self.0.layout.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.0.layout.strides
    }

    pub fn layout(&self) -> &Layout {
        &self.0.layout
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.shape().ndim()
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.shape().numel()
    }

    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    /// True when no operation record is attached.
    pub fn is_leaf(&self) -> bool {
        self.0.context.is_none()
    }

    pub fn is_contiguous(&self) -> bool {
        self.0.layout.is_contiguous()
    }

    /// True when this tensor aliases another tensor's buffer.
    pub fn is_view(&self) -> bool {
        self.0.parent.is_some()
    }

    pub fn parent(&self) -> Option<&Tensor<E, B>> {
        self.0.parent.as_ref()
    }

    pub fn context(&self) -> Option<&Context<E, B>> {
        self.0.context.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn shares_buffer_with(&self, other: &Tensor<E, B>) -> bool {
        B::same_buffer(&self.0.values, &other.0.values)
    }

    pub(crate) fn values(&self) -> &B::Buffer<E> {
        &self.0.values
    }

    /// Contiguous storage for the elements: the tensor's own buffer when
    /// possible, else a fresh copy.
    pub(crate) fn materialized(&self) -> (B::Buffer<E>, usize) {
        if self.is_contiguous() {
            (self.0.values.clone(), self.0.layout.offset)
        } else {
            let dst = B::allocate(self.count());
            self.copy_into(&dst);
            (dst, 0)
        }
    }

    /// Elements in row-major order.
    pub fn to_vec(&self) -> Vec<E> {
        let (buffer, offset) = self.materialized();
        B::read(BufferRef::new(&buffer, offset), self.count())
    }

    /// The single element of a one-element tensor.
    pub fn item(&self) -> Result<E> {
        if self.count() != 1 {
            return Err(TensorError::shape_mismatch(
                "item",
                "a single element",
                self.shape(),
            ));
        }
        let (buffer, offset) = self.materialized();
        Ok(B::read(BufferRef::new(&buffer, offset), 1)[0])
    }

    // === Ownership ===

    /// This tensor if its elements are contiguous, otherwise a compact copy.
    pub fn contiguous(&self) -> Self {
        if self.is_contiguous() {
            self.clone()
        } else {
            self.copied()
        }
    }

    /// A copy in a freshly allocated buffer that gradients flow through.
    pub fn copied(&self) -> Self {
        let dst = B::allocate(self.count());
        self.copy_into(&dst);
        let layout = Layout::contiguous(self.shape().clone());
        Self::from_op(dst, layout, None, TensorOp::Identity, vec![self.clone()])
    }

    /// Write the elements in row-major order to the front of `dst`.
    fn copy_into(&self, dst: &B::Buffer<E>) {
        let layout = &self.0.layout;
        let dims = layout.shape.dims();
        if layout.is_contiguous() {
            B::assign(
                BufferRef::new(&self.0.values, layout.offset),
                BufferRef::start(dst),
                self.count(),
            );
        } else if dims.len() == 2 && layout.strides.as_slice() == [1, dims[0]] {
            // Transposed matrix.
            B::transpose(
                BufferRef::new(&self.0.values, layout.offset),
                BufferRef::start(dst),
                dims[1],
                dims[0],
            );
        } else {
            B::copy_strided(
                &self.0.values,
                layout,
                dst,
                &Layout::contiguous(layout.shape.clone()),
            );
        }
    }

    // === Gradient buffer ===

    /// The accumulated gradient, if a backward pass has reached this tensor.
    ///
    /// The returned tensor shares the gradient buffer.
    pub fn grad(&self) -> Option<Tensor<E, B>> {
        read_slot(&self.0.grad)
            .as_ref()
            .map(|buffer| Self::from_buffer(buffer.clone(), self.shape().clone()))
    }

    /// Reset the accumulated gradient to zero, keeping the buffer.
    pub fn zero_grad(&self) {
        if let Some(buffer) = read_slot(&self.0.grad).as_ref() {
            B::fill(BufferRef::start(buffer), self.count(), E::zero());
        }
    }

    /// Add `grad` into the gradient buffer, allocating it zeroed on first use.
    pub(crate) fn accumulate_grad(&self, grad: &Tensor<E, B>) {
        debug_assert_eq!(grad.shape(), self.shape());
        let count = self.count();
        let (src, offset) = grad.materialized();
        let mut slot = write_slot(&self.0.grad);
        let dst = slot.get_or_insert_with(|| B::allocate(count));
        B::binary(
            BinaryOp::Add,
            BufferRef::start(&*dst),
            BufferRef::new(&src, offset),
            BufferRef::start(&*dst),
            count,
        );
    }

    pub(crate) fn grad_slot(&self) -> &GradSlot<E, B> {
        &self.0.grad
    }
}

fn write_nested<E: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    values: &[E],
    dims: &[usize],
) -> fmt::Result {
    match dims.split_first() {
        None => write!(f, "{}", values[0]),
        Some((&n, rest)) => {
            let step: usize = rest.iter().product();
            write!(f, "[")?;
            for i in 0..n {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_nested(f, &values[i * step..(i + 1) * step], rest)?;
            }
            write!(f, "]")
        }
    }
}

impl<E: Element, B: Backend> fmt::Display for Tensor<E, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_nested(f, &self.to_vec(), self.shape().dims())
    }
}

impl<E: Element, B: Backend> fmt::Debug for Tensor<E, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.0.id)
            .field("shape", self.shape())
            .field("op", &self.0.context.as_ref().map(|c| c.op.symbol()))
            .field("requires_grad", &self.0.requires_grad)
            .finish()
    }
}
