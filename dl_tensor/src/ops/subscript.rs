//! Subscript reads and writes, gather and scatter.

use std::sync::Arc;

use crate::backend::{Backend, BufferRef};
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::index::Index;
use crate::node::{next_node_id, Context, TensorOp};
use crate::shape::{Layout, Shape};
use crate::tensor::{Tensor, TensorNode};

impl<E: Element, B: Backend> Tensor<E, B> {
    /// Read a sub-tensor.
    ///
    /// The result is a view sharing this tensor's buffer when the selected
    /// elements are contiguous, and a fresh copy otherwise. Either way
    /// gradients flow back into the selected region.
    ///
    /// ```ignore
    /// let row = t.get(&s![1])?;        // view
    /// let col = t.get(&s![.., -1])?;   // copy
    /// ```
    pub fn get(&self, index: &[Index]) -> Result<Self> {
        let layout = self.layout().select(index)?;
        let op = TensorOp::Select {
            index: index.to_vec(),
        };
        if layout.is_contiguous() {
            log::trace!("{}: subscript {:?} is a view", self.id(), index);
            return Ok(Self::from_op(
                self.values().clone(),
                layout,
                Some(self.clone()),
                op,
                vec![self.clone()],
            ));
        }

        let out = Layout::contiguous(layout.shape.clone());
        let dst = B::allocate(out.numel());
        B::copy_strided(self.values(), &layout, &dst, &out);
        Ok(Self::from_op(dst, out, None, op, vec![self.clone()]))
    }

    /// Overwrite a sub-tensor with `value`, which must have the shape of the
    /// selected region or be a scalar.
    ///
    /// The write goes through to the shared buffer, so parents and sibling
    /// views observe it. When either side requires gradients `self` becomes
    /// a new graph node recording the replacement; the gradient buffer is
    /// kept, with the region's gradient taken from `value` when both exist.
    pub fn set(&mut self, index: &[Index], value: &Self) -> Result<()> {
        let region = self.layout().select(index)?;
        let scalar = value.shape().is_scalar() && !region.shape.is_scalar();
        let (source, value_grad) = if value.shape() == &region.shape {
            (
                value.layout().clone(),
                Layout::contiguous(value.shape().clone()),
            )
        } else if scalar {
            (
                value.layout().expanded(&region.shape)?,
                Layout::contiguous(Shape::scalar()).expanded(&region.shape)?,
            )
        } else {
            return Err(TensorError::shape_mismatch(
                "replace",
                &region.shape,
                value.shape(),
            ));
        };
        let grad_region = Layout::contiguous(self.shape().clone()).select(index)?;

        // All checks passed; from here on nothing fails.
        B::copy_strided(value.values(), &source, self.values(), &region);
        if let (Some(dst), Some(src)) = (self.grad(), value.grad()) {
            B::copy_strided(src.values(), &value_grad, dst.values(), &grad_region);
        }

        if self.requires_grad() || value.requires_grad() {
            let previous = self.clone();
            let node = TensorNode {
                id: next_node_id(),
                values: previous.values().clone(),
                layout: previous.layout().clone(),
                requires_grad: true,
                context: Some(Context {
                    op: TensorOp::Replace {
                        index: index.to_vec(),
                    },
                    sources: vec![previous.clone(), value.clone()],
                }),
                parent: previous.parent().cloned(),
                grad: Arc::clone(previous.grad_slot()),
                name: previous.name().map(str::to_string),
            };
            log::trace!("{}: replaced region {:?}, now {}", previous.id(), index, node.id);
            *self = Tensor(Arc::new(node));
        }
        Ok(())
    }

    /// Pick one element per lane along `axis`; the axis is removed.
    ///
    /// `indices` holds one position per element of the result, in row-major
    /// order.
    pub fn gather(&self, axis: usize, indices: &[usize]) -> Result<Self> {
        self.gather_shared(axis, indices.into())
    }

    /// Inverse of [`Tensor::gather`]: place each element at `indices` along a
    /// new axis of length `size` inserted at `axis`, zeros elsewhere.
    pub fn scatter(&self, axis: usize, indices: &[usize], size: usize) -> Result<Self> {
        self.scatter_shared(axis, indices.into(), size)
    }

    pub(crate) fn gather_shared(&self, axis: usize, indices: Arc<[usize]>) -> Result<Self> {
        let axis = self.check_axes("gather", &[axis])?[0];
        let mut dims = self.shape().dims().to_vec();
        let size = dims.remove(axis);
        let shape = Shape(dims);
        check_indices("gather", axis, &indices, shape.numel(), size)?;

        let dst = B::allocate(shape.numel());
        if shape.numel() > 0 {
            let (src, offset) = self.materialized();
            B::gather(
                BufferRef::new(&src, offset),
                self.shape(),
                axis,
                &indices,
                BufferRef::start(&dst),
            );
        }
        Ok(Self::from_op(
            dst,
            Layout::contiguous(shape),
            None,
            TensorOp::Gather { axis, indices },
            vec![self.clone()],
        ))
    }

    pub(crate) fn scatter_shared(
        &self,
        axis: usize,
        indices: Arc<[usize]>,
        size: usize,
    ) -> Result<Self> {
        if axis > self.dim() {
            return Err(TensorError::InvalidAxis {
                op: "scatter",
                axis,
                ndim: self.dim() + 1,
            });
        }
        check_indices("scatter", axis, &indices, self.count(), size)?;
        let mut dims = self.shape().dims().to_vec();
        dims.insert(axis, size);
        let shape = Shape(dims);

        let dst = B::allocate(shape.numel());
        if self.count() > 0 {
            let (src, offset) = self.materialized();
            B::scatter_add(
                BufferRef::new(&src, offset),
                &shape,
                axis,
                &indices,
                BufferRef::start(&dst),
            );
        }
        Ok(Self::from_op(
            dst,
            Layout::contiguous(shape),
            None,
            TensorOp::Scatter { axis, indices },
            vec![self.clone()],
        ))
    }
}

impl<B: Backend> Tensor<i32, B> {
    /// One-hot encode class indices. The result has this tensor's shape plus
    /// a trailing axis of length `depth`, with 1 at each class and 0
    /// elsewhere. Never part of a graph.
    pub fn one_hot<T: Element>(&self, depth: usize) -> Result<Tensor<T, B>> {
        let classes = self.to_vec();
        if let Some(&bad) = classes.iter().find(|&&c| c < 0 || c as usize >= depth) {
            return Err(TensorError::IndexOutOfBounds {
                axis: self.dim(),
                index: bad as isize,
                size: depth,
            });
        }
        let mut data = vec![T::zero(); classes.len() * depth];
        for (lane, &c) in classes.iter().enumerate() {
            data[lane * depth + c as usize] = T::one();
        }
        let mut dims = self.shape().dims().to_vec();
        dims.push(depth);
        Tensor::from_vec(data, dims)
    }
}

fn check_indices(
    op: &'static str,
    axis: usize,
    indices: &[usize],
    lanes: usize,
    size: usize,
) -> Result<()> {
    if indices.len() != lanes {
        return Err(TensorError::shape_mismatch(
            op,
            format!("{} indices", lanes),
            indices.len(),
        ));
    }
    match indices.iter().find(|&&i| i >= size) {
        Some(&i) => Err(TensorError::IndexOutOfBounds {
            axis,
            index: i as isize,
            size,
        }),
        None => Ok(()),
    }
}
