//! Shape operations: reshape, permute, squeeze, expand, reverse, pad.
//!
//! Reshape and permute return views sharing the source buffer. Expand,
//! reverse and pad copy.

use crate::backend::Backend;
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::index::{along, Index};
use crate::node::TensorOp;
use crate::shape::{Layout, Shape};
use crate::tensor::Tensor;

impl<E: Element, B: Backend> Tensor<E, B> {
    /// Reinterpret the elements with a new shape. One entry may be `-1` to
    /// have it inferred from the element count.
    ///
    /// A non-contiguous tensor is compacted first, so the view aliases that
    /// copy rather than this tensor's buffer.
    pub fn view(&self, dims: &[isize]) -> Result<Self> {
        let shape = Shape::infer(self.count(), dims)?;
        let base = self.contiguous();
        let layout = Layout {
            strides: shape.contiguous_strides(),
            shape,
            offset: base.layout().offset,
        };
        Ok(Self::from_op(
            base.values().clone(),
            layout,
            Some(base.clone()),
            TensorOp::View,
            vec![base],
        ))
    }

    /// Reshape to an explicit shape.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Self> {
        let dims: Vec<isize> = shape.into().dims().iter().map(|&d| d as isize).collect();
        self.view(&dims)
    }

    /// Reorder axes without moving data; `order[i]` is the source axis that
    /// becomes axis `i`.
    pub fn permuted(&self, order: &[usize]) -> Result<Self> {
        let layout = self.layout().permuted(order)?;
        Ok(Self::from_op(
            self.values().clone(),
            layout,
            Some(self.clone()),
            TensorOp::Permute {
                order: order.to_vec(),
            },
            vec![self.clone()],
        ))
    }

    /// Matrix transpose.
    pub fn transposed(&self) -> Result<Self> {
        if self.dim() != 2 {
            return Err(TensorError::rank_mismatch("transpose", 2, self.dim()));
        }
        self.permuted(&[1, 0])
    }

    /// Remove every axis of size 1.
    pub fn squeeze(&self) -> Result<Self> {
        let dims: Vec<usize> = self
            .shape()
            .dims()
            .iter()
            .copied()
            .filter(|&d| d != 1)
            .collect();
        self.reshape(dims)
    }

    /// Remove `axis` if it has size 1; otherwise return this tensor.
    pub fn squeeze_at(&self, axis: usize) -> Result<Self> {
        let axis = self.check_axes("squeeze", &[axis])?[0];
        if self.shape().dim(axis) != 1 {
            return Ok(self.clone());
        }
        let mut dims = self.shape().dims().to_vec();
        dims.remove(axis);
        self.reshape(dims)
    }

    /// Insert an axis of size 1 before position `axis` (`axis == dim` appends).
    pub fn unsqueeze(&self, axis: usize) -> Result<Self> {
        if axis > self.dim() {
            return Err(TensorError::InvalidAxis {
                op: "unsqueeze",
                axis,
                ndim: self.dim(),
            });
        }
        let mut dims = self.shape().dims().to_vec();
        dims.insert(axis, 1);
        self.reshape(dims)
    }

    /// Replicate along new leading axes and along axes of size 1.
    ///
    /// Unlike arithmetic broadcasting this stretches size-1 axes, so it is
    /// the explicit way to combine e.g. `[4, 1]` with `[4, 3]`.
    pub fn expand(&self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        let source = self.layout().expanded(&shape)?;
        if &shape == self.shape() {
            return Ok(self.clone());
        }
        let dst = B::allocate(shape.numel());
        let layout = Layout::contiguous(shape);
        B::copy_strided(self.values(), &source, &dst, &layout);
        Ok(Self::from_op(
            dst,
            layout,
            None,
            TensorOp::Expand,
            vec![self.clone()],
        ))
    }

    /// Reverse the order of elements along `axis`.
    pub fn reversed(&self, axis: usize) -> Result<Self> {
        let axis = self.check_axes("reverse", &[axis])?[0];
        let size = self.shape().dim(axis);
        let out = Layout::contiguous(self.shape().clone());
        let slices = (0..size)
            .map(|i| -> Result<(Layout, Layout)> {
                let from = self.layout().select(&along(axis, Index::At(i as isize)))?;
                let to = out.select(&along(axis, Index::At((size - 1 - i) as isize)))?;
                Ok((from, to))
            })
            .collect::<Result<Vec<_>>>()?;

        let dst = B::allocate(out.numel());
        for (from, to) in &slices {
            B::copy_strided(self.values(), from, &dst, to);
        }
        Ok(Self::from_op(
            dst,
            out,
            None,
            TensorOp::Reverse { axis },
            vec![self.clone()],
        ))
    }

    /// Surround the tensor with `value`: `padding[i]` holds the number of
    /// elements added before and after axis `i`.
    ///
    /// Gradients flow back from the interior region only.
    pub fn padded(&self, value: E, padding: &[(usize, usize)]) -> Result<Self> {
        if padding.len() != self.dim() {
            return Err(TensorError::shape_mismatch(
                "pad",
                format!("{} (before, after) pairs", self.dim()),
                padding.len(),
            ));
        }
        let dims: Vec<usize> = self
            .shape()
            .dims()
            .iter()
            .zip(padding)
            .map(|(&d, &(before, after))| before + d + after)
            .collect();
        let interior: Vec<Index> = self
            .shape()
            .dims()
            .iter()
            .zip(padding)
            .map(|(&d, &(before, _))| Index::range(before as isize..(before + d) as isize))
            .collect();

        let mut result = Self::full(dims, value);
        result.set(&interior, self)?;
        Ok(result)
    }
}
