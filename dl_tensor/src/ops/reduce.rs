//! Reductions along axes.

use crate::backend::{ArgReduce, Backend, BufferRef};
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::node::TensorOp;
use crate::shape::{Layout, Shape};
use crate::tensor::Tensor;

impl<E: Element, B: Backend> Tensor<E, B> {
    /// Sorted, deduplicated axes, each checked against the rank.
    pub(crate) fn check_axes(&self, op: &'static str, axes: &[usize]) -> Result<Vec<usize>> {
        let ndim = self.dim();
        if let Some(&axis) = axes.iter().find(|&&a| a >= ndim) {
            return Err(TensorError::InvalidAxis { op, axis, ndim });
        }
        let mut axes = axes.to_vec();
        axes.sort_unstable();
        axes.dedup();
        Ok(axes)
    }

    /// Shape after reducing `axes` (already checked).
    fn reduced_shape(&self, axes: &[usize], keepdims: bool) -> Shape {
        let dims = self
            .shape()
            .dims()
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| match (axes.contains(&i), keepdims) {
                (false, _) => Some(d),
                (true, true) => Some(1),
                (true, false) => None,
            })
            .collect();
        Shape(dims)
    }

    /// Sum over `axes`. With `keepdims` the reduced axes stay as size 1.
    pub fn sum(&self, axes: &[usize], keepdims: bool) -> Result<Self> {
        let axes = self.check_axes("sum", axes)?;
        let shape = self.reduced_shape(&axes, keepdims);
        let dst = B::allocate(shape.numel());
        if self.count() > 0 {
            let (src, offset) = self.materialized();
            let src = BufferRef::new(&src, offset);
            if axes.len() == self.dim() {
                let total = B::sum(src, self.count());
                B::fill(BufferRef::start(&dst), 1, total);
            } else {
                B::reduce_sum(src, self.shape(), &axes, BufferRef::start(&dst));
            }
        }
        Ok(Self::from_op(
            dst,
            Layout::contiguous(shape),
            None,
            TensorOp::Sum { axes, keepdims },
            vec![self.clone()],
        ))
    }

    /// Sum of all elements as a scalar.
    pub fn sum_all(&self) -> Result<Self> {
        let axes: Vec<usize> = (0..self.dim()).collect();
        self.sum(&axes, false)
    }

    pub fn mean(&self, axes: &[usize], keepdims: bool) -> Result<Self> {
        let axes = self.check_axes("mean", axes)?;
        let n: usize = axes.iter().map(|&a| self.shape().dim(a)).product();
        self.sum(&axes, keepdims)?.div_scalar(E::from_f64(n as f64))
    }

    pub fn mean_all(&self) -> Result<Self> {
        self.sum_all()?.div_scalar(E::from_f64(self.count() as f64))
    }

    /// Population variance over `axes`: mean(x^2) - mean(x)^2.
    pub fn variance(&self, axes: &[usize]) -> Result<Self> {
        let m = self.mean(axes, false)?;
        self.square()?.mean(axes, false)?.sub(&m.square()?)
    }

    /// Largest element along `axis`; the axis is removed.
    ///
    /// Gradients flow only to the winning position of each lane.
    pub fn max(&self, axis: usize) -> Result<Self> {
        self.extreme_along(ArgReduce::Max, "max", axis)
    }

    /// Smallest element along `axis`; the axis is removed.
    pub fn min(&self, axis: usize) -> Result<Self> {
        self.extreme_along(ArgReduce::Min, "min", axis)
    }

    fn extreme_along(&self, op: ArgReduce, name: &'static str, axis: usize) -> Result<Self> {
        let axes = self.check_axes(name, &[axis])?;
        if self.shape().dim(axes[0]) == 0 {
            return Err(TensorError::shape_mismatch(name, "a non-empty axis", self.shape()));
        }
        let (src, offset) = self.materialized();
        let indices = B::arg_reduce_axis(op, BufferRef::new(&src, offset), self.shape(), axis);
        self.gather_shared(axis, indices.into())
    }

    /// Flat row-major position of the largest element.
    pub fn argmax(&self) -> Result<usize> {
        self.arg_reduce(ArgReduce::Max, "argmax")
    }

    /// Flat row-major position of the smallest element.
    pub fn argmin(&self) -> Result<usize> {
        self.arg_reduce(ArgReduce::Min, "argmin")
    }

    fn arg_reduce(&self, op: ArgReduce, name: &'static str) -> Result<usize> {
        if self.count() == 0 {
            return Err(TensorError::shape_mismatch(name, "a non-empty tensor", self.shape()));
        }
        let (src, offset) = self.materialized();
        Ok(B::arg_reduce(op, BufferRef::new(&src, offset), self.count()).0)
    }

    /// Softmax along `axis`, shifted by the per-lane maximum for stability.
    pub fn softmax(&self, axis: usize) -> Result<Self> {
        let shift = self
            .detached()
            .max(axis)?
            .unsqueeze(axis)?
            .expand(self.shape().clone())?;
        let exponentiated = self.sub(&shift)?.exp()?;
        let normalizer = exponentiated
            .sum(&[axis], true)?
            .expand(self.shape().clone())?;
        exponentiated.div(&normalizer)
    }

    /// Sum this tensor down to `shape`, which must be reachable by expanding:
    /// leading axes are summed away and axes of size 1 in `shape` are summed
    /// with the dimension kept.
    pub(crate) fn sum_to(&self, shape: &Shape) -> Result<Self> {
        if self.shape() == shape {
            return Ok(self.clone());
        }
        if shape.ndim() > self.dim() {
            return Err(TensorError::shape_mismatch("sum_to", shape, self.shape()));
        }
        let lead = self.dim() - shape.ndim();
        let mut axes: Vec<usize> = (0..lead).collect();
        for (i, &d) in shape.dims().iter().enumerate() {
            if d == 1 && self.shape().dim(lead + i) != 1 {
                axes.push(lead + i);
            }
        }
        self.sum(&axes, true)?.reshape(shape.clone())
    }
}
