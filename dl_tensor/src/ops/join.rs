//! Joining tensors along an axis and splitting them apart again.

use crate::backend::Backend;
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::index::{along, Index};
use crate::node::TensorOp;
use crate::shape::{Layout, Shape};
use crate::tensor::Tensor;

impl<E: Element, B: Backend> Tensor<E, B> {
    /// Join `tensors` along `axis`. All other axes must agree.
    ///
    /// ```ignore
    /// let ab = Tensor::concat(&[&a, &b], 0)?;   // [2, 3] + [1, 3] -> [3, 3]
    /// ```
    pub fn concat(tensors: &[&Self], axis: usize) -> Result<Self> {
        let Some(first) = tensors.first() else {
            return Err(TensorError::shape_mismatch(
                "concat",
                "at least one tensor",
                0,
            ));
        };
        let axis = first.check_axes("concat", &[axis])?[0];
        for t in tensors {
            let agrees = t.dim() == first.dim()
                && t.shape()
                    .dims()
                    .iter()
                    .zip(first.shape().dims())
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !agrees {
                return Err(TensorError::shape_mismatch("concat", first.shape(), t.shape()));
            }
        }

        let lengths: Vec<usize> = tensors.iter().map(|t| t.shape().dim(axis)).collect();
        let mut dims = first.shape().dims().to_vec();
        dims[axis] = lengths.iter().sum();
        let out = Layout::contiguous(Shape(dims));

        let mut start = 0;
        let mut regions = Vec::with_capacity(tensors.len());
        for &len in &lengths {
            let piece = Index::range(start as isize..(start + len) as isize);
            regions.push(out.select(&along(axis, piece))?);
            start += len;
        }

        let dst = B::allocate(out.numel());
        for (t, region) in tensors.iter().zip(&regions) {
            B::copy_strided(t.values(), t.layout(), &dst, region);
        }
        log::trace!("concat {:?} along axis {}", lengths, axis);
        Ok(Self::from_op(
            dst,
            out,
            None,
            TensorOp::Concat { axis, lengths },
            tensors.iter().map(|&t| t.clone()).collect(),
        ))
    }

    /// Split along `axis` into consecutive pieces of the given lengths, which
    /// must add up to the size of the axis. Inverse of [`Tensor::concat`].
    pub fn unstack(&self, axis: usize, lengths: &[usize]) -> Result<Vec<Self>> {
        let axis = self.check_axes("unstack", &[axis])?[0];
        let size = self.shape().dim(axis);
        let total: usize = lengths.iter().sum();
        if total != size {
            return Err(TensorError::shape_mismatch(
                "unstack",
                format!("lengths adding up to {}", size),
                total,
            ));
        }
        let mut start = 0;
        lengths
            .iter()
            .map(|&len| {
                let piece = Index::range(start as isize..(start + len) as isize);
                start += len;
                self.get(&along(axis, piece))
            })
            .collect()
    }

    /// `times` copies of this tensor joined along axis 0.
    pub fn repeated(&self, times: usize) -> Result<Self> {
        let copies = vec![self; times];
        Self::concat(&copies, 0)
    }
}
