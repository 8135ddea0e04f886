//! Matrix multiplication.

use crate::backend::{Backend, BufferRef, Gemm};
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::index::Index;
use crate::node::TensorOp;
use crate::shape::{Indices, Layout, Shape};
use crate::tensor::Tensor;

impl<E: Element, B: Backend> Tensor<E, B> {
    /// Matrix product of two tensors of rank 1 or 2.
    ///
    /// A 1-D left operand is treated as a row vector and a 1-D right operand
    /// as a column vector; the corresponding axis is dropped from the result.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        self.matmul_t(other, false, false)
    }

    /// Matrix product with either operand transposed first.
    pub fn matmul_t(&self, other: &Self, transpose_lhs: bool, transpose_rhs: bool) -> Result<Self> {
        for t in [self, other] {
            if !(1..=2).contains(&t.dim()) {
                return Err(TensorError::rank_mismatch("mmul", "1 or 2", t.dim()));
            }
        }

        let lhs = match (self.dim(), transpose_lhs) {
            (1, false) => self.reshape([1, self.count()])?,
            (1, true) => self.reshape([self.count(), 1])?,
            _ => self.clone(),
        };
        let rhs = match (other.dim(), transpose_rhs) {
            (1, false) => other.reshape([other.count(), 1])?,
            (1, true) => other.reshape([1, other.count()])?,
            _ => other.clone(),
        };

        let (r, c) = (lhs.shape().dim(0), lhs.shape().dim(1));
        let (m, k) = if transpose_lhs { (c, r) } else { (r, c) };
        let (r, c) = (rhs.shape().dim(0), rhs.shape().dim(1));
        let (k2, n) = if transpose_rhs { (c, r) } else { (r, c) };
        if k != k2 {
            return Err(TensorError::shape_mismatch(
                "mmul",
                format!("{} rows in the right operand", k),
                format!("{} × {}", self.shape(), other.shape()),
            ));
        }

        let product = lhs.mmul_2d(
            &rhs,
            Gemm {
                m,
                n,
                k,
                transpose_lhs,
                transpose_rhs,
            },
        );
        match (self.dim(), other.dim()) {
            (1, 1) => product.reshape(Shape::scalar()),
            (1, _) => product.reshape([n]),
            (_, 1) => product.reshape([m]),
            _ => Ok(product),
        }
    }

    /// Matrix product over the trailing two axes, batched over the leading
    /// ones.
    ///
    /// An operand of lower rank is padded with leading axes of size 1, and a
    /// batch axis of size 1 pairs with every index of the other operand's
    /// axis. Gradients flow through each batch slice.
    pub fn batched_matmul(
        &self,
        other: &Self,
        transpose_lhs: bool,
        transpose_rhs: bool,
    ) -> Result<Self> {
        for t in [self, other] {
            if t.dim() < 2 {
                return Err(TensorError::rank_mismatch("bmm", "at least 2", t.dim()));
            }
        }
        let ndim = self.dim().max(other.dim());
        if ndim == 2 {
            return self.matmul_t(other, transpose_lhs, transpose_rhs);
        }
        let lhs = self.with_rank(ndim)?;
        let rhs = other.with_rank(ndim)?;
        let mismatch = || TensorError::shape_mismatch("bmm", self.shape(), other.shape());

        let mut dims = Vec::with_capacity(ndim);
        for axis in 0..ndim - 2 {
            let (a, b) = (lhs.shape().dim(axis), rhs.shape().dim(axis));
            if a != b && a != 1 && b != 1 {
                return Err(mismatch());
            }
            dims.push(if a == 1 { b } else { a });
        }
        let (r, c) = (lhs.shape().dim(ndim - 2), lhs.shape().dim(ndim - 1));
        let (m, k) = if transpose_lhs { (c, r) } else { (r, c) };
        let (r, c) = (rhs.shape().dim(ndim - 2), rhs.shape().dim(ndim - 1));
        let (k2, n) = if transpose_rhs { (c, r) } else { (r, c) };
        if k != k2 {
            return Err(mismatch());
        }

        let batch = Shape(dims.clone());
        dims.extend([m, n]);
        let mut products = Vec::with_capacity(batch.numel());
        for idx in Indices::new(&batch) {
            let a = batch_item(&lhs, &idx)?;
            let b = batch_item(&rhs, &idx)?;
            products.push(a.matmul_t(&b, transpose_lhs, transpose_rhs)?.unsqueeze(0)?);
        }
        if products.is_empty() {
            return Ok(Self::zeros(dims));
        }
        let parts: Vec<&Self> = products.iter().collect();
        Self::concat(&parts, 0)?.reshape(dims)
    }

    /// This tensor with leading axes of size 1 added up to `ndim` axes.
    fn with_rank(&self, ndim: usize) -> Result<Self> {
        if self.dim() == ndim {
            return Ok(self.clone());
        }
        let mut dims = vec![1; ndim - self.dim()];
        dims.extend_from_slice(self.shape().dims());
        self.reshape(dims)
    }

    /// Keep the elements at most `below` diagonals under and `above`
    /// diagonals over the main diagonal of the trailing two axes, and zero
    /// the rest. `None` keeps that whole side.
    pub fn band_matrix(&self, below: Option<usize>, above: Option<usize>) -> Result<Self> {
        if self.dim() < 2 {
            return Err(TensorError::rank_mismatch("band", "at least 2", self.dim()));
        }
        let rows = self.shape().dim(self.dim() - 2);
        let cols = self.shape().dim(self.dim() - 1);
        let mask = (0..rows)
            .flat_map(|r| {
                (0..cols).map(move |c| {
                    let under = match below {
                        Some(b) => r <= c + b,
                        None => true,
                    };
                    let over = match above {
                        Some(a) => c <= r + a,
                        None => true,
                    };
                    if under && over {
                        E::one()
                    } else {
                        E::zero()
                    }
                })
            })
            .collect();
        self.mul(&Self::from_vec(mask, [rows, cols])?)
    }

    /// Both operands are 2-D and already checked against `dims`.
    fn mmul_2d(&self, other: &Self, dims: Gemm) -> Self {
        let dst = B::allocate(dims.m * dims.n);
        let (lhs, lhs_offset) = self.materialized();
        let (rhs, rhs_offset) = other.materialized();
        B::gemm(
            BufferRef::new(&lhs, lhs_offset),
            BufferRef::new(&rhs, rhs_offset),
            BufferRef::start(&dst),
            dims,
            E::one(),
            E::zero(),
        );
        Self::from_op(
            dst,
            Layout::contiguous(Shape(vec![dims.m, dims.n])),
            None,
            TensorOp::MatMul {
                transpose_lhs: dims.transpose_lhs,
                transpose_rhs: dims.transpose_rhs,
            },
            vec![self.clone(), other.clone()],
        )
    }
}

/// The matrix of `t` at batch position `idx`; size-1 batch axes repeat.
fn batch_item<E: Element, B: Backend>(t: &Tensor<E, B>, idx: &[usize]) -> Result<Tensor<E, B>> {
    let index: Vec<Index> = idx
        .iter()
        .enumerate()
        .map(|(axis, &i)| {
            let i = if t.shape().dim(axis) == 1 { 0 } else { i };
            Index::At(i as isize)
        })
        .collect();
    t.get(&index)
}
