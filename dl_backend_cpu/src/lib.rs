//! Host-memory backend for dl_tensor.
//!
//! Buffers are reference-counted vectors behind a lock. Each kernel copies
//! its input regions out before taking the write lock on the destination,
//! which keeps aliasing sources and destinations (views of one buffer)
//! correct.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dl_tensor::prelude::*;
use dl_tensor::{ArgReduce, BinaryOp, BufferRef, Gemm, Indices, Layout, UnaryOp};
use num_traits::Zero;

mod kernels;

/// Shared host buffer.
#[derive(Clone, Debug)]
pub struct CpuBuffer<E>(Arc<RwLock<Vec<E>>>);

impl<E> CpuBuffer<E> {
    fn read(&self) -> RwLockReadGuard<'_, Vec<E>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<E>> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

type Region<'a, E> = BufferRef<'a, CpuBuffer<E>>;

/// Copy `count` elements out of a region.
fn load<E: Element>(src: Region<'_, E>, count: usize) -> Vec<E> {
    src.buffer.read()[src.offset..src.offset + count].to_vec()
}

/// Write `data` to the front of a region.
fn store<E: Element>(dst: Region<'_, E>, data: &[E]) {
    dst.buffer.write()[dst.offset..dst.offset + data.len()].copy_from_slice(data);
}

/// CPU backend marker type.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    type Buffer<E: Element> = CpuBuffer<E>;

    const NAME: &'static str = "cpu";

    fn allocate<E: Element>(count: usize) -> CpuBuffer<E> {
        CpuBuffer(Arc::new(RwLock::new(vec![E::zero(); count])))
    }

    fn from_vec<E: Element>(data: Vec<E>) -> CpuBuffer<E> {
        CpuBuffer(Arc::new(RwLock::new(data)))
    }

    fn capacity<E: Element>(buffer: &CpuBuffer<E>) -> usize {
        buffer.read().len()
    }

    fn same_buffer<E: Element>(a: &CpuBuffer<E>, b: &CpuBuffer<E>) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    fn read<E: Element>(src: Region<'_, E>, count: usize) -> Vec<E> {
        load(src, count)
    }

    fn fill<E: Element>(dst: Region<'_, E>, count: usize, value: E) {
        dst.buffer.write()[dst.offset..dst.offset + count].fill(value);
    }

    fn assign<E: Element>(src: Region<'_, E>, dst: Region<'_, E>, count: usize) {
        let data = load(src, count);
        store(dst, &data);
    }

    fn copy_strided<E: Element>(
        src: &CpuBuffer<E>,
        src_layout: &Layout,
        dst: &CpuBuffer<E>,
        dst_layout: &Layout,
    ) {
        debug_assert_eq!(src_layout.shape, dst_layout.shape);
        let count = src_layout.numel();
        if src_layout.is_contiguous() && dst_layout.is_contiguous() {
            let data = load(BufferRef::new(src, src_layout.offset), count);
            store(BufferRef::new(dst, dst_layout.offset), &data);
            return;
        }

        let values: Vec<E> = {
            let s = src.read();
            Indices::new(&src_layout.shape)
                .map(|idx| s[src_layout.position(&idx)])
                .collect()
        };
        let mut d = dst.write();
        for (idx, v) in Indices::new(&dst_layout.shape).zip(values) {
            d[dst_layout.position(&idx)] = v;
        }
    }

    fn unary<E: Element>(
        op: UnaryOp,
        src: Region<'_, E>,
        dst: Region<'_, E>,
        count: usize,
    ) -> Result<()> {
        let out = load(src, count)
            .into_iter()
            .map(|x| E::apply_unary(op, x))
            .collect::<Option<Vec<E>>>()
            .ok_or(TensorError::UnsupportedOperation {
                op: op.name(),
                dtype: E::DTYPE,
            })?;
        store(dst, &out);
        Ok(())
    }

    fn pow<E: Element>(
        src: Region<'_, E>,
        exponent: E,
        dst: Region<'_, E>,
        count: usize,
    ) -> Result<()> {
        let out = load(src, count)
            .into_iter()
            .map(|x| x.power(exponent))
            .collect::<Option<Vec<E>>>()
            .ok_or(TensorError::UnsupportedOperation {
                op: "pow",
                dtype: E::DTYPE,
            })?;
        store(dst, &out);
        Ok(())
    }

    fn binary<E: Element>(
        op: BinaryOp,
        lhs: Region<'_, E>,
        rhs: Region<'_, E>,
        dst: Region<'_, E>,
        count: usize,
    ) {
        let (a, b) = (load(lhs, count), load(rhs, count));
        let mut out = vec![E::zero(); count];
        kernels::binary(op, &a, &b, &mut out);
        store(dst, &out);
    }

    fn binary_scalar<E: Element>(
        op: BinaryOp,
        lhs: Region<'_, E>,
        rhs: E,
        dst: Region<'_, E>,
        count: usize,
    ) {
        let a = load(lhs, count);
        let mut out = vec![E::zero(); count];
        kernels::binary_scalar(op, &a, rhs, &mut out);
        store(dst, &out);
    }

    fn scalar_binary<E: Element>(
        op: BinaryOp,
        lhs: E,
        rhs: Region<'_, E>,
        dst: Region<'_, E>,
        count: usize,
    ) {
        let b = load(rhs, count);
        let mut out = vec![E::zero(); count];
        kernels::scalar_binary(op, lhs, &b, &mut out);
        store(dst, &out);
    }

    fn sum<E: Element>(src: Region<'_, E>, count: usize) -> E {
        let s = src.buffer.read();
        s[src.offset..src.offset + count]
            .iter()
            .fold(E::zero(), |acc, &x| acc + x)
    }

    fn reduce_sum<E: Element>(
        src: Region<'_, E>,
        shape: &Shape,
        axes: &[usize],
        dst: Region<'_, E>,
    ) {
        let data = load(src, shape.numel());
        let out = kernels::reduce_sum(&data, shape, axes);
        store(dst, &out);
    }

    fn arg_reduce<E: Element>(op: ArgReduce, src: Region<'_, E>, count: usize) -> (usize, E) {
        kernels::arg_extreme(op, &load(src, count))
    }

    fn arg_reduce_axis<E: Element>(
        op: ArgReduce,
        src: Region<'_, E>,
        shape: &Shape,
        axis: usize,
    ) -> Vec<usize> {
        kernels::arg_extreme_axis(op, &load(src, shape.numel()), shape, axis)
    }

    fn gemm<E: Element>(
        lhs: Region<'_, E>,
        rhs: Region<'_, E>,
        dst: Region<'_, E>,
        dims: Gemm,
        alpha: E,
        beta: E,
    ) {
        log::trace!("cpu gemm m={} n={} k={}", dims.m, dims.n, dims.k);
        let a = load(lhs, dims.m * dims.k);
        let b = load(rhs, dims.k * dims.n);
        let mut out = if beta == E::zero() {
            vec![E::zero(); dims.m * dims.n]
        } else {
            load(dst, dims.m * dims.n)
        };
        kernels::gemm(&a, &b, &mut out, dims, alpha, beta);
        store(dst, &out);
    }

    fn transpose<E: Element>(src: Region<'_, E>, dst: Region<'_, E>, rows: usize, cols: usize) {
        let out = kernels::transpose(&load(src, rows * cols), rows, cols);
        store(dst, &out);
    }

    fn gather<E: Element>(
        src: Region<'_, E>,
        shape: &Shape,
        axis: usize,
        indices: &[usize],
        dst: Region<'_, E>,
    ) {
        let out = kernels::gather(&load(src, shape.numel()), shape, axis, indices);
        store(dst, &out);
    }

    fn scatter_add<E: Element>(
        src: Region<'_, E>,
        shape: &Shape,
        axis: usize,
        indices: &[usize],
        dst: Region<'_, E>,
    ) {
        let data = load(src, indices.len());
        let mut out = load(dst, shape.numel());
        kernels::scatter_add(&data, shape, axis, indices, &mut out);
        store(dst, &out);
    }
}

/// Tensors on the CPU backend.
pub type CpuTensor<E = f32> = Tensor<E, CpuBackend>;

/// Create a named `f32` variable that requires gradients.
pub fn var(name: &str, data: Vec<f32>, shape: impl Into<Shape>) -> Result<CpuTensor> {
    CpuTensor::var(name, data, shape)
}

/// Create an `f32` constant.
pub fn constant(data: Vec<f32>, shape: impl Into<Shape>) -> Result<CpuTensor> {
    CpuTensor::from_vec(data, shape)
}
