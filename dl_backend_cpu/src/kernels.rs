//! Scalar kernels over host slices.
//!
//! Every function reads from its inputs and returns or fills a separate
//! output, so callers can hand in copies taken from aliasing buffers.

use dl_tensor::{ArgReduce, BinaryOp, Element, Gemm, Indices, Shape};
use num_traits::Zero;

/// Split `shape` around `axis` into (outer, size, inner) element counts.
pub fn split_axis(shape: &Shape, axis: usize) -> (usize, usize, usize) {
    let dims = shape.dims();
    let outer = dims[..axis].iter().product();
    let inner = dims[axis + 1..].iter().product();
    (outer, dims[axis], inner)
}

pub fn binary<E: Element>(op: BinaryOp, lhs: &[E], rhs: &[E], out: &mut [E]) {
    for ((o, &a), &b) in out.iter_mut().zip(lhs).zip(rhs) {
        *o = op.apply(a, b);
    }
}

pub fn binary_scalar<E: Element>(op: BinaryOp, lhs: &[E], rhs: E, out: &mut [E]) {
    for (o, &a) in out.iter_mut().zip(lhs) {
        *o = op.apply(a, rhs);
    }
}

pub fn scalar_binary<E: Element>(op: BinaryOp, lhs: E, rhs: &[E], out: &mut [E]) {
    for (o, &b) in out.iter_mut().zip(rhs) {
        *o = op.apply(lhs, b);
    }
}

/// Sum a row-major tensor over `axes`; the output keeps the remaining axes.
pub fn reduce_sum<E: Element>(src: &[E], shape: &Shape, axes: &[usize]) -> Vec<E> {
    let kept = Shape(
        shape
            .dims()
            .iter()
            .enumerate()
            .map(|(i, &d)| if axes.contains(&i) { 1 } else { d })
            .collect(),
    );
    let strides = kept.contiguous_strides();
    let mut out = vec![E::zero(); kept.numel()];
    let mut target = vec![0usize; shape.ndim()];
    for (flat, idx) in Indices::new(shape).enumerate() {
        for (axis, (t, &i)) in target.iter_mut().zip(&idx).enumerate() {
            *t = if axes.contains(&axis) { 0 } else { i };
        }
        let pos = strides.index(&target);
        out[pos] = out[pos] + src[flat];
    }
    out
}

fn better<E: Element>(op: ArgReduce, candidate: E, best: E) -> bool {
    match op {
        ArgReduce::Max => candidate > best,
        ArgReduce::Min => candidate < best,
    }
}

/// Position and value of the extremum; the first one wins on ties.
pub fn arg_extreme<E: Element>(op: ArgReduce, src: &[E]) -> (usize, E) {
    let mut best = (0, src[0]);
    for (i, &v) in src.iter().enumerate().skip(1) {
        if better(op, v, best.1) {
            best = (i, v);
        }
    }
    best
}

/// Per-lane arg-extremum along `axis`.
pub fn arg_extreme_axis<E: Element>(
    op: ArgReduce,
    src: &[E],
    shape: &Shape,
    axis: usize,
) -> Vec<usize> {
    let (outer, size, inner) = split_axis(shape, axis);
    let mut out = vec![0usize; outer * inner];
    if size == 0 {
        return out;
    }
    for o in 0..outer {
        for i in 0..inner {
            let at = |j: usize| src[(o * size + j) * inner + i];
            let mut best = 0;
            for j in 1..size {
                if better(op, at(j), at(best)) {
                    best = j;
                }
            }
            out[o * inner + i] = best;
        }
    }
    out
}

/// `out = alpha * op(a) * op(b) + beta * out`.
pub fn gemm<E: Element>(a: &[E], b: &[E], out: &mut [E], dims: Gemm, alpha: E, beta: E) {
    let Gemm {
        m,
        n,
        k,
        transpose_lhs,
        transpose_rhs,
    } = dims;
    let lhs = |i: usize, l: usize| if transpose_lhs { a[l * m + i] } else { a[i * k + l] };
    let rhs = |l: usize, j: usize| if transpose_rhs { b[j * k + l] } else { b[l * n + j] };

    for i in 0..m {
        for j in 0..n {
            let mut acc = E::zero();
            for l in 0..k {
                acc = acc + lhs(i, l) * rhs(l, j);
            }
            let c = &mut out[i * n + j];
            *c = if beta == E::zero() {
                alpha * acc
            } else {
                alpha * acc + beta * *c
            };
        }
    }
}

/// Transpose a row-major `[rows, cols]` matrix.
pub fn transpose<E: Element>(src: &[E], rows: usize, cols: usize) -> Vec<E> {
    let mut out = vec![E::zero(); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = src[r * cols + c];
        }
    }
    out
}

pub fn gather<E: Element>(src: &[E], shape: &Shape, axis: usize, indices: &[usize]) -> Vec<E> {
    let (outer, size, inner) = split_axis(shape, axis);
    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let j = indices[o * inner + i];
            out.push(src[(o * size + j) * inner + i]);
        }
    }
    out
}

/// Add `src` into `dst` (of `shape`) at `indices` along `axis`.
pub fn scatter_add<E: Element>(
    src: &[E],
    shape: &Shape,
    axis: usize,
    indices: &[usize],
    dst: &mut [E],
) {
    let (outer, size, inner) = split_axis(shape, axis);
    for o in 0..outer {
        for i in 0..inner {
            let lane = o * inner + i;
            let pos = (o * size + indices[lane]) * inner + i;
            dst[pos] = dst[pos] + src[lane];
        }
    }
}
