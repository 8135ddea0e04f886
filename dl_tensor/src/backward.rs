//! Reverse-mode automatic differentiation.
//!
//! A backward pass starts at a root tensor and walks the recorded contexts
//! towards the leaves. A tensor is only propagated once every consumer that
//! can reach it has contributed, which a per-node count of pending consumers
//! guarantees without recursion.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backend::Backend;
use crate::config::BackwardOptions;
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::index::{along, Index};
use crate::node::{NodeId, TensorOp};
use crate::shape::invert_permutation;
use crate::tensor::Tensor;

/// Gradients produced by one backward pass, keyed by tensor.
#[derive(Debug)]
pub struct Gradients<E: Element, B: Backend> {
    grads: HashMap<NodeId, Tensor<E, B>>,
    names: HashMap<String, NodeId>,
}

impl<E: Element, B: Backend> Gradients<E, B> {
    /// Gradient of the root with respect to `tensor`, if the pass reached it.
    pub fn wrt(&self, tensor: &Tensor<E, B>) -> Option<&Tensor<E, B>> {
        self.grads.get(&tensor.id())
    }

    /// Gradient with respect to the named leaf created by [`Tensor::var`].
    pub fn by_name(&self, name: &str) -> Option<&Tensor<E, B>> {
        self.names.get(name).and_then(|id| self.grads.get(id))
    }

    /// Number of tensors that received a gradient, the root included.
    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }
}

impl<E: Element, B: Backend> Tensor<E, B> {
    /// Backpropagate from this tensor with an all-ones seed.
    ///
    /// Every reached tensor that requires gradients, this one included, has
    /// its gradient added into its gradient buffer (see [`Tensor::grad`]).
    /// A tensor rewritten by [`Tensor::set`] keeps one buffer across the
    /// rewrite, which receives the gradient of the latest write.
    pub fn backward(&self) -> Result<Gradients<E, B>> {
        self.backward_with(None, BackwardOptions::default())
    }

    /// Backpropagate from this tensor with an explicit seed gradient, which
    /// must have this tensor's shape.
    pub fn backward_with(
        &self,
        seed: Option<&Tensor<E, B>>,
        options: BackwardOptions,
    ) -> Result<Gradients<E, B>> {
        run(self, seed, options, true)
    }

    /// Gradients of this tensor with respect to each of `of`.
    ///
    /// Leaf gradient buffers are left untouched. Tensors the pass does not
    /// reach get a zero gradient. With `retain_graph` the returned tensors
    /// are themselves differentiable.
    pub fn gradients(
        &self,
        of: &[&Tensor<E, B>],
        retain_graph: bool,
    ) -> Result<Vec<Tensor<E, B>>> {
        let grads = run(
            self,
            None,
            BackwardOptions::new().retain_graph(retain_graph),
            false,
        )?;
        Ok(of
            .iter()
            .map(|t| match grads.wrt(t) {
                Some(g) => g.clone(),
                None => {
                    log::warn!(
                        "{} is unreachable from {}, its gradient is zero",
                        t.id(),
                        self.id()
                    );
                    Tensor::zeros(t.shape().clone())
                }
            })
            .collect())
    }
}

fn run<E: Element, B: Backend>(
    root: &Tensor<E, B>,
    seed: Option<&Tensor<E, B>>,
    options: BackwardOptions,
    accumulate: bool,
) -> Result<Gradients<E, B>> {
    let retain = options.retain_graph;
    let seed = match seed {
        Some(s) if s.shape() != root.shape() => {
            return Err(TensorError::shape_mismatch("backward", root.shape(), s.shape()));
        }
        Some(s) if retain => s.clone(),
        Some(s) => s.detached(),
        None => Tensor::ones(root.shape().clone()),
    };
    if !root.requires_grad() {
        log::warn!("backward from {}, which does not require gradients", root.id());
    }
    log::debug!(
        "backward from {} {} (retain_graph = {})",
        root.id(),
        root.shape(),
        retain
    );

    let mut pending = count_consumers(root);
    let mut grads: HashMap<NodeId, Tensor<E, B>> = HashMap::new();
    let mut names = HashMap::new();
    let mut leaves = 0usize;
    let mut filled = HashSet::new();
    grads.insert(root.id(), seed);

    let mut ready = vec![root.clone()];
    while let Some(node) = ready.pop() {
        let Some(grad) = grads.get(&node.id()).cloned() else {
            continue;
        };
        // Consumers come off the stack before their sources, so a slot
        // shared across a `set` is filled from its newest node.
        if accumulate && node.requires_grad() && filled.insert(Arc::as_ptr(node.grad_slot())) {
            node.accumulate_grad(&grad);
        }
        let Some(ctx) = node.context() else {
            if node.requires_grad() {
                leaves += 1;
                if let Some(name) = node.name() {
                    names.entry(name.to_string()).or_insert(node.id());
                }
            }
            continue;
        };

        let wants: Vec<bool> = ctx.sources().iter().map(Tensor::requires_grad).collect();
        log::trace!(
            "{} {}: propagating to {:?}",
            node.id(),
            ctx.op().symbol(),
            ctx.sources().iter().map(Tensor::id).collect::<Vec<_>>()
        );
        let local = if retain {
            local_gradients(ctx.op(), ctx.sources(), &wants, &node, &grad)?
        } else {
            let sources: Vec<_> = ctx.sources().iter().map(Tensor::detached).collect();
            local_gradients(ctx.op(), &sources, &wants, &node.detached(), &grad)?
        };

        for (source, local) in ctx.sources().iter().zip(local) {
            let Some(local) = local else {
                continue;
            };
            let id = source.id();
            let total = match grads.remove(&id) {
                Some(existing) => existing.add(&local)?,
                None => local,
            };
            grads.insert(id, total);

            if let Some(count) = pending.get_mut(&id) {
                *count -= 1;
                if *count == 0 {
                    ready.push(source.clone());
                }
            }
        }
    }

    log::debug!(
        "backward from {} done: {} gradients, {} leaves",
        root.id(),
        grads.len(),
        leaves
    );
    Ok(Gradients { grads, names })
}

/// Number of graph edges into each tensor reachable from `root` through
/// sources that require gradients.
fn count_consumers<E: Element, B: Backend>(root: &Tensor<E, B>) -> HashMap<NodeId, usize> {
    let mut counts = HashMap::new();
    let mut visited = HashSet::new();
    let mut stack = vec![root.clone()];
    visited.insert(root.id());

    while let Some(node) = stack.pop() {
        let Some(ctx) = node.context() else {
            continue;
        };
        for source in ctx.sources().iter().filter(|s| s.requires_grad()) {
            *counts.entry(source.id()).or_insert(0) += 1;
            if visited.insert(source.id()) {
                stack.push(source.clone());
            }
        }
    }
    counts
}

fn when<T>(wanted: bool, f: impl FnOnce() -> Result<T>) -> Result<Option<T>> {
    if wanted {
        f().map(Some)
    } else {
        Ok(None)
    }
}

/// Gradient of the root with respect to each source of `op`, given the
/// gradient `grad` with respect to its `result`. Sources with `wants[i]`
/// unset get `None`.
///
/// Every rule is written with tensor operations, so it records graph nodes
/// exactly when its inputs require gradients.
fn local_gradients<E: Element, B: Backend>(
    op: &TensorOp,
    sources: &[Tensor<E, B>],
    wants: &[bool],
    result: &Tensor<E, B>,
    grad: &Tensor<E, B>,
) -> Result<Vec<Option<Tensor<E, B>>>> {
    let x = &sources[0];
    let one = E::one();

    // Each source receives the slice of the gradient it was copied into.
    if let TensorOp::Concat { axis, lengths } = op {
        let mut start = 0;
        let mut local = Vec::with_capacity(lengths.len());
        for (&len, &want) in lengths.iter().zip(wants) {
            let piece = Index::range(start as isize..(start + len) as isize);
            local.push(when(want, || grad.get(&along(*axis, piece)))?);
            start += len;
        }
        return Ok(local);
    }

    let unary = match op {
        TensorOp::Identity => Some(grad.clone()),

        // d(-x)/dx = -1
        TensorOp::Neg => Some(grad.neg()?),

        // d(x^2)/dx = 2x
        TensorOp::Square => Some(grad.mul(x)?.mul_scalar(one + one)?),

        // d(exp(x))/dx = exp(x)
        TensorOp::Exp => Some(grad.mul(result)?),

        // d(ln(x))/dx = 1/x
        TensorOp::Log => Some(grad.div(x)?),

        // d(sqrt(x))/dx = 0.5 / sqrt(x)
        TensorOp::Sqrt => Some(grad.div(result)?.mul_scalar(E::from_f64(0.5))?),

        // d(tanh(x))/dx = 1 - tanh(x)^2
        TensorOp::Tanh => Some(grad.mul(&result.square()?.rsub_scalar(one)?)?),

        // d(sin(x))/dx = cos(x)
        TensorOp::Sin => Some(grad.mul(&x.cos()?)?),

        // d(cos(x))/dx = -sin(x)
        TensorOp::Cos => Some(grad.mul(&x.sin()?)?.neg()?),

        // d(tan(x))/dx = 1 + tan(x)^2
        TensorOp::Tan => Some(grad.mul(&result.square()?.add_scalar(one)?)?),

        // d(relu(x))/dx = [x > 0]
        TensorOp::Relu => Some(grad.mul(&x.heaviside()?)?),

        // d(sigmoid(x))/dx = sigmoid(x) * (1 - sigmoid(x))
        TensorOp::Sigmoid => Some(grad.mul(result)?.mul(&result.rsub_scalar(one)?)?),

        // d(x^p)/dx = p * x^(p-1)
        TensorOp::Pow { exponent } if *exponent == 0.0 => Some(grad.mul_scalar(E::zero())?),
        TensorOp::Pow { exponent } => {
            let p = E::from_f64(*exponent);
            Some(grad.mul(&x.pow(p - one)?)?.mul_scalar(p)?)
        }

        TensorOp::View => Some(grad.reshape(x.shape().clone())?),

        TensorOp::Permute { order } => Some(grad.permuted(&invert_permutation(order))?),

        TensorOp::Expand => Some(grad.sum_to(x.shape())?),

        TensorOp::Reverse { axis } => Some(grad.reversed(*axis)?),

        TensorOp::Select { index } => {
            let mut region = Tensor::zeros(x.shape().clone());
            region.set(index, grad)?;
            Some(region)
        }

        TensorOp::Gather { axis, indices } => {
            Some(grad.scatter_shared(*axis, indices.clone(), x.shape().dim(*axis))?)
        }

        TensorOp::Scatter { axis, indices } => Some(grad.gather_shared(*axis, indices.clone())?),

        TensorOp::Sum { axes, .. } => {
            let mut dims = x.shape().dims().to_vec();
            for &axis in axes {
                dims[axis] = 1;
            }
            Some(grad.reshape(dims)?.expand(x.shape().clone())?)
        }

        _ => None,
    };
    if let Some(g) = unary {
        return Ok(vec![Some(g)]);
    }

    let (a, b) = (&sources[0], &sources[1]);
    let (want_a, want_b) = (wants[0], wants[1]);

    let pair = match op {
        // d(a+b)/da = 1, d(a+b)/db = 1
        TensorOp::Add => (
            when(want_a, || grad.sum_to(a.shape()))?,
            when(want_b, || grad.sum_to(b.shape()))?,
        ),

        // d(a-b)/da = 1, d(a-b)/db = -1
        TensorOp::Sub => (
            when(want_a, || grad.sum_to(a.shape()))?,
            when(want_b, || grad.neg()?.sum_to(b.shape()))?,
        ),

        // d(a*b)/da = b, d(a*b)/db = a
        TensorOp::Mul => (
            when(want_a, || grad.mul(b)?.sum_to(a.shape()))?,
            when(want_b, || grad.mul(a)?.sum_to(b.shape()))?,
        ),

        // d(a/b)/da = 1/b, d(a/b)/db = -a/b^2
        TensorOp::Div => (
            when(want_a, || grad.div(b)?.sum_to(a.shape()))?,
            when(want_b, || {
                grad.mul(a)?.div(&b.square()?)?.neg()?.sum_to(b.shape())
            })?,
        ),

        // C = op(A) op(B); each case keeps the operands' stored orientation.
        TensorOp::MatMul {
            transpose_lhs,
            transpose_rhs,
        } => match (*transpose_lhs, *transpose_rhs) {
            (false, false) => (
                when(want_a, || grad.matmul_t(b, false, true))?,
                when(want_b, || a.matmul_t(grad, true, false))?,
            ),
            (true, false) => (
                when(want_a, || b.matmul_t(grad, false, true))?,
                when(want_b, || a.matmul_t(grad, false, false))?,
            ),
            (false, true) => (
                when(want_a, || grad.matmul_t(b, false, false))?,
                when(want_b, || grad.matmul_t(a, true, false))?,
            ),
            (true, true) => (
                when(want_a, || b.matmul_t(grad, true, true))?,
                when(want_b, || grad.matmul_t(a, true, true))?,
            ),
        },

        // Overwritten positions receive nothing; the written value receives
        // the gradient of its region.
        TensorOp::Replace { index } => (
            when(want_a, || {
                let mut rest = grad.copied();
                rest.set(index, &Tensor::scalar(E::zero()))?;
                Ok(rest)
            })?,
            when(want_b, || {
                let region = grad.get(index)?;
                if b.shape().is_scalar() && !region.shape().is_scalar() {
                    region.sum_all()
                } else {
                    Ok(region)
                }
            })?,
        ),

        _ => unreachable!("{} has a single source", op.symbol()),
    };
    Ok(vec![pair.0, pair.1])
}
