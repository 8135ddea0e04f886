//! Shapes, strides and buffer layouts.

use std::fmt;

use crate::error::{Result, TensorError};
use crate::index::{Index, Resolved};

/// A tensor shape (dimensions).
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(pub Vec<usize>);

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// Create a scalar shape (0-dimensional).
    pub fn scalar() -> Self {
        Shape(vec![])
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Get dimension at index.
    pub fn dim(&self, idx: usize) -> usize {
        self.0[idx]
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of elements. A scalar holds one element.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Check if this is a scalar (0-dim tensor).
    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Compute row-major (C-contiguous) strides for this shape.
    pub fn contiguous_strides(&self) -> Strides {
        let ndim = self.0.len();
        let mut strides = vec![1usize; ndim];
        for i in (0..ndim.saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1];
        }
        Strides(strides)
    }

    /// Result shape of an element-wise binary operation.
    ///
    /// Operands broadcast only when the lower-rank shape is a suffix of the
    /// higher-rank one, or when either side is a scalar. Size-1 axes are
    /// never stretched: `[4, 3]` and `[4, 1]` are incompatible.
    pub fn broadcast_suffix(&self, other: &Shape) -> Option<Shape> {
        if self.is_scalar() {
            return Some(other.clone());
        }
        if other.is_scalar() {
            return Some(self.clone());
        }
        let (long, short) = if self.ndim() >= other.ndim() {
            (self, other)
        } else {
            (other, self)
        };
        if long.0.ends_with(&short.0) {
            Some(long.clone())
        } else {
            None
        }
    }

    /// Number of elements in the leading `ndim - suffix_ndim` axes.
    pub fn prefix_numel(&self, suffix_ndim: usize) -> usize {
        self.0[..self.ndim() - suffix_ndim].iter().product()
    }

    /// Resolve a reshape target with at most one `-1` placeholder.
    pub fn infer(count: usize, dims: &[isize]) -> Result<Shape> {
        let requested = || format!("{:?}", dims);
        let mut unknown = None;
        let mut known = 1usize;
        for (axis, &d) in dims.iter().enumerate() {
            match d {
                -1 if unknown.is_some() => {
                    return Err(TensorError::shape_mismatch(
                        "view",
                        "at most one inferred dimension",
                        requested(),
                    ));
                }
                -1 => unknown = Some(axis),
                d if d < -1 => {
                    return Err(TensorError::shape_mismatch(
                        "view",
                        "dimensions >= -1",
                        requested(),
                    ));
                }
                d => known *= d as usize,
            }
        }

        let mut out: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
        match unknown {
            Some(axis) => {
                if known == 0 || count % known != 0 {
                    return Err(TensorError::shape_mismatch(
                        "view",
                        format!("a shape with {} elements", count),
                        requested(),
                    ));
                }
                out[axis] = count / known;
            }
            None if known != count => {
                return Err(TensorError::shape_mismatch(
                    "view",
                    format!("a shape with {} elements", count),
                    requested(),
                ));
            }
            None => {}
        }
        Ok(Shape(out))
    }
}

/// Check that `order` is a permutation of `0..ndim`.
pub fn check_permutation(order: &[usize], ndim: usize) -> Result<()> {
    let mut seen = vec![false; ndim];
    let valid = order.len() == ndim
        && order.iter().all(|&a| {
            if a >= ndim || seen[a] {
                return false;
            }
            seen[a] = true;
            true
        });
    if valid {
        Ok(())
    } else {
        Err(TensorError::shape_mismatch(
            "permute",
            format!("a permutation of 0..{}", ndim),
            format!("{:?}", order),
        ))
    }
}

/// Inverse of a permutation: `inverse[order[i]] == i`.
pub fn invert_permutation(order: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; order.len()];
    for (i, &a) in order.iter().enumerate() {
        inv[a] = i;
    }
    inv
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.0)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(s: [usize; N]) -> Self {
        Shape(s.to_vec())
    }
}

/// Tensor strides (step size in each dimension).
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Strides(pub Vec<usize>);

impl Strides {
    pub fn new(strides: Vec<usize>) -> Self {
        Strides(strides)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Compute flat index from multi-dimensional indices.
    pub fn index(&self, indices: &[usize]) -> usize {
        debug_assert_eq!(self.0.len(), indices.len());
        self.0.iter().zip(indices.iter()).map(|(s, i)| s * i).sum()
    }
}

/// Where a tensor's elements live inside its buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub shape: Shape,
    pub strides: Strides,
    pub offset: usize,
}

impl Layout {
    /// Row-major layout starting at the front of a buffer.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.contiguous_strides();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Whether the elements occupy `offset..offset + numel` in row-major order.
    /// Axes of size 1 never affect contiguity.
    pub fn is_contiguous(&self) -> bool {
        let canonical = self.shape.contiguous_strides();
        self.shape
            .0
            .iter()
            .zip(self.strides.0.iter().zip(canonical.0.iter()))
            .all(|(&d, (s, c))| d == 1 || s == c)
    }

    /// One past the highest buffer position this layout touches.
    pub fn extent(&self) -> usize {
        if self.numel() == 0 {
            return self.offset;
        }
        let last: usize = self
            .shape
            .0
            .iter()
            .zip(self.strides.0.iter())
            .map(|(&d, &s)| (d - 1) * s)
            .sum();
        self.offset + last + 1
    }

    /// Buffer position of a multi-dimensional index.
    pub fn position(&self, indices: &[usize]) -> usize {
        self.offset + self.strides.index(indices)
    }

    /// Reorder axes; `order[i]` names the source axis that becomes axis `i`.
    pub fn permuted(&self, order: &[usize]) -> Result<Layout> {
        check_permutation(order, self.shape.ndim())?;
        Ok(Layout {
            shape: Shape(order.iter().map(|&a| self.shape.0[a]).collect()),
            strides: Strides(order.iter().map(|&a| self.strides.0[a]).collect()),
            offset: self.offset,
        })
    }

    /// Apply subscript selectors. Missing trailing selectors select whole axes.
    pub fn select(&self, index: &[Index]) -> Result<Layout> {
        let ndim = self.shape.ndim();
        if index.len() > ndim {
            return Err(TensorError::rank_mismatch(
                "subscript",
                format!("at most {} indices", ndim),
                index.len(),
            ));
        }

        // Resolve everything first so no partially-built layout escapes.
        let resolved = index
            .iter()
            .enumerate()
            .map(|(axis, idx)| idx.resolve(axis, self.shape.0[axis]))
            .collect::<Result<Vec<_>>>()?;

        let mut shape = Vec::with_capacity(ndim);
        let mut strides = Vec::with_capacity(ndim);
        let mut offset = self.offset;
        for axis in 0..ndim {
            let size = self.shape.0[axis];
            let stride = self.strides.0[axis];
            match resolved.get(axis).copied().unwrap_or(Resolved::All) {
                Resolved::All => {
                    shape.push(size);
                    strides.push(stride);
                }
                Resolved::At(i) => offset += i * stride,
                Resolved::Range(lo, hi) => {
                    offset += lo * stride;
                    shape.push(hi - lo);
                    strides.push(stride);
                }
            }
        }
        Ok(Layout {
            shape: Shape(shape),
            strides: Strides(strides),
            offset,
        })
    }

    /// Replicate along new leading axes and along axes of size 1, using zero
    /// strides. Trailing axes are aligned.
    pub fn expanded(&self, target: &Shape) -> Result<Layout> {
        let ndim = self.shape.ndim();
        let mismatch = || TensorError::shape_mismatch("expand", target, &self.shape);
        if target.ndim() < ndim {
            return Err(mismatch());
        }
        let lead = target.ndim() - ndim;
        let mut strides = vec![0usize; target.ndim()];
        for axis in 0..ndim {
            let size = self.shape.0[axis];
            let want = target.0[lead + axis];
            if size == want {
                strides[lead + axis] = self.strides.0[axis];
            } else if size != 1 {
                return Err(mismatch());
            }
        }
        Ok(Layout {
            shape: target.clone(),
            strides: Strides(strides),
            offset: self.offset,
        })
    }
}

/// Row-major iterator over every multi-dimensional index of a shape.
pub struct Indices {
    dims: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl Indices {
    pub fn new(shape: &Shape) -> Self {
        Indices {
            dims: shape.0.clone(),
            current: vec![0; shape.ndim()],
            done: shape.numel() == 0,
        }
    }
}

impl Iterator for Indices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.current.clone();

        // Increment like an odometer, rightmost axis first.
        let mut advanced = false;
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                advanced = true;
                break;
            }
            self.current[i] = 0;
        }
        if !advanced {
            self.done = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.dim(1), 3);
        assert_eq!(s.numel(), 24);
        assert!(!s.is_scalar());
        assert_eq!(Shape::new(vec![3, 0]).numel(), 0);
    }

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1);
        assert!(s.contiguous_strides().0.is_empty());
    }

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(Shape::new(vec![2, 3, 4]).contiguous_strides().0, vec![12, 4, 1]);
        assert_eq!(Shape::new(vec![5]).contiguous_strides().0, vec![1]);
    }

    #[test]
    fn test_broadcast_suffix() {
        let a = Shape::new(vec![4, 3]);
        assert_eq!(a.broadcast_suffix(&Shape::new(vec![3])), Some(a.clone()));
        assert_eq!(Shape::new(vec![3]).broadcast_suffix(&a), Some(a.clone()));
        assert_eq!(a.broadcast_suffix(&Shape::scalar()), Some(a.clone()));
        assert_eq!(a.broadcast_suffix(&a), Some(a.clone()));

        let cube = Shape::new(vec![2, 4, 3]);
        assert_eq!(cube.prefix_numel(1), 8);
        assert_eq!(cube.prefix_numel(3), 1);
        assert_eq!(cube.prefix_numel(0), 24);
    }

    #[test]
    fn test_broadcast_rejects_size_one_axes() {
        let a = Shape::new(vec![4, 3]);
        assert_eq!(a.broadcast_suffix(&Shape::new(vec![4, 1])), None);
        assert_eq!(a.broadcast_suffix(&Shape::new(vec![4])), None);
        assert_eq!(a.broadcast_suffix(&Shape::new(vec![1, 3])), None);
    }

    #[test]
    fn test_infer_shape() {
        assert_eq!(Shape::infer(6, &[-1, 3]).unwrap(), Shape::new(vec![2, 3]));
        assert_eq!(Shape::infer(6, &[6]).unwrap(), Shape::new(vec![6]));
        assert!(Shape::infer(6, &[-1, -1]).is_err());
        assert!(Shape::infer(6, &[4, -1]).is_err());
        assert!(Shape::infer(6, &[-2, 3]).is_err());
        assert!(Shape::infer(6, &[5]).is_err());
    }

    #[test]
    fn test_permutation_checks() {
        assert!(check_permutation(&[1, 0, 2], 3).is_ok());
        assert!(check_permutation(&[1, 1, 2], 3).is_err());
        assert!(check_permutation(&[0, 1], 3).is_err());
        assert!(check_permutation(&[0, 3, 1], 3).is_err());
        assert_eq!(invert_permutation(&[2, 0, 1]), vec![1, 2, 0]);
    }

    #[test]
    fn test_permuted_layout() {
        let l = Layout::contiguous(Shape::new(vec![2, 3, 4]));
        let p = l.permuted(&[2, 0, 1]).unwrap();
        assert_eq!(p.shape, Shape::new(vec![4, 2, 3]));
        assert_eq!(p.strides.0, vec![1, 12, 4]);
        assert!(!p.is_contiguous());
    }

    #[test]
    fn test_select_view_or_copy() {
        let l = Layout::contiguous(Shape::new(vec![3, 4]));

        let row = l.select(&[Index::At(1)]).unwrap();
        assert_eq!(row.shape, Shape::new(vec![4]));
        assert_eq!(row.offset, 4);
        assert!(row.is_contiguous());

        let head = l.select(&[Index::At(0), Index::range(0..2)]).unwrap();
        assert_eq!(head.shape, Shape::new(vec![2]));
        assert_eq!(head.offset, 0);
        assert!(head.is_contiguous());

        let column = l.select(&[Index::All, Index::At(-1)]).unwrap();
        assert_eq!(column.shape, Shape::new(vec![3]));
        assert_eq!(column.strides.0, vec![4]);
        assert_eq!(column.offset, 3);
        assert!(!column.is_contiguous());
    }

    #[test]
    fn test_select_errors() {
        let l = Layout::contiguous(Shape::new(vec![3, 4]));
        assert!(matches!(
            l.select(&[Index::At(0), Index::At(0), Index::At(0)]),
            Err(TensorError::RankMismatch { .. })
        ));
        assert!(matches!(
            l.select(&[Index::At(3)]),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_expanded_layout() {
        let l = Layout::contiguous(Shape::new(vec![3]));
        let e = l.expanded(&Shape::new(vec![2, 3])).unwrap();
        assert_eq!(e.strides.0, vec![0, 1]);

        let col = Layout::contiguous(Shape::new(vec![2, 1]));
        let e = col.expanded(&Shape::new(vec![2, 5])).unwrap();
        assert_eq!(e.strides.0, vec![1, 0]);

        assert!(l.expanded(&Shape::new(vec![4])).is_err());
    }

    #[test]
    fn test_extent() {
        let l = Layout::contiguous(Shape::new(vec![3, 4]));
        assert_eq!(l.extent(), 12);
        let column = l.select(&[Index::All, Index::At(1)]).unwrap();
        assert_eq!(column.extent(), 10);
    }

    #[test]
    fn test_indices_iteration() {
        let all: Vec<_> = Indices::new(&Shape::new(vec![2, 2])).collect();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        let scalar: Vec<_> = Indices::new(&Shape::scalar()).collect();
        assert_eq!(scalar, vec![Vec::<usize>::new()]);

        assert_eq!(Indices::new(&Shape::new(vec![0, 3])).count(), 0);
    }

    #[test]
    fn test_stride_index() {
        let strides = Strides::new(vec![12, 4, 1]);
        assert_eq!(strides.index(&[0, 0, 0]), 0);
        assert_eq!(strides.index(&[1, 2, 3]), 12 + 8 + 3);
    }
}
