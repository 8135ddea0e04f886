//! Views, subscripts and in-place writes through shared buffers.

use dl_backend_cpu::CpuTensor;
use dl_tensor::prelude::*;

type T = CpuTensor<f64>;

fn grid() -> T {
    // [[ 0,  1,  2,  3],
    //  [ 4,  5,  6,  7],
    //  [ 8,  9, 10, 11]]
    T::from_vec((0..12).map(f64::from).collect(), [3, 4]).unwrap()
}

fn values(data: &[f64]) -> T {
    T::from_slice(data, [data.len()]).unwrap()
}

// ============================================================================
// Reads
// ============================================================================

#[test]
fn test_get_contiguous_row_is_view() {
    let t = grid();
    let row = t.get(&s![1]).unwrap();
    assert!(row.is_view());
    assert!(row.shares_buffer_with(&t));
    assert_eq!(row.shape(), &Shape::new(vec![4]));
    assert_eq!(row.to_vec(), vec![4.0, 5.0, 6.0, 7.0]);

    let tail = t.get(&s![1..]).unwrap();
    assert!(tail.is_view());
    assert_eq!(tail.shape(), &Shape::new(vec![2, 4]));
    assert_eq!(tail.to_vec(), (4..12).map(f64::from).collect::<Vec<_>>());
}

#[test]
fn test_get_strided_selection_is_copy() {
    let t = grid();
    let column = t.get(&s![.., -1]).unwrap();
    assert!(!column.is_view());
    assert!(!column.shares_buffer_with(&t));
    assert_eq!(column.to_vec(), vec![3.0, 7.0, 11.0]);

    let block = t.get(&s![0..2, 1..3]).unwrap();
    assert_eq!(block.shape(), &Shape::new(vec![2, 2]));
    assert_eq!(block.to_vec(), vec![1.0, 2.0, 5.0, 6.0]);
}

#[test]
fn test_get_single_element() {
    let t = grid();
    assert_eq!(t.get(&s![-1, -1]).unwrap().item().unwrap(), 11.0);
    assert_eq!(t.get(&s![2, 0]).unwrap().item().unwrap(), 8.0);
    assert!(t.get(&s![2, 0]).unwrap().shape().is_scalar());
}

#[test]
fn test_empty_range_selects_nothing() {
    let t = grid();
    let none = t.get(&s![1..1]).unwrap();
    assert_eq!(none.shape(), &Shape::new(vec![0, 4]));
    assert!(none.to_vec().is_empty());

    let past_end = t.get(&s![.., 4..]).unwrap();
    assert_eq!(past_end.shape(), &Shape::new(vec![3, 0]));
    assert!(past_end.to_vec().is_empty());

    // Writing an empty region changes nothing.
    let mut w = grid();
    w.set(&s![2..2], &T::scalar(-1.0)).unwrap();
    assert_eq!(w.to_vec(), t.to_vec());
}

// ============================================================================
// Writes
// ============================================================================

#[test]
fn test_set_writes_into_parent() {
    let mut t = grid();
    t.set(&s![0, 0..2], &values(&[-1.0, -2.0])).unwrap();
    assert_eq!(
        t.to_vec(),
        vec![-1.0, -2.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]
    );
}

#[test]
fn test_set_through_view_is_visible_to_parent() {
    let t = grid();
    let mut row = t.get(&s![2]).unwrap();
    let sibling = t.get(&s![1..]).unwrap();
    let before = row.id();

    row.set(&s![1..3], &values(&[90.0, 100.0])).unwrap();

    // Neither side requires gradients, so no node is recorded.
    assert_eq!(row.id(), before);
    assert_eq!(row.to_vec(), vec![8.0, 90.0, 100.0, 11.0]);
    assert_eq!(t.get(&s![2, 1]).unwrap().item().unwrap(), 90.0);
    assert_eq!(sibling.get(&s![1, 2]).unwrap().item().unwrap(), 100.0);
    assert_eq!(t.get(&s![0]).unwrap().to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_set_scalar_broadcasts_over_region() {
    let mut t = grid();
    t.set(&s![.., 1], &T::scalar(9.0)).unwrap();
    assert_eq!(t.get(&s![.., 1]).unwrap().to_vec(), vec![9.0, 9.0, 9.0]);
    assert_eq!(t.get(&s![.., 0]).unwrap().to_vec(), vec![0.0, 4.0, 8.0]);
}

#[test]
fn test_set_with_gradients_records_replacement() {
    let x = T::var("x", vec![1.0, 2.0, 3.0, 4.0], [4]).unwrap();
    let mut y = x.mul_scalar(3.0).unwrap();
    let before = y.id();
    y.set(&s![1..3], &values(&[0.0, 0.0])).unwrap();

    assert_ne!(y.id(), before);
    assert_eq!(y.context().unwrap().op().symbol(), "replace");
    assert_eq!(y.to_vec(), vec![3.0, 0.0, 0.0, 12.0]);

    // Overwritten positions no longer depend on x.
    let grads = y.gradients(&[&x], false).unwrap();
    assert_eq!(grads[0].to_vec(), vec![3.0, 0.0, 0.0, 3.0]);
}

// ============================================================================
// Shape views
// ============================================================================

#[test]
fn test_view_shares_buffer() {
    let t = grid();
    let v = t.view(&[2, -1]).unwrap();
    assert!(v.shares_buffer_with(&t));
    assert_eq!(v.shape(), &Shape::new(vec![2, 6]));
    assert_eq!(v.to_vec(), t.to_vec());
}

#[test]
fn test_permuted_view() {
    let t = T::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], [2, 3]).unwrap();
    let p = t.transposed().unwrap();
    assert!(p.is_view());
    assert!(p.shares_buffer_with(&t));
    assert!(!p.is_contiguous());
    assert_eq!(p.shape(), &Shape::new(vec![3, 2]));
    assert_eq!(p.to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

    let compact = p.contiguous();
    assert!(compact.is_contiguous());
    assert!(!compact.shares_buffer_with(&t));
    assert_eq!(compact.to_vec(), p.to_vec());

    // Reshaping a permuted tensor compacts it first.
    let flat = p.view(&[-1]).unwrap();
    assert!(!flat.shares_buffer_with(&t));
    assert_eq!(flat.to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
}

#[test]
fn test_permute_three_axes() {
    let t = T::from_vec((0..24).map(f64::from).collect(), [2, 3, 4]).unwrap();
    let p = t.permuted(&[2, 0, 1]).unwrap();
    assert_eq!(p.shape(), &Shape::new(vec![4, 2, 3]));
    // p[k, i, j] == t[i, j, k]
    assert_eq!(
        p.get(&s![3, 1, 2]).unwrap().item().unwrap(),
        t.get(&s![1, 2, 3]).unwrap().item().unwrap()
    );
}

#[test]
fn test_expand() {
    let row = values(&[1.0, 2.0, 3.0]);
    assert_eq!(
        row.expand([2, 3]).unwrap().to_vec(),
        vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]
    );

    let column = T::from_vec(vec![1.0, 2.0], [2, 1]).unwrap();
    assert_eq!(
        column.expand([2, 3]).unwrap().to_vec(),
        vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]
    );
}

#[test]
fn test_squeeze_unsqueeze() {
    let t = T::from_vec(vec![1.0, 2.0, 3.0], [1, 3, 1]).unwrap();
    assert_eq!(t.squeeze().unwrap().shape(), &Shape::new(vec![3]));
    assert_eq!(t.squeeze_at(0).unwrap().shape(), &Shape::new(vec![3, 1]));
    assert_eq!(t.squeeze_at(1).unwrap().shape(), &Shape::new(vec![1, 3, 1]));

    let v = values(&[1.0, 2.0, 3.0]);
    assert_eq!(v.unsqueeze(0).unwrap().shape(), &Shape::new(vec![1, 3]));
    assert_eq!(v.unsqueeze(1).unwrap().shape(), &Shape::new(vec![3, 1]));
}

#[test]
fn test_gather_scatter_values() {
    let t = T::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
    let picked = t.gather(1, &[2, 0]).unwrap();
    assert_eq!(picked.to_vec(), vec![3.0, 4.0]);

    let placed = picked.scatter(1, &[2, 0], 3).unwrap();
    assert_eq!(placed.shape(), &Shape::new(vec![2, 3]));
    assert_eq!(placed.to_vec(), vec![0.0, 0.0, 3.0, 4.0, 0.0, 0.0]);

    let down = t.gather(0, &[1, 0, 1]).unwrap();
    assert_eq!(down.to_vec(), vec![4.0, 2.0, 6.0]);
}

// ============================================================================
// Joins, reversal and padding
// ============================================================================

#[test]
fn test_concat_and_unstack() {
    let a = T::from_vec(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap();
    let b = T::from_vec(vec![5.0, 6.0], [2, 1]).unwrap();
    let joined = T::concat(&[&a, &b], 1).unwrap();
    assert_eq!(joined.shape(), &Shape::new(vec![2, 3]));
    assert_eq!(joined.to_vec(), vec![1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);

    let parts = joined.unstack(1, &[2, 1]).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].to_vec(), a.to_vec());
    assert_eq!(parts[1].shape(), b.shape());
    assert_eq!(parts[1].to_vec(), b.to_vec());

    let stacked = T::concat(&[&a, &a], 0).unwrap();
    assert_eq!(stacked.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(a.repeated(2).unwrap().to_vec(), stacked.to_vec());

    // Pieces of length zero are allowed.
    let empty = T::zeros([2, 0]);
    assert_eq!(T::concat(&[&a, &empty], 1).unwrap().to_vec(), a.to_vec());
    assert_eq!(a.unstack(0, &[0, 2]).unwrap()[0].shape(), &Shape::new(vec![0, 2]));
}

#[test]
fn test_reversed() {
    let t = T::from_vec((0..6).map(f64::from).collect(), [2, 3]).unwrap();
    assert_eq!(t.reversed(0).unwrap().to_vec(), vec![3.0, 4.0, 5.0, 0.0, 1.0, 2.0]);
    assert_eq!(t.reversed(1).unwrap().to_vec(), vec![2.0, 1.0, 0.0, 5.0, 4.0, 3.0]);

    // [[0, 3], [1, 4], [2, 5]]
    let p = t.transposed().unwrap();
    assert_eq!(p.reversed(0).unwrap().to_vec(), vec![2.0, 5.0, 1.0, 4.0, 0.0, 3.0]);
    assert!(!t.reversed(0).unwrap().shares_buffer_with(&t));
}

#[test]
fn test_padded() {
    let t = T::from_vec(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap();
    let p = t.padded(0.0, &[(1, 0), (0, 1)]).unwrap();
    assert_eq!(p.shape(), &Shape::new(vec![3, 3]));
    assert_eq!(p.to_vec(), vec![0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 3.0, 4.0, 0.0]);

    let same = t.padded(9.0, &[(0, 0), (0, 0)]).unwrap();
    assert_eq!(same.to_vec(), t.to_vec());
}
