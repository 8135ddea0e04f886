//! Higher-order derivatives through retained backward graphs.

use approx::assert_relative_eq;
use dl_backend_cpu::CpuTensor;
use dl_tensor::prelude::*;

type T = CpuTensor<f64>;

fn derivative(y: &T, x: &T) -> T {
    y.gradients(&[x], true).unwrap().remove(0)
}

#[test]
fn test_cubic_derivatives() {
    let _ = env_logger::builder().is_test(true).try_init();
    let x = T::var("x", vec![1.0, 2.0, 3.0, 4.0], [4]).unwrap();
    let y = x.mul(&x).unwrap().mul(&x).unwrap();

    let d1 = derivative(&y, &x);
    assert!(d1.requires_grad());
    assert_eq!(d1.to_vec(), vec![3.0, 12.0, 27.0, 48.0]);

    let d2 = derivative(&d1, &x);
    assert_eq!(d2.to_vec(), vec![6.0, 12.0, 18.0, 24.0]);

    let d3 = derivative(&d2, &x);
    assert_eq!(d3.to_vec(), vec![6.0, 6.0, 6.0, 6.0]);
}

#[test]
fn test_transcendental_second_derivatives() {
    let points = [-1.2, -0.3, 0.4, 1.5];
    let x = T::var("x", points.to_vec(), [4]).unwrap();

    // tanh'' = -2 tanh (1 - tanh^2)
    let d2 = derivative(&derivative(&x.tanh().unwrap(), &x), &x);
    for (got, p) in d2.to_vec().into_iter().zip(points) {
        let t = f64::tanh(p);
        assert_relative_eq!(got, -2.0 * t * (1.0 - t * t), epsilon = 1e-12);
    }

    // sin'' = -sin
    let d2 = derivative(&derivative(&x.sin().unwrap(), &x), &x);
    for (got, p) in d2.to_vec().into_iter().zip(points) {
        assert_relative_eq!(got, -p.sin(), epsilon = 1e-12);
    }

    // exp'' = exp
    let d2 = derivative(&derivative(&x.exp().unwrap(), &x), &x);
    for (got, p) in d2.to_vec().into_iter().zip(points) {
        assert_relative_eq!(got, p.exp(), epsilon = 1e-12);
    }
}

#[test]
fn test_mixed_partial_through_matmul() {
    // f(a, b) = sum(a . b) for vectors is a dot product; df/da = b and
    // d(sum(df/da))/db = ones.
    let a = T::var("a", vec![1.0, 2.0, 3.0], [3]).unwrap();
    let b = T::var("b", vec![4.0, 5.0, 6.0], [3]).unwrap();
    let f = a.matmul(&b).unwrap();
    assert_eq!(f.item().unwrap(), 32.0);

    let da = derivative(&f, &a);
    assert_eq!(da.to_vec(), vec![4.0, 5.0, 6.0]);
    let dadb = derivative(&da, &b);
    assert_eq!(dadb.to_vec(), vec![1.0, 1.0, 1.0]);
}

#[test]
fn test_without_retain_gradients_are_constants() {
    let x = T::var("x", vec![1.0, 2.0], [2]).unwrap();
    let y = x.square().unwrap();
    let d1 = y.gradients(&[&x], false).unwrap().remove(0);
    assert!(!d1.requires_grad());
    assert!(d1.is_leaf());
    assert_eq!(d1.to_vec(), vec![2.0, 4.0]);
}

#[test]
fn test_backward_with_retain_graph() {
    let x = T::var("x", vec![0.5, 1.5], [2]).unwrap();
    let y = x.square().unwrap().mul(&x).unwrap();
    let grads = y
        .backward_with(None, BackwardOptions::new().retain_graph(true))
        .unwrap();

    let dx = grads.wrt(&x).unwrap();
    assert!(dx.requires_grad());
    assert_eq!(dx.to_vec(), vec![0.75, 6.75]);
    // The leaf buffer holds plain values.
    assert_eq!(x.grad().unwrap().to_vec(), vec![0.75, 6.75]);
    assert!(!x.grad().unwrap().requires_grad());

    let d2 = derivative(dx, &x);
    assert_eq!(d2.to_vec(), vec![3.0, 9.0]);
}

#[test]
fn test_pow_derivatives() {
    let x = T::var("x", vec![1.0, 2.0, 3.0], [3]).unwrap();
    let y = x.pow(3.0).unwrap();

    let d1 = derivative(&y, &x);
    assert_eq!(d1.to_vec(), vec![3.0, 12.0, 27.0]);
    let d2 = derivative(&d1, &x);
    assert_eq!(d2.to_vec(), vec![6.0, 12.0, 18.0]);
    let d3 = derivative(&d2, &x);
    assert_eq!(d3.to_vec(), vec![6.0, 6.0, 6.0]);
}
