//! Gradient tests - the backward engine against finite differences and
//! closed-form values.

use dl_backend_cpu::CpuTensor;
use dl_tensor::prelude::*;
use dl_tensor::{check_gradients, GradCheckConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type T = CpuTensor<f64>;

// ============================================================================
// Test Utilities
// ============================================================================

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random(rng: &mut StdRng, shape: &[usize], low: f64, high: f64) -> T {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|_| rng.gen_range(low..high)).collect();
    T::from_vec(data, shape.to_vec()).unwrap()
}

fn tensor(data: &[f64], shape: &[usize]) -> T {
    T::from_slice(data, shape.to_vec()).unwrap()
}

/// Check d(sum(f(inputs)))/d(inputs) against central differences.
fn assert_gradients<F>(name: &str, inputs: &[T], f: F)
where
    F: Fn(&[T]) -> Result<T>,
{
    init_logging();
    let config = GradCheckConfig::default().eps(1e-5).tolerance(1e-5);
    let report = check_gradients(f, inputs, &config).unwrap();
    assert!(
        report.passed,
        "{}: max abs error {:e}\nanalytic:  {:?}\nnumerical: {:?}",
        name, report.max_abs_error, report.analytic, report.numerical
    );
}

// ============================================================================
// Element-wise
// ============================================================================

#[test]
fn test_unary_gradients() {
    let mut rng = StdRng::seed_from_u64(7);
    let x = random(&mut rng, &[2, 3], -2.0, 2.0);
    let positive = random(&mut rng, &[2, 3], 0.5, 3.0);
    let small = random(&mut rng, &[5], -1.0, 1.0);

    assert_gradients("neg", &[x.clone()], |v| v[0].neg());
    assert_gradients("square", &[x.clone()], |v| v[0].square());
    assert_gradients("exp", &[x.clone()], |v| v[0].exp());
    assert_gradients("tanh", &[x.clone()], |v| v[0].tanh());
    assert_gradients("sin", &[x.clone()], |v| v[0].sin());
    assert_gradients("cos", &[x.clone()], |v| v[0].cos());
    assert_gradients("sigmoid", &[x.clone()], |v| v[0].sigmoid());
    assert_gradients("log", &[positive.clone()], |v| v[0].log());
    assert_gradients("sqrt", &[positive.clone()], |v| v[0].sqrt());
    assert_gradients("recip", &[positive], |v| v[0].recip());
    assert_gradients("tan", &[small], |v| v[0].tan());
}

#[test]
fn test_relu_gradients() {
    // Kept away from the kink at zero.
    let x = tensor(&[-1.5, -0.5, 0.5, 1.5, 2.5, -2.5], &[2, 3]);
    assert_gradients("relu", &[x.clone()], |v| v[0].relu());
    assert_gradients("leaky_relu", &[x], |v| v[0].leaky_relu(0.1));
}

#[test]
fn test_softmax_gradients() {
    let mut rng = StdRng::seed_from_u64(11);
    let x = random(&mut rng, &[2, 4], -1.0, 1.0);
    let w = random(&mut rng, &[2, 4], -1.0, 1.0);
    assert_gradients("softmax(1)", &[x.clone()], |v| v[0].softmax(1)?.mul(&w));
    assert_gradients("softmax(0)", &[x], |v| v[0].softmax(0)?.mul(&w));
}

#[test]
fn test_binary_gradients_same_shape() {
    let mut rng = StdRng::seed_from_u64(3);
    let a = random(&mut rng, &[4, 3], -2.0, 2.0);
    let b = random(&mut rng, &[4, 3], -2.0, 2.0);
    let d = random(&mut rng, &[4, 3], 1.0, 2.0);

    assert_gradients("add", &[a.clone(), b.clone()], |v| v[0].add(&v[1]));
    assert_gradients("sub", &[a.clone(), b.clone()], |v| v[0].sub(&v[1]));
    assert_gradients("mul", &[a.clone(), b], |v| v[0].mul(&v[1]));
    assert_gradients("div", &[a, d], |v| v[0].div(&v[1]));
}

#[test]
fn test_binary_gradients_broadcast() {
    let mut rng = StdRng::seed_from_u64(5);
    let a = random(&mut rng, &[4, 3], -2.0, 2.0);
    let row = random(&mut rng, &[3], -2.0, 2.0);
    let positive_row = random(&mut rng, &[3], 1.0, 2.0);
    let positive = random(&mut rng, &[4, 3], 1.0, 2.0);
    let s = T::scalar(0.7);

    assert_gradients("[4,3] + [3]", &[a.clone(), row.clone()], |v| v[0].add(&v[1]));
    assert_gradients("[3] - [4,3]", &[row.clone(), a.clone()], |v| v[0].sub(&v[1]));
    assert_gradients("[4,3] * [3]", &[a.clone(), row.clone()], |v| v[0].mul(&v[1]));
    assert_gradients("[3] * [4,3]", &[row.clone(), a.clone()], |v| v[0].mul(&v[1]));
    assert_gradients("[4,3] / [3]", &[a.clone(), positive_row], |v| v[0].div(&v[1]));
    assert_gradients("[3] / [4,3]", &[row, positive.clone()], |v| v[0].div(&v[1]));
    assert_gradients("[4,3] * scalar", &[a.clone(), s.clone()], |v| v[0].mul(&v[1]));
    assert_gradients("scalar / [4,3]", &[s, positive], |v| v[0].div(&v[1]));
}

// ============================================================================
// Reductions
// ============================================================================

#[test]
fn test_reduction_gradients() {
    let mut rng = StdRng::seed_from_u64(13);
    let x = random(&mut rng, &[3, 4], -2.0, 2.0);
    let w3 = random(&mut rng, &[3], -1.0, 1.0);
    let w4 = random(&mut rng, &[4], -1.0, 1.0);

    assert_gradients("sum(0)", &[x.clone()], |v| v[0].sum(&[0], false)?.mul(&w4));
    assert_gradients("sum(1, keepdims)", &[x.clone()], |v| {
        v[0].sum(&[1], true)?.square()
    });
    assert_gradients("sum_all", &[x.clone()], |v| v[0].sum_all()?.square());
    assert_gradients("mean(1)", &[x.clone()], |v| v[0].mean(&[1], false)?.mul(&w3));
    assert_gradients("mean_all", &[x.clone()], |v| v[0].mean_all()?.exp());
    assert_gradients("variance(0)", &[x], |v| v[0].variance(&[0])?.mul(&w4));
}

#[test]
fn test_max_min_gradients() {
    // Distinct values so the winners are stable under perturbation.
    let x = tensor(&[1.0, 5.0, 3.0, 4.0, 2.0, 6.0], &[2, 3]);
    let w2 = tensor(&[0.5, -2.0], &[2]);
    let w3 = tensor(&[1.0, 2.0, 3.0], &[3]);

    assert_gradients("max(0)", &[x.clone()], |v| v[0].max(0)?.mul(&w3));
    assert_gradients("max(1)", &[x.clone()], |v| v[0].max(1)?.mul(&w2));
    assert_gradients("min(1)", &[x], |v| v[0].min(1)?.mul(&w2));
}

// ============================================================================
// Shape and indexing
// ============================================================================

#[test]
fn test_layout_gradients() {
    let mut rng = StdRng::seed_from_u64(17);
    let x = random(&mut rng, &[2, 3], -2.0, 2.0);
    let cube = random(&mut rng, &[2, 3, 4], -2.0, 2.0);
    let column = random(&mut rng, &[4, 1], -2.0, 2.0);
    let w32 = random(&mut rng, &[3, 2], -1.0, 1.0);
    let w23 = random(&mut rng, &[2, 3], -1.0, 1.0);
    let w43 = random(&mut rng, &[4, 3], -1.0, 1.0);

    assert_gradients("view", &[x.clone()], |v| v[0].view(&[3, -1])?.mul(&w32));
    assert_gradients("permuted", &[cube], |v| v[0].permuted(&[2, 0, 1])?.mul(&w23));
    assert_gradients("transposed", &[x.clone()], |v| v[0].transposed()?.mul(&w32));
    assert_gradients("expand column", &[column], |v| v[0].expand([4, 3])?.mul(&w43));
    assert_gradients("expand row", &[x.clone()], |v| v[0].expand([4, 2, 3])?.mul(&w23));
    assert_gradients("unsqueeze", &[x.clone()], |v| v[0].unsqueeze(1)?.squeeze()?.mul(&w23));
    assert_gradients("view of transposed", &[x], |v| {
        v[0].transposed()?.view(&[-1])?.square()
    });
}

#[test]
fn test_subscript_gradients() {
    let mut rng = StdRng::seed_from_u64(19);
    let x = random(&mut rng, &[3, 4], -2.0, 2.0);
    let row = random(&mut rng, &[4], -2.0, 2.0);
    let w3 = random(&mut rng, &[3], -1.0, 1.0);
    let w4 = random(&mut rng, &[4], -1.0, 1.0);
    let w34 = random(&mut rng, &[3, 4], -1.0, 1.0);
    let s = T::scalar(0.3);

    assert_gradients("get row (view)", &[x.clone()], |v| v[0].get(&s![1])?.mul(&w4));
    assert_gradients("get column (copy)", &[x.clone()], |v| v[0].get(&s![.., -1])?.mul(&w3));
    assert_gradients("get block", &[x.clone()], |v| v[0].get(&s![0..2, 1..3])?.square());

    assert_gradients("set row", &[x.clone(), row], |v| {
        let mut base = v[0].mul_scalar(1.0)?;
        base.set(&s![1], &v[1])?;
        base.mul(&w34)
    });
    assert_gradients("set column to scalar", &[x, s], |v| {
        let mut base = v[0].square()?;
        base.set(&s![.., 0], &v[1])?;
        base.mul(&w34)
    });
}

#[test]
fn test_gather_scatter_gradients() {
    let mut rng = StdRng::seed_from_u64(23);
    let x = random(&mut rng, &[2, 3], -2.0, 2.0);
    let pair = random(&mut rng, &[2], -2.0, 2.0);
    let w2 = random(&mut rng, &[2], -1.0, 1.0);
    let w23 = random(&mut rng, &[2, 3], -1.0, 1.0);

    assert_gradients("gather", &[x], |v| v[0].gather(1, &[2, 0])?.mul(&w2));
    assert_gradients("scatter", &[pair], |v| v[0].scatter(1, &[2, 0], 3)?.mul(&w23));
}

// ============================================================================
// Matrix multiplication
// ============================================================================

#[test]
fn test_matmul_gradients() {
    let mut rng = StdRng::seed_from_u64(29);
    let a = random(&mut rng, &[2, 3], -1.0, 1.0);
    let at = random(&mut rng, &[3, 2], -1.0, 1.0);
    let b = random(&mut rng, &[3, 4], -1.0, 1.0);
    let bt = random(&mut rng, &[4, 3], -1.0, 1.0);
    let v3 = random(&mut rng, &[3], -1.0, 1.0);
    let u3 = random(&mut rng, &[3], -1.0, 1.0);

    assert_gradients("A B", &[a.clone(), b.clone()], |v| v[0].matmul(&v[1]));
    assert_gradients("A^T B", &[at.clone(), b.clone()], |v| v[0].matmul_t(&v[1], true, false));
    assert_gradients("A B^T", &[a.clone(), bt.clone()], |v| v[0].matmul_t(&v[1], false, true));
    assert_gradients("A^T B^T", &[at.clone(), bt], |v| v[0].matmul_t(&v[1], true, true));

    assert_gradients("v B", &[v3.clone(), b.clone()], |v| v[0].matmul(&v[1]));
    assert_gradients("A v", &[a, v3.clone()], |v| v[0].matmul(&v[1]));
    assert_gradients("v . u", &[v3, u3], |v| v[0].matmul(&v[1]));
    assert_gradients("transposed view", &[at, b], |v| v[0].transposed()?.matmul(&v[1]));
}

#[test]
fn test_batched_matmul_gradients() {
    let mut rng = StdRng::seed_from_u64(31);
    let a = random(&mut rng, &[2, 2, 3], -1.0, 1.0);
    let b = random(&mut rng, &[3, 4], -1.0, 1.0);
    let bt = random(&mut rng, &[2, 4, 3], -1.0, 1.0);
    let single = random(&mut rng, &[1, 3, 2], -1.0, 1.0);
    let cube = random(&mut rng, &[2, 3, 4], -1.0, 1.0);

    assert_gradients("[2,2,3] x [3,4]", &[a.clone(), b], |v| {
        v[0].batched_matmul(&v[1], false, false)?.square()
    });
    assert_gradients("[2,2,3] x [2,4,3]^T", &[a, bt], |v| {
        v[0].batched_matmul(&v[1], false, true)?.square()
    });
    // The size-1 batch axis pairs with both slices of the other operand.
    assert_gradients("[1,3,2]^T x [2,3,4]", &[single, cube], |v| {
        v[0].batched_matmul(&v[1], true, false)?.square()
    });
}

#[test]
fn test_band_matrix_gradients() {
    let mut rng = StdRng::seed_from_u64(37);
    let x = random(&mut rng, &[2, 3, 3], -1.0, 1.0);
    let w = random(&mut rng, &[3, 3], -1.0, 1.0);
    assert_gradients("band(0, 1)", &[x.clone()], |v| v[0].band_matrix(Some(0), Some(1))?.mul(&w));
    assert_gradients("lower triangle", &[x], |v| v[0].band_matrix(None, Some(0))?.mul(&w));
}

// ============================================================================
// Powers, joins and padding
// ============================================================================

#[test]
fn test_pow_gradients() {
    let mut rng = StdRng::seed_from_u64(41);
    let x = random(&mut rng, &[2, 3], -2.0, 2.0);
    let positive = random(&mut rng, &[2, 3], 0.5, 2.0);
    let power = random(&mut rng, &[3], -1.0, 2.0);

    assert_gradients("pow(3)", &[x.clone()], |v| v[0].pow(3.0));
    assert_gradients("pow(0)", &[x], |v| v[0].pow(0.0));
    assert_gradients("pow(0.5)", &[positive.clone()], |v| v[0].pow(0.5));
    assert_gradients("pow(-1.5)", &[positive.clone()], |v| v[0].pow(-1.5));
    assert_gradients("raised_to", &[positive, power], |v| v[0].raised_to(&v[1]));
}

#[test]
fn test_maximum_minimum_gradients() {
    // Differences stay clear of ties.
    let a = tensor(&[1.0, -2.0, 0.5, 3.0, -1.0, 2.0], &[2, 3]);
    let b = tensor(&[0.0, 1.0, 1.5], &[3]);
    let w = tensor(&[0.5, -1.0, 2.0, 1.5, 0.25, -0.75], &[2, 3]);

    assert_gradients("maximum", &[a.clone(), b.clone()], |v| v[0].maximum(&v[1])?.mul(&w));
    assert_gradients("minimum", &[a, b], |v| v[0].minimum(&v[1])?.mul(&w));
}

#[test]
fn test_join_gradients() {
    let mut rng = StdRng::seed_from_u64(43);
    let a = random(&mut rng, &[2, 3], -1.0, 1.0);
    let b = random(&mut rng, &[1, 3], -1.0, 1.0);
    let c = random(&mut rng, &[2, 2], -1.0, 1.0);
    let w33 = random(&mut rng, &[3, 3], -1.0, 1.0);
    let w25 = random(&mut rng, &[2, 5], -1.0, 1.0);

    assert_gradients("concat(0)", &[a.clone(), b], |v| {
        T::concat(&[&v[0], &v[1]], 0)?.mul(&w33)
    });
    assert_gradients("concat(1)", &[a.clone(), c], |v| {
        T::concat(&[&v[0], &v[1]], 1)?.square()?.mul(&w25)
    });
    assert_gradients("concat with itself", &[a.clone()], |v| {
        T::concat(&[&v[0], &v[0].exp()?], 1)?.square()
    });
    assert_gradients("repeated", &[a.clone()], |v| v[0].repeated(3)?.square());
    assert_gradients("unstack", &[a], |v| {
        let parts = v[0].unstack(1, &[1, 2])?;
        parts[0].mul(&parts[1].sum(&[1], true)?)
    });
}

#[test]
fn test_reverse_pad_gradients() {
    let mut rng = StdRng::seed_from_u64(47);
    let x = random(&mut rng, &[3, 2], -1.0, 1.0);
    let w = random(&mut rng, &[3, 2], -1.0, 1.0);
    let w23 = random(&mut rng, &[2, 3], -1.0, 1.0);
    let padded = random(&mut rng, &[4, 5], -1.0, 1.0);

    assert_gradients("reversed(0)", &[x.clone()], |v| v[0].reversed(0)?.mul(&w));
    assert_gradients("reversed(1)", &[x.clone()], |v| v[0].reversed(1)?.mul(&w));
    assert_gradients("reversed view", &[x.clone()], |v| {
        v[0].transposed()?.reversed(1)?.mul(&w23)
    });
    assert_gradients("padded", &[x], |v| {
        v[0].padded(1.0, &[(1, 0), (2, 1)])?.mul(&padded)
    });
}

// ============================================================================
// Closed-form scenarios
// ============================================================================

#[test]
fn test_broadcast_reduction() {
    init_logging();
    let a = T::var("a", (0..12).map(f64::from).collect(), [4, 3]).unwrap();
    let b = T::var("b", vec![1.0, 2.0, 3.0], [3]).unwrap();
    let y = a.add(&b).unwrap();

    let seed = T::from_vec((1..=12).map(f64::from).collect(), [4, 3]).unwrap();
    let grads = y.backward_with(Some(&seed), BackwardOptions::default()).unwrap();

    let grad_b = grads.wrt(&b).unwrap();
    assert_eq!(grad_b.shape(), &Shape::new(vec![3]));
    assert_eq!(grad_b.to_vec(), vec![22.0, 26.0, 30.0]);
    assert_eq!(grads.wrt(&a).unwrap().to_vec(), seed.to_vec());
}

#[test]
fn test_end_to_end_broadcast_scale() {
    let a = T::var("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [3, 2]).unwrap();
    let b = T::from_vec(vec![1.0, 2.0], [2]).unwrap();

    let result = (&a + &b) * 2.0;
    assert_eq!(result.to_vec(), vec![4.0, 8.0, 8.0, 12.0, 12.0, 16.0]);

    let grads = result.gradients(&[&a], false).unwrap();
    assert_eq!(grads[0].shape(), &Shape::new(vec![3, 2]));
    assert_eq!(grads[0].to_vec(), vec![2.0; 6]);
}

#[test]
fn test_diamond_accumulation() {
    let x = T::var("x", vec![1.0, 2.0, 3.0], [3]).unwrap();

    // y = f(x) + g(x)
    let f = x.exp().unwrap();
    let g = x.square().unwrap();
    let y = f.add(&g).unwrap();
    let total = y.gradients(&[&x], false).unwrap().remove(0);
    let df = f.gradients(&[&x], false).unwrap().remove(0);
    let dg = g.gradients(&[&x], false).unwrap().remove(0);
    for ((t, a), b) in total.to_vec().iter().zip(df.to_vec()).zip(dg.to_vec()) {
        assert!((t - (a + b)).abs() < 1e-12);
    }

    // h is consumed twice by the product and once by the sum:
    // y = h*h + h with h = 2x, so dy/dx = (2h + 1) * 2 = 8x + 2
    let h = x.mul_scalar(2.0).unwrap();
    let y = h.mul(&h).unwrap().add(&h).unwrap();
    let grads = y.backward().unwrap();
    assert_eq!(grads.wrt(&x).unwrap().to_vec(), vec![10.0, 18.0, 26.0]);
    assert_eq!(grads.wrt(&h).unwrap().to_vec(), vec![5.0, 9.0, 13.0]);
}

#[test]
fn test_matmul_closed_form() {
    let a = T::var("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
    let b = T::var("b", vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0], [3, 2]).unwrap();

    let c = a.matmul(&b).unwrap();
    assert_eq!(c.shape(), &Shape::new(vec![2, 2]));
    assert_eq!(c.to_vec(), vec![14.0, 32.0, 32.0, 77.0]);

    // dA = dC . B^T, dB = A^T . dC with dC = ones
    let grads = c.backward().unwrap();
    assert_eq!(
        grads.wrt(&a).unwrap().to_vec(),
        vec![5.0, 7.0, 9.0, 5.0, 7.0, 9.0]
    );
    assert_eq!(
        grads.wrt(&b).unwrap().to_vec(),
        vec![5.0, 5.0, 7.0, 7.0, 9.0, 9.0]
    );
}

#[test]
fn test_matmul_with_own_transpose() {
    // C = A A^T reaches A twice, once through the permuted view.
    let a = T::var("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
    let c = a.matmul(&a.transposed().unwrap()).unwrap();
    assert_eq!(c.to_vec(), vec![14.0, 32.0, 32.0, 77.0]);

    let grads = c.gradients(&[&a], false).unwrap();
    assert_eq!(grads[0].to_vec(), vec![10.0, 14.0, 18.0, 10.0, 14.0, 18.0]);
}
