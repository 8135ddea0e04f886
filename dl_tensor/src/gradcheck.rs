//! Finite-difference checks of the backward engine.
//!
//! [`check_gradients`] differentiates a tensor function with the backward
//! engine and compares the result against central differences.

use crate::backend::Backend;
use crate::config::GradCheckConfig;
use crate::element::Element;
use crate::error::Result;
use crate::tensor::Tensor;

/// Central-difference gradient of a scalar function of plain values.
///
/// # Example
/// ```
/// use dl_tensor::gradcheck::finite_diff_grad;
///
/// // f(x, y) = x^2 + y^2
/// let f = |v: &[f64]| v[0] * v[0] + v[1] * v[1];
/// let grads = finite_diff_grad(f, &[3.0, 4.0], 1e-7);
///
/// assert!((grads[0] - 6.0).abs() < 1e-5);
/// assert!((grads[1] - 8.0).abs() < 1e-5);
/// ```
pub fn finite_diff_grad<F>(f: F, point: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut perturbed = point.to_vec();
    (0..point.len())
        .map(|i| {
            perturbed[i] = point[i] + eps;
            let plus = f(&perturbed);
            perturbed[i] = point[i] - eps;
            let minus = f(&perturbed);
            perturbed[i] = point[i];
            (plus - minus) / (2.0 * eps)
        })
        .collect()
}

/// Largest absolute element-wise difference between two gradient vectors.
pub fn max_grad_error(lhs: &[f64], rhs: &[f64]) -> f64 {
    debug_assert_eq!(lhs.len(), rhs.len());
    lhs.iter()
        .zip(rhs)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

/// Central differences of `sum(f(inputs))` with respect to every element of
/// every input. The inputs are never modified; each evaluation sees fresh
/// copies.
pub fn numerical_gradients<E, B, F>(
    f: F,
    inputs: &[Tensor<E, B>],
    eps: f64,
) -> Result<Vec<Vec<f64>>>
where
    E: Element,
    B: Backend,
    F: Fn(&[Tensor<E, B>]) -> Result<Tensor<E, B>>,
{
    let values: Vec<Vec<f64>> = inputs
        .iter()
        .map(|t| t.to_vec().into_iter().map(Element::as_f64).collect())
        .collect();

    let evaluate = |which: usize, point: &[f64]| -> Result<f64> {
        let args = inputs
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let data = if i == which { point } else { values[i].as_slice() };
                Tensor::from_vec(data.iter().map(|&v| E::from_f64(v)).collect(), t.shape().clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(f(&args)?.sum_all()?.item()?.as_f64())
    };

    let mut grads = Vec::with_capacity(inputs.len());
    for (which, point) in values.iter().enumerate() {
        let mut perturbed = point.clone();
        let mut grad = Vec::with_capacity(point.len());
        for i in 0..point.len() {
            perturbed[i] = point[i] + eps;
            let plus = evaluate(which, &perturbed)?;
            perturbed[i] = point[i] - eps;
            let minus = evaluate(which, &perturbed)?;
            perturbed[i] = point[i];
            grad.push((plus - minus) / (2.0 * eps));
        }
        grads.push(grad);
    }
    Ok(grads)
}

/// Outcome of [`check_gradients`].
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    /// Gradients from the backward engine, one vector per input.
    pub analytic: Vec<Vec<f64>>,
    /// Central-difference estimates, one vector per input.
    pub numerical: Vec<Vec<f64>>,
    pub max_abs_error: f64,
    pub passed: bool,
}

/// Compare the backward engine's gradients of `sum(f(inputs))` against
/// finite differences.
pub fn check_gradients<E, B, F>(
    f: F,
    inputs: &[Tensor<E, B>],
    config: &GradCheckConfig,
) -> Result<GradCheckReport>
where
    E: Element,
    B: Backend,
    F: Fn(&[Tensor<E, B>]) -> Result<Tensor<E, B>>,
{
    let vars: Vec<Tensor<E, B>> = inputs.iter().map(|t| t.copied().requiring_grad()).collect();
    let refs: Vec<&Tensor<E, B>> = vars.iter().collect();
    let grads = f(&vars)?.sum_all()?.gradients(&refs, false)?;
    let analytic: Vec<Vec<f64>> = grads
        .iter()
        .map(|g| g.to_vec().into_iter().map(Element::as_f64).collect())
        .collect();

    let numerical = numerical_gradients(&f, inputs, config.eps)?;
    let max_abs_error = analytic
        .iter()
        .zip(&numerical)
        .map(|(a, n)| max_grad_error(a, n))
        .fold(0.0, f64::max);
    let passed = max_abs_error <= config.tolerance;
    if !passed {
        log::warn!(
            "gradient check failed: max abs error {:.3e} exceeds {:.3e}",
            max_abs_error,
            config.tolerance
        );
    }

    Ok(GradCheckReport {
        analytic,
        numerical,
        max_abs_error,
        passed,
    })
}
