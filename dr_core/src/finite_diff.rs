//! Finite difference utilities for checking both differentiation modes.

/// Central-difference gradient of a scalar function of a vector.
///
/// # Example
/// ```
/// use dr_core::finite_diff_grad;
///
/// // f(x, y) = x^2 + y^2
/// let f = |v: &[f64]| v[0] * v[0] + v[1] * v[1];
/// let grads = finite_diff_grad(f, &[3.0, 4.0], 1e-6);
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
            let f_plus = f(&perturbed);
            perturbed[i] = point[i] - eps;
            let f_minus = f(&perturbed);
            perturbed[i] = point[i];
            (f_plus - f_minus) / (2.0 * eps)
        })
        .collect()
}

/// Central-difference derivative of a vector function along `direction`.
///
/// Returns d/dt f(point + t * direction) at t = 0, one entry per output.
pub fn directional_derivative<F>(f: F, point: &[f64], direction: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    assert_eq!(point.len(), direction.len());
    let shifted = |t: f64| -> Vec<f64> {
        point
            .iter()
            .zip(direction)
            .map(|(p, d)| p + t * d)
            .collect()
    };
    let plus = f(&shifted(eps));
    let minus = f(&shifted(-eps));
    plus.iter()
        .zip(&minus)
        .map(|(p, m)| (p - m) / (2.0 * eps))
        .collect()
}

/// Largest element-wise absolute difference between two derivative vectors.
pub fn max_abs_error(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_diff_transcendental() {
        // d/dx sin(x) exp(x) = (cos(x) + sin(x)) exp(x)
        let f = |v: &[f64]| v[0].sin() * v[0].exp();
        let grads = finite_diff_grad(f, &[1.0], 1e-6);

        let expected = (1.0_f64.cos() + 1.0_f64.sin()) * 1.0_f64.exp();
        assert!((grads[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_directional_derivative_linear_map() {
        // f(x, y) = (x + y, 2x, y^2) along (1, -1) at (1, 3)
        let f = |v: &[f64]| vec![v[0] + v[1], 2.0 * v[0], v[1] * v[1]];
        let d = directional_derivative(f, &[1.0, 3.0], &[1.0, -1.0], 1e-6);

        assert!(max_abs_error(&d, &[0.0, 2.0, -6.0]) < 1e-5);
    }

    #[test]
    fn test_max_abs_error() {
        let err = max_abs_error(&[1.0, 2.0, 3.0], &[1.1, 2.0, 2.8]);
        assert!((err - 0.2).abs() < 1e-10);
    }
}
