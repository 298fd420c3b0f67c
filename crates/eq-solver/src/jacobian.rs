//! Finite difference derivatives.
//!
//! Used wherever an analytic derivative is unavailable: Hessians of models
//! without `∂μ/∂n`, temperature/pressure derivatives of `μ`, and the
//! Jacobian of inverse-problem residuals.

use crate::error::SolverResult;
use nalgebra::{DMatrix, DVector};

/// Perturbation for a variable of value `x`: relative, or absolute at zero.
pub fn perturbation(x: f64, epsilon: f64) -> f64 {
    if x != 0.0 { epsilon * x.abs() } else { epsilon }
}

/// Compute Jacobian using forward finite differences.
///
/// For each column j, perturbs x[j] by `perturbation(x[j], epsilon)` and
/// computes (f(x+e) - f(x))/dx. `f_x` is `f(x)` when the caller already has it.
pub fn forward_difference_jacobian<F>(
    x: &DVector<f64>,
    f_x: Option<&DVector<f64>>,
    mut f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: FnMut(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let f_x = match f_x {
        Some(v) => v.clone(),
        None => f(x)?,
    };
    let mut jac = DMatrix::zeros(f_x.len(), x.len());

    for j in 0..x.len() {
        let dx = perturbation(x[j], epsilon);
        let mut x_perturbed = x.clone();
        x_perturbed[j] += dx;
        let df = (f(&x_perturbed)? - &f_x) / dx;
        jac.set_column(j, &df);
    }

    Ok(jac)
}

/// Compute Jacobian using central finite differences (more accurate but 2x cost).
pub fn central_difference_jacobian<F>(
    x: &DVector<f64>,
    mut f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: FnMut(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let mut columns = Vec::with_capacity(x.len());
    for j in 0..x.len() {
        let dx = perturbation(x[j], epsilon);

        let mut x_plus = x.clone();
        x_plus[j] += dx;
        let mut x_minus = x.clone();
        x_minus[j] -= dx;

        columns.push((f(&x_plus)? - f(&x_minus)?) / (2.0 * dx));
    }

    if columns.is_empty() {
        return Ok(DMatrix::zeros(0, 0));
    }
    Ok(DMatrix::from_columns(&columns))
}

/// Central difference derivative of a vector function of one scalar.
pub fn central_difference_derivative<F>(x: f64, mut f: F, epsilon: f64) -> SolverResult<DVector<f64>>
where
    F: FnMut(f64) -> SolverResult<DVector<f64>>,
{
    let dx = perturbation(x, epsilon);
    Ok((f(x + dx)? - f(x - dx)?) / (2.0 * dx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jacobian_linear() {
        // f(x) = 2*x, J = 2
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> {
            Ok(DVector::from_element(1, 2.0 * x[0]))
        };

        let x = DVector::from_element(1, 3.0);
        let jac = forward_difference_jacobian(&x, None, f, 1e-7).unwrap();

        assert!((jac[(0, 0)] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn jacobian_of_logarithm_at_small_values() {
        // f(x) = ln x, J = 1/x; relative steps keep tiny x positive
        let f = |x: &DVector<f64>| -> SolverResult<DVector<f64>> { Ok(x.map(f64::ln)) };

        let x = DVector::from_vec(vec![1e-12, 5.0]);
        let jac = central_difference_jacobian(&x, f, 1e-6).unwrap();

        assert!((jac[(0, 0)] * 1e-12 - 1.0).abs() < 1e-6);
        assert!((jac[(1, 1)] - 0.2).abs() < 1e-8);
        assert_eq!(jac[(0, 1)], 0.0);
    }

    #[test]
    fn derivative_at_zero_uses_absolute_step() {
        let d = central_difference_derivative(0.0, |t| Ok(DVector::from_element(1, t * t + 3.0 * t)), 1e-6)
            .unwrap();
        assert!((d[0] - 3.0).abs() < 1e-8);
    }

    #[test]
    fn reuses_supplied_base_value() {
        let mut calls = 0;
        let x = DVector::from_vec(vec![1.0, 2.0]);
        let fx = DVector::from_element(1, 3.0);
        let jac = forward_difference_jacobian(
            &x,
            Some(&fx),
            |v| {
                calls += 1;
                Ok(DVector::from_element(1, v[0] + v[1]))
            },
            1e-7,
        )
        .unwrap();
        assert_eq!(calls, 2);
        assert!((jac[(0, 1)] - 1.0).abs() < 1e-6);
    }
}
