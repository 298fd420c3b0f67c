//! Starting points for the interior-point iteration.
//!
//! With warm starts enabled the solver tries, in order:
//! - the caller's amounts (interior and balanced)
//! - a least-norm correction of the caller's amounts, if it stays interior
//!
//! and then, or straight away for a cold start:
//! - the maximum-entropy point `argmin Σ nᵢ(ln nᵢ - 1) s.t. A n = b`
//! - a clamped least-norm point, which is interior but not balanced
//!
//! A cold start never reads the caller's amounts.

use nalgebra::{DMatrix, DVector};

use crate::balance::least_norm_solution;

/// Exponents above this are clamped in the maximum-entropy iteration.
const MAX_EXPONENT: f64 = 700.0;

const MAX_ENTROPY_ITERATIONS: usize = 100;

/// Floor of the clamped fallback, relative to `max(1, ‖b‖∞)`.
const CLAMP_FLOOR: f64 = 1e-10;

/// Which rule produced the starting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartingPoint {
    WarmStart,
    LeastNorm,
    MaxEntropy,
    Clamped,
}

impl StartingPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            StartingPoint::WarmStart => "warm start",
            StartingPoint::LeastNorm => "least-norm correction",
            StartingPoint::MaxEntropy => "maximum entropy",
            StartingPoint::Clamped => "clamped least-norm",
        }
    }
}

/// Pick a strictly positive starting point for `a·n = b`.
pub(crate) fn starting_point(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    guess: &DVector<f64>,
    warm_start: bool,
    tolerance: f64,
) -> (DVector<f64>, StartingPoint) {
    let interior = |n: &DVector<f64>| n.iter().all(|&v| v > 0.0 && v.is_finite());

    let correction = if warm_start {
        if interior(guess) && (a * guess - b).amax() <= tolerance {
            return (guess.clone(), StartingPoint::WarmStart);
        }
        let corrected = least_norm_solution(a, &(b - a * guess)).map(|dx| guess + dx);
        if let Some(n) = &corrected {
            if interior(n) {
                return (n.clone(), StartingPoint::LeastNorm);
            }
        }
        corrected
    } else {
        least_norm_solution(a, b)
    };

    if let Some(n) = max_entropy_point(a, b, tolerance) {
        return (n, StartingPoint::MaxEntropy);
    }

    let floor = CLAMP_FLOOR * b.amax().max(1.0);
    let n = correction
        .unwrap_or_else(|| DVector::from_element(a.ncols(), floor))
        .map(|v| if v.is_finite() { v.max(floor) } else { floor });
    (n, StartingPoint::Clamped)
}

/// Damped Newton on the dual `f(λ) = Σ exp(Aᵀλ) - bᵀλ` of the
/// maximum-entropy problem, whose solution is `n = exp(Aᵀλ)`.
fn max_entropy_point(a: &DMatrix<f64>, b: &DVector<f64>, tolerance: f64) -> Option<DVector<f64>> {
    let primal = |lambda: &DVector<f64>| a.tr_mul(lambda).map(|v| v.min(MAX_EXPONENT).exp());
    let dual = |lambda: &DVector<f64>, n: &DVector<f64>| n.sum() - b.dot(lambda);

    let mut lambda = DVector::zeros(a.nrows());
    let mut n = primal(&lambda);
    let mut f = dual(&lambda, &n);

    for _ in 0..MAX_ENTROPY_ITERATIONS {
        let gradient = a * &n - b;
        if gradient.amax() <= tolerance {
            return (n.iter().all(|&v| v > 0.0)).then_some(n);
        }
        let hessian = a * DMatrix::from_diagonal(&n) * a.transpose();
        let step = hessian.lu().solve(&(-&gradient))?;

        let mut alpha = 1.0;
        let mut accepted = false;
        for _ in 0..50 {
            let trial = &lambda + &step * alpha;
            let n_trial = primal(&trial);
            let f_trial = dual(&trial, &n_trial);
            if f_trial.is_finite() && f_trial < f {
                lambda = trial;
                n = n_trial;
                f = f_trial;
                accepted = true;
                break;
            }
            alpha *= 0.5;
        }
        if !accepted {
            break;
        }
    }

    let gradient = a * &n - b;
    (gradient.amax() <= tolerance && n.iter().all(|&v| v > 0.0)).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_interior_guess_is_kept() {
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let b = DVector::from_vec(vec![3.0]);
        let guess = DVector::from_vec(vec![1.0, 1.0]);
        let (n, kind) = starting_point(&a, &b, &guess, true, 1e-10);
        assert_eq!(kind, StartingPoint::WarmStart);
        assert_eq!(n, guess);

        let (_, kind) = starting_point(&a, &b, &guess, false, 1e-10);
        assert_eq!(kind, StartingPoint::MaxEntropy);
    }

    #[test]
    fn cold_start_ignores_the_guess() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 0.5]);
        let (fresh, kind) = starting_point(&a, &b, &DVector::zeros(3), false, 1e-10);
        assert_eq!(kind, StartingPoint::MaxEntropy);
        let seeded = DVector::from_vec(vec![0.9, 0.05, 0.1]);
        let (n, _) = starting_point(&a, &b, &seeded, false, 1e-10);
        assert_eq!(n, fresh);
    }

    #[test]
    fn zero_guess_is_corrected_onto_the_balance() {
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let b = DVector::from_vec(vec![1.0]);
        let (n, kind) = starting_point(&a, &b, &DVector::zeros(2), true, 1e-10);
        assert_eq!(kind, StartingPoint::LeastNorm);
        assert!(((&a * &n)[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn negative_correction_falls_back_to_maximum_entropy() {
        let a = DMatrix::from_row_slice(1, 3, &[1.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0]);
        // Least-norm correction of this guess has negative entries
        let guess = DVector::from_vec(vec![0.0, 0.0, 5.0]);
        let (n, kind) = starting_point(&a, &b, &guess, true, 1e-10);
        assert_eq!(kind, StartingPoint::MaxEntropy);
        for v in n.iter() {
            assert!((v - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn max_entropy_point_is_balanced() {
        let a = DMatrix::from_row_slice(2, 3, &[2.0, 1.0, 0.0, 0.0, 1.0, 2.0]);
        let b = DVector::from_vec(vec![1e-4, 3.0]);
        let n = max_entropy_point(&a, &b, 1e-12).unwrap();
        assert!((&a * &n - &b).amax() < 1e-12);
        assert!(n.iter().all(|&v| v > 0.0));
    }
}
