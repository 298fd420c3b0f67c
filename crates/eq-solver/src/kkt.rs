//! Condensed KKT system of the interior-point iteration.
//!
//! With `z` eliminated, each Newton step solves
//!
//! ```text
//! [ H + N⁻¹Z   -Aᵀ ] [dn]   [r₁]
//! [ A           0  ] [dλ] = [r₂]
//! ```
//!
//! The matrix is factorized with columns scaled by `N = diag(n)`, i.e. the
//! unknown is `dn/n`. Rows of species with vanishing amounts then stay O(1)
//! instead of blowing up with `1/nᵢ`.

use eq_core::inf_norm;
use nalgebra::{DMatrix, DVector, Dyn, LU};

use crate::result::Residuals;

/// LU factorization of the column-scaled condensed KKT matrix.
#[derive(Debug, Clone)]
pub struct KktFactorization {
    lu: LU<f64, Dyn, Dyn>,
    scaling: DVector<f64>,
    num_constraints: usize,
    regularization: f64,
}

impl KktFactorization {
    /// Assemble and factorize. `delta > 0` shifts `H` by `δI` and the
    /// constraint block by `-δI`. Returns `None` for a singular matrix.
    pub(crate) fn factorize(
        hessian: &DMatrix<f64>,
        z: &DVector<f64>,
        n: &DVector<f64>,
        a: &DMatrix<f64>,
        delta: f64,
    ) -> Option<Self> {
        let ns = n.len();
        let m = a.nrows();
        let mut k = DMatrix::zeros(ns + m, ns + m);

        for j in 0..ns {
            for i in 0..ns {
                k[(i, j)] = hessian[(i, j)] * n[j];
            }
            k[(j, j)] += z[j] + delta * n[j];
            for r in 0..m {
                k[(ns + r, j)] = a[(r, j)] * n[j];
                k[(j, ns + r)] = -a[(r, j)];
            }
        }
        for r in 0..m {
            k[(ns + r, ns + r)] = -delta;
        }

        if k.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let lu = k.lu();
        if !lu.is_invertible() {
            return None;
        }
        Some(Self {
            lu,
            scaling: n.clone(),
            num_constraints: m,
            regularization: delta,
        })
    }

    pub fn num_species(&self) -> usize {
        self.scaling.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.num_constraints
    }

    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// Solve for `(dn, dλ)` given both right-hand side blocks.
    ///
    /// `None` when the back-substitution produces non-finite values.
    pub fn solve(&self, r1: &DVector<f64>, r2: &DVector<f64>) -> Option<(DVector<f64>, DVector<f64>)> {
        let ns = self.scaling.len();
        let mut rhs = DVector::zeros(ns + r2.len());
        rhs.rows_mut(0, ns).copy_from(r1);
        rhs.rows_mut(ns, r2.len()).copy_from(r2);

        let y = self.lu.solve(&rhs)?;
        if y.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let dn = y.rows(0, ns).component_mul(&self.scaling);
        let dl = y.rows(ns, r2.len()).into_owned();
        Some((dn, dl))
    }
}

/// Final factorization of a converged solve plus the index maps needed to
/// scatter reduced derivatives back to the equilibrium species and `be`.
#[derive(Debug, Clone)]
pub struct KktSnapshot {
    pub(crate) factorization: KktFactorization,
    pub(crate) temperature: f64,
    pub(crate) pressure: f64,
    /// Amounts of all species at the solution.
    pub(crate) n_full: DVector<f64>,
    /// System indices of the species kept in the reduced problem.
    pub(crate) species: Vec<usize>,
    /// Positions of those species among the equilibrium species.
    pub(crate) species_positions: Vec<usize>,
    /// Positions in `be` of the independent rows kept.
    pub(crate) rows: Vec<usize>,
    pub(crate) num_equilibrium_species: usize,
    pub(crate) num_equilibrium_elements: usize,
    /// Relative step for derivatives the model does not provide.
    pub(crate) finite_difference_step: f64,
}

impl KktSnapshot {
    pub fn factorization(&self) -> &KktFactorization {
        &self.factorization
    }

    /// Positions in `be` of the rows that entered the final KKT system.
    pub fn independent_rows(&self) -> &[usize] {
        &self.rows
    }
}

/// Perturbed KKT residual at one iterate.
#[derive(Debug, Clone)]
pub(crate) struct KktResidual {
    pub stationarity: DVector<f64>,
    pub feasibility: DVector<f64>,
    pub complementarity: DVector<f64>,
}

impl KktResidual {
    pub fn evaluate(
        g: &DVector<f64>,
        a: &DMatrix<f64>,
        b: &DVector<f64>,
        n: &DVector<f64>,
        lambda: &DVector<f64>,
        z: &DVector<f64>,
        barrier: f64,
    ) -> Self {
        Self {
            stationarity: g - a.tr_mul(lambda) - z,
            feasibility: a * n - b,
            complementarity: n.component_mul(z).add_scalar(-barrier),
        }
    }

    /// Euclidean norm of the stacked residual, used as line-search merit.
    pub fn merit(&self) -> f64 {
        (self.stationarity.norm_squared()
            + self.feasibility.norm_squared()
            + self.complementarity.norm_squared())
        .sqrt()
    }

    pub fn norms(&self) -> Residuals {
        Residuals {
            stationarity: inf_norm(self.stationarity.as_slice()),
            feasibility: inf_norm(self.feasibility.as_slice()),
            complementarity: inf_norm(self.complementarity.as_slice()),
        }
    }

    pub fn converged(&self, tolerance: f64) -> bool {
        let r = self.norms();
        r.stationarity <= tolerance && r.feasibility <= tolerance && r.complementarity <= tolerance
    }
}
