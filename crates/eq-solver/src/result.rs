//! Per-solve result records.

use std::sync::Arc;

use crate::kkt::KktSnapshot;

/// Why a solve did not succeed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolveFailure {
    /// Iteration budget exhausted.
    NonConvergence,
    /// The element balance cannot be satisfied with non-negative amounts.
    Infeasible { what: String },
    /// The KKT matrix stayed singular after the regularization retry.
    NumericalSingularity,
}

/// Residual norms (∞-norm) at the final iterate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Residuals {
    /// `‖g - Aᵀλ - z‖` in units of RT.
    pub stationarity: f64,
    /// `‖A·n - b‖` [mol].
    pub feasibility: f64,
    /// `‖n∘z - μ_b‖`.
    pub complementarity: f64,
}

/// Wall-clock breakdown of a solve, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveTiming {
    pub total: f64,
    /// Chemical-potential and Hessian evaluations.
    pub evaluations: f64,
    /// KKT assembly, factorization, and back-substitution.
    pub linear_systems: f64,
}

/// Outcome of one equilibrium calculation.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EquilibriumResult {
    pub succeeded: bool,
    pub failure: Option<SolveFailure>,
    pub iterations: usize,
    pub residuals: Residuals,
    pub timing: SolveTiming,
    /// Whether any KKT system needed the regularization retry.
    pub regularized: bool,
    /// Rows of `be` removed because their zero budget forced species to zero.
    pub eliminated_elements: Vec<usize>,
    /// Final KKT factorization of a converged solve, used for sensitivities.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub factorization: Option<Arc<KktSnapshot>>,
}

impl EquilibriumResult {
    pub(crate) fn failed(failure: SolveFailure) -> Self {
        Self {
            succeeded: false,
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Short description of the failure, if any.
    pub fn failure_message(&self) -> Option<String> {
        self.failure.as_ref().map(|f| match f {
            SolveFailure::NonConvergence => format!(
                "no convergence after {} iterations (stationarity {:.3e}, feasibility {:.3e})",
                self.iterations, self.residuals.stationarity, self.residuals.feasibility
            ),
            SolveFailure::Infeasible { what } => format!("infeasible: {what}"),
            SolveFailure::NumericalSingularity => {
                "KKT matrix singular after regularization".to_string()
            }
        })
    }
}
