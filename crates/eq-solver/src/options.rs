//! Numerical options for the equilibrium solver.

use crate::error::{SolverError, SolverResult};

/// How the Hessian of `G/RT` is built at each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HessianStrategy {
    /// Model Jacobian `∂μ/∂n / RT`, or finite differences when the model has none.
    #[default]
    Exact,
    /// Ideal diagonal approximation `1/nᵢ` for species in multi-species phases.
    Approximate,
}

/// Amount of `tracing` output produced by a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Verbosity {
    #[default]
    Quiet,
    /// One `debug!` event per solve.
    Summary,
    /// Additionally one `trace!` event per iteration.
    Iterations,
}

/// Options for [`EquilibriumSolver`](crate::EquilibriumSolver).
///
/// A plain value copied into every call; the solver keeps no other
/// configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EquilibriumOptions {
    /// Bound on the stationarity, feasibility, and complementarity residuals.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Start from the state's amounts when they are interior and balanced.
    pub warm_start: bool,
    pub hessian: HessianStrategy,
    pub verbosity: Verbosity,
    /// Complementarity perturbation `μ_b` in `nᵢ zᵢ = μ_b`.
    pub barrier: f64,
    /// Fraction-to-the-boundary factor τ.
    pub fraction_to_boundary: f64,
    /// Step halvings tried before the non-monotone fallback.
    pub max_line_search_iters: usize,
    /// Diagonal shift used for the single retry after a singular factorization.
    pub regularization: f64,
    /// Relative step for finite-difference derivatives.
    pub finite_difference_step: f64,
}

impl Default for EquilibriumOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 200,
            warm_start: true,
            hessian: HessianStrategy::Exact,
            verbosity: Verbosity::Quiet,
            barrier: 1e-20,
            fraction_to_boundary: 0.995,
            max_line_search_iters: 10,
            regularization: 1e-8,
            finite_difference_step: 1e-6,
        }
    }
}

impl EquilibriumOptions {
    /// Tight tolerances for reference calculations.
    pub fn strict() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 500,
            ..Self::default()
        }
    }

    /// Loose tolerances and a cheaper Hessian for inner loops that only need
    /// a few significant digits.
    pub fn relaxed() -> Self {
        Self {
            tolerance: 1e-4,
            hessian: HessianStrategy::Approximate,
            max_line_search_iters: 20,
            ..Self::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }

    pub fn with_hessian(mut self, hessian: HessianStrategy) -> Self {
        self.hessian = hessian;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn validate(&self) -> SolverResult<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.tolerance) {
            return Err(invalid("tolerance must be positive and finite"));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1"));
        }
        if !positive(self.barrier) {
            return Err(invalid("barrier must be positive and finite"));
        }
        if !(self.fraction_to_boundary > 0.0 && self.fraction_to_boundary < 1.0) {
            return Err(invalid("fraction_to_boundary must lie in (0, 1)"));
        }
        if !positive(self.regularization) || !positive(self.finite_difference_step) {
            return Err(invalid(
                "regularization and finite_difference_step must be positive",
            ));
        }
        Ok(())
    }
}

fn invalid(what: &str) -> SolverError {
    SolverError::InvalidProblem {
        what: format!("options: {what}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = EquilibriumOptions::default();
        options.validate().unwrap();
        assert_eq!(options.tolerance, 1e-6);
        assert_eq!(options.barrier, 1e-20);
        assert!(options.warm_start);
    }

    #[test]
    fn presets_differ_from_default() {
        let strict = EquilibriumOptions::strict();
        let relaxed = EquilibriumOptions::relaxed();
        assert!(strict.tolerance < EquilibriumOptions::default().tolerance);
        assert!(relaxed.tolerance > EquilibriumOptions::default().tolerance);
        assert_eq!(relaxed.hessian, HessianStrategy::Approximate);
        strict.validate().unwrap();
        relaxed.validate().unwrap();
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(EquilibriumOptions::default().with_tolerance(0.0).validate().is_err());
        let options = EquilibriumOptions {
            fraction_to_boundary: 1.0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
        let options = EquilibriumOptions {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn verbosity_is_ordered() {
        assert!(Verbosity::Iterations > Verbosity::Summary);
        assert!(Verbosity::Summary > Verbosity::Quiet);
    }
}
