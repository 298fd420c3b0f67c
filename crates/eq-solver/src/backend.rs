//! Pluggable equilibrium backends.
//!
//! The inverse solver and the kinetic coupling only need what this trait
//! exposes, so a different thermodynamic engine can be dropped in behind it.

use eq_thermo::{ChemicalPotentials, ChemicalSystem};
use nalgebra::{DMatrix, DVector};

use crate::error::{SolverError, SolverResult};
use crate::options::EquilibriumOptions;
use crate::problem::EquilibriumProblem;
use crate::result::EquilibriumResult;
use crate::sensitivity::{EquilibriumSensitivity, finite_difference_sensitivity};
use crate::solver::EquilibriumSolver;
use crate::state::EquilibriumState;

/// An engine able to compute chemical potentials and solve equilibrium
/// problems for one chemical system.
pub trait EquilibriumBackend: Send + Sync {
    fn name(&self) -> &str;

    fn system(&self) -> &ChemicalSystem;

    /// Formula matrix over all species, charge row included.
    fn formula_matrix(&self) -> &DMatrix<f64> {
        self.system().formula_matrix()
    }

    fn chemical_potentials(&self, t: f64, p: f64, n: &[f64]) -> SolverResult<ChemicalPotentials> {
        Ok(self.system().chemical_potentials(t, p, n)?)
    }

    fn standard_volumes(&self, t: f64, p: f64) -> SolverResult<DVector<f64>> {
        Ok(self.system().model().standard_volumes(t, p)?)
    }

    fn solve(
        &self,
        state: &mut EquilibriumState,
        problem: &EquilibriumProblem<'_>,
        options: &EquilibriumOptions,
    ) -> SolverResult<EquilibriumResult>;

    /// Sensitivities at the converged `state` of `problem`.
    ///
    /// Default: finite differences over re-solved perturbed problems. A
    /// result that did not converge is rejected with
    /// [`SolverError::InvalidState`].
    fn sensitivity(
        &self,
        state: &EquilibriumState,
        problem: &EquilibriumProblem<'_>,
        result: &EquilibriumResult,
        options: &EquilibriumOptions,
    ) -> SolverResult<EquilibriumSensitivity> {
        ensure_converged(result)?;
        let warm = options.clone().with_warm_start(true);
        finite_difference_sensitivity(problem, state, options.finite_difference_step, |s, p| {
            self.solve(s, p, &warm)
        })
    }
}

fn ensure_converged(result: &EquilibriumResult) -> SolverResult<()> {
    if result.succeeded {
        Ok(())
    } else {
        Err(SolverError::InvalidState {
            what: "sensitivities require a converged equilibrium result".to_string(),
        })
    }
}

/// The built-in interior-point solver as a backend.
#[derive(Debug, Clone)]
pub struct NativeBackend<'a> {
    solver: EquilibriumSolver<'a>,
}

impl<'a> NativeBackend<'a> {
    pub fn new(system: &'a ChemicalSystem) -> Self {
        Self {
            solver: EquilibriumSolver::new(system),
        }
    }

    pub fn solver(&self) -> &EquilibriumSolver<'a> {
        &self.solver
    }
}

impl EquilibriumBackend for NativeBackend<'_> {
    fn name(&self) -> &str {
        "native"
    }

    fn system(&self) -> &ChemicalSystem {
        self.solver.system()
    }

    fn solve(
        &self,
        state: &mut EquilibriumState,
        problem: &EquilibriumProblem<'_>,
        options: &EquilibriumOptions,
    ) -> SolverResult<EquilibriumResult> {
        self.solver.solve_problem(state, problem, options)
    }

    /// Analytic when the converged result carries a factorization, finite
    /// differences otherwise.
    fn sensitivity(
        &self,
        state: &EquilibriumState,
        problem: &EquilibriumProblem<'_>,
        result: &EquilibriumResult,
        options: &EquilibriumOptions,
    ) -> SolverResult<EquilibriumSensitivity> {
        ensure_converged(result)?;
        if result.factorization.is_some() {
            return self.solver.sensitivity(result);
        }
        let warm = options.clone().with_warm_start(true);
        finite_difference_sensitivity(problem, state, options.finite_difference_step, |s, p| {
            self.solver.solve_problem(s, p, &warm)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eq_core::units::{k, pa};
    use eq_thermo::{ChemicalSystemBuilder, GibbsCorrelation, PhaseKind, Species};

    #[test]
    fn native_backend_solves_and_differentiates() {
        let mut b = ChemicalSystemBuilder::new();
        b.add_phase(
            "gas",
            PhaseKind::IdealGas,
            vec![
                Species::new("H2").with_element("H", 2.0),
                Species::new("H")
                    .with_element("H", 1.0)
                    .with_gibbs(GibbsCorrelation::Constant(20_000.0)),
            ],
        );
        let sys = b.build().unwrap();
        let backend = NativeBackend::new(&sys);
        assert_eq!(backend.name(), "native");
        assert_eq!(backend.formula_matrix().shape(), (1, 2));

        let problem = EquilibriumProblem::new(
            &sys,
            backend.solver().partition().clone(),
            k(1000.0),
            pa(1e5),
            &[2.0],
        )
        .unwrap();
        let options = EquilibriumOptions::default().with_tolerance(1e-11);
        let mut state = EquilibriumState::new(&sys);
        let result = backend.solve(&mut state, &problem, &options).unwrap();
        assert!(result.succeeded);

        let analytic = backend.sensitivity(&state, &problem, &result, &options).unwrap();
        let numeric = finite_difference_sensitivity(&problem, &state, 1e-6, |s, p| {
            backend.solve(s, p, &options)
        })
        .unwrap();
        assert!(numeric.approximate);
        for i in 0..2 {
            let scale = analytic.dnedbe[(i, 0)].abs().max(1e-6);
            assert!((analytic.dnedbe[(i, 0)] - numeric.dnedbe[(i, 0)]).abs() < 1e-3 * scale);
        }
    }

    #[test]
    fn unconverged_result_has_no_sensitivity() {
        let mut b = ChemicalSystemBuilder::new();
        b.add_phase(
            "gas",
            PhaseKind::IdealGas,
            vec![
                Species::new("A").with_element("A", 1.0),
                Species::new("B").with_element("B", 1.0),
                Species::new("AB")
                    .with_element("A", 1.0)
                    .with_element("B", 1.0)
                    .with_gibbs(GibbsCorrelation::Constant(-5_000.0)),
            ],
        );
        let sys = b.build().unwrap();
        let backend = NativeBackend::new(&sys);
        let problem = EquilibriumProblem::new(
            &sys,
            backend.solver().partition().clone(),
            k(300.0),
            pa(1e5),
            &[1.0, 0.5],
        )
        .unwrap();
        let options = EquilibriumOptions {
            max_iterations: 1,
            ..EquilibriumOptions::default()
        };
        let mut state = EquilibriumState::new(&sys);
        let result = backend.solve(&mut state, &problem, &options).unwrap();
        assert!(!result.succeeded);

        let err = backend.sensitivity(&state, &problem, &result, &options).unwrap_err();
        assert!(matches!(err, SolverError::InvalidState { .. }));
    }
}
