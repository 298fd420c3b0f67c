//! Analytic sensitivities against re-solved perturbed problems.

use eq_core::units::{k, pa};
use eq_solver::{
    EquilibriumBackend, EquilibriumOptions, EquilibriumProblem, EquilibriumResult, EquilibriumSolver,
    EquilibriumState, NativeBackend, Partition, SolverError, SolverResult, finite_difference_sensitivity,
};
use eq_thermo::{ChemicalSystem, ChemicalSystemBuilder, GibbsCorrelation, PhaseKind, Species};
use nalgebra::DMatrix;

fn association() -> ChemicalSystem {
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
                .with_gibbs(GibbsCorrelation::EnthalpyEntropy {
                    h0: -40_000.0,
                    s0: -100.0,
                }),
        ],
    );
    b.build().unwrap()
}

/// Pure water, where the charge row is `H - 2·O`.
fn water() -> ChemicalSystem {
    let mut b = ChemicalSystemBuilder::new();
    b.add_phase(
        "aqueous",
        PhaseKind::Aqueous,
        vec![
            Species::new("H2O")
                .with_element("H", 2.0)
                .with_element("O", 1.0)
                .with_gibbs(GibbsCorrelation::Constant(-237_140.0)),
            Species::new("H+").with_element("H", 1.0).with_charge(1.0),
            Species::new("OH-")
                .with_element("O", 1.0)
                .with_element("H", 1.0)
                .with_charge(-1.0)
                .with_gibbs(GibbsCorrelation::Constant(-157_220.0)),
        ],
    );
    b.build().unwrap()
}

/// A backend that only knows how to solve, so sensitivities come from the
/// trait's finite-difference default.
struct SolveOnly<'a> {
    solver: EquilibriumSolver<'a>,
}

impl EquilibriumBackend for SolveOnly<'_> {
    fn name(&self) -> &str {
        "solve-only"
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
        let mut result = self.solver.solve_problem(state, problem, options)?;
        result.factorization = None;
        Ok(result)
    }
}

fn assert_close(analytic: f64, numeric: f64, what: &str) {
    let scale = analytic.abs().max(numeric.abs()).max(1e-8);
    assert!(
        (analytic - numeric).abs() <= 1e-4 * scale,
        "{what}: analytic {analytic:e} vs finite difference {numeric:e}"
    );
}

#[test]
fn analytic_matches_finite_differences() {
    let sys = association();
    let solver = EquilibriumSolver::new(&sys);
    let options = EquilibriumOptions::strict();
    let problem =
        EquilibriumProblem::new(&sys, Partition::for_system(&sys), k(400.0), pa(2e5), &[1.0, 0.6]).unwrap();

    let mut state = EquilibriumState::new(&sys);
    let result = solver.solve_problem(&mut state, &problem, &options).unwrap();
    assert!(result.succeeded);

    let analytic = solver.sensitivity(&result).unwrap();
    let numeric =
        finite_difference_sensitivity(&problem, &state, 1e-5, |s, p| solver.solve_problem(s, p, &options)).unwrap();
    assert!(!analytic.approximate);
    assert!(numeric.approximate);

    for i in 0..3 {
        assert_close(analytic.dnedt[i], numeric.dnedt[i], &format!("dn{i}/dT"));
        assert_close(analytic.dnedp[i], numeric.dnedp[i], &format!("dn{i}/dP"));
        for r in 0..2 {
            assert_close(analytic.dnedbe[(i, r)], numeric.dnedbe[(i, r)], &format!("dn{i}/db{r}"));
        }
    }

    // Association is exothermic: heating shifts it back
    assert!(analytic.dnedt[2] < 0.0);
    // and it reduces the number of moles, so pressure favours it
    assert!(analytic.dnedp[2] > 0.0);
}

#[test]
fn dependent_rows_have_zero_columns() {
    let mut b = ChemicalSystemBuilder::new();
    b.add_phase(
        "gas",
        PhaseKind::IdealGas,
        vec![
            Species::new("NO2")
                .with_element("N", 1.0)
                .with_element("O", 2.0)
                .with_gibbs(GibbsCorrelation::Constant(51_310.0)),
            Species::new("N2O4")
                .with_element("N", 2.0)
                .with_element("O", 4.0)
                .with_gibbs(GibbsCorrelation::Constant(97_890.0)),
        ],
    );
    let sys = b.build().unwrap();
    let solver = EquilibriumSolver::new(&sys);
    let mut state = EquilibriumState::new(&sys);
    let result = solver
        .solve(&mut state, k(298.15), pa(1e5), &[1.0, 2.0], &EquilibriumOptions::strict())
        .unwrap();

    let s = solver.sensitivity(&result).unwrap();
    assert_eq!(result.factorization.as_ref().unwrap().independent_rows(), &[0]);
    assert!(s.dnedbe.column(1).iter().all(|&v| v == 0.0));
    // N is conserved along ∂n/∂b_N
    assert!((s.dnedbe[(0, 0)] + 2.0 * s.dnedbe[(1, 0)] - 1.0).abs() < 1e-10);
}

#[test]
fn failed_result_has_no_sensitivity() {
    let sys = association();
    let solver = EquilibriumSolver::new(&sys);
    let mut state = EquilibriumState::new(&sys);
    let options = EquilibriumOptions {
        max_iterations: 1,
        ..EquilibriumOptions::strict()
    };
    let result = solver.solve(&mut state, k(400.0), pa(1e5), &[1.0, 1.0], &options).unwrap();
    assert!(!result.succeeded);
    assert!(matches!(
        solver.sensitivity(&result),
        Err(SolverError::InvalidState { .. })
    ));
}

#[test]
fn default_backend_sensitivity_handles_charge_row() {
    let sys = water();
    let backend = SolveOnly {
        solver: EquilibriumSolver::new(&sys),
    };
    assert_eq!(sys.num_elements(), 3);
    let problem =
        EquilibriumProblem::new(&sys, Partition::for_system(&sys), k(298.15), pa(1e5), &[111.0, 55.5, 0.0]).unwrap();
    let options = EquilibriumOptions::strict();
    let mut state = EquilibriumState::new(&sys);
    let result = backend.solve(&mut state, &problem, &options).unwrap();
    assert!(result.succeeded);
    assert!(result.factorization.is_none());

    let numeric = backend.sensitivity(&state, &problem, &result, &options).unwrap();
    assert!(numeric.approximate);
    // The charge row is dependent, so its column is zero
    assert!(numeric.dnedbe.column(2).iter().all(|&v| v == 0.0));
    // and H, O are conserved along their own columns
    let a = sys.formula_matrix();
    let kept = a.rows(0, 2) * numeric.dnedbe.columns(0, 2);
    assert!((kept - DMatrix::identity(2, 2)).amax() < 1e-4);

    let native = NativeBackend::new(&sys);
    let mut reference = EquilibriumState::new(&sys);
    let exact = native.solve(&mut reference, &problem, &options).unwrap();
    let analytic = native.sensitivity(&reference, &problem, &exact, &options).unwrap();
    assert!(!analytic.approximate);
    assert!((&analytic.dnedbe - &numeric.dnedbe).amax() < 1e-3);
}

#[test]
fn default_backend_rejects_unconverged_result() {
    let sys = association();
    let backend = SolveOnly {
        solver: EquilibriumSolver::new(&sys),
    };
    let problem =
        EquilibriumProblem::new(&sys, Partition::for_system(&sys), k(400.0), pa(1e5), &[1.0, 1.0]).unwrap();
    let options = EquilibriumOptions {
        max_iterations: 1,
        ..EquilibriumOptions::strict()
    };
    let mut state = EquilibriumState::new(&sys);
    let result = backend.solve(&mut state, &problem, &options).unwrap();
    assert!(!result.succeeded);
    assert!(matches!(
        backend.sensitivity(&state, &problem, &result, &options),
        Err(SolverError::InvalidState { .. })
    ));
}

#[test]
fn finite_differences_converge_to_analytic_as_step_shrinks() {
    let sys = association();
    let solver = EquilibriumSolver::new(&sys);
    let options = EquilibriumOptions::strict();
    let problem =
        EquilibriumProblem::new(&sys, Partition::for_system(&sys), k(400.0), pa(2e5), &[1.0, 0.6]).unwrap();
    let mut state = EquilibriumState::new(&sys);
    let result = solver.solve_problem(&mut state, &problem, &options).unwrap();
    let analytic = solver.sensitivity(&result).unwrap();

    let errors: Vec<f64> = [1e-1, 1e-2, 1e-3]
        .iter()
        .map(|&step| {
            let numeric =
                finite_difference_sensitivity(&problem, &state, step, |s, p| solver.solve_problem(s, p, &options))
                    .unwrap();
            (&analytic.dnedbe - &numeric.dnedbe).amax()
        })
        .collect();
    assert!(errors[1] < errors[0], "errors {errors:?}");
    assert!(errors[2] < errors[1], "errors {errors:?}");
    assert!(errors[2] < 1e-4, "errors {errors:?}");
}
