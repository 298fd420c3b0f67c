//! Derivatives of the equilibrium amounts with respect to T, P, and `be`.
//!
//! At a converged point the KKT conditions define `ne(T, P, be)` implicitly.
//! Differentiating them gives linear systems with the same matrix as the
//! final Newton step, so every derivative costs one back-substitution with
//! the stored factorization.

use eq_core::constants::R;
use eq_core::units::{k, pa};
use eq_thermo::ChemicalSystem;
use nalgebra::{DMatrix, DVector};

use crate::balance::{ReductionOutcome, least_norm_solution, reduce};
use crate::error::{SolverError, SolverResult};
use crate::jacobian::{central_difference_derivative, perturbation};
use crate::kkt::KktSnapshot;
use crate::problem::EquilibriumProblem;
use crate::result::EquilibriumResult;
use crate::state::EquilibriumState;

/// Partial derivatives of the equilibrium species amounts.
///
/// Rows follow [`Partition::indices_equilibrium_species`](crate::Partition::indices_equilibrium_species),
/// columns of `dnedbe` follow the rows of `be`.
#[derive(Debug, Clone, PartialEq)]
pub struct EquilibriumSensitivity {
    /// ∂ne/∂T [mol/K]
    pub dnedt: DVector<f64>,
    /// ∂ne/∂P [mol/Pa]
    pub dnedp: DVector<f64>,
    /// ∂ne/∂be [mol/mol]
    pub dnedbe: DMatrix<f64>,
    /// True when computed by re-solving perturbed problems.
    pub approximate: bool,
}

/// Implicit-function sensitivities from the factorization of a converged
/// result.
///
/// Columns of `be` rows that were eliminated or found linearly dependent are
/// zero: perturbing only such a row leaves the balance inconsistent.
pub(crate) fn analytic_sensitivity(
    system: &ChemicalSystem,
    result: &EquilibriumResult,
) -> SolverResult<EquilibriumSensitivity> {
    if !result.succeeded {
        return Err(SolverError::InvalidState {
            what: "sensitivities require a converged equilibrium result".to_string(),
        });
    }
    let snapshot = result
        .factorization
        .as_deref()
        .ok_or_else(|| SolverError::InvalidState {
            what: "result carries no KKT factorization".to_string(),
        })?;
    from_snapshot(system, snapshot)
}

fn from_snapshot(system: &ChemicalSystem, snap: &KktSnapshot) -> SolverResult<EquilibriumSensitivity> {
    let kkt = &snap.factorization;
    let ns = kkt.num_species();
    let m = kkt.num_constraints();
    let (t, p) = (snap.temperature, snap.pressure);
    let rt = R * t;
    let model = system.model();
    let n_full = snap.n_full.as_slice();

    let mu = model.evaluate(t, p, n_full)?;
    let mu_t = match mu.ddt {
        Some(d) => d,
        None => central_difference_derivative(
            t,
            |tt| Ok(model.evaluate(tt, p, n_full)?.values),
            snap.finite_difference_step,
        )?,
    };
    let mu_p = match mu.ddp {
        Some(d) => d,
        None => central_difference_derivative(
            p,
            |pp| Ok(model.evaluate(t, pp, n_full)?.values),
            snap.finite_difference_step,
        )?,
    };

    // g = μ/RT, so ∂g/∂T = μ_T/RT - μ/(RT²)
    let g_t = DVector::from_iterator(
        ns,
        snap.species.iter().map(|&i| mu_t[i] / rt - mu.values[i] / (rt * t)),
    );
    let g_p = DVector::from_iterator(ns, snap.species.iter().map(|&i| mu_p[i] / rt));

    let back_substitute = |r1: &DVector<f64>, r2: &DVector<f64>| -> SolverResult<DVector<f64>> {
        let (dn, _) = kkt.solve(r1, r2).ok_or_else(|| SolverError::Numeric {
            what: "non-finite sensitivity".to_string(),
        })?;
        let mut full = DVector::zeros(snap.num_equilibrium_species);
        for (k, &pos) in snap.species_positions.iter().enumerate() {
            full[pos] = dn[k];
        }
        Ok(full)
    };

    let zeros_n = DVector::zeros(ns);
    let zeros_m = DVector::zeros(m);
    let dnedt = back_substitute(&(-g_t), &zeros_m)?;
    let dnedp = back_substitute(&(-g_p), &zeros_m)?;

    let mut dnedbe = DMatrix::zeros(snap.num_equilibrium_species, snap.num_equilibrium_elements);
    for (k, &row) in snap.rows.iter().enumerate() {
        let mut unit = DVector::zeros(m);
        unit[k] = 1.0;
        dnedbe.set_column(row, &back_substitute(&zeros_n, &unit)?);
    }

    Ok(EquilibriumSensitivity {
        dnedt,
        dnedp,
        dnedbe,
        approximate: false,
    })
}

/// Sensitivities by re-solving perturbed problems from a copy of `state`.
///
/// `state` must hold the converged solution of `problem`. Perturbations are
/// central where the perturbed problem can be solved and forward otherwise
/// (for example a zero budget, which cannot be decreased).
///
/// Budgets are perturbed along the independent rows kept by the balance
/// reduction, moving linearly dependent rows with them so the perturbed
/// balance stays consistent. Columns of dependent or eliminated rows are
/// zero, as in the analytic path.
pub fn finite_difference_sensitivity<'a, F>(
    problem: &EquilibriumProblem<'a>,
    state: &EquilibriumState,
    step: f64,
    mut solve: F,
) -> SolverResult<EquilibriumSensitivity>
where
    F: FnMut(&mut EquilibriumState, &EquilibriumProblem<'a>) -> SolverResult<EquilibriumResult>,
{
    let species = problem.partition().indices_equilibrium_species();
    let base = DVector::from_iterator(species.len(), species.iter().map(|&i| state.n[i]));

    let be = problem.element_amounts();
    let ae = problem.formula_matrix_equilibrium();
    let reduction = match reduce(&ae, be) {
        ReductionOutcome::Reduced(r) => r,
        ReductionOutcome::Infeasible(what) => return Err(SolverError::Failed { what }),
    };
    let kept = DMatrix::from_fn(ae.nrows(), reduction.species.len(), |i, j| ae[(i, reduction.species[j])]);

    let mut amounts = |perturbed: &EquilibriumProblem<'a>| -> SolverResult<DVector<f64>> {
        let mut trial = state.clone();
        let result = solve(&mut trial, perturbed)?;
        if !result.succeeded {
            return Err(SolverError::Failed {
                what: result
                    .failure_message()
                    .unwrap_or_else(|| "perturbed solve failed".to_string()),
            });
        }
        Ok(DVector::from_iterator(species.len(), species.iter().map(|&i| trial.n[i])))
    };

    let mut derivative = |x: f64,
                          build: &dyn Fn(f64) -> SolverResult<EquilibriumProblem<'a>>|
     -> SolverResult<DVector<f64>> {
        let h = perturbation(x, step);
        let upper = amounts(&build(x + h)?)?;
        match build(x - h).and_then(|lower| amounts(&lower)) {
            Ok(lower) => Ok((upper - lower) / (2.0 * h)),
            Err(_) => Ok((upper - &base) / h),
        }
    };

    let t = problem.temperature_value();
    let p = problem.pressure_value();
    let dnedt = derivative(t, &|v| problem.with_temperature(k(v)))?;
    let dnedp = derivative(p, &|v| problem.with_pressure(pa(v)))?;

    let mut dnedbe = DMatrix::zeros(species.len(), be.len());
    for (position, &r) in reduction.rows.iter().enumerate() {
        let mut unit = DVector::zeros(reduction.rows.len());
        unit[position] = 1.0;
        let direction = least_norm_solution(&reduction.a, &unit)
            .map(|d| &kept * d)
            .ok_or_else(|| SolverError::Numeric {
                what: "singular reduced element balance".to_string(),
            })?;
        let column = derivative(be[r], &|v| {
            let shifted = be + &direction * (v - be[r]);
            problem.with_element_amounts(shifted.as_slice())
        })?;
        dnedbe.set_column(r, &column);
    }

    Ok(EquilibriumSensitivity {
        dnedt,
        dnedp,
        dnedbe,
        approximate: true,
    })
}
