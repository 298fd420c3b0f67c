//! Gibbs-energy minimizer: primal-dual interior-point Newton on the
//! perturbed KKT conditions
//!
//! ```text
//! g(n) - Aᵀλ - z = 0
//! A n - b        = 0
//! n∘z            = μ_b
//! ```
//!
//! with `g = μ/RT`. See [`kkt`](crate::kkt) for the linear systems.

use std::sync::Arc;

use eq_core::constants::R;
use eq_core::units::{Pressure, Temperature};
use eq_core::{AccumulatingTimer, Timer};
use eq_thermo::ChemicalSystem;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace, warn};

use crate::balance::{ReductionOutcome, reduce};
use crate::error::{SolverError, SolverResult};
use crate::initialization::{StartingPoint, starting_point};
use crate::jacobian::forward_difference_jacobian;
use crate::kkt::{KktFactorization, KktResidual, KktSnapshot};
use crate::options::{EquilibriumOptions, HessianStrategy, Verbosity};
use crate::partition::Partition;
use crate::problem::EquilibriumProblem;
use crate::result::{EquilibriumResult, SolveFailure, SolveTiming};
use crate::sensitivity::{EquilibriumSensitivity, analytic_sensitivity};
use crate::state::EquilibriumState;

/// Equilibrium solver for one chemical system.
///
/// Holds no state between calls: the warm-start channel is the
/// [`EquilibriumState`], and the final factorization travels inside the
/// returned [`EquilibriumResult`].
#[derive(Debug, Clone)]
pub struct EquilibriumSolver<'a> {
    system: &'a ChemicalSystem,
    partition: Partition,
}

impl<'a> EquilibriumSolver<'a> {
    /// Solver with every species in equilibrium.
    pub fn new(system: &'a ChemicalSystem) -> Self {
        Self {
            system,
            partition: Partition::for_system(system),
        }
    }

    pub fn with_partition(system: &'a ChemicalSystem, partition: Partition) -> SolverResult<Self> {
        partition.check_system(system)?;
        Ok(Self { system, partition })
    }

    pub fn set_partition(&mut self, partition: Partition) -> SolverResult<()> {
        partition.check_system(self.system)?;
        self.partition = partition;
        Ok(())
    }

    pub fn system(&self) -> &'a ChemicalSystem {
        self.system
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Minimize the Gibbs energy of the equilibrium species at (T, P) subject
    /// to `Ae·ne = be`.
    ///
    /// `be` is indexed like [`Partition::indices_equilibrium_elements`].
    /// Kinetic and inert amounts in `state` are left untouched. Numerical
    /// failures are reported in the result; `Err` means malformed input.
    pub fn solve(
        &self,
        state: &mut EquilibriumState,
        t: Temperature,
        p: Pressure,
        be: &[f64],
        options: &EquilibriumOptions,
    ) -> SolverResult<EquilibriumResult> {
        minimize(
            self.system,
            &self.partition,
            state,
            t.value,
            p.value,
            &DVector::from_column_slice(be),
            options,
        )
    }

    /// Solve a validated problem, using the problem's partition.
    pub fn solve_problem(
        &self,
        state: &mut EquilibriumState,
        problem: &EquilibriumProblem<'_>,
        options: &EquilibriumOptions,
    ) -> SolverResult<EquilibriumResult> {
        if !std::ptr::eq(problem.system(), self.system) {
            return Err(SolverError::InvalidProblem {
                what: "problem refers to a different chemical system".to_string(),
            });
        }
        minimize(
            self.system,
            problem.partition(),
            state,
            problem.temperature_value(),
            problem.pressure_value(),
            problem.element_amounts(),
            options,
        )
    }

    /// Sensitivity of a converged result by the implicit function theorem.
    pub fn sensitivity(&self, result: &EquilibriumResult) -> SolverResult<EquilibriumSensitivity> {
        analytic_sensitivity(self.system, result)
    }
}

/// Per-call evaluation context over the reduced species.
struct Workspace<'s> {
    system: &'s ChemicalSystem,
    t: f64,
    p: f64,
    rt: f64,
    /// System indices of the reduced species.
    species: Vec<usize>,
    /// Full amount vector; reduced entries are overwritten on every scatter.
    n_full: DVector<f64>,
    /// Whether each reduced species shares its phase with other species.
    in_mixture: Vec<bool>,
    fd_step: f64,
    evaluations: AccumulatingTimer,
}

/// `g = μ/RT` over the reduced species, plus `∂g/∂n` when the model has it.
struct Evaluation {
    g: DVector<f64>,
    ddn: Option<DMatrix<f64>>,
}

impl<'s> Workspace<'s> {
    fn scatter(&self, n: &DVector<f64>) -> DVector<f64> {
        let mut full = self.n_full.clone();
        for (k, &i) in self.species.iter().enumerate() {
            full[i] = n[k];
        }
        full
    }

    fn evaluate(&self, n: &DVector<f64>) -> SolverResult<Evaluation> {
        let full = self.scatter(n);
        let mu = self
            .evaluations
            .measure(|| self.system.model().evaluate(self.t, self.p, full.as_slice()))?;
        let ns = self.species.len();
        let g = DVector::from_iterator(ns, self.species.iter().map(|&i| mu.values[i] / self.rt));
        let ddn = mu.ddn.map(|m| {
            DMatrix::from_fn(ns, ns, |i, j| m[(self.species[i], self.species[j])] / self.rt)
        });
        Ok(Evaluation { g, ddn })
    }

    fn hessian(
        &self,
        n: &DVector<f64>,
        eval: &Evaluation,
        strategy: HessianStrategy,
    ) -> SolverResult<DMatrix<f64>> {
        match strategy {
            HessianStrategy::Approximate => Ok(DMatrix::from_diagonal(&DVector::from_iterator(
                n.len(),
                n.iter()
                    .zip(&self.in_mixture)
                    .map(|(&v, &mixed)| if mixed { 1.0 / v } else { 0.0 }),
            ))),
            HessianStrategy::Exact => match &eval.ddn {
                Some(h) => Ok(h.clone()),
                None => forward_difference_jacobian(
                    n,
                    Some(&eval.g),
                    |x| Ok(self.evaluate(x)?.g),
                    self.fd_step,
                ),
            },
        }
    }
}

/// Factorize and solve one Newton system, retrying once with regularization.
///
/// Returns `(dn, dλ, factorization)` or `None` when both attempts fail.
fn newton_step(
    h: &DMatrix<f64>,
    z: &DVector<f64>,
    n: &DVector<f64>,
    a: &DMatrix<f64>,
    r1: &DVector<f64>,
    r2: &DVector<f64>,
    regularization: f64,
) -> Option<(DVector<f64>, DVector<f64>, KktFactorization)> {
    for delta in [0.0, regularization] {
        if let Some(kkt) = KktFactorization::factorize(h, z, n, a, delta) {
            if let Some((dn, dl)) = kkt.solve(r1, r2) {
                return Some((dn, dl, kkt));
            }
        }
        if delta == 0.0 {
            warn!(delta = regularization, "KKT system singular, retrying with regularization");
        }
    }
    None
}

/// Largest `α ∈ (0, 1]` keeping `x + α dx` strictly positive, scaled by τ.
fn step_to_boundary(x: &DVector<f64>, dx: &DVector<f64>, tau: f64) -> f64 {
    let mut alpha_max = f64::INFINITY;
    for (xi, dxi) in x.iter().zip(dx.iter()) {
        if *dxi < 0.0 {
            alpha_max = alpha_max.min(-xi / dxi);
        }
    }
    (tau * alpha_max).min(1.0)
}

pub(crate) fn minimize(
    system: &ChemicalSystem,
    partition: &Partition,
    state: &mut EquilibriumState,
    t: f64,
    p: f64,
    be: &DVector<f64>,
    options: &EquilibriumOptions,
) -> SolverResult<EquilibriumResult> {
    let total = Timer::start("equilibrium");
    options.validate()?;
    partition.check_system(system)?;
    state.check_system(system)?;
    if !t.is_finite() || t <= 0.0 || !p.is_finite() || p <= 0.0 {
        return Err(SolverError::InvalidProblem {
            what: format!("temperature and pressure must be positive, got T = {t} K, P = {p} Pa"),
        });
    }

    let eq_species = partition.indices_equilibrium_species();
    let eq_elements = partition.indices_equilibrium_elements(system);
    if be.len() != eq_elements.len() {
        return Err(SolverError::InvalidProblem {
            what: format!(
                "element budget has {} entries but {} elements are active",
                be.len(),
                eq_elements.len()
            ),
        });
    }
    if be.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::InvalidProblem {
            what: "element budget must be finite".to_string(),
        });
    }

    let ae = partition.formula_matrix_equilibrium(system);
    let reduction = match reduce(&ae, be) {
        ReductionOutcome::Reduced(r) => r,
        ReductionOutcome::Infeasible(what) => {
            if options.verbosity >= Verbosity::Summary {
                debug!(reason = %what, "equilibrium problem infeasible");
            }
            let mut result = EquilibriumResult::failed(SolveFailure::Infeasible { what });
            result.timing.total = total.stop();
            return Ok(result);
        }
    };

    let rt = R * t;
    let species: Vec<usize> = reduction.species.iter().map(|&k| eq_species[k]).collect();
    let mut n_full = state.n.clone();
    for &k in &reduction.eliminated_species {
        n_full[eq_species[k]] = 0.0;
    }

    let ws = Workspace {
        system,
        t,
        p,
        rt,
        in_mixture: species
            .iter()
            .map(|&i| system.phases()[system.phase_of_species(i)].num_species() > 1)
            .collect(),
        species,
        n_full,
        fd_step: options.finite_difference_step,
        evaluations: AccumulatingTimer::new(),
    };
    let linear = AccumulatingTimer::new();
    let a = &reduction.a;
    let b = &reduction.b;
    let mu_b = options.barrier;
    let ns = ws.species.len();

    if ns == 0 {
        let empty = DVector::zeros(0);
        write_back(state, &ws, &eq_species, &eq_elements, &reduction.rows, &empty, &empty, &empty);
        return Ok(EquilibriumResult {
            succeeded: true,
            eliminated_elements: reduction.eliminated_rows,
            timing: SolveTiming {
                total: total.stop(),
                ..SolveTiming::default()
            },
            ..EquilibriumResult::default()
        });
    }

    let guess = DVector::from_iterator(ns, ws.species.iter().map(|&i| state.n[i]));
    let (mut n, start) = starting_point(a, b, &guess, options.warm_start, options.tolerance);
    let warm = start == StartingPoint::WarmStart;

    let stored_z = DVector::from_iterator(ns, ws.species.iter().map(|&i| state.species_potentials[i] / rt));
    let mut z = if warm && stored_z.iter().all(|&v| v > 0.0) {
        stored_z
    } else {
        n.map(|v| mu_b / v)
    };

    let mut eval = ws.evaluate(&n)?;
    let mut lambda = if warm {
        DVector::from_iterator(
            reduction.rows.len(),
            reduction
                .rows
                .iter()
                .map(|&r| state.element_potentials[eq_elements[r]] / rt),
        )
    } else {
        let aat = a * a.transpose();
        aat.lu()
            .solve(&(a * (&eval.g - &z)))
            .unwrap_or_else(|| DVector::zeros(a.nrows()))
    };

    let mut residual = KktResidual::evaluate(&eval.g, a, b, &n, &lambda, &z, mu_b);
    let mut iterations = 0;
    let mut converged = false;
    let mut regularized = false;
    let mut failure = None;

    for iteration in 1..=options.max_iterations {
        iterations = iteration;
        if options.verbosity >= Verbosity::Iterations {
            let r = residual.norms();
            trace!(
                iteration,
                stationarity = r.stationarity,
                feasibility = r.feasibility,
                complementarity = r.complementarity,
                "interior-point iteration"
            );
        }
        if residual.converged(options.tolerance) {
            converged = true;
            break;
        }

        let h = ws.hessian(&n, &eval, options.hessian)?;
        let r1 = -(&eval.g - a.tr_mul(&lambda) - n.map(|v| mu_b / v));
        let r2 = -(a * &n - b);
        let Some((dn, dl, kkt)) =
            linear.measure(|| newton_step(&h, &z, &n, a, &r1, &r2, options.regularization))
        else {
            failure = Some(SolveFailure::NumericalSingularity);
            break;
        };
        regularized |= kkt.regularization() > 0.0;

        let dz = n.zip_zip_map(&z, &dn, |ni, zi, dni| mu_b / ni - zi - zi * dni / ni);
        let alpha_p = step_to_boundary(&n, &dn, options.fraction_to_boundary);
        let alpha_d = step_to_boundary(&z, &dz, options.fraction_to_boundary);

        let merit = residual.merit();
        let mut alpha = alpha_p;
        let mut accepted = None;
        for _ in 0..=options.max_line_search_iters {
            let trial = trial_point(
                &ws,
                a,
                b,
                (&n, &lambda, &z),
                (&dn, &dl, &dz),
                alpha,
                alpha_d * alpha / alpha_p,
                mu_b,
            )?;
            if trial.3.merit() < merit {
                accepted = Some(trial);
                break;
            }
            alpha *= 0.5;
        }
        let (n_new, lambda_new, z_new, residual_new, eval_new) = match accepted {
            Some(trial) => trial,
            None => {
                // Non-monotone fallback: take the full boundary-limited step
                if options.verbosity >= Verbosity::Iterations {
                    trace!(iteration, "line search failed, taking full step");
                }
                trial_point(&ws, a, b, (&n, &lambda, &z), (&dn, &dl, &dz), alpha_p, alpha_d, mu_b)?
            }
        };
        n = n_new;
        lambda = lambda_new;
        z = z_new;
        residual = residual_new;
        eval = eval_new;
    }

    if !converged && failure.is_none() {
        failure = Some(SolveFailure::NonConvergence);
    }

    let factorization = if converged {
        let h = ws.hessian(&n, &eval, HessianStrategy::Exact)?;
        let snapshot = [0.0, options.regularization]
            .into_iter()
            .find_map(|delta| linear.measure(|| KktFactorization::factorize(&h, &z, &n, a, delta)));
        if snapshot.is_none() {
            warn!("final KKT matrix singular, sensitivities unavailable");
        }
        snapshot.map(|factorization| {
            Arc::new(KktSnapshot {
                factorization,
                temperature: t,
                pressure: p,
                n_full: ws.scatter(&n),
                species: ws.species.clone(),
                species_positions: reduction.species.clone(),
                rows: reduction.rows.clone(),
                num_equilibrium_species: eq_species.len(),
                num_equilibrium_elements: eq_elements.len(),
                finite_difference_step: options.finite_difference_step,
            })
        })
    } else {
        None
    };

    write_back(state, &ws, &eq_species, &eq_elements, &reduction.rows, &n, &lambda, &z);

    let result = EquilibriumResult {
        succeeded: converged,
        failure,
        iterations,
        residuals: residual.norms(),
        timing: SolveTiming {
            total: total.stop(),
            evaluations: ws.evaluations.total_seconds(),
            linear_systems: linear.total_seconds(),
        },
        regularized,
        eliminated_elements: reduction.eliminated_rows,
        factorization,
    };

    if options.verbosity >= Verbosity::Summary {
        debug!(
            succeeded = result.succeeded,
            iterations = result.iterations,
            start = start.as_str(),
            stationarity = result.residuals.stationarity,
            feasibility = result.residuals.feasibility,
            regularized = result.regularized,
            "equilibrium solve finished"
        );
    }
    Ok(result)
}

type Trial = (DVector<f64>, DVector<f64>, DVector<f64>, KktResidual, Evaluation);
type Iterate<'v> = (&'v DVector<f64>, &'v DVector<f64>, &'v DVector<f64>);

/// Evaluate `(n, λ, z) + α·(dn, dλ, dz)`, with `α_d` applied to `z`.
#[allow(clippy::too_many_arguments)]
fn trial_point(
    ws: &Workspace<'_>,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    (n, lambda, z): Iterate<'_>,
    (dn, dl, dz): Iterate<'_>,
    alpha_p: f64,
    alpha_d: f64,
    mu_b: f64,
) -> SolverResult<Trial> {
    let n_t = n + dn * alpha_p;
    let l_t = lambda + dl * alpha_p;
    let z_t = z + dz * alpha_d;
    let eval = ws.evaluate(&n_t)?;
    let residual = KktResidual::evaluate(&eval.g, a, b, &n_t, &l_t, &z_t, mu_b);
    Ok((n_t, l_t, z_t, residual, eval))
}

/// Store amounts and potentials of the equilibrium species in the state.
#[allow(clippy::too_many_arguments)]
fn write_back(
    state: &mut EquilibriumState,
    ws: &Workspace<'_>,
    eq_species: &[usize],
    eq_elements: &[usize],
    rows: &[usize],
    n: &DVector<f64>,
    lambda: &DVector<f64>,
    z: &DVector<f64>,
) {
    state.temperature = ws.t;
    state.pressure = ws.p;
    state.n = ws.scatter(n);
    for &i in eq_species {
        state.species_potentials[i] = 0.0;
    }
    for (k, &i) in ws.species.iter().enumerate() {
        state.species_potentials[i] = z[k] * ws.rt;
    }
    for &e in eq_elements {
        state.element_potentials[e] = 0.0;
    }
    for (k, &r) in rows.iter().enumerate() {
        state.element_potentials[eq_elements[r]] = lambda[k] * ws.rt;
    }
}
