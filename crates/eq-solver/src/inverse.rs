//! Inverse equilibrium: find titrant amounts such that the equilibrium state
//! meets a set of targets (pH, activities, amounts, volumes).
//!
//! The unknowns `x` are titrant amounts. Each evaluation solves the forward
//! problem with `be = be₀ + C·x`, where column `j` of `C` is the element
//! composition of titrant `j`. The outer iteration is Newton on the target
//! residuals `F(x)`, with Jacobian
//!
//! ```text
//! ∂F/∂x = ∂F/∂n · ∂ne/∂be · C
//! ```
//!
//! taken from equilibrium sensitivities, or from finite differences when
//! those are unavailable.

use eq_thermo::ChemicalSystem;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace, warn};

use crate::backend::EquilibriumBackend;
use crate::error::{SolverError, SolverResult};
use crate::jacobian::perturbation;
use crate::options::EquilibriumOptions;
use crate::problem::EquilibriumProblem;
use crate::result::EquilibriumResult;
use crate::state::EquilibriumState;
use crate::targets::TargetProperty;

/// A substance whose added amount is an unknown of the inverse problem.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Titrant {
    name: String,
    /// `(element index, coefficient)` pairs over the system elements.
    formula: Vec<(usize, f64)>,
}

impl Titrant {
    /// Titrant with the composition (charge included) of a system species.
    pub fn from_species(system: &ChemicalSystem, name: &str) -> SolverResult<Self> {
        let j = system.index_species(name)?;
        let column = system.formula_matrix().column(j);
        Ok(Self {
            name: name.to_string(),
            formula: column
                .iter()
                .enumerate()
                .filter(|&(_, &c)| c != 0.0)
                .map(|(e, &c)| (e, c))
                .collect(),
        })
    }

    /// Titrant from an element formula such as `[("Na", 1.0), ("O", 1.0), ("H", 1.0)]`.
    pub fn from_formula(system: &ChemicalSystem, name: &str, formula: &[(&str, f64)]) -> SolverResult<Self> {
        let mut composition: Vec<(usize, f64)> = Vec::with_capacity(formula.len());
        for &(element, coefficient) in formula {
            let e = system.index_element(element)?;
            match composition.iter_mut().find(|(i, _)| *i == e) {
                Some((_, c)) => *c += coefficient,
                None => composition.push((e, coefficient)),
            }
        }
        composition.retain(|&(_, c)| c != 0.0);
        if composition.is_empty() {
            return Err(SolverError::InvalidProblem {
                what: format!("titrant {name} has an empty formula"),
            });
        }
        Ok(Self {
            name: name.to_string(),
            formula: composition,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formula(&self) -> &[(usize, f64)] {
        &self.formula
    }
}

/// Forward problem plus titrants and targets.
#[derive(Debug, Clone)]
pub struct EquilibriumInverseProblem<'a> {
    base: EquilibriumProblem<'a>,
    titrants: Vec<Titrant>,
    targets: Vec<TargetProperty>,
    initial_guess: Option<DVector<f64>>,
}

impl<'a> EquilibriumInverseProblem<'a> {
    /// `base` fixes T, P and the background element amounts `be₀`.
    pub fn new(base: EquilibriumProblem<'a>) -> Self {
        Self {
            base,
            titrants: Vec::new(),
            targets: Vec::new(),
            initial_guess: None,
        }
    }

    pub fn base(&self) -> &EquilibriumProblem<'a> {
        &self.base
    }

    pub fn titrants(&self) -> &[Titrant] {
        &self.titrants
    }

    pub fn targets(&self) -> &[TargetProperty] {
        &self.targets
    }

    pub fn add_titrant(&mut self, titrant: Titrant) -> &mut Self {
        self.titrants.push(titrant);
        self
    }

    /// Add a titrant with the composition of a system species.
    pub fn add_titrant_species(&mut self, name: &str) -> SolverResult<&mut Self> {
        let titrant = Titrant::from_species(self.base.system(), name)?;
        Ok(self.add_titrant(titrant))
    }

    pub fn add_target(&mut self, target: TargetProperty) -> &mut Self {
        self.targets.push(target);
        self
    }

    pub fn fix_species_amount(&mut self, name: &str, amount: f64) -> SolverResult<&mut Self> {
        let target = TargetProperty::species_amount(self.base.system(), name, amount)?;
        Ok(self.add_target(target))
    }

    pub fn fix_species_activity(&mut self, name: &str, activity: f64) -> SolverResult<&mut Self> {
        let target = TargetProperty::species_activity(self.base.system(), name, activity)?;
        Ok(self.add_target(target))
    }

    pub fn fix_ph(&mut self, ph: f64) -> SolverResult<&mut Self> {
        let target = TargetProperty::ph(self.base.system(), ph)?;
        Ok(self.add_target(target))
    }

    pub fn fix_phase_amount(&mut self, name: &str, amount: f64) -> SolverResult<&mut Self> {
        let target = TargetProperty::phase_amount(self.base.system(), name, amount)?;
        Ok(self.add_target(target))
    }

    pub fn fix_phase_volume(&mut self, name: &str, volume: f64) -> SolverResult<&mut Self> {
        let target = TargetProperty::phase_volume(self.base.system(), name, volume)?;
        Ok(self.add_target(target))
    }

    /// Initial titrant amounts; zero when unset.
    pub fn set_initial_guess(&mut self, amounts: &[f64]) -> &mut Self {
        self.initial_guess = Some(DVector::from_column_slice(amounts));
        self
    }

    fn validate(&self) -> SolverResult<()> {
        if self.titrants.is_empty() || self.titrants.len() != self.targets.len() {
            return Err(SolverError::InvalidProblem {
                what: format!(
                    "inverse problem needs as many titrants as targets (at least one), got {} and {}",
                    self.titrants.len(),
                    self.targets.len()
                ),
            });
        }
        if let Some(guess) = &self.initial_guess {
            if guess.len() != self.titrants.len() || guess.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::InvalidProblem {
                    what: "initial guess must hold one finite amount per titrant".to_string(),
                });
            }
        }
        Ok(())
    }

    /// `C`: element composition of each titrant over the rows of `be`.
    pub fn titrant_matrix(&self) -> SolverResult<DMatrix<f64>> {
        let rows = self.base.element_indices();
        let system = self.base.system();
        let mut c = DMatrix::zeros(rows.len(), self.titrants.len());
        for (j, titrant) in self.titrants.iter().enumerate() {
            for &(e, coefficient) in &titrant.formula {
                let r = rows.iter().position(|&i| i == e).ok_or_else(|| SolverError::InvalidProblem {
                    what: format!(
                        "titrant {} contains element {}, which no equilibrium species carries",
                        titrant.name,
                        system.elements()[e]
                    ),
                })?;
                c[(r, j)] = coefficient;
            }
        }
        Ok(c)
    }
}

/// How the outer Jacobian is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InverseJacobian {
    /// Chain rule through equilibrium sensitivities.
    #[default]
    Sensitivity,
    /// One extra equilibrium solve per titrant.
    FiniteDifference,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InverseOptions {
    /// Convergence threshold on `‖F‖∞`.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub jacobian: InverseJacobian,
    /// Relative step of finite-difference Jacobians.
    pub fd_step: f64,
    /// Step halvings before an outer iteration gives up.
    pub max_halvings: usize,
    /// Options of every inner equilibrium solve.
    pub equilibrium: EquilibriumOptions,
}

impl Default for InverseOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
            jacobian: InverseJacobian::Sensitivity,
            fd_step: 1e-6,
            max_halvings: 20,
            equilibrium: EquilibriumOptions::default(),
        }
    }
}

impl InverseOptions {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_jacobian(mut self, jacobian: InverseJacobian) -> Self {
        self.jacobian = jacobian;
        self
    }

    pub fn with_equilibrium(mut self, equilibrium: EquilibriumOptions) -> Self {
        self.equilibrium = equilibrium;
        self
    }

    pub fn validate(&self) -> SolverResult<()> {
        if !(self.tolerance > 0.0 && self.fd_step > 0.0) || self.max_iterations == 0 {
            return Err(SolverError::InvalidProblem {
                what: "inverse tolerance, step and iteration limit must be positive".to_string(),
            });
        }
        self.equilibrium.validate()
    }
}

/// Outcome of an inverse solve.
#[derive(Debug, Clone)]
pub struct InverseResult {
    pub succeeded: bool,
    /// Outer Newton steps taken.
    pub iterations: usize,
    /// Interior-point iterations summed over all inner solves.
    pub inner_iterations: usize,
    pub titrant_amounts: DVector<f64>,
    pub target_residuals: DVector<f64>,
    /// Target with the largest residual when the solve failed.
    pub failed_target: Option<usize>,
    /// Result of the last accepted inner solve.
    pub equilibrium: EquilibriumResult,
}

/// One converged forward solve at titrant amounts `x`.
struct Evaluation<'a> {
    x: DVector<f64>,
    state: EquilibriumState,
    problem: EquilibriumProblem<'a>,
    result: EquilibriumResult,
    residuals: DVector<f64>,
}

impl Evaluation<'_> {
    fn norm(&self) -> f64 {
        self.residuals.amax()
    }
}

/// Newton solver for [`EquilibriumInverseProblem`]s over any backend.
pub struct InverseSolver<'b> {
    backend: &'b dyn EquilibriumBackend,
    options: InverseOptions,
}

impl<'b> InverseSolver<'b> {
    pub fn new(backend: &'b dyn EquilibriumBackend, options: InverseOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &InverseOptions {
        &self.options
    }

    /// Solve from `state` (used as the warm start) and leave the last
    /// accepted equilibrium state in it.
    pub fn solve<'a>(
        &self,
        state: &mut EquilibriumState,
        problem: &EquilibriumInverseProblem<'a>,
    ) -> SolverResult<InverseResult> {
        self.options.validate()?;
        problem.validate()?;
        let c = problem.titrant_matrix()?;
        let nt = problem.titrants.len();
        let x0 = problem
            .initial_guess
            .clone()
            .unwrap_or_else(|| DVector::zeros(nt));

        let mut inner_iterations = 0;
        let Some(mut current) = self.evaluate(problem, &c, state, x0.clone(), &mut inner_iterations)? else {
            return Ok(InverseResult {
                succeeded: false,
                iterations: 0,
                inner_iterations,
                titrant_amounts: x0,
                target_residuals: DVector::from_element(nt, f64::NAN),
                failed_target: Some(0),
                equilibrium: EquilibriumResult::default(),
            });
        };

        let mut bracket = Bracket::default();
        bracket.record(&current);

        let mut iterations = 0;
        let mut converged = current.norm() <= self.options.tolerance;
        while !converged && iterations < self.options.max_iterations {
            iterations += 1;
            let jacobian = self.jacobian(problem, &c, &current, &mut inner_iterations)?;
            let newton = newton_step(&current, &jacobian);

            let accepted = match (bracket.interval(), newton) {
                (Some(interval), newton) => self.safeguarded_step(
                    problem,
                    &c,
                    &current,
                    newton,
                    interval,
                    &mut bracket,
                    &mut inner_iterations,
                )?,
                (None, Some(step)) => {
                    self.backtrack(problem, &c, &current, &step, false, &mut bracket, &mut inner_iterations)?
                }
                (None, None) => {
                    warn!(iteration = iterations, "singular inverse Jacobian");
                    break;
                }
            };

            match accepted {
                Some(next) => {
                    trace!(iteration = iterations, residual = next.norm(), "inverse iteration");
                    current = next;
                    converged = current.norm() <= self.options.tolerance;
                }
                None => {
                    warn!(iteration = iterations, "inverse step could not reduce the residual");
                    break;
                }
            }
        }

        let failed_target = (!converged).then(|| current.residuals.iamax());
        if converged {
            debug!(iterations, inner_iterations, "inverse problem converged");
        } else if let Some(i) = failed_target {
            warn!(
                iterations,
                target = %problem.targets[i].describe(problem.base.system()),
                residual = current.residuals[i],
                "inverse problem did not converge"
            );
        }

        *state = current.state;
        Ok(InverseResult {
            succeeded: converged,
            iterations,
            inner_iterations,
            titrant_amounts: current.x,
            target_residuals: current.residuals,
            failed_target,
            equilibrium: current.result,
        })
    }

    /// Forward solve at `x` from a copy of `start`. `None` when `be₀ + C·x`
    /// is not a valid budget or the solve fails or errors.
    fn evaluate<'a>(
        &self,
        problem: &EquilibriumInverseProblem<'a>,
        c: &DMatrix<f64>,
        start: &EquilibriumState,
        x: DVector<f64>,
        inner_iterations: &mut usize,
    ) -> SolverResult<Option<Evaluation<'a>>> {
        let be = problem.base.element_amounts() + c * &x;
        let Ok(forward) = problem.base.with_element_amounts(be.as_slice()) else {
            return Ok(None);
        };
        let mut state = start.clone();
        let result = match self.backend.solve(&mut state, &forward, &self.options.equilibrium) {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, "inner equilibrium solve failed");
                return Ok(None);
            }
        };
        *inner_iterations += result.iterations;
        if !result.succeeded {
            return Ok(None);
        }

        let system = problem.base.system();
        let (t, p) = (forward.temperature_value(), forward.pressure_value());
        let residuals = problem
            .targets
            .iter()
            .map(|target| target.residual(system, t, p, state.n.as_slice()))
            .collect::<SolverResult<Vec<f64>>>()?;
        Ok(Some(Evaluation {
            x,
            state,
            problem: forward,
            result,
            residuals: DVector::from_vec(residuals),
        }))
    }

    fn jacobian<'a>(
        &self,
        problem: &EquilibriumInverseProblem<'a>,
        c: &DMatrix<f64>,
        at: &Evaluation<'a>,
        inner_iterations: &mut usize,
    ) -> SolverResult<DMatrix<f64>> {
        // Zero-budget rows removed from the solve have no sensitivity
        let touches_eliminated = at
            .result
            .eliminated_elements
            .iter()
            .any(|&r| c.row(r).iter().any(|&v| v != 0.0));

        if self.options.jacobian == InverseJacobian::Sensitivity && !touches_eliminated {
            match self.sensitivity_jacobian(problem, c, at) {
                Ok(j) => return Ok(j),
                Err(e) => debug!(error = %e, "sensitivity Jacobian unavailable, using finite differences"),
            }
        }
        self.finite_difference_jacobian(problem, c, at, inner_iterations)
    }

    fn sensitivity_jacobian<'a>(
        &self,
        problem: &EquilibriumInverseProblem<'a>,
        c: &DMatrix<f64>,
        at: &Evaluation<'a>,
    ) -> SolverResult<DMatrix<f64>> {
        let system = problem.base.system();
        let s = self
            .backend
            .sensitivity(&at.state, &at.problem, &at.result, &self.options.equilibrium)?;
        let dndx = &s.dnedbe * c;
        let species = at.problem.partition().indices_equilibrium_species();
        let (t, p) = (at.problem.temperature_value(), at.problem.pressure_value());

        let mut jac = DMatrix::zeros(problem.targets.len(), c.ncols());
        for (i, target) in problem.targets.iter().enumerate() {
            let grad = target.gradient(system, t, p, at.state.n.as_slice(), self.options.fd_step)?;
            let grad_e = DVector::from_iterator(species.len(), species.iter().map(|&k| grad[k]));
            jac.set_row(i, &(grad_e.transpose() * &dndx));
        }
        Ok(jac)
    }

    fn finite_difference_jacobian<'a>(
        &self,
        problem: &EquilibriumInverseProblem<'a>,
        c: &DMatrix<f64>,
        at: &Evaluation<'a>,
        inner_iterations: &mut usize,
    ) -> SolverResult<DMatrix<f64>> {
        let mut jac = DMatrix::zeros(problem.targets.len(), c.ncols());
        for j in 0..c.ncols() {
            let h = perturbation(at.x[j], self.options.fd_step);
            let mut column = None;
            for signed in [h, -h] {
                let mut x = at.x.clone();
                x[j] += signed;
                if let Some(e) = self.evaluate(problem, c, &at.state, x, inner_iterations)? {
                    column = Some((&e.residuals - &at.residuals) / signed);
                    break;
                }
            }
            let column = column.ok_or_else(|| SolverError::Numeric {
                what: format!(
                    "could not perturb titrant {} for a finite-difference Jacobian",
                    problem.titrants[j].name
                ),
            })?;
            jac.set_column(j, &column);
        }
        Ok(jac)
    }

    /// Halve `step` until the forward solve succeeds and, unless
    /// `accept_any`, the residual decreases.
    #[allow(clippy::too_many_arguments)]
    fn backtrack<'a>(
        &self,
        problem: &EquilibriumInverseProblem<'a>,
        c: &DMatrix<f64>,
        current: &Evaluation<'a>,
        step: &DVector<f64>,
        accept_any: bool,
        bracket: &mut Bracket,
        inner_iterations: &mut usize,
    ) -> SolverResult<Option<Evaluation<'a>>> {
        let mut alpha = 1.0;
        for _ in 0..=self.options.max_halvings {
            let x = &current.x + step * alpha;
            if let Some(trial) = self.evaluate(problem, c, &current.state, x, inner_iterations)? {
                bracket.record(&trial);
                if accept_any || trial.norm() < current.norm() || trial.norm() <= self.options.tolerance {
                    return Ok(Some(trial));
                }
            }
            alpha *= 0.5;
        }
        Ok(None)
    }

    /// One titrant with a bracketed root: take the Newton point if it lies
    /// inside the bracket and reduces the residual, bisect otherwise.
    #[allow(clippy::too_many_arguments)]
    fn safeguarded_step<'a>(
        &self,
        problem: &EquilibriumInverseProblem<'a>,
        c: &DMatrix<f64>,
        current: &Evaluation<'a>,
        newton: Option<DVector<f64>>,
        (lo, hi): (f64, f64),
        bracket: &mut Bracket,
        inner_iterations: &mut usize,
    ) -> SolverResult<Option<Evaluation<'a>>> {
        if let Some(step) = newton {
            let x = &current.x + step;
            if x[0] > lo && x[0] < hi {
                if let Some(trial) = self.evaluate(problem, c, &current.state, x, inner_iterations)? {
                    bracket.record(&trial);
                    if trial.norm() < current.norm() {
                        return Ok(Some(trial));
                    }
                }
            }
        }
        let (lo, hi) = bracket.interval().unwrap_or((lo, hi));
        let midpoint = DVector::from_element(1, 0.5 * (lo + hi) - current.x[0]);
        self.backtrack(problem, c, current, &midpoint, true, bracket, inner_iterations)
    }
}

/// Newton step `-J⁻¹F`, or `None` for a singular or non-finite system.
fn newton_step(at: &Evaluation<'_>, jacobian: &DMatrix<f64>) -> Option<DVector<f64>> {
    let step = if at.x.len() == 1 {
        let d = jacobian[(0, 0)];
        (d != 0.0).then(|| DVector::from_element(1, -at.residuals[0] / d))?
    } else {
        jacobian.clone().lu().solve(&(-&at.residuals))?
    };
    step.iter().all(|v| v.is_finite()).then_some(step)
}

/// Latest single-titrant amounts seen with a negative and a positive
/// residual. Once both exist they bracket a root.
#[derive(Debug, Clone, Copy, Default)]
struct Bracket {
    negative: Option<f64>,
    positive: Option<f64>,
}

impl Bracket {
    fn record(&mut self, e: &Evaluation<'_>) {
        if e.x.len() != 1 {
            return;
        }
        if e.residuals[0] < 0.0 {
            self.negative = Some(e.x[0]);
        } else if e.residuals[0] > 0.0 {
            self.positive = Some(e.x[0]);
        }
    }

    fn interval(&self) -> Option<(f64, f64)> {
        match (self.negative, self.positive) {
            (Some(a), Some(b)) => Some((a.min(b), a.max(b))),
            _ => None,
        }
    }
}
