//! One-call entry points.
//!
//! These wrap the solvers with the native backend and turn an unsuccessful
//! calculation into [`SolverError::Failed`].

use rayon::prelude::*;
use tracing::debug;

use crate::backend::NativeBackend;
use crate::error::{SolverError, SolverResult};
use crate::inverse::{EquilibriumInverseProblem, InverseOptions, InverseResult, InverseSolver};
use crate::options::EquilibriumOptions;
use crate::problem::EquilibriumProblem;
use crate::result::EquilibriumResult;
use crate::solver::EquilibriumSolver;
use crate::state::EquilibriumState;

/// Equilibrate `state` for `problem`.
pub fn equilibrate(
    state: &mut EquilibriumState,
    problem: &EquilibriumProblem<'_>,
    options: &EquilibriumOptions,
) -> SolverResult<EquilibriumResult> {
    let result = EquilibriumSolver::new(problem.system()).solve_problem(state, problem, options)?;
    if !result.succeeded {
        return Err(SolverError::Failed {
            what: result
                .failure_message()
                .unwrap_or_else(|| "unknown failure".to_string()),
        });
    }
    Ok(result)
}

/// Solve an inverse problem with the native backend.
pub fn equilibrate_inverse(
    state: &mut EquilibriumState,
    problem: &EquilibriumInverseProblem<'_>,
    options: &InverseOptions,
) -> SolverResult<InverseResult> {
    let backend = NativeBackend::new(problem.base().system());
    let result = InverseSolver::new(&backend, options.clone()).solve(state, problem)?;
    if !result.succeeded {
        let what = match result.failed_target {
            Some(i) => format!(
                "target {} not met after {} iterations (residual {:e})",
                problem.targets()[i].describe(problem.base().system()),
                result.iterations,
                result.target_residuals[i]
            ),
            None => "inverse problem did not converge".to_string(),
        };
        return Err(SolverError::Failed { what });
    }
    Ok(result)
}

/// Solve independent problems in parallel, one result per case in order.
///
/// Each case is solved from its own state; nothing is shared but the
/// (immutable) chemical systems.
pub fn solve_batch(
    cases: &mut [(EquilibriumState, EquilibriumProblem<'_>)],
    options: &EquilibriumOptions,
) -> Vec<SolverResult<EquilibriumResult>> {
    debug!(cases = cases.len(), "solving equilibrium batch");
    cases
        .par_iter_mut()
        .map(|(state, problem)| {
            EquilibriumSolver::new(problem.system()).solve_problem(state, problem, options)
        })
        .collect()
}
