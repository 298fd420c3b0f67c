//! eq-solver: Gibbs-energy minimization for chemical equilibrium.
//!
//! The solver finds species amounts that minimize the total Gibbs energy of
//! the equilibrium species subject to element (and charge) conservation and
//! non-negativity. It uses a primal-dual interior-point Newton method on the
//! perturbed KKT conditions, with:
//! - pre-reduction of zero-budget and linearly dependent element rows
//! - warm starts from the previous state and its dual variables
//! - fraction-to-boundary steps and a residual-norm line search
//! - regularized retries for singular KKT matrices
//!
//! On top of the forward solve it provides sensitivities (∂n/∂T, ∂n/∂P,
//! ∂n/∂b), inverse problems with titrants and targets, and parallel batches.
//!
//! # Example
//!
//! ```
//! use eq_core::units::{k, pa};
//! use eq_solver::{EquilibriumOptions, EquilibriumSolver, EquilibriumState};
//! use eq_thermo::{ChemicalSystemBuilder, GibbsCorrelation, PhaseKind, Species};
//!
//! let mut builder = ChemicalSystemBuilder::new();
//! builder.add_phase(
//!     "gas",
//!     PhaseKind::IdealGas,
//!     vec![
//!         Species::new("NO2").with_element("N", 1.0).with_element("O", 2.0)
//!             .with_gibbs(GibbsCorrelation::Constant(51_310.0)),
//!         Species::new("N2O4").with_element("N", 2.0).with_element("O", 4.0)
//!             .with_gibbs(GibbsCorrelation::Constant(97_890.0)),
//!     ],
//! );
//! let system = builder.build().unwrap();
//!
//! let solver = EquilibriumSolver::new(&system);
//! let mut state = EquilibriumState::new(&system);
//! let result = solver
//!     .solve(&mut state, k(298.15), pa(1e5), &[1.0, 2.0], &EquilibriumOptions::default())
//!     .unwrap();
//! assert!(result.succeeded);
//! ```

pub mod backend;
mod balance;
pub mod equilibrate;
pub mod error;
mod initialization;
pub mod inverse;
pub mod jacobian;
pub mod kkt;
pub mod options;
pub mod partition;
pub mod problem;
pub mod result;
pub mod sensitivity;
pub mod solver;
pub mod state;
pub mod targets;

pub use backend::{EquilibriumBackend, NativeBackend};
pub use equilibrate::{equilibrate, equilibrate_inverse, solve_batch};
pub use error::{SolverError, SolverResult};
pub use initialization::StartingPoint;
pub use inverse::{
    EquilibriumInverseProblem, InverseJacobian, InverseOptions, InverseResult, InverseSolver, Titrant,
};
pub use kkt::{KktFactorization, KktSnapshot};
pub use options::{EquilibriumOptions, HessianStrategy, Verbosity};
pub use partition::{Partition, SpeciesRole};
pub use problem::{EquilibriumProblem, EquilibriumProblemBuilder};
pub use result::{EquilibriumResult, Residuals, SolveFailure, SolveTiming};
pub use sensitivity::{EquilibriumSensitivity, finite_difference_sensitivity};
pub use solver::EquilibriumSolver;
pub use state::EquilibriumState;
pub use targets::TargetProperty;
