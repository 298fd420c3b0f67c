//! Error types for equilibrium operations.

use eq_core::CoreError;
use eq_thermo::ThermoError;
use thiserror::Error;

/// Errors that can occur while setting up or post-processing equilibrium
/// calculations.
///
/// Numerical outcomes of a solve (non-convergence, infeasibility,
/// singular KKT matrices) are not errors: they are reported through
/// [`EquilibriumResult`](crate::EquilibriumResult).
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Invalid partition: {what}")]
    InvalidPartition { what: String },

    #[error("Invalid problem: {what}")]
    InvalidProblem { what: String },

    #[error("Invalid state: {what}")]
    InvalidState { what: String },

    /// Raised by the convenience layer when a calculation does not succeed.
    #[error("Equilibrium calculation failed: {what}")]
    Failed { what: String },

    #[error("Thermo error: {0}")]
    Thermo(#[from] ThermoError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Numeric error: {what}")]
    Numeric { what: String },
}

pub type SolverResult<T> = Result<T, SolverError>;

impl From<SolverError> for CoreError {
    fn from(e: SolverError) -> Self {
        match e {
            SolverError::InvalidPartition { .. } => CoreError::InvalidArg { what: "partition" },
            SolverError::InvalidProblem { .. } => CoreError::InvalidArg { what: "problem" },
            SolverError::InvalidState { .. } => CoreError::InvalidArg { what: "state" },
            SolverError::Failed { .. } => CoreError::InvalidArg { what: "equilibrium" },
            SolverError::Thermo(_) => CoreError::InvalidArg { what: "thermo" },
            SolverError::Core(e) => e,
            SolverError::Numeric { .. } => CoreError::InvalidArg { what: "numeric" },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thermo_errors_convert() {
        let err: SolverError = ThermoError::NotFound {
            what: "species",
            name: "H+".into(),
        }
        .into();
        assert!(err.to_string().contains("Unknown species: H+"));
    }

    #[test]
    fn core_error_roundtrip() {
        let core = CoreError::InvalidArg { what: "x" };
        let err: SolverError = core.clone().into();
        assert_eq!(CoreError::from(err), core);
    }
}
