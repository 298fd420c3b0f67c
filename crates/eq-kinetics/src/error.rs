//! Error types for kinetic integration.

use eq_solver::SolverError;
use thiserror::Error;

/// Errors encountered while integrating kinetically-controlled species.
#[derive(Error, Debug)]
pub enum KineticError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Rate evaluation failed: {message}")]
    Rates { message: String },

    #[error("Equilibrium failed at t = {time} s: {message}")]
    Equilibrium { time: f64, message: String },

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),
}

pub type KineticResult<T> = Result<T, KineticError>;

impl From<eq_thermo::ThermoError> for KineticError {
    fn from(e: eq_thermo::ThermoError) -> Self {
        KineticError::Solver(SolverError::Thermo(e))
    }
}
