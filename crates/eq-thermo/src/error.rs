//! Thermodynamic model errors.

use eq_core::CoreError;
use thiserror::Error;

/// Result type for thermodynamic operations.
pub type ThermoResult<T> = Result<T, ThermoError>;

/// Errors raised while building chemical systems or evaluating their models.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThermoError {
    /// Non-physical values (negative amounts, temperature, pressure, etc.).
    #[error("Non-physical value for {what}")]
    NonPhysical { what: &'static str },

    /// Invalid argument.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// A named element, species, or phase does not exist.
    #[error("Unknown {what}: {name}")]
    NotFound { what: &'static str, name: String },

    /// Inconsistent system definition (duplicate names, bad phase layout).
    #[error("Invalid chemical system: {message}")]
    InvalidSystem { message: String },

    /// Failure reported by a chemical-potential model.
    #[error("Model error: {message}")]
    Model { message: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}
