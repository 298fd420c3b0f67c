//! Options for kinetic runs.

use eq_solver::EquilibriumOptions;

use crate::error::{KineticError, KineticResult};

/// Integrator selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntegratorType {
    /// 4th-order Runge-Kutta (default, 4 rate calls per step).
    #[default]
    RK4,
    /// Forward Euler (1st-order, 1 rate call per step).
    ForwardEuler,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KineticOptions {
    /// Options of the equilibrium solve after every step.
    pub equilibrium: EquilibriumOptions,
    /// Fixed time step (seconds)
    pub dt: f64,
    pub integrator: IntegratorType,
    /// Maximum number of steps (safety limit)
    pub max_steps: usize,
    /// Record every N-th step (decimation)
    pub record_every: usize,
}

impl Default for KineticOptions {
    fn default() -> Self {
        Self {
            equilibrium: EquilibriumOptions::default(),
            dt: 1e-3,
            integrator: IntegratorType::default(),
            max_steps: 100_000,
            record_every: 1,
        }
    }
}

impl KineticOptions {
    pub fn validate(&self) -> KineticResult<()> {
        if !(self.dt > 0.0) || !self.dt.is_finite() {
            return Err(KineticError::InvalidArg {
                what: "dt must be positive",
            });
        }
        if self.max_steps == 0 {
            return Err(KineticError::InvalidArg {
                what: "max_steps must be positive",
            });
        }
        if self.record_every == 0 {
            return Err(KineticError::InvalidArg {
                what: "record_every must be positive",
            });
        }
        self.equilibrium.validate()?;
        Ok(())
    }
}
