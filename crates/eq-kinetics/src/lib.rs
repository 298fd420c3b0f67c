//! Kinetically-controlled species coupled to chemical equilibrium.
//!
//! Provides:
//! - Fixed-step RK4 and forward Euler integrators
//! - A `KineticRates` callback for user rate laws
//! - Sequential operator splitting: kinetic step with frozen equilibrium
//!   amounts, then a warm-started equilibrium re-solve
//! - Element totals conserved across the run, or changed only by
//!   volumetric sources and sinks

pub mod error;
mod flow;
pub mod integrator;
pub mod kinetics;
pub mod options;
pub mod rates;

// Re-exports for public API
pub use error::{KineticError, KineticResult};
pub use integrator::{ForwardEuler, Integrator, RK4};
pub use kinetics::{KineticRecord, KineticSolver};
pub use options::{IntegratorType, KineticOptions};
pub use rates::KineticRates;
