//! eq-core: stable foundation for equilibria.
//!
//! Contains:
//! - units (uom SI types + constructors, thermodynamic constants)
//! - numeric (finiteness and length checks, max-norm)
//! - timing (solve-time bookkeeping)
//! - error (shared error types)

pub mod error;
pub mod numeric;
pub mod timing;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use numeric::*;
pub use timing::{AccumulatingTimer, Timer};
pub use units::*;
