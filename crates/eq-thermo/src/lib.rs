//! eq-thermo: chemical systems and chemical-potential models.
//!
//! Provides:
//! - Species with element composition, charge, and standard-state data
//! - Phases with ideal activity conventions (gas, solution, aqueous, pure)
//! - `ChemicalSystem` with its formula matrix (charge row appended as `Z`)
//! - `ChemicalPotentialModel` trait with the native `IdealModel`
//! - Standard Gibbs energy correlations, including tabulated data
//!
//! # Example
//!
//! ```
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
//! let mu = system.chemical_potentials(298.15, 1e5, &[1.0, 1.0]).unwrap();
//! assert_eq!(mu.values.len(), 2);
//! ```

pub mod correlation;
pub mod error;
pub mod ideal;
pub mod model;
pub mod phase;
pub mod species;
pub mod system;

pub use correlation::{BilinearTable, GibbsCorrelation, LagrangeCurve};
pub use error::{ThermoError, ThermoResult};
pub use ideal::IdealModel;
pub use model::{ChemicalPotentialModel, ChemicalPotentials};
pub use phase::{Phase, PhaseKind};
pub use species::Species;
pub use system::{CHARGE_ELEMENT, ChemicalSystem, ChemicalSystemBuilder};
