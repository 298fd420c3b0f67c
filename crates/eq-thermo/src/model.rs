//! Chemical-potential model trait and validation helpers.

use std::fmt::Debug;

use eq_core::constants::R;
use nalgebra::{DMatrix, DVector};

use crate::error::ThermoResult;

/// Chemical potentials of every species at one (T, P, n) point.
///
/// Derivatives are optional: a model that cannot provide them leaves them
/// `None` and callers fall back to finite differences.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalPotentials {
    /// μ [J/mol]
    pub values: DVector<f64>,
    /// ∂μ/∂n [J/mol²]
    pub ddn: Option<DMatrix<f64>>,
    /// ∂μ/∂T [J/(mol·K)]
    pub ddt: Option<DVector<f64>>,
    /// ∂μ/∂P [J/(mol·Pa)]
    pub ddp: Option<DVector<f64>>,
}

impl ChemicalPotentials {
    /// Potentials without derivative information.
    pub fn values_only(values: DVector<f64>) -> Self {
        Self {
            values,
            ddn: None,
            ddt: None,
            ddp: None,
        }
    }
}

/// Trait for chemical-potential models.
///
/// Implementations must be thread-safe (Send + Sync) so that independent
/// equilibrium problems over the same system can be solved in parallel.
/// Temperatures are in K, pressures in Pa, amounts in mol.
pub trait ChemicalPotentialModel: Send + Sync + Debug {
    /// Model name (for debugging/logging).
    fn name(&self) -> &str;

    fn num_species(&self) -> usize;

    /// Chemical potentials μ(T, P, n), with whatever derivatives are available.
    fn evaluate(&self, t: f64, p: f64, n: &[f64]) -> ThermoResult<ChemicalPotentials>;

    /// Standard molar Gibbs energies g°(T, P) [J/mol].
    fn standard_gibbs_energies(&self, t: f64, p: f64) -> ThermoResult<DVector<f64>>;

    /// Standard molar volumes [m³/mol].
    fn standard_volumes(&self, t: f64, p: f64) -> ThermoResult<DVector<f64>>;

    /// Natural log of species activities.
    ///
    /// Default: `(μ - g°) / RT`.
    fn ln_activities(&self, t: f64, p: f64, n: &[f64]) -> ThermoResult<DVector<f64>> {
        let mu = self.evaluate(t, p, n)?.values;
        let g0 = self.standard_gibbs_energies(t, p)?;
        Ok((mu - g0) / (R * t))
    }
}

/// Input validation shared by model implementations.
pub mod validation {
    use eq_core::{ensure_all_finite, ensure_len};

    use crate::error::{ThermoError, ThermoResult};

    /// Ensure temperature is positive and finite.
    pub fn validate_temperature(t: f64) -> ThermoResult<()> {
        if !t.is_finite() || t <= 0.0 {
            return Err(ThermoError::NonPhysical {
                what: "temperature must be positive and finite",
            });
        }
        Ok(())
    }

    /// Ensure pressure is positive and finite.
    pub fn validate_pressure(p: f64) -> ThermoResult<()> {
        if !p.is_finite() || p <= 0.0 {
            return Err(ThermoError::NonPhysical {
                what: "pressure must be positive and finite",
            });
        }
        Ok(())
    }

    /// Ensure amounts are finite, non-negative, and sized for the system.
    pub fn validate_amounts(n: &[f64], num_species: usize) -> ThermoResult<()> {
        ensure_len(n.len(), num_species, "species amounts")?;
        ensure_all_finite(n, "species amount")?;
        if n.iter().any(|v| *v < 0.0) {
            return Err(ThermoError::NonPhysical {
                what: "species amounts must be non-negative",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::validation::*;
    use super::*;

    #[test]
    fn validation_rejects_nonphysical_inputs() {
        assert!(validate_temperature(0.0).is_err());
        assert!(validate_temperature(f64::NAN).is_err());
        assert!(validate_pressure(-1.0).is_err());
        assert!(validate_amounts(&[1.0, -1e-12], 2).is_err());
        assert!(validate_amounts(&[1.0], 2).is_err());
        assert!(validate_amounts(&[0.0, 2.0], 2).is_ok());
        assert!(matches!(
            validate_amounts(&[f64::NAN, 1.0], 2),
            Err(crate::error::ThermoError::Core(eq_core::CoreError::NonFinite { .. }))
        ));
    }

    #[derive(Debug)]
    struct Linear;

    impl ChemicalPotentialModel for Linear {
        fn name(&self) -> &str {
            "linear"
        }
        fn num_species(&self) -> usize {
            1
        }
        fn evaluate(&self, t: f64, _p: f64, n: &[f64]) -> ThermoResult<ChemicalPotentials> {
            Ok(ChemicalPotentials::values_only(DVector::from_element(
                1,
                -1000.0 + R * t * n[0].ln(),
            )))
        }
        fn standard_gibbs_energies(&self, _t: f64, _p: f64) -> ThermoResult<DVector<f64>> {
            Ok(DVector::from_element(1, -1000.0))
        }
        fn standard_volumes(&self, _t: f64, _p: f64) -> ThermoResult<DVector<f64>> {
            Ok(DVector::zeros(1))
        }
    }

    #[test]
    fn default_ln_activities_recovers_log_term() {
        let ln_a = Linear.ln_activities(300.0, 1e5, &[0.5]).unwrap();
        assert!((ln_a[0] - 0.5f64.ln()).abs() < 1e-12);
    }
}
