//! Mutable equilibrium state.

use eq_core::constants::{P_REF, T_REF};
use eq_core::units::{Pressure, Temperature, k, pa};
use eq_thermo::ChemicalSystem;
use nalgebra::DVector;

use crate::error::{SolverError, SolverResult};

/// Species amounts plus the conditions and dual variables of the last solve.
///
/// The state is both input (initial guess, warm start) and output of every
/// equilibrium calculation. Element potentials `λ` (one per system element)
/// and species potentials `z` (one per species) are stored in J/mol.
#[derive(Debug, Clone, PartialEq)]
pub struct EquilibriumState {
    pub(crate) temperature: f64,
    pub(crate) pressure: f64,
    pub(crate) n: DVector<f64>,
    pub(crate) element_potentials: DVector<f64>,
    pub(crate) species_potentials: DVector<f64>,
}

impl EquilibriumState {
    /// Zero amounts at 298.15 K and 1 bar.
    pub fn new(system: &ChemicalSystem) -> Self {
        Self {
            temperature: T_REF,
            pressure: P_REF,
            n: DVector::zeros(system.num_species()),
            element_potentials: DVector::zeros(system.num_elements()),
            species_potentials: DVector::zeros(system.num_species()),
        }
    }

    pub fn num_species(&self) -> usize {
        self.n.len()
    }

    pub fn temperature(&self) -> Temperature {
        k(self.temperature)
    }

    pub fn pressure(&self) -> Pressure {
        pa(self.pressure)
    }

    pub fn set_temperature(&mut self, t: Temperature) -> SolverResult<()> {
        if !t.value.is_finite() || t.value <= 0.0 {
            return Err(SolverError::InvalidState {
                what: format!("temperature must be positive and finite, got {}", t.value),
            });
        }
        self.temperature = t.value;
        Ok(())
    }

    pub fn set_pressure(&mut self, p: Pressure) -> SolverResult<()> {
        if !p.value.is_finite() || p.value <= 0.0 {
            return Err(SolverError::InvalidState {
                what: format!("pressure must be positive and finite, got {}", p.value),
            });
        }
        self.pressure = p.value;
        Ok(())
    }

    /// Species amounts [mol] in system order.
    pub fn species_amounts(&self) -> &DVector<f64> {
        &self.n
    }

    pub fn species_amount(&self, index: usize) -> f64 {
        self.n[index]
    }

    pub fn set_species_amounts(&mut self, n: &[f64]) -> SolverResult<()> {
        if n.len() != self.n.len() {
            return Err(SolverError::InvalidState {
                what: format!("expected {} species amounts, got {}", self.n.len(), n.len()),
            });
        }
        if n.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(SolverError::InvalidState {
                what: "species amounts must be finite and non-negative".to_string(),
            });
        }
        self.n.copy_from_slice(n);
        Ok(())
    }

    pub fn set_species_amount(&mut self, index: usize, amount: f64) -> SolverResult<()> {
        if index >= self.n.len() {
            return Err(SolverError::InvalidState {
                what: format!("species index {index} out of range"),
            });
        }
        if !amount.is_finite() || amount < 0.0 {
            return Err(SolverError::InvalidState {
                what: format!("species amount must be finite and non-negative, got {amount}"),
            });
        }
        self.n[index] = amount;
        Ok(())
    }

    /// Set a species amount by name.
    pub fn set_species_amount_by_name(
        &mut self,
        system: &ChemicalSystem,
        name: &str,
        amount: f64,
    ) -> SolverResult<()> {
        let index = system.index_species(name)?;
        self.set_species_amount(index, amount)
    }

    /// Element potentials λ [J/mol], one per system element.
    pub fn element_potentials(&self) -> &DVector<f64> {
        &self.element_potentials
    }

    /// Species potentials z [J/mol], the multipliers of `n ≥ 0`.
    pub fn species_potentials(&self) -> &DVector<f64> {
        &self.species_potentials
    }

    /// Element totals `A·n` over all species.
    pub fn element_amounts(&self, system: &ChemicalSystem) -> DVector<f64> {
        system.element_amounts(self.n.as_slice())
    }

    pub(crate) fn check_system(&self, system: &ChemicalSystem) -> SolverResult<()> {
        if self.n.len() != system.num_species()
            || self.element_potentials.len() != system.num_elements()
        {
            return Err(SolverError::InvalidState {
                what: "state was created for a different chemical system".to_string(),
            });
        }
        Ok(())
    }
}
