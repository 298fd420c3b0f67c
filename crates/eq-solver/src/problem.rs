//! Equilibrium problem definition.

use eq_core::units::{Pressure, Temperature, k, pa};
use eq_thermo::ChemicalSystem;
use nalgebra::{DMatrix, DVector};

use crate::error::{SolverError, SolverResult};
use crate::partition::Partition;

/// Immutable equilibrium problem: system, partition, T, P, and the budget
/// `be` of the active equilibrium elements.
///
/// `be` is indexed like [`Partition::indices_equilibrium_elements`].
/// Construction validates everything; an existing problem is always solvable
/// in the structural sense.
#[derive(Debug, Clone)]
pub struct EquilibriumProblem<'a> {
    system: &'a ChemicalSystem,
    partition: Partition,
    elements: Vec<usize>,
    temperature: f64,
    pressure: f64,
    be: DVector<f64>,
}

impl<'a> EquilibriumProblem<'a> {
    pub fn new(
        system: &'a ChemicalSystem,
        partition: Partition,
        t: Temperature,
        p: Pressure,
        be: &[f64],
    ) -> SolverResult<Self> {
        partition
            .check_system(system)
            .map_err(|e| SolverError::InvalidProblem { what: e.to_string() })?;
        let elements = partition.indices_equilibrium_elements(system);
        let problem = Self {
            system,
            partition,
            elements,
            temperature: t.value,
            pressure: p.value,
            be: DVector::from_column_slice(be),
        };
        problem.validate()?;
        Ok(problem)
    }

    /// Build from totals over all system elements, keeping the active ones.
    pub fn from_element_amounts(
        system: &'a ChemicalSystem,
        partition: Partition,
        t: Temperature,
        p: Pressure,
        b: &[f64],
    ) -> SolverResult<Self> {
        if b.len() != system.num_elements() {
            return Err(SolverError::InvalidProblem {
                what: format!(
                    "expected {} element amounts, got {}",
                    system.num_elements(),
                    b.len()
                ),
            });
        }
        let be: Vec<f64> = partition
            .indices_equilibrium_elements(system)
            .into_iter()
            .map(|e| b[e])
            .collect();
        Self::new(system, partition, t, p, &be)
    }

    fn validate(&self) -> SolverResult<()> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(SolverError::InvalidProblem {
                what: format!("temperature must be positive, got {} K", self.temperature),
            });
        }
        if !self.pressure.is_finite() || self.pressure <= 0.0 {
            return Err(SolverError::InvalidProblem {
                what: format!("pressure must be positive, got {} Pa", self.pressure),
            });
        }
        if self.be.len() != self.elements.len() {
            return Err(SolverError::InvalidProblem {
                what: format!(
                    "element budget has {} entries but {} elements are active",
                    self.be.len(),
                    self.elements.len()
                ),
            });
        }

        // Sign-definite rows (ordinary elements) need a budget of matching
        // sign; mixed-sign rows such as charge only need a finite value.
        let ae = self.formula_matrix_equilibrium();
        for (row, &b) in self.be.iter().enumerate() {
            if !b.is_finite() {
                return Err(SolverError::InvalidProblem {
                    what: format!("budget of element {} is not finite", self.element_name(row)),
                });
            }
            let coefficients = ae.row(row);
            let nonnegative = coefficients.iter().all(|&c| c >= 0.0);
            let nonpositive = coefficients.iter().all(|&c| c <= 0.0);
            if (nonnegative && b < 0.0) || (nonpositive && b > 0.0) {
                return Err(SolverError::InvalidProblem {
                    what: format!(
                        "budget {b} of element {} has the wrong sign",
                        self.element_name(row)
                    ),
                });
            }
        }
        Ok(())
    }

    fn element_name(&self, row: usize) -> &str {
        &self.system.elements()[self.elements[row]]
    }

    pub fn system(&self) -> &'a ChemicalSystem {
        self.system
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// System indices of the active equilibrium elements (the rows of `be`).
    pub fn element_indices(&self) -> &[usize] {
        &self.elements
    }

    pub fn temperature(&self) -> Temperature {
        k(self.temperature)
    }

    pub fn pressure(&self) -> Pressure {
        pa(self.pressure)
    }

    pub(crate) fn temperature_value(&self) -> f64 {
        self.temperature
    }

    pub(crate) fn pressure_value(&self) -> f64 {
        self.pressure
    }

    pub fn element_amounts(&self) -> &DVector<f64> {
        &self.be
    }

    pub fn formula_matrix_equilibrium(&self) -> DMatrix<f64> {
        self.partition.formula_matrix_equilibrium(self.system)
    }

    /// Same problem at another temperature.
    pub fn with_temperature(&self, t: Temperature) -> SolverResult<Self> {
        let mut problem = self.clone();
        problem.temperature = t.value;
        problem.validate()?;
        Ok(problem)
    }

    /// Same problem at another pressure.
    pub fn with_pressure(&self, p: Pressure) -> SolverResult<Self> {
        let mut problem = self.clone();
        problem.pressure = p.value;
        problem.validate()?;
        Ok(problem)
    }

    /// Same problem with another equilibrium element budget.
    pub fn with_element_amounts(&self, be: &[f64]) -> SolverResult<Self> {
        let mut problem = self.clone();
        problem.be = DVector::from_column_slice(be);
        problem.validate()?;
        Ok(problem)
    }
}

/// Builder that derives `be` from amounts of species and elements, as in
/// "add 1 kg of water and 0.1 mol of NaCl".
#[derive(Debug)]
pub struct EquilibriumProblemBuilder<'a> {
    system: &'a ChemicalSystem,
    partition: Partition,
    temperature: Temperature,
    pressure: Pressure,
    b: DVector<f64>,
}

impl<'a> EquilibriumProblemBuilder<'a> {
    /// Empty recipe at 298.15 K and 1 bar, all species in equilibrium.
    pub fn new(system: &'a ChemicalSystem) -> Self {
        Self {
            system,
            partition: Partition::for_system(system),
            temperature: k(eq_core::constants::T_REF),
            pressure: pa(eq_core::constants::P_REF),
            b: DVector::zeros(system.num_elements()),
        }
    }

    pub fn partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn temperature(mut self, t: Temperature) -> Self {
        self.temperature = t;
        self
    }

    pub fn pressure(mut self, p: Pressure) -> Self {
        self.pressure = p;
        self
    }

    /// Add `amount` mol of a system species.
    pub fn add_species(mut self, name: &str, amount: f64) -> SolverResult<Self> {
        let j = self.system.index_species(name)?;
        let column = self.system.formula_matrix().column(j);
        self.b += column * amount;
        Ok(self)
    }

    /// Add `amount` mol of a compound given by its element formula.
    pub fn add_compound(mut self, formula: &[(&str, f64)], amount: f64) -> SolverResult<Self> {
        for &(element, coefficient) in formula {
            let e = self.system.index_element(element)?;
            self.b[e] += coefficient * amount;
        }
        Ok(self)
    }

    /// Add `amount` mol of a single element.
    pub fn add_element(self, name: &str, amount: f64) -> SolverResult<Self> {
        self.add_compound(&[(name, 1.0)], amount)
    }

    pub fn build(self) -> SolverResult<EquilibriumProblem<'a>> {
        EquilibriumProblem::from_element_amounts(
            self.system,
            self.partition,
            self.temperature,
            self.pressure,
            self.b.as_slice(),
        )
    }
}
