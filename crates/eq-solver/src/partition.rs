//! Classification of species into equilibrium, kinetic, and inert subsets.

use std::collections::HashSet;

use eq_thermo::ChemicalSystem;
use nalgebra::{DMatrix, DVector};

use crate::error::{SolverError, SolverResult};

/// How the amount of a species is governed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpeciesRole {
    /// Set by instantaneous Gibbs-energy minimization.
    Equilibrium,
    /// Governed by rate laws, fixed during equilibrium sub-solves.
    Kinetic,
    /// Never changes.
    Inert,
}

/// Partition of the species index domain `[0, N)`.
///
/// Every species belongs to exactly one subset. Species never assigned
/// explicitly are equilibrium species. Calling a setter again for the same
/// subset replaces that subset's previous assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    roles: Vec<SpeciesRole>,
    claimed: Vec<Option<SpeciesRole>>,
}

impl Partition {
    /// All `num_species` species in equilibrium.
    pub fn new(num_species: usize) -> Self {
        Self {
            roles: vec![SpeciesRole::Equilibrium; num_species],
            claimed: vec![None; num_species],
        }
    }

    /// All species of `system` in equilibrium.
    pub fn for_system(system: &ChemicalSystem) -> Self {
        Self::new(system.num_species())
    }

    pub fn set_equilibrium_species(&mut self, indices: &[usize]) -> SolverResult<()> {
        self.assign(indices, SpeciesRole::Equilibrium)
    }

    pub fn set_kinetic_species(&mut self, indices: &[usize]) -> SolverResult<()> {
        self.assign(indices, SpeciesRole::Kinetic)
    }

    pub fn set_inert_species(&mut self, indices: &[usize]) -> SolverResult<()> {
        self.assign(indices, SpeciesRole::Inert)
    }

    /// Same as the index setters, resolving names through `system`.
    pub fn set_species_by_name(
        &mut self,
        system: &ChemicalSystem,
        names: &[&str],
        role: SpeciesRole,
    ) -> SolverResult<()> {
        let indices = names
            .iter()
            .map(|name| system.index_species(name))
            .collect::<Result<Vec<_>, _>>()?;
        self.assign(&indices, role)
    }

    fn assign(&mut self, indices: &[usize], role: SpeciesRole) -> SolverResult<()> {
        let n = self.roles.len();
        let mut seen = HashSet::with_capacity(indices.len());
        for &i in indices {
            if i >= n {
                return Err(SolverError::InvalidPartition {
                    what: format!("species index {i} out of range (N = {n})"),
                });
            }
            if !seen.insert(i) {
                return Err(SolverError::InvalidPartition {
                    what: format!("species index {i} listed more than once"),
                });
            }
            if let Some(other) = self.claimed[i] {
                if other != role {
                    return Err(SolverError::InvalidPartition {
                        what: format!("species index {i} is already {other:?}, cannot be {role:?}"),
                    });
                }
            }
        }

        for i in 0..n {
            if self.claimed[i] == Some(role) {
                self.claimed[i] = None;
            }
        }
        for &i in indices {
            self.claimed[i] = Some(role);
        }
        for i in 0..n {
            self.roles[i] = self.claimed[i].unwrap_or(SpeciesRole::Equilibrium);
        }
        Ok(())
    }

    pub fn num_species(&self) -> usize {
        self.roles.len()
    }

    /// Role of species `index`, `None` when out of range.
    pub fn role(&self, index: usize) -> Option<SpeciesRole> {
        self.roles.get(index).copied()
    }

    fn indices_with(&self, role: SpeciesRole) -> Vec<usize> {
        (0..self.roles.len())
            .filter(|&i| self.roles[i] == role)
            .collect()
    }

    pub fn indices_equilibrium_species(&self) -> Vec<usize> {
        self.indices_with(SpeciesRole::Equilibrium)
    }

    pub fn indices_kinetic_species(&self) -> Vec<usize> {
        self.indices_with(SpeciesRole::Kinetic)
    }

    pub fn indices_inert_species(&self) -> Vec<usize> {
        self.indices_with(SpeciesRole::Inert)
    }

    /// Elements with a non-zero coefficient in at least one equilibrium species.
    ///
    /// These are the entries of the equilibrium element budget `be`.
    pub fn indices_equilibrium_elements(&self, system: &ChemicalSystem) -> Vec<usize> {
        let a = system.formula_matrix();
        let species = self.indices_equilibrium_species();
        (0..a.nrows())
            .filter(|&e| species.iter().any(|&j| a[(e, j)] != 0.0))
            .collect()
    }

    /// Equilibrium elements × equilibrium species.
    pub fn formula_matrix_equilibrium(&self, system: &ChemicalSystem) -> DMatrix<f64> {
        let elements = self.indices_equilibrium_elements(system);
        let species = self.indices_equilibrium_species();
        let a = system.formula_matrix();
        DMatrix::from_fn(elements.len(), species.len(), |i, j| a[(elements[i], species[j])])
    }

    /// All elements × kinetic species.
    pub fn formula_matrix_kinetic(&self, system: &ChemicalSystem) -> DMatrix<f64> {
        Self::columns(system, &self.indices_kinetic_species())
    }

    /// All elements × inert species.
    pub fn formula_matrix_inert(&self, system: &ChemicalSystem) -> DMatrix<f64> {
        Self::columns(system, &self.indices_inert_species())
    }

    fn columns(system: &ChemicalSystem, species: &[usize]) -> DMatrix<f64> {
        let a = system.formula_matrix();
        DMatrix::from_fn(a.nrows(), species.len(), |i, j| a[(i, species[j])])
    }

    /// Element budget `be` carried by the equilibrium species of `n`.
    pub fn equilibrium_element_amounts(&self, system: &ChemicalSystem, n: &[f64]) -> DVector<f64> {
        let ne = DVector::from_iterator(
            self.roles.iter().filter(|r| **r == SpeciesRole::Equilibrium).count(),
            self.indices_equilibrium_species().into_iter().map(|i| n[i]),
        );
        self.formula_matrix_equilibrium(system) * ne
    }

    /// Check that the partition covers exactly the species of `system`.
    pub fn check_system(&self, system: &ChemicalSystem) -> SolverResult<()> {
        if self.roles.len() != system.num_species() {
            return Err(SolverError::InvalidPartition {
                what: format!(
                    "partition covers {} species but the system has {}",
                    self.roles.len(),
                    system.num_species()
                ),
            });
        }
        Ok(())
    }
}
