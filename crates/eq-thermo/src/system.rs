//! Chemical system: elements, species, phases, formula matrix, and model.

use std::collections::HashSet;
use std::sync::Arc;

use eq_core::ensure_all_finite;
use nalgebra::{DMatrix, DVector};

use crate::error::{ThermoError, ThermoResult};
use crate::ideal::IdealModel;
use crate::model::{ChemicalPotentialModel, ChemicalPotentials};
use crate::phase::{Phase, PhaseKind};
use crate::species::Species;

/// Name of the conserved electric-charge row.
pub const CHARGE_ELEMENT: &str = "Z";

/// Immutable chemical system.
///
/// Species are ordered phase by phase; that ordering defines the index of
/// every amount vector handled by the solvers. The formula matrix has one row
/// per element (plus a trailing charge row `Z` when any species is charged)
/// and one column per species.
#[derive(Debug, Clone)]
pub struct ChemicalSystem {
    elements: Vec<String>,
    species: Vec<Species>,
    phases: Vec<Phase>,
    species_phase: Vec<usize>,
    formula_matrix: DMatrix<f64>,
    model: Arc<dyn ChemicalPotentialModel>,
}

impl ChemicalSystem {
    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    pub fn num_phases(&self) -> usize {
        self.phases.len()
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Element × species stoichiometric matrix.
    pub fn formula_matrix(&self) -> &DMatrix<f64> {
        &self.formula_matrix
    }

    pub fn model(&self) -> &Arc<dyn ChemicalPotentialModel> {
        &self.model
    }

    pub fn index_element(&self, name: &str) -> ThermoResult<usize> {
        self.elements
            .iter()
            .position(|e| e == name)
            .ok_or_else(|| ThermoError::NotFound {
                what: "element",
                name: name.to_string(),
            })
    }

    pub fn index_species(&self, name: &str) -> ThermoResult<usize> {
        self.species
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| ThermoError::NotFound {
                what: "species",
                name: name.to_string(),
            })
    }

    pub fn index_phase(&self, name: &str) -> ThermoResult<usize> {
        self.phases
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| ThermoError::NotFound {
                what: "phase",
                name: name.to_string(),
            })
    }

    /// Index of the phase containing species `i`.
    pub fn phase_of_species(&self, i: usize) -> usize {
        self.species_phase[i]
    }

    /// Element totals `A·n`.
    pub fn element_amounts(&self, n: &[f64]) -> DVector<f64> {
        &self.formula_matrix * DVector::from_column_slice(n)
    }

    /// Total amount of every phase.
    pub fn phase_amounts(&self, n: &[f64]) -> Vec<f64> {
        self.phases.iter().map(|p| p.amount(n)).collect()
    }

    /// Volume of every phase [m³]: `Σ nᵢ v°ᵢ` over its species.
    pub fn phase_volumes(&self, t: f64, p: f64, n: &[f64]) -> ThermoResult<Vec<f64>> {
        let v = self.model.standard_volumes(t, p)?;
        Ok(self
            .phases
            .iter()
            .map(|phase| phase.species_range().map(|i| n[i] * v[i]).sum())
            .collect())
    }

    /// Convenience forward to the model.
    pub fn chemical_potentials(&self, t: f64, p: f64, n: &[f64]) -> ThermoResult<ChemicalPotentials> {
        self.model.evaluate(t, p, n)
    }
}

/// Builder for constructing a chemical system incrementally.
///
/// Use `add_element` (optional, fixes element ordering) and `add_phase`,
/// then `build()` to validate and freeze into an immutable `ChemicalSystem`.
/// Elements referenced by species but not declared are appended in order of
/// first appearance.
#[derive(Debug, Default)]
pub struct ChemicalSystemBuilder {
    elements: Vec<String>,
    phases: Vec<(String, PhaseKind, Vec<Species>)>,
}

impl ChemicalSystemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an element and return its row index.
    pub fn add_element(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        match self.elements.iter().position(|e| *e == name) {
            Some(i) => i,
            None => {
                self.elements.push(name);
                self.elements.len() - 1
            }
        }
    }

    /// Add a phase with its species and return the phase index.
    pub fn add_phase(
        &mut self,
        name: impl Into<String>,
        kind: PhaseKind,
        species: Vec<Species>,
    ) -> usize {
        self.phases.push((name.into(), kind, species));
        self.phases.len() - 1
    }

    /// Build with the native ideal activity model.
    pub fn build(self) -> ThermoResult<ChemicalSystem> {
        let (elements, species, phases) = self.assemble()?;
        let model = Arc::new(IdealModel::new(&species, &phases));
        Self::finish(elements, species, phases, model)
    }

    /// Build with a caller-supplied chemical-potential model.
    pub fn build_with_model(
        self,
        model: Arc<dyn ChemicalPotentialModel>,
    ) -> ThermoResult<ChemicalSystem> {
        let (elements, species, phases) = self.assemble()?;
        if model.num_species() != species.len() {
            return Err(ThermoError::InvalidSystem {
                message: format!(
                    "model '{}' covers {} species but the system has {}",
                    model.name(),
                    model.num_species(),
                    species.len()
                ),
            });
        }
        Self::finish(elements, species, phases, model)
    }

    fn assemble(self) -> ThermoResult<(Vec<String>, Vec<Species>, Vec<Phase>)> {
        let mut elements = self.elements;
        let mut species = Vec::new();
        let mut phases = Vec::new();
        let mut phase_names = HashSet::new();
        let mut species_names = HashSet::new();

        for (name, kind, members) in self.phases {
            if !phase_names.insert(name.clone()) {
                return Err(ThermoError::InvalidSystem {
                    message: format!("duplicate phase '{name}'"),
                });
            }
            if members.is_empty() {
                return Err(ThermoError::InvalidSystem {
                    message: format!("phase '{name}' has no species"),
                });
            }
            if kind == PhaseKind::Pure && members.len() != 1 {
                return Err(ThermoError::InvalidSystem {
                    message: format!("pure phase '{name}' must hold exactly one species"),
                });
            }

            let start = species.len();
            for s in members {
                if !species_names.insert(s.name().to_string()) {
                    return Err(ThermoError::InvalidSystem {
                        message: format!("duplicate species '{}'", s.name()),
                    });
                }
                for (element, _) in s.elements() {
                    if element == CHARGE_ELEMENT {
                        return Err(ThermoError::InvalidSystem {
                            message: format!(
                                "species '{}' uses reserved element name '{CHARGE_ELEMENT}'",
                                s.name()
                            ),
                        });
                    }
                    if !elements.contains(element) {
                        elements.push(element.clone());
                    }
                }
                species.push(s);
            }
            phases.push(Phase {
                name,
                kind,
                species: start..species.len(),
            });
        }

        if species.is_empty() {
            return Err(ThermoError::InvalidSystem {
                message: "system has no species".to_string(),
            });
        }
        if species.iter().any(|s| s.charge() != 0.0) {
            elements.push(CHARGE_ELEMENT.to_string());
        }
        Ok((elements, species, phases))
    }

    fn finish(
        elements: Vec<String>,
        species: Vec<Species>,
        phases: Vec<Phase>,
        model: Arc<dyn ChemicalPotentialModel>,
    ) -> ThermoResult<ChemicalSystem> {
        let mut formula_matrix = DMatrix::zeros(elements.len(), species.len());
        for (j, s) in species.iter().enumerate() {
            for (i, e) in elements.iter().enumerate() {
                formula_matrix[(i, j)] = if e == CHARGE_ELEMENT {
                    s.charge()
                } else {
                    s.coefficient(e)
                };
            }
        }
        ensure_all_finite(formula_matrix.as_slice(), "formula matrix coefficient")?;

        let mut species_phase = vec![0; species.len()];
        for (k, phase) in phases.iter().enumerate() {
            for i in phase.species_range() {
                species_phase[i] = k;
            }
        }

        Ok(ChemicalSystem {
            elements,
            species,
            phases,
            species_phase,
            formula_matrix,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GibbsCorrelation;

    fn water_gas() -> ChemicalSystem {
        let mut b = ChemicalSystemBuilder::new();
        b.add_element("O");
        b.add_phase(
            "gas",
            PhaseKind::IdealGas,
            vec![
                Species::new("H2O(g)").with_element("H", 2.0).with_element("O", 1.0),
                Species::new("H2(g)").with_element("H", 2.0),
                Species::new("O2(g)").with_element("O", 2.0),
            ],
        );
        b.build().unwrap()
    }

    #[test]
    fn declared_elements_keep_their_order() {
        let sys = water_gas();
        assert_eq!(sys.elements(), &["O".to_string(), "H".to_string()]);
        assert_eq!(sys.index_element("H").unwrap(), 1);
        let a = sys.formula_matrix();
        assert_eq!(a[(0, 0)], 1.0);
        assert_eq!(a[(1, 0)], 2.0);
        assert_eq!(a[(0, 2)], 2.0);
    }

    #[test]
    fn element_and_phase_amounts() {
        let sys = water_gas();
        let n = [1.0, 0.5, 0.25];
        let b = sys.element_amounts(&n);
        assert!((b[0] - 1.5).abs() < 1e-15);
        assert!((b[1] - 3.0).abs() < 1e-15);
        assert_eq!(sys.phase_amounts(&n), vec![1.75]);
        assert_eq!(sys.phase_of_species(2), 0);
    }

    #[test]
    fn charged_species_add_charge_row() {
        let mut b = ChemicalSystemBuilder::new();
        b.add_phase(
            "aqueous",
            PhaseKind::Aqueous,
            vec![
                Species::new("H2O").with_element("H", 2.0).with_element("O", 1.0),
                Species::new("Na+").with_element("Na", 1.0).with_charge(1.0),
                Species::new("Cl-").with_element("Cl", 1.0).with_charge(-1.0),
            ],
        );
        let sys = b.build().unwrap();
        assert_eq!(sys.elements().last().map(String::as_str), Some(CHARGE_ELEMENT));
        let z = sys.index_element(CHARGE_ELEMENT).unwrap();
        assert_eq!(sys.formula_matrix()[(z, 1)], 1.0);
        assert_eq!(sys.formula_matrix()[(z, 2)], -1.0);
    }

    #[test]
    fn lookups_report_unknown_names() {
        let sys = water_gas();
        let err = sys.index_species("CO2(g)").unwrap_err();
        assert_eq!(err.to_string(), "Unknown species: CO2(g)");
        assert!(sys.index_phase("liquid").is_err());
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        let mut b = ChemicalSystemBuilder::new();
        b.add_phase(
            "solid",
            PhaseKind::Pure,
            vec![Species::new("A"), Species::new("B")],
        );
        assert!(b.build().is_err());

        let mut b = ChemicalSystemBuilder::new();
        b.add_phase("g", PhaseKind::IdealGas, vec![Species::new("A")]);
        b.add_phase("l", PhaseKind::IdealSolution, vec![Species::new("A")]);
        assert!(b.build().is_err());

        assert!(ChemicalSystemBuilder::new().build().is_err());

        let mut b = ChemicalSystemBuilder::new();
        b.add_phase("g", PhaseKind::IdealGas, vec![Species::new("A").with_element("A", f64::NAN)]);
        assert!(b.build().is_err());
    }

    #[test]
    fn custom_model_must_cover_all_species() {
        let species = vec![Species::new("A").with_gibbs(GibbsCorrelation::Constant(1.0))];
        let phases = vec![Phase {
            name: "p".into(),
            kind: PhaseKind::IdealGas,
            species: 0..1,
        }];
        let model = Arc::new(IdealModel::new(&species, &phases));

        let mut b = ChemicalSystemBuilder::new();
        b.add_phase(
            "gas",
            PhaseKind::IdealGas,
            vec![Species::new("A"), Species::new("B")],
        );
        assert!(b.build_with_model(model).is_err());
    }
}
