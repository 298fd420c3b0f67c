//! Ideal activity models: the native chemical-potential implementation.
//!
//! `μᵢ = g°ᵢ(T, P) + RT ln aᵢ`, plus a `v°ᵢ (P - P°)` pressure correction for
//! condensed species whose correlation does not already depend on pressure.
//! The composition Jacobian is analytic and block diagonal by phase.

use std::ops::Range;

use eq_core::constants::{P_REF, R, WATER_MOLAR_MASS};
use nalgebra::{DMatrix, DVector};

use crate::correlation::GibbsCorrelation;
use crate::error::ThermoResult;
use crate::model::{ChemicalPotentialModel, ChemicalPotentials, validation};
use crate::phase::{Phase, PhaseKind};
use crate::species::Species;

/// Floor applied to amounts inside logarithms and reciprocals.
const AMOUNT_FLOOR: f64 = 1e-300;

#[derive(Debug, Clone)]
struct SpeciesData {
    gibbs: GibbsCorrelation,
    volume: f64,
    gas: bool,
}

#[derive(Debug, Clone)]
struct PhaseBlock {
    kind: PhaseKind,
    range: Range<usize>,
}

/// Ideal gas / ideal solution / dilute aqueous / pure-phase model.
#[derive(Debug, Clone)]
pub struct IdealModel {
    species: Vec<SpeciesData>,
    phases: Vec<PhaseBlock>,
}

impl IdealModel {
    pub fn new(species: &[Species], phases: &[Phase]) -> Self {
        let mut data: Vec<SpeciesData> = species
            .iter()
            .map(|s| SpeciesData {
                gibbs: s.gibbs().clone(),
                volume: s.standard_volume(),
                gas: false,
            })
            .collect();
        for phase in phases {
            if phase.kind().is_gas() {
                for i in phase.species_range() {
                    data[i].gas = true;
                }
            }
        }
        Self {
            species: data,
            phases: phases
                .iter()
                .map(|p| PhaseBlock {
                    kind: p.kind(),
                    range: p.species_range(),
                })
                .collect(),
        }
    }

    /// Pressure correction added to a condensed species' standard potential.
    fn poynting(&self, i: usize, p: f64) -> f64 {
        let s = &self.species[i];
        if s.gas || s.gibbs.includes_pressure() {
            0.0
        } else {
            s.volume * (p - P_REF)
        }
    }

    fn fill_ln_activities(&self, p: f64, n: &[f64], ln_a: &mut DVector<f64>) {
        for block in &self.phases {
            let r = block.range.clone();
            let total = n[r.clone()].iter().sum::<f64>().max(AMOUNT_FLOOR);
            match block.kind {
                PhaseKind::IdealGas => {
                    let ln_p = (p / P_REF).ln();
                    for i in r {
                        ln_a[i] = (n[i].max(AMOUNT_FLOOR) / total).ln() + ln_p;
                    }
                }
                PhaseKind::IdealSolution => {
                    for i in r {
                        ln_a[i] = (n[i].max(AMOUNT_FLOOR) / total).ln();
                    }
                }
                PhaseKind::Aqueous => {
                    let w = r.start;
                    let nw = n[w].max(AMOUNT_FLOOR);
                    ln_a[w] = (nw / total).ln();
                    for i in r.start + 1..r.end {
                        ln_a[i] = (n[i].max(AMOUNT_FLOOR) / (nw * WATER_MOLAR_MASS)).ln();
                    }
                }
                PhaseKind::Pure => {
                    for i in r {
                        ln_a[i] = 0.0;
                    }
                }
            }
        }
    }

    /// ∂ln a/∂n, block diagonal by phase.
    fn ln_activity_jacobian(&self, n: &[f64]) -> DMatrix<f64> {
        let ns = self.species.len();
        let mut jac = DMatrix::zeros(ns, ns);
        for block in &self.phases {
            let r = block.range.clone();
            let total = n[r.clone()].iter().sum::<f64>().max(AMOUNT_FLOOR);
            match block.kind {
                PhaseKind::IdealGas | PhaseKind::IdealSolution => {
                    for i in r.clone() {
                        for j in r.clone() {
                            jac[(i, j)] = -1.0 / total;
                        }
                        jac[(i, i)] += 1.0 / n[i].max(AMOUNT_FLOOR);
                    }
                }
                PhaseKind::Aqueous => {
                    let w = r.start;
                    let nw = n[w].max(AMOUNT_FLOOR);
                    for j in r.clone() {
                        jac[(w, j)] = -1.0 / total;
                    }
                    jac[(w, w)] += 1.0 / nw;
                    for i in r.start + 1..r.end {
                        jac[(i, i)] = 1.0 / n[i].max(AMOUNT_FLOOR);
                        jac[(i, w)] = -1.0 / nw;
                    }
                }
                PhaseKind::Pure => {}
            }
        }
        jac
    }
}

impl ChemicalPotentialModel for IdealModel {
    fn name(&self) -> &str {
        "ideal"
    }

    fn num_species(&self) -> usize {
        self.species.len()
    }

    fn evaluate(&self, t: f64, p: f64, n: &[f64]) -> ThermoResult<ChemicalPotentials> {
        validation::validate_temperature(t)?;
        validation::validate_pressure(p)?;
        validation::validate_amounts(n, self.species.len())?;

        let rt = R * t;
        let ns = self.species.len();
        let mut ln_a = DVector::zeros(ns);
        self.fill_ln_activities(p, n, &mut ln_a);

        let mut values = DVector::zeros(ns);
        let mut ddt = DVector::zeros(ns);
        let mut ddp = DVector::zeros(ns);
        for (i, s) in self.species.iter().enumerate() {
            values[i] = s.gibbs.value(t, p) + rt * ln_a[i] + self.poynting(i, p);
            ddt[i] = s.gibbs.ddt(t, p) + R * ln_a[i];
            ddp[i] = s.gibbs.ddp(t, p)
                + if s.gas {
                    rt / p
                } else if s.gibbs.includes_pressure() {
                    0.0
                } else {
                    s.volume
                };
        }

        Ok(ChemicalPotentials {
            values,
            ddn: Some(self.ln_activity_jacobian(n) * rt),
            ddt: Some(ddt),
            ddp: Some(ddp),
        })
    }

    fn standard_gibbs_energies(&self, t: f64, p: f64) -> ThermoResult<DVector<f64>> {
        validation::validate_temperature(t)?;
        validation::validate_pressure(p)?;
        Ok(DVector::from_iterator(
            self.species.len(),
            self.species.iter().map(|s| s.gibbs.value(t, p)),
        ))
    }

    fn standard_volumes(&self, t: f64, p: f64) -> ThermoResult<DVector<f64>> {
        validation::validate_temperature(t)?;
        validation::validate_pressure(p)?;
        Ok(DVector::from_iterator(
            self.species.len(),
            self.species
                .iter()
                .map(|s| if s.gas { R * t / p } else { s.volume }),
        ))
    }

    fn ln_activities(&self, t: f64, p: f64, n: &[f64]) -> ThermoResult<DVector<f64>> {
        validation::validate_temperature(t)?;
        validation::validate_pressure(p)?;
        validation::validate_amounts(n, self.species.len())?;
        let mut ln_a = DVector::zeros(self.species.len());
        self.fill_ln_activities(p, n, &mut ln_a);
        Ok(ln_a)
    }
}
