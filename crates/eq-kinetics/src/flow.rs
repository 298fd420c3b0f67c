//! Volumetric sources and sinks of an open kinetic system.
//!
//! A source feeds the element composition of a reference state at a fixed
//! volumetric rate. A sink withdraws a set of phases at a fixed volumetric
//! rate, removing the same fraction of every species in them.

use eq_solver::EquilibriumState;
use eq_thermo::{ChemicalSystem, PhaseKind};
use nalgebra::DVector;

use crate::error::{KineticError, KineticResult};

fn check_rate(volume_rate: f64) -> KineticResult<()> {
    if !volume_rate.is_finite() || volume_rate < 0.0 {
        return Err(KineticError::InvalidArg {
            what: "volumetric rate must be finite and non-negative",
        });
    }
    Ok(())
}

/// Element inflow from a source state.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Source {
    /// Element inflow [mol/s]
    pub elements: DVector<f64>,
}

impl Source {
    /// `elements = q · A·n_src / V_src`
    pub fn from_state(system: &ChemicalSystem, state: &EquilibriumState, volume_rate: f64) -> KineticResult<Self> {
        check_rate(volume_rate)?;
        if state.num_species() != system.num_species() {
            return Err(KineticError::InvalidArg {
                what: "source state was created for a different chemical system",
            });
        }
        let n = state.species_amounts().as_slice();
        let volume: f64 = system
            .phase_volumes(state.temperature().value, state.pressure().value, n)?
            .iter()
            .sum();
        if !(volume > 0.0) || !volume.is_finite() {
            return Err(KineticError::InvalidArg {
                what: "source state must have a positive volume",
            });
        }
        Ok(Self {
            elements: state.element_amounts(system) * (volume_rate / volume),
        })
    }
}

/// Which phases a sink withdraws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SinkTarget {
    Phase(usize),
    /// Gas, solution and aqueous phases
    Fluid,
    /// Pure condensed phases
    Solid,
}

impl SinkTarget {
    fn matches(self, index: usize, kind: PhaseKind) -> bool {
        match self {
            SinkTarget::Phase(p) => p == index,
            SinkTarget::Fluid => kind != PhaseKind::Pure,
            SinkTarget::Solid => kind == PhaseKind::Pure,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Sink {
    pub target: SinkTarget,
    /// [m³/s]
    pub volume_rate: f64,
}

impl Sink {
    pub fn new(target: SinkTarget, volume_rate: f64) -> KineticResult<Self> {
        check_rate(volume_rate)?;
        Ok(Self { target, volume_rate })
    }

    /// Fraction of each target phase withdrawn over `dt`, given the phase
    /// volumes. Zero when the targets hold no volume, capped at one.
    pub fn fractions(&self, system: &ChemicalSystem, volumes: &[f64], dt: f64) -> Vec<f64> {
        let targets: Vec<bool> = system
            .phases()
            .iter()
            .enumerate()
            .map(|(i, phase)| self.target.matches(i, phase.kind()))
            .collect();
        let volume: f64 = volumes.iter().zip(&targets).filter(|(_, t)| **t).map(|(v, _)| v).sum();
        let fraction = if volume > 0.0 {
            (self.volume_rate * dt / volume).min(1.0)
        } else {
            0.0
        };
        targets.iter().map(|&t| if t { fraction } else { 0.0 }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eq_core::constants::{P_REF, R, T_REF};
    use eq_thermo::{ChemicalSystemBuilder, Species};

    fn system() -> ChemicalSystem {
        let mut b = ChemicalSystemBuilder::new();
        b.add_phase("gas", PhaseKind::IdealGas, vec![Species::new("X").with_element("X", 1.0)]);
        b.add_phase(
            "rock",
            PhaseKind::Pure,
            vec![Species::new("X(s)").with_element("X", 1.0).with_standard_volume(1e-5)],
        );
        b.build().unwrap()
    }

    #[test]
    fn source_scales_composition_by_volume() {
        let sys = system();
        let mut state = EquilibriumState::new(&sys);
        state.set_species_amounts(&[2.0, 0.0]).unwrap();
        let volume = 2.0 * R * T_REF / P_REF;
        let source = Source::from_state(&sys, &state, volume).unwrap();
        assert!((source.elements[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_source_is_rejected() {
        let sys = system();
        let state = EquilibriumState::new(&sys);
        assert!(matches!(
            Source::from_state(&sys, &state, 1.0),
            Err(KineticError::InvalidArg { .. })
        ));
    }

    #[test]
    fn sink_targets_select_phases() {
        let sys = system();
        let volumes = [1.0, 1e-5];
        let fluid = Sink::new(SinkTarget::Fluid, 0.1).unwrap();
        assert_eq!(fluid.fractions(&sys, &volumes, 1.0), vec![0.1, 0.0]);
        let solid = Sink::new(SinkTarget::Solid, 1.0).unwrap();
        assert_eq!(solid.fractions(&sys, &volumes, 1.0), vec![0.0, 1.0]);
        let phase = Sink::new(SinkTarget::Phase(0), 0.5).unwrap();
        assert_eq!(phase.fractions(&sys, &[0.0, 1e-5], 1.0), vec![0.0, 0.0]);
        assert!(Sink::new(SinkTarget::Fluid, -1.0).is_err());
    }
}
