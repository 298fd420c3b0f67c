//! Equilibrium targets for inverse problems.

use eq_core::constants::{LN_10, R};
use eq_thermo::ChemicalSystem;
use nalgebra::DVector;

use crate::error::{SolverError, SolverResult};
use crate::jacobian::forward_difference_jacobian;

/// Names tried, in order, when looking up the hydrogen ion for pH.
const HYDROGEN_ION: [&str; 2] = ["H+", "H+(aq)"];

/// A property of the equilibrium state fixed by an inverse problem.
///
/// Amount and volume residuals are relative to the target value (absolute
/// when the target is zero); activity residuals are in natural-log units and
/// pH residuals in pH units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetProperty {
    SpeciesAmount { species: usize, amount: f64 },
    SpeciesActivity { species: usize, ln_activity: f64 },
    Ph { species: usize, ph: f64 },
    PhaseAmount { phase: usize, amount: f64 },
    PhaseVolume { phase: usize, volume: f64 },
}

impl TargetProperty {
    pub fn species_amount(system: &ChemicalSystem, name: &str, amount: f64) -> SolverResult<Self> {
        Ok(Self::SpeciesAmount {
            species: system.index_species(name)?,
            amount: finite("species amount", amount)?,
        })
    }

    /// Target activity `a > 0` of a species.
    pub fn species_activity(system: &ChemicalSystem, name: &str, activity: f64) -> SolverResult<Self> {
        if !activity.is_finite() || activity <= 0.0 {
            return Err(SolverError::InvalidProblem {
                what: format!("activity target must be positive, got {activity}"),
            });
        }
        Ok(Self::SpeciesActivity {
            species: system.index_species(name)?,
            ln_activity: activity.ln(),
        })
    }

    /// `pH = -log10 a(H+)`. The system must contain `H+` or `H+(aq)`.
    pub fn ph(system: &ChemicalSystem, ph: f64) -> SolverResult<Self> {
        let species = HYDROGEN_ION
            .iter()
            .find_map(|name| system.index_species(name).ok())
            .ok_or_else(|| SolverError::InvalidProblem {
                what: "pH target needs a hydrogen ion species (H+ or H+(aq))".to_string(),
            })?;
        Ok(Self::Ph {
            species,
            ph: finite("pH", ph)?,
        })
    }

    pub fn phase_amount(system: &ChemicalSystem, name: &str, amount: f64) -> SolverResult<Self> {
        Ok(Self::PhaseAmount {
            phase: system.index_phase(name)?,
            amount: finite("phase amount", amount)?,
        })
    }

    /// Target phase volume [m³].
    pub fn phase_volume(system: &ChemicalSystem, name: &str, volume: f64) -> SolverResult<Self> {
        Ok(Self::PhaseVolume {
            phase: system.index_phase(name)?,
            volume: finite("phase volume", volume)?,
        })
    }

    /// Human-readable label for logs and failure messages.
    pub fn describe(&self, system: &ChemicalSystem) -> String {
        match self {
            Self::SpeciesAmount { species, amount } => {
                format!("amount of {} = {amount} mol", system.species()[*species].name())
            }
            Self::SpeciesActivity { species, ln_activity } => format!(
                "activity of {} = {:e}",
                system.species()[*species].name(),
                ln_activity.exp()
            ),
            Self::Ph { ph, .. } => format!("pH = {ph}"),
            Self::PhaseAmount { phase, amount } => {
                format!("amount of phase {} = {amount} mol", system.phases()[*phase].name())
            }
            Self::PhaseVolume { phase, volume } => {
                format!("volume of phase {} = {volume} m3", system.phases()[*phase].name())
            }
        }
    }

    fn scale(target: f64) -> f64 {
        if target != 0.0 { target.abs() } else { 1.0 }
    }

    /// Residual `(value - target)` in the units described on the type.
    pub fn residual(&self, system: &ChemicalSystem, t: f64, p: f64, n: &[f64]) -> SolverResult<f64> {
        Ok(match self {
            Self::SpeciesAmount { species, amount } => (n[*species] - amount) / Self::scale(*amount),
            Self::SpeciesActivity { species, ln_activity } => {
                system.model().ln_activities(t, p, n)?[*species] - ln_activity
            }
            Self::Ph { species, ph } => -system.model().ln_activities(t, p, n)?[*species] / LN_10 - ph,
            Self::PhaseAmount { phase, amount } => {
                (system.phases()[*phase].amount(n) - amount) / Self::scale(*amount)
            }
            Self::PhaseVolume { phase, volume } => {
                (system.phase_volumes(t, p, n)?[*phase] - volume) / Self::scale(*volume)
            }
        })
    }

    /// Gradient of [`residual`](Self::residual) with respect to all species
    /// amounts.
    pub fn gradient(
        &self,
        system: &ChemicalSystem,
        t: f64,
        p: f64,
        n: &[f64],
        fd_step: f64,
    ) -> SolverResult<DVector<f64>> {
        let mut grad = DVector::zeros(system.num_species());
        match self {
            Self::SpeciesAmount { species, amount } => grad[*species] = 1.0 / Self::scale(*amount),
            Self::SpeciesActivity { species, .. } => {
                grad = ln_activity_gradient(system, t, p, n, *species, fd_step)?;
            }
            Self::Ph { species, .. } => {
                grad = -ln_activity_gradient(system, t, p, n, *species, fd_step)? / LN_10;
            }
            Self::PhaseAmount { phase, amount } => {
                for i in system.phases()[*phase].species_range() {
                    grad[i] = 1.0 / Self::scale(*amount);
                }
            }
            Self::PhaseVolume { phase, volume } => {
                let v = system.model().standard_volumes(t, p)?;
                for i in system.phases()[*phase].species_range() {
                    grad[i] = v[i] / Self::scale(*volume);
                }
            }
        }
        Ok(grad)
    }
}

fn finite(what: &str, value: f64) -> SolverResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SolverError::InvalidProblem {
            what: format!("{what} target must be finite"),
        })
    }
}

/// `∂ln aᵢ/∂n`: row `i` of `∂μ/∂n / RT`, or finite differences of the
/// model's activities.
fn ln_activity_gradient(
    system: &ChemicalSystem,
    t: f64,
    p: f64,
    n: &[f64],
    species: usize,
    fd_step: f64,
) -> SolverResult<DVector<f64>> {
    let model = system.model();
    if let Some(ddn) = model.evaluate(t, p, n)?.ddn {
        return Ok(ddn.row(species).transpose() / (R * t));
    }
    let x = DVector::from_column_slice(n);
    let jac = forward_difference_jacobian(
        &x,
        None,
        |y| Ok(DVector::from_element(1, model.ln_activities(t, p, y.as_slice())?[species])),
        fd_step,
    )?;
    Ok(jac.row(0).transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eq_thermo::{ChemicalSystemBuilder, PhaseKind, Species};

    fn aqueous() -> ChemicalSystem {
        let mut b = ChemicalSystemBuilder::new();
        b.add_phase(
            "aqueous",
            PhaseKind::Aqueous,
            vec![
                Species::new("H2O").with_element("H", 2.0).with_element("O", 1.0),
                Species::new("H+").with_element("H", 1.0).with_charge(1.0),
                Species::new("OH-")
                    .with_element("H", 1.0)
                    .with_element("O", 1.0)
                    .with_charge(-1.0),
            ],
        );
        b.build().unwrap()
    }

    #[test]
    fn ph_of_known_molality() {
        let sys = aqueous();
        let target = TargetProperty::ph(&sys, 7.0).unwrap();
        // 1 kg of water with 1e-7 mol H+: molality 1e-7
        let nw = 1.0 / eq_core::constants::WATER_MOLAR_MASS;
        let n = [nw, 1e-7, 1e-7];
        let r = target.residual(&sys, 298.15, 1e5, &n).unwrap();
        assert!(r.abs() < 1e-6, "residual {r}");
    }

    #[test]
    fn gradients_match_finite_differences() {
        let sys = aqueous();
        let n = [55.0, 2e-4, 3e-5];
        let targets = [
            TargetProperty::ph(&sys, 7.0).unwrap(),
            TargetProperty::species_activity(&sys, "OH-", 1e-6).unwrap(),
            TargetProperty::phase_amount(&sys, "aqueous", 40.0).unwrap(),
            TargetProperty::species_amount(&sys, "H+", 0.0).unwrap(),
        ];
        for target in &targets {
            let grad = target.gradient(&sys, 298.15, 1e5, &n, 1e-6).unwrap();
            for j in 0..n.len() {
                let h = 1e-6 * n[j];
                let mut up = n;
                let mut down = n;
                up[j] += h;
                down[j] -= h;
                let fd = (target.residual(&sys, 298.15, 1e5, &up).unwrap()
                    - target.residual(&sys, 298.15, 1e5, &down).unwrap())
                    / (2.0 * h);
                assert!(
                    (grad[j] - fd).abs() < 1e-5 * fd.abs().max(1.0),
                    "{}: d/dn{j} {} vs {fd}",
                    target.describe(&sys),
                    grad[j]
                );
            }
        }
    }

    #[test]
    fn missing_hydrogen_ion_is_reported() {
        let mut b = ChemicalSystemBuilder::new();
        b.add_phase("gas", PhaseKind::IdealGas, vec![Species::new("N2").with_element("N", 2.0)]);
        let sys = b.build().unwrap();
        assert!(TargetProperty::ph(&sys, 7.0).is_err());
        assert!(TargetProperty::species_activity(&sys, "N2", 0.0).is_err());
    }
}
