// Property tests for the native ideal model.

use eq_core::constants::{P_REF, R};
use eq_thermo::{ChemicalSystem, ChemicalSystemBuilder, GibbsCorrelation, PhaseKind, Species};
use proptest::prelude::*;

fn gas_and_solution() -> ChemicalSystem {
    let mut b = ChemicalSystemBuilder::new();
    b.add_phase(
        "gas",
        PhaseKind::IdealGas,
        vec![
            Species::new("CO2(g)")
                .with_element("C", 1.0)
                .with_element("O", 2.0)
                .with_gibbs(GibbsCorrelation::EnthalpyEntropy {
                    h0: -393_510.0,
                    s0: 2.9,
                }),
            Species::new("CO(g)")
                .with_element("C", 1.0)
                .with_element("O", 1.0)
                .with_gibbs(GibbsCorrelation::EnthalpyEntropy {
                    h0: -110_530.0,
                    s0: -89.0,
                }),
            Species::new("O2(g)").with_element("O", 2.0),
        ],
    );
    b.add_phase(
        "melt",
        PhaseKind::IdealSolution,
        vec![
            Species::new("A(l)").with_element("A", 1.0),
            Species::new("B(l)").with_element("B", 1.0),
        ],
    );
    b.build().unwrap()
}

proptest! {
    #[test]
    fn gibbs_duhem_holds_for_ideal_mixtures(
        n in prop::collection::vec(1e-6f64..10.0, 5),
        t in 250.0f64..1500.0,
        p in 1e4f64..1e7,
    ) {
        let sys = gas_and_solution();
        let ddn = sys.chemical_potentials(t, p, &n).unwrap().ddn.unwrap();

        // Σᵢ nᵢ ∂μᵢ/∂nⱼ = 0 within each phase
        for phase in sys.phases() {
            for j in phase.species_range() {
                let sum: f64 = phase.species_range().map(|i| n[i] * ddn[(i, j)]).sum();
                let scale: f64 = phase.species_range().map(|i| (n[i] * ddn[(i, j)]).abs()).sum();
                prop_assert!(sum.abs() <= 1e-9 * scale.max(1.0));
            }
        }
    }

    #[test]
    fn gas_potential_matches_closed_form(
        n in prop::collection::vec(1e-6f64..10.0, 5),
        t in 250.0f64..1500.0,
        p in 1e4f64..1e7,
    ) {
        let sys = gas_and_solution();
        let mu = sys.chemical_potentials(t, p, &n).unwrap().values;
        let total: f64 = n[..3].iter().sum();
        let g0 = -393_510.0 - t * 2.9;
        let expected = g0 + R * t * ((n[0] / total).ln() + (p / P_REF).ln());
        prop_assert!((mu[0] - expected).abs() <= 1e-9 * expected.abs());
    }

    #[test]
    fn temperature_derivative_matches_finite_difference(
        n in prop::collection::vec(1e-3f64..10.0, 5),
        t in 300.0f64..1200.0,
    ) {
        let sys = gas_and_solution();
        let p = 2e5;
        let ddt = sys.chemical_potentials(t, p, &n).unwrap().ddt.unwrap();
        let h = 1e-3;
        let fp = sys.chemical_potentials(t + h, p, &n).unwrap().values;
        let fm = sys.chemical_potentials(t - h, p, &n).unwrap().values;
        for i in 0..n.len() {
            let fd = (fp[i] - fm[i]) / (2.0 * h);
            prop_assert!((fd - ddt[i]).abs() <= 1e-5 * ddt[i].abs().max(1.0));
        }
    }
}

#[test]
fn phase_volumes_follow_ideal_gas_law() {
    let sys = gas_and_solution();
    let (t, p) = (500.0, 3e5);
    let n = [1.0, 0.5, 0.5, 1.0, 1.0];
    let v = sys.phase_volumes(t, p, &n).unwrap();
    assert!((v[0] - 2.0 * R * t / p).abs() < 1e-12);
    assert_eq!(v[1], 0.0);
}
