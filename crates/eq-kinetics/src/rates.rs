//! Kinetic rate callback.

use nalgebra::DVector;

use crate::error::KineticResult;

/// Rates of change of the kinetic species amounts.
///
/// `rates` receives the amounts of all species and returns `dn/dt` [mol/s]
/// for the kinetic species only, ordered like
/// [`Partition::indices_kinetic_species`](eq_solver::Partition::indices_kinetic_species).
/// Takes `&mut self` so implementations may cache between calls.
pub trait KineticRates {
    fn rates(&mut self, t: f64, temperature: f64, pressure: f64, n: &DVector<f64>) -> KineticResult<DVector<f64>>;
}

impl<F> KineticRates for F
where
    F: FnMut(f64, f64, f64, &DVector<f64>) -> KineticResult<DVector<f64>>,
{
    fn rates(&mut self, t: f64, temperature: f64, pressure: f64, n: &DVector<f64>) -> KineticResult<DVector<f64>> {
        self(t, temperature, pressure, n)
    }
}
