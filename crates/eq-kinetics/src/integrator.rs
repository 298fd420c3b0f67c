//! Fixed-step time integrators for kinetic species amounts.

use nalgebra::DVector;

use crate::error::KineticResult;

/// Trait for time integrators.
pub trait Integrator {
    /// Advance `x` by one step of `dt` given `rhs(t, x) = dx/dt`.
    fn step<F>(&self, rhs: &mut F, t: f64, x: &DVector<f64>, dt: f64) -> KineticResult<DVector<f64>>
    where
        F: FnMut(f64, &DVector<f64>) -> KineticResult<DVector<f64>>;
}

/// Classical RK4 (Runge-Kutta 4th order) integrator.
#[derive(Clone, Debug)]
pub struct RK4;

impl Integrator for RK4 {
    fn step<F>(&self, rhs: &mut F, t: f64, x: &DVector<f64>, dt: f64) -> KineticResult<DVector<f64>>
    where
        F: FnMut(f64, &DVector<f64>) -> KineticResult<DVector<f64>>,
    {
        let k1 = rhs(t, x)?;
        let k2 = rhs(t + 0.5 * dt, &(x + &k1 * (0.5 * dt)))?;
        let k3 = rhs(t + 0.5 * dt, &(x + &k2 * (0.5 * dt)))?;
        let k4 = rhs(t + dt, &(x + &k3 * dt))?;

        // x_new = x + (dt/6) * (k1 + 2*k2 + 2*k3 + k4)
        Ok(x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0))
    }
}

/// Forward Euler (explicit, 1st order). One rate evaluation per step.
#[derive(Clone, Debug)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn step<F>(&self, rhs: &mut F, t: f64, x: &DVector<f64>, dt: f64) -> KineticResult<DVector<f64>>
    where
        F: FnMut(f64, &DVector<f64>) -> KineticResult<DVector<f64>>,
    {
        let xdot = rhs(t, x)?;
        Ok(x + xdot * dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay(_t: f64, x: &DVector<f64>) -> KineticResult<DVector<f64>> {
        Ok(-x)
    }

    fn integrate(integrator: &impl Integrator, steps: usize) -> f64 {
        let dt = 1.0 / steps as f64;
        let mut x = DVector::from_element(1, 1.0);
        for i in 0..steps {
            x = integrator.step(&mut decay, i as f64 * dt, &x, dt).unwrap();
        }
        x[0]
    }

    #[test]
    fn rk4_is_fourth_order() {
        let exact = (-1.0f64).exp();
        let coarse = (integrate(&RK4, 10) - exact).abs();
        let fine = (integrate(&RK4, 20) - exact).abs();
        assert!(coarse < 1e-6);
        assert!(coarse / fine > 14.0);
    }

    #[test]
    fn euler_is_first_order() {
        let exact = (-1.0f64).exp();
        let coarse = (integrate(&ForwardEuler, 100) - exact).abs();
        let fine = (integrate(&ForwardEuler, 200) - exact).abs();
        assert!((coarse / fine - 2.0).abs() < 0.1);
    }

    #[test]
    fn time_is_passed_to_rates() {
        // dx/dt = t integrates exactly with RK4
        let mut rhs = |t: f64, _x: &DVector<f64>| -> KineticResult<DVector<f64>> { Ok(DVector::from_element(1, t)) };
        let x = RK4.step(&mut rhs, 1.0, &DVector::zeros(1), 0.5).unwrap();
        assert!((x[0] - (1.5f64.powi(2) - 1.0) / 2.0).abs() < 1e-14);
    }
}
