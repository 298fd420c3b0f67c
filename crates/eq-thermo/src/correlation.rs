//! Standard Gibbs energy correlations.
//!
//! A correlation maps (T, P) to the standard molar Gibbs energy of a species
//! [J/mol]. Three forms are supported:
//! - a constant value (useful for tests and isothermal studies)
//! - a linearised `g° = h° - T·s°` form
//! - tabulated data, either a 1-D Lagrange curve in T or a bilinear (T, P) grid

use crate::error::{ThermoError, ThermoResult};

/// Relative step used when differentiating tabulated data.
const TABLE_DIFF_STEP: f64 = 1e-6;

/// Standard Gibbs energy correlation for one species.
#[derive(Debug, Clone, PartialEq)]
pub enum GibbsCorrelation {
    /// Temperature- and pressure-independent value [J/mol].
    Constant(f64),
    /// `g° = h° - T·s°` with constant h° [J/mol] and s° [J/(mol·K)].
    EnthalpyEntropy { h0: f64, s0: f64 },
    /// Lagrange interpolation over temperature only.
    Curve(LagrangeCurve),
    /// Bilinear interpolation over a (T, P) grid.
    Grid(BilinearTable),
}

impl GibbsCorrelation {
    /// Standard Gibbs energy [J/mol].
    pub fn value(&self, t: f64, p: f64) -> f64 {
        match self {
            GibbsCorrelation::Constant(g) => *g,
            GibbsCorrelation::EnthalpyEntropy { h0, s0 } => h0 - t * s0,
            GibbsCorrelation::Curve(curve) => curve.eval(t),
            GibbsCorrelation::Grid(table) => table.eval(t, p),
        }
    }

    /// Temperature derivative [J/(mol·K)].
    pub fn ddt(&self, t: f64, p: f64) -> f64 {
        match self {
            GibbsCorrelation::Constant(_) => 0.0,
            GibbsCorrelation::EnthalpyEntropy { s0, .. } => -s0,
            _ => {
                let h = TABLE_DIFF_STEP * t.abs().max(1.0);
                (self.value(t + h, p) - self.value(t - h, p)) / (2.0 * h)
            }
        }
    }

    /// Pressure derivative [J/(mol·Pa)].
    pub fn ddp(&self, t: f64, p: f64) -> f64 {
        match self {
            GibbsCorrelation::Grid(_) => {
                let h = TABLE_DIFF_STEP * p.abs().max(1.0);
                (self.value(t, p + h) - self.value(t, p - h)) / (2.0 * h)
            }
            _ => 0.0,
        }
    }

    /// Whether the correlation already carries the pressure dependence.
    pub fn includes_pressure(&self) -> bool {
        matches!(self, GibbsCorrelation::Grid(_))
    }
}

/// Lagrange polynomial interpolation of tabulated (x, y) data.
///
/// Values outside the table are clamped to the end points.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeCurve {
    xi: Vec<f64>,
    yi: Vec<f64>,
    order: usize,
}

impl LagrangeCurve {
    /// Create a curve; `xi` must be strictly increasing and match `yi` in length.
    pub fn new(xi: Vec<f64>, yi: Vec<f64>, order: usize) -> ThermoResult<Self> {
        if xi.is_empty() || xi.len() != yi.len() {
            return Err(ThermoError::InvalidArg {
                what: "Lagrange curve needs matching, non-empty x and y",
            });
        }
        if xi.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ThermoError::InvalidArg {
                what: "Lagrange curve x points must be strictly increasing",
            });
        }
        Ok(Self { xi, yi, order })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let size = self.xi.len();
        if x <= self.xi[0] {
            return self.yi[0];
        }
        if x >= self.xi[size - 1] {
            return self.yi[size - 1];
        }

        // First point right of x, stepped back so the stencil brackets x
        let upper = self.xi.iter().position(|&xi| xi >= x).unwrap_or(size - 1);
        let start = upper.saturating_sub(1).min(size.saturating_sub(self.order + 1));
        let npoints = (self.order + 1).min(size - start);

        lagrange(
            x,
            &self.xi[start..start + npoints],
            &self.yi[start..start + npoints],
        )
    }
}

fn lagrange(x: f64, xi: &[f64], yi: &[f64]) -> f64 {
    let mut y = 0.0;
    for i in 0..xi.len() {
        let mut li = 1.0;
        for j in 0..xi.len() {
            if i != j {
                li *= (x - xi[j]) / (xi[i] - xi[j]);
            }
        }
        y += yi[i] * li;
    }
    y
}

/// Bilinear interpolation over a rectangular (T, P) grid.
///
/// `values[ip * temperatures.len() + it]` holds the value at
/// `(temperatures[it], pressures[ip])`. Queries are clamped to the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct BilinearTable {
    temperatures: Vec<f64>,
    pressures: Vec<f64>,
    values: Vec<f64>,
}

impl BilinearTable {
    pub fn new(temperatures: Vec<f64>, pressures: Vec<f64>, values: Vec<f64>) -> ThermoResult<Self> {
        if temperatures.len() < 2 || pressures.len() < 2 {
            return Err(ThermoError::InvalidArg {
                what: "bilinear table needs at least two points per axis",
            });
        }
        if values.len() != temperatures.len() * pressures.len() {
            return Err(ThermoError::InvalidArg {
                what: "bilinear table value count must equal grid size",
            });
        }
        let increasing = |v: &[f64]| v.windows(2).all(|w| w[1] > w[0]);
        if !increasing(&temperatures) || !increasing(&pressures) {
            return Err(ThermoError::InvalidArg {
                what: "bilinear table axes must be strictly increasing",
            });
        }
        Ok(Self {
            temperatures,
            pressures,
            values,
        })
    }

    /// Build a table by sampling `f(T, P)` on the grid.
    pub fn from_fn(
        temperatures: Vec<f64>,
        pressures: Vec<f64>,
        f: impl Fn(f64, f64) -> f64,
    ) -> ThermoResult<Self> {
        let mut values = Vec::with_capacity(temperatures.len() * pressures.len());
        for &p in &pressures {
            for &t in &temperatures {
                values.push(f(t, p));
            }
        }
        Self::new(temperatures, pressures, values)
    }

    pub fn eval(&self, t: f64, p: f64) -> f64 {
        let (it, ft) = bracket(&self.temperatures, t);
        let (ip, fp) = bracket(&self.pressures, p);
        let nt = self.temperatures.len();
        let at = |ip: usize, it: usize| self.values[ip * nt + it];

        let lower = at(ip, it) * (1.0 - ft) + at(ip, it + 1) * ft;
        let upper = at(ip + 1, it) * (1.0 - ft) + at(ip + 1, it + 1) * ft;
        lower * (1.0 - fp) + upper * fp
    }
}

/// Locate the cell containing `x` and the fractional position inside it.
fn bracket(axis: &[f64], x: f64) -> (usize, f64) {
    let last = axis.len() - 2;
    let cell = axis
        .windows(2)
        .position(|w| x < w[1])
        .unwrap_or(last)
        .min(last);
    let frac = ((x - axis[cell]) / (axis[cell + 1] - axis[cell])).clamp(0.0, 1.0);
    (cell, frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enthalpy_entropy_derivative_is_minus_entropy() {
        let g = GibbsCorrelation::EnthalpyEntropy {
            h0: -241_826.0,
            s0: 188.8,
        };
        assert!((g.value(300.0, 1e5) - (-241_826.0 - 300.0 * 188.8)).abs() < 1e-9);
        assert_eq!(g.ddt(300.0, 1e5), -188.8);
        assert_eq!(g.ddp(300.0, 1e5), 0.0);
    }

    #[test]
    fn lagrange_reproduces_quadratic() {
        let xi: Vec<f64> = (0..6).map(|i| 250.0 + 25.0 * i as f64).collect();
        let yi: Vec<f64> = xi.iter().map(|x| 2.0 * x * x - 3.0 * x + 1.0).collect();
        let curve = LagrangeCurve::new(xi, yi, 2).unwrap();

        for x in [260.0, 301.0, 333.3, 365.0] {
            let exact = 2.0 * x * x - 3.0 * x + 1.0;
            assert!((curve.eval(x) - exact).abs() < 1e-6 * exact.abs());
        }
    }

    #[test]
    fn lagrange_clamps_outside_range() {
        let curve = LagrangeCurve::new(vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0], 1).unwrap();
        assert_eq!(curve.eval(0.0), 10.0);
        assert_eq!(curve.eval(5.0), 30.0);
        assert!((curve.eval(2.5) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn lagrange_rejects_unsorted_points() {
        assert!(LagrangeCurve::new(vec![2.0, 1.0], vec![0.0, 0.0], 1).is_err());
        assert!(LagrangeCurve::new(vec![], vec![], 1).is_err());
    }

    #[test]
    fn bilinear_is_exact_for_bilinear_functions() {
        let f = |t: f64, p: f64| 3.0 * t + 2e-5 * p + 1e-7 * t * p;
        let table =
            BilinearTable::from_fn(vec![280.0, 300.0, 340.0], vec![1e5, 5e5, 1e6], f).unwrap();

        for (t, p) in [(290.0, 2e5), (330.0, 9e5), (300.0, 5e5)] {
            assert!((table.eval(t, p) - f(t, p)).abs() < 1e-8);
        }

        let g = GibbsCorrelation::Grid(table);
        assert!(g.includes_pressure());
        assert!((g.ddp(310.0, 3e5) - (2e-5 + 1e-7 * 310.0)).abs() < 1e-9);
        assert!((g.ddt(310.0, 3e5) - (3.0 + 1e-7 * 3e5)).abs() < 1e-6);
    }

    #[test]
    fn bilinear_rejects_bad_shapes() {
        assert!(BilinearTable::new(vec![1.0], vec![1.0, 2.0], vec![0.0, 0.0]).is_err());
        assert!(BilinearTable::new(vec![1.0, 2.0], vec![1.0, 2.0], vec![0.0; 3]).is_err());
    }
}
