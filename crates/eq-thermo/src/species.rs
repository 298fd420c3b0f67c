//! Chemical species definitions.

use crate::correlation::GibbsCorrelation;

/// A chemical species: element composition, charge, and standard-state data.
///
/// Built in a chained style:
///
/// ```
/// use eq_thermo::{GibbsCorrelation, Species};
///
/// let water = Species::new("H2O(aq)")
///     .with_element("H", 2.0)
///     .with_element("O", 1.0)
///     .with_gibbs(GibbsCorrelation::Constant(-237_140.0))
///     .with_standard_volume(1.807e-5);
/// assert_eq!(water.coefficient("H"), 2.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    name: String,
    elements: Vec<(String, f64)>,
    charge: f64,
    gibbs: GibbsCorrelation,
    standard_volume: f64,
}

impl Species {
    /// New species with no elements, zero charge, and `g° = 0`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
            charge: 0.0,
            gibbs: GibbsCorrelation::Constant(0.0),
            standard_volume: 0.0,
        }
    }

    /// Add `coefficient` atoms of `element`. Repeated elements accumulate.
    pub fn with_element(mut self, element: impl Into<String>, coefficient: f64) -> Self {
        let element = element.into();
        match self.elements.iter_mut().find(|(e, _)| *e == element) {
            Some((_, c)) => *c += coefficient,
            None => self.elements.push((element, coefficient)),
        }
        self
    }

    /// Electric charge in units of the elementary charge.
    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_gibbs(mut self, gibbs: GibbsCorrelation) -> Self {
        self.gibbs = gibbs;
        self
    }

    /// Standard molar volume [m³/mol]. Ignored for gas-phase species.
    pub fn with_standard_volume(mut self, volume: f64) -> Self {
        self.standard_volume = volume;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elements(&self) -> &[(String, f64)] {
        &self.elements
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn gibbs(&self) -> &GibbsCorrelation {
        &self.gibbs
    }

    pub fn standard_volume(&self) -> f64 {
        self.standard_volume
    }

    /// Stoichiometric coefficient of `element` (0 when absent).
    pub fn coefficient(&self, element: &str) -> f64 {
        self.elements
            .iter()
            .find(|(e, _)| e == element)
            .map_or(0.0, |(_, c)| *c)
    }
}
