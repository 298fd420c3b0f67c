//! Phases and their activity conventions.

use std::ops::Range;

/// Activity convention used for the species of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Ideal gas mixture: `ln a = ln x + ln(P/P°)`.
    IdealGas,
    /// Ideal condensed solution: `ln a = ln x`.
    IdealSolution,
    /// Dilute aqueous solution. The first species is the solvent (mole
    /// fraction activity); solutes use molality.
    Aqueous,
    /// Single pure condensed species: `ln a = 0`.
    Pure,
}

impl PhaseKind {
    pub fn is_gas(self) -> bool {
        matches!(self, PhaseKind::IdealGas)
    }
}

/// A phase: a contiguous block of species sharing an activity convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub(crate) name: String,
    pub(crate) kind: PhaseKind,
    pub(crate) species: Range<usize>,
}

impl Phase {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PhaseKind {
        self.kind
    }

    /// Indices of the phase's species in the system ordering.
    pub fn species_range(&self) -> Range<usize> {
        self.species.clone()
    }

    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    /// Total amount of the phase [mol].
    pub fn amount(&self, n: &[f64]) -> f64 {
        n[self.species.clone()].iter().sum()
    }
}
