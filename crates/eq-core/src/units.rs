// eq-core/src/units.rs

use uom::si::f64::{
    AmountOfSubstance as UomAmount, MolarEnergy as UomMolarEnergy, Pressure as UomPressure,
    ThermodynamicTemperature as UomThermodynamicTemperature, Time as UomTime,
    Volume as UomVolume,
};

// Public canonical unit types (SI, f64)
pub type Amount = UomAmount;
pub type MolarEnergy = UomMolarEnergy;
pub type Pressure = UomPressure;
pub type Temperature = UomThermodynamicTemperature;
pub type Time = UomTime;
pub type Volume = UomVolume;

#[inline]
pub fn pa(v: f64) -> Pressure {
    use uom::si::pressure::pascal;
    Pressure::new::<pascal>(v)
}

#[inline]
pub fn bar(v: f64) -> Pressure {
    use uom::si::pressure::bar;
    Pressure::new::<bar>(v)
}

#[inline]
pub fn k(v: f64) -> Temperature {
    use uom::si::thermodynamic_temperature::kelvin;
    Temperature::new::<kelvin>(v)
}

#[inline]
pub fn celsius(v: f64) -> Temperature {
    use uom::si::thermodynamic_temperature::degree_celsius;
    Temperature::new::<degree_celsius>(v)
}

#[inline]
pub fn mol(v: f64) -> Amount {
    use uom::si::amount_of_substance::mole;
    Amount::new::<mole>(v)
}

#[inline]
pub fn j_per_mol(v: f64) -> MolarEnergy {
    use uom::si::molar_energy::joule_per_mole;
    MolarEnergy::new::<joule_per_mole>(v)
}

#[inline]
pub fn m3(v: f64) -> Volume {
    use uom::si::volume::cubic_meter;
    Volume::new::<cubic_meter>(v)
}

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

pub mod constants {
    /// Universal gas constant [J/(mol·K)].
    pub const R: f64 = 8.314_462_618;

    /// Standard-state pressure [Pa].
    pub const P_REF: f64 = 1.0e5;

    /// Standard-state temperature [K].
    pub const T_REF: f64 = 298.15;

    /// Molar mass of water [kg/mol], used for molalities.
    pub const WATER_MOLAR_MASS: f64 = 0.018_015_268;

    /// ln(10), the natural-to-decimal log conversion for pH.
    pub const LN_10: f64 = std::f64::consts::LN_10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_smoke() {
        let _p = pa(101_325.0);
        let _t = k(300.0);
        let _n = mol(1.5);
        let _g = j_per_mol(-237_140.0);
        let _v = m3(1e-3);
        let _dt = s(0.1);
    }

    #[test]
    fn si_values_are_base_units() {
        assert!((bar(1.0).value - 1.0e5).abs() < 1e-9);
        assert!((celsius(25.0).value - constants::T_REF).abs() < 1e-9);
        assert!((mol(2.0).value - 2.0).abs() < 1e-15);
    }
}
