//! Energy units.
//!
//! The library works in kJ/mol throughout. Heights and thermal energies given
//! in other units are converted once, when a configuration is loaded.

use phf::{Map, phf_map};
use thiserror::Error;

/// Boltzmann constant in kJ/(mol·K).
pub const BOLTZMANN_KJ_PER_MOL_K: f64 = 0.008_314_462_618_153_24;

static ENERGY_UNITS: Map<&'static str, f64> = phf_map! {
    "kj/mol" => 1.0,
    "j/mol" => 0.001,
    "kcal/mol" => 4.184,
    "ev" => 96.485_332_123_310_02,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown energy unit '{0}' (expected one of kj/mol, j/mol, kcal/mol, ev, kt)")]
    Unknown(String),
    #[error("Energies in units of kT require a positive temperature")]
    TemperatureRequired,
}

/// Thermal energy `k_B T` in kJ/mol.
pub fn thermal_energy(temperature_k: f64) -> f64 {
    BOLTZMANN_KJ_PER_MOL_K * temperature_k
}

/// Factor converting a value in `unit` to kJ/mol.
///
/// `kt` is accepted when a temperature is known.
pub fn conversion_factor(unit: &str, temperature_k: Option<f64>) -> Result<f64, UnitError> {
    let key = unit.trim().to_ascii_lowercase();
    if key == "kt" {
        return match temperature_k {
            Some(t) if t > 0.0 => Ok(thermal_energy(t)),
            _ => Err(UnitError::TemperatureRequired),
        };
    }
    ENERGY_UNITS
        .get(key.as_str())
        .copied()
        .ok_or(UnitError::Unknown(unit.to_string()))
}
