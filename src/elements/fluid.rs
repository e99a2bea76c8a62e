//! Fluid properties for acoustic elements

use serde::{Deserialize, Serialize};

use crate::error::{FemError, FemResult};

/// Fluid filling the pipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fluid {
    /// Density in kg/m³
    pub density: f64,
    /// Speed of sound in m/s
    pub speed_of_sound: f64,
    /// Ratio of specific heats
    pub isentropic_exponent: f64,
    /// Thermal conductivity in W/(m·K)
    pub thermal_conductivity: f64,
    /// Specific heat at constant pressure in J/(kg·K)
    pub specific_heat_cp: f64,
    /// Dynamic viscosity in Pa·s
    pub dynamic_viscosity: f64,
}

impl Fluid {
    pub fn new(
        density: f64,
        speed_of_sound: f64,
        isentropic_exponent: f64,
        thermal_conductivity: f64,
        specific_heat_cp: f64,
        dynamic_viscosity: f64,
    ) -> Self {
        Self {
            density,
            speed_of_sound,
            isentropic_exponent,
            thermal_conductivity,
            specific_heat_cp,
            dynamic_viscosity,
        }
    }

    /// Dry air at 20 °C and 1 atm
    pub fn air() -> Self {
        Self::new(1.2041, 343.21, 1.4, 0.0257, 1005.0, 1.8206e-5)
    }

    /// Methane-rich natural gas at moderate pressure
    pub fn natural_gas() -> Self {
        Self::new(45.0, 430.0, 1.3, 0.04, 2600.0, 1.2e-5)
    }

    /// Characteristic impedance rho*c
    pub fn impedance(&self) -> f64 {
        self.density * self.speed_of_sound
    }

    pub fn kinematic_viscosity(&self) -> f64 {
        self.dynamic_viscosity / self.density
    }

    pub fn prandtl(&self) -> f64 {
        self.dynamic_viscosity * self.specific_heat_cp / self.thermal_conductivity
    }

    /// Adiabatic bulk modulus rho*c²
    pub fn bulk_modulus(&self) -> f64 {
        self.density * self.speed_of_sound.powi(2)
    }

    pub fn validate(&self) -> FemResult<()> {
        let positive = [
            self.density,
            self.speed_of_sound,
            self.thermal_conductivity,
            self.specific_heat_cp,
            self.dynamic_viscosity,
        ];
        if positive.iter().any(|v| !(*v > 0.0)) || self.isentropic_exponent < 1.0 {
            return Err(FemError::Configuration(format!(
                "fluid properties must be positive with gamma >= 1: {:?}",
                self
            )));
        }
        Ok(())
    }
}

impl Default for Fluid {
    fn default() -> Self {
        Self::air()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_properties() {
        let air = Fluid::air();
        assert!(air.validate().is_ok());
        assert!((air.prandtl() - 0.712).abs() < 0.01);
        assert!((air.impedance() - 413.3).abs() < 0.5);
    }
}
