//! Perforated plate (orifice) impedance

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::Fluid;
use crate::error::{FemError, FemResult};

/// Perforated plate placed between the two nodes of an acoustic element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerforatedPlate {
    /// Hole diameter in m
    pub hole_diameter: f64,
    /// Plate thickness in m
    pub thickness: f64,
    /// Open area ratio σ
    pub porosity: f64,
    /// Discharge coefficient of the holes
    pub discharge_coefficient: f64,
    /// Add the velocity-dependent resistance
    pub nonlinear: bool,
}

impl PerforatedPlate {
    pub fn new(hole_diameter: f64, thickness: f64, porosity: f64) -> Self {
        Self {
            hole_diameter,
            thickness,
            porosity,
            discharge_coefficient: 0.76,
            nonlinear: false,
        }
    }

    pub fn with_nonlinear_resistance(mut self, discharge_coefficient: f64) -> Self {
        self.discharge_coefficient = discharge_coefficient;
        self.nonlinear = true;
        self
    }

    pub fn validate(&self) -> FemResult<()> {
        if !(self.hole_diameter > 0.0 && self.thickness > 0.0) {
            return Err(FemError::Configuration(
                "perforated plate requires positive hole diameter and thickness".to_string(),
            ));
        }
        if !(self.porosity > 0.0 && self.porosity <= 1.0) || !(self.discharge_coefficient > 0.0) {
            return Err(FemError::Configuration(format!(
                "perforated plate porosity {} or discharge coefficient {} out of range",
                self.porosity, self.discharge_coefficient
            )));
        }
        Ok(())
    }

    /// Linear specific impedance: viscous resistance plus end-corrected mass reactance
    pub fn linear_impedance(&self, omega: f64, fluid: &Fluid) -> Complex64 {
        let sigma = self.porosity;
        let d = self.hole_diameter;
        let t = self.thickness;
        let rho = fluid.density;

        let resistance = (8.0 * fluid.dynamic_viscosity * rho * omega).sqrt() * (1.0 + t / d);
        let end_correction = 0.85 * d * (1.0 - 0.7 * sigma.sqrt());
        let reactance = omega * rho * (t + end_correction);

        Complex64::new(resistance, reactance) / sigma
    }

    /// Nonlinear resistance for the particle velocity amplitude approaching the plate
    pub fn nonlinear_resistance(&self, fluid: &Fluid, particle_velocity: f64) -> f64 {
        if !self.nonlinear {
            return 0.0;
        }
        let sigma = self.porosity;
        let cd = self.discharge_coefficient;
        fluid.density * (1.0 - sigma * sigma) * particle_velocity.abs()
            / (2.0 * cd * cd * sigma * sigma)
    }

    /// Total specific impedance
    pub fn impedance(&self, omega: f64, fluid: &Fluid, particle_velocity: f64) -> Complex64 {
        self.linear_impedance(omega, fluid) + self.nonlinear_resistance(fluid, particle_velocity)
    }

    /// Admittance coefficients [y11, y12, y21, y22] of a plate of area `area`
    pub fn admittance(area: f64, impedance: Complex64) -> [Complex64; 4] {
        let y = area / impedance;
        [y, -y, -y, y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_impedance_is_causal() {
        let plate = PerforatedPlate::new(0.003, 0.002, 0.1);
        let z = plate.linear_impedance(2.0 * std::f64::consts::PI * 500.0, &Fluid::air());
        assert!(z.re > 0.0);
        assert!(z.im > 0.0);
    }

    #[test]
    fn test_nonlinear_resistance_grows_with_velocity() {
        let plate = PerforatedPlate::new(0.003, 0.002, 0.1).with_nonlinear_resistance(0.7);
        let air = Fluid::air();
        assert!(plate.nonlinear_resistance(&air, 2.0) > plate.nonlinear_resistance(&air, 1.0));
        let linear = PerforatedPlate::new(0.003, 0.002, 0.1);
        assert_eq!(linear.nonlinear_resistance(&air, 2.0), 0.0);
    }

    #[test]
    fn test_invalid_porosity() {
        assert!(PerforatedPlate::new(0.003, 0.002, 1.5).validate().is_err());
    }
}
