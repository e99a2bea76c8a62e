//! Material properties

use serde::{Deserialize, Serialize};

use crate::error::{FemError, FemResult};

/// Linear elastic material used by structural elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Modulus of elasticity (Young's modulus) in Pa
    pub e: f64,
    /// Shear modulus in Pa
    pub g: f64,
    /// Poisson's ratio
    pub nu: f64,
    /// Density in kg/m³
    pub rho: f64,
    /// Linear thermal expansion coefficient in 1/K
    pub thermal_expansion: f64,
}

impl Material {
    /// Create a new material with given properties
    pub fn new(e: f64, g: f64, nu: f64, rho: f64) -> Self {
        Self {
            e,
            g,
            nu,
            rho,
            thermal_expansion: 0.0,
        }
    }

    /// Create a new isotropic material from E and nu
    /// G is calculated as E / (2 * (1 + nu))
    pub fn isotropic(e: f64, nu: f64, rho: f64) -> Self {
        let g = e / (2.0 * (1.0 + nu));
        Self::new(e, g, nu, rho)
    }

    /// Set the thermal expansion coefficient
    pub fn with_thermal_expansion(mut self, alpha: f64) -> Self {
        self.thermal_expansion = alpha;
        self
    }

    /// Carbon steel used for process piping
    pub fn steel() -> Self {
        Self::isotropic(210e9, 0.3, 7860.0).with_thermal_expansion(1.2e-5)
    }

    /// Austenitic stainless steel
    pub fn stainless_steel() -> Self {
        Self::isotropic(193e9, 0.29, 8000.0).with_thermal_expansion(1.73e-5)
    }

    /// Check the properties are physically admissible
    pub fn validate(&self) -> FemResult<()> {
        if !(self.e > 0.0 && self.g > 0.0 && self.rho > 0.0) {
            return Err(FemError::Configuration(format!(
                "material requires positive E, G and density (E={}, G={}, rho={})",
                self.e, self.g, self.rho
            )));
        }
        if !(self.nu > -1.0 && self.nu < 0.5) {
            return Err(FemError::Configuration(format!(
                "Poisson ratio {} outside (-1, 0.5)",
                self.nu
            )));
        }
        Ok(())
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::steel()
    }
}
