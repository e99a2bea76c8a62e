//! Equivalent nodal loads of line elements in the local frame
//!
//! Local DOF order is [u1, v1, w1, θx1, θy1, θz1, u2, v2, w2, θx2, θy2, θz2].

use serde::{Deserialize, Serialize};

use crate::elements::{CrossSection, Material};
use crate::math::{Vec12, Vec3};

/// Internal and external static pressure acting on a pipe element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureLoad {
    /// Internal pressure in Pa (gauge)
    pub internal: f64,
    /// External pressure in Pa (gauge)
    pub external: f64,
    /// Closed ends carry the pressure thrust into the wall
    pub capped_end: bool,
}

impl PressureLoad {
    pub fn new(internal: f64, external: f64, capped_end: bool) -> Self {
        Self {
            internal,
            external,
            capped_end,
        }
    }

    /// Lamé mean stress factor q = (p_i d_i² − p_e d_o²)/(d_o² − d_i²)
    pub fn mean_stress(&self, section: &CrossSection) -> f64 {
        let d_o = section.outer_diameter();
        let d_i = section.inner_diameter;
        let denom = d_o * d_o - d_i * d_i;
        if denom <= 0.0 {
            return 0.0;
        }
        (self.internal * d_i * d_i - self.external * d_o * d_o) / denom
    }

    /// Axial force induced in the wall, positive when it elongates the element
    pub fn axial_force(&self, section: &CrossSection, material: &Material) -> f64 {
        let q = self.mean_stress(section);
        if self.capped_end {
            section.area * (1.0 - 2.0 * material.nu) * q
        } else {
            -2.0 * material.nu * section.area * q
        }
    }

    /// Hoop stress from the thin-wall formula
    pub fn hoop_stress(&self, section: &CrossSection) -> f64 {
        let t = section.thickness();
        if t <= 0.0 {
            return 0.0;
        }
        (self.internal * section.inner_diameter - self.external * section.outer_diameter()) / (2.0 * t)
    }
}

/// Axial force from a uniform temperature change, positive when elongating
pub fn thermal_axial_force(section: &CrossSection, material: &Material, delta_t: f64) -> f64 {
    material.e * section.area * material.thermal_expansion * delta_t
}

/// Equivalent nodal loads of an axial force pair
///
/// A positive force pushes the end nodes apart.
pub fn axial_force_pair(force: f64) -> Vec12 {
    let mut f = Vec12::zeros();
    f[0] = -force;
    f[6] = force;
    f
}

/// Equivalent nodal loads for a uniformly distributed load
///
/// `w` holds the local intensities (force per unit length) along x, y and z.
/// These are the negated fixed-end reactions of a fully fixed member.
pub fn uniform_load(w: &Vec3, length: f64) -> Vec12 {
    let l = length;
    let l2 = l * l;

    let mut f = Vec12::zeros();

    // Axial
    f[0] = w[0] * l / 2.0;
    f[6] = w[0] * l / 2.0;

    // Local y: shear and θz moments
    f[1] = w[1] * l / 2.0;
    f[5] = w[1] * l2 / 12.0;
    f[7] = w[1] * l / 2.0;
    f[11] = -w[1] * l2 / 12.0;

    // Local z: shear and θy moments (θy = −dw/dx)
    f[2] = w[2] * l / 2.0;
    f[4] = -w[2] * l2 / 12.0;
    f[8] = w[2] * l / 2.0;
    f[10] = w[2] * l2 / 12.0;

    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_capped_end_thrust() {
        let section = CrossSection::pipe(0.1, 0.005);
        let steel = Material::steel();
        let load = PressureLoad::new(1.0e6, 0.0, true);

        let d_i = section.inner_diameter;
        let q = 1.0e6 * d_i * d_i / (0.01 - d_i * d_i);
        assert_relative_eq!(load.mean_stress(&section), q, epsilon = 1e-6);
        assert_relative_eq!(
            load.axial_force(&section, &steel),
            section.area * 0.4 * q,
            epsilon = 1e-6
        );

        let open = PressureLoad::new(1.0e6, 0.0, false);
        assert!(open.axial_force(&section, &steel) < 0.0);
    }

    #[test]
    fn test_uniform_load_resultant() {
        let w = Vec3::new(0.0, -100.0, 50.0);
        let f = uniform_load(&w, 2.0);
        assert_relative_eq!(f[1] + f[7], -200.0, epsilon = 1e-12);
        assert_relative_eq!(f[2] + f[8], 100.0, epsilon = 1e-12);
        // End moments cancel for a symmetric load
        assert_relative_eq!(f[5] + f[11], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_thermal_force() {
        let section = CrossSection::pipe(0.1, 0.005);
        let steel = Material::steel();
        let f = thermal_axial_force(&section, &steel, 50.0);
        assert_relative_eq!(f, 210e9 * section.area * 1.2e-5 * 50.0, epsilon = 1e-6);
    }
}
