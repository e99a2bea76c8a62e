//! Cross-section properties for pipe and beam elements

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{FemError, FemResult};

/// Geometric family of a cross section
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SectionShape {
    /// Circular tube, carries fluid inside
    Pipe {
        outer_diameter: f64,
        thickness: f64,
    },
    /// Generic beam section given by its properties
    Beam,
}

/// Cross-section properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSection {
    pub shape: SectionShape,
    /// Cross-sectional area in m²
    pub area: f64,
    /// Second moment of area about local y-axis in m⁴
    pub iy: f64,
    /// Second moment of area about local z-axis in m⁴
    pub iz: f64,
    /// Product of inertia in m⁴ (non-zero for unsymmetric sections)
    pub iyz: f64,
    /// Torsional constant in m⁴
    pub j: f64,
    /// Shear correction factor; `None` derives it from the shape
    pub shear_coefficient: Option<f64>,
    /// Include shear flexibility (Timoshenko). False gives the Euler-Bernoulli limit.
    pub shear_deformation: bool,
    /// Centroid offset from the element axis along local y in m
    pub offset_y: f64,
    /// Centroid offset from the element axis along local z in m
    pub offset_z: f64,
    /// Non-structural mass per unit length (insulation, lining) in kg/m
    pub added_mass: f64,
    /// Inner diameter seen by the fluid in m
    pub inner_diameter: f64,
}

impl CrossSection {
    /// Create a hollow circular (pipe) section
    pub fn pipe(outer_diameter: f64, thickness: f64) -> Self {
        let r_o = outer_diameter / 2.0;
        let r_i = r_o - thickness;

        let a = PI * (r_o.powi(2) - r_i.powi(2));
        let i = PI * (r_o.powi(4) - r_i.powi(4)) / 4.0;
        let j = 2.0 * i;

        Self {
            shape: SectionShape::Pipe {
                outer_diameter,
                thickness,
            },
            area: a,
            iy: i,
            iz: i,
            iyz: 0.0,
            j,
            shear_coefficient: None,
            shear_deformation: true,
            offset_y: 0.0,
            offset_z: 0.0,
            added_mass: 0.0,
            inner_diameter: 2.0 * r_i,
        }
    }

    /// Create a generic beam section with basic properties
    pub fn beam(a: f64, iy: f64, iz: f64, j: f64) -> Self {
        Self {
            shape: SectionShape::Beam,
            area: a,
            iy,
            iz,
            iyz: 0.0,
            j,
            shear_coefficient: None,
            shear_deformation: true,
            offset_y: 0.0,
            offset_z: 0.0,
            added_mass: 0.0,
            inner_diameter: 0.0,
        }
    }

    /// Create a rectangular section
    pub fn rectangular(width: f64, depth: f64) -> Self {
        let a = width * depth;
        let iy = width * depth.powi(3) / 12.0;
        let iz = depth * width.powi(3) / 12.0;

        // Torsional constant for rectangle (approximate)
        let (a_dim, b_dim) = if width > depth { (width, depth) } else { (depth, width) };
        let j = a_dim * b_dim.powi(3) / 3.0 * (1.0 - 0.63 * b_dim / a_dim);

        Self::beam(a, iy, iz, j).with_shear_coefficient(5.0 / 6.0)
    }

    /// Section used only by acoustic elements (duct with no wall properties)
    pub fn duct(inner_diameter: f64) -> Self {
        let mut section = Self::beam(0.0, 0.0, 0.0, 0.0);
        section.inner_diameter = inner_diameter;
        section
    }

    /// Set the product of inertia
    pub fn with_product_of_inertia(mut self, iyz: f64) -> Self {
        self.iyz = iyz;
        self
    }

    /// Set the centroid offset
    pub fn with_offset(mut self, offset_y: f64, offset_z: f64) -> Self {
        self.offset_y = offset_y;
        self.offset_z = offset_z;
        self
    }

    /// Set an explicit shear correction factor
    pub fn with_shear_coefficient(mut self, kappa: f64) -> Self {
        self.shear_coefficient = Some(kappa);
        self
    }

    /// Neglect shear flexibility
    pub fn without_shear_deformation(mut self) -> Self {
        self.shear_deformation = false;
        self
    }

    /// Add non-structural mass per unit length
    pub fn with_added_mass(mut self, mass_per_length: f64) -> Self {
        self.added_mass = mass_per_length;
        self
    }

    /// Area open to the fluid
    pub fn fluid_area(&self) -> f64 {
        PI * self.inner_diameter.powi(2) / 4.0
    }

    /// Outer diameter, zero for generic beams
    pub fn outer_diameter(&self) -> f64 {
        match self.shape {
            SectionShape::Pipe { outer_diameter, .. } => outer_diameter,
            SectionShape::Beam => 0.0,
        }
    }

    /// Wall thickness, zero for generic beams
    pub fn thickness(&self) -> f64 {
        match self.shape {
            SectionShape::Pipe { thickness, .. } => thickness,
            SectionShape::Beam => 0.0,
        }
    }

    /// Polar moment of inertia
    pub fn ip(&self) -> f64 {
        self.iy + self.iz
    }

    /// Shear correction factor for a given Poisson ratio
    ///
    /// Tubes use Cowper's expression for a hollow circle.
    pub fn shear_factor(&self, nu: f64) -> f64 {
        if let Some(kappa) = self.shear_coefficient {
            return kappa;
        }
        match self.shape {
            SectionShape::Pipe {
                outer_diameter,
                thickness,
            } => {
                let m = (outer_diameter - 2.0 * thickness) / outer_diameter;
                let m2 = m * m;
                let q = (1.0 + m2).powi(2);
                6.0 * (1.0 + nu) * q / ((7.0 + 6.0 * nu) * q + (20.0 + 12.0 * nu) * m2)
            }
            SectionShape::Beam => 5.0 / 6.0,
        }
    }

    /// Principal second moments and the angle from local y to the first principal axis
    pub fn principal_axes(&self) -> (f64, f64, f64) {
        if self.iyz.abs() < 1e-16 * (self.iy + self.iz).max(1e-30) {
            return (self.iy, self.iz, 0.0);
        }
        let mean = 0.5 * (self.iy + self.iz);
        let half_diff = 0.5 * (self.iy - self.iz);
        let radius = (half_diff.powi(2) + self.iyz.powi(2)).sqrt();
        let angle = 0.5 * (-2.0 * self.iyz).atan2(self.iy - self.iz);
        (mean + radius, mean - radius, angle)
    }

    /// Check the section can be used by a structural element
    pub fn validate_structural(&self) -> FemResult<()> {
        if !(self.area > 0.0 && self.iy > 0.0 && self.iz > 0.0 && self.j > 0.0) {
            return Err(FemError::Configuration(format!(
                "cross section requires positive A, Iy, Iz and J (A={}, Iy={}, Iz={}, J={})",
                self.area, self.iy, self.iz, self.j
            )));
        }
        let (i1, i2, _) = self.principal_axes();
        if i2 <= 0.0 || i1 <= 0.0 {
            return Err(FemError::Configuration(
                "product of inertia gives a non-positive principal moment".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the section can be used by an acoustic element
    pub fn validate_acoustic(&self) -> FemResult<()> {
        if self.inner_diameter <= 0.0 {
            return Err(FemError::Configuration(
                "acoustic element requires a positive inner diameter".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CrossSection {
    fn default() -> Self {
        // DN50 schedule 40
        Self::pipe(0.0603, 0.00391)
    }
}
