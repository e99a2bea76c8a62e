//! Timoshenko pipe/beam element and special structural devices
//!
//! Local DOF order is [u1, v1, w1, θx1, θy1, θz1, u2, v2, w2, θx2, θy2, θz2].
//! Bending in the local x-y plane uses Iz and the DOFs (v, θz); bending in
//! the x-z plane uses Iy and (w, θy) with θy = −dw/dx.

use std::sync::Arc;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{CrossSection, Fluid, Material};
use crate::error::{FemError, FemResult};
use crate::loads::{axial_force_pair, thermal_axial_force, uniform_load, PressureLoad};
use crate::math::{
    element_rotation, gauss_legendre, geometric_stiffness, offset_transformation,
    transformation_matrix, Mat12, Mat3, Vec12, Vec3,
};

const XY_PLANE: [usize; 4] = [1, 5, 7, 11];
const XZ_PLANE: [usize; 4] = [2, 4, 8, 10];
const XZ_SIGN: [f64; 4] = [1.0, -1.0, 1.0, -1.0];

/// Spring constants and effective mass of an expansion joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpansionJoint {
    pub axial_stiffness: f64,
    pub transversal_stiffness: f64,
    pub torsional_stiffness: f64,
    pub rotational_stiffness: f64,
    /// Effective mass in kg, split between the two nodes
    pub effective_mass: f64,
}

/// Valve modelled as a stiffened pipe segment with added mass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valve {
    pub stiffening_factor: f64,
    /// Valve mass in kg, distributed along the element
    pub mass: f64,
}

/// Formulation used by a structural element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum StructuralElementType {
    /// Tube with Cowper shear factor, carries internal fluid mass and pressure loads
    #[default]
    Pipe,
    /// Generic Timoshenko beam
    Beam,
    ExpansionJoint(ExpansionJoint),
    Valve(Valve),
}

impl StructuralElementType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pipe => "pipe",
            Self::Beam => "beam",
            Self::ExpansionJoint(_) => "expansion_joint",
            Self::Valve(_) => "valve",
        }
    }
}

/// Released rotational DOFs (global frame) at each end of an element
///
/// Models a free rotational hinge at a T-junction: the element does not
/// transfer the masked rotations to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecouplingMask {
    pub first: [bool; 3],
    pub last: [bool; 3],
}

impl DecouplingMask {
    pub fn is_empty(&self) -> bool {
        !self.first.iter().chain(self.last.iter()).any(|&b| b)
    }

    fn released_dofs(&self) -> impl Iterator<Item = usize> + '_ {
        let first = self.first.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| 3 + i);
        let last = self.last.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| 9 + i);
        first.chain(last)
    }

    /// Zero the released rows and columns
    pub fn apply(&self, m: &mut Mat12) {
        if self.is_empty() {
            return;
        }
        for dof in self.released_dofs() {
            m.row_mut(dof).fill(0.0);
            m.column_mut(dof).fill(0.0);
        }
    }
}

/// Length and orientation of an element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementGeometry {
    pub length: f64,
    /// Rows are the local axes in global coordinates
    pub rotation: Mat3,
}

/// Local end forces [N, Vy, Vz, T, My, Mz] at both nodes
pub type InternalLoads = [Complex64; 12];

/// Stress amplitudes at the most loaded end of a pipe element
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PipeStress {
    pub axial: f64,
    pub bending: f64,
    pub torsional: f64,
    pub transverse_shear: f64,
    pub hoop: f64,
    pub von_mises: f64,
}

/// A two-node structural element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralElement {
    pub index: usize,
    /// External index of the first node
    pub first_node: usize,
    /// External index of the last node
    pub last_node: usize,
    pub element_type: StructuralElementType,
    pub material: Option<Arc<Material>>,
    pub cross_section: Option<Arc<CrossSection>>,
    /// Fluid inside a pipe, adds its mass to the element
    pub fluid: Option<Arc<Fluid>>,
    /// Rotation about the element axis in radians
    pub twist: f64,
    pub decoupling: DecouplingMask,
    pub pressure: Option<PressureLoad>,
    /// Uniform temperature change in K
    pub temperature_change: f64,
}

impl StructuralElement {
    pub fn new(index: usize, first_node: usize, last_node: usize) -> Self {
        Self {
            index,
            first_node,
            last_node,
            element_type: StructuralElementType::Pipe,
            material: None,
            cross_section: None,
            fluid: None,
            twist: 0.0,
            decoupling: DecouplingMask::default(),
            pressure: None,
            temperature_change: 0.0,
        }
    }

    pub fn with_type(mut self, element_type: StructuralElementType) -> Self {
        self.element_type = element_type;
        self
    }

    pub fn with_material(mut self, material: Arc<Material>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_cross_section(mut self, section: Arc<CrossSection>) -> Self {
        self.cross_section = Some(section);
        self
    }

    fn material(&self) -> FemResult<&Material> {
        self.material
            .as_deref()
            .ok_or(FemError::MissingMaterial(self.index))
    }

    fn section(&self) -> FemResult<&CrossSection> {
        self.cross_section
            .as_deref()
            .ok_or(FemError::MissingCrossSection(self.index))
    }

    /// Check that the element can produce its matrices
    pub fn validate(&self) -> FemResult<()> {
        match self.element_type {
            StructuralElementType::ExpansionJoint(joint) => {
                let springs = [
                    joint.axial_stiffness,
                    joint.transversal_stiffness,
                    joint.torsional_stiffness,
                    joint.rotational_stiffness,
                ];
                if springs.iter().any(|k| *k < 0.0) || joint.effective_mass < 0.0 {
                    return Err(FemError::Configuration(format!(
                        "expansion joint on element {} has negative properties",
                        self.index
                    )));
                }
                Ok(())
            }
            _ => {
                self.material()?.validate()?;
                self.section()?.validate_structural()
            }
        }
    }

    /// Element length and direction cosines, including principal-axis rotation
    pub fn geometry(&self, first: &[f64; 3], last: &[f64; 3]) -> FemResult<ElementGeometry> {
        let principal = match (&self.element_type, self.cross_section.as_deref()) {
            (StructuralElementType::ExpansionJoint(_), _) | (_, None) => 0.0,
            (_, Some(section)) => section.principal_axes().2,
        };
        let rotation = element_rotation(first, last, self.twist + principal)?;
        let length = Vec3::new(last[0] - first[0], last[1] - first[1], last[2] - first[2]).norm();
        Ok(ElementGeometry { length, rotation })
    }

    /// Mass per unit length including added and fluid mass
    pub fn mass_per_length(&self) -> FemResult<f64> {
        let material = self.material()?;
        let section = self.section()?;
        let fluid_mass = match (&self.element_type, self.fluid.as_deref()) {
            (StructuralElementType::Pipe | StructuralElementType::Valve(_), Some(fluid)) => {
                fluid.density * section.fluid_area()
            }
            _ => 0.0,
        };
        Ok(material.rho * section.area + section.added_mass + fluid_mass)
    }

    /// Shear deformation parameters (Φ for x-y bending, Φ for x-z bending)
    fn shear_parameters(&self, length: f64) -> FemResult<(f64, f64)> {
        let material = self.material()?;
        let section = self.section()?;
        if !section.shear_deformation {
            return Ok((0.0, 0.0));
        }
        let (iy, iz) = self.principal_moments()?;
        let kappa = section.shear_factor(material.nu);
        let kga_l2 = kappa * material.g * section.area * length * length;
        Ok((12.0 * material.e * iz / kga_l2, 12.0 * material.e * iy / kga_l2))
    }

    /// Second moments in the principal frame (Iy, Iz)
    fn principal_moments(&self) -> FemResult<(f64, f64)> {
        let (i1, i2, _) = self.section()?.principal_axes();
        Ok((i1, i2))
    }

    /// Local stiffness matrix at the nodes
    pub fn local_stiffness(&self, length: f64) -> FemResult<Mat12> {
        match self.element_type {
            StructuralElementType::ExpansionJoint(joint) => Ok(expansion_joint_stiffness(&joint)),
            StructuralElementType::Valve(valve) => {
                Ok(self.timoshenko_stiffness(length)? * valve.stiffening_factor)
            }
            StructuralElementType::Pipe | StructuralElementType::Beam => {
                self.timoshenko_stiffness(length)
            }
        }
    }

    /// Local consistent mass matrix at the nodes
    pub fn local_mass(&self, length: f64) -> FemResult<Mat12> {
        match self.element_type {
            StructuralElementType::ExpansionJoint(joint) => {
                let mut m = Mat12::zeros();
                let half = joint.effective_mass / 2.0;
                for dof in [0, 1, 2, 6, 7, 8] {
                    m[(dof, dof)] = half;
                }
                Ok(m)
            }
            StructuralElementType::Valve(valve) => {
                let mut m = self.timoshenko_mass(length)?;
                let added = translational_mass(valve.mass / length, length);
                m += added;
                Ok(m)
            }
            StructuralElementType::Pipe | StructuralElementType::Beam => {
                self.timoshenko_mass(length)
            }
        }
    }

    fn timoshenko_stiffness(&self, length: f64) -> FemResult<Mat12> {
        let material = self.material()?;
        let section = self.section()?;
        let (iy, iz) = self.principal_moments()?;
        let (phi_y, phi_z) = self.shear_parameters(length)?;
        let l = length;

        let mut k = Mat12::zeros();

        // Axial and torsion from linear shape functions, 1-point Gauss
        let (points, weights) = gauss_legendre(1);
        let jac = l / 2.0;
        let db = [-1.0 / l, 1.0 / l];
        for (_, w) in points.iter().zip(weights) {
            for a in 0..2 {
                for b in 0..2 {
                    let bb = db[a] * db[b] * w * jac;
                    k[(6 * a, 6 * b)] += material.e * section.area * bb;
                    k[(6 * a + 3, 6 * b + 3)] += material.g * section.j * bb;
                }
            }
        }

        let kxy = bending_stiffness(material.e * iz, phi_y, l);
        let kxz = bending_stiffness(material.e * iy, phi_z, l);
        for a in 0..4 {
            for b in 0..4 {
                k[(XY_PLANE[a], XY_PLANE[b])] = kxy[a][b];
                k[(XZ_PLANE[a], XZ_PLANE[b])] = XZ_SIGN[a] * XZ_SIGN[b] * kxz[a][b];
            }
        }

        Ok(self.to_node_line(k))
    }

    fn timoshenko_mass(&self, length: f64) -> FemResult<Mat12> {
        let material = self.material()?;
        let section = self.section()?;
        let (iy, iz) = self.principal_moments()?;
        let (phi_y, phi_z) = self.shear_parameters(length)?;
        let l = length;
        let mu = self.mass_per_length()?;

        let mut m = Mat12::zeros();

        // Axial and torsional inertia, 2-point Gauss
        let (points, weights) = gauss_legendre(2);
        let jac = l / 2.0;
        for (xi, w) in points.iter().zip(weights) {
            let n = [(1.0 - xi) / 2.0, (1.0 + xi) / 2.0];
            for a in 0..2 {
                for b in 0..2 {
                    let nn = n[a] * n[b] * w * jac;
                    m[(6 * a, 6 * b)] += mu * nn;
                    m[(6 * a + 3, 6 * b + 3)] += material.rho * section.ip() * nn;
                }
            }
        }

        let mxy = bending_mass(mu, material.rho * iz, phi_y, l);
        let mxz = bending_mass(mu, material.rho * iy, phi_z, l);
        for a in 0..4 {
            for b in 0..4 {
                m[(XY_PLANE[a], XY_PLANE[b])] = mxy[a][b];
                m[(XZ_PLANE[a], XZ_PLANE[b])] = XZ_SIGN[a] * XZ_SIGN[b] * mxz[a][b];
            }
        }

        Ok(self.to_node_line(m))
    }

    /// Move a centroid-based matrix to the node line when the section is offset
    fn to_node_line(&self, m: Mat12) -> Mat12 {
        match self.cross_section.as_deref() {
            Some(s) if s.offset_y != 0.0 || s.offset_z != 0.0 => {
                let t = offset_transformation(s.offset_y, s.offset_z);
                t.transpose() * m * t
            }
            _ => m,
        }
    }

    /// Global stiffness and mass matrices
    ///
    /// `static_local` is the local displacement of a static pre-solution; when
    /// given, the geometric stiffness of the resulting axial force is added.
    pub fn global_matrices(
        &self,
        geometry: &ElementGeometry,
        static_local: Option<&Vec12>,
    ) -> FemResult<(Mat12, Mat12)> {
        let mut k_local = self.local_stiffness(geometry.length)?;
        let m_local = self.local_mass(geometry.length)?;

        if let Some(u) = static_local {
            if !matches!(self.element_type, StructuralElementType::ExpansionJoint(_)) {
                let section = self.section()?;
                let n = self.axial_force(geometry.length, u)?;
                k_local += geometric_stiffness(n, section.ip() / section.area, geometry.length);
            }
        }

        let t = transformation_matrix(&geometry.rotation);
        let mut k = t.transpose() * k_local * t;
        let mut m = t.transpose() * m_local * t;
        self.decoupling.apply(&mut k);
        self.decoupling.apply(&mut m);
        Ok((k, m))
    }

    /// Axial force (tension positive) from a local displacement vector
    pub fn axial_force(&self, length: f64, u_local: &Vec12) -> FemResult<f64> {
        let k = self.local_stiffness(length)?;
        let f = k * u_local;
        Ok(f[6])
    }

    /// Equivalent global nodal loads of pressure thrust and thermal expansion
    pub fn pressure_thermal_load(&self, geometry: &ElementGeometry) -> FemResult<Vec12> {
        if matches!(self.element_type, StructuralElementType::ExpansionJoint(_)) {
            return Ok(Vec12::zeros());
        }
        let material = self.material()?;
        let section = self.section()?;

        let mut force = 0.0;
        if let (Some(pressure), StructuralElementType::Pipe | StructuralElementType::Valve(_)) =
            (self.pressure, self.element_type)
        {
            force += pressure.axial_force(section, material);
        }
        if self.temperature_change != 0.0 {
            force += thermal_axial_force(section, material, self.temperature_change);
        }
        if force == 0.0 {
            return Ok(Vec12::zeros());
        }

        let f_local = self.from_node_line(axial_force_pair(force));
        let t = transformation_matrix(&geometry.rotation);
        Ok(t.transpose() * f_local)
    }

    /// Equivalent global nodal loads of a unit internal pressure
    ///
    /// Scaled by the acoustic pressure of the fluid column, this is the
    /// dynamic load the fluid exerts on the pipe wall.
    pub fn unit_pressure_load(&self, geometry: &ElementGeometry) -> FemResult<Vec12> {
        if !matches!(
            self.element_type,
            StructuralElementType::Pipe | StructuralElementType::Valve(_)
        ) {
            return Ok(Vec12::zeros());
        }
        let capped_end = self.pressure.map(|p| p.capped_end).unwrap_or(true);
        let force = PressureLoad::new(1.0, 0.0, capped_end).axial_force(self.section()?, self.material()?);
        let f_local = self.from_node_line(axial_force_pair(force));
        let t = transformation_matrix(&geometry.rotation);
        Ok(t.transpose() * f_local)
    }

    /// Equivalent global nodal loads of the element weight
    pub fn self_weight_load(&self, geometry: &ElementGeometry, gravity: &[f64; 3]) -> FemResult<Vec12> {
        let mass = match self.element_type {
            StructuralElementType::ExpansionJoint(joint) => {
                // Lumped at the nodes
                let g = Vec3::from_column_slice(gravity) * joint.effective_mass / 2.0;
                let mut f = Vec12::zeros();
                f.fixed_rows_mut::<3>(0).copy_from(&g);
                f.fixed_rows_mut::<3>(6).copy_from(&g);
                return Ok(f);
            }
            StructuralElementType::Valve(valve) => {
                self.mass_per_length()? + valve.mass / geometry.length
            }
            _ => self.mass_per_length()?,
        };
        let w_global = Vec3::from_column_slice(gravity) * mass;
        let w_local = geometry.rotation * w_global;
        let f_local = self.from_node_line(uniform_load(&w_local, geometry.length));
        let t = transformation_matrix(&geometry.rotation);
        Ok(t.transpose() * f_local)
    }

    /// Loads at the centroid expressed at the nodes
    fn from_node_line(&self, f: Vec12) -> Vec12 {
        match self.cross_section.as_deref() {
            Some(s) if s.offset_y != 0.0 || s.offset_z != 0.0 => {
                offset_transformation(s.offset_y, s.offset_z).transpose() * f
            }
            _ => f,
        }
    }

    /// Local end forces from global nodal displacements
    pub fn internal_loads(
        &self,
        geometry: &ElementGeometry,
        u_global: &[Complex64; 12],
    ) -> FemResult<InternalLoads> {
        let k_local = self.local_stiffness(geometry.length)?;
        let t = transformation_matrix(&geometry.rotation);
        let kt = k_local * t;

        let mut loads = [Complex64::new(0.0, 0.0); 12];
        for (i, load) in loads.iter_mut().enumerate() {
            *load = (0..12).map(|j| u_global[j] * kt[(i, j)]).sum();
        }
        Ok(loads)
    }

    /// Stress amplitudes of a pipe element for given end forces
    ///
    /// Each component is the larger magnitude over both ends; von Mises
    /// combines the magnitudes conservatively.
    pub fn stresses(&self, loads: &InternalLoads) -> FemResult<PipeStress> {
        let section = self.section()?;
        let d_o = section.outer_diameter();
        let radius = if d_o > 0.0 {
            d_o / 2.0
        } else {
            (section.area / std::f64::consts::PI).sqrt()
        };
        let hoop = self
            .pressure
            .map(|p| p.hoop_stress(section))
            .unwrap_or(0.0)
            .abs();

        let mut result = PipeStress {
            hoop,
            ..PipeStress::default()
        };
        for end in 0..2 {
            let o = 6 * end;
            let axial = loads[o].norm() / section.area;
            let bending = (loads[o + 4].norm_sqr() + loads[o + 5].norm_sqr()).sqrt() * radius
                / section.iy.max(section.iz);
            let torsional = loads[o + 3].norm() * radius / section.j;
            let transverse_shear =
                2.0 * (loads[o + 1].norm_sqr() + loads[o + 2].norm_sqr()).sqrt() / section.area;

            let normal = axial + bending;
            let shear = torsional + transverse_shear;
            let von_mises =
                (normal * normal - normal * hoop + hoop * hoop + 3.0 * shear * shear).sqrt();

            result.axial = result.axial.max(axial);
            result.bending = result.bending.max(bending);
            result.torsional = result.torsional.max(torsional);
            result.transverse_shear = result.transverse_shear.max(transverse_shear);
            result.von_mises = result.von_mises.max(von_mises);
        }
        Ok(result)
    }
}

/// Timoshenko bending stiffness for DOFs [v1, θ1, v2, θ2]
fn bending_stiffness(ei: f64, phi: f64, l: f64) -> [[f64; 4]; 4] {
    let c = ei / ((1.0 + phi) * l * l * l);
    let l2 = l * l;
    [
        [12.0 * c, 6.0 * l * c, -12.0 * c, 6.0 * l * c],
        [6.0 * l * c, (4.0 + phi) * l2 * c, -6.0 * l * c, (2.0 - phi) * l2 * c],
        [-12.0 * c, -6.0 * l * c, 12.0 * c, -6.0 * l * c],
        [6.0 * l * c, (2.0 - phi) * l2 * c, -6.0 * l * c, (4.0 + phi) * l2 * c],
    ]
}

/// Timoshenko consistent mass for DOFs [v1, θ1, v2, θ2]
///
/// `mu` is the translational mass per length, `rho_i` the rotary inertia per
/// length.
fn bending_mass(mu: f64, rho_i: f64, phi: f64, l: f64) -> [[f64; 4]; 4] {
    let p = phi;
    let p2 = phi * phi;
    let den = (1.0 + p) * (1.0 + p);
    let l2 = l * l;

    let t = mu * l / den;
    let m11 = t * (13.0 / 35.0 + 7.0 * p / 10.0 + p2 / 3.0);
    let m12 = t * (11.0 / 210.0 + 11.0 * p / 120.0 + p2 / 24.0) * l;
    let m13 = t * (9.0 / 70.0 + 3.0 * p / 10.0 + p2 / 6.0);
    let m14 = -t * (13.0 / 420.0 + 3.0 * p / 40.0 + p2 / 24.0) * l;
    let m22 = t * (1.0 / 105.0 + p / 60.0 + p2 / 120.0) * l2;
    let m24 = -t * (1.0 / 140.0 + p / 60.0 + p2 / 120.0) * l2;

    let r = rho_i / (l * den);
    let r11 = r * 6.0 / 5.0;
    let r12 = r * (1.0 / 10.0 - p / 2.0) * l;
    let r22 = r * (2.0 / 15.0 + p / 6.0 + p2 / 3.0) * l2;
    let r24 = r * (-1.0 / 30.0 - p / 6.0 + p2 / 6.0) * l2;

    [
        [m11 + r11, m12 + r12, m13 - r11, m14 + r12],
        [m12 + r12, m22 + r22, -m14 - r12, m24 + r24],
        [m13 - r11, -m14 - r12, m11 + r11, -m12 - r12],
        [m14 + r12, m24 + r24, -m12 - r12, m22 + r22],
    ]
}

/// Consistent translational mass of a distributed mass without rotary inertia
fn translational_mass(mu: f64, length: f64) -> Mat12 {
    let mut m = Mat12::zeros();
    let axial = mu * length / 6.0;
    m[(0, 0)] = 2.0 * axial;
    m[(6, 6)] = 2.0 * axial;
    m[(0, 6)] = axial;
    m[(6, 0)] = axial;
    let b = bending_mass(mu, 0.0, 0.0, length);
    for a in 0..4 {
        for c in 0..4 {
            m[(XY_PLANE[a], XY_PLANE[c])] = b[a][c];
            m[(XZ_PLANE[a], XZ_PLANE[c])] = XZ_SIGN[a] * XZ_SIGN[c] * b[a][c];
        }
    }
    m
}

fn expansion_joint_stiffness(joint: &ExpansionJoint) -> Mat12 {
    let springs = [
        joint.axial_stiffness,
        joint.transversal_stiffness,
        joint.transversal_stiffness,
        joint.torsional_stiffness,
        joint.rotational_stiffness,
        joint.rotational_stiffness,
    ];
    let mut k = Mat12::zeros();
    for (dof, &ks) in springs.iter().enumerate() {
        k[(dof, dof)] = ks;
        k[(dof + 6, dof + 6)] = ks;
        k[(dof, dof + 6)] = -ks;
        k[(dof + 6, dof)] = -ks;
    }
    k
}
