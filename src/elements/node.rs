//! Node - a point in 3D space carrying boundary-condition state

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::loads::{unconstrained, BoundaryValue, DofValues};

/// Radiation impedance model at an open acoustic termination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadiationImpedance {
    /// Perfectly absorbing termination, z = ρc
    Anechoic,
    /// Open pipe end without flange
    Unflanged,
    /// Open pipe end in an infinite baffle
    Flanged,
}

/// A 3D node in the finite element model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// User-facing node number
    pub external_index: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// Dense index assigned by the mesh numbering
    #[serde(skip)]
    pub(crate) global_index: Option<usize>,

    /// Prescribed displacements/rotations [UX, UY, UZ, RX, RY, RZ]
    pub prescribed_dofs: DofValues,
    /// Nodal forces/moments [FX, FY, FZ, MX, MY, MZ]
    pub nodal_loads: DofValues,
    pub lumped_masses: DofValues,
    pub lumped_stiffness: DofValues,
    pub lumped_dampings: DofValues,

    /// Prescribed acoustic pressure
    pub acoustic_pressure: BoundaryValue,
    /// Volume velocity source
    pub volume_velocity: BoundaryValue,
    /// Specific (wall) impedance at the node
    pub specific_impedance: BoundaryValue,
    pub radiation_impedance: Option<RadiationImpedance>,
    /// Compressor excitation spectra summed into the volume velocity source
    pub compressor_excitation: Vec<Vec<Complex64>>,
}

impl Node {
    /// Create a new node at the given coordinates
    pub fn new(external_index: usize, x: f64, y: f64, z: f64) -> Self {
        Self {
            external_index,
            x,
            y,
            z,
            global_index: None,
            prescribed_dofs: unconstrained(),
            nodal_loads: unconstrained(),
            lumped_masses: unconstrained(),
            lumped_stiffness: unconstrained(),
            lumped_dampings: unconstrained(),
            acoustic_pressure: BoundaryValue::Unconstrained,
            volume_velocity: BoundaryValue::Unconstrained,
            specific_impedance: BoundaryValue::Unconstrained,
            radiation_impedance: None,
            compressor_excitation: Vec::new(),
        }
    }

    /// Get the coordinates as an array
    pub fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Calculate distance to another node
    pub fn distance_to(&self, other: &Node) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Dense global index, available once the mesh has been numbered
    pub fn global_index(&self) -> Option<usize> {
        self.global_index
    }

    /// Global structural DOF indices of this node
    pub fn structural_dofs(&self) -> Option<[usize; 6]> {
        self.global_index
            .map(|g| [6 * g, 6 * g + 1, 6 * g + 2, 6 * g + 3, 6 * g + 4, 6 * g + 5])
    }

    /// Impose a value on one DOF, clearing any load on the same DOF
    pub fn set_prescribed_dof(&mut self, dof: usize, value: BoundaryValue) {
        if value.is_set() {
            self.nodal_loads[dof] = BoundaryValue::Unconstrained;
        }
        self.prescribed_dofs[dof] = value;
    }

    /// Apply a load on one DOF, clearing any prescribed value on the same DOF
    pub fn set_nodal_load(&mut self, dof: usize, value: BoundaryValue) {
        if value.is_set() {
            self.prescribed_dofs[dof] = BoundaryValue::Unconstrained;
        }
        self.nodal_loads[dof] = value;
    }

    /// Impose an acoustic pressure, clearing any volume velocity source
    pub fn set_acoustic_pressure(&mut self, value: BoundaryValue) {
        if value.is_set() {
            self.volume_velocity = BoundaryValue::Unconstrained;
            self.compressor_excitation.clear();
        }
        self.acoustic_pressure = value;
    }

    /// Apply a volume velocity source, clearing any prescribed pressure
    pub fn set_volume_velocity(&mut self, value: BoundaryValue) {
        if value.is_set() {
            self.acoustic_pressure = BoundaryValue::Unconstrained;
        }
        self.volume_velocity = value;
    }

    /// Add a compressor excitation spectrum, clearing any prescribed pressure
    pub fn add_compressor_excitation(&mut self, spectrum: Vec<Complex64>) {
        self.acoustic_pressure = BoundaryValue::Unconstrained;
        self.compressor_excitation.push(spectrum);
    }

    pub fn has_prescribed_dofs(&self) -> bool {
        self.prescribed_dofs.iter().any(BoundaryValue::is_set)
    }

    pub fn has_nonzero_prescribed_dofs(&self) -> bool {
        self.prescribed_dofs.iter().any(BoundaryValue::is_nonzero)
    }

    /// Whether a volume velocity is injected at this node
    pub fn has_acoustic_source(&self) -> bool {
        self.volume_velocity.is_set() || !self.compressor_excitation.is_empty()
    }

    /// Total volume velocity at a frequency index
    pub fn volume_velocity_at(&self, index: usize) -> Complex64 {
        let compressor: Complex64 = self
            .compressor_excitation
            .iter()
            .map(|spectrum| spectrum.get(index).copied().unwrap_or_default())
            .sum();
        self.volume_velocity.value_at(index) + compressor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_distance() {
        let n1 = Node::new(1, 0.0, 0.0, 0.0);
        let n2 = Node::new(2, 3.0, 4.0, 0.0);
        assert!((n1.distance_to(&n2) - 5.0).abs() < 1e-10);
        assert!(n1.structural_dofs().is_none());
    }

    #[test]
    fn test_prescribed_and_load_are_exclusive() {
        let mut node = Node::new(1, 0.0, 0.0, 0.0);
        node.set_nodal_load(2, BoundaryValue::real(100.0));
        node.set_prescribed_dof(2, BoundaryValue::real(0.0));
        assert!(!node.nodal_loads[2].is_set());
        assert!(node.prescribed_dofs[2].is_set());

        node.set_nodal_load(2, BoundaryValue::real(5.0));
        assert!(!node.prescribed_dofs[2].is_set());
    }

    #[test]
    fn test_pressure_and_source_are_exclusive() {
        let mut node = Node::new(1, 0.0, 0.0, 0.0);
        node.set_volume_velocity(BoundaryValue::real(1.0));
        node.set_acoustic_pressure(BoundaryValue::real(2.0));
        assert!(!node.has_acoustic_source());

        node.add_compressor_excitation(vec![Complex64::new(0.5, 0.0); 3]);
        node.set_volume_velocity(BoundaryValue::real(1.0));
        assert!(!node.acoustic_pressure.is_set());
        assert_eq!(node.volume_velocity_at(1), Complex64::new(1.5, 0.0));
    }
}
