//! Lumped connections between two nodes

use serde::{Deserialize, Serialize};

use crate::loads::BoundaryValue;

/// Order-independent key of a node pair, smaller external index first
pub fn node_pair(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Spring and damper connecting the same DOFs of two nodes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ElasticLink {
    /// Stiffness per global DOF [UX, UY, UZ, RX, RY, RZ]
    pub stiffness: [f64; 6],
    /// Viscous damping per global DOF
    pub damping: [f64; 6],
}

impl ElasticLink {
    pub fn new(stiffness: [f64; 6], damping: [f64; 6]) -> Self {
        Self { stiffness, damping }
    }

    /// Link with the same translational and rotational stiffness on every axis
    pub fn isotropic(translational: f64, rotational: f64) -> Self {
        let t = translational;
        let r = rotational;
        Self::new([t, t, t, r, r, r], [0.0; 6])
    }
}

/// Lumped acoustic impedance connecting two nodes across a discontinuity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcousticLink {
    /// Acoustic impedance Δp / Q in Pa·s/m³
    pub impedance: BoundaryValue,
}

impl AcousticLink {
    pub fn new(impedance: BoundaryValue) -> Self {
        Self { impedance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_normalized() {
        assert_eq!(node_pair(9, 3), (3, 9));
        assert_eq!(node_pair(3, 9), node_pair(9, 3));
    }
}
