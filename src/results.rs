//! Result types for static, modal and harmonic analyses

use std::fmt;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::elements::{InternalLoads, PipeStress};

/// Non-fatal model validity issue collected during a solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelWarning {
    /// Frequencies above the first higher-order duct mode
    PlaneWaveCutoff {
        element: usize,
        cutoff_frequency: f64,
        first_frequency: f64,
    },
    /// Frequency range outside the validity of an acoustic damping model
    DampingModelRange {
        element: usize,
        model: String,
        min_frequency: f64,
        max_frequency: f64,
    },
    /// Nonlinear perforated plate impedance did not converge
    PerforatedPlateNotConverged {
        element: usize,
        frequency: f64,
        iterations: usize,
        residual: f64,
    },
    /// Non-zero prescribed values replaced by zero in a modal analysis
    PrescribedValuesIgnored { nodes: Vec<usize> },
    /// Lumped masses, springs and dampers left out of a modal analysis
    LumpedPropertiesIgnored { nodes: Vec<usize> },
    /// Mode superposition replaced by the direct method
    ModeSuperpositionFallback { reason: String },
    /// Static pre-solution for geometric stiffening could not be computed
    GeometricStiffeningSkipped { reason: String },
}

impl fmt::Display for ModelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlaneWaveCutoff {
                element,
                cutoff_frequency,
                first_frequency,
            } => write!(
                f,
                "element {}: plane wave assumption violated from {:.1} Hz (cutoff {:.1} Hz)",
                element, first_frequency, cutoff_frequency
            ),
            Self::DampingModelRange {
                element,
                model,
                min_frequency,
                max_frequency,
            } => write!(
                f,
                "element {}: {} model not valid between {:.3} Hz and {:.3} Hz",
                element, model, min_frequency, max_frequency
            ),
            Self::PerforatedPlateNotConverged {
                element,
                frequency,
                iterations,
                residual,
            } => write!(
                f,
                "element {}: perforated plate impedance not converged at {:.1} Hz after {} iterations (residual {:.2e})",
                element, frequency, iterations, residual
            ),
            Self::PrescribedValuesIgnored { nodes } => {
                write!(f, "non-zero prescribed values ignored at nodes {:?}", nodes)
            }
            Self::LumpedPropertiesIgnored { nodes } => {
                write!(f, "lumped properties ignored at nodes {:?}", nodes)
            }
            Self::ModeSuperpositionFallback { reason } => {
                write!(f, "mode superposition replaced by direct method: {}", reason)
            }
            Self::GeometricStiffeningSkipped { reason } => {
                write!(f, "geometric stiffening skipped: {}", reason)
            }
        }
    }
}

/// A frequency (or mode) whose solve failed numerically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyFailure {
    /// Position in the frequency list
    pub index: usize,
    pub frequency: f64,
    pub reason: String,
}

/// Warnings and failures returned alongside a solution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub warnings: Vec<ModelWarning>,
    pub failures: Vec<FrequencyFailure>,
    /// Frequency indices skipped after cancellation
    pub cancelled: Vec<usize>,
}

impl SolveReport {
    pub fn warn(&mut self, warning: ModelWarning) {
        log::warn!("{}", warning);
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn extend_warnings<I: IntoIterator<Item = ModelWarning>>(&mut self, warnings: I) {
        for warning in warnings {
            self.warn(warning);
        }
    }

    /// True if nothing failed or was cancelled
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.cancelled.is_empty()
    }

    /// Indices of failed frequencies
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

/// Displacement results at a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeDisplacement {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl NodeDisplacement {
    /// Create from array [DX, DY, DZ, RX, RY, RZ]
    pub fn from_array(arr: [f64; 6]) -> Self {
        Self {
            dx: arr[0],
            dy: arr[1],
            dz: arr[2],
            rx: arr[3],
            ry: arr[4],
            rz: arr[5],
        }
    }

    pub fn translation_magnitude(&self) -> f64 {
        (self.dx.powi(2) + self.dy.powi(2) + self.dz.powi(2)).sqrt()
    }

    pub fn rotation_magnitude(&self) -> f64 {
        (self.rx.powi(2) + self.ry.powi(2) + self.rz.powi(2)).sqrt()
    }
}

/// Static response over all structural DOFs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticSolution {
    /// Full-length displacement vector indexed by global DOF
    pub displacements: DVector<f64>,
    pub report: SolveReport,
}

impl StaticSolution {
    /// Displacements of the node with the given global index
    pub fn node_displacement(&self, global_index: usize) -> Option<NodeDisplacement> {
        let start = 6 * global_index;
        if start + 6 > self.displacements.len() {
            return None;
        }
        let mut arr = [0.0; 6];
        arr.copy_from_slice(&self.displacements.as_slice()[start..start + 6]);
        Some(NodeDisplacement::from_array(arr))
    }

    /// Largest translation in the model
    pub fn max_translation(&self) -> f64 {
        let n_nodes = self.displacements.len() / 6;
        (0..n_nodes)
            .filter_map(|g| self.node_displacement(g))
            .map(|d| d.translation_magnitude())
            .fold(0.0, f64::max)
    }
}

/// Natural frequencies and mode shapes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalSolution {
    /// Natural frequencies in Hz, ascending
    pub natural_frequencies: Vec<f64>,
    /// Eigenvalues λ = ω²
    pub eigenvalues: Vec<f64>,
    /// Mass-normalised mode shapes over all DOFs, one column per mode
    pub modes: DMatrix<f64>,
    pub report: SolveReport,
}

impl ModalSolution {
    pub fn num_modes(&self) -> usize {
        self.natural_frequencies.len()
    }

    /// Mode shape `mode` as a vector over all DOFs
    pub fn mode_shape(&self, mode: usize) -> Option<DVector<f64>> {
        (mode < self.modes.ncols()).then(|| self.modes.column(mode).into_owned())
    }
}

/// Harmonic analysis method actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmonicMethod {
    Direct,
    ModeSuperposition,
}

/// Frequency response over all structural DOFs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonicSolution {
    pub frequencies: Vec<f64>,
    /// Complex displacements, one row per DOF and one column per frequency
    pub displacements: DMatrix<Complex64>,
    pub method: HarmonicMethod,
    pub report: SolveReport,
}

impl HarmonicSolution {
    /// Response of a single DOF over all frequencies
    pub fn dof_response(&self, dof: usize) -> Vec<Complex64> {
        self.displacements.row(dof).iter().copied().collect()
    }

    /// Response at one frequency index over all DOFs
    pub fn at_frequency(&self, index: usize) -> DVector<Complex64> {
        self.displacements.column(index).into_owned()
    }

    /// Complex displacements of the 12 DOFs of an element at one frequency
    pub fn element_displacements(&self, dofs: &[usize; 12], index: usize) -> [Complex64; 12] {
        let mut u = [Complex64::new(0.0, 0.0); 12];
        for (value, &dof) in u.iter_mut().zip(dofs.iter()) {
            *value = self.displacements[(dof, index)];
        }
        u
    }
}

/// Acoustic pressure response over all nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcousticSolution {
    pub frequencies: Vec<f64>,
    /// Complex pressures, one row per node (global index) and one column per frequency
    pub pressures: DMatrix<Complex64>,
    pub report: SolveReport,
}

impl AcousticSolution {
    pub fn node_response(&self, global_index: usize) -> Vec<Complex64> {
        self.pressures.row(global_index).iter().copied().collect()
    }

    /// Sound pressure level in dB re 20 µPa of the pressure amplitude
    pub fn spl(&self, global_index: usize) -> Vec<f64> {
        const P_REF: f64 = 2.0e-5;
        self.node_response(global_index)
            .iter()
            .map(|p| 20.0 * (p.norm() / std::f64::consts::SQRT_2 / P_REF).max(f64::MIN_POSITIVE).log10())
            .collect()
    }
}

/// Per-frequency reaction at one DOF of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DofReaction {
    /// External node index
    pub node: usize,
    /// Local DOF 0..6 (FX, FY, FZ, MX, MY, MZ)
    pub dof: usize,
    pub values: Vec<Complex64>,
}

/// Per-frequency force transmitted by an elastic link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkReaction {
    /// External node indices, smaller first
    pub nodes: (usize, usize),
    pub dof: usize,
    pub values: Vec<Complex64>,
}

/// Reactions at supports and internal forces of lumped devices
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reactions {
    pub frequencies: Vec<f64>,
    /// Reactions at prescribed DOFs
    pub supports: Vec<DofReaction>,
    /// Forces in lumped springs
    pub springs: Vec<DofReaction>,
    /// Forces in lumped dampers
    pub dampers: Vec<DofReaction>,
    pub links: Vec<LinkReaction>,
}

impl Reactions {
    /// Reaction at a support DOF, if that DOF is prescribed
    pub fn support(&self, node: usize, dof: usize) -> Option<&[Complex64]> {
        self.supports
            .iter()
            .find(|r| r.node == node && r.dof == dof)
            .map(|r| r.values.as_slice())
    }
}

/// Internal loads and stresses of one structural element per frequency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementStresses {
    pub element: usize,
    pub internal_loads: Vec<InternalLoads>,
    pub stresses: Vec<PipeStress>,
}

impl ElementStresses {
    /// Peak von Mises stress over all frequencies
    pub fn max_von_mises(&self) -> f64 {
        self.stresses.iter().map(|s| s.von_mises).fold(0.0, f64::max)
    }
}
