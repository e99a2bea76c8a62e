//! Pipe FEM - frequency-domain structural and acoustic analysis of piping systems
//!
//! This library provides the computational core of a one-dimensional pipe
//! network model, supporting:
//! - Timoshenko pipe/beam elements, expansion joints and valves
//! - 1-D acoustic duct elements with damping, mean flow and radiation models
//! - Graph-ordered DOF numbering and sparse global assembly
//! - Static, modal, direct harmonic and mode superposition analysis
//! - Acoustic pressure response with perforated plates and acoustic modes
//!
//! ## Example
//! ```rust
//! use pipe_fem::prelude::*;
//!
//! let nodes = [
//!     NodeRecord { index: 1, x: 0.0, y: 0.0, z: 0.0 },
//!     NodeRecord { index: 2, x: 0.5, y: 0.0, z: 0.0 },
//!     NodeRecord { index: 3, x: 1.0, y: 0.0, z: 0.0 },
//! ];
//! let elements = [
//!     ElementRecord { index: 1, first_node: 1, last_node: 2 },
//!     ElementRecord { index: 2, first_node: 2, last_node: 3 },
//! ];
//! let mut mesh = Mesh::from_records(&nodes, &elements).unwrap();
//! let all = mesh.all_elements();
//! mesh.set_material_by_elements(&all, Material::steel()).unwrap();
//! mesh.set_cross_section_by_elements(&all, CrossSection::pipe(0.05, 0.008)).unwrap();
//!
//! let mut fixed = unconstrained();
//! for dof in fixed.iter_mut() {
//!     *dof = BoundaryValue::real(0.0);
//! }
//! mesh.set_prescribed_dofs(&[1], &fixed).unwrap();
//!
//! let solver = StructuralSolver::new(&mesh, AnalysisOptions::modal(3)).unwrap();
//! let modes = solver.modal_analysis().unwrap();
//! assert_eq!(modes.num_modes(), 3);
//! ```

pub mod analysis;
pub mod assembly;
pub mod elements;
pub mod error;
pub mod loads;
pub mod math;
pub mod mesh;
pub mod results;

// Re-export common types
pub mod prelude {
    pub use crate::analysis::{
        AcousticSolver, AnalysisOptions, AnalysisType, GlobalDamping, IterationControl,
        SolverBackend, StructuralSolver,
    };
    pub use crate::elements::{
        AcousticElementType, CrossSection, ExpansionJoint, Fluid, Material, PerforatedPlate,
        RadiationImpedance, StructuralElementType, Valve,
    };
    pub use crate::error::{FemError, FemResult};
    pub use crate::loads::{unconstrained, BoundaryValue, DofValues, PressureLoad};
    pub use crate::mesh::{AcousticLink, ElasticLink, ElementRecord, Mesh, NodeRecord};
    pub use crate::results::{
        AcousticSolution, HarmonicMethod, HarmonicSolution, ModalSolution, ModelWarning,
        Reactions, SolveReport, StaticSolution,
    };
}
