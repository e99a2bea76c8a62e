//! Element formulations and the property records they reference

mod acoustic;
mod fluid;
mod material;
mod node;
mod perforated_plate;
mod section;
mod structural;

pub use acoustic::{
    radiation_admittance, specific_impedance_admittance, transmission_admittance, AcousticElement,
    AcousticElementType, Admittance, WaveParameters,
};
pub use fluid::Fluid;
pub use material::Material;
pub use node::{Node, RadiationImpedance};
pub use perforated_plate::PerforatedPlate;
pub use section::{CrossSection, SectionShape};
pub use structural::{
    DecouplingMask, ElementGeometry, ExpansionJoint, InternalLoads, PipeStress, StructuralElement,
    StructuralElementType, Valve,
};
