//! Boundary values and element loads

mod element_loads;
mod value;

pub use element_loads::{
    axial_force_pair, thermal_axial_force, uniform_load, PressureLoad,
};
pub use value::{unconstrained, BoundaryValue, DofValues};
