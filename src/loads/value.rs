//! Tri-state boundary values shared by prescribed DOFs, loads and lumped properties

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{FemError, FemResult};

/// A boundary-condition value on one DOF
///
/// `Table` holds one value per active analysis frequency, already parsed by the
/// caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum BoundaryValue {
    #[default]
    Unconstrained,
    Constant(Complex64),
    Table(Vec<Complex64>),
}

/// Six per-node DOF values [UX, UY, UZ, RX, RY, RZ]
pub type DofValues = [BoundaryValue; 6];

/// Six unconstrained DOF values
pub fn unconstrained() -> DofValues {
    Default::default()
}

impl BoundaryValue {
    /// Real constant value
    pub fn real(value: f64) -> Self {
        Self::Constant(Complex64::new(value, 0.0))
    }

    /// Complex constant value
    pub fn complex(re: f64, im: f64) -> Self {
        Self::Constant(Complex64::new(re, im))
    }

    /// Real per-frequency table
    pub fn real_table(values: &[f64]) -> Self {
        Self::Table(values.iter().map(|&v| Complex64::new(v, 0.0)).collect())
    }

    /// Whether a value is imposed (constant or table)
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unconstrained)
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table(_))
    }

    /// Whether any imposed value is different from zero
    pub fn is_nonzero(&self) -> bool {
        match self {
            Self::Unconstrained => false,
            Self::Constant(v) => v.norm() > 0.0,
            Self::Table(values) => values.iter().any(|v| v.norm() > 0.0),
        }
    }

    /// Value at a frequency index, zero when unconstrained
    ///
    /// Table lengths are validated by [`BoundaryValue::check_length`] before
    /// any solve, so an out-of-range index falls back to zero.
    #[inline]
    pub fn value_at(&self, index: usize) -> Complex64 {
        match self {
            Self::Unconstrained => Complex64::new(0.0, 0.0),
            Self::Constant(v) => *v,
            Self::Table(values) => values.get(index).copied().unwrap_or_default(),
        }
    }

    /// Value used by frequency-independent analyses (static, modal)
    pub fn static_value(&self) -> Complex64 {
        self.value_at(0)
    }

    /// Check that a table matches the number of active frequencies
    pub fn check_length<F>(&self, expected: usize, context: F) -> FemResult<()>
    where
        F: FnOnce() -> String,
    {
        match self {
            Self::Table(values) if values.len() != expected => Err(FemError::TableLength {
                context: context(),
                expected,
                found: values.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Expand into one value per frequency
    pub fn expand(&self, n_frequencies: usize) -> Vec<Complex64> {
        (0..n_frequencies).map(|i| self.value_at(i)).collect()
    }
}

impl From<f64> for BoundaryValue {
    fn from(value: f64) -> Self {
        Self::real(value)
    }
}

impl From<Complex64> for BoundaryValue {
    fn from(value: Complex64) -> Self {
        Self::Constant(value)
    }
}
