//! Error types for the pipe FEM core

use thiserror::Error;

/// Main error type for mesh, assembly and solver operations
#[derive(Error, Debug)]
pub enum FemError {
    #[error("Node {0} not found in mesh")]
    NodeNotFound(usize),

    #[error("Element {0} not found in mesh")]
    ElementNotFound(usize),

    #[error("Line {0} not found in mesh")]
    LineNotFound(usize),

    #[error("Element {0} has no material assigned")]
    MissingMaterial(usize),

    #[error("Element {0} has no cross section assigned")]
    MissingCrossSection(usize),

    #[error("Element {0} has no fluid assigned")]
    MissingFluid(usize),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Table for {context} has {found} entries but {expected} frequencies are active")]
    TableLength {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Singular system matrix at {0}")]
    SingularMatrix(String),

    #[error("Invalid sparse pattern: {0}")]
    SparsePattern(String),

    #[error("Eigen solve failed: {0}")]
    EigenSolveFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl FemError {
    /// True for the errors raised while validating a model before any solve
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FemError::MissingMaterial(_)
                | FemError::MissingCrossSection(_)
                | FemError::MissingFluid(_)
                | FemError::InvalidGeometry(_)
                | FemError::TableLength { .. }
                | FemError::Configuration(_)
        )
    }
}

/// Result type for pipe FEM operations
pub type FemResult<T> = Result<T, FemError>;
