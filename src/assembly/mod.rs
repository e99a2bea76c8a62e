//! Global assembly and prescribed/free DOF partition

mod acoustic;
mod structural;

use nalgebra::{DVector, Scalar};
use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64;

use crate::error::FemResult;
use crate::math::{extract_block, SparseMatrixBuilder};

pub use acoustic::{AcousticAssembly, PlateCoupling, ReducedAcousticSystem};
pub(crate) use acoustic::pressure_partition;
pub use structural::{ReducedStructuralSystem, StructuralAssembly};

/// Lumped contributions shared by all frequencies, or one per frequency when
/// any value comes from a table
#[derive(Debug, Clone)]
pub enum LumpedMatrices<M> {
    Shared(M),
    PerFrequency(Vec<M>),
}

impl<M> LumpedMatrices<M> {
    /// Matrix at a frequency index; `None` selects the static value
    pub fn at(&self, index: Option<usize>) -> &M {
        match self {
            Self::Shared(m) => m,
            Self::PerFrequency(ms) => {
                let i = index.unwrap_or(0).min(ms.len().saturating_sub(1));
                &ms[i]
            }
        }
    }

    pub fn is_per_frequency(&self) -> bool {
        matches!(self, Self::PerFrequency(_))
    }

    pub fn iter(&self) -> impl Iterator<Item = &M> + '_ {
        let slice = match self {
            Self::Shared(m) => std::slice::from_ref(m),
            Self::PerFrequency(ms) => ms.as_slice(),
        };
        slice.iter()
    }

    pub fn try_map<N, F: Fn(&M) -> FemResult<N>>(&self, f: F) -> FemResult<LumpedMatrices<N>> {
        Ok(match self {
            Self::Shared(m) => LumpedMatrices::Shared(f(m)?),
            Self::PerFrequency(ms) => {
                LumpedMatrices::PerFrequency(ms.iter().map(f).collect::<FemResult<Vec<_>>>()?)
            }
        })
    }
}

impl LumpedMatrices<CsrMatrix<Complex64>> {
    pub fn is_empty(&self) -> bool {
        self.iter().all(|m| m.nnz() == 0)
    }
}

/// Split of the DOFs into free and prescribed sets, both ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofPartition {
    size: usize,
    free: Vec<usize>,
    prescribed: Vec<usize>,
}

impl DofPartition {
    pub fn new(size: usize, prescribed: &[usize]) -> Self {
        let mut is_prescribed = vec![false; size];
        for &dof in prescribed {
            if dof < size {
                is_prescribed[dof] = true;
            }
        }
        let free = (0..size).filter(|&d| !is_prescribed[d]).collect();
        let prescribed = (0..size).filter(|&d| is_prescribed[d]).collect();
        Self {
            size,
            free,
            prescribed,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn free(&self) -> &[usize] {
        &self.free
    }

    pub fn prescribed(&self) -> &[usize] {
        &self.prescribed
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    /// Values of a full vector at the free DOFs
    pub fn gather_free<T: Scalar + Copy>(&self, full: &DVector<T>) -> DVector<T> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&d| full[d]))
    }

    /// Full vector from free values and prescribed values
    pub fn scatter<T: Scalar + Copy + Default>(
        &self,
        free: &DVector<T>,
        prescribed: &DVector<T>,
    ) -> DVector<T> {
        let mut full = DVector::from_element(self.size, T::default());
        for (&dof, &value) in self.free.iter().zip(free.iter()) {
            full[dof] = value;
        }
        for (&dof, &value) in self.prescribed.iter().zip(prescribed.iter()) {
            full[dof] = value;
        }
        full
    }
}

/// Free/free and free/prescribed blocks of a global matrix
#[derive(Debug, Clone)]
pub struct ReducedBlocks<T: Scalar> {
    pub ff: CsrMatrix<T>,
    pub fp: CsrMatrix<T>,
}

impl<T> ReducedBlocks<T>
where
    T: Scalar + Copy + Default + std::ops::AddAssign,
{
    pub fn new(full: &CsrMatrix<T>, partition: &DofPartition) -> FemResult<Self> {
        Ok(Self {
            ff: extract_block(full, partition.free(), partition.free())?,
            fp: extract_block(full, partition.free(), partition.prescribed())?,
        })
    }
}

/// Sum of scaled real and complex sparse matrices
pub(crate) struct ComplexCombination {
    builder: SparseMatrixBuilder<Complex64>,
}

impl ComplexCombination {
    pub(crate) fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            builder: SparseMatrixBuilder::rectangular(nrows, ncols),
        }
    }

    pub(crate) fn add_real(&mut self, m: &CsrMatrix<f64>, scale: Complex64) {
        if scale == Complex64::new(0.0, 0.0) {
            return;
        }
        for (row, col, &value) in m.triplet_iter() {
            self.builder.add(row, col, scale * value);
        }
    }

    pub(crate) fn add_complex(&mut self, m: &CsrMatrix<Complex64>, scale: Complex64) {
        if scale == Complex64::new(0.0, 0.0) {
            return;
        }
        for (row, col, &value) in m.triplet_iter() {
            self.builder.add(row, col, scale * value);
        }
    }

    pub(crate) fn add(&mut self, row: usize, col: usize, value: Complex64) {
        self.builder.add(row, col, value);
    }

    pub(crate) fn finish(self) -> FemResult<CsrMatrix<Complex64>> {
        self.builder.to_csr()
    }
}
