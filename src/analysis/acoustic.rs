//! Acoustic pressure response and acoustic modes

use std::f64::consts::PI;
use std::time::Instant;

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::{collect_sweep, sweep, AnalysisOptions, FrequencyOutcome, LinearSolver};
use crate::assembly::{pressure_partition, AcousticAssembly, ReducedBlocks};
use crate::error::{FemError, FemResult};
use crate::math::{generalized_eigen_dense, lanczos_shift_invert};
use crate::mesh::Mesh;
use crate::results::{AcousticSolution, ModalSolution, ModelWarning, SolveReport};

/// Largest relative change of the plate velocities between two iterations
fn velocity_change(old: &[f64], new: &[f64]) -> f64 {
    old.iter()
        .zip(new)
        .map(|(o, n)| (n - o).abs() / n.abs().max(f64::MIN_POSITIVE))
        .fold(0.0, f64::max)
}

/// Acoustic solver for one mesh and one set of analysis options
pub struct AcousticSolver<'a> {
    mesh: &'a Mesh,
    options: AnalysisOptions,
    linear: LinearSolver,
}

impl<'a> AcousticSolver<'a> {
    pub fn new(mesh: &'a Mesh, options: AnalysisOptions) -> FemResult<Self> {
        options.validate()?;
        let linear = LinearSolver::from_options(&options);
        Ok(Self {
            mesh,
            options,
            linear,
        })
    }

    /// Nodal pressures from Y(ω)·p = Q(ω), one solve per frequency
    pub fn direct(&self) -> FemResult<AcousticSolution> {
        let start = Instant::now();
        let frequencies = &self.options.frequencies;
        let assembly = AcousticAssembly::assemble(self.mesh, frequencies, &self.options.iteration)?;
        let mut report = SolveReport::default();
        report.extend_warnings(assembly.warnings.iter().cloned());

        let results = sweep(frequencies.len(), |index| {
            if self.options.is_cancelled() {
                return (FrequencyOutcome::Cancelled, None);
            }
            self.solve_frequency(&assembly, index)
        });
        let mut outcomes = Vec::with_capacity(results.len());
        for (outcome, warning) in results {
            if let Some(warning) = warning {
                report.warn(warning);
            }
            outcomes.push(outcome);
        }
        let pressures = collect_sweep(outcomes, frequencies, assembly.n_nodes(), &mut report);

        info!(
            "Acoustic analysis: {} frequencies, {} free nodes in {:.1?}",
            frequencies.len(),
            assembly.partition.n_free(),
            start.elapsed()
        );
        Ok(AcousticSolution {
            frequencies: frequencies.clone(),
            pressures,
            report,
        })
    }

    /// One frequency, iterating on the plate velocities when a plate is nonlinear
    fn solve_frequency(
        &self,
        assembly: &AcousticAssembly,
        index: usize,
    ) -> (FrequencyOutcome, Option<ModelWarning>) {
        let frequency = assembly.frequencies[index];
        let omega = 2.0 * PI * frequency;
        let partition = &assembly.partition;
        let prescribed = assembly.prescribed_values(index);
        let source = partition.gather_free(&assembly.source_vector(index));
        let nonlinear = assembly.plates.iter().any(|c| c.plate.nonlinear);
        let control = &self.options.iteration;

        let mut velocities = vec![0.0; assembly.plates.len()];
        let mut iterations = 0;
        loop {
            let plates: Vec<[Complex64; 4]> = assembly
                .plates
                .iter()
                .zip(&velocities)
                .map(|(coupling, &v)| coupling.admittance(omega, v))
                .collect();
            let system = match assembly.reduce(index, &plates) {
                Ok(system) => system,
                Err(err) => return (FrequencyOutcome::Failed(err.to_string()), None),
            };
            let rhs = system.effective_source(&source, &prescribed);
            let p_free = match self.linear.solve(&system.admittance, &rhs) {
                Ok(p) => p,
                Err(reason) => return (FrequencyOutcome::Failed(reason), None),
            };
            let p = partition.scatter(&p_free, &prescribed);
            if !nonlinear {
                return (FrequencyOutcome::Solved(p), None);
            }

            let updated: Vec<f64> = assembly
                .plates
                .iter()
                .zip(&velocities)
                .map(|(coupling, &v)| {
                    let [a, b] = coupling.dofs;
                    coupling.particle_velocity(p[a] - p[b], coupling.impedance(omega, v))
                })
                .collect();
            let residual = velocity_change(&velocities, &updated);
            velocities = updated;
            iterations += 1;

            if residual <= control.tolerance {
                debug!("{:.1} Hz: plates converged in {} iterations", frequency, iterations);
                return (FrequencyOutcome::Solved(p), None);
            }
            if iterations >= control.max_iterations {
                let element = assembly
                    .plates
                    .iter()
                    .find(|c| c.plate.nonlinear)
                    .map(|c| c.element)
                    .unwrap_or_default();
                let warning = ModelWarning::PerforatedPlateNotConverged {
                    element,
                    frequency,
                    iterations,
                    residual,
                };
                return (FrequencyOutcome::Solved(p), Some(warning));
            }
        }
    }

    /// Lossless acoustic modes K·p = ω²·M·p with prescribed pressures held at zero
    pub fn modal_analysis(&self) -> FemResult<ModalSolution> {
        let start = Instant::now();
        let mut report = SolveReport::default();
        let (k, m) = AcousticAssembly::modal_matrices(self.mesh)?;
        let (partition, prescribed) = pressure_partition(self.mesh)?;
        if partition.n_free() == 0 {
            return Err(FemError::Configuration("acoustic model has no free nodes".to_string()));
        }

        let nonzero: Vec<usize> = partition
            .prescribed()
            .iter()
            .zip(&prescribed)
            .filter(|(_, value)| value.is_nonzero())
            .filter_map(|(&g, _)| self.mesh.external_index(g))
            .collect();
        if !nonzero.is_empty() {
            report.warn(ModelWarning::PrescribedValuesIgnored { nodes: nonzero });
        }

        let k_ff = ReducedBlocks::new(&k, &partition)?.ff;
        let m_ff = ReducedBlocks::new(&m, &partition)?.ff;
        let n = k_ff.nrows();
        let num_modes = self.options.num_modes.min(n);
        let pairs = if self.linear.uses_dense(n) {
            generalized_eigen_dense(&DMatrix::from(&k_ff), &DMatrix::from(&m_ff), num_modes, self.options.shift)?
        } else {
            lanczos_shift_invert(&k_ff, &m_ff, num_modes, self.options.shift)?
        };

        let zeros = DVector::zeros(partition.prescribed().len());
        let mut modes = DMatrix::zeros(partition.size(), pairs.len());
        for i in 0..pairs.len() {
            let free = pairs.vectors.column(i).into_owned();
            modes.set_column(i, &partition.scatter(&free, &zeros));
        }
        let natural_frequencies = pairs.values.iter().map(|l| l.abs().sqrt() / (2.0 * PI)).collect();

        info!(
            "Acoustic modal analysis: {} modes of {} free nodes in {:.1?}",
            pairs.len(),
            n,
            start.elapsed()
        );
        Ok(ModalSolution {
            natural_frequencies,
            eigenvalues: pairs.values,
            modes,
            report,
        })
    }
}
