//! Structural static, modal and harmonic solutions
//!
//! All harmonic methods work on the free/free block of the dynamic stiffness
//! A(ω) and reinsert the prescribed values afterwards, so every returned
//! response spans the full DOF set.

use std::f64::consts::PI;
use std::time::Instant;

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{collect_sweep, sweep, AnalysisOptions, AnalysisType, FrequencyOutcome, LinearSolver};
use crate::assembly::{ReducedStructuralSystem, StructuralAssembly};
use crate::elements::{InternalLoads, PipeStress, StructuralElement, StructuralElementType};
use crate::error::{FemError, FemResult};
use crate::math::{
    generalized_eigen_dense, lanczos_shift_invert, solve_dense_complex, sparse_matvec, EigenPairs,
    SparseMatrixBuilder, J,
};
use crate::mesh::Mesh;
use crate::results::{
    AcousticSolution, DofReaction, ElementStresses, HarmonicMethod, HarmonicSolution,
    LinkReaction, ModalSolution, ModelWarning, Reactions, SolveReport, StaticSolution,
};

/// Real part of a lumped matrix added to a real matrix of the same shape
fn add_real_part(a: &CsrMatrix<f64>, b: &CsrMatrix<Complex64>) -> FemResult<CsrMatrix<f64>> {
    let mut builder = SparseMatrixBuilder::rectangular(a.nrows(), a.ncols());
    for (row, col, &value) in a.triplet_iter() {
        builder.add(row, col, value);
    }
    for (row, col, value) in b.triplet_iter() {
        builder.add(row, col, value.re);
    }
    builder.to_csr()
}

fn real_part(v: &DVector<Complex64>) -> DVector<f64> {
    v.map(|c| c.re)
}

/// Modal basis of the free DOFs as a complex matrix for the projections
struct ModalBasis {
    eigenvalues: Vec<f64>,
    vectors: DMatrix<Complex64>,
}

impl ModalBasis {
    fn new(pairs: &EigenPairs) -> Self {
        Self {
            eigenvalues: pairs.values.clone(),
            vectors: pairs.vectors.map(|v| Complex64::new(v, 0.0)),
        }
    }

    fn project(&self, v: &DVector<Complex64>) -> DVector<Complex64> {
        self.vectors.transpose() * v
    }
}

/// Structural solver for one mesh and one set of analysis options
pub struct StructuralSolver<'a> {
    mesh: &'a Mesh,
    options: AnalysisOptions,
    linear: LinearSolver,
}

impl<'a> StructuralSolver<'a> {
    /// Validate the options; the model itself is checked during assembly
    pub fn new(mesh: &'a Mesh, options: AnalysisOptions) -> FemResult<Self> {
        options.validate()?;
        let linear = LinearSolver::from_options(&options);
        Ok(Self {
            mesh,
            options,
            linear,
        })
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Run the configured analysis type as a harmonic response
    ///
    /// Static and modal analyses have their own result types and are
    /// rejected here.
    pub fn harmonic(&self) -> FemResult<HarmonicSolution> {
        match self.options.analysis_type {
            AnalysisType::DirectHarmonic => self.direct_harmonic(),
            AnalysisType::ModeSuperposition => self.mode_superposition(),
            other => Err(FemError::Configuration(format!(
                "{:?} analysis has no harmonic response",
                other
            ))),
        }
    }

    // ========================
    // Assembly
    // ========================

    /// Assembly including the geometric stiffness of a static pre-solution
    /// when requested
    fn assemble(&self, n_frequencies: usize, report: &mut SolveReport) -> FemResult<StructuralAssembly> {
        if !self.options.geometric_stiffening {
            return StructuralAssembly::assemble(self.mesh, n_frequencies, None);
        }
        match self.static_displacement() {
            Ok(u) => StructuralAssembly::assemble(self.mesh, n_frequencies, Some(&u)),
            Err(err) if err.is_configuration() => Err(err),
            Err(err) => {
                report.warn(ModelWarning::GeometricStiffeningSkipped {
                    reason: err.to_string(),
                });
                StructuralAssembly::assemble(self.mesh, n_frequencies, None)
            }
        }
    }

    fn warn_lumped_tables(&self, report: &mut SolveReport) {
        let nodes = self.mesh.nodes_with_lumped_tables();
        if !nodes.is_empty() {
            report.warn(ModelWarning::LumpedPropertiesIgnored { nodes });
        }
    }

    // ========================
    // Static analysis
    // ========================

    fn static_displacement(&self) -> FemResult<DVector<f64>> {
        let assembly = StructuralAssembly::assemble(self.mesh, 0, None)?;
        self.solve_static(&assembly)
    }

    /// K·u = F at ω = 0 with nodal, pressure, thermal and self-weight loads
    fn solve_static(&self, assembly: &StructuralAssembly) -> FemResult<DVector<f64>> {
        let reduced = assembly.reduce()?;
        let lumped = reduced.lumped_stiffness.at(None);
        let k_ff = add_real_part(&reduced.stiffness.ff, &lumped.ff)?;
        let k_fp = add_real_part(&reduced.stiffness.fp, &lumped.fp)?;

        let loads = real_part(&assembly.load_vector(None))
            + StructuralAssembly::element_loads(self.mesh, self.options.gravity)?;
        let u_p = real_part(&assembly.prescribed_values(None));
        let mut rhs = assembly.partition.gather_free(&loads);
        if u_p.iter().any(|v| *v != 0.0) {
            rhs -= sparse_matvec(&k_fp, &u_p);
        }

        let u_f = self
            .linear
            .solve(&k_ff, &rhs)
            .map_err(|reason| FemError::SingularMatrix(format!("static analysis: {}", reason)))?;
        Ok(assembly.partition.scatter(&u_f, &u_p))
    }

    pub fn static_analysis(&self) -> FemResult<StaticSolution> {
        let start = Instant::now();
        let mut report = SolveReport::default();
        self.warn_lumped_tables(&mut report);
        let assembly = StructuralAssembly::assemble(self.mesh, 0, None)?;
        let displacements = self.solve_static(&assembly)?;
        info!(
            "Static analysis of {} DOFs in {:.1?}",
            assembly.n_dofs(),
            start.elapsed()
        );
        Ok(StaticSolution {
            displacements,
            report,
        })
    }

    // ========================
    // Modal analysis
    // ========================

    /// Eigenpairs nearest the shift, dense below the solver threshold
    fn eigenpairs(&self, k: &CsrMatrix<f64>, m: &CsrMatrix<f64>) -> FemResult<EigenPairs> {
        let n = k.nrows();
        let num_modes = self.options.num_modes.min(n);
        if self.linear.uses_dense(n) {
            generalized_eigen_dense(&DMatrix::from(k), &DMatrix::from(m), num_modes, self.options.shift)
        } else {
            lanczos_shift_invert(k, m, num_modes, self.options.shift)
        }
    }

    /// Undamped eigenpairs of the free DOFs, with constant lumped masses and springs
    fn free_modes(&self, reduced: &ReducedStructuralSystem) -> FemResult<EigenPairs> {
        let k = add_real_part(&reduced.stiffness.ff, &reduced.lumped_stiffness.at(None).ff)?;
        let m = add_real_part(&reduced.mass.ff, &reduced.lumped_mass.at(None).ff)?;
        if k.nrows() == 0 {
            return Err(FemError::Configuration("model has no free DOFs".to_string()));
        }
        self.eigenpairs(&k, &m)
    }

    /// Natural frequencies f = √|λ|/2π with prescribed DOFs held at zero
    pub fn modal_analysis(&self) -> FemResult<ModalSolution> {
        let start = Instant::now();
        let mut report = SolveReport::default();
        let assembly = self.assemble(0, &mut report)?;

        let nonzero = self.mesh.nodes_with_nonzero_prescribed_dofs();
        if !nonzero.is_empty() {
            report.warn(ModelWarning::PrescribedValuesIgnored { nodes: nonzero });
        }
        self.warn_lumped_tables(&mut report);

        let reduced = assembly.reduce()?;
        let pairs = self.free_modes(&reduced)?;

        let partition = &assembly.partition;
        let zeros = DVector::zeros(partition.prescribed().len());
        let mut modes = DMatrix::zeros(assembly.n_dofs(), pairs.len());
        for i in 0..pairs.len() {
            let free = pairs.vectors.column(i).into_owned();
            modes.set_column(i, &partition.scatter(&free, &zeros));
        }
        let natural_frequencies: Vec<f64> =
            pairs.values.iter().map(|l| l.abs().sqrt() / (2.0 * PI)).collect();

        info!(
            "Modal analysis: {} modes of {} free DOFs in {:.1?}",
            pairs.len(),
            partition.n_free(),
            start.elapsed()
        );
        debug!("Natural frequencies: {:?}", natural_frequencies);

        Ok(ModalSolution {
            natural_frequencies,
            eigenvalues: pairs.values,
            modes,
            report,
        })
    }

    // ========================
    // Direct harmonic analysis
    // ========================

    pub fn direct_harmonic(&self) -> FemResult<HarmonicSolution> {
        self.direct_with_loads(None)
    }

    /// Direct harmonic response including the acoustic pressure load on the pipe walls
    pub fn direct_harmonic_with_acoustic(&self, acoustic: &AcousticSolution) -> FemResult<HarmonicSolution> {
        if acoustic.frequencies != self.options.frequencies {
            return Err(FemError::Configuration(
                "acoustic solution was computed for other frequencies".to_string(),
            ));
        }
        if acoustic.pressures.nrows() != self.mesh.node_count() {
            return Err(FemError::Configuration(format!(
                "acoustic solution has {} nodes, mesh has {}",
                acoustic.pressures.nrows(),
                self.mesh.node_count()
            )));
        }
        let loads = self.acoustic_loads(acoustic)?;
        self.direct_with_loads(Some(&loads))
    }

    /// Wall loads of the mean element pressure, one column per frequency
    fn acoustic_loads(&self, acoustic: &AcousticSolution) -> FemResult<DMatrix<Complex64>> {
        let n_frequencies = acoustic.frequencies.len();
        let mut loads = DMatrix::from_element(self.mesh.dof_count(), n_frequencies, Complex64::new(0.0, 0.0));
        for element in self.mesh.structural_elements() {
            let carries_fluid = self
                .mesh
                .acoustic_element(element.index)
                .map(|a| a.fluid.is_some())
                .unwrap_or(false);
            if !carries_fluid {
                continue;
            }
            let geometry = self.mesh.element_geometry(element)?;
            let unit = element.unit_pressure_load(&geometry)?;
            if unit.iter().all(|f| *f == 0.0) {
                continue;
            }
            let dofs = self.mesh.element_dofs(element.first_node, element.last_node)?;
            let a = self.mesh.global_index(element.first_node)?;
            let b = self.mesh.global_index(element.last_node)?;
            for index in 0..n_frequencies {
                let p = (acoustic.pressures[(a, index)] + acoustic.pressures[(b, index)]) * 0.5;
                for (i, &dof) in dofs.iter().enumerate() {
                    loads[(dof, index)] += p * unit[i];
                }
            }
        }
        Ok(loads)
    }

    fn direct_with_loads(&self, extra: Option<&DMatrix<Complex64>>) -> FemResult<HarmonicSolution> {
        let start = Instant::now();
        let frequencies = &self.options.frequencies;
        let mut report = SolveReport::default();
        let assembly = self.assemble(frequencies.len(), &mut report)?;
        let reduced = assembly.reduce()?;
        let partition = &assembly.partition;
        let damping = &self.options.damping;

        let outcomes = sweep(frequencies.len(), |index| {
            if self.options.is_cancelled() {
                return FrequencyOutcome::Cancelled;
            }
            let omega = 2.0 * PI * frequencies[index];
            let mut f = assembly.load_vector(Some(index));
            if let Some(extra) = extra {
                f += extra.column(index);
            }
            let u_p = assembly.prescribed_values(Some(index));
            let system = reduced
                .effective_load(&partition.gather_free(&f), &u_p, omega, Some(index), damping)
                .and_then(|rhs| Ok((reduced.dynamic_matrix(omega, Some(index), damping)?, rhs)));
            let (a, rhs) = match system {
                Ok(system) => system,
                Err(err) => return FrequencyOutcome::Failed(err.to_string()),
            };
            match self.linear.solve(&a, &rhs) {
                Ok(u_f) => FrequencyOutcome::Solved(partition.scatter(&u_f, &u_p)),
                Err(reason) => FrequencyOutcome::Failed(reason),
            }
        });
        let displacements = collect_sweep(outcomes, frequencies, assembly.n_dofs(), &mut report);

        info!(
            "Direct harmonic analysis: {} frequencies, {} free DOFs in {:.1?}",
            frequencies.len(),
            partition.n_free(),
            start.elapsed()
        );
        Ok(HarmonicSolution {
            frequencies: frequencies.clone(),
            displacements,
            method: HarmonicMethod::Direct,
            report,
        })
    }

    // ========================
    // Mode superposition
    // ========================

    /// Harmonic response on a truncated modal basis
    ///
    /// Without lumped devices the modal equations decouple and each mode is
    /// solved in closed form. Lumped masses, springs, dampers and links are
    /// projected on the basis and the small modal system is solved densely.
    /// Non-zero prescribed values fall back to the direct method.
    pub fn mode_superposition(&self) -> FemResult<HarmonicSolution> {
        let start = Instant::now();
        let frequencies = &self.options.frequencies;
        let mut report = SolveReport::default();
        let assembly = self.assemble(frequencies.len(), &mut report)?;

        if assembly.has_nonzero_prescribed() {
            let mut solution = self.direct_harmonic()?;
            solution.report.warn(ModelWarning::ModeSuperpositionFallback {
                reason: "non-zero prescribed DOF values".to_string(),
            });
            solution.report.extend_warnings(report.warnings);
            return Ok(solution);
        }

        let reduced = assembly.reduce()?;
        let pairs = self.free_modes(&reduced)?;
        let basis = ModalBasis::new(&pairs);
        let partition = &assembly.partition;
        let zeros = DVector::from_element(partition.prescribed().len(), Complex64::new(0.0, 0.0));
        let coupled = assembly.has_lumped();
        let damping = &self.options.damping;

        let outcomes = sweep(frequencies.len(), |index| {
            if self.options.is_cancelled() {
                return FrequencyOutcome::Cancelled;
            }
            let omega = 2.0 * PI * frequencies[index];
            let f = partition.gather_free(&assembly.load_vector(Some(index)));
            let modal_load = basis.project(&f);
            let q = if coupled {
                reduced
                    .dynamic_matrix(omega, Some(index), damping)
                    .map_err(|err| err.to_string())
                    .and_then(|a| self.projected_response(&basis, &a, &modal_load))
            } else {
                self.decoupled_response(&basis, omega, &modal_load)
            };
            match q {
                Ok(q) => FrequencyOutcome::Solved(partition.scatter(&(&basis.vectors * q), &zeros)),
                Err(reason) => FrequencyOutcome::Failed(reason),
            }
        });
        let displacements = collect_sweep(outcomes, frequencies, assembly.n_dofs(), &mut report);

        info!(
            "Mode superposition: {} modes, {} frequencies in {:.1?}",
            basis.eigenvalues.len(),
            frequencies.len(),
            start.elapsed()
        );
        Ok(HarmonicSolution {
            frequencies: frequencies.clone(),
            displacements,
            method: HarmonicMethod::ModeSuperposition,
            report,
        })
    }

    /// q_i = φᵢᵀF / (λᵢ − ω² + j(βH·λᵢ + αH) + jω(βV·λᵢ + αV))
    fn decoupled_response(
        &self,
        basis: &ModalBasis,
        omega: f64,
        modal_load: &DVector<Complex64>,
    ) -> Result<DVector<Complex64>, String> {
        let (ck, cm) = self.options.damping.coefficients(omega);
        let mut q = modal_load.clone();
        for (i, &lambda) in basis.eigenvalues.iter().enumerate() {
            let d = lambda - omega * omega + J * (ck * lambda + cm);
            if d.norm() <= f64::EPSILON * lambda.abs().max(omega * omega) {
                return Err(format!("undamped resonance of mode {}", i + 1));
            }
            q[i] /= d;
        }
        Ok(q)
    }

    /// Solve Φᵀ·A(ω)·Φ·q = Φᵀ·F
    fn projected_response(
        &self,
        basis: &ModalBasis,
        a: &CsrMatrix<Complex64>,
        modal_load: &DVector<Complex64>,
    ) -> Result<DVector<Complex64>, String> {
        let k = basis.vectors.ncols();
        let mut a_phi = DMatrix::from_element(basis.vectors.nrows(), k, Complex64::new(0.0, 0.0));
        for i in 0..k {
            let column = basis.vectors.column(i).into_owned();
            a_phi.set_column(i, &sparse_matvec(a, &column));
        }
        let reduced = basis.vectors.transpose() * a_phi;
        solve_dense_complex(reduced, modal_load).ok_or_else(|| "modal system is singular".to_string())
    }

    // ========================
    // Post-processing
    // ========================

    /// Support reactions and forces in lumped springs, dampers and links
    ///
    /// Support reactions are the prescribed rows of A(ω)·u − F(ω).
    pub fn reactions(&self, solution: &HarmonicSolution) -> FemResult<Reactions> {
        if solution.frequencies.len() != solution.displacements.ncols() {
            return Err(FemError::InvalidInput(
                "solution has inconsistent frequency columns".to_string(),
            ));
        }
        let mut report = SolveReport::default();
        let assembly = self.assemble(solution.frequencies.len(), &mut report)?;
        let damping = &self.options.damping;
        let prescribed = assembly.partition.prescribed();
        let nf = solution.frequencies.len();

        let mut supports: Vec<DofReaction> = Vec::with_capacity(prescribed.len());
        for &dof in prescribed {
            supports.push(DofReaction {
                node: self.external_node(dof)?,
                dof: dof % 6,
                values: vec![Complex64::new(0.0, 0.0); nf],
            });
        }
        if !prescribed.is_empty() {
            for (index, &frequency) in solution.frequencies.iter().enumerate() {
                let omega = 2.0 * PI * frequency;
                let a = assembly.dynamic_matrix(omega, Some(index), damping)?;
                let u = solution.at_frequency(index);
                let residual = sparse_matvec(&a, &u) - assembly.load_vector(Some(index));
                for (reaction, &dof) in supports.iter_mut().zip(prescribed) {
                    reaction.values[index] = residual[dof];
                }
            }
        }

        let mut springs = Vec::new();
        let mut dampers = Vec::new();
        for node in self.mesh.nodes() {
            let g = self.mesh.global_index(node.external_index)?;
            for k in 0..6 {
                let dof = 6 * g + k;
                let stiffness = &node.lumped_stiffness[k];
                if stiffness.is_set() {
                    springs.push(DofReaction {
                        node: node.external_index,
                        dof: k,
                        values: (0..nf)
                            .map(|i| stiffness.value_at(i) * solution.displacements[(dof, i)])
                            .collect(),
                    });
                }
                let dashpot = &node.lumped_dampings[k];
                if dashpot.is_set() {
                    dampers.push(DofReaction {
                        node: node.external_index,
                        dof: k,
                        values: (0..nf)
                            .map(|i| {
                                let omega = 2.0 * PI * solution.frequencies[i];
                                J * omega * dashpot.value_at(i) * solution.displacements[(dof, i)]
                            })
                            .collect(),
                    });
                }
            }
        }

        let mut links = Vec::new();
        for (&(a, b), link) in self.mesh.elastic_links() {
            let ga = self.mesh.global_index(a)?;
            let gb = self.mesh.global_index(b)?;
            for k in 0..6 {
                if link.stiffness[k] == 0.0 && link.damping[k] == 0.0 {
                    continue;
                }
                let values = (0..nf)
                    .map(|i| {
                        let omega = 2.0 * PI * solution.frequencies[i];
                        let stretch =
                            solution.displacements[(6 * gb + k, i)] - solution.displacements[(6 * ga + k, i)];
                        (link.stiffness[k] + J * omega * link.damping[k]) * stretch
                    })
                    .collect();
                links.push(LinkReaction {
                    nodes: (a, b),
                    dof: k,
                    values,
                });
            }
        }

        debug!(
            "Reactions: {} supports, {} springs, {} dampers, {} links",
            supports.len(),
            springs.len(),
            dampers.len(),
            links.len()
        );
        Ok(Reactions {
            frequencies: solution.frequencies.clone(),
            supports,
            springs,
            dampers,
            links,
        })
    }

    fn external_node(&self, dof: usize) -> FemResult<usize> {
        self.mesh
            .external_index(dof / 6)
            .ok_or_else(|| FemError::InvalidInput(format!("DOF {} has no node", dof)))
    }

    /// Internal end loads and pipe stresses of every element at every frequency
    pub fn stresses(&self, solution: &HarmonicSolution) -> FemResult<Vec<ElementStresses>> {
        if solution.displacements.nrows() != self.mesh.dof_count() {
            return Err(FemError::InvalidInput(format!(
                "solution has {} DOFs, mesh has {}",
                solution.displacements.nrows(),
                self.mesh.dof_count()
            )));
        }
        let elements: Vec<&StructuralElement> = self.mesh.structural_elements().collect();
        element_stresses(self.mesh, &elements, solution)
    }
}

fn stresses_of(mesh: &Mesh, element: &StructuralElement, solution: &HarmonicSolution) -> FemResult<ElementStresses> {
    let geometry = mesh.element_geometry(element)?;
    let dofs = mesh.element_dofs(element.first_node, element.last_node)?;
    let nf = solution.frequencies.len();
    let mut internal_loads: Vec<InternalLoads> = Vec::with_capacity(nf);
    let mut stresses = Vec::with_capacity(nf);
    for index in 0..nf {
        let u = solution.element_displacements(&dofs, index);
        let loads = element.internal_loads(&geometry, &u)?;
        // Expansion joints carry no wall
        let stress = match element.element_type {
            StructuralElementType::ExpansionJoint(_) => PipeStress::default(),
            _ => element.stresses(&loads)?,
        };
        internal_loads.push(loads);
        stresses.push(stress);
    }
    Ok(ElementStresses {
        element: element.index,
        internal_loads,
        stresses,
    })
}

#[cfg(feature = "parallel")]
fn element_stresses(
    mesh: &Mesh,
    elements: &[&StructuralElement],
    solution: &HarmonicSolution,
) -> FemResult<Vec<ElementStresses>> {
    elements
        .par_iter()
        .map(|element| stresses_of(mesh, element, solution))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn element_stresses(
    mesh: &Mesh,
    elements: &[&StructuralElement],
    solution: &HarmonicSolution,
) -> FemResult<Vec<ElementStresses>> {
    elements
        .iter()
        .map(|element| stresses_of(mesh, element, solution))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::GlobalDamping;
    use crate::elements::{CrossSection, Material};
    use crate::loads::{unconstrained, BoundaryValue};
    use crate::mesh::{ElasticLink, ElementRecord, NodeRecord};
    use approx::assert_relative_eq;

    fn pipe_line(n_elements: usize, length: f64) -> Mesh {
        let nodes: Vec<NodeRecord> = (0..=n_elements)
            .map(|i| NodeRecord {
                index: i + 1,
                x: length * i as f64 / n_elements as f64,
                y: 0.0,
                z: 0.0,
            })
            .collect();
        let elements: Vec<ElementRecord> = (0..n_elements)
            .map(|i| ElementRecord {
                index: i + 1,
                first_node: i + 1,
                last_node: i + 2,
            })
            .collect();
        let mut mesh = Mesh::from_records(&nodes, &elements).unwrap();
        let all = mesh.all_elements();
        mesh.set_material_by_elements(&all, Material::steel()).unwrap();
        mesh.set_cross_section_by_elements(&all, CrossSection::pipe(0.05, 0.008)).unwrap();
        mesh
    }

    fn clamp(mesh: &mut Mesh, node: usize) {
        let mut fixed = unconstrained();
        for dof in fixed.iter_mut() {
            *dof = BoundaryValue::real(0.0);
        }
        mesh.set_prescribed_dofs(&[node], &fixed).unwrap();
    }

    fn tip_load(mesh: &mut Mesh, node: usize, dof: usize, value: f64) {
        let mut load = unconstrained();
        load[dof] = BoundaryValue::real(value);
        mesh.set_nodal_loads(&[node], &load).unwrap();
    }

    #[test]
    fn test_static_cantilever_tip_deflection() {
        let mut mesh = pipe_line(4, 2.0);
        let section = CrossSection::pipe(0.05, 0.008).without_shear_deformation();
        let all = mesh.all_elements();
        mesh.set_cross_section_by_elements(&all, section.clone()).unwrap();
        clamp(&mut mesh, 1);
        tip_load(&mut mesh, 5, 1, -1000.0);

        let solver = StructuralSolver::new(&mesh, AnalysisOptions::static_analysis()).unwrap();
        let solution = solver.static_analysis().unwrap();
        let tip = solution
            .node_displacement(mesh.global_index(5).unwrap())
            .unwrap();
        let steel = Material::steel();
        let expected = -1000.0 * 8.0 / (3.0 * steel.e * section.iz);
        assert_relative_eq!(tip.dy, expected, max_relative = 1e-6);
        assert!(solution.report.warnings.is_empty());
    }

    #[test]
    fn test_static_settlement_moves_the_free_end() {
        let mut mesh = pipe_line(2, 1.0);
        clamp(&mut mesh, 1);
        let mut settled = unconstrained();
        settled[2] = BoundaryValue::real(0.002);
        mesh.set_prescribed_dofs(&[3], &settled).unwrap();

        let solver = StructuralSolver::new(&mesh, AnalysisOptions::static_analysis()).unwrap();
        let solution = solver.static_analysis().unwrap();
        let g = mesh.global_index(3).unwrap();
        assert_relative_eq!(solution.displacements[6 * g + 2], 0.002, epsilon = 1e-15);
        let middle = mesh.global_index(2).unwrap();
        assert!(solution.displacements[6 * middle + 2] > 0.0);
    }

    #[test]
    fn test_unsupported_structure_is_singular_in_statics() {
        let mut mesh = pipe_line(2, 1.0);
        tip_load(&mut mesh, 3, 0, 10.0);
        let solver = StructuralSolver::new(&mesh, AnalysisOptions::static_analysis()).unwrap();
        assert!(matches!(solver.static_analysis(), Err(FemError::SingularMatrix(_))));
    }

    #[test]
    fn test_modal_ignores_nonzero_prescribed_values() {
        let mut mesh = pipe_line(6, 1.5);
        clamp(&mut mesh, 1);
        let mut settled = unconstrained();
        settled[1] = BoundaryValue::real(0.01);
        mesh.set_prescribed_dofs(&[7], &settled).unwrap();

        let solver = StructuralSolver::new(&mesh, AnalysisOptions::modal(4)).unwrap();
        let solution = solver.modal_analysis().unwrap();
        assert_eq!(solution.num_modes(), 4);
        assert!(solution
            .report
            .warnings
            .contains(&ModelWarning::PrescribedValuesIgnored { nodes: vec![7] }));
        let g = mesh.global_index(7).unwrap();
        assert_eq!(solution.modes[(6 * g + 1, 0)], 0.0);
        assert!(solution
            .natural_frequencies
            .windows(2)
            .all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_lumped_mass_lowers_the_frequencies() {
        let mut mesh = pipe_line(6, 1.5);
        clamp(&mut mesh, 1);
        let bare = StructuralSolver::new(&mesh, AnalysisOptions::modal(2))
            .unwrap()
            .modal_analysis()
            .unwrap();

        let mut mass = unconstrained();
        for dof in mass.iter_mut().take(3) {
            *dof = BoundaryValue::real(5.0);
        }
        mesh.set_lumped_masses(&[7], &mass).unwrap();
        let loaded = StructuralSolver::new(&mesh, AnalysisOptions::modal(2))
            .unwrap()
            .modal_analysis()
            .unwrap();
        assert!(loaded.natural_frequencies[0] < bare.natural_frequencies[0]);
    }

    #[test]
    fn test_projected_superposition_with_a_spring() {
        let mut mesh = pipe_line(4, 1.0);
        clamp(&mut mesh, 1);
        let mut spring = unconstrained();
        spring[1] = BoundaryValue::real(2.0e5);
        mesh.set_lumped_stiffness(&[5], &spring).unwrap();
        tip_load(&mut mesh, 5, 1, 1.0);

        let frequencies = vec![15.0, 30.0, 90.0];
        let damping = GlobalDamping::hysteretic(0.02);
        let direct = StructuralSolver::new(
            &mesh,
            AnalysisOptions::direct_harmonic(frequencies.clone()).with_damping(damping),
        )
        .unwrap()
        .direct_harmonic()
        .unwrap();
        // All 24 free modes span the free space exactly
        let modal = StructuralSolver::new(
            &mesh,
            AnalysisOptions::mode_superposition(frequencies, 24).with_damping(damping),
        )
        .unwrap()
        .mode_superposition()
        .unwrap();
        assert_eq!(modal.method, HarmonicMethod::ModeSuperposition);

        let dof = 6 * mesh.global_index(5).unwrap() + 1;
        for i in 0..3 {
            let a = direct.displacements[(dof, i)];
            let b = modal.displacements[(dof, i)];
            assert_relative_eq!((a - b).norm() / a.norm(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_superposition_falls_back_with_settlement() {
        let mut mesh = pipe_line(3, 1.0);
        clamp(&mut mesh, 1);
        let mut settled = unconstrained();
        settled[2] = BoundaryValue::real(0.001);
        mesh.set_prescribed_dofs(&[4], &settled).unwrap();

        let solver =
            StructuralSolver::new(&mesh, AnalysisOptions::mode_superposition(vec![20.0], 6)).unwrap();
        let solution = solver.harmonic().unwrap();
        assert_eq!(solution.method, HarmonicMethod::Direct);
        assert!(matches!(
            solution.report.warnings.as_slice(),
            [ModelWarning::ModeSuperpositionFallback { .. }]
        ));
        let g = mesh.global_index(4).unwrap();
        assert_relative_eq!(solution.displacements[(6 * g + 2, 0)].re, 0.001, epsilon = 1e-15);
    }

    #[test]
    fn test_support_reaction_balances_the_load() {
        let mut mesh = pipe_line(4, 1.0);
        clamp(&mut mesh, 1);
        tip_load(&mut mesh, 5, 2, 100.0);

        // Far below the first mode the reaction is the static one
        let solver = StructuralSolver::new(&mesh, AnalysisOptions::direct_harmonic(vec![0.01])).unwrap();
        let solution = solver.direct_harmonic().unwrap();
        let reactions = solver.reactions(&solution).unwrap();
        let fz = reactions.support(1, 2).unwrap()[0];
        assert_relative_eq!(fz.re, -100.0, max_relative = 1e-6);
        let my = reactions.support(1, 4).unwrap()[0];
        assert_relative_eq!(my.re.abs(), 100.0, max_relative = 1e-6);
    }

    #[test]
    fn test_link_force_is_stiffness_times_stretch() {
        let mut mesh = pipe_line(2, 1.0);
        mesh.add_node(10, 1.0, 0.5, 0.0).unwrap();
        clamp(&mut mesh, 1);
        clamp(&mut mesh, 10);
        mesh.add_elastic_link(3, 10, ElasticLink::isotropic(1.0e6, 1.0e4)).unwrap();
        tip_load(&mut mesh, 3, 1, 50.0);

        let solver = StructuralSolver::new(&mesh, AnalysisOptions::direct_harmonic(vec![0.01])).unwrap();
        let solution = solver.direct_harmonic().unwrap();
        let reactions = solver.reactions(&solution).unwrap();
        let link = reactions
            .links
            .iter()
            .find(|l| l.nodes == (3, 10) && l.dof == 1)
            .unwrap();
        let u = solution.displacements[(6 * mesh.global_index(3).unwrap() + 1, 0)];
        assert_relative_eq!(link.values[0].re, -1.0e6 * u.re, max_relative = 1e-9);
        // The clamped far node takes the link force
        let support = reactions.support(10, 1).unwrap()[0];
        assert_relative_eq!(support.re, -1.0e6 * u.re, max_relative = 1e-6);
    }

    #[test]
    fn test_cancelled_sweep_leaves_zero_columns() {
        let mut mesh = pipe_line(2, 1.0);
        clamp(&mut mesh, 1);
        tip_load(&mut mesh, 3, 1, 1.0);
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let options = AnalysisOptions::direct_harmonic(vec![10.0, 20.0]).with_cancel_flag(flag);
        let solution = StructuralSolver::new(&mesh, options).unwrap().direct_harmonic().unwrap();
        assert_eq!(solution.report.cancelled, vec![0, 1]);
        assert!(solution.displacements.iter().all(|u| u.norm() == 0.0));
    }

    #[test]
    fn test_stresses_of_a_static_like_response() {
        let mut mesh = pipe_line(2, 1.0);
        clamp(&mut mesh, 1);
        tip_load(&mut mesh, 3, 0, 1000.0);
        let solver = StructuralSolver::new(&mesh, AnalysisOptions::direct_harmonic(vec![0.01])).unwrap();
        let solution = solver.direct_harmonic().unwrap();
        let stresses = solver.stresses(&solution).unwrap();
        assert_eq!(stresses.len(), 2);
        let area = CrossSection::pipe(0.05, 0.008).area;
        for element in &stresses {
            assert_relative_eq!(element.stresses[0].axial, 1000.0 / area, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_geometric_stiffening_from_tension() {
        let mut mesh = pipe_line(8, 4.0);
        clamp(&mut mesh, 1);
        let mut pinned = unconstrained();
        for dof in pinned.iter_mut().take(3).skip(1) {
            *dof = BoundaryValue::real(0.0);
        }
        mesh.set_prescribed_dofs(&[9], &pinned).unwrap();
        tip_load(&mut mesh, 9, 0, 2.0e5);

        let plain = StructuralSolver::new(&mesh, AnalysisOptions::modal(1))
            .unwrap()
            .modal_analysis()
            .unwrap();
        let stiffened = StructuralSolver::new(&mesh, AnalysisOptions::modal(1).with_geometric_stiffening())
            .unwrap()
            .modal_analysis()
            .unwrap();
        assert!(stiffened.natural_frequencies[0] > plain.natural_frequencies[0]);
    }
}
