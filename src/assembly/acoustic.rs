//! Acoustic admittance assembly over one pressure DOF per node

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::sync::Arc;

use log::{debug, info};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{DofPartition, ReducedBlocks};
use crate::analysis::IterationControl;
use crate::elements::{
    radiation_admittance, specific_impedance_admittance, AcousticElement, Admittance, Fluid,
    PerforatedPlate,
};
use crate::error::{FemError, FemResult};
use crate::loads::BoundaryValue;
use crate::math::SparseMatrixBuilder;
use crate::mesh::Mesh;
use crate::results::ModelWarning;

/// Element admittance over all frequencies with its global DOFs
struct ElementAdmittance {
    dofs: [usize; 2],
    admittance: Admittance,
}

fn element_admittance(
    mesh: &Mesh,
    element: &AcousticElement,
    frequencies: &[f64],
    control: &IterationControl,
) -> FemResult<ElementAdmittance> {
    let dofs = mesh.acoustic_dofs(element.first_node, element.last_node)?;
    let length = mesh.element_length(element.first_node, element.last_node)?;
    let admittance = element.admittance(frequencies, length, control)?;
    Ok(ElementAdmittance { dofs, admittance })
}

#[cfg(feature = "parallel")]
fn element_admittances(
    mesh: &Mesh,
    elements: &[&AcousticElement],
    frequencies: &[f64],
    control: &IterationControl,
) -> FemResult<Vec<ElementAdmittance>> {
    elements
        .par_iter()
        .map(|element| element_admittance(mesh, element, frequencies, control))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn element_admittances(
    mesh: &Mesh,
    elements: &[&AcousticElement],
    frequencies: &[f64],
    control: &IterationControl,
) -> FemResult<Vec<ElementAdmittance>> {
    elements
        .iter()
        .map(|element| element_admittance(mesh, element, frequencies, control))
        .collect()
}

/// Perforated plate placed on an element, solved together with the pressures
#[derive(Debug, Clone)]
pub struct PlateCoupling {
    pub element: usize,
    pub dofs: [usize; 2],
    /// Duct area in m²
    pub area: f64,
    pub plate: PerforatedPlate,
    pub fluid: Arc<Fluid>,
}

impl PlateCoupling {
    /// Admittance at ω for a particle velocity estimate in the holes
    pub fn admittance(&self, omega: f64, particle_velocity: f64) -> [Complex64; 4] {
        let z = self.plate.impedance(omega, &self.fluid, particle_velocity);
        PerforatedPlate::admittance(self.area, z)
    }

    /// Approach particle velocity from the pressure jump across the plate
    pub fn particle_velocity(&self, pressure_jump: Complex64, impedance: Complex64) -> f64 {
        if impedance.norm() == 0.0 {
            return 0.0;
        }
        (pressure_jump / impedance).norm()
    }

    pub fn impedance(&self, omega: f64, particle_velocity: f64) -> Complex64 {
        self.plate.impedance(omega, &self.fluid, particle_velocity)
    }
}

/// Duct area, radius and fluid at a node, from the first acoustic element touching it
fn termination(mesh: &Mesh, node: usize) -> Option<(f64, f64, Arc<Fluid>)> {
    mesh.acoustic_elements()
        .find(|e| e.first_node == node || e.last_node == node)
        .and_then(|e| {
            let section = e.cross_section.as_ref()?;
            let fluid = e.fluid.clone()?;
            Some((section.fluid_area(), section.inner_diameter / 2.0, fluid))
        })
}

/// Free and prescribed pressure DOFs with the prescribed values in partition order
///
/// Nodes outside the acoustic model are held at zero pressure.
pub(crate) fn pressure_partition(mesh: &Mesh) -> FemResult<(DofPartition, Vec<BoundaryValue>)> {
    let mut active = BTreeSet::new();
    for element in mesh.acoustic_elements() {
        active.insert(mesh.global_index(element.first_node)?);
        active.insert(mesh.global_index(element.last_node)?);
    }
    for (&(a, b), _) in mesh.acoustic_links() {
        active.insert(mesh.global_index(a)?);
        active.insert(mesh.global_index(b)?);
    }

    // Nodes come in global order
    let mut dofs = Vec::new();
    let mut values = Vec::new();
    for node in mesh.nodes() {
        let g = mesh.global_index(node.external_index)?;
        if !active.contains(&g) {
            dofs.push(g);
            values.push(BoundaryValue::real(0.0));
        } else if node.acoustic_pressure.is_set() {
            dofs.push(g);
            values.push(node.acoustic_pressure.clone());
        }
    }
    Ok((DofPartition::new(mesh.node_count(), &dofs), values))
}

/// Global acoustic system of a mesh over a frequency list
#[derive(Debug, Clone)]
pub struct AcousticAssembly {
    pub frequencies: Vec<f64>,
    /// Admittance over all nodes, one matrix per frequency, plates excluded
    pub admittance: Vec<CsrMatrix<Complex64>>,
    pub partition: DofPartition,
    pub plates: Vec<PlateCoupling>,
    /// Validity warnings raised by the elements
    pub warnings: Vec<ModelWarning>,
    prescribed: Vec<BoundaryValue>,
    sources: Vec<(usize, Vec<Complex64>)>,
}

impl AcousticAssembly {
    pub fn assemble(mesh: &Mesh, frequencies: &[f64], control: &IterationControl) -> FemResult<Self> {
        if frequencies.is_empty() {
            return Err(FemError::Configuration(
                "acoustic analysis requires at least one frequency".to_string(),
            ));
        }
        if let Some(f) = frequencies.iter().find(|f| !(**f > 0.0) || !f.is_finite()) {
            return Err(FemError::Configuration(format!(
                "acoustic frequencies must be positive, got {}",
                f
            )));
        }
        let elements: Vec<&AcousticElement> = mesh.acoustic_elements().collect();
        if elements.is_empty() {
            return Err(FemError::Configuration(
                "no element has a fluid assigned".to_string(),
            ));
        }
        for element in &elements {
            element.validate()?;
        }
        mesh.validate_tables(frequencies.len())?;

        let n = mesh.node_count();
        let nf = frequencies.len();

        let mut plates = Vec::new();
        let mut regular = Vec::with_capacity(elements.len());
        for element in elements.iter().copied() {
            match element.perforated_plate {
                Some(plate) => plates.push(PlateCoupling {
                    element: element.index,
                    dofs: mesh.acoustic_dofs(element.first_node, element.last_node)?,
                    area: element.area()?,
                    plate,
                    fluid: Arc::new(element.fluid()?.clone()),
                }),
                None => regular.push(element),
            }
        }

        let computed = element_admittances(mesh, &regular, frequencies, control)?;
        let mut warnings: Vec<ModelWarning> = Vec::new();
        let mut builders: Vec<SparseMatrixBuilder<Complex64>> =
            (0..nf).map(|_| SparseMatrixBuilder::new(n)).collect();
        for element in computed {
            let [a, b] = element.dofs;
            for (builder, y) in builders.iter_mut().zip(element.admittance.values.iter()) {
                builder.add(a, a, y[0]);
                builder.add(a, b, y[1]);
                builder.add(b, a, y[2]);
                builder.add(b, b, y[3]);
            }
            warnings.extend(element.admittance.warnings);
        }

        // Terminations and wall impedances
        for node in mesh.nodes() {
            let has_termination = node.radiation_impedance.is_some() || node.specific_impedance.is_set();
            if !has_termination {
                continue;
            }
            let g = mesh.global_index(node.external_index)?;
            let Some((area, radius, fluid)) = termination(mesh, node.external_index) else {
                continue;
            };
            for (i, builder) in builders.iter_mut().enumerate() {
                if let Some(kind) = node.radiation_impedance {
                    let k = 2.0 * PI * frequencies[i] / fluid.speed_of_sound;
                    builder.add(g, g, radiation_admittance(kind, &fluid, area, radius, k));
                }
                if node.specific_impedance.is_set() {
                    let z = node.specific_impedance.value_at(i);
                    builder.add(g, g, specific_impedance_admittance(area, z));
                }
            }
        }

        for (&(a, b), link) in mesh.acoustic_links() {
            let ga = mesh.global_index(a)?;
            let gb = mesh.global_index(b)?;
            for (i, builder) in builders.iter_mut().enumerate() {
                let z = link.impedance.value_at(i);
                if z.norm() == 0.0 {
                    continue;
                }
                let y = z.inv();
                builder.add(ga, ga, y);
                builder.add(gb, gb, y);
                builder.add(ga, gb, -y);
                builder.add(gb, ga, -y);
            }
        }

        let (partition, prescribed) = pressure_partition(mesh)?;
        let mut sources = Vec::new();
        for node in mesh.nodes() {
            let g = mesh.global_index(node.external_index)?;
            if node.has_acoustic_source() && !partition.prescribed().contains(&g) {
                sources.push((g, (0..nf).map(|i| node.volume_velocity_at(i)).collect()));
            }
        }

        info!(
            "Assembled {} acoustic elements ({} perforated plates): {} nodes, {} free, {} frequencies",
            elements.len(),
            plates.len(),
            n,
            partition.n_free(),
            nf
        );
        debug!("Acoustic model raised {} warnings", warnings.len());

        Ok(Self {
            frequencies: frequencies.to_vec(),
            admittance: builders
                .iter()
                .map(SparseMatrixBuilder::to_csr)
                .collect::<FemResult<Vec<_>>>()?,
            partition,
            plates,
            warnings,
            prescribed,
            sources,
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.partition.size()
    }

    /// Prescribed pressures in partition order
    pub fn prescribed_values(&self, index: usize) -> DVector<Complex64> {
        DVector::from_iterator(
            self.prescribed.len(),
            self.prescribed.iter().map(|value| value.value_at(index)),
        )
    }

    /// Volume velocity sources over all nodes
    pub fn source_vector(&self, index: usize) -> DVector<Complex64> {
        let mut q = DVector::from_element(self.n_nodes(), Complex64::new(0.0, 0.0));
        for (g, values) in &self.sources {
            q[*g] += values.get(index).copied().unwrap_or_default();
        }
        q
    }

    /// Free and cross blocks at one frequency, with plate admittances added
    pub fn reduce(&self, index: usize, plates: &[[Complex64; 4]]) -> FemResult<ReducedAcousticSystem> {
        let n = self.n_nodes();
        let full = if plates.is_empty() {
            self.admittance[index].clone()
        } else {
            let mut builder = SparseMatrixBuilder::new(n);
            for (row, col, &value) in self.admittance[index].triplet_iter() {
                builder.add(row, col, value);
            }
            for (coupling, y) in self.plates.iter().zip(plates.iter()) {
                let [a, b] = coupling.dofs;
                builder.add(a, a, y[0]);
                builder.add(a, b, y[1]);
                builder.add(b, a, y[2]);
                builder.add(b, b, y[3]);
            }
            builder.to_csr()?
        };
        let blocks = ReducedBlocks::new(&full, &self.partition)?;
        Ok(ReducedAcousticSystem {
            admittance: blocks.ff,
            cross: blocks.fp,
        })
    }

    /// Lossless FE stiffness and mass for acoustic modal analysis
    pub fn modal_matrices(mesh: &Mesh) -> FemResult<(CsrMatrix<f64>, CsrMatrix<f64>)> {
        let n = mesh.node_count();
        let mut k = SparseMatrixBuilder::new(n);
        let mut m = SparseMatrixBuilder::new(n);
        for element in mesh.acoustic_elements() {
            element.validate()?;
            let dofs = mesh.acoustic_dofs(element.first_node, element.last_node)?;
            let length = mesh.element_length(element.first_node, element.last_node)?;
            let (ke, me) = element.modal_matrices(length)?;
            k.add_element(&dofs, |i, j| ke[2 * i + j]);
            m.add_element(&dofs, |i, j| me[2 * i + j]);
        }
        Ok((k.to_csr()?, m.to_csr()?))
    }
}

/// Free/free admittance and free/prescribed coupling at one frequency
#[derive(Debug, Clone)]
pub struct ReducedAcousticSystem {
    pub admittance: CsrMatrix<Complex64>,
    pub cross: CsrMatrix<Complex64>,
}

impl ReducedAcousticSystem {
    /// Right-hand side Q_f − Y_fp·p_p
    pub fn effective_source(
        &self,
        free_source: &DVector<Complex64>,
        prescribed: &DVector<Complex64>,
    ) -> DVector<Complex64> {
        if prescribed.iter().all(|p| p.norm() == 0.0) {
            return free_source.clone();
        }
        free_source - crate::math::sparse_matvec(&self.cross, prescribed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::CrossSection;
    use crate::mesh::{ElementRecord, NodeRecord};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn duct(n_elements: usize, length: f64) -> Mesh {
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
        mesh.set_fluid_by_elements(&all, Some(Fluid::air())).unwrap();
        mesh.set_cross_section_by_elements(&all, CrossSection::duct(0.05)).unwrap();
        mesh
    }

    #[test]
    fn test_non_positive_frequency_is_rejected() {
        let mesh = duct(2, 1.0);
        let err = AcousticAssembly::assemble(&mesh, &[0.0, 10.0], &IterationControl::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_admittance_rows_of_an_undamped_chain() {
        let mesh = duct(3, 0.9);
        let assembly = AcousticAssembly::assemble(&mesh, &[50.0], &IterationControl::default()).unwrap();
        let y = DMatrix::from(&assembly.admittance[0]);
        // Interior node carries the diagonal of two elements
        let air = Fluid::air();
        let area = CrossSection::duct(0.05).fluid_area();
        let kl = 2.0 * PI * 50.0 / air.speed_of_sound * 0.3;
        let diag = -2.0 * area / (air.impedance() * kl.tan());
        let g = mesh.global_index(2).unwrap();
        assert_relative_eq!(y[(g, g)].im, diag, max_relative = 1e-9);
        assert!(y[(g, g)].re.abs() < 1e-15);
    }

    #[test]
    fn test_sources_and_prescribed_pressures() {
        let mut mesh = duct(2, 1.0);
        mesh.set_volume_velocity(&[1], BoundaryValue::real(1e-3)).unwrap();
        mesh.add_compressor_excitation(1, vec![Complex64::new(1e-3, 0.0), Complex64::new(2e-3, 0.0)])
            .unwrap();
        mesh.set_acoustic_pressure(&[3], BoundaryValue::real(0.0)).unwrap();

        let assembly =
            AcousticAssembly::assemble(&mesh, &[100.0, 200.0], &IterationControl::default()).unwrap();
        assert_eq!(assembly.partition.prescribed(), &[mesh.global_index(3).unwrap()]);
        let q = assembly.source_vector(1);
        assert_relative_eq!(q[mesh.global_index(1).unwrap()].re, 3e-3, epsilon = 1e-15);
    }

    #[test]
    fn test_nodes_outside_the_duct_are_held_at_zero() {
        let mut mesh = duct(2, 1.0);
        mesh.add_node(10, 5.0, 0.0, 0.0).unwrap();
        let assembly = AcousticAssembly::assemble(&mesh, &[100.0], &IterationControl::default()).unwrap();
        let g = mesh.global_index(10).unwrap();
        assert!(assembly.partition.prescribed().contains(&g));
    }

    #[test]
    fn test_modal_matrices_are_consistent() {
        let mesh = duct(4, 1.0);
        let (k, m) = AcousticAssembly::modal_matrices(&mesh).unwrap();
        let k = DMatrix::from(&k);
        let m = DMatrix::from(&m);
        // Constant pressure is a zero-energy mode; total mass is A·L/(ρc²)
        let ones = nalgebra::DVector::from_element(5, 1.0);
        assert!((&k * &ones).norm() < 1e-12);
        let air = Fluid::air();
        let total = ones.dot(&(&m * &ones));
        assert_relative_eq!(total, CrossSection::duct(0.05).fluid_area() / air.bulk_modulus(), max_relative = 1e-12);
    }
}
