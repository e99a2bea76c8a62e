//! Structural global matrices, lumped contributions and load vectors

use log::{debug, info};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{ComplexCombination, DofPartition, LumpedMatrices, ReducedBlocks};
use crate::analysis::GlobalDamping;
use crate::elements::{Node, StructuralElement};
use crate::error::FemResult;
use crate::loads::{BoundaryValue, DofValues};
use crate::math::{transformation_matrix, Mat12, SparseMatrixBuilder, Vec12};
use crate::mesh::{ElasticLink, Mesh};

type Builders = (SparseMatrixBuilder<f64>, SparseMatrixBuilder<f64>);

/// Element matrices scattered through their global DOFs
struct ElementBlock {
    dofs: [usize; 12],
    stiffness: Mat12,
    mass: Mat12,
}

fn element_block(
    mesh: &Mesh,
    element: &StructuralElement,
    static_displacement: Option<&DVector<f64>>,
) -> FemResult<ElementBlock> {
    let geometry = mesh.element_geometry(element)?;
    let dofs = mesh.element_dofs(element.first_node, element.last_node)?;
    let static_local = static_displacement.map(|u| {
        let u_global = Vec12::from_fn(|i, _| u[dofs[i]]);
        transformation_matrix(&geometry.rotation) * u_global
    });
    let (stiffness, mass) = element.global_matrices(&geometry, static_local.as_ref())?;
    Ok(ElementBlock {
        dofs,
        stiffness,
        mass,
    })
}

fn empty_builders(n: usize) -> Builders {
    (SparseMatrixBuilder::new(n), SparseMatrixBuilder::new(n))
}

fn scatter((mut k, mut m): Builders, block: ElementBlock) -> Builders {
    k.add_element(&block.dofs, |i, j| block.stiffness[(i, j)]);
    m.add_element(&block.dofs, |i, j| block.mass[(i, j)]);
    (k, m)
}

/// Element matrices evaluated in parallel, one triplet list per worker
#[cfg(feature = "parallel")]
fn assemble_elements(
    mesh: &Mesh,
    elements: &[&StructuralElement],
    static_displacement: Option<&DVector<f64>>,
    n: usize,
) -> FemResult<Builders> {
    elements
        .par_iter()
        .map(|element| element_block(mesh, element, static_displacement))
        .try_fold(|| empty_builders(n), |acc, block| block.map(|b| scatter(acc, b)))
        .try_reduce(
            || empty_builders(n),
            |(mut k, mut m), (k2, m2)| {
                k.merge(k2);
                m.merge(m2);
                Ok((k, m))
            },
        )
}

/// Element matrices evaluated sequentially
#[cfg(not(feature = "parallel"))]
fn assemble_elements(
    mesh: &Mesh,
    elements: &[&StructuralElement],
    static_displacement: Option<&DVector<f64>>,
    n: usize,
) -> FemResult<Builders> {
    elements
        .iter()
        .map(|element| element_block(mesh, element, static_displacement))
        .try_fold(empty_builders(n), |acc, block| block.map(|b| scatter(acc, b)))
}

fn node_stiffness(node: &Node) -> &DofValues {
    &node.lumped_stiffness
}

fn node_mass(node: &Node) -> &DofValues {
    &node.lumped_masses
}

fn node_damping(node: &Node) -> &DofValues {
    &node.lumped_dampings
}

fn node_prescribed(node: &Node) -> &DofValues {
    &node.prescribed_dofs
}

fn node_loads(node: &Node) -> &DofValues {
    &node.nodal_loads
}

fn link_stiffness(link: &ElasticLink) -> &[f64; 6] {
    &link.stiffness
}

fn link_damping(link: &ElasticLink) -> &[f64; 6] {
    &link.damping
}

/// Diagonal node contributions plus two-node link couplings
fn lumped_matrix(
    mesh: &Mesh,
    index: Option<usize>,
    property: fn(&Node) -> &DofValues,
    link_part: Option<fn(&ElasticLink) -> &[f64; 6]>,
) -> FemResult<CsrMatrix<Complex64>> {
    let n = mesh.dof_count();
    let mut builder = SparseMatrixBuilder::new(n);
    for node in mesh.nodes() {
        let g = mesh.global_index(node.external_index)?;
        for (k, value) in property(node).iter().enumerate() {
            // Tables have no static value
            let v = match index {
                Some(i) => value.value_at(i),
                None if value.is_table() => continue,
                None => value.static_value(),
            };
            builder.add(6 * g + k, 6 * g + k, v);
        }
    }
    if let Some(part) = link_part {
        for (&(a, b), link) in mesh.elastic_links() {
            let ga = mesh.global_index(a)?;
            let gb = mesh.global_index(b)?;
            for (k, &value) in part(link).iter().enumerate() {
                let v = Complex64::new(value, 0.0);
                let (da, db) = (6 * ga + k, 6 * gb + k);
                builder.add(da, da, v);
                builder.add(db, db, v);
                builder.add(da, db, -v);
                builder.add(db, da, -v);
            }
        }
    }
    builder.to_csr()
}

fn lumped_matrices(
    mesh: &Mesh,
    n_frequencies: usize,
    property: fn(&Node) -> &DofValues,
    link_part: Option<fn(&ElasticLink) -> &[f64; 6]>,
) -> FemResult<LumpedMatrices<CsrMatrix<Complex64>>> {
    let tables = n_frequencies > 0
        && mesh
            .nodes()
            .any(|node| property(node).iter().any(BoundaryValue::is_table));
    if tables {
        let matrices = (0..n_frequencies)
            .map(|i| lumped_matrix(mesh, Some(i), property, link_part))
            .collect::<FemResult<Vec<_>>>()?;
        Ok(LumpedMatrices::PerFrequency(matrices))
    } else {
        Ok(LumpedMatrices::Shared(lumped_matrix(mesh, None, property, link_part)?))
    }
}

/// Non-empty boundary values in global DOF order
fn collect_dof_values(mesh: &Mesh, property: fn(&Node) -> &DofValues) -> FemResult<Vec<(usize, BoundaryValue)>> {
    let mut values = Vec::new();
    for node in mesh.nodes() {
        let g = mesh.global_index(node.external_index)?;
        for (k, value) in property(node).iter().enumerate() {
            if value.is_set() {
                values.push((6 * g + k, value.clone()));
            }
        }
    }
    Ok(values)
}

fn value_vector(n: usize, values: &[(usize, BoundaryValue)], index: Option<usize>) -> DVector<Complex64> {
    let mut v = DVector::from_element(n, Complex64::new(0.0, 0.0));
    for (dof, value) in values {
        v[*dof] += match index {
            Some(i) => value.value_at(i),
            None => value.static_value(),
        };
    }
    v
}

/// Global structural system of a mesh
#[derive(Debug, Clone)]
pub struct StructuralAssembly {
    pub stiffness: CsrMatrix<f64>,
    pub mass: CsrMatrix<f64>,
    pub lumped_stiffness: LumpedMatrices<CsrMatrix<Complex64>>,
    pub lumped_mass: LumpedMatrices<CsrMatrix<Complex64>>,
    pub lumped_damping: LumpedMatrices<CsrMatrix<Complex64>>,
    pub partition: DofPartition,
    prescribed: Vec<(usize, BoundaryValue)>,
    loads: Vec<(usize, BoundaryValue)>,
}

impl StructuralAssembly {
    /// Assemble all structural elements, lumped properties and links
    ///
    /// `n_frequencies` sizes per-frequency lumped matrices and is checked
    /// against every table; pass 0 for static and modal analysis.
    /// `static_displacement` adds the geometric stiffness of a static
    /// pre-solution.
    pub fn assemble(
        mesh: &Mesh,
        n_frequencies: usize,
        static_displacement: Option<&DVector<f64>>,
    ) -> FemResult<Self> {
        for element in mesh.structural_elements() {
            element.validate()?;
        }
        if n_frequencies > 0 {
            mesh.validate_tables(n_frequencies)?;
        }

        let n = mesh.dof_count();
        let elements: Vec<&StructuralElement> = mesh.structural_elements().collect();
        let (k, m) = assemble_elements(mesh, &elements, static_displacement, n)?;
        debug!("Structural triplets: {} stiffness, {} mass", k.nnz(), m.nnz());

        let lumped_stiffness =
            lumped_matrices(mesh, n_frequencies, node_stiffness, Some(link_stiffness))?;
        let lumped_mass = lumped_matrices(mesh, n_frequencies, node_mass, None)?;
        let lumped_damping =
            lumped_matrices(mesh, n_frequencies, node_damping, Some(link_damping))?;

        let prescribed = collect_dof_values(mesh, node_prescribed)?;
        let loads = collect_dof_values(mesh, node_loads)?;
        let prescribed_dofs: Vec<usize> = prescribed.iter().map(|(d, _)| *d).collect();
        let partition = DofPartition::new(n, &prescribed_dofs);

        info!(
            "Assembled {} elements: {} DOFs, {} free, {} prescribed",
            elements.len(),
            n,
            partition.n_free(),
            prescribed_dofs.len()
        );

        Ok(Self {
            stiffness: k.to_csr()?,
            mass: m.to_csr()?,
            lumped_stiffness,
            lumped_mass,
            lumped_damping,
            partition,
            prescribed,
            loads,
        })
    }

    pub fn n_dofs(&self) -> usize {
        self.partition.size()
    }

    /// Whether any lumped mass, spring, damper or link is present
    pub fn has_lumped(&self) -> bool {
        !(self.lumped_stiffness.is_empty() && self.lumped_mass.is_empty() && self.lumped_damping.is_empty())
    }

    /// Prescribed values in partition order
    pub fn prescribed_values(&self, index: Option<usize>) -> DVector<Complex64> {
        DVector::from_iterator(
            self.prescribed.len(),
            self.prescribed.iter().map(|(_, value)| match index {
                Some(i) => value.value_at(i),
                None => value.static_value(),
            }),
        )
    }

    pub fn has_nonzero_prescribed(&self) -> bool {
        self.prescribed.iter().any(|(_, value)| value.is_nonzero())
    }

    /// Full nodal load vector at a frequency index (`None` for static)
    pub fn load_vector(&self, index: Option<usize>) -> DVector<Complex64> {
        value_vector(self.n_dofs(), &self.loads, index)
    }

    /// Frequency-independent free and cross blocks
    pub fn reduce(&self) -> FemResult<ReducedStructuralSystem> {
        let p = &self.partition;
        Ok(ReducedStructuralSystem {
            stiffness: ReducedBlocks::new(&self.stiffness, p)?,
            mass: ReducedBlocks::new(&self.mass, p)?,
            lumped_stiffness: self.lumped_stiffness.try_map(|m| ReducedBlocks::new(m, p))?,
            lumped_mass: self.lumped_mass.try_map(|m| ReducedBlocks::new(m, p))?,
            lumped_damping: self.lumped_damping.try_map(|m| ReducedBlocks::new(m, p))?,
        })
    }

    /// Full dynamic stiffness A(ω) over all DOFs
    pub fn dynamic_matrix(&self, omega: f64, index: Option<usize>, damping: &GlobalDamping) -> FemResult<CsrMatrix<Complex64>> {
        let n = self.n_dofs();
        let mut a = ComplexCombination::new(n, n);
        add_dynamic_terms(
            &mut a,
            (&self.stiffness, &self.mass),
            (
                self.lumped_stiffness.at(index),
                self.lumped_mass.at(index),
                self.lumped_damping.at(index),
            ),
            omega,
            damping,
        );
        a.finish()
    }

    /// Equivalent nodal loads of pressure thrust, thermal expansion and self-weight
    pub fn element_loads(mesh: &Mesh, gravity: Option<[f64; 3]>) -> FemResult<DVector<f64>> {
        let mut f = DVector::zeros(mesh.dof_count());
        for element in mesh.structural_elements() {
            let geometry = mesh.element_geometry(element)?;
            let dofs = mesh.element_dofs(element.first_node, element.last_node)?;
            let mut load = element.pressure_thermal_load(&geometry)?;
            if let Some(g) = gravity {
                load += element.self_weight_load(&geometry, &g)?;
            }
            for (i, &dof) in dofs.iter().enumerate() {
                f[dof] += load[i];
            }
        }
        Ok(f)
    }
}

/// K·(1 + j·cK) + M·(−ω² + j·cM) + K_l − ω²·M_l + jω·C_l
fn add_dynamic_terms(
    a: &mut ComplexCombination,
    (k, m): (&CsrMatrix<f64>, &CsrMatrix<f64>),
    (kl, ml, cl): (&CsrMatrix<Complex64>, &CsrMatrix<Complex64>, &CsrMatrix<Complex64>),
    omega: f64,
    damping: &GlobalDamping,
) {
    let (ck, cm) = damping.coefficients(omega);
    a.add_real(k, Complex64::new(1.0, ck));
    a.add_real(m, Complex64::new(-omega * omega, cm));
    a.add_complex(kl, Complex64::new(1.0, 0.0));
    a.add_complex(ml, Complex64::new(-omega * omega, 0.0));
    a.add_complex(cl, Complex64::new(0.0, omega));
}

/// Free and cross blocks of the structural matrices
#[derive(Debug, Clone)]
pub struct ReducedStructuralSystem {
    pub stiffness: ReducedBlocks<f64>,
    pub mass: ReducedBlocks<f64>,
    pub lumped_stiffness: LumpedMatrices<ReducedBlocks<Complex64>>,
    pub lumped_mass: LumpedMatrices<ReducedBlocks<Complex64>>,
    pub lumped_damping: LumpedMatrices<ReducedBlocks<Complex64>>,
}

impl ReducedStructuralSystem {
    pub fn n_free(&self) -> usize {
        self.stiffness.ff.nrows()
    }

    /// Free/free dynamic stiffness A_ff(ω)
    pub fn dynamic_matrix(&self, omega: f64, index: Option<usize>, damping: &GlobalDamping) -> FemResult<CsrMatrix<Complex64>> {
        let n = self.n_free();
        let mut a = ComplexCombination::new(n, n);
        add_dynamic_terms(
            &mut a,
            (&self.stiffness.ff, &self.mass.ff),
            (
                &self.lumped_stiffness.at(index).ff,
                &self.lumped_mass.at(index).ff,
                &self.lumped_damping.at(index).ff,
            ),
            omega,
            damping,
        );
        a.finish()
    }

    /// Free/prescribed dynamic stiffness A_fp(ω)
    pub fn cross_matrix(&self, omega: f64, index: Option<usize>, damping: &GlobalDamping) -> FemResult<CsrMatrix<Complex64>> {
        let fp = &self.stiffness.fp;
        let mut a = ComplexCombination::new(fp.nrows(), fp.ncols());
        add_dynamic_terms(
            &mut a,
            (&self.stiffness.fp, &self.mass.fp),
            (
                &self.lumped_stiffness.at(index).fp,
                &self.lumped_mass.at(index).fp,
                &self.lumped_damping.at(index).fp,
            ),
            omega,
            damping,
        );
        a.finish()
    }

    /// Right-hand side F_f − A_fp(ω)·u_p
    pub fn effective_load(
        &self,
        free_load: &DVector<Complex64>,
        prescribed: &DVector<Complex64>,
        omega: f64,
        index: Option<usize>,
        damping: &GlobalDamping,
    ) -> FemResult<DVector<Complex64>> {
        if prescribed.iter().all(|v| v.norm() == 0.0) {
            return Ok(free_load.clone());
        }
        let cross = self.cross_matrix(omega, index, damping)?;
        Ok(free_load - crate::math::sparse_matvec(&cross, prescribed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{CrossSection, Material};
    use crate::mesh::{ElementRecord, NodeRecord};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn two_element_mesh() -> Mesh {
        let nodes = [
            NodeRecord { index: 1, x: 0.0, y: 0.0, z: 0.0 },
            NodeRecord { index: 2, x: 1.0, y: 0.0, z: 0.0 },
            NodeRecord { index: 3, x: 1.0, y: 1.0, z: 0.0 },
        ];
        let elements = [
            ElementRecord { index: 1, first_node: 1, last_node: 2 },
            ElementRecord { index: 2, first_node: 2, last_node: 3 },
        ];
        let mut mesh = Mesh::from_records(&nodes, &elements).unwrap();
        let all = mesh.all_elements();
        mesh.set_material_by_elements(&all, Material::steel()).unwrap();
        mesh.set_cross_section_by_elements(&all, CrossSection::pipe(0.1, 0.005)).unwrap();
        mesh
    }

    #[test]
    fn test_shared_node_contributions_are_summed() {
        let mesh = two_element_mesh();
        let assembly = StructuralAssembly::assemble(&mesh, 0, None).unwrap();
        let global = DMatrix::from(&assembly.stiffness);

        let mut expected = DMatrix::<f64>::zeros(18, 18);
        for element in mesh.structural_elements() {
            let geometry = mesh.element_geometry(element).unwrap();
            let dofs = mesh.element_dofs(element.first_node, element.last_node).unwrap();
            let (k, _) = element.global_matrices(&geometry, None).unwrap();
            for i in 0..12 {
                for j in 0..12 {
                    expected[(dofs[i], dofs[j])] += k[(i, j)];
                }
            }
        }
        for i in 0..18 {
            for j in 0..18 {
                assert_relative_eq!(global[(i, j)], expected[(i, j)], epsilon = 1e-6, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_missing_material_fails_before_assembly() {
        let nodes = [
            NodeRecord { index: 1, x: 0.0, y: 0.0, z: 0.0 },
            NodeRecord { index: 2, x: 1.0, y: 0.0, z: 0.0 },
        ];
        let elements = [ElementRecord { index: 7, first_node: 1, last_node: 2 }];
        let bare = Mesh::from_records(&nodes, &elements).unwrap();
        let err = StructuralAssembly::assemble(&bare, 0, None).unwrap_err();
        assert!(err.is_configuration());
        assert!(StructuralAssembly::assemble(&two_element_mesh(), 0, None).is_ok());
    }

    #[test]
    fn test_lumped_tables_give_one_matrix_per_frequency() {
        let mut mesh = two_element_mesh();
        let mut springs = crate::loads::unconstrained();
        springs[0] = BoundaryValue::real_table(&[1.0e5, 2.0e5, 3.0e5]);
        mesh.set_lumped_stiffness(&[3], &springs).unwrap();
        let assembly = StructuralAssembly::assemble(&mesh, 3, None).unwrap();
        assert!(assembly.lumped_stiffness.is_per_frequency());
        assert!(!assembly.lumped_mass.is_per_frequency());
        let dof = 6 * mesh.global_index(3).unwrap();
        let k2 = DMatrix::from(assembly.lumped_stiffness.at(Some(2)));
        assert_eq!(k2[(dof, dof)], Complex64::new(3.0e5, 0.0));

        assert!(StructuralAssembly::assemble(&mesh, 4, None).is_err());
    }

    #[test]
    fn test_partition_and_effective_load() {
        let mut mesh = two_element_mesh();
        let mut fixed = crate::loads::unconstrained();
        for dof in fixed.iter_mut() {
            *dof = BoundaryValue::real(0.0);
        }
        fixed[2] = BoundaryValue::real(0.001);
        mesh.set_prescribed_dofs(&[1], &fixed).unwrap();

        let assembly = StructuralAssembly::assemble(&mesh, 0, None).unwrap();
        assert_eq!(assembly.partition.prescribed().len(), 6);
        assert_eq!(assembly.partition.n_free(), 12);

        let reduced = assembly.reduce().unwrap();
        let damping = GlobalDamping::default();
        let f_free = DVector::from_element(12, Complex64::new(0.0, 0.0));
        let u_p = assembly.prescribed_values(None);
        let rhs = reduced.effective_load(&f_free, &u_p, 0.0, None, &damping).unwrap();
        // A support settlement produces a load at the neighbouring node
        assert!(rhs.iter().any(|v| v.norm() > 0.0));
    }
}
