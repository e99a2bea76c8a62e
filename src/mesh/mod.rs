//! Mesh preprocessor
//!
//! Owns nodes, the structural and acoustic representation of every element,
//! the line (pipe segment) map and the lumped/link registries. Every topology
//! change renumbers the nodes so global indices are always available.

mod links;
mod topology;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::elements::{
    AcousticElement, AcousticElementType, CrossSection, DecouplingMask, ElementGeometry, Fluid,
    Material, Node, PerforatedPlate, RadiationImpedance, StructuralElement, StructuralElementType,
};
use crate::error::{FemError, FemResult};
use crate::loads::{BoundaryValue, DofValues, PressureLoad};

pub use links::{node_pair, AcousticLink, ElasticLink};

/// Node coordinates supplied by the mesher
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Element connectivity supplied by the mesher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub index: usize,
    pub first_node: usize,
    pub last_node: usize,
}

/// Nodes, elements and attributes of one analysis session
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    nodes: BTreeMap<usize, Node>,
    structural_elements: BTreeMap<usize, StructuralElement>,
    acoustic_elements: BTreeMap<usize, AcousticElement>,
    /// Line index -> element indices in insertion order
    lines: BTreeMap<usize, Vec<usize>>,
    /// Node -> neighbouring nodes, sorted
    neighbours: BTreeMap<usize, Vec<usize>>,
    /// Global index -> external node index
    order: Vec<usize>,
    elastic_links: BTreeMap<(usize, usize), ElasticLink>,
    acoustic_links: BTreeMap<(usize, usize), AcousticLink>,
}

impl Mesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mesh from mesher output
    pub fn from_records(nodes: &[NodeRecord], elements: &[ElementRecord]) -> FemResult<Self> {
        let mut mesh = Self::new();
        for record in nodes {
            mesh.insert_node(Node::new(record.index, record.x, record.y, record.z))?;
        }
        for record in elements {
            mesh.insert_element(*record)?;
        }
        mesh.renumber();
        Ok(mesh)
    }

    // ========================
    // Topology
    // ========================

    fn insert_node(&mut self, node: Node) -> FemResult<()> {
        if self.nodes.contains_key(&node.external_index) {
            return Err(FemError::InvalidInput(format!(
                "duplicate node index {}",
                node.external_index
            )));
        }
        self.nodes.insert(node.external_index, node);
        Ok(())
    }

    fn insert_element(&mut self, record: ElementRecord) -> FemResult<()> {
        if self.structural_elements.contains_key(&record.index) {
            return Err(FemError::InvalidInput(format!(
                "duplicate element index {}",
                record.index
            )));
        }
        let first = self.node(record.first_node)?;
        let last = self.node(record.last_node)?;
        if first.distance_to(last) <= f64::EPSILON {
            return Err(FemError::InvalidGeometry(format!(
                "element {} between nodes {} and {} has zero length",
                record.index, record.first_node, record.last_node
            )));
        }
        self.structural_elements.insert(
            record.index,
            StructuralElement::new(record.index, record.first_node, record.last_node),
        );
        self.acoustic_elements.insert(
            record.index,
            AcousticElement::new(record.index, record.first_node, record.last_node),
        );
        Ok(())
    }

    /// Add a node; it is numbered immediately
    pub fn add_node(&mut self, index: usize, x: f64, y: f64, z: f64) -> FemResult<()> {
        self.insert_node(Node::new(index, x, y, z))?;
        self.renumber();
        Ok(())
    }

    /// Add an element between two existing nodes
    pub fn add_element(&mut self, index: usize, first_node: usize, last_node: usize) -> FemResult<()> {
        self.insert_element(ElementRecord {
            index,
            first_node,
            last_node,
        })?;
        self.renumber();
        Ok(())
    }

    /// Remove an element and drop it from every line
    pub fn remove_element(&mut self, index: usize) -> FemResult<()> {
        if self.structural_elements.remove(&index).is_none() {
            return Err(FemError::ElementNotFound(index));
        }
        self.acoustic_elements.remove(&index);
        for elements in self.lines.values_mut() {
            elements.retain(|&e| e != index);
        }
        self.lines.retain(|_, elements| !elements.is_empty());
        self.renumber();
        Ok(())
    }

    /// Assign elements to a line, replacing its previous content
    pub fn set_line(&mut self, line: usize, elements: &[usize]) -> FemResult<()> {
        for id in elements {
            if !self.structural_elements.contains_key(id) {
                return Err(FemError::ElementNotFound(*id));
            }
        }
        self.lines.insert(line, elements.to_vec());
        Ok(())
    }

    /// Rebuild adjacency and assign global indices by depth-first traversal
    pub fn renumber(&mut self) {
        let edges = self
            .structural_elements
            .values()
            .map(|e| (e.first_node, e.last_node));
        self.neighbours = topology::build_adjacency(self.nodes.keys().copied(), edges);
        self.order = topology::depth_first_order(&self.neighbours);
        for (global, external) in self.order.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(external) {
                node.global_index = Some(global);
            }
        }
        debug!(
            "Numbered {} nodes and {} elements",
            self.order.len(),
            self.structural_elements.len()
        );
    }

    // ========================
    // Queries
    // ========================

    pub fn node(&self, index: usize) -> FemResult<&Node> {
        self.nodes.get(&index).ok_or(FemError::NodeNotFound(index))
    }

    fn node_mut(&mut self, index: usize) -> FemResult<&mut Node> {
        self.nodes.get_mut(&index).ok_or(FemError::NodeNotFound(index))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of structural DOFs (6 per node)
    pub fn dof_count(&self) -> usize {
        6 * self.nodes.len()
    }

    /// Nodes in global index order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn global_index(&self, node: usize) -> FemResult<usize> {
        self.node(node)?
            .global_index()
            .ok_or(FemError::NodeNotFound(node))
    }

    /// External index of the node at a global index
    pub fn external_index(&self, global: usize) -> Option<usize> {
        self.order.get(global).copied()
    }

    pub fn neighbours(&self, node: usize) -> &[usize] {
        self.neighbours.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn structural_element(&self, index: usize) -> FemResult<&StructuralElement> {
        self.structural_elements
            .get(&index)
            .ok_or(FemError::ElementNotFound(index))
    }

    pub fn acoustic_element(&self, index: usize) -> FemResult<&AcousticElement> {
        self.acoustic_elements
            .get(&index)
            .ok_or(FemError::ElementNotFound(index))
    }

    pub fn structural_elements(&self) -> impl Iterator<Item = &StructuralElement> + '_ {
        self.structural_elements.values()
    }

    /// Acoustic elements with a fluid assigned
    pub fn acoustic_elements(&self) -> impl Iterator<Item = &AcousticElement> + '_ {
        self.acoustic_elements.values().filter(|e| e.fluid.is_some())
    }

    pub fn element_count(&self) -> usize {
        self.structural_elements.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.lines.iter().map(|(line, elements)| (*line, elements.as_slice()))
    }

    pub fn line_elements(&self, line: usize) -> FemResult<&[usize]> {
        self.lines
            .get(&line)
            .map(Vec::as_slice)
            .ok_or(FemError::LineNotFound(line))
    }

    fn elements_of_lines(&self, lines: &[usize]) -> FemResult<Vec<usize>> {
        let mut elements = Vec::new();
        for line in lines {
            elements.extend_from_slice(self.line_elements(*line)?);
        }
        Ok(elements)
    }

    /// Length and orientation of a structural element
    pub fn element_geometry(&self, element: &StructuralElement) -> FemResult<ElementGeometry> {
        let first = self.node(element.first_node)?.coords();
        let last = self.node(element.last_node)?.coords();
        element.geometry(&first, &last)
    }

    pub fn element_length(&self, first_node: usize, last_node: usize) -> FemResult<f64> {
        Ok(self.node(first_node)?.distance_to(self.node(last_node)?))
    }

    /// Global structural DOFs of an element, first node then last node
    pub fn element_dofs(&self, first_node: usize, last_node: usize) -> FemResult<[usize; 12]> {
        let first = self.global_index(first_node)?;
        let last = self.global_index(last_node)?;
        let mut dofs = [0; 12];
        for k in 0..6 {
            dofs[k] = 6 * first + k;
            dofs[6 + k] = 6 * last + k;
        }
        Ok(dofs)
    }

    /// Global acoustic DOFs of an element
    pub fn acoustic_dofs(&self, first_node: usize, last_node: usize) -> FemResult<[usize; 2]> {
        Ok([self.global_index(first_node)?, self.global_index(last_node)?])
    }

    pub fn elastic_links(&self) -> impl Iterator<Item = (&(usize, usize), &ElasticLink)> + '_ {
        self.elastic_links.iter()
    }

    pub fn acoustic_links(&self) -> impl Iterator<Item = (&(usize, usize), &AcousticLink)> + '_ {
        self.acoustic_links.iter()
    }

    pub fn elastic_link(&self, a: usize, b: usize) -> Option<&ElasticLink> {
        self.elastic_links.get(&node_pair(a, b))
    }

    pub fn acoustic_link(&self, a: usize, b: usize) -> Option<&AcousticLink> {
        self.acoustic_links.get(&node_pair(a, b))
    }

    // ========================
    // Element attributes
    // ========================

    fn for_structural<F>(&mut self, elements: &[usize], mut f: F) -> FemResult<()>
    where
        F: FnMut(&mut StructuralElement),
    {
        if let Some(missing) = elements.iter().find(|id| !self.structural_elements.contains_key(*id)) {
            return Err(FemError::ElementNotFound(*missing));
        }
        for id in elements {
            if let Some(element) = self.structural_elements.get_mut(id) {
                f(element);
            }
        }
        Ok(())
    }

    fn for_acoustic<F>(&mut self, elements: &[usize], mut f: F) -> FemResult<()>
    where
        F: FnMut(&mut AcousticElement),
    {
        if let Some(missing) = elements.iter().find(|id| !self.acoustic_elements.contains_key(*id)) {
            return Err(FemError::ElementNotFound(*missing));
        }
        for id in elements {
            if let Some(element) = self.acoustic_elements.get_mut(id) {
                f(element);
            }
        }
        Ok(())
    }

    /// All elements, for setters applied to the whole model
    pub fn all_elements(&self) -> Vec<usize> {
        self.structural_elements.keys().copied().collect()
    }

    pub fn set_material_by_elements(&mut self, elements: &[usize], material: Material) -> FemResult<()> {
        let material = Arc::new(material);
        self.for_structural(elements, |e| e.material = Some(material.clone()))
    }

    pub fn set_material_by_lines(&mut self, lines: &[usize], material: Material) -> FemResult<()> {
        let elements = self.elements_of_lines(lines)?;
        self.set_material_by_elements(&elements, material)
    }

    /// Cross section shared by the structural and acoustic representation
    pub fn set_cross_section_by_elements(
        &mut self,
        elements: &[usize],
        section: CrossSection,
    ) -> FemResult<()> {
        let section = Arc::new(section);
        self.for_structural(elements, |e| e.cross_section = Some(section.clone()))?;
        self.for_acoustic(elements, |e| e.cross_section = Some(section.clone()))
    }

    pub fn set_cross_section_by_lines(&mut self, lines: &[usize], section: CrossSection) -> FemResult<()> {
        let elements = self.elements_of_lines(lines)?;
        self.set_cross_section_by_elements(&elements, section)
    }

    /// Fluid inside the elements; enables them in the acoustic model
    pub fn set_fluid_by_elements(&mut self, elements: &[usize], fluid: Option<Fluid>) -> FemResult<()> {
        let fluid = fluid.map(Arc::new);
        self.for_structural(elements, |e| e.fluid = fluid.clone())?;
        self.for_acoustic(elements, |e| e.fluid = fluid.clone())
    }

    pub fn set_fluid_by_lines(&mut self, lines: &[usize], fluid: Option<Fluid>) -> FemResult<()> {
        let elements = self.elements_of_lines(lines)?;
        self.set_fluid_by_elements(&elements, fluid)
    }

    pub fn set_structural_type_by_elements(
        &mut self,
        elements: &[usize],
        element_type: StructuralElementType,
    ) -> FemResult<()> {
        self.for_structural(elements, |e| e.element_type = element_type)
    }

    pub fn set_structural_type_by_lines(
        &mut self,
        lines: &[usize],
        element_type: StructuralElementType,
    ) -> FemResult<()> {
        let elements = self.elements_of_lines(lines)?;
        self.set_structural_type_by_elements(&elements, element_type)
    }

    pub fn set_acoustic_type_by_elements(
        &mut self,
        elements: &[usize],
        element_type: AcousticElementType,
    ) -> FemResult<()> {
        self.for_acoustic(elements, |e| e.element_type = element_type)
    }

    pub fn set_acoustic_type_by_lines(
        &mut self,
        lines: &[usize],
        element_type: AcousticElementType,
    ) -> FemResult<()> {
        let elements = self.elements_of_lines(lines)?;
        self.set_acoustic_type_by_elements(&elements, element_type)
    }

    /// Mean flow velocity (m/s, first to last node) and wall roughness (m)
    pub fn set_mean_flow_by_elements(
        &mut self,
        elements: &[usize],
        velocity: f64,
        roughness: f64,
    ) -> FemResult<()> {
        self.for_acoustic(elements, |e| {
            e.mean_velocity = velocity;
            e.roughness = roughness;
        })
    }

    pub fn set_perforated_plate_by_elements(
        &mut self,
        elements: &[usize],
        plate: Option<PerforatedPlate>,
    ) -> FemResult<()> {
        self.for_acoustic(elements, |e| e.perforated_plate = plate)
    }

    pub fn set_pressure_load_by_elements(
        &mut self,
        elements: &[usize],
        pressure: Option<PressureLoad>,
    ) -> FemResult<()> {
        self.for_structural(elements, |e| e.pressure = pressure)
    }

    pub fn set_temperature_change_by_elements(&mut self, elements: &[usize], delta_t: f64) -> FemResult<()> {
        self.for_structural(elements, |e| e.temperature_change = delta_t)
    }

    /// Rotation of the section about the element axis in radians
    pub fn set_twist_by_elements(&mut self, elements: &[usize], twist: f64) -> FemResult<()> {
        self.for_structural(elements, |e| e.twist = twist)
    }

    pub fn set_decoupling(&mut self, element: usize, mask: DecouplingMask) -> FemResult<()> {
        self.for_structural(&[element], |e| e.decoupling = mask)
    }

    // ========================
    // Node boundary conditions
    // ========================

    fn for_nodes<F>(&mut self, nodes: &[usize], mut f: F) -> FemResult<()>
    where
        F: FnMut(&mut Node),
    {
        if let Some(missing) = nodes.iter().find(|id| !self.nodes.contains_key(*id)) {
            return Err(FemError::NodeNotFound(*missing));
        }
        for id in nodes {
            f(self.node_mut(*id)?);
        }
        Ok(())
    }

    /// Replace the prescribed DOF vector; set entries clear the matching loads
    pub fn set_prescribed_dofs(&mut self, nodes: &[usize], values: &DofValues) -> FemResult<()> {
        self.for_nodes(nodes, |node| {
            for (dof, value) in values.iter().enumerate() {
                node.set_prescribed_dof(dof, value.clone());
            }
        })
    }

    /// Replace the nodal load vector; set entries clear the matching prescribed DOFs
    pub fn set_nodal_loads(&mut self, nodes: &[usize], values: &DofValues) -> FemResult<()> {
        self.for_nodes(nodes, |node| {
            for (dof, value) in values.iter().enumerate() {
                node.set_nodal_load(dof, value.clone());
            }
        })
    }

    pub fn set_lumped_masses(&mut self, nodes: &[usize], values: &DofValues) -> FemResult<()> {
        self.for_nodes(nodes, |node| node.lumped_masses = values.clone())
    }

    pub fn set_lumped_stiffness(&mut self, nodes: &[usize], values: &DofValues) -> FemResult<()> {
        self.for_nodes(nodes, |node| node.lumped_stiffness = values.clone())
    }

    pub fn set_lumped_dampings(&mut self, nodes: &[usize], values: &DofValues) -> FemResult<()> {
        self.for_nodes(nodes, |node| node.lumped_dampings = values.clone())
    }

    pub fn set_acoustic_pressure(&mut self, nodes: &[usize], value: BoundaryValue) -> FemResult<()> {
        self.for_nodes(nodes, |node| node.set_acoustic_pressure(value.clone()))
    }

    pub fn set_volume_velocity(&mut self, nodes: &[usize], value: BoundaryValue) -> FemResult<()> {
        self.for_nodes(nodes, |node| node.set_volume_velocity(value.clone()))
    }

    pub fn set_specific_impedance(&mut self, nodes: &[usize], value: BoundaryValue) -> FemResult<()> {
        self.for_nodes(nodes, |node| node.specific_impedance = value.clone())
    }

    pub fn set_radiation_impedance(
        &mut self,
        nodes: &[usize],
        kind: Option<RadiationImpedance>,
    ) -> FemResult<()> {
        self.for_nodes(nodes, |node| node.radiation_impedance = kind)
    }

    pub fn add_compressor_excitation(&mut self, node: usize, spectrum: Vec<Complex64>) -> FemResult<()> {
        self.node_mut(node)?.add_compressor_excitation(spectrum);
        Ok(())
    }

    // ========================
    // Links
    // ========================

    /// Add or replace an elastic link; the key is order independent
    pub fn add_elastic_link(&mut self, a: usize, b: usize, link: ElasticLink) -> FemResult<()> {
        self.check_link_nodes(a, b)?;
        self.elastic_links.insert(node_pair(a, b), link);
        Ok(())
    }

    pub fn remove_elastic_link(&mut self, a: usize, b: usize) -> Option<ElasticLink> {
        self.elastic_links.remove(&node_pair(a, b))
    }

    pub fn add_acoustic_link(&mut self, a: usize, b: usize, link: AcousticLink) -> FemResult<()> {
        self.check_link_nodes(a, b)?;
        self.acoustic_links.insert(node_pair(a, b), link);
        Ok(())
    }

    pub fn remove_acoustic_link(&mut self, a: usize, b: usize) -> Option<AcousticLink> {
        self.acoustic_links.remove(&node_pair(a, b))
    }

    fn check_link_nodes(&self, a: usize, b: usize) -> FemResult<()> {
        self.node(a)?;
        self.node(b)?;
        if a == b {
            return Err(FemError::InvalidInput(format!("link from node {} to itself", a)));
        }
        Ok(())
    }

    // ========================
    // Validation
    // ========================

    /// Check every per-frequency table against the active frequency count
    pub fn validate_tables(&self, n_frequencies: usize) -> FemResult<()> {
        for node in self.nodes.values() {
            let id = node.external_index;
            let vectors = [
                ("prescribed DOF", &node.prescribed_dofs),
                ("nodal load", &node.nodal_loads),
                ("lumped mass", &node.lumped_masses),
                ("lumped stiffness", &node.lumped_stiffness),
                ("lumped damping", &node.lumped_dampings),
            ];
            for (name, values) in vectors {
                for (dof, value) in values.iter().enumerate() {
                    value.check_length(n_frequencies, || format!("{} {} at node {}", name, dof, id))?;
                }
            }
            let scalars = [
                ("acoustic pressure", &node.acoustic_pressure),
                ("volume velocity", &node.volume_velocity),
                ("specific impedance", &node.specific_impedance),
            ];
            for (name, value) in scalars {
                value.check_length(n_frequencies, || format!("{} at node {}", name, id))?;
            }
            for spectrum in &node.compressor_excitation {
                if spectrum.len() != n_frequencies {
                    return Err(FemError::TableLength {
                        context: format!("compressor excitation at node {}", id),
                        expected: n_frequencies,
                        found: spectrum.len(),
                    });
                }
            }
        }
        for ((a, b), link) in &self.acoustic_links {
            link.impedance
                .check_length(n_frequencies, || format!("acoustic link {}-{}", a, b))?;
        }
        Ok(())
    }

    /// Nodes whose lumped mass, stiffness or damping is a frequency table
    pub fn nodes_with_lumped_tables(&self) -> Vec<usize> {
        self.nodes()
            .filter(|n| {
                n.lumped_masses
                    .iter()
                    .chain(n.lumped_stiffness.iter())
                    .chain(n.lumped_dampings.iter())
                    .any(BoundaryValue::is_table)
            })
            .map(|n| n.external_index)
            .collect()
    }

    /// Nodes with a non-zero prescribed displacement
    pub fn nodes_with_nonzero_prescribed_dofs(&self) -> Vec<usize> {
        self.nodes()
            .filter(|n| n.has_nonzero_prescribed_dofs())
            .map(|n| n.external_index)
            .collect()
    }
}
