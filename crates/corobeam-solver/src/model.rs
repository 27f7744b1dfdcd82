//! Beam model description.
//!
//! [`BeamModel`] is the plain (`f64`) input of an analysis: nodes, sections,
//! elements with their orientation vectors, rigid links, constraints, loads
//! and the material inputs. [`DesignValues`] lifts the differentiable inputs
//! (E, ν, ρ, wall thickness and nodal loads) into the solver scalar type.

use nalgebra::{DVector, Vector3};

use corobeam_io::{CaseConfig, MeshData, SectionRecord, read_properties};

use crate::boundary_conditions::{BoundaryConditions, ConcentratedLoad, DOFS_PER_NODE, DisplacementBC};
use crate::elements::BeamSection;
use crate::error::{Result, SolverError};
use crate::materials::Material;
use crate::rigid_link::{RigidLink, validate_links};
use crate::scalar::Real;

/// Chord lengths below this value are rejected
pub const MIN_ELEMENT_LENGTH: f64 = 1e-12;

/// Connectivity and orientation of one beam element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDefinition {
    pub nodes: [usize; 2],
    /// Index into [`BeamModel::sections`]
    pub section: usize,
    /// Vector in the local x-y plane fixing the initial triad
    pub aux: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeamModel {
    pub nodes: Vec<Vector3<f64>>,
    pub sections: Vec<BeamSection>,
    pub elements: Vec<ElementDefinition>,
    pub rigid_links: Vec<RigidLink>,
    pub boundary_conditions: BoundaryConditions,
    pub young_modulus: f64,
    pub poisson_ratio: f64,
    pub density: f64,
    /// Wall thickness of thin-walled box sections
    pub wall_thickness: f64,
}

impl BeamModel {
    pub fn new(young_modulus: f64, poisson_ratio: f64, density: f64) -> Self {
        Self {
            nodes: Vec::new(),
            sections: Vec::new(),
            elements: Vec::new(),
            rigid_links: Vec::new(),
            boundary_conditions: BoundaryConditions::new(),
            young_modulus,
            poisson_ratio,
            density,
            wall_thickness: 0.0,
        }
    }

    pub fn with_wall_thickness(mut self, wall_thickness: f64) -> Self {
        self.wall_thickness = wall_thickness;
        self
    }

    pub fn add_node(&mut self, x: f64, y: f64, z: f64) -> usize {
        self.nodes.push(Vector3::new(x, y, z));
        self.nodes.len() - 1
    }

    pub fn add_section(&mut self, section: BeamSection) -> usize {
        self.sections.push(section);
        self.sections.len() - 1
    }

    pub fn add_element(&mut self, a: usize, b: usize, section: usize, aux: [f64; 3]) -> usize {
        self.elements.push(ElementDefinition {
            nodes: [a, b],
            section,
            aux: Vector3::from(aux),
        });
        self.elements.len() - 1
    }

    pub fn add_rigid_link(&mut self, link: RigidLink) -> usize {
        self.rigid_links.push(link);
        self.rigid_links.len() - 1
    }

    /// Fix DOFs `first..=last` (1-based) of a node
    pub fn fix(&mut self, node: usize, first_dof: usize, last_dof: usize) {
        self.boundary_conditions
            .add_displacement_bc(DisplacementBC::new(node, first_dof, last_dof));
    }

    /// Fix all six DOFs of a node
    pub fn clamp(&mut self, node: usize) {
        self.boundary_conditions
            .add_displacement_bc(DisplacementBC::clamped(node));
    }

    /// Add a nodal load on DOF `dof` (1-based)
    pub fn add_load(&mut self, node: usize, dof: usize, magnitude: f64) {
        self.boundary_conditions
            .add_concentrated_load(ConcentratedLoad::new(node, dof, magnitude));
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_dofs(&self) -> usize {
        self.nodes.len() * DOFS_PER_NODE
    }

    pub fn load_vector(&self) -> DVector<f64> {
        self.boundary_conditions.load_vector(self.num_nodes())
    }

    /// Reference length of an element
    pub fn element_length(&self, element: usize) -> f64 {
        let [a, b] = self.elements[element].nodes;
        (self.nodes[b] - self.nodes[a]).norm()
    }

    /// Check the model for configuration errors
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SolverError::InvalidModel(msg));

        if self.nodes.is_empty() {
            return invalid("model has no nodes".to_string());
        }
        if self.elements.is_empty() {
            return invalid("model has no elements".to_string());
        }
        if let Some(i) = self.nodes.iter().position(|x| x.iter().any(|v| !v.is_finite())) {
            return invalid(format!("node {i} has non-finite coordinates"));
        }
        Material::new(self.young_modulus, self.poisson_ratio, self.density)
            .validate()
            .map_err(SolverError::InvalidModel)?;

        for (i, section) in self.sections.iter().enumerate() {
            section
                .validate()
                .map_err(|msg| SolverError::InvalidModel(format!("section {i}: {msg}")))?;
        }
        let uses_thickness = self
            .elements
            .iter()
            .any(|e| self.sections.get(e.section).is_some_and(BeamSection::uses_thickness));
        if uses_thickness && !(self.wall_thickness > 0.0 && self.wall_thickness.is_finite()) {
            return invalid(format!(
                "box sections need a positive wall thickness, got {}",
                self.wall_thickness
            ));
        }

        for (i, element) in self.elements.iter().enumerate() {
            let [a, b] = element.nodes;
            if a >= self.nodes.len() || b >= self.nodes.len() {
                return invalid(format!("element {i} references unknown node"));
            }
            if a == b {
                return invalid(format!("element {i} connects node {a} to itself"));
            }
            if element.section >= self.sections.len() {
                return invalid(format!("element {i} references unknown section {}", element.section));
            }
            let chord = self.nodes[b] - self.nodes[a];
            let length = chord.norm();
            if length < MIN_ELEMENT_LENGTH {
                return invalid(format!("element {i} has degenerate length {length:e}"));
            }
            let aux_norm = element.aux.norm();
            if !(aux_norm > 0.0 && aux_norm.is_finite()) {
                return invalid(format!("element {i} has an invalid orientation vector"));
            }
            if chord.cross(&element.aux).norm() <= 1e-8 * length * aux_norm {
                return invalid(format!("element {i} orientation vector is parallel to its axis"));
            }
        }

        self.boundary_conditions
            .validate(self.nodes.len())
            .map_err(SolverError::InvalidModel)?;
        validate_links(
            &self.rigid_links,
            self.nodes.len(),
            &self.boundary_conditions.constrained_dofs(),
        )
        .map_err(SolverError::InvalidModel)?;
        Ok(())
    }

    /// Build a model from parsed mesh and property data
    pub fn from_mesh(
        mesh: &MeshData,
        properties: &[SectionRecord],
        young_modulus: f64,
        poisson_ratio: f64,
        density: f64,
    ) -> Self {
        let mut model = Self::new(young_modulus, poisson_ratio, density);
        for x in &mesh.nodes {
            model.add_node(x[0], x[1], x[2]);
        }
        for record in properties {
            let section = match *record {
                SectionRecord::Explicit {
                    area,
                    iyy,
                    izz,
                    torsion_constant,
                } => BeamSection::custom(area, iyy, izz, torsion_constant),
                SectionRecord::Box { width, height } => BeamSection::thin_walled_box(width, height),
            };
            model.add_section(section);
        }
        for element in &mesh.elements {
            model.add_element(element.nodes[0], element.nodes[1], element.property, element.aux);
        }
        for constraint in &mesh.constraints {
            for &dof in &constraint.dofs {
                model.fix(constraint.node, dof, dof);
            }
        }
        for link in &mesh.rigid_links {
            model.add_rigid_link(RigidLink::new(link.master, link.slave, link.dofs.iter().copied()));
        }
        model
    }

    /// Read mesh and properties of a case and apply its loads
    pub fn from_case(case: &CaseConfig) -> Result<Self> {
        let mesh = MeshData::parse_file(&case.mesh)?;
        let properties = read_properties(&case.properties)?;
        let mut model = Self::from_mesh(
            &mesh,
            &properties,
            case.material.young_modulus,
            case.material.poisson_ratio,
            case.material.density,
        )
        .with_wall_thickness(case.wall_thickness);
        for load in &case.loads {
            model.add_load(load.node - 1, load.dof, load.value);
        }
        model.validate()?;
        Ok(model)
    }
}

/// Differentiable inputs of an analysis
#[derive(Debug, Clone)]
pub struct DesignValues<T: Real> {
    pub young_modulus: T,
    pub poisson_ratio: T,
    pub density: T,
    pub wall_thickness: T,
    /// Nodal loads, 6 per node
    pub loads: DVector<T>,
}

impl<T: Real> DesignValues<T> {
    /// Passive values taken from the model
    pub fn from_model(model: &BeamModel) -> Self {
        Self {
            young_modulus: T::from_f64(model.young_modulus),
            poisson_ratio: T::from_f64(model.poisson_ratio),
            density: T::from_f64(model.density),
            wall_thickness: T::from_f64(model.wall_thickness),
            loads: model.load_vector().map(T::from_f64),
        }
    }

    pub fn material(&self) -> Material<T> {
        Material::new(
            self.young_modulus.clone(),
            self.poisson_ratio.clone(),
            self.density.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cantilever() -> BeamModel {
        let mut model = BeamModel::new(70e9, 0.3, 2700.0);
        let s = model.add_section(BeamSection::circular(0.01));
        let a = model.add_node(0.0, 0.0, 0.0);
        let b = model.add_node(1.0, 0.0, 0.0);
        model.add_element(a, b, s, [0.0, 1.0, 0.0]);
        model.clamp(a);
        model.add_load(b, 3, 10.0);
        model
    }

    #[test]
    fn valid_model_passes() {
        let model = cantilever();
        assert!(model.validate().is_ok());
        assert_eq!(model.num_dofs(), 12);
        assert_eq!(model.load_vector()[8], 10.0);
        assert_eq!(model.element_length(0), 1.0);
    }

    #[test]
    fn rejects_degenerate_element() {
        let mut model = cantilever();
        let c = model.add_node(1.0, 0.0, 0.0);
        model.add_element(1, c, 0, [0.0, 1.0, 0.0]);
        assert!(matches!(model.validate(), Err(SolverError::InvalidModel(_))));
    }

    #[test]
    fn rejects_parallel_orientation_vector() {
        let mut model = cantilever();
        model.elements[0].aux = Vector3::new(2.0, 0.0, 0.0);
        assert!(model.validate().is_err());
    }

    #[test]
    fn box_sections_need_thickness() {
        let mut model = cantilever();
        model.sections[0] = BeamSection::thin_walled_box(0.1, 0.05);
        assert!(model.validate().is_err());
        let model = model.with_wall_thickness(0.002);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn rejects_bad_material_and_links() {
        let mut model = cantilever();
        model.poisson_ratio = 0.7;
        assert!(model.validate().is_err());

        let mut model = cantilever();
        model.add_rigid_link(RigidLink::full(1, 0));
        // slave node 0 is clamped
        assert!(model.validate().is_err());
    }

    #[test]
    fn design_values_follow_model() {
        let model = cantilever().with_wall_thickness(0.003);
        let design = DesignValues::<f64>::from_model(&model);
        assert_eq!(design.young_modulus, 70e9);
        assert_eq!(design.wall_thickness, 0.003);
        assert_eq!(design.loads.len(), 12);
        let g = design.material().shear_modulus();
        assert!((g - 70e9 / 2.6).abs() < 1.0);
    }

    #[test]
    fn builds_from_mesh_data() {
        let mesh = MeshData::parse_str(
            "NDIM= 3\nNPOIN= 2\n0 0 0\n1 0 0\nNELEM= 1\n1 2 1 0 1 0\nNCONSTR= 1\n1 123456\n",
        )
        .unwrap();
        let props = [SectionRecord::Box {
            width: 0.1,
            height: 0.05,
        }];
        let model = BeamModel::from_mesh(&mesh, &props, 70e9, 0.3, 2700.0).with_wall_thickness(0.002);
        assert!(model.validate().is_ok());
        assert_eq!(model.boundary_conditions.constrained_dofs().len(), 6);
        assert!(model.sections[0].uses_thickness());
    }

    #[test]
    fn models_compare_by_loads() {
        let model = cantilever();
        assert_eq!(model.clone(), model);
        let mut loaded = model.clone();
        loaded.boundary_conditions.set_load(1, 3, 20.0);
        assert_ne!(loaded, model);
    }
}
