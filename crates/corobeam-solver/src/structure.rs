//! Node and element arena of one analysis.
//!
//! [`Structure`] owns the nodes and elements built from a [`BeamModel`] and
//! the design values of the analysis. Elements refer to their end nodes by
//! index. The Newton loop reads the assembled system from it and pushes each
//! displacement increment back through [`Structure::apply_increment`].

use nalgebra::{DMatrix, DVector, Matrix3, SVector, Vector3};

use crate::assembly::{GlobalSystem, assemble_mass};
use crate::boundary_conditions::DOFS_PER_NODE;
use crate::elements::{BeamElement, ElementConstants, pseudo_to_rotation, rotation_to_pseudo};
use crate::error::Result;
use crate::model::{BeamModel, DesignValues};
use crate::rigid_link::{Condensation, RigidLink};
use crate::scalar::{Real, norm3};

/// Kinematic state of one node
#[derive(Debug, Clone)]
pub struct Node<T: Real> {
    pub index: usize,
    pub reference: Vector3<T>,
    /// Coordinates before the last increment
    pub previous: Vector3<T>,
    pub current: Vector3<T>,
    /// Cumulative translations and additively accumulated rotations
    pub displacement: SVector<T, 6>,
    /// Cumulative nodal rotation
    pub orientation: Matrix3<T>,
}

impl<T: Real> Node<T> {
    pub fn new(index: usize, reference: Vector3<T>) -> Self {
        Self {
            index,
            previous: reference.clone(),
            current: reference.clone(),
            reference,
            displacement: SVector::zeros(),
            orientation: Matrix3::identity(),
        }
    }

    fn reset(&mut self) {
        self.previous = self.reference.clone();
        self.current = self.reference.clone();
        self.displacement = SVector::zeros();
        self.orientation = Matrix3::identity();
    }

    fn translation(&self) -> Vector3<T> {
        Vector3::new(
            self.displacement[0].clone(),
            self.displacement[1].clone(),
            self.displacement[2].clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Structure<T: Real> {
    nodes: Vec<Node<T>>,
    elements: Vec<BeamElement<T>>,
    links: Vec<RigidLink>,
    /// Homogeneous constraint flag per global DOF
    constrained: Vec<bool>,
    /// Target external load
    external: DVector<T>,
}

impl<T: Real> Structure<T> {
    /// Build the arena in the undeformed state
    pub fn new(model: &BeamModel, design: &DesignValues<T>) -> Result<Self> {
        model.validate()?;
        let material = design.material();

        let nodes: Vec<Node<T>> = model
            .nodes
            .iter()
            .enumerate()
            .map(|(i, x)| Node::new(i, x.map(T::from_f64)))
            .collect();

        let elements = model
            .elements
            .iter()
            .enumerate()
            .map(|(id, definition)| {
                let [a, b] = definition.nodes;
                let x_a = &nodes[a].reference;
                let x_b = &nodes[b].reference;
                let section = model.sections[definition.section].properties(&design.wall_thickness);
                let length = norm3(&(x_b - x_a));
                let constants = ElementConstants::new(&section, &material, length);
                BeamElement::new(id, [a, b], constants, x_a, x_b, &definition.aux.map(T::from_f64))
            })
            .collect();

        let mut constrained = vec![false; model.num_dofs()];
        for dof in model.boundary_conditions.constrained_dofs() {
            constrained[dof.global_index()] = true;
        }

        Ok(Self {
            nodes,
            elements,
            links: model.rigid_links.clone(),
            constrained,
            external: design.loads.clone(),
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_dofs(&self) -> usize {
        self.nodes.len() * DOFS_PER_NODE
    }

    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Node<T> {
        &self.nodes[index]
    }

    pub fn elements(&self) -> &[BeamElement<T>] {
        &self.elements
    }

    pub fn links(&self) -> &[RigidLink] {
        &self.links
    }

    pub fn external_load(&self) -> &DVector<T> {
        &self.external
    }

    pub fn set_external_load(&mut self, load: DVector<T>) {
        self.external = load;
    }

    /// Condensation operator for the current configuration
    pub fn condensation(&self) -> Condensation<T> {
        let coordinates: Vec<Vector3<T>> = self.nodes.iter().map(|n| n.current.clone()).collect();
        Condensation::new(&self.constrained, &self.links, &coordinates)
    }

    /// Tangent and internal force in the current configuration
    pub fn assemble(&self) -> GlobalSystem<T> {
        GlobalSystem::assemble(self.num_dofs(), &self.elements)
    }

    /// Consistent mass matrix in the current configuration
    pub fn mass_matrix(&self) -> DMatrix<T> {
        assemble_mass(self.num_dofs(), &self.elements)
    }

    /// Largest absolute current coordinate, at least 1
    pub fn coordinate_scale(&self) -> f64 {
        self.nodes
            .iter()
            .flat_map(|n| n.current.iter())
            .map(|x| x.value().abs())
            .fold(1.0, f64::max)
    }

    /// Full displacement vector, 6 entries per node
    pub fn displacement_vector(&self) -> DVector<T> {
        let mut u = DVector::zeros(self.num_dofs());
        for node in &self.nodes {
            for d in 0..DOFS_PER_NODE {
                u[node.index * DOFS_PER_NODE + d] = node.displacement[d].clone();
            }
        }
        u
    }

    /// Apply one expanded increment to nodes, rigid slaves and elements
    pub fn apply_increment(&mut self, du: &DVector<T>) {
        for node in &mut self.nodes {
            let base = node.index * DOFS_PER_NODE;
            node.previous = node.current.clone();
            for d in 0..DOFS_PER_NODE {
                if !du[base + d].is_exact_zero() {
                    node.displacement[d] += du[base + d].clone();
                }
            }
            let dtheta = Vector3::new(
                du[base + 3].clone(),
                du[base + 4].clone(),
                du[base + 5].clone(),
            );
            if !dtheta.iter().all(Real::is_exact_zero) {
                node.orientation = pseudo_to_rotation(&dtheta) * node.orientation.clone();
            }
            node.current = node.reference.clone() + node.translation();
        }

        self.reproject_slaves();
        self.update_elements(du);
    }

    /// Place fully coupled slaves at `x_m + R_m r₀`
    fn reproject_slaves(&mut self) {
        for link in self.links.iter().filter(|l| l.is_full()) {
            let master = &self.nodes[link.master];
            let offset = self.nodes[link.slave].reference.clone() - master.reference.clone();
            let position = master.current.clone() + master.orientation.clone() * offset;
            let orientation = master.orientation.clone();

            let slave = &mut self.nodes[link.slave];
            for d in 0..3 {
                slave.displacement[d] = position[d].clone() - slave.reference[d].clone();
            }
            slave.current = position;
            slave.orientation = orientation;
        }
    }

    fn update_elements(&mut self, du: &DVector<T>) {
        for element in &mut self.elements {
            let [a, b] = element.nodes;
            let mut du_e = SVector::<T, 12>::zeros();
            for d in 0..DOFS_PER_NODE {
                du_e[d] = du[a * DOFS_PER_NODE + d].clone();
                du_e[DOFS_PER_NODE + d] = du[b * DOFS_PER_NODE + d].clone();
            }
            let mut x_ab = SVector::<T, 6>::zeros();
            for d in 0..3 {
                x_ab[d] = self.nodes[a].current[d].clone();
                x_ab[3 + d] = self.nodes[b].current[d].clone();
            }
            element.update(&du_e, &x_ab);
        }
    }

    /// Return every node and element to the undeformed state
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
        for element in &mut self.elements {
            element.reset();
        }
    }

    /// Impose a nodal state measured from the reference configuration
    ///
    /// Nodal displacements and orientations take the given values exactly.
    /// Element frames and internal forces follow from a single increment out
    /// of the undeformed state that carries each node to its orientation, so
    /// the elastic state is rebuilt from the true nodal rotations.
    pub fn set_state(&mut self, u: &DVector<T>, orientations: &[Matrix3<T>]) {
        self.reset();
        let mut du = u.clone();
        for (node, orientation) in self.nodes.iter_mut().zip(orientations) {
            let base = node.index * DOFS_PER_NODE;
            for d in 0..DOFS_PER_NODE {
                node.displacement[d] = u[base + d].clone();
            }
            node.orientation = orientation.clone();
            node.current = node.reference.clone() + node.translation();
            let theta = rotation_to_pseudo(orientation);
            for d in 0..3 {
                du[base + 3 + d] = theta[d].clone();
            }
        }
        self.update_elements(&du);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::BeamSection;
    use approx::assert_relative_eq;

    fn linked_model() -> BeamModel {
        let mut model = BeamModel::new(70e9, 0.3, 2700.0);
        let s = model.add_section(BeamSection::circular(0.02));
        model.add_node(0.0, 0.0, 0.0);
        model.add_node(1.0, 0.0, 0.0);
        model.add_node(1.0, 0.5, 0.0);
        model.add_node(2.0, 0.5, 0.0);
        model.add_element(0, 1, s, [0.0, 1.0, 0.0]);
        model.add_element(2, 3, s, [0.0, 1.0, 0.0]);
        model.add_rigid_link(RigidLink::full(1, 2));
        model.clamp(0);
        model
    }

    fn structure(model: &BeamModel) -> Structure<f64> {
        Structure::new(model, &DesignValues::from_model(model)).unwrap()
    }

    #[test]
    fn builds_undeformed_arena() {
        let model = linked_model();
        let s = structure(&model);
        assert_eq!(s.num_nodes(), 4);
        assert_eq!(s.elements().len(), 2);
        assert_eq!(s.condensation().num_reduced(), 24 - 6 - 6);
        assert!(s.displacement_vector().iter().all(|v| *v == 0.0));
        assert_eq!(s.node(3).current, Vector3::new(2.0, 0.5, 0.0));
    }

    #[test]
    fn rejects_invalid_model() {
        let mut model = linked_model();
        model.add_element(0, 9, 0, [0.0, 1.0, 0.0]);
        assert!(Structure::new(&model, &DesignValues::<f64>::from_model(&model)).is_err());
    }

    #[test]
    fn full_slave_follows_master_rotation() {
        let model = linked_model();
        let mut s = structure(&model);
        let mut du = DVector::zeros(24);
        // master node 1 translates and rotates about z
        du[6] = 0.01;
        du[6 + 5] = 0.3;
        // slave increments as the condensation would produce them
        du[12 + 5] = 0.3;
        s.apply_increment(&du);

        let r_m = pseudo_to_rotation(&Vector3::new(0.0, 0.0, 0.3));
        let r0 = Vector3::new(0.0, 0.5, 0.0);
        let expected = Vector3::new(0.01, 0.0, 0.0) + (r_m - Matrix3::identity()) * r0;
        let slave = s.node(2);
        for d in 0..3 {
            assert_relative_eq!(slave.displacement[d], expected[d], epsilon = 1e-14);
        }
        assert_eq!(slave.orientation, s.node(1).orientation);
        assert_eq!(slave.previous, Vector3::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn set_state_is_exact() {
        let model = linked_model();
        let mut s = structure(&model);
        let u = DVector::from_fn(24, |i, _| if i < 6 { 0.0 } else { 1e-3 * (i as f64).sin() });
        let orientations: Vec<Matrix3<f64>> = (0..4)
            .map(|n| pseudo_to_rotation(&Vector3::new(0.2 * n as f64, -0.1, 0.05 * n as f64)))
            .collect();
        s.set_state(&u, &orientations);
        assert_eq!(s.displacement_vector(), u);
        for (node, orientation) in s.nodes().iter().zip(&orientations) {
            assert_eq!(node.orientation, *orientation);
        }

        s.reset();
        assert!(s.displacement_vector().iter().all(|v| *v == 0.0));
        assert!(s.elements()[0].internal_force().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn mass_matrix_has_full_size() {
        let model = linked_model();
        let s = structure(&model);
        let m = s.mass_matrix();
        assert_eq!(m.nrows(), 24);
        assert!(m[(0, 0)] > 0.0);
    }
}
