//! Finite element library for the corotational beam solver.

use nalgebra::{DMatrix, DVector};

use crate::scalar::Real;

pub mod beam;
pub mod rotation;

pub use beam::{BeamElement, BeamSection, ElementConstants};
pub use rotation::{pseudo_to_rotation, rotation_to_pseudo};

/// Element interface used by the global assembly
///
/// Matrices and vectors are returned in global coordinates, ordered node by
/// node with `dofs_per_node` entries each.
pub trait Element<T: Real> {
    /// Arena indices (0-based) of the element nodes
    fn node_indices(&self) -> &[usize];

    /// Get the number of degrees of freedom per node
    fn dofs_per_node(&self) -> usize;

    /// Current tangent stiffness matrix
    fn tangent_matrix(&self) -> DMatrix<T>;

    /// Consistent mass matrix
    fn mass_matrix(&self) -> DMatrix<T>;

    /// Current internal force vector
    fn internal_force(&self) -> DVector<T>;

    /// Get the number of nodes for this element type
    fn num_nodes(&self) -> usize {
        self.node_indices().len()
    }

    /// Global DOF indices of this element
    fn global_dof_indices(&self) -> Vec<usize> {
        let dofs_per_node = self.dofs_per_node();
        let mut indices = Vec::with_capacity(self.num_nodes() * dofs_per_node);
        for &node in self.node_indices() {
            let base_dof = node * dofs_per_node;
            indices.extend(base_dof..base_dof + dofs_per_node);
        }
        indices
    }
}

/// Beam section constants
#[derive(Debug, Clone, PartialEq)]
pub struct SectionProperties<T: Real> {
    /// Cross-sectional area [m²]
    pub area: T,
    /// Second moment of area about y-axis [m⁴]
    pub iyy: T,
    /// Second moment of area about z-axis [m⁴]
    pub izz: T,
    /// Torsional constant [m⁴]
    pub torsion_constant: T,
}

impl<T: Real> SectionProperties<T> {
    /// Create section properties for a beam element
    pub fn beam(area: T, iyy: T, izz: T, torsion_constant: T) -> Self {
        Self {
            area,
            iyy,
            izz,
            torsion_constant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyElement {
        nodes: Vec<usize>,
    }

    impl Element<f64> for DummyElement {
        fn node_indices(&self) -> &[usize] {
            &self.nodes
        }
        fn dofs_per_node(&self) -> usize {
            6
        }
        fn tangent_matrix(&self) -> DMatrix<f64> {
            DMatrix::zeros(12, 12)
        }
        fn mass_matrix(&self) -> DMatrix<f64> {
            DMatrix::zeros(12, 12)
        }
        fn internal_force(&self) -> DVector<f64> {
            DVector::zeros(12)
        }
    }

    #[test]
    fn global_dof_indices_simple() {
        let elem = DummyElement { nodes: vec![0, 1] };
        let indices = elem.global_dof_indices();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn global_dof_indices_offset() {
        let elem = DummyElement { nodes: vec![4, 2] };
        let indices = elem.global_dof_indices();

        // Node 4: DOFs 24..30, node 2: DOFs 12..18
        assert_eq!(&indices[..6], &[24, 25, 26, 27, 28, 29]);
        assert_eq!(&indices[6..], &[12, 13, 14, 15, 16, 17]);
    }
}
