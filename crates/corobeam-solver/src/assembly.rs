//! Global matrix assembly for the beam structure.
//!
//! Assembles element contributions into the global system:
//! - K: Global tangent stiffness matrix (dense)
//! - F_int: Global internal force vector
//!
//! ## Assembly Process
//!
//! 1. Allocate the global tangent K (num_dofs × num_dofs) and F_int
//! 2. Loop over all elements in their fixed order:
//!    - Compute element tangent k_e and internal force f_e
//!    - Get element DOF indices
//!    - Add contributions to K and F_int
//!
//! Constraints and rigid links are applied afterwards by the condensation
//! in [`rigid_link`](crate::rigid_link).

use nalgebra::{DMatrix, DVector};

use crate::elements::Element;
use crate::scalar::Real;

/// Global finite element system
#[derive(Debug, Clone)]
pub struct GlobalSystem<T: Real> {
    /// Global tangent stiffness matrix
    pub tangent: DMatrix<T>,
    /// Global internal force vector
    pub internal_force: DVector<T>,
    /// Number of degrees of freedom
    pub num_dofs: usize,
}

impl<T: Real> GlobalSystem<T> {
    /// Create a new empty global system
    pub fn new(num_dofs: usize) -> Self {
        Self {
            tangent: DMatrix::zeros(num_dofs, num_dofs),
            internal_force: DVector::zeros(num_dofs),
            num_dofs,
        }
    }

    /// Assemble tangent and internal force of all elements
    pub fn assemble<E: Element<T>>(num_dofs: usize, elements: &[E]) -> Self {
        let mut system = Self::new(num_dofs);
        for element in elements {
            system.add_element(element);
        }
        system
    }

    /// Add one element's contributions
    pub fn add_element<E: Element<T>>(&mut self, element: &E) {
        let dofs = element.global_dof_indices();
        let k_e = element.tangent_matrix();
        let f_e = element.internal_force();

        for (i, &gi) in dofs.iter().enumerate() {
            if !f_e[i].is_exact_zero() {
                self.internal_force[gi] += f_e[i].clone();
            }
            for (j, &gj) in dofs.iter().enumerate() {
                if !k_e[(i, j)].is_exact_zero() {
                    self.tangent[(gi, gj)] += k_e[(i, j)].clone();
                }
            }
        }
    }

    /// Out-of-balance force `F_ext − F_int`
    pub fn residual(&self, external: &DVector<T>) -> DVector<T> {
        let mut r = external.clone();
        for (ri, fi) in r.iter_mut().zip(self.internal_force.iter()) {
            if !fi.is_exact_zero() {
                *ri -= fi.clone();
            }
        }
        r
    }

    /// Validate the system (finite entries)
    pub fn validate(&self) -> Result<(), String> {
        if let Some(i) = self.internal_force.iter().position(|v| !v.value().is_finite()) {
            return Err(format!("internal force at DOF {i} is not finite"));
        }
        if self.tangent.iter().any(|v| !v.value().is_finite()) {
            return Err("tangent matrix contains non-finite entries".to_string());
        }
        Ok(())
    }
}

/// Assemble the global consistent mass matrix
pub fn assemble_mass<T: Real, E: Element<T>>(num_dofs: usize, elements: &[E]) -> DMatrix<T> {
    let mut mass = DMatrix::zeros(num_dofs, num_dofs);
    for element in elements {
        let dofs = element.global_dof_indices();
        let m_e = element.mass_matrix();
        for (i, &gi) in dofs.iter().enumerate() {
            for (j, &gj) in dofs.iter().enumerate() {
                if !m_e[(i, j)].is_exact_zero() {
                    mass[(gi, gj)] += m_e[(i, j)].clone();
                }
            }
        }
    }
    mass
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{BeamElement, BeamSection, ElementConstants};
    use crate::materials::Material;
    use nalgebra::Vector3;

    fn two_element_chain() -> Vec<BeamElement<f64>> {
        let section = BeamSection::custom(1e-3, 2e-7, 3e-7, 4e-7).properties(&0.0);
        let material = Material::new(70e9, 0.3, 2700.0);
        let xs = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
        ];
        (0..2)
            .map(|e| {
                let constants = ElementConstants::new(&section, &material, 1.0);
                BeamElement::new(
                    e,
                    [e, e + 1],
                    constants,
                    &xs[e],
                    &xs[e + 1],
                    &Vector3::new(0.0, 1.0, 0.0),
                )
            })
            .collect()
    }

    #[test]
    fn creates_empty_system() {
        let system = GlobalSystem::<f64>::new(12);
        assert_eq!(system.num_dofs, 12);
        assert_eq!(system.tangent.nrows(), 12);
        assert_eq!(system.internal_force.len(), 12);
        assert!(system.validate().is_ok());
    }

    #[test]
    fn shared_node_receives_both_contributions() {
        let elements = two_element_chain();
        let system = GlobalSystem::assemble(18, &elements);
        let ae = elements[0].constants().ae;

        // axial stiffness at the middle node: AE/L from each side
        assert!((system.tangent[(6, 6)] - 2.0 * ae).abs() < 1e-6 * ae);
        assert!((system.tangent[(0, 6)] + ae).abs() < 1e-6 * ae);
        assert_eq!(system.tangent[(0, 12)], 0.0);
    }

    #[test]
    fn undeformed_tangent_is_symmetric() {
        let elements = two_element_chain();
        let system = GlobalSystem::assemble(18, &elements);
        let scale = system.tangent.amax();
        for i in 0..18 {
            for j in 0..18 {
                assert!((system.tangent[(i, j)] - system.tangent[(j, i)]).abs() <= 1e-12 * scale);
            }
        }
    }

    #[test]
    fn residual_subtracts_internal_force() {
        let mut system = GlobalSystem::<f64>::new(3);
        system.internal_force = DVector::from_vec(vec![1.0, 0.0, -2.0]);
        let r = system.residual(&DVector::from_vec(vec![1.0, 5.0, 0.0]));
        assert_eq!(r, DVector::from_vec(vec![0.0, 5.0, 2.0]));
    }

    #[test]
    fn mass_matrix_total_translational_mass() {
        let elements = two_element_chain();
        let mass = assemble_mass(18, &elements);
        // rigid translation in x: uᵀ M u = total mass ρ A L
        let mut u = DVector::zeros(18);
        for n in 0..3 {
            u[6 * n] = 1.0;
        }
        let total = u.dot(&(&mass * &u));
        approx::assert_relative_eq!(total, 2700.0 * 1e-3 * 2.0, max_relative = 1e-12);
    }
}
