//! Boundary conditions and nodal loading.
//!
//! This module handles:
//! - Homogeneous displacement constraints (clamped DOF ranges)
//! - Concentrated nodal loads (forces and moments)
//!
//! Node indices are 0-based positions in the model; DOF numbers follow the
//! input convention 1..=6 (ux, uy, uz, θx, θy, θz).

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DVector;

/// Degrees of freedom per node: 3 translations + 3 rotations
pub const DOFS_PER_NODE: usize = 6;

/// Degree of freedom index (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DofId {
    /// Node index
    pub node: usize,
    /// DOF index (0 = X, 1 = Y, 2 = Z, 3..6 rotations)
    pub dof: usize,
}

impl DofId {
    /// Create a new DOF identifier
    pub fn new(node: usize, dof: usize) -> Self {
        Self { node, dof }
    }

    /// Position in the global DOF vector
    pub fn global_index(&self) -> usize {
        self.node * DOFS_PER_NODE + self.dof
    }
}

/// A homogeneous displacement boundary condition (fixed DOF range)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplacementBC {
    /// Node index
    pub node: usize,
    /// First DOF to constrain (1-based)
    pub first_dof: usize,
    /// Last DOF to constrain (1-based, inclusive)
    pub last_dof: usize,
}

impl DisplacementBC {
    /// Create a new displacement boundary condition
    pub fn new(node: usize, first_dof: usize, last_dof: usize) -> Self {
        Self {
            node,
            first_dof,
            last_dof,
        }
    }

    /// Clamp all six DOFs of a node
    pub fn clamped(node: usize) -> Self {
        Self::new(node, 1, DOFS_PER_NODE)
    }

    /// Get all DOF IDs affected by this boundary condition (0-based)
    pub fn affected_dofs(&self) -> Vec<DofId> {
        (self.first_dof..=self.last_dof)
            .map(|dof| DofId::new(self.node, dof - 1)) // Convert to 0-based
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.first_dof == 0 || self.last_dof > DOFS_PER_NODE || self.first_dof > self.last_dof {
            return Err(format!(
                "invalid DOF range {}..={} on node {}",
                self.first_dof, self.last_dof, self.node
            ));
        }
        Ok(())
    }
}

/// A concentrated load on a node
#[derive(Debug, Clone, PartialEq)]
pub struct ConcentratedLoad {
    /// Node index
    pub node: usize,
    /// DOF to load (1-based)
    pub dof: usize,
    /// Load magnitude
    pub magnitude: f64,
}

impl ConcentratedLoad {
    /// Create a new concentrated load
    pub fn new(node: usize, dof: usize, magnitude: f64) -> Self {
        Self {
            node,
            dof,
            magnitude,
        }
    }

    /// Get the DOF ID for this load (0-based)
    pub fn dof_id(&self) -> DofId {
        DofId::new(self.node, self.dof - 1) // Convert to 0-based
    }
}

/// Boundary conditions and loads of one analysis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryConditions {
    /// All displacement boundary conditions
    pub displacement_bcs: Vec<DisplacementBC>,
    /// All concentrated loads
    pub concentrated_loads: Vec<ConcentratedLoad>,
}

impl BoundaryConditions {
    /// Create an empty boundary conditions object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a displacement boundary condition
    pub fn add_displacement_bc(&mut self, bc: DisplacementBC) {
        self.displacement_bcs.push(bc);
    }

    /// Add a concentrated load
    pub fn add_concentrated_load(&mut self, load: ConcentratedLoad) {
        self.concentrated_loads.push(load);
    }

    /// Replace every load on one DOF by a single value
    pub fn set_load(&mut self, node: usize, dof: usize, magnitude: f64) {
        self.concentrated_loads
            .retain(|load| !(load.node == node && load.dof == dof));
        self.concentrated_loads
            .push(ConcentratedLoad::new(node, dof, magnitude));
    }

    /// Get all constrained DOFs
    pub fn constrained_dofs(&self) -> BTreeSet<DofId> {
        self.displacement_bcs
            .iter()
            .flat_map(DisplacementBC::affected_dofs)
            .collect()
    }

    /// Get all nodal loads as a map (DOF -> total load)
    pub fn nodal_loads(&self) -> BTreeMap<DofId, f64> {
        let mut loads = BTreeMap::new();
        for load in &self.concentrated_loads {
            *loads.entry(load.dof_id()).or_insert(0.0) += load.magnitude;
        }
        loads
    }

    /// Global external load vector for `num_nodes` nodes
    pub fn load_vector(&self, num_nodes: usize) -> DVector<f64> {
        let mut f = DVector::zeros(num_nodes * DOFS_PER_NODE);
        for (dof_id, value) in self.nodal_loads() {
            f[dof_id.global_index()] += value;
        }
        f
    }

    /// Check node references and DOF numbers against the model size
    pub fn validate(&self, num_nodes: usize) -> Result<(), String> {
        for bc in &self.displacement_bcs {
            if bc.node >= num_nodes {
                return Err(format!("constraint references unknown node {}", bc.node));
            }
            bc.validate()?;
        }
        for load in &self.concentrated_loads {
            if load.node >= num_nodes {
                return Err(format!("load references unknown node {}", load.node));
            }
            if load.dof == 0 || load.dof > DOFS_PER_NODE {
                return Err(format!("load DOF {} out of range 1..=6", load.dof));
            }
            if !load.magnitude.is_finite() {
                return Err(format!("load on node {} is not finite", load.node));
            }
        }
        Ok(())
    }

    /// Get statistics
    pub fn statistics(&self) -> BCStatistics {
        BCStatistics {
            num_displacement_bcs: self.displacement_bcs.len(),
            num_constrained_dofs: self.constrained_dofs().len(),
            num_concentrated_loads: self.concentrated_loads.len(),
        }
    }
}

/// Boundary condition statistics
#[derive(Debug, Clone)]
pub struct BCStatistics {
    /// Number of displacement BC entries
    pub num_displacement_bcs: usize,
    /// Total number of constrained DOFs
    pub num_constrained_dofs: usize,
    /// Number of concentrated loads
    pub num_concentrated_loads: usize,
}

impl BCStatistics {
    /// Format as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "BCs: {} displacement entries ({} DOFs), {} concentrated loads",
            self.num_displacement_bcs, self.num_constrained_dofs, self.num_concentrated_loads
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement_bc_affects_correct_dofs() {
        let bc = DisplacementBC::new(10, 1, 3);
        let dofs = bc.affected_dofs();

        assert_eq!(dofs.len(), 3);
        assert_eq!(dofs[0], DofId::new(10, 0)); // X direction
        assert_eq!(dofs[1], DofId::new(10, 1)); // Y direction
        assert_eq!(dofs[2], DofId::new(10, 2)); // Z direction
    }

    #[test]
    fn clamped_node_fixes_rotations_too() {
        let dofs = DisplacementBC::clamped(2).affected_dofs();
        assert_eq!(dofs.len(), 6);
        assert_eq!(dofs[5].global_index(), 17);
    }

    #[test]
    fn concentrated_load_dof_id() {
        let load = ConcentratedLoad::new(20, 3, 100.0);
        let dof_id = load.dof_id();

        assert_eq!(dof_id.node, 20);
        assert_eq!(dof_id.dof, 2); // Z direction (3 -> 2 in 0-based)
    }

    #[test]
    fn overlapping_constraints_counted_once() {
        let mut bcs = BoundaryConditions::new();
        bcs.add_displacement_bc(DisplacementBC::new(1, 1, 3));
        bcs.add_displacement_bc(DisplacementBC::new(1, 2, 4));
        assert_eq!(bcs.constrained_dofs().len(), 4);
        assert_eq!(bcs.statistics().num_constrained_dofs, 4);
    }

    #[test]
    fn nodal_loads_accumulate() {
        let mut bcs = BoundaryConditions::new();

        bcs.add_concentrated_load(ConcentratedLoad::new(1, 1, 100.0));
        bcs.add_concentrated_load(ConcentratedLoad::new(1, 1, 50.0)); // Accumulate
        bcs.add_concentrated_load(ConcentratedLoad::new(2, 2, 200.0));

        let loads = bcs.nodal_loads();
        assert_eq!(loads.len(), 2);
        assert_eq!(loads.get(&DofId::new(1, 0)), Some(&150.0));
        assert_eq!(loads.get(&DofId::new(2, 1)), Some(&200.0));

        let f = bcs.load_vector(3);
        assert_eq!(f.len(), 18);
        assert_eq!(f[6], 150.0);
        assert_eq!(f[13], 200.0);
    }

    #[test]
    fn set_load_replaces_existing_entries() {
        let mut bcs = BoundaryConditions::new();
        bcs.add_concentrated_load(ConcentratedLoad::new(1, 3, 10.0));
        bcs.add_concentrated_load(ConcentratedLoad::new(1, 3, 5.0));
        bcs.set_load(1, 3, -2.0);
        assert_eq!(bcs.nodal_loads().get(&DofId::new(1, 2)), Some(&-2.0));
    }

    #[test]
    fn validation_rejects_bad_references() {
        let mut bcs = BoundaryConditions::new();
        bcs.add_displacement_bc(DisplacementBC::new(0, 0, 3));
        assert!(bcs.validate(2).is_err());

        let mut bcs = BoundaryConditions::new();
        bcs.add_concentrated_load(ConcentratedLoad::new(5, 1, 1.0));
        assert!(bcs.validate(2).is_err());

        let mut bcs = BoundaryConditions::new();
        bcs.add_displacement_bc(DisplacementBC::clamped(0));
        bcs.add_concentrated_load(ConcentratedLoad::new(1, 6, 1.0));
        assert!(bcs.validate(2).is_ok());
    }
}
