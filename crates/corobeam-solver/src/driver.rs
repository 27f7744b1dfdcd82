//! Plain analysis facade.
//!
//! [`BeamSolver`] couples a [`BeamModel`] with a `f64` [`Structure`] and the
//! Newton solver. It is the interface a driving layer (a coupling loop or the
//! command-line tool) talks to: set loads, solve, query the deformed state and
//! save or restore it through restart files.

use std::path::Path;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use corobeam_io::{CaseConfig, RestartRecord, read_restart, write_restart};

use crate::boundary_conditions::DOFS_PER_NODE;
use crate::elements::pseudo_to_rotation;
use crate::error::{Result, SolverError};
use crate::model::{BeamModel, DesignValues};
use crate::nonlinear_solver::{NonlinearConfig, NonlinearSolver, SolveReport};
use crate::scalar::plain_norm;
use crate::structure::Structure;

pub struct BeamSolver {
    model: BeamModel,
    structure: Structure<f64>,
    solver: NonlinearSolver<f64>,
    last_report: Option<SolveReport>,
}

impl BeamSolver {
    /// Validate the model and build the undeformed structure
    pub fn new(model: BeamModel, config: NonlinearConfig) -> Result<Self> {
        let mut structure = Structure::new(&model, &DesignValues::from_model(&model))?;
        let mut solver = NonlinearSolver::new(config);
        solver.initialize(&mut structure);
        Ok(Self {
            model,
            structure,
            solver,
            last_report: None,
        })
    }

    /// Set up a case; a restart file named by the case is applied right away
    pub fn from_case(case: &CaseConfig) -> Result<Self> {
        let model = BeamModel::from_case(case)?;
        let mut solver = Self::new(model, NonlinearConfig::from(&case.solver))?;
        if let Some(restart) = &case.restart {
            solver.read_restart(restart)?;
        }
        Ok(solver)
    }

    pub fn model(&self) -> &BeamModel {
        &self.model
    }

    pub fn structure(&self) -> &Structure<f64> {
        &self.structure
    }

    pub fn config(&self) -> &NonlinearConfig {
        self.solver.config()
    }

    pub fn last_report(&self) -> Option<&SolveReport> {
        self.last_report.as_ref()
    }

    pub fn num_nodes(&self) -> usize {
        self.model.num_nodes()
    }

    /// Bring the structure into equilibrium with the current loads
    pub fn solve(&mut self, coupling_iteration: usize) -> Result<&SolveReport> {
        let report = self.solver.solve(&mut self.structure, coupling_iteration)?;
        let report: &SolveReport = self.last_report.insert(report);
        Ok(report)
    }

    /// Replace the load on DOF `dof` (0-based) of a node
    pub fn set_load(&mut self, node: usize, dof: usize, value: f64) -> Result<()> {
        self.check_dof(node, dof)?;
        if !value.is_finite() {
            return Err(SolverError::InvalidModel(format!(
                "load on node {node} DOF {dof} is not finite"
            )));
        }
        self.model.boundary_conditions.set_load(node, dof + 1, value);
        self.structure.set_external_load(self.model.load_vector());
        Ok(())
    }

    /// Cumulative displacement component (0-based DOF)
    pub fn displacement(&self, node: usize, dof: usize) -> Result<f64> {
        self.check_dof(node, dof)?;
        Ok(self.structure.node(node).displacement[dof])
    }

    /// Current coordinate along axis `dim`
    pub fn coordinate(&self, node: usize, dim: usize) -> Result<f64> {
        self.check_axis(node, dim)?;
        Ok(self.structure.node(node).current[dim])
    }

    pub fn reference_coordinate(&self, node: usize, dim: usize) -> Result<f64> {
        self.check_axis(node, dim)?;
        Ok(self.structure.node(node).reference[dim])
    }

    /// Coordinate before the last Newton update
    pub fn previous_coordinate(&self, node: usize, dim: usize) -> Result<f64> {
        self.check_axis(node, dim)?;
        Ok(self.structure.node(node).previous[dim])
    }

    pub fn displacement_vector(&self) -> DVector<f64> {
        self.structure.displacement_vector()
    }

    pub fn set_low_verbosity(&mut self) {
        self.solver.set_verbose(false);
    }

    pub fn set_high_verbosity(&mut self) {
        self.solver.set_verbose(true);
    }

    /// Consistent mass matrix in the current configuration
    pub fn mass_matrix(&self) -> DMatrix<f64> {
        self.structure.mass_matrix()
    }

    /// Norm of the condensed out-of-balance force in the current state
    pub fn equilibrium_residual(&self) -> f64 {
        let condensation = self.structure.condensation();
        let system = self.structure.assemble();
        let residual = condensation.reduce_vector(&system.residual(self.structure.external_load()));
        plain_norm(residual.iter())
    }

    /// One record per node
    pub fn displacement_records(&self) -> Vec<RestartRecord> {
        self.structure
            .nodes()
            .iter()
            .map(|node| {
                let mut displacement = [0.0; DOFS_PER_NODE];
                for (slot, value) in displacement.iter_mut().zip(node.displacement.iter()) {
                    *slot = *value;
                }
                let mut orientation = [[0.0; 3]; 3];
                for (i, row) in orientation.iter_mut().enumerate() {
                    for (j, slot) in row.iter_mut().enumerate() {
                        *slot = node.orientation[(i, j)];
                    }
                }
                RestartRecord::new(node.index, displacement, orientation)
            })
            .collect()
    }

    /// Impose restart records; nodes without a record stay undeformed
    ///
    /// The state is taken to be in equilibrium with the current loads. A
    /// record without an orientation falls back to the rotation of its
    /// accumulated pseudo-vector, which is exact only for rotations about a
    /// fixed axis.
    pub fn apply_displacements(&mut self, records: &[RestartRecord]) -> Result<()> {
        let mut u = DVector::zeros(self.structure.num_dofs());
        let mut orientations = vec![Matrix3::identity(); self.num_nodes()];
        for record in records {
            if record.node >= self.num_nodes() {
                return Err(SolverError::InvalidModel(format!(
                    "restart record for unknown node {}",
                    record.node + 1
                )));
            }
            let base = record.node * DOFS_PER_NODE;
            for (d, value) in record.displacement.iter().enumerate() {
                u[base + d] = *value;
            }
            orientations[record.node] = match record.orientation {
                Some(rows) => Matrix3::from_fn(|i, j| rows[i][j]),
                None => pseudo_to_rotation(&Vector3::new(u[base + 3], u[base + 4], u[base + 5])),
            };
        }
        self.structure.set_state(&u, &orientations);
        self.solver.set_applied_load(self.structure.external_load().clone());
        Ok(())
    }

    pub fn write_restart(&self, path: impl AsRef<Path>) -> Result<()> {
        write_restart(path, &self.displacement_records())?;
        Ok(())
    }

    pub fn read_restart(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let records = read_restart(path)?;
        self.apply_displacements(&records)
    }

    /// Apply a restart file and return the equilibrium residual of that state
    pub fn run_restart(&mut self, path: impl AsRef<Path>) -> Result<f64> {
        self.read_restart(path)?;
        let residual = self.equilibrium_residual();
        if self.solver.config().verbose {
            println!("Restart state residual: {residual:.6e}");
        }
        Ok(residual)
    }

    fn check_dof(&self, node: usize, dof: usize) -> Result<()> {
        if node >= self.num_nodes() || dof >= DOFS_PER_NODE {
            return Err(SolverError::InvalidModel(format!(
                "node {node} DOF {dof} is outside the model"
            )));
        }
        Ok(())
    }

    fn check_axis(&self, node: usize, dim: usize) -> Result<()> {
        if node >= self.num_nodes() || dim >= 3 {
            return Err(SolverError::InvalidModel(format!(
                "node {node} axis {dim} is outside the model"
            )));
        }
        Ok(())
    }
}
