//! JSON case configuration.
//!
//! A case file points at a mesh and a property file and carries the
//! material inputs, nodal loads, solver settings and the optional adjoint
//! objective:
//!
//! ```json
//! {
//!   "mesh": "cantilever.mesh",
//!   "properties": "cantilever.prop",
//!   "material": { "young_modulus": 70e9, "poisson_ratio": 0.3, "density": 2700 },
//!   "loads": [ { "node": 3, "dof": 3, "value": 100.0 } ],
//!   "objective": { "kind": "node_displacement", "node": 3 },
//!   "design_variables": ["young_modulus", { "load": { "node": 3, "dof": 3 } }]
//! }
//! ```
//!
//! Node and DOF numbers are 1-based, as in the mesh file. Relative paths are
//! resolved against the directory of the case file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result, read_text};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub young_modulus: f64,
    pub poisson_ratio: f64,
    #[serde(default)]
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    pub node: usize,
    pub dof: usize,
    pub value: f64,
}

/// Newton-Raphson settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: usize,
    pub tol_residual: f64,
    pub tol_displacement: f64,
    pub load_steps: usize,
    pub pivot_tolerance: f64,
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            tol_residual: 1e-8,
            tol_displacement: 1e-8,
            load_steps: 1,
            pivot_tolerance: 1e-14,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectiveConfig {
    /// Euclidean norm of the translation of a node
    NodeDisplacement { node: usize },
    /// One displacement component
    DisplacementComponent { node: usize, dof: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignVariableConfig {
    YoungModulus,
    PoissonRatio,
    Thickness,
    Load { node: usize, dof: usize },
}

fn default_fd_step() -> f64 {
    1e-6
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseConfig {
    pub mesh: PathBuf,
    pub properties: PathBuf,
    pub material: MaterialConfig,
    /// Wall thickness of thin-walled box sections
    #[serde(default)]
    pub wall_thickness: f64,
    #[serde(default)]
    pub loads: Vec<LoadConfig>,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub objective: Option<ObjectiveConfig>,
    #[serde(default)]
    pub design_variables: Vec<DesignVariableConfig>,
    /// Relative finite-difference step for gradient checks
    #[serde(default = "default_fd_step")]
    pub fd_step: f64,
    /// Displacement restart file applied before solving
    #[serde(default)]
    pub restart: Option<PathBuf>,
}

impl CaseConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: CaseConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a case file and resolve its relative paths
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::from_json(&read_text(path)?)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.mesh);
        resolve(&mut self.properties);
        if let Some(restart) = self.restart.as_mut() {
            resolve(restart);
        }
    }

    fn validate(&self) -> Result<()> {
        let one_based = |what: &str, node: usize, dof: Option<usize>| {
            if node == 0 || dof.is_some_and(|d| d == 0 || d > 6) {
                Err(IoError::InvalidData(format!(
                    "{what}: node and DOF numbers are 1-based (DOF 1..=6)"
                )))
            } else {
                Ok(())
            }
        };
        for load in &self.loads {
            one_based("load", load.node, Some(load.dof))?;
        }
        match &self.objective {
            Some(ObjectiveConfig::NodeDisplacement { node }) => one_based("objective", *node, None)?,
            Some(ObjectiveConfig::DisplacementComponent { node, dof }) => {
                one_based("objective", *node, Some(*dof))?
            }
            None => {}
        }
        for variable in &self.design_variables {
            if let DesignVariableConfig::Load { node, dof } = variable {
                one_based("design variable", *node, Some(*dof))?;
            }
        }
        if !(self.fd_step > 0.0) {
            return Err(IoError::InvalidData("fd_step must be positive".to_string()));
        }
        if self.solver.load_steps == 0 || self.solver.max_iterations == 0 {
            return Err(IoError::InvalidData(
                "load_steps and max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
