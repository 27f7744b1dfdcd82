//! Discrete adjoint of the nonlinear beam solve.
//!
//! [`AdjointDriver`] runs the forward Newton solve on [`Active`] scalars while
//! its [`Tape`] records, then sweeps the recording backward from the seeded
//! objective to the registered design inputs. A session looks like:
//!
//! ```text
//! start_recording
//! register_input(..)*       E, ν, wall thickness, nodal loads
//! set_dependencies          structure rebuilt from the active inputs
//! solve(iter)
//! set_objective(..)
//! stop_recording
//! store_displacement_adjoint(..)*   optional seeds from a coupled solver
//! compute_adjoint
//! gradient(..)
//! ```
//!
//! [`finite_difference_gradient`] gives independent central-difference
//! estimates from plain solves, run in parallel with rayon.

use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use corobeam_io::{DesignVariableConfig, ObjectiveConfig};

use crate::ad::{Active, Tape, TapeError, TapeStatus};
use crate::boundary_conditions::DOFS_PER_NODE;
use crate::driver::BeamSolver;
use crate::error::{Result, SolverError};
use crate::model::{BeamModel, DesignValues};
use crate::nonlinear_solver::{NonlinearConfig, NonlinearSolver, SolveReport};
use crate::scalar::{Real, squared_norm3};
use crate::structure::Structure;

/// Differentiable model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignVariable {
    YoungModulus,
    PoissonRatio,
    /// Wall thickness of the box sections
    Thickness,
    /// Nodal load component (0-based node and DOF)
    Load { node: usize, dof: usize },
    /// Every nodal load component
    AllLoads,
}

impl From<&DesignVariableConfig> for DesignVariable {
    fn from(config: &DesignVariableConfig) -> Self {
        match *config {
            DesignVariableConfig::YoungModulus => DesignVariable::YoungModulus,
            DesignVariableConfig::PoissonRatio => DesignVariable::PoissonRatio,
            DesignVariableConfig::Thickness => DesignVariable::Thickness,
            DesignVariableConfig::Load { node, dof } => DesignVariable::Load {
                node: node - 1,
                dof: dof - 1,
            },
        }
    }
}

/// Scalar quantity of interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Euclidean norm of the nodal translation
    NodeDisplacement(usize),
    /// One displacement component (0-based DOF)
    DisplacementComponent { node: usize, dof: usize },
}

impl From<&ObjectiveConfig> for Objective {
    fn from(config: &ObjectiveConfig) -> Self {
        match *config {
            ObjectiveConfig::NodeDisplacement { node } => Objective::NodeDisplacement(node - 1),
            ObjectiveConfig::DisplacementComponent { node, dof } => {
                Objective::DisplacementComponent {
                    node: node - 1,
                    dof: dof - 1,
                }
            }
        }
    }
}

/// Objective value in the current state of a structure
pub fn evaluate_objective<T: Real>(structure: &Structure<T>, objective: &Objective) -> Result<T> {
    match *objective {
        Objective::NodeDisplacement(node) => {
            check_dof(structure.num_nodes(), node, 0)?;
            let u = &structure.node(node).displacement;
            let translation = Vector3::new(u[0].clone(), u[1].clone(), u[2].clone());
            let squared = squared_norm3(&translation);
            // the norm has no derivative at zero
            if squared.value() == 0.0 {
                Ok(T::zero())
            } else {
                Ok(squared.sqrt())
            }
        }
        Objective::DisplacementComponent { node, dof } => {
            check_dof(structure.num_nodes(), node, dof)?;
            Ok(structure.node(node).displacement[dof].clone())
        }
    }
}

fn check_dof(num_nodes: usize, node: usize, dof: usize) -> Result<()> {
    if node >= num_nodes || dof >= DOFS_PER_NODE {
        return Err(SolverError::InvalidModel(format!(
            "node {node} DOF {dof} is outside the model"
        )));
    }
    Ok(())
}

/// Sensitivities of the seeded outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignGradients {
    pub young_modulus: f64,
    pub poisson_ratio: f64,
    pub thickness: f64,
    /// One entry per global DOF
    pub loads: Vec<f64>,
}

pub struct AdjointDriver {
    model: BeamModel,
    config: NonlinearConfig,
    tape: Tape,
    design: DesignValues<Active>,
    registered: Vec<DesignVariable>,
    structure: Option<Structure<Active>>,
    solver: Option<NonlinearSolver<Active>>,
    report: Option<SolveReport>,
    objective: Option<Active>,
    pending_seeds: Vec<(usize, usize, f64)>,
    gradients: Option<DesignGradients>,
}

impl AdjointDriver {
    pub fn new(model: BeamModel, config: NonlinearConfig) -> Result<Self> {
        model.validate()?;
        let design = DesignValues::from_model(&model);
        Ok(Self {
            model,
            config,
            tape: Tape::new(),
            design,
            registered: Vec::new(),
            structure: None,
            solver: None,
            report: None,
            objective: None,
            pending_seeds: Vec::new(),
            gradients: None,
        })
    }

    pub fn model(&self) -> &BeamModel {
        &self.model
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    pub fn registered_inputs(&self) -> &[DesignVariable] {
        &self.registered
    }

    pub fn structure(&self) -> Option<&Structure<Active>> {
        self.structure.as_ref()
    }

    pub fn report(&self) -> Option<&SolveReport> {
        self.report.as_ref()
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
        if let Some(solver) = self.solver.as_mut() {
            solver.set_verbose(verbose);
        }
    }

    /// Discard the previous session and start a new recording
    pub fn start_recording(&mut self) -> Result<()> {
        if self.tape.status() == TapeStatus::Recording {
            return Err(TapeError::AlreadyRecording.into());
        }
        self.tape.start_recording()?;
        self.design = DesignValues::from_model(&self.model);
        self.registered.clear();
        self.structure = None;
        self.solver = None;
        self.report = None;
        self.objective = None;
        self.pending_seeds.clear();
        self.gradients = None;
        Ok(())
    }

    /// Make a design input independent on the tape
    pub fn register_input(&mut self, variable: DesignVariable) -> Result<()> {
        self.require_recording("register_input")?;
        if self.structure.is_some() {
            return Err(SolverError::Recording(
                "inputs must be registered before set_dependencies".to_string(),
            ));
        }
        match variable {
            DesignVariable::YoungModulus => self.tape.register_input(&mut self.design.young_modulus)?,
            DesignVariable::PoissonRatio => self.tape.register_input(&mut self.design.poisson_ratio)?,
            DesignVariable::Thickness => self.tape.register_input(&mut self.design.wall_thickness)?,
            DesignVariable::Load { node, dof } => {
                check_dof(self.model.num_nodes(), node, dof)?;
                let index = node * DOFS_PER_NODE + dof;
                self.tape.register_input(&mut self.design.loads[index])?;
            }
            DesignVariable::AllLoads => {
                for load in self.design.loads.iter_mut() {
                    self.tape.register_input(load)?;
                }
            }
        }
        if !self.registered.contains(&variable) {
            self.registered.push(variable);
        }
        Ok(())
    }

    /// Build the structure from the (partly active) design values
    pub fn set_dependencies(&mut self) -> Result<()> {
        self.require_recording("set_dependencies")?;
        let mut structure = Structure::new(&self.model, &self.design)?;
        let mut solver = NonlinearSolver::new(self.config.clone());
        solver.initialize(&mut structure);
        self.structure = Some(structure);
        self.solver = Some(solver);
        Ok(())
    }

    /// Forward solve under recording
    pub fn solve(&mut self, coupling_iteration: usize) -> Result<&SolveReport> {
        self.require_recording("solve")?;
        let (Some(structure), Some(solver)) = (self.structure.as_mut(), self.solver.as_mut()) else {
            return Err(SolverError::Recording(
                "set_dependencies must run before solve".to_string(),
            ));
        };
        let report = solver.solve(structure, coupling_iteration)?;
        let report: &SolveReport = self.report.insert(report);
        Ok(report)
    }

    /// Record the objective on the current state; returns its value
    pub fn set_objective(&mut self, objective: &Objective) -> Result<f64> {
        self.require_recording("set_objective")?;
        let Some(structure) = self.structure.as_ref() else {
            return Err(SolverError::Recording(
                "the objective needs a solved structure".to_string(),
            ));
        };
        let value = evaluate_objective(structure, objective)?;
        let plain = value.value();
        self.objective = Some(value);
        Ok(plain)
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.objective.as_ref().map(Real::value)
    }

    pub fn stop_recording(&mut self) -> Result<()> {
        self.tape.stop_recording()?;
        Ok(())
    }

    /// Seed the adjoint of a displacement component (0-based DOF)
    pub fn store_displacement_adjoint(&mut self, node: usize, dof: usize, value: f64) -> Result<()> {
        let status = self.tape.status();
        if status != TapeStatus::Sealed {
            return Err(TapeError::NotSealed(status).into());
        }
        check_dof(self.model.num_nodes(), node, dof)?;
        self.pending_seeds.push((node, dof, value));
        Ok(())
    }

    /// Reverse sweep from the objective and the stored seeds
    pub fn compute_adjoint(&mut self) -> Result<&DesignGradients> {
        let status = self.tape.status();
        if status != TapeStatus::Sealed {
            return Err(TapeError::NotSealed(status).into());
        }
        if self.objective.is_none() && self.pending_seeds.is_empty() {
            return Err(SolverError::Recording(
                "no objective or displacement adjoint to differentiate".to_string(),
            ));
        }

        self.tape.clear_adjoints();
        if let Some(objective) = &self.objective {
            self.tape.seed(objective, 1.0)?;
        }
        if let Some(structure) = &self.structure {
            for (node, dof, value) in self.pending_seeds.drain(..) {
                self.tape.seed(&structure.node(node).displacement[dof], value)?;
            }
        }
        self.pending_seeds.clear();
        self.tape.evaluate()?;

        let gradients = DesignGradients {
            young_modulus: self.input_gradient(&self.design.young_modulus)?,
            poisson_ratio: self.input_gradient(&self.design.poisson_ratio)?,
            thickness: self.input_gradient(&self.design.wall_thickness)?,
            loads: self
                .design
                .loads
                .iter()
                .map(|load| self.input_gradient(load))
                .collect::<Result<_>>()?,
        };
        let gradients: &DesignGradients = self.gradients.insert(gradients);
        Ok(gradients)
    }

    /// All gradients of the last reverse sweep
    pub fn gradients(&self) -> Result<&DesignGradients> {
        self.gradients
            .as_ref()
            .ok_or_else(|| SolverError::Recording("compute_adjoint has not run".to_string()))
    }

    /// Gradient with respect to one scalar design variable
    pub fn gradient(&self, variable: DesignVariable) -> Result<f64> {
        let gradients = self.gradients()?;
        match variable {
            DesignVariable::YoungModulus => Ok(gradients.young_modulus),
            DesignVariable::PoissonRatio => Ok(gradients.poisson_ratio),
            DesignVariable::Thickness => Ok(gradients.thickness),
            DesignVariable::Load { node, dof } => {
                check_dof(self.model.num_nodes(), node, dof)?;
                Ok(gradients.loads[node * DOFS_PER_NODE + dof])
            }
            DesignVariable::AllLoads => Err(SolverError::Recording(
                "all loads have no scalar gradient, use gradients().loads".to_string(),
            )),
        }
    }

    /// Inputs that were never registered have no sensitivity
    fn input_gradient(&self, input: &Active) -> Result<f64> {
        match self.tape.gradient(input) {
            Ok(g) => Ok(g),
            Err(TapeError::NotOnTape) => Ok(0.0),
            Err(e) => Err(e.into()),
        }
    }

    fn require_recording(&self, operation: &str) -> Result<()> {
        let status = self.tape.status();
        if status != TapeStatus::Recording {
            return Err(SolverError::Recording(format!(
                "{operation} requires an active recording (tape is {status:?})"
            )));
        }
        Ok(())
    }
}

/// Central-difference estimate for one design variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiniteDifference {
    pub variable: DesignVariable,
    pub step: f64,
    pub gradient: f64,
}

/// Adjoint and finite-difference gradient side by side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientCheck {
    pub variable: DesignVariable,
    pub adjoint: f64,
    pub finite_difference: f64,
    /// `|adjoint − fd| / max(|adjoint|, |fd|)`, zero when both vanish
    pub relative_error: f64,
}

impl GradientCheck {
    pub fn new(variable: DesignVariable, adjoint: f64, finite_difference: f64) -> Self {
        let scale = adjoint.abs().max(finite_difference.abs());
        let relative_error = if scale > 0.0 {
            (adjoint - finite_difference).abs() / scale
        } else {
            0.0
        };
        Self {
            variable,
            adjoint,
            finite_difference,
            relative_error,
        }
    }
}

/// Replace `AllLoads` by one `Load` entry per DOF
pub fn expand_variables(model: &BeamModel, variables: &[DesignVariable]) -> Vec<DesignVariable> {
    let mut expanded = Vec::new();
    for &variable in variables {
        match variable {
            DesignVariable::AllLoads => {
                for node in 0..model.num_nodes() {
                    for dof in 0..DOFS_PER_NODE {
                        expanded.push(DesignVariable::Load { node, dof });
                    }
                }
            }
            other => expanded.push(other),
        }
    }
    expanded
}

fn design_value(model: &BeamModel, variable: DesignVariable) -> f64 {
    match variable {
        DesignVariable::YoungModulus => model.young_modulus,
        DesignVariable::PoissonRatio => model.poisson_ratio,
        DesignVariable::Thickness => model.wall_thickness,
        DesignVariable::Load { node, dof } => model.load_vector()[node * DOFS_PER_NODE + dof],
        DesignVariable::AllLoads => 0.0,
    }
}

fn perturbed(model: &BeamModel, variable: DesignVariable, value: f64) -> BeamModel {
    let mut model = model.clone();
    match variable {
        DesignVariable::YoungModulus => model.young_modulus = value,
        DesignVariable::PoissonRatio => model.poisson_ratio = value,
        DesignVariable::Thickness => model.wall_thickness = value,
        DesignVariable::Load { node, dof } => model.boundary_conditions.set_load(node, dof + 1, value),
        DesignVariable::AllLoads => {}
    }
    model
}

fn objective_at(model: BeamModel, config: &NonlinearConfig, objective: &Objective) -> Result<f64> {
    let mut solver = BeamSolver::new(model, config.clone())?;
    solver.solve(0)?;
    evaluate_objective(solver.structure(), objective)
}

/// Central differences `(f(v + h) − f(v − h)) / 2h` with `h = rel_step·max(|v|, 1)`
///
/// Every perturbed model is solved from scratch on `f64`; the solves run in
/// parallel.
pub fn finite_difference_gradient(
    model: &BeamModel,
    config: &NonlinearConfig,
    objective: &Objective,
    variables: &[DesignVariable],
    rel_step: f64,
) -> Result<Vec<FiniteDifference>> {
    if !(rel_step > 0.0 && rel_step.is_finite()) {
        return Err(SolverError::InvalidModel(format!(
            "finite-difference step must be positive, got {rel_step}"
        )));
    }
    model.validate()?;
    let config = NonlinearConfig {
        verbose: false,
        ..config.clone()
    };
    let variables = expand_variables(model, variables);
    for variable in &variables {
        if let DesignVariable::Load { node, dof } = *variable {
            check_dof(model.num_nodes(), node, dof)?;
        }
    }

    variables
        .par_iter()
        .map(|&variable| {
            let value = design_value(model, variable);
            let step = rel_step * value.abs().max(1.0);
            let plus = objective_at(perturbed(model, variable, value + step), &config, objective)?;
            let minus = objective_at(perturbed(model, variable, value - step), &config, objective)?;
            Ok(FiniteDifference {
                variable,
                step,
                gradient: (plus - minus) / (2.0 * step),
            })
        })
        .collect()
}

/// Pair adjoint gradients with finite differences for every variable
pub fn check_gradients(
    gradients: &DesignGradients,
    differences: &[FiniteDifference],
) -> Vec<GradientCheck> {
    differences
        .iter()
        .map(|fd| {
            let adjoint = match fd.variable {
                DesignVariable::YoungModulus => gradients.young_modulus,
                DesignVariable::PoissonRatio => gradients.poisson_ratio,
                DesignVariable::Thickness => gradients.thickness,
                DesignVariable::Load { node, dof } => gradients.loads[node * DOFS_PER_NODE + dof],
                DesignVariable::AllLoads => 0.0,
            };
            GradientCheck::new(fd.variable, adjoint, fd.gradient)
        })
        .collect()
}
