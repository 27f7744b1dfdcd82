//! Nonlinear static equilibrium with Newton-Raphson iteration.
//!
//! Solves
//! R(u) = F_ext - F_int(u) = 0
//!
//! on the DOFs left free by the constraints and rigid links. The external load
//! is ramped from the previously applied load to the target load over
//! `load_steps` increments, and each increment is iterated to equilibrium:
//!
//! 1. Assemble tangent K_T and internal force F_int in element order
//! 2. Condense: K_red = Tᵀ K_T T, r_red = Tᵀ (F_ext − F_int); fully linked
//!    slaves add the offset rotation term to K_red
//! 3. Converged when ||r||/||r₀|| < tol_residual and ||Δu||/||Δu₀|| < tol_displacement
//!    (checked from the second iteration on; a zero initial residual converges at once).
//!    An increment at round-off level of the coordinates also ends the
//!    iteration: the state can no longer change, so neither ratio can improve.
//! 4. Solve K_red Δu_red = r_red
//! 5. Expand Δu = T Δu_red and update nodes, rigid slaves and element frames
//!
//! The loop is generic over [`Real`], so the same code runs a plain analysis
//! and a recorded one for the adjoint.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use corobeam_io::SolverSettings;

use crate::backend::{LinearSolver, LinearSystemData, default_backend};
use crate::error::{Result, SolverError};
use crate::scalar::{Real, plain_norm};
use crate::structure::Structure;

/// Largest increment component, relative to the coordinate scale, that
/// counts as round-off
pub const ROUNDOFF_INCREMENT: f64 = 1e-13;

/// Nonlinear solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearConfig {
    /// Maximum number of iterations per load step
    pub max_iterations: usize,
    /// Relative residual tolerance
    pub tol_residual: f64,
    /// Relative displacement increment tolerance
    pub tol_displacement: f64,
    /// Number of load increments per solve
    pub load_steps: usize,
    /// Smallest accepted pivot relative to the largest matrix entry
    pub pivot_tolerance: f64,
    /// Print the iteration table
    pub verbose: bool,
}

impl Default for NonlinearConfig {
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

impl From<&SolverSettings> for NonlinearConfig {
    fn from(settings: &SolverSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            tol_residual: settings.tol_residual,
            tol_displacement: settings.tol_displacement,
            load_steps: settings.load_steps,
            pivot_tolerance: settings.pivot_tolerance,
            verbose: settings.verbose,
        }
    }
}

/// Solver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverState {
    Uninitialized,
    Assembling,
    Iterating,
    Converged,
    MaxIterExceeded,
    /// Numerical failure, e.g. a singular tangent
    Failed,
}

/// One row of the iteration history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub load_step: usize,
    pub iteration: usize,
    pub relative_residual: f64,
    pub relative_increment: f64,
}

/// Outcome of a converged solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub coupling_iteration: usize,
    pub load_steps: usize,
    /// Newton iterations summed over all load steps
    pub total_iterations: usize,
    /// Plain norm of the condensed residual at equilibrium
    pub residual_norm: f64,
    pub history: Vec<IterationRecord>,
}

/// Newton-Raphson solver
pub struct NonlinearSolver<T: Real> {
    config: NonlinearConfig,
    backend: Box<dyn LinearSolver<T>>,
    state: SolverState,
    /// Load reached by the last solve, start of the next ramp
    applied_load: Option<DVector<T>>,
    equilibrium: bool,
}

impl<T: Real> NonlinearSolver<T> {
    pub fn new(config: NonlinearConfig) -> Self {
        let backend = default_backend(config.pivot_tolerance);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: NonlinearConfig, backend: Box<dyn LinearSolver<T>>) -> Self {
        Self {
            config,
            backend,
            state: SolverState::Uninitialized,
            applied_load: None,
            equilibrium: false,
        }
    }

    pub fn config(&self) -> &NonlinearConfig {
        &self.config
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    /// False after a failed or non-converged solve
    pub fn in_equilibrium(&self) -> bool {
        self.equilibrium
    }

    /// Return the structure to its reference state and forget the applied load
    pub fn initialize(&mut self, structure: &mut Structure<T>) {
        structure.reset();
        self.applied_load = None;
        self.equilibrium = false;
        self.state = SolverState::Assembling;
    }

    /// Record `load` as the level the current state is in equilibrium with,
    /// so the next solve ramps from there
    pub fn set_applied_load(&mut self, load: DVector<T>) {
        self.applied_load = Some(load);
    }

    /// Bring the structure into equilibrium with its external load
    pub fn solve(
        &mut self,
        structure: &mut Structure<T>,
        coupling_iteration: usize,
    ) -> Result<SolveReport> {
        if self.state == SolverState::Uninitialized {
            self.initialize(structure);
        }
        let steps = self.config.load_steps.max(1);
        let target = structure.external_load().clone();
        let start = self
            .applied_load
            .clone()
            .unwrap_or_else(|| DVector::zeros(target.len()));

        if self.config.verbose {
            println!(
                "Coupling iteration {coupling_iteration}: {} DOFs, {} load step(s)",
                structure.num_dofs(),
                steps
            );
        }

        let mut report = SolveReport {
            coupling_iteration,
            load_steps: steps,
            total_iterations: 0,
            residual_norm: 0.0,
            history: Vec::new(),
        };
        self.equilibrium = false;

        for step in 1..=steps {
            let load = if step == steps {
                target.clone()
            } else {
                let fraction = T::from_f64(step as f64 / steps as f64);
                ramp(&start, &target, &fraction)
            };
            report.residual_norm = self.solve_step(structure, &load, step, &mut report)?;
            self.applied_load = Some(load);
        }

        self.equilibrium = true;
        if self.config.verbose {
            println!(
                "Converged after {} iteration(s), residual {:.3e}",
                report.total_iterations, report.residual_norm
            );
        }
        Ok(report)
    }

    /// Newton iterations for one load level; returns the final residual norm
    fn solve_step(
        &mut self,
        structure: &mut Structure<T>,
        load: &DVector<T>,
        step: usize,
        report: &mut SolveReport,
    ) -> Result<f64> {
        let mut r0_norm = 0.0;
        let mut du0_norm = 0.0;
        let mut last_relative = f64::INFINITY;
        let mut relative_increment = 1.0;
        let mut largest_increment = f64::INFINITY;
        let roundoff = ROUNDOFF_INCREMENT * structure.coordinate_scale();

        for iteration in 0..=self.config.max_iterations {
            self.state = SolverState::Assembling;
            let condensation = structure.condensation();
            let system = structure.assemble();
            system.validate().map_err(|msg| {
                self.state = SolverState::Failed;
                SolverError::Singular(msg)
            })?;
            let full_residual = system.residual(load);
            let residual = condensation.reduce_vector(&full_residual);
            let r_norm = plain_norm(residual.iter());

            if iteration == 0 {
                r0_norm = r_norm;
                if r_norm == 0.0 {
                    self.state = SolverState::Converged;
                    return Ok(0.0);
                }
            }
            let relative_residual = r_norm / r0_norm;
            last_relative = relative_residual;

            if iteration > 0 {
                report.history.push(IterationRecord {
                    load_step: step,
                    iteration,
                    relative_residual,
                    relative_increment,
                });
                if self.config.verbose {
                    println!(
                        "  step {step:>3}  iter {iteration:>3}  |r|/|r0| = {relative_residual:.3e}  |du|/|du0| = {relative_increment:.3e}"
                    );
                }
                let stagnated = largest_increment <= roundoff;
                if stagnated
                    || (relative_residual < self.config.tol_residual
                        && relative_increment < self.config.tol_displacement)
                {
                    self.state = SolverState::Converged;
                    return Ok(r_norm);
                }
            }
            if iteration == self.config.max_iterations {
                break;
            }

            self.state = SolverState::Iterating;
            let tangent = condensation.reduce_tangent(&system.tangent, &full_residual);
            let (du_reduced, _info) = self
                .backend
                .solve_linear(LinearSystemData {
                    matrix: tangent,
                    rhs: residual,
                })
                .map_err(|e| {
                    self.state = SolverState::Failed;
                    SolverError::Singular(e.0)
                })?;

            let du_norm = plain_norm(du_reduced.iter());
            if iteration == 0 {
                du0_norm = du_norm;
            }
            relative_increment = if du0_norm > 0.0 { du_norm / du0_norm } else { 0.0 };
            largest_increment = du_reduced.iter().map(|v| v.value().abs()).fold(0.0, f64::max);

            structure.apply_increment(&condensation.expand(&du_reduced));
            report.total_iterations += 1;
        }

        self.state = SolverState::MaxIterExceeded;
        if self.config.verbose {
            eprintln!(
                "Warning: Newton-Raphson did not converge in {} iterations at load step {step} (relative residual {last_relative:.3e})",
                self.config.max_iterations
            );
        }
        Err(SolverError::NotConverged {
            iterations: self.config.max_iterations,
            residual: last_relative,
        })
    }
}

/// `start + (target − start)·fraction`
fn ramp<T: Real>(start: &DVector<T>, target: &DVector<T>, fraction: &T) -> DVector<T> {
    DVector::from_iterator(
        target.len(),
        start.iter().zip(target.iter()).map(|(s, t)| {
            if s == t {
                t.clone()
            } else {
                s.clone() + (t.clone() - s.clone()) * fraction.clone()
            }
        }),
    )
}
