//! Nonlinear corotational beam solver with a discrete adjoint.
//!
//! The crate computes the large-displacement equilibrium of framed
//! structures and the exact gradients of displacement objectives with
//! respect to material, section and load inputs.
//!
//! - [`elements`]: corotational Euler-Bernoulli beam element
//! - [`rigid_link`]: RBE2 links and the condensation of dependent DOFs
//! - [`nonlinear_solver`]: load-stepped Newton-Raphson iteration
//! - [`driver::BeamSolver`]: plain analysis facade with restart support
//! - [`adjoint::AdjointDriver`]: recorded solve and reverse sweep
//! - [`ad`]: tape and active scalar used by the adjoint
//!
//! Everything below the facades is generic over [`scalar::Real`], so the
//! plain and the recorded analyses share one implementation.

pub mod ad;
pub mod adjoint;
pub mod assembly;
pub mod backend;
pub mod boundary_conditions;
pub mod driver;
pub mod elements;
pub mod error;
pub mod materials;
pub mod model;
pub mod nonlinear_solver;
pub mod rigid_link;
pub mod scalar;
pub mod structure;

pub use ad::{Active, Tape, TapeError, TapeStatus};
pub use adjoint::{
    AdjointDriver, DesignGradients, DesignVariable, FiniteDifference, GradientCheck, Objective,
    check_gradients, evaluate_objective, finite_difference_gradient,
};
pub use assembly::GlobalSystem;
pub use backend::{LinearSolver, LinearSystemData, NativeBackend, SolveInfo, default_backend};
pub use boundary_conditions::{BoundaryConditions, ConcentratedLoad, DOFS_PER_NODE, DisplacementBC, DofId};
pub use driver::BeamSolver;
pub use elements::{BeamElement, BeamSection, Element as ElementTrait, ElementConstants, SectionProperties};
pub use error::{Result, SolverError};
pub use materials::Material;
pub use model::{BeamModel, DesignValues, ElementDefinition};
pub use nonlinear_solver::{IterationRecord, NonlinearConfig, NonlinearSolver, SolveReport, SolverState};
pub use rigid_link::{Condensation, RigidLink};
pub use scalar::Real;
pub use structure::{Node, Structure};
