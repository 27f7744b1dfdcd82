//! Backend trait definitions for the linear solve of each Newton iteration.
//!
//! The assembled, condensed system is handed to a backend as dense data.
//! Element-level computations stay in nalgebra fixed-size matrices.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::scalar::Real;

/// Error type for backend operations.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// A linear system ready for solving: K * u = F.
///
/// Constrained and slave DOFs are already condensed out.
pub struct LinearSystemData<T: Real> {
    /// Reduced tangent matrix
    pub matrix: DMatrix<T>,
    /// Reduced right-hand side
    pub rhs: DVector<T>,
}

impl<T: Real> LinearSystemData<T> {
    pub fn num_dofs(&self) -> usize {
        self.rhs.len()
    }
}

/// Solver convergence and diagnostic info.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    /// Number of iterations (1 for direct solvers)
    pub iterations: usize,
    /// Smallest pivot magnitude relative to the largest matrix entry
    pub min_relative_pivot: Option<f64>,
    /// Human-readable solver name (e.g., "dense-LU")
    pub solver_name: String,
}

/// Trait for a linear solver backend.
///
/// Implementations solve K * u = F given the assembled system data. They
/// must only combine entries through the `Real` arithmetic so that recorded
/// scalars keep their derivative information.
pub trait LinearSolver<T: Real>: Send + Sync {
    /// Solve K * u = F and return the solution vector.
    fn solve_linear(&self, system: LinearSystemData<T>) -> Result<(DVector<T>, SolveInfo), BackendError>;

    /// Human-readable name of this backend.
    fn name(&self) -> &str;
}
