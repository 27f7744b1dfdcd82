//! Numerical backend abstraction layer.
//!
//! This module provides the trait-based interface for the linear solve of
//! each Newton iteration, allowing the nonlinear solver to be
//! backend-agnostic.
//!
//! # Architecture
//!
//! ```text
//! Element Library (nalgebra SMatrix, generic over Real)
//!         │
//!         ▼
//! Assembly + rigid link condensation (DMatrix<T>)
//!         │
//!         ▼
//! Backend Trait Layer (LinearSolver<T>)
//!         │
//!         ▼
//!   Native dense LU
//! ```

pub mod native;
pub mod traits;

pub use native::{NativeBackend, lu_solve};
pub use traits::*;

use crate::scalar::Real;

/// Returns the default solver backend.
pub fn default_backend<T: Real>(pivot_tolerance: f64) -> Box<dyn LinearSolver<T>> {
    Box::new(NativeBackend::new(pivot_tolerance))
}
