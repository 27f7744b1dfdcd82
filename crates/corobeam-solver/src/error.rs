//! Error types for corobeam-solver

use corobeam_io::IoError;
use thiserror::Error;

use crate::ad::TapeError;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Newton-Raphson did not converge in {iterations} iterations (relative residual {residual:.3e})")]
    NotConverged { iterations: usize, residual: f64 },

    #[error("Singular tangent matrix: {0}")]
    Singular(String),

    #[error("Recording error: {0}")]
    Recording(String),

    #[error("Tape error: {0}")]
    Tape(#[from] TapeError),

    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}
