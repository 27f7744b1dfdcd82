//! I/O support for the corobeam solver.
//!
//! This crate provides:
//! - **Mesh reader** for the counted-block beam mesh format (`NPOIN=`, `NELEM=`, ...)
//! - **Property reader** for explicit and thin-walled box sections
//! - **Restart files** with bit-exact nodal displacement records
//! - **JSON case configuration** for the command-line driver

pub mod config;
pub mod error;
pub mod mesh;
pub mod property;
pub mod restart;

pub use config::{
    CaseConfig, DesignVariableConfig, LoadConfig, MaterialConfig, ObjectiveConfig, SolverSettings,
};
pub use error::{IoError, ParseError, Result};
pub use mesh::{MeshConstraint, MeshData, MeshElement, MeshRigidLink};
pub use property::{SectionRecord, parse_properties, read_properties};
pub use restart::{RestartRecord, format_restart, parse_restart, read_restart, write_restart};
