//! Reverse-mode algorithmic differentiation.
//!
//! - [`Tape`]: owned recording context with an explicit Idle/Recording/Sealed
//!   state machine.
//! - [`Active`]: scalar with a plain and a recorded variant; implements
//!   [`Real`](crate::scalar::Real) so the whole solver runs on it unchanged.

mod active;
mod tape;

pub use active::{Active, Recorded};
pub use tape::{Tape, TapeError, TapeStatus};
