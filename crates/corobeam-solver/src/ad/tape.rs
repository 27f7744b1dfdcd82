//! Recording context for reverse-mode differentiation.
//!
//! A [`Tape`] is an owned handle. Active inputs registered on it carry a
//! clone of the handle, so every operation that depends on them appends a
//! statement while the tape is recording. The statement list is a linearized
//! graph: each entry stores the local partial derivatives with respect to its
//! (at most two) arguments, which is all the reverse sweep needs.
//!
//! Lifecycle:
//!
//! ```text
//! Idle --start_recording--> Recording --stop_recording--> Sealed --evaluate--> Sealed (evaluated)
//!   ^                                                                               |
//!   +------------------------------------ reset -----------------------------------+
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use thiserror::Error;

use super::active::{Active, Recorded};
use crate::scalar::Real;

thread_local! {
    /// Tape currently recording on this thread, if any.
    static RECORDING: RefCell<Weak<RefCell<TapeState>>> = RefCell::new(Weak::new());
}

/// Contract violations of the recording discipline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TapeError {
    #[error("a recording is already active on this tape")]
    AlreadyRecording,

    #[error("another tape is already recording on this thread")]
    OtherTapeRecording,

    #[error("operation requires an active recording (tape is {0:?})")]
    NotRecording(TapeStatus),

    #[error("operation requires a sealed tape (tape is {0:?})")]
    NotSealed(TapeStatus),

    #[error("adjoints have not been evaluated for the current recording")]
    NotEvaluated,

    #[error("value is not part of the current recording")]
    NotOnTape,

    #[error("input is already recorded as a dependent quantity and cannot be registered")]
    InputAlreadyUsed,
}

/// Recording state of a [`Tape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeStatus {
    Idle,
    Recording,
    Sealed,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Statement {
    args: [(usize, f64); 2],
    len: u8,
}

impl Statement {
    fn leaf() -> Self {
        Self {
            args: [(0, 0.0); 2],
            len: 0,
        }
    }

    fn args(&self) -> &[(usize, f64)] {
        &self.args[..self.len as usize]
    }
}

#[derive(Debug)]
pub(crate) struct TapeState {
    status: TapeStatus,
    epoch: u64,
    statements: Vec<Statement>,
    adjoints: Vec<f64>,
    seeds: Vec<(usize, f64)>,
    inputs: usize,
    evaluated: bool,
}

impl TapeState {
    fn new() -> Self {
        Self {
            status: TapeStatus::Idle,
            epoch: 0,
            statements: Vec::new(),
            adjoints: Vec::new(),
            seeds: Vec::new(),
            inputs: 0,
            evaluated: false,
        }
    }

    /// True when values of `epoch` may append new statements.
    pub(crate) fn is_recording(&self, epoch: u64) -> bool {
        self.status == TapeStatus::Recording && self.epoch == epoch
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Append a statement and return its index.
    ///
    /// `args` holds only the non-zero partials; an empty slice records a leaf.
    pub(crate) fn push(&mut self, args: &[(usize, f64)]) -> usize {
        let mut statement = Statement::leaf();
        for (slot, arg) in statement.args.iter_mut().zip(args) {
            *slot = *arg;
        }
        statement.len = args.len().min(2) as u8;
        self.statements.push(statement);
        self.statements.len() - 1
    }

    fn clear(&mut self) {
        self.statements.clear();
        self.adjoints.clear();
        self.seeds.clear();
        self.inputs = 0;
        self.evaluated = false;
        self.epoch += 1;
    }
}

/// Owned recording context.
///
/// Cloning a `Tape` clones the handle, not the recording.
#[derive(Debug, Clone)]
pub struct Tape {
    state: Rc<RefCell<TapeState>>,
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Tape {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(TapeState::new())),
        }
    }

    pub fn status(&self) -> TapeStatus {
        self.state.borrow().status
    }

    /// Number of recorded statements, inputs included.
    pub fn len(&self) -> usize {
        self.state.borrow().statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registered inputs in the current recording.
    pub fn num_inputs(&self) -> usize {
        self.state.borrow().inputs
    }

    /// Discard any recording and return to `Idle`.
    ///
    /// Values recorded before the reset become passive.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.clear();
        state.status = TapeStatus::Idle;
    }

    /// Reset and begin a new recording.
    ///
    /// Only one tape per thread may record at a time, so every value that
    /// takes part in a recorded operation belongs to the same tape.
    pub fn start_recording(&self) -> Result<(), TapeError> {
        if self.status() == TapeStatus::Recording {
            return Err(TapeError::AlreadyRecording);
        }
        RECORDING.with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(other) = slot.upgrade()
                && !Rc::ptr_eq(&other, &self.state)
                && other.borrow().status == TapeStatus::Recording
            {
                return Err(TapeError::OtherTapeRecording);
            }
            *slot = Rc::downgrade(&self.state);
            Ok(())
        })?;
        let mut state = self.state.borrow_mut();
        state.clear();
        state.status = TapeStatus::Recording;
        Ok(())
    }

    /// Seal the recording; later operations no longer append statements.
    pub fn stop_recording(&self) -> Result<(), TapeError> {
        let mut state = self.state.borrow_mut();
        if state.status != TapeStatus::Recording {
            return Err(TapeError::NotRecording(state.status));
        }
        state.status = TapeStatus::Sealed;
        Ok(())
    }

    /// Create a new independent variable with the given value.
    pub fn register(&self, value: f64) -> Result<Active, TapeError> {
        let mut state = self.state.borrow_mut();
        if state.status != TapeStatus::Recording {
            return Err(TapeError::NotRecording(state.status));
        }
        let index = state.push(&[]);
        state.inputs += 1;
        Ok(Active::Recorded(Recorded {
            value,
            index,
            epoch: state.epoch,
            tape: Rc::clone(&self.state),
        }))
    }

    /// Turn `x` into an independent variable in place.
    ///
    /// A value that already depends on recorded operations cannot become a
    /// root of the graph.
    pub fn register_input(&self, x: &mut Active) -> Result<(), TapeError> {
        if let Some(slot) = self.slot(x) {
            let state = self.state.borrow();
            if state.statements[slot].len > 0 {
                return Err(TapeError::InputAlreadyUsed);
            }
            // Registered earlier in this recording; nothing to do.
            return Ok(());
        }
        *x = self.register(x.value())?;
        Ok(())
    }

    /// Add `seed` to the adjoint of `output` before the reverse sweep.
    pub fn seed(&self, output: &Active, seed: f64) -> Result<(), TapeError> {
        let status = self.status();
        if status != TapeStatus::Sealed {
            return Err(TapeError::NotSealed(status));
        }
        match self.slot(output) {
            Some(index) => {
                let mut state = self.state.borrow_mut();
                state.seeds.push((index, seed));
                state.evaluated = false;
                Ok(())
            }
            // A passive output has no dependency on any input.
            None => Ok(()),
        }
    }

    /// Drop all seeds and computed adjoints, keeping the recording.
    pub fn clear_adjoints(&self) {
        let mut state = self.state.borrow_mut();
        state.seeds.clear();
        state.adjoints.clear();
        state.evaluated = false;
    }

    /// Propagate the seeds backward through every recorded statement.
    pub fn evaluate(&self) -> Result<(), TapeError> {
        let mut state = self.state.borrow_mut();
        if state.status != TapeStatus::Sealed {
            return Err(TapeError::NotSealed(state.status));
        }
        let n = state.statements.len();
        let mut adjoints = vec![0.0; n];
        for &(index, seed) in &state.seeds {
            adjoints[index] += seed;
        }
        for i in (0..n).rev() {
            let bar = adjoints[i];
            if bar == 0.0 {
                continue;
            }
            for &(arg, partial) in state.statements[i].args() {
                adjoints[arg] += partial * bar;
            }
        }
        state.adjoints = adjoints;
        state.evaluated = true;
        Ok(())
    }

    /// Accumulated sensitivity of the seeded outputs with respect to `input`.
    pub fn gradient(&self, input: &Active) -> Result<f64, TapeError> {
        let index = self.slot(input).ok_or(TapeError::NotOnTape)?;
        let state = self.state.borrow();
        if !state.evaluated {
            return Err(TapeError::NotEvaluated);
        }
        Ok(state.adjoints[index])
    }

    /// Statement index of `x` if it belongs to the current recording.
    fn slot(&self, x: &Active) -> Option<usize> {
        match x {
            Active::Recorded(r)
                if Rc::ptr_eq(&r.tape, &self.state) && r.epoch == self.state.borrow().epoch() =>
            {
                Some(r.index)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lifecycle_is_enforced() {
        let tape = Tape::new();
        assert_eq!(tape.status(), TapeStatus::Idle);
        assert!(matches!(
            tape.register(1.0),
            Err(TapeError::NotRecording(TapeStatus::Idle))
        ));
        assert!(tape.evaluate().is_err());

        tape.start_recording().unwrap();
        assert_eq!(tape.start_recording(), Err(TapeError::AlreadyRecording));
        tape.stop_recording().unwrap();
        assert_eq!(tape.status(), TapeStatus::Sealed);
        assert!(tape.stop_recording().is_err());

        tape.reset();
        assert_eq!(tape.status(), TapeStatus::Idle);
        assert!(tape.is_empty());
    }

    #[test]
    fn gradient_of_product_and_quotient() {
        let tape = Tape::new();
        tape.start_recording().unwrap();
        let x = tape.register(3.0).unwrap();
        let y = tape.register(4.0).unwrap();
        // f = x * y / (x + y)
        let f = x.clone() * y.clone() / (x.clone() + y.clone());
        tape.stop_recording().unwrap();
        tape.seed(&f, 1.0).unwrap();
        tape.evaluate().unwrap();

        let s = 7.0_f64;
        assert_relative_eq!(tape.gradient(&x).unwrap(), 16.0 / (s * s), epsilon = 1e-14);
        assert_relative_eq!(tape.gradient(&y).unwrap(), 9.0 / (s * s), epsilon = 1e-14);
    }

    #[test]
    fn gradient_through_transcendentals() {
        let tape = Tape::new();
        tape.start_recording().unwrap();
        let x = tape.register(0.7).unwrap();
        let y = tape.register(1.3).unwrap();
        let f = x.sin() * y.cos() + y.atan2(&x) + (x.clone() * x.clone() + y.clone()).sqrt();
        tape.stop_recording().unwrap();
        tape.seed(&f, 1.0).unwrap();
        tape.evaluate().unwrap();

        let (xv, yv) = (0.7_f64, 1.3_f64);
        let r2 = xv * xv + yv * yv;
        let q = (xv * xv + yv).sqrt();
        let dfdx = xv.cos() * yv.cos() - yv / r2 + xv / q;
        let dfdy = -xv.sin() * yv.sin() + xv / r2 + 0.5 / q;
        assert_relative_eq!(tape.gradient(&x).unwrap(), dfdx, epsilon = 1e-13);
        assert_relative_eq!(tape.gradient(&y).unwrap(), dfdy, epsilon = 1e-13);
    }

    #[test]
    fn operations_after_sealing_are_passive() {
        let tape = Tape::new();
        tape.start_recording().unwrap();
        let x = tape.register(2.0).unwrap();
        tape.stop_recording().unwrap();
        let before = tape.len();
        let y = x.clone() * x.clone();
        assert_eq!(tape.len(), before);
        assert!(!y.is_recorded());
        assert_eq!(y.value(), 4.0);
    }

    #[test]
    fn gradient_requires_evaluation() {
        let tape = Tape::new();
        tape.start_recording().unwrap();
        let x = tape.register(2.0).unwrap();
        let f = x.clone() * x.clone();
        tape.stop_recording().unwrap();
        tape.seed(&f, 1.0).unwrap();
        assert_eq!(tape.gradient(&x), Err(TapeError::NotEvaluated));
        tape.evaluate().unwrap();
        assert_relative_eq!(tape.gradient(&x).unwrap(), 4.0);
    }

    #[test]
    fn reset_invalidates_previous_values() {
        let tape = Tape::new();
        tape.start_recording().unwrap();
        let x = tape.register(2.0).unwrap();
        tape.reset();
        tape.start_recording().unwrap();
        let y = x.clone() * Active::from(3.0);
        assert!(!y.is_recorded());
        tape.stop_recording().unwrap();
        tape.evaluate().unwrap();
        assert_eq!(tape.gradient(&x), Err(TapeError::NotOnTape));
    }

    #[test]
    fn dependent_value_cannot_be_registered() {
        let tape = Tape::new();
        tape.start_recording().unwrap();
        let x = tape.register(2.0).unwrap();
        let mut y = x.clone() + x.clone();
        assert_eq!(tape.register_input(&mut y), Err(TapeError::InputAlreadyUsed));

        let mut z = Active::from(5.0);
        tape.register_input(&mut z).unwrap();
        assert!(z.is_recorded());
        assert_eq!(tape.num_inputs(), 2);
    }

    #[test]
    fn zero_partials_are_pruned() {
        let tape = Tape::new();
        tape.start_recording().unwrap();
        let x = tape.register(2.0).unwrap();
        let before = tape.len();
        let y = x.clone() * Active::from(0.0);
        assert_eq!(tape.len(), before);
        assert!(!y.is_recorded());
        assert!(y.is_exact_zero());
    }

    #[test]
    fn one_recording_per_thread() {
        let first = Tape::new();
        let second = Tape::new();
        first.start_recording().unwrap();
        assert_eq!(second.start_recording(), Err(TapeError::OtherTapeRecording));
        assert_eq!(second.status(), TapeStatus::Idle);

        first.stop_recording().unwrap();
        second.start_recording().unwrap();
        let x = second.register(1.5).unwrap();
        assert!((x.clone() * x).is_recorded());
        second.stop_recording().unwrap();

        // A dropped tape no longer blocks others.
        let third = Tape::new();
        third.start_recording().unwrap();
        drop(third);
        first.start_recording().unwrap();
        first.reset();
    }
}
