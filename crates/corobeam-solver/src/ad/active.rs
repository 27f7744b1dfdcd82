//! Active scalar: a plain `f64` or a value recorded on a [`Tape`](super::Tape).

use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::rc::Rc;

use num_traits::{One, Zero};

use super::tape::TapeState;
use crate::scalar::Real;

/// Scalar that optionally records the operations it takes part in.
///
/// Arithmetic between `Plain` values never touches a tape. As soon as one
/// operand is `Recorded` on a tape that is currently recording, the result is
/// recorded too, with the local partial derivatives of the operation. Values
/// whose tape is idle or sealed behave like plain numbers.
///
/// At most one tape records on a thread at a time (enforced by
/// [`Tape::start_recording`](super::Tape::start_recording)), so two live
/// operands always share the same tape.
#[derive(Clone)]
pub enum Active {
    Plain(f64),
    Recorded(Recorded),
}

#[derive(Clone)]
pub struct Recorded {
    pub(crate) value: f64,
    pub(crate) index: usize,
    pub(crate) epoch: u64,
    pub(crate) tape: Rc<RefCell<TapeState>>,
}

impl Active {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Active::Recorded(_))
    }

    /// Statement index and tape of `self` if it may take part in recording.
    fn live(&self) -> Option<(usize, &Rc<RefCell<TapeState>>)> {
        match self {
            Active::Recorded(r) if r.tape.borrow().is_recording(r.epoch) => {
                Some((r.index, &r.tape))
            }
            _ => None,
        }
    }

    fn unary(&self, value: f64, partial: f64) -> Active {
        match self.live() {
            Some((index, tape)) if partial != 0.0 => record(tape, value, &[(index, partial)]),
            _ => Active::Plain(value),
        }
    }

    fn binary(&self, rhs: &Active, value: f64, da: f64, db: f64) -> Active {
        let lhs = self.live();
        let rhs = rhs.live();
        let tape = match (lhs, rhs) {
            (Some((_, a)), Some((_, b))) => {
                debug_assert!(Rc::ptr_eq(a, b));
                a
            }
            (Some((_, a)), None) => a,
            (None, Some((_, b))) => b,
            (None, None) => return Active::Plain(value),
        };
        let mut args = Vec::with_capacity(2);
        if let Some((index, _)) = lhs
            && da != 0.0
        {
            args.push((index, da));
        }
        if let Some((index, _)) = rhs
            && db != 0.0
        {
            args.push((index, db));
        }
        if args.is_empty() {
            return Active::Plain(value);
        }
        record(tape, value, &args)
    }
}

fn record(tape: &Rc<RefCell<TapeState>>, value: f64, args: &[(usize, f64)]) -> Active {
    let mut state = tape.borrow_mut();
    let index = state.push(args);
    Active::Recorded(Recorded {
        value,
        index,
        epoch: state.epoch(),
        tape: Rc::clone(tape),
    })
}

impl From<f64> for Active {
    fn from(value: f64) -> Self {
        Active::Plain(value)
    }
}

impl fmt::Debug for Active {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Active::Plain(v) => write!(f, "{v:?}"),
            Active::Recorded(r) => write!(f, "{:?}@{}", r.value, r.index),
        }
    }
}

impl fmt::Display for Active {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value(), f)
    }
}

impl PartialEq for Active {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Add for Active {
    type Output = Active;
    fn add(self, rhs: Active) -> Active {
        self.binary(&rhs, self.value() + rhs.value(), 1.0, 1.0)
    }
}

impl Sub for Active {
    type Output = Active;
    fn sub(self, rhs: Active) -> Active {
        self.binary(&rhs, self.value() - rhs.value(), 1.0, -1.0)
    }
}

impl Mul for Active {
    type Output = Active;
    fn mul(self, rhs: Active) -> Active {
        let (a, b) = (self.value(), rhs.value());
        self.binary(&rhs, a * b, b, a)
    }
}

impl Div for Active {
    type Output = Active;
    fn div(self, rhs: Active) -> Active {
        let (a, b) = (self.value(), rhs.value());
        let q = a / b;
        self.binary(&rhs, q, 1.0 / b, -q / b)
    }
}

impl Neg for Active {
    type Output = Active;
    fn neg(self) -> Active {
        self.unary(-self.value(), -1.0)
    }
}

impl AddAssign for Active {
    fn add_assign(&mut self, rhs: Active) {
        *self = self.clone() + rhs;
    }
}

impl SubAssign for Active {
    fn sub_assign(&mut self, rhs: Active) {
        *self = self.clone() - rhs;
    }
}

impl MulAssign for Active {
    fn mul_assign(&mut self, rhs: Active) {
        *self = self.clone() * rhs;
    }
}

impl DivAssign for Active {
    fn div_assign(&mut self, rhs: Active) {
        *self = self.clone() / rhs;
    }
}

impl Zero for Active {
    fn zero() -> Self {
        Active::Plain(0.0)
    }

    fn is_zero(&self) -> bool {
        self.value() == 0.0
    }
}

impl One for Active {
    fn one() -> Self {
        Active::Plain(1.0)
    }
}

impl Real for Active {
    fn from_f64(value: f64) -> Self {
        Active::Plain(value)
    }

    fn value(&self) -> f64 {
        match self {
            Active::Plain(v) => *v,
            Active::Recorded(r) => r.value,
        }
    }

    fn sqrt(&self) -> Self {
        let s = self.value().sqrt();
        self.unary(s, 0.5 / s)
    }

    fn sin(&self) -> Self {
        let x = self.value();
        self.unary(x.sin(), x.cos())
    }

    fn cos(&self) -> Self {
        let x = self.value();
        self.unary(x.cos(), -x.sin())
    }

    fn atan2(&self, x: &Self) -> Self {
        let (yv, xv) = (self.value(), x.value());
        let r2 = xv * xv + yv * yv;
        self.binary(x, yv.atan2(xv), xv / r2, -yv / r2)
    }

    fn is_exact_zero(&self) -> bool {
        matches!(self, Active::Plain(v) if *v == 0.0)
    }
}
