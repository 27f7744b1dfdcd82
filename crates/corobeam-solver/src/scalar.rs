//! Numeric abstraction shared by the plain and the recorded solver paths.
//!
//! Every numerically active quantity in the solver is built from a type
//! implementing [`Real`]. Plain analyses run on `f64`; adjoint analyses run on
//! [`Active`](crate::ad::Active), which records each operation on a tape.
//! The algorithms are written once against this trait.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use nalgebra::{Matrix3, Vector3};
use num_traits::{One, Zero};

/// Scalar type usable by the element, assembly and solver layers.
///
/// The arithmetic supertraits make nalgebra's generic matrix products,
/// sums and transposes available for `SMatrix<T, R, C>` and `DMatrix<T>`.
pub trait Real:
    Clone
    + Debug
    + PartialEq
    + 'static
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    /// Lift a passive constant.
    fn from_f64(value: f64) -> Self;

    /// Primal value, used for pivoting, norms and convergence decisions.
    fn value(&self) -> f64;

    fn sqrt(&self) -> Self;

    fn sin(&self) -> Self;

    fn cos(&self) -> Self;

    /// Four-quadrant arctangent of `self / x`.
    fn atan2(&self, x: &Self) -> Self;

    /// True when the value is zero and carries no derivative information.
    ///
    /// Elimination loops use this to skip work without dropping sensitivities.
    fn is_exact_zero(&self) -> bool;
}

impl Real for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn value(&self) -> f64 {
        *self
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn sin(&self) -> Self {
        f64::sin(*self)
    }

    fn cos(&self) -> Self {
        f64::cos(*self)
    }

    fn atan2(&self, x: &Self) -> Self {
        f64::atan2(*self, *x)
    }

    fn is_exact_zero(&self) -> bool {
        *self == 0.0
    }
}

/// Euclidean norm of a 3-vector.
pub fn norm3<T: Real>(v: &Vector3<T>) -> T {
    squared_norm3(v).sqrt()
}

pub fn squared_norm3<T: Real>(v: &Vector3<T>) -> T {
    v[0].clone() * v[0].clone() + v[1].clone() * v[1].clone() + v[2].clone() * v[2].clone()
}

/// Unit vector along `v`. Callers guarantee a non-zero input.
pub fn normalize3<T: Real>(v: &Vector3<T>) -> Vector3<T> {
    let n = norm3(v);
    Vector3::new(
        v[0].clone() / n.clone(),
        v[1].clone() / n.clone(),
        v[2].clone() / n,
    )
}

pub fn cross3<T: Real>(a: &Vector3<T>, b: &Vector3<T>) -> Vector3<T> {
    Vector3::new(
        a[1].clone() * b[2].clone() - a[2].clone() * b[1].clone(),
        a[2].clone() * b[0].clone() - a[0].clone() * b[2].clone(),
        a[0].clone() * b[1].clone() - a[1].clone() * b[0].clone(),
    )
}

/// Skew-symmetric matrix `[v]×` such that `[v]× w = v × w`.
pub fn skew<T: Real>(v: &Vector3<T>) -> Matrix3<T> {
    let z = T::zero();
    Matrix3::new(
        z.clone(),
        -v[2].clone(),
        v[1].clone(),
        v[2].clone(),
        z.clone(),
        -v[0].clone(),
        -v[1].clone(),
        v[0].clone(),
        z,
    )
}

/// Euclidean norm of the plain values.
pub fn plain_norm<'a, T: Real>(v: impl IntoIterator<Item = &'a T>) -> f64 {
    v.into_iter()
        .map(|x| {
            let x = x.value();
            x * x
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cross_matches_skew_product() {
        let a = Vector3::new(1.0, -2.0, 0.5);
        let b = Vector3::new(0.3, 4.0, -1.0);
        let c = cross3(&a, &b);
        let s = skew(&a) * b;
        for i in 0..3 {
            assert_relative_eq!(c[i], s[i], epsilon = 1e-14);
        }
    }

    #[test]
    fn normalize_gives_unit_vector() {
        let v = normalize3(&Vector3::new(3.0, 0.0, 4.0));
        assert_relative_eq!(norm3(&v), 1.0, epsilon = 1e-15);
        assert_relative_eq!(v[0], 0.6, epsilon = 1e-15);
    }

    #[test]
    fn plain_norm_of_slice() {
        let v = [3.0_f64, 4.0];
        assert_relative_eq!(plain_norm(v.iter()), 5.0);
    }
}
