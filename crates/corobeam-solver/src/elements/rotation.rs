//! Finite rotations in pseudo-vector form.
//!
//! A pseudo-vector `θ = φ n` (angle φ about unit axis n) maps to a rotation
//! matrix through the exponential (Rodrigues) map and back through the
//! logarithm. Both maps switch to their first-order expansion below
//! [`SMALL_ANGLE`] so that a zero rotation never takes the square root of zero.

use nalgebra::{Matrix3, Vector3};

use crate::scalar::{Real, skew, squared_norm3};

/// Angle below which the maps use their first-order forms.
pub const SMALL_ANGLE: f64 = 1e-12;

/// Rotation matrix of the pseudo-vector `theta` (Rodrigues formula).
///
/// `R = I + sin φ/φ [θ]× + (1 − cos φ)/φ² [θ]×²`
pub fn pseudo_to_rotation<T: Real>(theta: &Vector3<T>) -> Matrix3<T> {
    let k = skew(theta);
    let angle2 = squared_norm3(theta);
    if angle2.value() < SMALL_ANGLE * SMALL_ANGLE {
        return Matrix3::identity() + k;
    }
    let angle = angle2.sqrt();
    let a = angle.sin() / angle.clone();
    let b = (T::one() - angle.cos()) / angle2;
    let k2 = k.clone() * k.clone();
    Matrix3::identity() + k * a + k2 * b
}

/// Pseudo-vector of the rotation matrix `r` (logarithmic map).
///
/// Valid for rotation angles below π, which covers every incremental
/// rotation the solver produces.
pub fn rotation_to_pseudo<T: Real>(r: &Matrix3<T>) -> Vector3<T> {
    let half = T::from_f64(0.5);
    // vee of the skew-symmetric part: sin φ · n
    let v = Vector3::new(
        (r[(2, 1)].clone() - r[(1, 2)].clone()) * half.clone(),
        (r[(0, 2)].clone() - r[(2, 0)].clone()) * half.clone(),
        (r[(1, 0)].clone() - r[(0, 1)].clone()) * half.clone(),
    );
    let s2 = squared_norm3(&v);
    if s2.value() < SMALL_ANGLE * SMALL_ANGLE {
        return v;
    }
    let s = s2.sqrt();
    let c = (r[(0, 0)].clone() + r[(1, 1)].clone() + r[(2, 2)].clone() - T::one()) * half;
    let angle = s.atan2(&c);
    let factor = angle / s;
    Vector3::new(
        v[0].clone() * factor.clone(),
        v[1].clone() * factor.clone(),
        v[2].clone() * factor,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_pseudo_vector_is_identity() {
        let r = pseudo_to_rotation(&Vector3::<f64>::zeros());
        assert_eq!(r, Matrix3::identity());
        assert_eq!(rotation_to_pseudo(&r), Vector3::zeros());
    }

    #[test]
    fn quarter_turn_about_z() {
        let r = pseudo_to_rotation(&Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
        let x = r * Vector3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(x[0], 0.0, epsilon = 1e-15);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-15);
        assert_relative_eq!(x[2], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn exponential_is_orthonormal() {
        let r = pseudo_to_rotation(&Vector3::new(0.3, -1.1, 0.7));
        let rtr = r.transpose() * r;
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(rtr[(i, j)], expected, epsilon = 1e-14);
            }
        }
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn logarithm_inverts_exponential() {
        let theta = Vector3::new(0.2, 0.5, -0.9);
        let back = rotation_to_pseudo(&pseudo_to_rotation(&theta));
        for i in 0..3 {
            assert_relative_eq!(back[i], theta[i], epsilon = 1e-13);
        }
    }

    #[test]
    fn tiny_rotation_uses_first_order_map() {
        let theta = Vector3::new(1e-14, 0.0, -2e-14);
        let r = pseudo_to_rotation(&theta);
        assert_relative_eq!(r[(2, 1)], theta[0], epsilon = 1e-30);
        let back = rotation_to_pseudo(&r);
        assert_relative_eq!(back[2], theta[2], epsilon = 1e-28);
    }
}
