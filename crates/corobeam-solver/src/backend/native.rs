//! Native dense backend.
//!
//! Gaussian elimination with partial pivoting written against [`Real`], so
//! the same code factors plain `f64` systems and recorded ones. Pivots are
//! chosen on primal values; entries that are exactly zero and carry no
//! derivative are skipped.

use nalgebra::{DMatrix, DVector};

use super::traits::*;
use crate::scalar::Real;

/// Native solver backend using dense LU decomposition.
///
/// Suitable for the small systems of framed structures (up to a few
/// thousand DOFs).
#[derive(Debug, Clone, Copy)]
pub struct NativeBackend {
    /// Pivots below this fraction of the largest entry are treated as zero
    pub pivot_tolerance: f64,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self {
            pivot_tolerance: 1e-14,
        }
    }
}

impl NativeBackend {
    pub fn new(pivot_tolerance: f64) -> Self {
        Self { pivot_tolerance }
    }
}

impl<T: Real> LinearSolver<T> for NativeBackend {
    fn solve_linear(&self, system: LinearSystemData<T>) -> Result<(DVector<T>, SolveInfo), BackendError> {
        let (u, min_pivot) = lu_solve(system.matrix, system.rhs, self.pivot_tolerance)?;
        Ok((
            u,
            SolveInfo {
                iterations: 1,
                min_relative_pivot: min_pivot,
                solver_name: "dense-LU".to_string(),
            },
        ))
    }

    fn name(&self) -> &str {
        "native-dense"
    }
}

/// Solve `a x = b` in place by LU decomposition with partial pivoting.
///
/// Returns the solution and the smallest pivot relative to the largest
/// matrix entry (`None` for an empty system).
pub fn lu_solve<T: Real>(
    mut a: DMatrix<T>,
    mut b: DVector<T>,
    pivot_tolerance: f64,
) -> Result<(DVector<T>, Option<f64>), BackendError> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(BackendError(format!(
            "dimension mismatch: matrix {}x{}, right-hand side {}",
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }
    if n == 0 {
        return Ok((b, None));
    }

    let scale = a.iter().map(|v| v.value().abs()).fold(0.0_f64, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return Err("Singular matrix in LU decomposition (no finite entries)".into());
    }

    let mut min_pivot = f64::INFINITY;
    for k in 0..n {
        // Partial pivoting on primal values
        let mut p = k;
        let mut p_abs = a[(k, k)].value().abs();
        for i in (k + 1)..n {
            let v = a[(i, k)].value().abs();
            if v > p_abs {
                p = i;
                p_abs = v;
            }
        }
        if p_abs <= pivot_tolerance * scale {
            return Err(BackendError(format!(
                "Singular matrix in LU decomposition (pivot {p_abs:.3e} in column {k})"
            )));
        }
        min_pivot = min_pivot.min(p_abs / scale);
        if p != k {
            a.swap_rows(k, p);
            b.swap_rows(k, p);
        }

        let pivot = a[(k, k)].clone();
        for i in (k + 1)..n {
            if a[(i, k)].is_exact_zero() {
                continue;
            }
            let factor = a[(i, k)].clone() / pivot.clone();
            a[(i, k)] = T::zero();
            for j in (k + 1)..n {
                if a[(k, j)].is_exact_zero() {
                    continue;
                }
                let update = factor.clone() * a[(k, j)].clone();
                a[(i, j)] -= update;
            }
            if !b[k].is_exact_zero() {
                let update = factor * b[k].clone();
                b[i] -= update;
            }
        }
    }

    // Back substitution
    let mut x = DVector::<T>::zeros(n);
    for i in (0..n).rev() {
        let mut s = b[i].clone();
        for j in (i + 1)..n {
            if a[(i, j)].is_exact_zero() || x[j].is_exact_zero() {
                continue;
            }
            s -= a[(i, j)].clone() * x[j].clone();
        }
        x[i] = s / a[(i, i)].clone();
    }

    Ok((x, Some(min_pivot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad::Tape;
    use approx::assert_relative_eq;

    #[test]
    fn native_linear_solve_trivial() {
        // Solve: [2 0; 0 3] * [x; y] = [4; 9]
        // Solution: x=2, y=3
        let backend = NativeBackend::default();
        let system = LinearSystemData {
            matrix: DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 3.0]),
            rhs: DVector::from_vec(vec![4.0, 9.0]),
        };

        let (u, info) = backend.solve_linear(system).unwrap();
        assert!((u[0] - 2.0).abs() < 1e-12);
        assert!((u[1] - 3.0).abs() < 1e-12);
        assert_eq!(info.solver_name, "dense-LU");
    }

    #[test]
    fn native_linear_solve_needs_pivoting() {
        // Zero on the leading diagonal, non-symmetric
        let k = DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 3.0, -1.0, 4.0]);
        let f = DVector::from_vec(vec![1.0, 2.0, 1.0]);
        let (u, _) = lu_solve(k.clone(), f.clone(), 1e-14).unwrap();

        let f_check = &k * &u;
        for i in 0..3 {
            assert!(
                (f_check[i] - f[i]).abs() < 1e-12,
                "Residual too large at DOF {}",
                i
            );
        }
    }

    #[test]
    fn singular_matrix_is_reported() {
        let k = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let f = DVector::from_vec(vec![1.0, 1.0]);
        assert!(lu_solve(k, f, 1e-14).is_err());

        let zero = DMatrix::<f64>::zeros(2, 2);
        assert!(lu_solve(zero, DVector::zeros(2), 1e-14).is_err());
    }

    #[test]
    fn backend_errors_are_std_errors() {
        let k = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let err = lu_solve(k, DVector::from_vec(vec![1.0, 1.0]), 1e-14).unwrap_err();
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.to_string().starts_with("Singular matrix in LU decomposition (pivot"));

        let err = lu_solve(DMatrix::<f64>::zeros(2, 3), DVector::zeros(2), 1e-14).unwrap_err();
        assert_eq!(err.to_string(), "dimension mismatch: matrix 2x3, right-hand side 2");
    }

    #[test]
    fn solve_differentiates_through_matrix_and_rhs() {
        // x = k⁻¹ f with k = [[a, 1], [1, 2]], f = [1, b]
        let tape = Tape::new();
        tape.start_recording().unwrap();
        let a = tape.register(3.0).unwrap();
        let b = tape.register(0.5).unwrap();
        let one = crate::ad::Active::from(1.0);
        let k = DMatrix::from_row_slice(2, 2, &[a.clone(), one.clone(), one.clone(), crate::ad::Active::from(2.0)]);
        let f = DVector::from_vec(vec![one, b.clone()]);
        let (x, _) = lu_solve(k, f, 1e-14).unwrap();
        tape.stop_recording().unwrap();
        tape.seed(&x[0], 1.0).unwrap();
        tape.evaluate().unwrap();

        // x0 = (2 - b) / (2a - 1)
        let (av, bv) = (3.0_f64, 0.5_f64);
        let det = 2.0 * av - 1.0;
        assert_relative_eq!(x[0].value(), (2.0 - bv) / det, epsilon = 1e-14);
        assert_relative_eq!(tape.gradient(&a).unwrap(), -2.0 * (2.0 - bv) / (det * det), epsilon = 1e-13);
        assert_relative_eq!(tape.gradient(&b).unwrap(), -1.0 / det, epsilon = 1e-13);
    }
}
