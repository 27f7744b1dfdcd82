//! Material properties for the beam model.
//!
//! A single isotropic linear elastic material applies to every element.
//! Its constants are generic so that they can be recorded as design
//! variables of an adjoint analysis.

use crate::scalar::Real;

/// Isotropic linear elastic material
#[derive(Debug, Clone, PartialEq)]
pub struct Material<T: Real> {
    /// Young's modulus (E) [Pa]
    pub young_modulus: T,
    /// Poisson's ratio (ν) [-]
    pub poisson_ratio: T,
    /// Density (ρ) [kg/m³]
    pub density: T,
}

impl<T: Real> Material<T> {
    pub fn new(young_modulus: T, poisson_ratio: T, density: T) -> Self {
        Self {
            young_modulus,
            poisson_ratio,
            density,
        }
    }

    /// Get the shear modulus (G) from E and ν
    pub fn shear_modulus(&self) -> T {
        self.young_modulus.clone()
            / (T::from_f64(2.0) * (T::one() + self.poisson_ratio.clone()))
    }

    /// Check the constants for structural analysis
    ///
    /// E must be positive, ν must lie in (-1, 0.5) and ρ must not be negative.
    pub fn validate(&self) -> Result<(), String> {
        let e = self.young_modulus.value();
        let nu = self.poisson_ratio.value();
        let rho = self.density.value();
        if !(e > 0.0 && e.is_finite()) {
            return Err(format!("Young's modulus must be positive, got {e}"));
        }
        if !(nu > -1.0 && nu < 0.5) {
            return Err(format!("Poisson's ratio must lie in (-1, 0.5), got {nu}"));
        }
        if !(rho >= 0.0 && rho.is_finite()) {
            return Err(format!("density must be non-negative, got {rho}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn shear_modulus_from_e_and_nu() {
        let steel = Material::new(210e9, 0.3, 7850.0);
        assert_relative_eq!(steel.shear_modulus(), 210e9 / 2.6, max_relative = 1e-14);
    }

    #[test]
    fn validation_rejects_non_physical_constants() {
        assert!(Material::new(210e9, 0.3, 7850.0).validate().is_ok());
        assert!(Material::new(-1.0, 0.3, 7850.0).validate().is_err());
        assert!(Material::new(210e9, 0.5, 7850.0).validate().is_err());
        assert!(Material::new(210e9, 0.3, -1.0).validate().is_err());
    }
}
