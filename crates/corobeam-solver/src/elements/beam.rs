/// Corotational 2-node beam element for large displacements and rotations.
///
/// The element keeps a constant Euler-Bernoulli stiffness in its local frame
/// and tracks the rigid rotation of that frame separately:
/// - the local frame (triad e1, e2, e3) follows the chord and the mean
///   rotation of the end triads,
/// - the elastic deformation (elongation, twist, end rotations relative to
///   the chord) is accumulated in the local frame,
/// - forces and stiffness are rotated to the global frame for assembly.
///
/// Each node has 6 degrees of freedom:
/// - 3 translations (ux, uy, uz)
/// - 3 rotations (θx, θy, θz)
///
/// References:
/// - S.S. Rao, "The Finite Element Method in Engineering" (mass matrix)
/// - Crisfield, "Non-linear Finite Element Analysis of Solids and Structures", vol. 2

use nalgebra::{DMatrix, DVector, Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::elements::rotation::{pseudo_to_rotation, rotation_to_pseudo};
use crate::elements::{Element, SectionProperties};
use crate::materials::Material;
use crate::scalar::{Real, cross3, norm3, normalize3, skew};

/// Beam cross-section description
///
/// Explicit sections carry their constants directly; thin-walled box
/// sections derive them from the model wall thickness, which makes the
/// thickness a design variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BeamSection {
    /// Section constants given directly
    Explicit {
        /// Cross-sectional area
        area: f64,
        /// Second moment of area about local y-axis (Iyy)
        iyy: f64,
        /// Second moment of area about local z-axis (Izz)
        izz: f64,
        /// Torsional constant (J)
        torsion_constant: f64,
    },
    /// Thin-walled rectangular box, centerline dimensions
    ThinWalledBox {
        /// Width along the local y-axis
        width: f64,
        /// Height along the local z-axis
        height: f64,
    },
}

impl BeamSection {
    /// Create a circular beam section
    ///
    /// # Example
    /// ```
    /// use corobeam_solver::BeamSection;
    ///
    /// let section = BeamSection::circular(0.05);
    /// let props = section.properties(&0.0_f64);
    /// assert!((props.area - std::f64::consts::PI * 0.05_f64.powi(2)).abs() < 1e-12);
    /// ```
    pub fn circular(radius: f64) -> Self {
        let area = std::f64::consts::PI * radius.powi(2);
        let i = std::f64::consts::PI * radius.powi(4) / 4.0;
        let j = std::f64::consts::PI * radius.powi(4) / 2.0;
        Self::custom(area, i, i, j)
    }

    /// Create a solid rectangular section
    ///
    /// `width` runs along the local y-axis, `height` along the local z-axis.
    pub fn rectangular(width: f64, height: f64) -> Self {
        let area = width * height;
        let iyy = width * height.powi(3) / 12.0;
        let izz = height * width.powi(3) / 12.0;

        // Torsional constant for rectangle (approximate formula)
        let a = width.max(height);
        let b = width.min(height);
        let j = (a * b.powi(3)) * (1.0 / 3.0 - 0.21 * (b / a) * (1.0 - b.powi(4) / (12.0 * a.powi(4))));

        Self::custom(area, iyy, izz, j)
    }

    /// Create a custom beam section with explicit properties
    pub fn custom(area: f64, iyy: f64, izz: f64, j: f64) -> Self {
        Self::Explicit {
            area,
            iyy,
            izz,
            torsion_constant: j,
        }
    }

    /// Create a thin-walled box section sized by the model wall thickness
    pub fn thin_walled_box(width: f64, height: f64) -> Self {
        Self::ThinWalledBox { width, height }
    }

    /// True when the section constants depend on the wall thickness
    pub fn uses_thickness(&self) -> bool {
        matches!(self, Self::ThinWalledBox { .. })
    }

    /// Evaluate the section constants
    ///
    /// For a box of centerline width b, height h and wall thickness t:
    /// - A = 2t(b + h)
    /// - Iyy = t h³/6 + t b h²/2
    /// - Izz = t b³/6 + t h b²/2
    /// - J = 2 t b² h² / (b + h)  (Bredt)
    pub fn properties<T: Real>(&self, wall_thickness: &T) -> SectionProperties<T> {
        match *self {
            Self::Explicit {
                area,
                iyy,
                izz,
                torsion_constant,
            } => SectionProperties::beam(
                T::from_f64(area),
                T::from_f64(iyy),
                T::from_f64(izz),
                T::from_f64(torsion_constant),
            ),
            Self::ThinWalledBox { width, height } => {
                let t = wall_thickness.clone();
                let (b, h) = (T::from_f64(width), T::from_f64(height));
                let area = T::from_f64(2.0 * (width + height)) * t.clone();
                let iyy = t.clone() * T::from_f64(height.powi(3) / 6.0 + width * height.powi(2) / 2.0);
                let izz = t.clone() * T::from_f64(width.powi(3) / 6.0 + height * width.powi(2) / 2.0);
                let j = t * T::from_f64(2.0) * b.clone() * b * h.clone() * h / T::from_f64(width + height);
                SectionProperties::beam(area, iyy, izz, j)
            }
        }
    }

    /// Check the section for non-physical values
    pub fn validate(&self) -> Result<(), String> {
        let positive = |name: &str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(format!("section {name} must be positive, got {v}"))
            }
        };
        match *self {
            Self::Explicit {
                area,
                iyy,
                izz,
                torsion_constant,
            } => {
                positive("area", area)?;
                positive("Iyy", iyy)?;
                positive("Izz", izz)?;
                positive("torsion constant", torsion_constant)
            }
            Self::ThinWalledBox { width, height } => {
                positive("width", width)?;
                positive("height", height)
            }
        }
    }
}

/// Constant stiffness and inertia data of one element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementConstants<T: Real> {
    /// Undeformed length
    pub length: T,
    pub area: T,
    /// Axial stiffness EA
    pub ae: T,
    /// Torsional stiffness GJ
    pub gj: T,
    /// Bending stiffness about local y
    pub eiy: T,
    /// Bending stiffness about local z
    pub eiz: T,
    /// Mass per unit length ρA
    pub mass_per_length: T,
    /// Polar moment Jx = Iyy + Izz
    pub polar_moment: T,
}

impl<T: Real> ElementConstants<T> {
    pub fn new(section: &SectionProperties<T>, material: &Material<T>, length: T) -> Self {
        let e = material.young_modulus.clone();
        Self {
            length,
            area: section.area.clone(),
            ae: e.clone() * section.area.clone(),
            gj: material.shear_modulus() * section.torsion_constant.clone(),
            eiy: e.clone() * section.iyy.clone(),
            eiz: e * section.izz.clone(),
            mass_per_length: material.density.clone() * section.area.clone(),
            polar_moment: section.iyy.clone() + section.izz.clone(),
        }
    }
}

/// Corotational Euler-Bernoulli beam element
#[derive(Debug, Clone)]
pub struct BeamElement<T: Real> {
    pub id: usize,
    /// Indices of the end nodes A and B in the structure arena
    pub nodes: [usize; 2],
    constants: ElementConstants<T>,
    /// Local material stiffness, fixed at construction
    kprim: SMatrix<T, 6, 6>,
    l_act: T,
    l_prev: T,
    /// Local-to-global rotation, two copies of the triad
    r: SMatrix<T, 6, 6>,
    r_prev: SMatrix<T, 6, 6>,
    r_initial: SMatrix<T, 6, 6>,
    /// Incremental rigid rotation R_prevᵀ R
    r_rig: SMatrix<T, 6, 6>,
    /// Cumulative elastic deformation
    deformation: SVector<T, 6>,
    /// Cumulative elastic tension
    tension: SVector<T, 6>,
    /// Local internal force vector
    fint: SVector<T, 12>,
}

impl<T: Real> BeamElement<T> {
    /// Create a new element in its undeformed state
    ///
    /// The initial triad has e1 along the chord A→B and e2 in the plane of e1
    /// and `aux`. Model validation guarantees a non-degenerate chord and an
    /// auxiliary vector that is not parallel to it.
    pub fn new(
        id: usize,
        nodes: [usize; 2],
        constants: ElementConstants<T>,
        x_a: &Vector3<T>,
        x_b: &Vector3<T>,
        aux: &Vector3<T>,
    ) -> Self {
        let l = constants.length.clone();
        let mut kprim = SMatrix::<T, 6, 6>::zeros();
        kprim[(0, 0)] = constants.ae.clone() / l.clone();
        kprim[(1, 1)] = constants.gj.clone() / l.clone();
        kprim[(2, 2)] = T::from_f64(4.0) * constants.eiy.clone() / l.clone();
        kprim[(3, 3)] = T::from_f64(4.0) * constants.eiz.clone() / l.clone();
        kprim[(4, 4)] = T::from_f64(4.0) * constants.eiy.clone() / l.clone();
        kprim[(5, 5)] = T::from_f64(4.0) * constants.eiz.clone() / l.clone();
        kprim[(2, 4)] = T::from_f64(2.0) * constants.eiy.clone() / l.clone();
        kprim[(4, 2)] = kprim[(2, 4)].clone();
        kprim[(3, 5)] = T::from_f64(2.0) * constants.eiz.clone() / l.clone();
        kprim[(5, 3)] = kprim[(3, 5)].clone();

        let e1 = normalize3(&(x_b - x_a));
        let e3 = normalize3(&cross3(&e1, aux));
        let e2 = cross3(&e3, &e1);
        let r = block_rotation(&e1, &e2, &e3);

        Self {
            id,
            nodes,
            l_act: l.clone(),
            l_prev: l,
            constants,
            kprim,
            r_prev: r.clone(),
            r_initial: r.clone(),
            r,
            r_rig: SMatrix::identity(),
            deformation: SVector::zeros(),
            tension: SVector::zeros(),
            fint: SVector::zeros(),
        }
    }

    pub fn constants(&self) -> &ElementConstants<T> {
        &self.constants
    }

    /// Local 6×6 material stiffness
    pub fn local_stiffness(&self) -> &SMatrix<T, 6, 6> {
        &self.kprim
    }

    /// Current (deformed) length
    pub fn length(&self) -> &T {
        &self.l_act
    }

    pub fn previous_length(&self) -> &T {
        &self.l_prev
    }

    /// Current 6×6 block rotation
    pub fn rotation(&self) -> &SMatrix<T, 6, 6> {
        &self.r
    }

    pub fn previous_rotation(&self) -> &SMatrix<T, 6, 6> {
        &self.r_prev
    }

    /// Incremental rigid rotation of the last update
    pub fn rigid_rotation(&self) -> &SMatrix<T, 6, 6> {
        &self.r_rig
    }

    /// Current triad; columns are e1, e2, e3 in global coordinates
    pub fn triad(&self) -> Matrix3<T> {
        self.r.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn deformation(&self) -> &SVector<T, 6> {
        &self.deformation
    }

    pub fn tension(&self) -> &SVector<T, 6> {
        &self.tension
    }

    /// Internal force vector in the local frame
    pub fn internal_force(&self) -> &SVector<T, 12> {
        &self.fint
    }

    /// Consistent mass matrix in the local frame (Rao)
    ///
    /// Only the upper triangle is filled explicitly, then mirrored.
    pub fn mass_matrix(&self) -> SMatrix<T, 12, 12> {
        let le = self.constants.length.clone();
        let le2 = le.clone() * le.clone();
        let r = self.constants.polar_moment.clone() / self.constants.area.clone();
        let c = T::from_f64;

        let mut m = SMatrix::<T, 12, 12>::zeros();
        let diagonal = [
            c(1.0 / 3.0),
            c(13.0 / 35.0),
            c(13.0 / 35.0),
            r.clone() / c(3.0),
            le2.clone() / c(105.0),
            le2.clone() / c(105.0),
        ];
        for (i, d) in diagonal.iter().enumerate() {
            m[(i, i)] = d.clone();
            m[(i + 6, i + 6)] = d.clone();
        }

        m[(0, 6)] = c(1.0 / 6.0);
        m[(1, 5)] = c(11.0 / 210.0) * le.clone();
        m[(1, 7)] = c(9.0 / 70.0);
        m[(1, 11)] = c(-13.0 / 420.0) * le.clone();
        m[(2, 4)] = c(-11.0 / 210.0) * le.clone();
        m[(2, 8)] = c(9.0 / 70.0);
        m[(2, 10)] = c(13.0 / 420.0) * le.clone();
        m[(3, 9)] = r / c(6.0);
        m[(4, 8)] = c(-13.0 / 420.0) * le.clone();
        m[(4, 10)] = -le2.clone() / c(140.0);
        m[(5, 7)] = c(13.0 / 420.0) * le.clone();
        m[(5, 11)] = -le2 / c(140.0);
        m[(7, 11)] = c(-11.0 / 210.0) * le.clone();
        m[(8, 10)] = c(11.0 / 210.0) * le.clone();

        for i in 0..12 {
            for j in (i + 1)..12 {
                m[(j, i)] = m[(i, j)].clone();
            }
        }

        let element_mass = self.constants.mass_per_length.clone() * le;
        m * element_mass
    }

    /// Kinematic operators Na, Nb at the current length
    ///
    /// `[Na Nb]` maps the 12 local nodal displacements to the 6 deformation
    /// measures (elongation, twist, and the four end rotations relative to
    /// the chord).
    pub fn kinematic_operators(&self) -> (SMatrix<T, 6, 6>, SMatrix<T, 6, 6>) {
        let one = T::one();
        let inv_l = one.clone() / self.l_act.clone();
        let mut na = SMatrix::<T, 6, 6>::zeros();
        let mut nb = SMatrix::<T, 6, 6>::zeros();

        na[(0, 0)] = -one.clone();
        na[(1, 3)] = -one.clone();
        na[(2, 2)] = -inv_l.clone();
        na[(3, 1)] = inv_l.clone();
        na[(4, 2)] = -inv_l.clone();
        na[(4, 4)] = one.clone();
        na[(5, 1)] = inv_l.clone();
        na[(5, 5)] = one.clone();

        nb[(0, 0)] = one.clone();
        nb[(1, 3)] = one.clone();
        nb[(2, 2)] = inv_l.clone();
        nb[(2, 4)] = one.clone();
        nb[(3, 1)] = -inv_l.clone();
        nb[(3, 5)] = one;
        nb[(4, 2)] = inv_l.clone();
        nb[(5, 1)] = -inv_l;

        (na, nb)
    }

    /// Local elastic stiffness `[Na Nb]ᵀ K [Na Nb]`
    pub fn elastic_stiffness(&self) -> SMatrix<T, 12, 12> {
        let (na, nb) = self.kinematic_operators();
        let nat = na.transpose();
        let nbt = nb.transpose();
        let k = &self.kprim;

        let mut kel = SMatrix::<T, 12, 12>::zeros();
        kel.fixed_view_mut::<6, 6>(0, 0)
            .copy_from(&(nat.clone() * k.clone() * na.clone()));
        kel.fixed_view_mut::<6, 6>(0, 6)
            .copy_from(&(nat * k.clone() * nb.clone()));
        kel.fixed_view_mut::<6, 6>(6, 0)
            .copy_from(&(nbt.clone() * k.clone() * na));
        kel.fixed_view_mut::<6, 6>(6, 6)
            .copy_from(&(nbt * k.clone() * nb));
        kel
    }

    /// Local tangent stiffness: elastic part plus the stretch correction
    ///
    /// The shear rows of the internal force scale with 1/l, so
    /// `∂f/∂l = −f/l` on those rows, and `∂l/∂u` is −1/+1 on the axial DOFs.
    pub fn tangent_stiffness(&self) -> SMatrix<T, 12, 12> {
        let mut ktang = self.elastic_stiffness();
        let inv_l = T::one() / self.l_act.clone();
        for i in [1, 2, 7, 8] {
            let df_dl = -(inv_l.clone() * self.fint[i].clone());
            if df_dl.is_exact_zero() {
                continue;
            }
            ktang[(i, 0)] -= df_dl.clone();
            ktang[(i, 6)] += df_dl;
        }
        ktang
    }

    /// Local geometric stiffness of the corotated frame
    ///
    /// The internal forces are carried by the triad, which spins by
    /// `ω = G δu` in local coordinates: the mean twist of both ends about e1
    /// and the chord rotations about e2 and e3. Turning each 3-block `f_b`
    /// with the triad gives the rows `−skew(f_b) G`.
    pub fn geometric_stiffness(&self) -> SMatrix<T, 12, 12> {
        let mut kgeo = SMatrix::<T, 12, 12>::zeros();
        if self.fint.iter().all(Real::is_exact_zero) {
            return kgeo;
        }
        let half = T::from_f64(0.5);
        let inv_l = T::one() / self.l_act.clone();
        let mut g = SMatrix::<T, 3, 12>::zeros();
        g[(0, 3)] = half.clone();
        g[(0, 9)] = half;
        g[(1, 2)] = inv_l.clone();
        g[(1, 8)] = -inv_l.clone();
        g[(2, 1)] = -inv_l.clone();
        g[(2, 7)] = inv_l;

        for b in 0..4 {
            let f_b = segment3(&self.fint, 3 * b).map(|v| -v);
            kgeo.fixed_view_mut::<3, 12>(3 * b, 0)
                .copy_from(&(skew(&f_b) * g.clone()));
        }
        kgeo
    }

    /// Corotational frame update
    ///
    /// `du` holds the incremental displacements of both ends (6 + 6) and
    /// `x_ab` the updated end coordinates (3 + 3).
    pub fn update_rotation(&mut self, du: &SVector<T, 12>, x_ab: &SVector<T, 6>) {
        let x_a = Vector3::new(x_ab[0].clone(), x_ab[1].clone(), x_ab[2].clone());
        let x_b = Vector3::new(x_ab[3].clone(), x_ab[4].clone(), x_ab[5].clone());
        let chord = x_b - x_a;
        let e1 = normalize3(&chord);

        let e2_old: Vector3<T> = self.r.fixed_view::<3, 1>(0, 1).into_owned();
        let rot_a = pseudo_to_rotation(&segment3(du, 3));
        let rot_b = pseudo_to_rotation(&segment3(du, 9));
        let pa = rot_a * e2_old.clone();
        let pb = rot_b * e2_old;
        let p = (pa + pb) * T::from_f64(0.5);

        let e3 = normalize3(&cross3(&e1, &p));
        let e2 = cross3(&e3, &e1);

        self.r_prev = self.r.clone();
        self.r = block_rotation(&e1, &e2, &e3);
        self.r_rig = self.r_prev.transpose() * self.r.clone();

        self.l_prev = self.l_act.clone();
        self.l_act = norm3(&chord);
    }

    /// Accumulate the elastic deformation of the last increment and
    /// recompute the internal forces
    ///
    /// Must follow [`update_rotation`](Self::update_rotation) for the same
    /// increment.
    pub fn update_deformation(&mut self, du: &SVector<T, 12>) {
        let triad = self.triad();
        let triad_prev: Matrix3<T> = self.r_prev.fixed_view::<3, 3>(0, 0).into_owned();
        let triad_t = triad.transpose();

        let rot_a = pseudo_to_rotation(&segment3(du, 3));
        let rot_b = pseudo_to_rotation(&segment3(du, 9));
        let theta_a = rotation_to_pseudo(&(triad_t.clone() * rot_a * triad_prev.clone()));
        let theta_b = rotation_to_pseudo(&(triad_t * rot_b * triad_prev));

        let increment = SVector::<T, 6>::from_column_slice(&[
            self.l_act.clone() - self.l_prev.clone(),
            theta_b[0].clone() - theta_a[0].clone(),
            theta_b[1].clone(),
            theta_b[2].clone(),
            theta_a[1].clone(),
            theta_a[2].clone(),
        ]);
        self.deformation += increment;
        self.tension = self.kprim.clone() * self.deformation.clone();

        let (na, nb) = self.kinematic_operators();
        let fa = na.transpose() * self.tension.clone();
        let fb = nb.transpose() * self.tension.clone();
        self.fint.fixed_view_mut::<6, 1>(0, 0).copy_from(&fa);
        self.fint.fixed_view_mut::<6, 1>(6, 0).copy_from(&fb);
    }

    /// Full corotational update for one increment
    pub fn update(&mut self, du: &SVector<T, 12>, x_ab: &SVector<T, 6>) {
        self.update_rotation(du, x_ab);
        self.update_deformation(du);
    }

    /// Return to the undeformed state
    pub fn reset(&mut self) {
        self.l_act = self.constants.length.clone();
        self.l_prev = self.constants.length.clone();
        self.r = self.r_initial.clone();
        self.r_prev = self.r_initial.clone();
        self.r_rig = SMatrix::identity();
        self.deformation = SVector::zeros();
        self.tension = SVector::zeros();
        self.fint = SVector::zeros();
    }

    /// Rotate a local 12×12 matrix to the global frame block by block
    fn rotate_matrix(&self, local: &SMatrix<T, 12, 12>) -> SMatrix<T, 12, 12> {
        let triad = self.triad();
        let triad_t = triad.transpose();
        let mut global = SMatrix::<T, 12, 12>::zeros();
        for bi in 0..4 {
            for bj in 0..4 {
                let block = local.fixed_view::<3, 3>(3 * bi, 3 * bj);
                if block.iter().all(|v| v.is_exact_zero()) {
                    continue;
                }
                let rotated = triad.clone() * block * triad_t.clone();
                global
                    .fixed_view_mut::<3, 3>(3 * bi, 3 * bj)
                    .copy_from(&rotated);
            }
        }
        global
    }

    /// Consistent tangent in the global frame, geometric part included
    pub fn global_tangent(&self) -> SMatrix<T, 12, 12> {
        self.rotate_matrix(&(self.tangent_stiffness() + self.geometric_stiffness()))
    }

    /// Mass matrix in the global frame
    pub fn global_mass(&self) -> SMatrix<T, 12, 12> {
        self.rotate_matrix(&self.mass_matrix())
    }

    /// Internal force vector in the global frame
    pub fn global_internal_force(&self) -> SVector<T, 12> {
        let triad = self.triad();
        let mut global = SVector::<T, 12>::zeros();
        for b in 0..4 {
            let rotated = triad.clone() * self.fint.fixed_view::<3, 1>(3 * b, 0);
            global.fixed_view_mut::<3, 1>(3 * b, 0).copy_from(&rotated);
        }
        global
    }
}

impl<T: Real> Element<T> for BeamElement<T> {
    fn node_indices(&self) -> &[usize] {
        &self.nodes
    }

    fn dofs_per_node(&self) -> usize {
        6 // 3 translations + 3 rotations
    }

    fn tangent_matrix(&self) -> DMatrix<T> {
        let k = self.global_tangent();
        DMatrix::from_iterator(12, 12, k.iter().cloned())
    }

    fn mass_matrix(&self) -> DMatrix<T> {
        let m = self.global_mass();
        DMatrix::from_iterator(12, 12, m.iter().cloned())
    }

    fn internal_force(&self) -> DVector<T> {
        let f = self.global_internal_force();
        DVector::from_iterator(12, f.iter().cloned())
    }
}

fn segment3<T: Real>(v: &SVector<T, 12>, start: usize) -> Vector3<T> {
    Vector3::new(
        v[start].clone(),
        v[start + 1].clone(),
        v[start + 2].clone(),
    )
}

/// Block-diagonal 6×6 rotation with the triad as columns in both blocks
fn block_rotation<T: Real>(e1: &Vector3<T>, e2: &Vector3<T>, e3: &Vector3<T>) -> SMatrix<T, 6, 6> {
    let mut r = SMatrix::<T, 6, 6>::zeros();
    for (col, e) in [e1, e2, e3].into_iter().enumerate() {
        for row in 0..3 {
            r[(row, col)] = e[row].clone();
            r[(row + 3, col + 3)] = e[row].clone();
        }
    }
    r
}
