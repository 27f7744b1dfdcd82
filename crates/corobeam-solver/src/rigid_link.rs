//! RBE2 rigid links and the condensation of dependent DOFs.
//!
//! The full DOF vector is expressed through the independent (reduced) DOFs
//! as `u = T u_red`:
//! - a free DOF maps to itself,
//! - a constrained DOF maps to zero,
//! - a coupled slave rotation maps to the master rotation,
//! - a coupled slave translation maps to `u_m + θ_m × r` with
//!   `r = x_slave − x_master` in the current configuration.
//!
//! The reduced system is `K_red = Tᵀ K T`, `r_red = Tᵀ r`. Because `r` turns
//! with the master, fully coupled slaves add a geometric term to the master
//! rotation block of `K_red` (see [`Condensation::reduce_tangent`]).

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::boundary_conditions::{DOFS_PER_NODE, DofId};
use crate::scalar::Real;

/// Rigid link between a master and a slave node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigidLink {
    pub master: usize,
    pub slave: usize,
    /// Coupled DOFs (1-based, sorted, unique)
    pub dofs: Vec<usize>,
}

impl RigidLink {
    /// Link coupling the given DOFs (1-based)
    pub fn new(master: usize, slave: usize, dofs: impl IntoIterator<Item = usize>) -> Self {
        let dofs: BTreeSet<usize> = dofs.into_iter().collect();
        Self {
            master,
            slave,
            dofs: dofs.into_iter().collect(),
        }
    }

    /// Link coupling all six DOFs
    pub fn full(master: usize, slave: usize) -> Self {
        Self::new(master, slave, 1..=DOFS_PER_NODE)
    }

    /// True when all six DOFs are coupled
    pub fn is_full(&self) -> bool {
        self.dofs.len() == DOFS_PER_NODE
    }

    /// Whether the 0-based DOF `dof` of the slave is coupled
    pub fn couples(&self, dof: usize) -> bool {
        self.dofs.contains(&(dof + 1))
    }
}

/// Check rigid links against the model topology
pub fn validate_links(
    links: &[RigidLink],
    num_nodes: usize,
    constrained: &BTreeSet<DofId>,
) -> Result<(), String> {
    let masters: BTreeSet<usize> = links.iter().map(|l| l.master).collect();
    let mut slaves = BTreeSet::new();

    for (i, link) in links.iter().enumerate() {
        if link.master >= num_nodes || link.slave >= num_nodes {
            return Err(format!(
                "rigid link {i} references unknown node ({} -> {})",
                link.master, link.slave
            ));
        }
        if link.master == link.slave {
            return Err(format!("rigid link {i} has identical master and slave node {}", link.master));
        }
        if link.dofs.is_empty() {
            return Err(format!("rigid link {i} couples no DOFs"));
        }
        if let Some(&bad) = link.dofs.iter().find(|&&d| d == 0 || d > DOFS_PER_NODE) {
            return Err(format!("rigid link {i} has DOF {bad} out of range 1..=6"));
        }
        if masters.contains(&link.slave) {
            return Err(format!("node {} is both a slave and a master", link.slave));
        }
        if !slaves.insert(link.slave) {
            return Err(format!("node {} is slave of more than one rigid link", link.slave));
        }
        if let Some(dof) = link
            .dofs
            .iter()
            .find(|&&d| constrained.contains(&DofId::new(link.slave, d - 1)))
        {
            return Err(format!(
                "slave node {} has constrained DOF {dof} coupled by rigid link {i}",
                link.slave
            ));
        }
    }
    Ok(())
}

/// Sparse row of T: `(reduced index, coefficient)`, `None` standing for 1
type Row<T> = Vec<(usize, Option<T>)>;

/// Condensation operator `T` for the current configuration
#[derive(Debug, Clone)]
pub struct Condensation<T: Real> {
    rows: Vec<Row<T>>,
    /// Full index of each reduced DOF
    independent: Vec<usize>,
    /// `(master, slave, r)` of every fully coupled link
    offsets: Vec<(usize, usize, Vector3<T>)>,
}

impl<T: Real> Condensation<T> {
    /// Build the operator from constraints, links and current coordinates
    pub fn new(constrained: &[bool], links: &[RigidLink], coordinates: &[Vector3<T>]) -> Self {
        let n_full = constrained.len();
        let mut dependent: BTreeMap<usize, &RigidLink> = BTreeMap::new();
        for link in links {
            for d in 0..DOFS_PER_NODE {
                if link.couples(d) {
                    dependent.insert(link.slave * DOFS_PER_NODE + d, link);
                }
            }
        }

        let mut rows: Vec<Row<T>> = vec![Vec::new(); n_full];
        let mut independent = Vec::new();
        for i in 0..n_full {
            if constrained[i] || dependent.contains_key(&i) {
                continue;
            }
            rows[i].push((independent.len(), None));
            independent.push(i);
        }

        let offsets = links
            .iter()
            .filter(|link| link.is_full())
            .map(|link| {
                let r = coordinates[link.slave].clone() - coordinates[link.master].clone();
                (link.master, link.slave, r)
            })
            .collect();

        // Masters are never slaves, so their rows are final at this point
        for (&i, link) in &dependent {
            let d = i % DOFS_PER_NODE;
            let master = link.master * DOFS_PER_NODE;
            let mut row: Row<T> = rows[master + d].clone();
            if d < 3 {
                // translation: u_s = u_m + θ_m × r
                let r = coordinates[link.slave].clone() - coordinates[link.master].clone();
                // (θ × r)_d = θ_a r_b − θ_b r_a with (d, a, b) cyclic
                let a = (d + 1) % 3;
                let b = (d + 2) % 3;
                for (theta, coeff) in [(a, r[b].clone()), (b, -r[a].clone())] {
                    if coeff.is_exact_zero() {
                        continue;
                    }
                    for (col, c) in &rows[master + 3 + theta] {
                        let value = match c {
                            Some(c) => c.clone() * coeff.clone(),
                            None => coeff.clone(),
                        };
                        row.push((*col, Some(value)));
                    }
                }
            }
            rows[i] = row;
        }

        Self {
            rows,
            independent,
            offsets,
        }
    }

    pub fn num_full(&self) -> usize {
        self.rows.len()
    }

    pub fn num_reduced(&self) -> usize {
        self.independent.len()
    }

    /// Full index of each reduced DOF
    pub fn independent_dofs(&self) -> &[usize] {
        &self.independent
    }

    /// `Tᵀ K T`
    pub fn reduce_matrix(&self, k: &DMatrix<T>) -> DMatrix<T> {
        let n = self.num_full();
        let m = self.num_reduced();

        // KT = K T, accumulated column by column of T
        let mut kt = DMatrix::<T>::zeros(n, m);
        for (j, row) in self.rows.iter().enumerate() {
            for (col, coeff) in row {
                for i in 0..n {
                    let kij = &k[(i, j)];
                    if kij.is_exact_zero() {
                        continue;
                    }
                    let value = scale(kij, coeff);
                    kt[(i, *col)] += value;
                }
            }
        }

        let mut reduced = DMatrix::<T>::zeros(m, m);
        for (i, row) in self.rows.iter().enumerate() {
            for (r, coeff) in row {
                for c in 0..m {
                    let v = &kt[(i, c)];
                    if v.is_exact_zero() {
                        continue;
                    }
                    let value = scale(v, coeff);
                    reduced[(*r, c)] += value;
                }
            }
        }
        reduced
    }

    /// `Tᵀ K T` plus the rotation of the link offsets
    ///
    /// `residual` is the full out-of-balance force. Its translational part `f`
    /// at a fully coupled slave acts on the master rotations as `r × f`, and
    /// `δ(r × f) = (r fᵀ − (f·r) I) δθ_m` because `δr = δθ_m × r`.
    pub fn reduce_tangent(&self, k: &DMatrix<T>, residual: &DVector<T>) -> DMatrix<T> {
        let mut reduced = self.reduce_matrix(k);
        for (master, slave, r) in &self.offsets {
            let base = slave * DOFS_PER_NODE;
            let f = Vector3::new(
                residual[base].clone(),
                residual[base + 1].clone(),
                residual[base + 2].clone(),
            );
            if f.iter().all(Real::is_exact_zero) {
                continue;
            }
            let f_dot_r = f[0].clone() * r[0].clone()
                + f[1].clone() * r[1].clone()
                + f[2].clone() * r[2].clone();
            let theta = master * DOFS_PER_NODE + 3;
            for a in 0..3 {
                for b in 0..3 {
                    let mut coeff = -(r[a].clone() * f[b].clone());
                    if a == b {
                        coeff += f_dot_r.clone();
                    }
                    if coeff.is_exact_zero() {
                        continue;
                    }
                    for (row, row_coeff) in &self.rows[theta + a] {
                        for (col, col_coeff) in &self.rows[theta + b] {
                            reduced[(*row, *col)] += scale(&scale(&coeff, row_coeff), col_coeff);
                        }
                    }
                }
            }
        }
        reduced
    }

    /// `Tᵀ v`
    pub fn reduce_vector(&self, v: &DVector<T>) -> DVector<T> {
        let mut reduced = DVector::<T>::zeros(self.num_reduced());
        for (i, row) in self.rows.iter().enumerate() {
            if v[i].is_exact_zero() {
                continue;
            }
            for (r, coeff) in row {
                reduced[*r] += scale(&v[i], coeff);
            }
        }
        reduced
    }

    /// `T u_red`
    pub fn expand(&self, reduced: &DVector<T>) -> DVector<T> {
        let mut full = DVector::<T>::zeros(self.num_full());
        for (i, row) in self.rows.iter().enumerate() {
            for (c, coeff) in row {
                if reduced[*c].is_exact_zero() {
                    continue;
                }
                full[i] += scale(&reduced[*c], coeff);
            }
        }
        full
    }
}

fn scale<T: Real>(v: &T, coeff: &Option<T>) -> T {
    match coeff {
        Some(c) => v.clone() * c.clone(),
        None => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    fn coords() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 0.5, 0.2),
        ]
    }

    #[test]
    fn link_normalizes_dof_list() {
        let link = RigidLink::new(0, 1, [3, 1, 3, 2]);
        assert_eq!(link.dofs, vec![1, 2, 3]);
        assert!(!link.is_full());
        assert!(RigidLink::full(0, 1).is_full());
        assert!(link.couples(0));
        assert!(!link.couples(3));
    }

    #[test]
    fn validation_rejects_invalid_links() {
        let none = BTreeSet::new();
        assert!(validate_links(&[RigidLink::full(0, 5)], 3, &none).is_err());
        assert!(validate_links(&[RigidLink::full(1, 1)], 3, &none).is_err());
        assert!(validate_links(&[RigidLink::new(0, 1, [])], 3, &none).is_err());
        assert!(validate_links(&[RigidLink::new(0, 1, [7])], 3, &none).is_err());
        // chained links
        assert!(validate_links(&[RigidLink::full(0, 1), RigidLink::full(1, 2)], 3, &none).is_err());
        // slave of two masters
        assert!(validate_links(&[RigidLink::full(0, 2), RigidLink::full(1, 2)], 3, &none).is_err());
        // constrained slave
        let constrained: BTreeSet<DofId> = [DofId::new(2, 0)].into_iter().collect();
        assert!(validate_links(&[RigidLink::full(1, 2)], 3, &constrained).is_err());
        // uncoupled constrained DOF is fine
        assert!(validate_links(&[RigidLink::new(1, 2, [4, 5, 6])], 3, &constrained).is_ok());
    }

    #[test]
    fn free_and_constrained_dofs() {
        let mut constrained = vec![false; 18];
        for c in constrained.iter_mut().take(6) {
            *c = true;
        }
        let t = Condensation::<f64>::new(&constrained, &[], &coords());
        assert_eq!(t.num_reduced(), 12);
        assert_eq!(t.independent_dofs()[0], 6);

        let reduced = DVector::from_fn(12, |i, _| i as f64 + 1.0);
        let full = t.expand(&reduced);
        assert_eq!(full[0], 0.0);
        assert_eq!(full[6], 1.0);
        assert_eq!(full[17], 12.0);
        assert_eq!(t.reduce_vector(&full), reduced);
    }

    #[test]
    fn slave_follows_rigid_motion_of_master() {
        let constrained = vec![false; 18];
        let links = [RigidLink::full(1, 2)];
        let t = Condensation::<f64>::new(&constrained, &links, &coords());
        assert_eq!(t.num_reduced(), 12);

        // master translation (1, 2, 3) and rotation (0.1, -0.2, 0.3)
        let mut reduced = DVector::zeros(12);
        let master = [1.0, 2.0, 3.0, 0.1, -0.2, 0.3];
        for (k, v) in master.iter().enumerate() {
            reduced[6 + k] = *v;
        }
        let full = t.expand(&reduced);

        let r = Vector3::new(0.0, 0.5, 0.2);
        let theta = Vector3::new(0.1, -0.2, 0.3);
        let expected = Vector3::new(1.0, 2.0, 3.0) + theta.cross(&r);
        for k in 0..3 {
            assert_relative_eq!(full[12 + k], expected[k], epsilon = 1e-15);
            assert_relative_eq!(full[15 + k], theta[k], epsilon = 1e-15);
        }
    }

    #[test]
    fn reduced_matrix_is_symmetric_projection() {
        let constrained = vec![false; 18];
        let links = [RigidLink::new(1, 2, [1, 2, 3])];
        let t = Condensation::<f64>::new(&constrained, &links, &coords());
        assert_eq!(t.num_reduced(), 15);

        let a = DMatrix::from_fn(18, 18, |i, j| ((i * 7 + j * 3) % 11) as f64 - 5.0);
        let k = &a + a.transpose();
        let k_red = t.reduce_matrix(&k);
        for i in 0..15 {
            for j in 0..15 {
                assert_relative_eq!(k_red[(i, j)], k_red[(j, i)], epsilon = 1e-12);
            }
        }

        // energy identity: u_redᵀ K_red u_red = uᵀ K u with u = T u_red
        let u_red = DVector::from_fn(15, |i, _| (i as f64 * 0.37).sin());
        let u = t.expand(&u_red);
        let lhs = u_red.dot(&(&k_red * &u_red));
        let rhs = u.dot(&(&k * &u));
        assert_relative_eq!(lhs, rhs, max_relative = 1e-12);
    }

    #[test]
    fn link_offset_stiffness_follows_slave_force() {
        let mut constrained = vec![false; 18];
        for c in constrained.iter_mut().take(6) {
            *c = true;
        }
        let links = [RigidLink::full(1, 2)];
        let t = Condensation::<f64>::new(&constrained, &links, &coords());
        let k = DMatrix::<f64>::identity(18, 18);

        let no_force = DVector::zeros(18);
        assert_eq!(t.reduce_tangent(&k, &no_force), t.reduce_matrix(&k));

        // f = (0, 0, 2) on the slave, r = (0, 0.5, 0.2)
        let mut residual = DVector::zeros(18);
        residual[14] = 2.0;
        let extra = t.reduce_tangent(&k, &residual) - t.reduce_matrix(&k);
        let r = Vector3::new(0.0, 0.5, 0.2);
        let f = Vector3::new(0.0, 0.0, 2.0);
        let expected = Matrix3::identity() * f.dot(&r) - r * f.transpose();
        // master rotations are reduced DOFs 3..6
        for a in 0..3 {
            for b in 0..3 {
                assert_relative_eq!(extra[(3 + a, 3 + b)], expected[(a, b)], epsilon = 1e-14);
            }
        }
        assert_eq!(extra.rows(0, 3).amax(), 0.0);

        // partial links carry no offset term
        let partial = Condensation::<f64>::new(&constrained, &[RigidLink::new(1, 2, [1, 2, 3])], &coords());
        assert_eq!(partial.reduce_tangent(&k, &residual), partial.reduce_matrix(&k));
    }
}
