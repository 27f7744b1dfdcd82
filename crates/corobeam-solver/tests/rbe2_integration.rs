/// Integration tests for RBE2 rigid links
/// A full link carries an offset point rigidly with its master node

use approx::assert_relative_eq;
use corobeam_solver::{BeamModel, BeamSection, BeamSolver, NonlinearConfig, RigidLink, SolverError};
use nalgebra::{Matrix3, Vector3};

/// Cantilever of 4 elements with an offset slave node linked to the tip
fn linked_cantilever(dofs: &[usize]) -> BeamModel {
    let mut model = BeamModel::new(70e9, 0.3, 2700.0);
    let section = model.add_section(BeamSection::circular(0.01));
    for i in 0..=4 {
        model.add_node(0.25 * i as f64, 0.0, 0.0);
    }
    for i in 0..4 {
        model.add_element(i, i + 1, section, [0.0, 1.0, 0.0]);
    }
    let slave = model.add_node(1.0, 0.2, 0.1);
    model.add_rigid_link(RigidLink::new(4, slave, dofs.iter().copied()));
    model.clamp(0);
    model
}

#[test]
fn test_full_link_slave_follows_finite_master_rotation() {
    let mut model = linked_cantilever(&[1, 2, 3, 4, 5, 6]);
    // tip moment about z and a transverse force at the offset point
    model.add_load(4, 6, 60.0);
    model.add_load(5, 3, 20.0);

    let config = NonlinearConfig {
        load_steps: 4,
        max_iterations: 50,
        ..NonlinearConfig::default()
    };
    let mut solver = BeamSolver::new(model, config).unwrap();
    solver.solve(0).unwrap();

    let structure = solver.structure();
    let master = structure.node(4);
    let slave = structure.node(5);
    println!("Master rotation about z: {:.6} rad", master.displacement[5]);
    assert!(master.displacement[5].abs() > 0.05);

    // u_s = u_m + (R_m − I) r₀
    let r0 = Vector3::new(0.0, 0.2, 0.1);
    let offset = (master.orientation - Matrix3::identity()) * r0;
    for d in 0..3 {
        assert_relative_eq!(
            slave.displacement[d],
            master.displacement[d] + offset[d],
            epsilon = 1e-12
        );
    }
    assert_eq!(slave.orientation, master.orientation);
    for d in 3..6 {
        assert_relative_eq!(slave.displacement[d], master.displacement[d], epsilon = 1e-12);
    }
}

#[test]
fn test_large_offset_force_converges_in_one_step() {
    // the offset turns with the master, which the tangent has to know about
    let mut model = linked_cantilever(&[1, 2, 3, 4, 5, 6]);
    model.add_load(5, 3, 200.0);

    let mut solver = BeamSolver::new(model, NonlinearConfig::default()).unwrap();
    let report = solver.solve(0).unwrap().clone();
    println!("Iterations: {}", report.total_iterations);
    assert!(report.total_iterations <= 7);
    assert!(solver.equilibrium_residual() < 1e-6 * 200.0);

    let structure = solver.structure();
    let master = structure.node(4);
    let slave = structure.node(5);
    // the offset force twists the beam noticeably
    assert!(master.displacement[3].abs() > 0.05);
    let offset = (master.orientation - Matrix3::identity()) * Vector3::new(0.0, 0.2, 0.1);
    for d in 0..3 {
        assert_relative_eq!(
            slave.displacement[d],
            master.displacement[d] + offset[d],
            epsilon = 1e-12
        );
    }
}

#[test]
fn test_load_on_slave_is_carried_by_master() {
    // a force at the offset point equals the same force plus its moment at the master
    let mut on_slave = linked_cantilever(&[1, 2, 3, 4, 5, 6]);
    on_slave.add_load(5, 3, 0.05);

    let mut on_master = linked_cantilever(&[1, 2, 3, 4, 5, 6]);
    on_master.add_load(4, 3, 0.05);
    // M = r₀ × F with r₀ = (0, 0.2, 0.1), F = (0, 0, 0.05)
    on_master.add_load(4, 4, 0.2 * 0.05);

    let mut a = BeamSolver::new(on_slave, NonlinearConfig::default()).unwrap();
    let mut b = BeamSolver::new(on_master, NonlinearConfig::default()).unwrap();
    a.solve(0).unwrap();
    b.solve(0).unwrap();

    for dof in 0..6 {
        assert_relative_eq!(
            a.displacement(4, dof).unwrap(),
            b.displacement(4, dof).unwrap(),
            epsilon = 1e-10,
            max_relative = 1e-4
        );
    }
}

#[test]
fn test_partial_link_couples_translations_only() {
    // coupled DOFs of a slave cannot be constrained
    let mut model = linked_cantilever(&[1, 2, 3]);
    model.add_load(4, 3, 0.5);
    model.clamp(5);
    let err = BeamSolver::new(model, NonlinearConfig::default()).err();
    assert!(matches!(err, Some(SolverError::InvalidModel(_))));

    let mut model = linked_cantilever(&[1, 2, 3]);
    model.add_load(4, 3, 0.5);
    // the uncoupled slave rotations have no stiffness
    model.fix(5, 4, 6);
    let mut solver = BeamSolver::new(model, NonlinearConfig::default()).unwrap();
    solver.solve(0).unwrap();

    // small rotations: u_s ≈ u_m + θ_m × r₀
    let m = |d| solver.displacement(4, d).unwrap();
    let theta = Vector3::new(m(3), m(4), m(5));
    let expected = Vector3::new(m(0), m(1), m(2)) + theta.cross(&Vector3::new(0.0, 0.2, 0.1));
    for d in 0..3 {
        assert_relative_eq!(solver.displacement(5, d).unwrap(), expected[d], epsilon = 1e-9);
    }
    for d in 3..6 {
        assert_eq!(solver.displacement(5, d).unwrap(), 0.0);
    }
}

#[test]
fn test_invalid_links_are_rejected() {
    let mut model = linked_cantilever(&[1, 2, 3, 4, 5, 6]);
    model.add_rigid_link(RigidLink::full(3, 5));
    assert!(matches!(
        BeamSolver::new(model, NonlinearConfig::default()),
        Err(SolverError::InvalidModel(_))
    ));

    let mut model = linked_cantilever(&[1, 2, 3, 4, 5, 6]);
    model.add_rigid_link(RigidLink::full(5, 4));
    assert!(BeamSolver::new(model, NonlinearConfig::default()).is_err());
}
