use approx::assert_relative_eq;
use num_complex::Complex64;
use pipe_fem::prelude::*;

/// Cantilever pipe of four elements along X, nodes 1..=5
fn build_cantilever() -> Mesh {
    let nodes: Vec<NodeRecord> = (0..5)
        .map(|i| NodeRecord {
            index: i + 1,
            x: 0.5 * i as f64,
            y: 0.0,
            z: 0.0,
        })
        .collect();
    let elements: Vec<ElementRecord> = (0..4)
        .map(|i| ElementRecord {
            index: i + 1,
            first_node: i + 1,
            last_node: i + 2,
        })
        .collect();
    let mut mesh = Mesh::from_records(&nodes, &elements).unwrap();
    let all = mesh.all_elements();
    mesh.set_material_by_elements(&all, Material::steel()).unwrap();
    mesh.set_cross_section_by_elements(&all, CrossSection::pipe(0.0889, 0.0055))
        .unwrap();
    mesh
}

/// Node 1 clamped except for a unit imposed displacement along Y
fn with_imposed_displacement(mut mesh: Mesh) -> Mesh {
    let mut support = unconstrained();
    for dof in support.iter_mut() {
        *dof = BoundaryValue::real(0.0);
    }
    support[1] = BoundaryValue::real(1.0);
    mesh.set_prescribed_dofs(&[1], &support).unwrap();
    mesh
}

#[test]
fn imposed_displacement_is_returned_exactly() {
    let mesh = with_imposed_displacement(build_cantilever());
    let options = AnalysisOptions::direct_harmonic(vec![1.0, 10.0, 55.0, 130.0, 400.0])
        .with_damping(GlobalDamping::hysteretic(0.01));
    let solution = StructuralSolver::new(&mesh, options).unwrap().direct_harmonic().unwrap();

    let dof = 6 * mesh.global_index(1).unwrap() + 1;
    for value in solution.dof_response(dof) {
        assert_eq!(value, Complex64::new(1.0, 0.0));
    }
    let clamped = 6 * mesh.global_index(1).unwrap() + 2;
    for value in solution.dof_response(clamped) {
        assert_eq!(value, Complex64::new(0.0, 0.0));
    }
    // The imposed motion drives the rest of the pipe
    let tip = 6 * mesh.global_index(5).unwrap() + 1;
    assert!(solution.dof_response(tip).iter().all(|u| u.norm() > 0.0));
}

#[test]
fn low_frequency_response_is_rigid_translation() {
    let mesh = with_imposed_displacement(build_cantilever());
    let solution = StructuralSolver::new(&mesh, AnalysisOptions::direct_harmonic(vec![0.01]))
        .unwrap()
        .direct_harmonic()
        .unwrap();
    let tip = 6 * mesh.global_index(5).unwrap() + 1;
    assert!((solution.dof_response(tip)[0] - Complex64::new(1.0, 0.0)).norm() < 1e-6);
}

#[test]
fn per_frequency_table_is_followed() {
    let mut mesh = build_cantilever();
    let mut support = unconstrained();
    for dof in support.iter_mut() {
        *dof = BoundaryValue::real(0.0);
    }
    support[2] = BoundaryValue::Table(vec![
        Complex64::new(1.0, 0.0),
        Complex64::new(0.0, 2.0),
        Complex64::new(-0.5, 0.5),
    ]);
    mesh.set_prescribed_dofs(&[1], &support).unwrap();

    let options = AnalysisOptions::direct_harmonic(vec![5.0, 50.0, 500.0]);
    let solution = StructuralSolver::new(&mesh, options).unwrap().direct_harmonic().unwrap();
    let dof = 6 * mesh.global_index(1).unwrap() + 2;
    assert_eq!(
        solution.dof_response(dof),
        vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 2.0),
            Complex64::new(-0.5, 0.5)
        ]
    );
}

#[test]
fn table_length_must_match_frequencies() {
    let mut mesh = build_cantilever();
    let mut support = unconstrained();
    support[0] = BoundaryValue::real_table(&[1.0, 2.0]);
    mesh.set_prescribed_dofs(&[1], &support).unwrap();

    let options = AnalysisOptions::direct_harmonic(vec![5.0, 50.0, 500.0]);
    let result = StructuralSolver::new(&mesh, options).unwrap().direct_harmonic();
    assert!(result.is_err());
}

#[test]
fn superposition_falls_back_to_direct_with_imposed_motion() {
    let mesh = with_imposed_displacement(build_cantilever());
    let options = AnalysisOptions::mode_superposition(vec![20.0, 80.0], 6);
    let solution = StructuralSolver::new(&mesh, options).unwrap().harmonic().unwrap();

    assert_eq!(solution.method, HarmonicMethod::Direct);
    assert!(solution
        .report
        .warnings
        .iter()
        .any(|w| matches!(w, ModelWarning::ModeSuperpositionFallback { .. })));
    let dof = 6 * mesh.global_index(1).unwrap() + 1;
    assert!(solution
        .dof_response(dof)
        .iter()
        .all(|u| *u == Complex64::new(1.0, 0.0)));
}

#[test]
fn support_reaction_balances_imposed_motion() {
    let mesh = with_imposed_displacement(build_cantilever());
    let frequency = 0.1;
    let solver = StructuralSolver::new(&mesh, AnalysisOptions::direct_harmonic(vec![frequency])).unwrap();
    let solution = solver.direct_harmonic().unwrap();
    let reactions = solver.reactions(&solution).unwrap();
    assert_eq!(reactions.supports.len(), 6);

    // Far below the first mode the pipe moves rigidly and the support only
    // carries the inertia of the whole pipe
    let section = CrossSection::pipe(0.0889, 0.0055);
    let mass = Material::steel().rho * section.area * 2.0;
    let omega = 2.0 * std::f64::consts::PI * frequency;
    let fy = reactions.support(1, 1).unwrap();
    assert_relative_eq!(fy[0].re, -omega * omega * mass, max_relative = 1e-3);
    assert!(fy[0].im.abs() < 1e-9);
}

#[test]
fn fully_prescribed_model_returns_prescribed_values() {
    let nodes = [
        NodeRecord { index: 1, x: 0.0, y: 0.0, z: 0.0 },
        NodeRecord { index: 2, x: 0.0, y: 0.0, z: 1.0 },
    ];
    let elements = [ElementRecord { index: 1, first_node: 1, last_node: 2 }];
    let mut mesh = Mesh::from_records(&nodes, &elements).unwrap();
    mesh.set_material_by_elements(&[1], Material::steel()).unwrap();
    mesh.set_cross_section_by_elements(&[1], CrossSection::pipe(0.0603, 0.0039))
        .unwrap();

    let mut support = unconstrained();
    for dof in support.iter_mut() {
        *dof = BoundaryValue::real(0.0);
    }
    mesh.set_prescribed_dofs(&[1], &support).unwrap();
    support[0] = BoundaryValue::complex(0.5, -0.25);
    mesh.set_prescribed_dofs(&[2], &support).unwrap();

    let solution = StructuralSolver::new(&mesh, AnalysisOptions::direct_harmonic(vec![10.0, 20.0]))
        .unwrap()
        .direct_harmonic()
        .unwrap();
    assert!(solution.report.is_complete());
    let dof = 6 * mesh.global_index(2).unwrap();
    assert_eq!(
        solution.dof_response(dof),
        vec![Complex64::new(0.5, -0.25), Complex64::new(0.5, -0.25)]
    );
    let others = (0..mesh.dof_count()).filter(|d| *d != dof);
    for d in others {
        assert!(solution.dof_response(d).iter().all(|u| u.norm() == 0.0));
    }
}
