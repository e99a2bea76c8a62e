use approx::assert_relative_eq;
use pipe_fem::prelude::*;
use pipe_fem::results::NodeDisplacement;

const LENGTH: f64 = 2.0;

/// Cantilever along X clamped at node 1, loaded at the free end
fn build_cantilever(n_elements: usize, section: CrossSection, tip_load: &DofValues) -> Mesh {
    let nodes: Vec<NodeRecord> = (0..=n_elements)
        .map(|i| NodeRecord {
            index: i + 1,
            x: LENGTH * i as f64 / n_elements as f64,
            y: 0.0,
            z: 0.0,
        })
        .collect();
    let elements: Vec<ElementRecord> = (0..n_elements)
        .map(|i| ElementRecord {
            index: i + 1,
            first_node: i + 1,
            last_node: i + 2,
        })
        .collect();
    let mut mesh = Mesh::from_records(&nodes, &elements).unwrap();
    let all = mesh.all_elements();
    mesh.set_material_by_elements(&all, Material::steel()).unwrap();
    mesh.set_cross_section_by_elements(&all, section).unwrap();

    let mut clamp = unconstrained();
    for dof in clamp.iter_mut() {
        *dof = BoundaryValue::real(0.0);
    }
    mesh.set_prescribed_dofs(&[1], &clamp).unwrap();
    mesh.set_nodal_loads(&[n_elements + 1], tip_load).unwrap();
    mesh
}

fn tip_displacement(n_elements: usize, section: CrossSection, tip_load: &DofValues) -> NodeDisplacement {
    let mesh = build_cantilever(n_elements, section, tip_load);
    let solution = StructuralSolver::new(&mesh, AnalysisOptions::static_analysis())
        .unwrap()
        .static_analysis()
        .unwrap();
    solution
        .node_displacement(mesh.global_index(n_elements + 1).unwrap())
        .unwrap()
}

#[test]
fn tip_moment_converges_to_pure_bending() {
    let moment = 500.0;
    let section = CrossSection::rectangular(0.04, 0.08);
    let e = Material::steel().e;

    // Moment about z bends in the XY plane with Iz, about y in XZ with Iy
    let mut about_z = unconstrained();
    about_z[5] = BoundaryValue::real(moment);
    let mut about_y = unconstrained();
    about_y[4] = BoundaryValue::real(moment);

    let mut previous = f64::INFINITY;
    for n_elements in [1, 4, 16] {
        let d = tip_displacement(n_elements, section.clone(), &about_z);
        let rotation = moment * LENGTH / (e * section.iz);
        let deflection = moment * LENGTH.powi(2) / (2.0 * e * section.iz);
        assert_relative_eq!(d.rz, rotation, max_relative = 1e-9);
        assert_relative_eq!(d.dy, deflection, max_relative = 1e-9);

        let error = ((d.rz - rotation) / rotation)
            .abs()
            .max(((d.dy - deflection) / deflection).abs());
        assert!(error <= previous + 1e-10, "{} elements: error {:e}", n_elements, error);
        previous = error;

        let d = tip_displacement(n_elements, section.clone(), &about_y);
        assert_relative_eq!(d.ry, moment * LENGTH / (e * section.iy), max_relative = 1e-9);
        assert_relative_eq!(
            d.dz,
            -moment * LENGTH.powi(2) / (2.0 * e * section.iy),
            max_relative = 1e-9
        );
    }
}

#[test]
fn slender_beam_does_not_lock() {
    // Length to depth ratio of 200: a locking element would be far too stiff
    let force = 10.0;
    let section = CrossSection::rectangular(0.01, 0.01);
    let steel = Material::steel();
    let mut load = unconstrained();
    load[1] = BoundaryValue::real(force);

    let bending = force * LENGTH.powi(3) / (3.0 * steel.e * section.iz);
    for n_elements in [1, 4, 16] {
        let d = tip_displacement(n_elements, section.clone(), &load);
        assert_relative_eq!(d.dy, bending, max_relative = 1e-4);
    }
}

#[test]
fn stocky_beam_adds_shear_deflection() {
    let force = 1.0e4;
    let section = CrossSection::rectangular(0.2, 0.2);
    let steel = Material::steel();
    let mut load = unconstrained();
    load[1] = BoundaryValue::real(force);

    let bending = force * LENGTH.powi(3) / (3.0 * steel.e * section.iz);
    let shear = force * LENGTH / (5.0 / 6.0 * steel.g * section.area);
    for n_elements in [1, 4, 16] {
        let d = tip_displacement(n_elements, section.clone(), &load);
        assert_relative_eq!(d.dy, bending + shear, max_relative = 1e-9);
    }

    let slender_limit = tip_displacement(4, section.without_shear_deformation(), &load);
    assert_relative_eq!(slender_limit.dy, bending, max_relative = 1e-9);
}
