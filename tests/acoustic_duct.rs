use approx::assert_relative_eq;
use pipe_fem::prelude::*;

const DIAMETER: f64 = 0.1;
const Q: f64 = 1.0e-3;

/// Straight air-filled duct from x = 0 to x = `length`, nodes 1..=n+1
fn build_duct(n_elements: usize, length: f64, model: AcousticElementType) -> Mesh {
    let nodes: Vec<NodeRecord> = (0..=n_elements)
        .map(|i| NodeRecord {
            index: i + 1,
            x: length * i as f64 / n_elements as f64,
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
    mesh.set_fluid_by_elements(&all, Some(Fluid::air())).unwrap();
    mesh.set_cross_section_by_elements(&all, CrossSection::duct(DIAMETER))
        .unwrap();
    mesh.set_acoustic_type_by_elements(&all, model).unwrap();
    mesh.set_volume_velocity(&[1], BoundaryValue::real(Q)).unwrap();
    mesh
}

/// Frequency of the largest |p| at `node` within [lo, hi]
fn peak_between(mesh: &Mesh, solution: &AcousticSolution, node: usize, lo: f64, hi: f64) -> f64 {
    let response = solution.node_response(mesh.global_index(node).unwrap());
    solution
        .frequencies
        .iter()
        .zip(response.iter())
        .filter(|(f, _)| **f >= lo && **f <= hi)
        .fold((0.0, 0.0), |best, (f, p)| {
            if p.norm() > best.1 {
                (*f, p.norm())
            } else {
                best
            }
        })
        .0
}

#[test]
fn quarter_wave_resonances_of_open_duct() {
    // Volume velocity source at x = 0, pressure release at x = L
    let length = 1.0;
    let mut mesh = build_duct(10, length, AcousticElementType::Undamped);
    mesh.set_acoustic_pressure(&[11], BoundaryValue::real(0.0)).unwrap();

    let options = AnalysisOptions::direct_harmonic(Vec::new()).with_frequency_range(1.0, 700.0, 0.5);
    let solution = AcousticSolver::new(&mesh, options).unwrap().direct().unwrap();
    assert!(solution.report.is_complete());

    let c = Fluid::air().speed_of_sound;
    for n in 1..=4 {
        let expected = (2 * n - 1) as f64 * c / (4.0 * length);
        let peak = peak_between(&mesh, &solution, 1, expected - 30.0, expected + 30.0);
        assert!(
            (peak - expected).abs() <= 0.5,
            "peak {} at {:.2} Hz, expected {:.2} Hz",
            n,
            peak,
            expected
        );
    }
}

#[test]
fn anechoic_termination_has_no_resonances() {
    let mut mesh = build_duct(10, 1.0, AcousticElementType::Undamped);
    mesh.set_radiation_impedance(&[11], Some(RadiationImpedance::Anechoic))
        .unwrap();

    let options = AnalysisOptions::direct_harmonic(Vec::new()).with_frequency_range(10.0, 700.0, 10.0);
    let solution = AcousticSolver::new(&mesh, options).unwrap().direct().unwrap();

    let area = CrossSection::duct(DIAMETER).fluid_area();
    let expected = Fluid::air().impedance() / area * Q;
    for node in [1, 6, 11] {
        for p in solution.node_response(mesh.global_index(node).unwrap()) {
            assert_relative_eq!(p.norm(), expected, max_relative = 1e-9);
        }
    }
}

#[test]
fn wide_duct_losses_bound_the_resonance_peak() {
    let mut lossless = build_duct(10, 1.0, AcousticElementType::Undamped);
    lossless.set_acoustic_pressure(&[11], BoundaryValue::real(0.0)).unwrap();
    let mut lossy = build_duct(10, 1.0, AcousticElementType::WideDuct);
    lossy.set_acoustic_pressure(&[11], BoundaryValue::real(0.0)).unwrap();

    let c = Fluid::air().speed_of_sound;
    let options = AnalysisOptions::direct_harmonic(vec![c / 4.0 + 0.01]);
    let undamped = AcousticSolver::new(&lossless, options.clone()).unwrap().direct().unwrap();
    let damped = AcousticSolver::new(&lossy, options).unwrap().direct().unwrap();

    let p_undamped = undamped.pressures[(lossless.global_index(1).unwrap(), 0)].norm();
    let p_damped = damped.pressures[(lossy.global_index(1).unwrap(), 0)].norm();
    assert!(p_damped < p_undamped);
    assert!(p_damped > 0.0);
}

#[test]
fn closed_duct_acoustic_modes() {
    let length = 2.0;
    let mesh = build_duct(80, length, AcousticElementType::Undamped);
    let modes = AcousticSolver::new(&mesh, AnalysisOptions::modal(4))
        .unwrap()
        .modal_analysis()
        .unwrap();

    let c = Fluid::air().speed_of_sound;
    assert!(modes.natural_frequencies[0] < 1e-3);
    for n in 1..4 {
        assert_relative_eq!(
            modes.natural_frequencies[n],
            n as f64 * c / (2.0 * length),
            max_relative = 2e-3
        );
    }
}
