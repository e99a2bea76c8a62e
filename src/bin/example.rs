//! Pipe FEM Example - Clamped gas line with a silencer plate
//!
//! Runs modal, harmonic and acoustic analyses of a small L-shaped pipe line
//! and prints a JSON summary. Set `RUST_LOG=debug` for solver logs.

use anyhow::Result;
use pipe_fem::prelude::*;
use serde_json::json;

fn build_mesh() -> Result<Mesh> {
    //     N1 ----------- N9
    //                    |
    //                    |
    //                    N13
    let mut nodes = Vec::new();
    let mut elements = Vec::new();
    for i in 0..9 {
        nodes.push(NodeRecord {
            index: i + 1,
            x: 0.5 * i as f64,
            y: 0.0,
            z: 0.0,
        });
    }
    for i in 0..4 {
        nodes.push(NodeRecord {
            index: 10 + i,
            x: 4.0,
            y: -0.5 * (i + 1) as f64,
            z: 0.0,
        });
    }
    for i in 0..8 {
        elements.push(ElementRecord {
            index: i + 1,
            first_node: i + 1,
            last_node: i + 2,
        });
    }
    elements.push(ElementRecord {
        index: 9,
        first_node: 9,
        last_node: 10,
    });
    for i in 0..3 {
        elements.push(ElementRecord {
            index: 10 + i,
            first_node: 10 + i,
            last_node: 11 + i,
        });
    }

    let mut mesh = Mesh::from_records(&nodes, &elements)?;
    let all = mesh.all_elements();
    mesh.set_material_by_elements(&all, Material::steel())?;
    mesh.set_cross_section_by_elements(&all, CrossSection::pipe(0.1143, 0.006))?;
    mesh.set_fluid_by_elements(&all, Some(Fluid::natural_gas()))?;
    mesh.set_acoustic_type_by_elements(&all, AcousticElementType::WideDuct)?;
    mesh.set_perforated_plate_by_elements(
        &[11],
        Some(PerforatedPlate::new(0.005, 0.003, 0.2).with_nonlinear_resistance(0.76)),
    )?;

    // Clamped ends, a support spring at the corner
    let mut fixed = unconstrained();
    for dof in fixed.iter_mut() {
        *dof = BoundaryValue::real(0.0);
    }
    mesh.set_prescribed_dofs(&[1, 13], &fixed)?;
    let mut spring = unconstrained();
    spring[2] = BoundaryValue::real(5.0e6);
    mesh.set_lumped_stiffness(&[9], &spring)?;

    // Unit force at mid-span, compressor pulsation at the inlet
    let mut force = unconstrained();
    force[2] = BoundaryValue::real(100.0);
    mesh.set_nodal_loads(&[5], &force)?;
    mesh.set_volume_velocity(&[1], BoundaryValue::real(1.0e-3))?;
    mesh.set_radiation_impedance(&[13], Some(RadiationImpedance::Anechoic))?;
    Ok(mesh)
}

fn main() -> Result<()> {
    env_logger::init();

    let mesh = build_mesh()?;
    println!(
        "=== Pipe FEM Example: {} nodes, {} elements, {} DOFs ===\n",
        mesh.node_count(),
        mesh.element_count(),
        mesh.dof_count()
    );

    // Modal analysis
    let modal = StructuralSolver::new(&mesh, AnalysisOptions::modal(6))?.modal_analysis()?;
    for (i, f) in modal.natural_frequencies.iter().enumerate() {
        println!("Mode {}: {:.2} Hz", i + 1, f);
    }

    // Harmonic analysis with hysteretic damping
    let options = AnalysisOptions::direct_harmonic(Vec::new())
        .with_frequency_range(1.0, 200.0, 1.0)
        .with_damping(GlobalDamping::hysteretic(0.02));
    let acoustic = AcousticSolver::new(&mesh, options.clone())?.direct()?;
    let solver = StructuralSolver::new(&mesh, options)?;
    let harmonic = solver.direct_harmonic_with_acoustic(&acoustic)?;
    let reactions = solver.reactions(&harmonic)?;
    let stresses = solver.stresses(&harmonic)?;

    let mid_span = 6 * mesh.global_index(5)? + 2;
    let peak = harmonic
        .dof_response(mid_span)
        .iter()
        .zip(&harmonic.frequencies)
        .map(|(u, f)| (u.norm(), *f))
        .fold((0.0, 0.0), |best, x| if x.0 > best.0 { x } else { best });
    let max_stress = stresses
        .iter()
        .map(|s| (s.element, s.max_von_mises()))
        .fold((0, 0.0), |best, x| if x.1 > best.1 { x } else { best });
    let inlet_spl = acoustic.spl(mesh.global_index(1)?);

    let summary = json!({
        "natural_frequencies_hz": modal.natural_frequencies,
        "peak_mid_span_displacement": { "value_m": peak.0, "frequency_hz": peak.1 },
        "max_von_mises": { "element": max_stress.0, "value_pa": max_stress.1 },
        "max_inlet_spl_db": inlet_spl.iter().copied().fold(f64::MIN, f64::max),
        "supports": reactions.supports.len(),
        "springs": reactions.springs.len(),
        "warnings": acoustic
            .report
            .warnings
            .iter()
            .chain(harmonic.report.warnings.iter())
            .map(|w| w.to_string())
            .collect::<Vec<_>>(),
        "failed_frequencies": harmonic.report.failed_indices(),
    });
    println!("\n{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
