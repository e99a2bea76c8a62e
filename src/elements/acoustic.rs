//! One-dimensional acoustic admittance element
//!
//! For each frequency the element returns the 2x2 admittance relating nodal
//! pressures to the volume velocities entering the element at its nodes,
//! stored as [y11, y12, y21, y22]. Time dependence is e^{jωt}; waves travel
//! as e^{-jk₊x} downstream and e^{jk₋x} upstream.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{CrossSection, Fluid, PerforatedPlate, RadiationImpedance};
use crate::analysis::IterationControl;
use crate::error::{FemError, FemResult};
use crate::math::bessel::j2_over_j0;
use crate::math::J;
use crate::results::ModelWarning;

/// First zero of J1', sets the first higher-order duct mode
const CUTOFF_FACTOR: f64 = 1.84;
/// Stokes number below which the wide-duct model loses validity
const WIDE_DUCT_MIN_STOKES: f64 = 10.0;
/// Dimensionless frequency below which Howe's quasi-steady regime applies
const HOWE_MIN_OMEGA_PLUS: f64 = 1.0e-3;
const LAMINAR_REYNOLDS: f64 = 2300.0;

/// Damping theory of an acoustic element
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum AcousticElementType {
    /// Lossless plane waves
    #[default]
    Undamped,
    /// Constant hysteretic loss factor on the wavenumber
    Proportional { loss_factor: f64 },
    /// Boundary-layer correction for ducts wide compared to the viscous layer
    WideDuct,
    /// Low reduced frequency model as an equivalent fluid
    LrfFluidEquivalent,
    /// Low reduced frequency model in propagation-constant form
    LrfFull,
    /// Lossless waves convected by a mean flow
    UndampedMeanFlow,
    /// Mean flow with turbulent boundary-layer damping after Howe
    Howe,
    /// Mean flow with wall-friction damping after Peters
    Peters,
}

impl AcousticElementType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Undamped => "undamped",
            Self::Proportional { .. } => "proportional",
            Self::WideDuct => "wide-duct",
            Self::LrfFluidEquivalent => "LRF fluid equivalent",
            Self::LrfFull => "LRF full",
            Self::UndampedMeanFlow => "undamped mean flow",
            Self::Howe => "howe",
            Self::Peters => "peters",
        }
    }

    pub fn has_mean_flow(&self) -> bool {
        matches!(self, Self::UndampedMeanFlow | Self::Howe | Self::Peters)
    }
}

/// Wavenumbers and characteristic impedance at one frequency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveParameters {
    /// Downstream wavenumber
    pub k_plus: Complex64,
    /// Upstream wavenumber
    pub k_minus: Complex64,
    /// Characteristic specific impedance
    pub impedance: Complex64,
}

/// Admittance coefficients per frequency and the validity warnings raised
#[derive(Debug, Clone, Default)]
pub struct Admittance {
    pub values: Vec<[Complex64; 4]>,
    pub warnings: Vec<ModelWarning>,
}

/// A two-node acoustic duct element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcousticElement {
    pub index: usize,
    pub first_node: usize,
    pub last_node: usize,
    pub element_type: AcousticElementType,
    pub fluid: Option<Arc<Fluid>>,
    pub cross_section: Option<Arc<CrossSection>>,
    /// Mean flow velocity from first to last node in m/s
    pub mean_velocity: f64,
    /// Absolute wall roughness in m
    pub roughness: f64,
    pub perforated_plate: Option<PerforatedPlate>,
}

impl AcousticElement {
    pub fn new(index: usize, first_node: usize, last_node: usize) -> Self {
        Self {
            index,
            first_node,
            last_node,
            element_type: AcousticElementType::Undamped,
            fluid: None,
            cross_section: None,
            mean_velocity: 0.0,
            roughness: 0.0,
            perforated_plate: None,
        }
    }

    pub fn with_type(mut self, element_type: AcousticElementType) -> Self {
        self.element_type = element_type;
        self
    }

    pub fn with_fluid(mut self, fluid: Arc<Fluid>) -> Self {
        self.fluid = Some(fluid);
        self
    }

    pub fn with_cross_section(mut self, section: Arc<CrossSection>) -> Self {
        self.cross_section = Some(section);
        self
    }

    pub fn with_mean_velocity(mut self, velocity: f64) -> Self {
        self.mean_velocity = velocity;
        self
    }

    pub fn fluid(&self) -> FemResult<&Fluid> {
        self.fluid.as_deref().ok_or(FemError::MissingFluid(self.index))
    }

    pub fn section(&self) -> FemResult<&CrossSection> {
        self.cross_section
            .as_deref()
            .ok_or(FemError::MissingCrossSection(self.index))
    }

    pub fn validate(&self) -> FemResult<()> {
        let fluid = self.fluid()?;
        fluid.validate()?;
        self.section()?.validate_acoustic()?;
        if let Some(plate) = &self.perforated_plate {
            plate.validate()?;
        }
        if self.element_type.has_mean_flow() && self.mach(fluid).abs() >= 1.0 {
            return Err(FemError::Configuration(format!(
                "element {} has a supersonic mean flow",
                self.index
            )));
        }
        if let AcousticElementType::Proportional { loss_factor } = self.element_type {
            if loss_factor < 0.0 {
                return Err(FemError::Configuration(format!(
                    "element {} has a negative loss factor",
                    self.index
                )));
            }
        }
        Ok(())
    }

    /// Fluid area
    pub fn area(&self) -> FemResult<f64> {
        Ok(self.section()?.fluid_area())
    }

    fn radius(&self) -> FemResult<f64> {
        Ok(self.section()?.inner_diameter / 2.0)
    }

    fn mach(&self, fluid: &Fluid) -> f64 {
        if self.element_type.has_mean_flow() {
            self.mean_velocity / fluid.speed_of_sound
        } else {
            0.0
        }
    }

    /// Frequency above which higher-order modes propagate
    pub fn cutoff_frequency(&self) -> FemResult<f64> {
        let c = self.fluid()?.speed_of_sound;
        Ok(CUTOFF_FACTOR * c / (2.0 * PI * self.radius()?))
    }

    /// Darcy friction factor of the mean flow (laminar or Colebrook)
    pub fn friction_factor(&self, control: &IterationControl) -> FemResult<f64> {
        let fluid = self.fluid()?;
        let diameter = self.section()?.inner_diameter;
        let reynolds = self.mean_velocity.abs() * diameter / fluid.kinematic_viscosity();
        if reynolds <= 0.0 {
            return Ok(0.0);
        }
        if reynolds < LAMINAR_REYNOLDS {
            return Ok(64.0 / reynolds);
        }

        // Colebrook-White as a fixed point in x = 1/√f
        let relative = self.roughness / (3.7 * diameter);
        let mut x = 1.0 / 0.02_f64.sqrt();
        for _ in 0..control.max_iterations {
            let next = -2.0 * (relative + 2.51 * x / reynolds).log10();
            let converged = (next - x).abs() <= control.tolerance * next.abs();
            x = next;
            if converged {
                break;
            }
        }
        Ok(1.0 / (x * x))
    }

    /// Friction velocity u* = U·√(f/8)
    pub fn friction_velocity(&self, control: &IterationControl) -> FemResult<f64> {
        let f = self.friction_factor(control)?;
        Ok(self.mean_velocity.abs() * (f / 8.0).sqrt())
    }

    /// Wavenumbers and characteristic impedance at angular frequency ω
    pub fn wave_parameters(&self, omega: f64, control: &IterationControl) -> FemResult<WaveParameters> {
        let fluid = self.fluid()?;
        let radius = self.radius()?;
        let c = fluid.speed_of_sound;
        let rho_c = Complex64::new(fluid.impedance(), 0.0);
        let k0 = Complex64::new(omega / c, 0.0);
        let gamma = fluid.isentropic_exponent;
        let sigma = fluid.prandtl().sqrt();
        let nu = fluid.kinematic_viscosity();
        let stokes = radius * (omega / nu).sqrt();
        let mach = self.mach(fluid);

        let symmetric = |k: Complex64, z: Complex64| WaveParameters {
            k_plus: k,
            k_minus: k,
            impedance: z,
        };
        let convected = |k: Complex64| WaveParameters {
            k_plus: k / (1.0 + mach),
            k_minus: k / (1.0 - mach),
            impedance: rho_c,
        };

        let params = match self.element_type {
            AcousticElementType::Undamped => symmetric(k0, rho_c),
            AcousticElementType::Proportional { loss_factor } => {
                symmetric(k0 * Complex64::new(1.0, -loss_factor / 2.0), rho_c)
            }
            AcousticElementType::WideDuct => {
                let delta = (nu / (2.0 * omega)).sqrt();
                let one_minus_j = Complex64::new(1.0, -1.0);
                let thermal = (gamma - 1.0) / sigma;
                let k = k0 * (1.0 + one_minus_j * delta * (1.0 + thermal) / radius);
                let z = rho_c * (1.0 + one_minus_j * delta * (1.0 - thermal) / radius);
                symmetric(k, z)
            }
            AcousticElementType::LrfFluidEquivalent => {
                let j32 = Complex64::new(-1.0, 1.0) / 2.0_f64.sqrt();
                let f_v = -j2_over_j0(j32 * stokes);
                let f_t = -j2_over_j0(j32 * sigma * stokes);
                let rho_eff = fluid.density / f_v;
                let k_eff = fluid.bulk_modulus() / (gamma - (gamma - 1.0) * f_t);
                let k = omega * (rho_eff / k_eff).sqrt();
                let z = (rho_eff * k_eff).sqrt();
                symmetric(k, z)
            }
            AcousticElementType::LrfFull => {
                let j32 = Complex64::new(-1.0, 1.0) / 2.0_f64.sqrt();
                let s_v = j32 * stokes;
                let n = 1.0 / (1.0 + (gamma - 1.0) / gamma * j2_over_j0(j32 * sigma * stokes));
                // Γ² = (J0/J2)(s_v)·γ/n, root with positive imaginary part
                let gamma_sq = gamma / (n * j2_over_j0(s_v));
                let mut big_gamma = gamma_sq.sqrt();
                if big_gamma.im < 0.0 {
                    big_gamma = -big_gamma;
                }
                let k = -J * big_gamma * omega / c;
                let z = -J * rho_c * big_gamma * n / gamma;
                symmetric(k, z)
            }
            AcousticElementType::UndampedMeanFlow => convected(k0),
            AcousticElementType::Peters => {
                let friction = self.friction_factor(control)?;
                let alpha_q = friction * mach.abs() / (4.0 * radius);
                let beta = Complex64::new(1.0, -1.0) / (2.0_f64.sqrt() * stokes)
                    * (1.0 + (gamma - 1.0) / sigma);
                let k = k0 * (1.0 + beta) - J * alpha_q;
                convected(k)
            }
            AcousticElementType::Howe => {
                let u_star = self.friction_velocity(control)?;
                let beta = Complex64::new(1.0, -1.0) / (2.0_f64.sqrt() * stokes)
                    * (1.0 + (gamma - 1.0) / sigma);
                let turbulence = if u_star > 0.0 {
                    let omega_plus = omega * nu / (u_star * u_star);
                    (1.0 + 0.01 / omega_plus).sqrt()
                } else {
                    1.0
                };
                convected(k0 * (1.0 + beta * turbulence))
            }
        };
        Ok(params)
    }

    /// Admittance coefficients at angular frequency ω
    pub fn admittance_at(
        &self,
        omega: f64,
        length: f64,
        control: &IterationControl,
    ) -> FemResult<[Complex64; 4]> {
        let area = self.area()?;
        let wave = self.wave_parameters(omega, control)?;
        Ok(transmission_admittance(&wave, area, length))
    }

    /// Admittance for every frequency with the model validity warnings
    pub fn admittance(
        &self,
        frequencies: &[f64],
        length: f64,
        control: &IterationControl,
    ) -> FemResult<Admittance> {
        let fluid = self.fluid()?;
        let radius = self.radius()?;
        let nu = fluid.kinematic_viscosity();

        let mut values = Vec::with_capacity(frequencies.len());
        for &f in frequencies {
            values.push(self.admittance_at(2.0 * PI * f, length, control)?);
        }

        let mut warnings = Vec::new();

        let cutoff = self.cutoff_frequency()?;
        if let Some(&first) = frequencies.iter().find(|&&f| f > cutoff) {
            warnings.push(ModelWarning::PlaneWaveCutoff {
                element: self.index,
                cutoff_frequency: cutoff,
                first_frequency: first,
            });
        }

        let invalid: Vec<f64> = match self.element_type {
            AcousticElementType::WideDuct => frequencies
                .iter()
                .copied()
                .filter(|&f| radius * (2.0 * PI * f / nu).sqrt() <= WIDE_DUCT_MIN_STOKES)
                .collect(),
            AcousticElementType::Howe => {
                let u_star = self.friction_velocity(control)?;
                if u_star > 0.0 {
                    frequencies
                        .iter()
                        .copied()
                        .filter(|&f| 2.0 * PI * f * nu / (u_star * u_star) < HOWE_MIN_OMEGA_PLUS)
                        .collect()
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        };
        if let (Some(&min), Some(&max)) = (invalid.first(), invalid.last()) {
            warnings.push(ModelWarning::DampingModelRange {
                element: self.index,
                model: self.element_type.name().to_string(),
                min_frequency: min,
                max_frequency: max,
            });
        }

        Ok(Admittance { values, warnings })
    }

    /// Acoustic FE stiffness and mass coefficients for the lossless modal problem
    ///
    /// Returns ([k11, k12, k21, k22], [m11, m12, m21, m22]) in the pressure
    /// formulation K·p = ω²·M·p.
    pub fn modal_matrices(&self, length: f64) -> FemResult<([f64; 4], [f64; 4])> {
        let fluid = self.fluid()?;
        let area = self.area()?;
        let k = area / (fluid.density * length);
        let m = area * length / fluid.bulk_modulus();
        Ok(([k, -k, -k, k], [m / 3.0, m / 6.0, m / 6.0, m / 3.0]))
    }
}

/// Two-port admittance of a uniform duct with convected waves
pub fn transmission_admittance(wave: &WaveParameters, area: f64, length: f64) -> [Complex64; 4] {
    let a = (-J * wave.k_plus * length).exp();
    let b = (J * wave.k_minus * length).exp();
    let factor = area / (wave.impedance * (a - b));
    let diag = -(a + b) * factor;
    [diag, 2.0 * factor, 2.0 * a * b * factor, diag]
}

/// Acoustic admittance of a radiating open end
///
/// `area` is the duct area, `radius` the duct radius and `k` the free-field
/// wavenumber. The acoustic impedance is (ρc/S)·(R + jX).
pub fn radiation_admittance(
    kind: RadiationImpedance,
    fluid: &Fluid,
    area: f64,
    radius: f64,
    k: f64,
) -> Complex64 {
    let ka = k * radius;
    let (r, x) = match kind {
        RadiationImpedance::Anechoic => (1.0, 0.0),
        RadiationImpedance::Unflanged if ka < 1.0 => (ka * ka / 4.0, 0.6133 * ka),
        RadiationImpedance::Flanged if ka < 1.0 => (ka * ka / 2.0, 8.0 * ka / (3.0 * PI)),
        RadiationImpedance::Unflanged | RadiationImpedance::Flanged => {
            let z = 2.0 * ka;
            let amplitude = (2.0 / (PI * z)).sqrt();
            let phase = z - 3.0 * PI / 4.0;
            let (scale, reactance) = match kind {
                RadiationImpedance::Flanged => (1.0, 2.0 / PI),
                _ => (0.5, 1.0 / PI),
            };
            (
                1.0 - scale * amplitude * phase.cos() / ka,
                (reactance + scale * amplitude * phase.sin()) / ka,
            )
        }
    };
    let impedance = Complex64::new(r, x) * fluid.impedance() / area;
    1.0 / impedance
}

/// Admittance of a specific (wall) impedance acting on a duct of area `area`
pub fn specific_impedance_admittance(area: f64, specific_impedance: Complex64) -> Complex64 {
    if specific_impedance.norm() == 0.0 {
        return Complex64::new(0.0, 0.0);
    }
    area / specific_impedance
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn duct(element_type: AcousticElementType) -> AcousticElement {
        AcousticElement::new(1, 1, 2)
            .with_type(element_type)
            .with_fluid(Arc::new(Fluid::air()))
            .with_cross_section(Arc::new(CrossSection::pipe(0.1, 0.005)))
    }

    fn control() -> IterationControl {
        IterationControl::default()
    }

    #[test]
    fn test_undamped_matches_transmission_line() {
        let element = duct(AcousticElementType::Undamped);
        let fluid = Fluid::air();
        let area = element.area().unwrap();
        let length = 0.7;
        let omega = 2.0 * PI * 180.0;
        let y = element.admittance_at(omega, length, &control()).unwrap();

        let kl = omega / fluid.speed_of_sound * length;
        let factor = J * area / (fluid.impedance() * kl.sin());
        let expected = [-factor * kl.cos(), factor, factor, -factor * kl.cos()];
        for i in 0..4 {
            assert_relative_eq!(y[i].re, expected[i].re, epsilon = 1e-12);
            assert_relative_eq!(y[i].im, expected[i].im, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_damping_models_attenuate() {
        let omega = 2.0 * PI * 300.0;
        for element_type in [
            AcousticElementType::Proportional { loss_factor: 0.02 },
            AcousticElementType::WideDuct,
            AcousticElementType::LrfFluidEquivalent,
            AcousticElementType::LrfFull,
        ] {
            let wave = duct(element_type).wave_parameters(omega, &control()).unwrap();
            assert!(wave.k_plus.im < 0.0, "{:?}", element_type);
            assert!(wave.k_plus.re > 0.0, "{:?}", element_type);
        }
    }

    #[test]
    fn test_lrf_forms_agree() {
        let omega = 2.0 * PI * 250.0;
        let a = duct(AcousticElementType::LrfFluidEquivalent)
            .wave_parameters(omega, &control())
            .unwrap();
        let b = duct(AcousticElementType::LrfFull)
            .wave_parameters(omega, &control())
            .unwrap();
        assert!((a.k_plus - b.k_plus).norm() < 1e-9 * a.k_plus.norm());
        assert!((a.impedance - b.impedance).norm() < 1e-9 * a.impedance.norm());
    }

    #[test]
    fn test_lrf_approaches_wide_duct() {
        // Large Stokes number: both boundary-layer models coincide to first order
        let omega = 2.0 * PI * 2000.0;
        let lrf = duct(AcousticElementType::LrfFluidEquivalent)
            .wave_parameters(omega, &control())
            .unwrap();
        let wide = duct(AcousticElementType::WideDuct)
            .wave_parameters(omega, &control())
            .unwrap();
        assert!((lrf.k_plus - wide.k_plus).norm() < 1e-3 * wide.k_plus.norm());
    }

    #[test]
    fn test_mean_flow_splits_wavenumbers() {
        let element = duct(AcousticElementType::UndampedMeanFlow).with_mean_velocity(34.321);
        let omega = 2.0 * PI * 100.0;
        let wave = element.wave_parameters(omega, &control()).unwrap();
        let k0 = omega / 343.21;
        assert_relative_eq!(wave.k_plus.re, k0 / 1.1, max_relative = 1e-12);
        assert_relative_eq!(wave.k_minus.re, k0 / 0.9, max_relative = 1e-12);

        // Non-symmetric admittance with flow
        let y = element.admittance_at(omega, 0.5, &control()).unwrap();
        assert!((y[1] - y[2]).norm() > 1e-9);
    }

    #[test]
    fn test_friction_factor_regimes() {
        let laminar = duct(AcousticElementType::Howe).with_mean_velocity(0.01);
        let f = laminar.friction_factor(&control()).unwrap();
        let re = 0.01 * 0.09 / Fluid::air().kinematic_viscosity();
        assert_relative_eq!(f, 64.0 / re, max_relative = 1e-12);

        let turbulent = duct(AcousticElementType::Peters).with_mean_velocity(20.0);
        let f = turbulent.friction_factor(&control()).unwrap();
        // Smooth pipe at Re ~ 1.2e5
        assert!(f > 0.015 && f < 0.02, "f = {}", f);
    }

    #[test]
    fn test_wide_duct_warns_at_low_frequency() {
        let element = duct(AcousticElementType::WideDuct);
        let result = element.admittance(&[0.01, 0.02, 500.0], 1.0, &control()).unwrap();
        assert!(result.warnings.iter().any(|w| matches!(
            w,
            ModelWarning::DampingModelRange { max_frequency, .. } if *max_frequency == 0.02
        )));
    }

    #[test]
    fn test_plane_wave_cutoff_warning() {
        let element = duct(AcousticElementType::Undamped);
        let cutoff = element.cutoff_frequency().unwrap();
        let result = element.admittance(&[100.0, cutoff + 1.0], 1.0, &control()).unwrap();
        assert!(matches!(result.warnings[0], ModelWarning::PlaneWaveCutoff { .. }));
    }

    #[test]
    fn test_radiation_limits() {
        let air = Fluid::air();
        let radius = 0.05;
        let area = PI * radius * radius;
        let scale = area / air.impedance();

        // Low ka flanged: Z = (ρc/S)·((ka)²/2 + j·8ka/3π)
        let ka: f64 = 0.2;
        let y = radiation_admittance(RadiationImpedance::Flanged, &air, area, radius, ka / radius);
        let expected = scale / Complex64::new(ka * ka / 2.0, 8.0 * ka / (3.0 * PI));
        assert_relative_eq!(y.re, expected.re, max_relative = 1e-12);
        assert_relative_eq!(y.im, expected.im, max_relative = 1e-12);

        // High ka: both ends tend to the plane-wave impedance
        for kind in [RadiationImpedance::Flanged, RadiationImpedance::Unflanged] {
            let y = radiation_admittance(kind, &air, area, radius, 200.0 / radius);
            assert!((y / scale - 1.0).norm() < 0.02);
        }

        let anechoic = radiation_admittance(RadiationImpedance::Anechoic, &air, area, radius, 3.0);
        assert_relative_eq!(anechoic.re, area / air.impedance(), max_relative = 1e-12);
    }
}
