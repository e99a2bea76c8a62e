//! Analysis options and the structural/acoustic solvers

mod acoustic;
mod linear;
mod structural;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{FemError, FemResult};
use crate::results::{FrequencyFailure, SolveReport};

pub use acoustic::AcousticSolver;
pub use linear::LinearSolver;
pub use structural::StructuralSolver;

/// Type of analysis to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AnalysisType {
    /// Linear static analysis at ω = 0
    Static,
    /// Natural frequencies and mode shapes
    Modal,
    /// Frequency response by one complex solve per frequency
    #[default]
    DirectHarmonic,
    /// Frequency response projected on a truncated modal basis
    ModeSuperposition,
}

impl AnalysisType {
    pub fn needs_frequencies(&self) -> bool {
        matches!(self, Self::DirectHarmonic | Self::ModeSuperposition)
    }

    pub fn needs_modes(&self) -> bool {
        matches!(self, Self::Modal | Self::ModeSuperposition)
    }
}

/// Global proportional damping coefficients
///
/// The damping term added to the dynamic stiffness is
/// j·(βH·K + αH·M) + jω·(βV·K + αV·M).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalDamping {
    pub alpha_h: f64,
    pub beta_h: f64,
    pub alpha_v: f64,
    pub beta_v: f64,
}

impl GlobalDamping {
    pub fn new(alpha_h: f64, beta_h: f64, alpha_v: f64, beta_v: f64) -> Self {
        Self {
            alpha_h,
            beta_h,
            alpha_v,
            beta_v,
        }
    }

    /// Viscous Rayleigh damping C = αV·M + βV·K
    pub fn rayleigh(alpha_v: f64, beta_v: f64) -> Self {
        Self::new(0.0, 0.0, alpha_v, beta_v)
    }

    /// Hysteretic (structural) loss factor η applied to the stiffness
    pub fn hysteretic(loss_factor: f64) -> Self {
        Self::new(0.0, loss_factor, 0.0, 0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.alpha_h == 0.0 && self.beta_h == 0.0 && self.alpha_v == 0.0 && self.beta_v == 0.0
    }

    /// Imaginary coefficients (on K, on M) at angular frequency ω
    pub fn coefficients(&self, omega: f64) -> (f64, f64) {
        (
            self.beta_h + omega * self.beta_v,
            self.alpha_h + omega * self.alpha_v,
        )
    }
}

/// Iteration cap and relative tolerance for fixed-point loops
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationControl {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for IterationControl {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            tolerance: 1e-6,
        }
    }
}

/// Linear solver used per frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SolverBackend {
    /// Dense LU below the threshold, profile LU above it
    #[default]
    Auto,
    Dense,
    Skyline,
}

/// Options for structural and acoustic analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub analysis_type: AnalysisType,
    /// Frequencies in Hz
    pub frequencies: Vec<f64>,
    pub damping: GlobalDamping,
    /// Number of modes to calculate
    pub num_modes: usize,
    /// Eigenvalue shift σ; the modes nearest to it are returned
    pub shift: f64,
    pub backend: SolverBackend,
    /// Largest free DOF count solved densely by `SolverBackend::Auto`
    pub dense_threshold: usize,
    /// Perforated plate fixed point and friction factor root find
    pub iteration: IterationControl,
    /// Gravity vector for self-weight in static analysis
    pub gravity: Option<[f64; 3]>,
    /// Add geometric stiffness from a static pre-solution
    pub geometric_stiffening: bool,
    /// Checked before each frequency; set to stop a running sweep
    #[serde(skip)]
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            analysis_type: AnalysisType::DirectHarmonic,
            frequencies: Vec::new(),
            damping: GlobalDamping::default(),
            num_modes: 12,
            shift: -1.0,
            backend: SolverBackend::Auto,
            dense_threshold: 1200,
            iteration: IterationControl::default(),
            gravity: None,
            geometric_stiffening: false,
            cancel: None,
        }
    }
}

impl AnalysisOptions {
    /// Options for static analysis
    pub fn static_analysis() -> Self {
        Self {
            analysis_type: AnalysisType::Static,
            ..Self::default()
        }
    }

    /// Options for modal analysis
    pub fn modal(num_modes: usize) -> Self {
        Self {
            analysis_type: AnalysisType::Modal,
            num_modes,
            ..Self::default()
        }
    }

    /// Options for direct harmonic analysis
    pub fn direct_harmonic(frequencies: Vec<f64>) -> Self {
        Self {
            analysis_type: AnalysisType::DirectHarmonic,
            frequencies,
            ..Self::default()
        }
    }

    /// Options for mode superposition harmonic analysis
    pub fn mode_superposition(frequencies: Vec<f64>, num_modes: usize) -> Self {
        Self {
            analysis_type: AnalysisType::ModeSuperposition,
            frequencies,
            num_modes,
            ..Self::default()
        }
    }

    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> FemResult<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json(&self) -> FemResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Uniformly spaced frequencies from `start` to `stop` with step `step`
    pub fn with_frequency_range(mut self, start: f64, stop: f64, step: f64) -> Self {
        self.frequencies.clear();
        if step > 0.0 {
            let count = ((stop - start) / step + 1e-9).floor().max(0.0) as usize;
            self.frequencies = (0..=count).map(|i| start + i as f64 * step).collect();
        }
        self
    }

    pub fn with_damping(mut self, damping: GlobalDamping) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_shift(mut self, shift: f64) -> Self {
        self.shift = shift;
        self
    }

    pub fn with_backend(mut self, backend: SolverBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_iteration(mut self, iteration: IterationControl) -> Self {
        self.iteration = iteration;
        self
    }

    /// Include self-weight with standard gravity along −Z
    pub fn with_self_weight(self) -> Self {
        self.with_gravity([0.0, 0.0, -9.81])
    }

    pub fn with_gravity(mut self, gravity: [f64; 3]) -> Self {
        self.gravity = Some(gravity);
        self
    }

    pub fn with_geometric_stiffening(mut self) -> Self {
        self.geometric_stiffening = true;
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Check the options before any assembly
    pub fn validate(&self) -> FemResult<()> {
        if self.analysis_type.needs_frequencies() && self.frequencies.is_empty() {
            return Err(FemError::Configuration(
                "harmonic analysis requires at least one frequency".to_string(),
            ));
        }
        if let Some(f) = self.frequencies.iter().find(|f| !f.is_finite() || **f < 0.0) {
            return Err(FemError::Configuration(format!("invalid frequency {}", f)));
        }
        if self.analysis_type.needs_modes() && self.num_modes == 0 {
            return Err(FemError::Configuration(
                "modal analysis requires at least one mode".to_string(),
            ));
        }
        if self.iteration.max_iterations == 0 || !(self.iteration.tolerance > 0.0) {
            return Err(FemError::Configuration(
                "iteration control requires a positive cap and tolerance".to_string(),
            ));
        }
        Ok(())
    }
}

// ========================
// Frequency sweep
// ========================

/// Result of one frequency of a sweep
pub(crate) enum FrequencyOutcome {
    Solved(DVector<Complex64>),
    Failed(String),
    Cancelled,
}

/// Solve every frequency index, in parallel across the frequency axis
#[cfg(feature = "parallel")]
pub(crate) fn sweep<R, F>(count: usize, solve: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Sync + Send,
{
    (0..count).into_par_iter().map(solve).collect()
}

#[cfg(not(feature = "parallel"))]
pub(crate) fn sweep<R, F>(count: usize, solve: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + Sync + Send,
{
    (0..count).map(solve).collect()
}

/// Response matrix with one column per frequency
///
/// Failed and cancelled frequencies keep a zero column and are listed in the
/// report.
pub(crate) fn collect_sweep(
    outcomes: Vec<FrequencyOutcome>,
    frequencies: &[f64],
    rows: usize,
    report: &mut SolveReport,
) -> DMatrix<Complex64> {
    let mut response = DMatrix::from_element(rows, frequencies.len(), Complex64::new(0.0, 0.0));
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            FrequencyOutcome::Solved(column) => response.set_column(index, &column),
            FrequencyOutcome::Failed(reason) => {
                log::warn!("{:.3} Hz: {}", frequencies[index], reason);
                report.failures.push(FrequencyFailure {
                    index,
                    frequency: frequencies[index],
                    reason,
                });
            }
            FrequencyOutcome::Cancelled => report.cancelled.push(index),
        }
    }
    if !report.cancelled.is_empty() {
        log::info!("Sweep cancelled, {} frequencies skipped", report.cancelled.len());
    }
    response
}
