//! Complex Bessel function ratios for thermoviscous duct models
//!
//! Only the ratio J2(x)/J0(x) is needed. Along the arguments used by the
//! low-reduced-frequency models (x = j^{3/2}·s) both functions grow like
//! e^{|Im x|}, so the ratio is evaluated from the power series for moderate
//! arguments and from the Hankel asymptotic expansion beyond.

use num_complex::Complex64;

/// |x| above which the asymptotic expansion replaces the power series
const SERIES_LIMIT: f64 = 25.0;
/// |x| above which the ratio is taken as its limiting value -1
const ASYMPTOTE_LIMIT: f64 = 1.0e8;
const MAX_TERMS: usize = 200;

/// Bessel function of the first kind J_n(x) from its power series
pub fn bessel_j(order: u32, x: Complex64) -> Complex64 {
    let half = x * 0.5;
    let minus_q = -(half * half);

    // First term (x/2)^n / n!
    let mut term = Complex64::new(1.0, 0.0);
    for k in 1..=order {
        term = term * half / k as f64;
    }

    let mut sum = term;
    for k in 1..MAX_TERMS {
        term = term * minus_q / ((k as f64) * ((k as u32 + order) as f64));
        sum += term;
        if term.norm() <= 1e-17 * sum.norm() {
            break;
        }
    }
    sum
}

/// Ratio J2(x)/J0(x)
pub fn j2_over_j0(x: Complex64) -> Complex64 {
    let r = x.norm();
    if r <= SERIES_LIMIT {
        return bessel_j(2, x) / bessel_j(0, x);
    }
    if r >= ASYMPTOTE_LIMIT || !r.is_finite() {
        return Complex64::new(-1.0, 0.0);
    }
    // J2/J0 = (2/x)·J1/J0 - 1
    (2.0 / x) * j1_over_j0_asymptotic(x) - 1.0
}

/// Hankel expansion of J1/J0 for large |x| with Im(x) > 0
///
/// J_n ≈ H_n^(2)/2 there, and H_n^(2)(x) ∝ e^{-i(x - nπ/2 - π/4)}·Σ (-i)^k a_k(n)/x^k.
fn j1_over_j0_asymptotic(x: Complex64) -> Complex64 {
    let i = Complex64::new(0.0, 1.0);
    let (a1_0, a2_0) = (-1.0 / 8.0, 9.0 / 128.0);
    let (a1_1, a2_1) = (3.0 / 8.0, -15.0 / 128.0);

    let inv = 1.0 / x;
    let inv2 = inv * inv;
    let s0 = 1.0 - i * a1_0 * inv - a2_0 * inv2;
    let s1 = 1.0 - i * a1_1 * inv - a2_1 * inv2;

    if x.im >= 0.0 {
        i * s1 / s0
    } else {
        // Mirror image: J_n(conj x) = conj J_n(x)
        (i * s1.conj() / s0.conj()).conj()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_real_values() {
        // Reference values from Abramowitz & Stegun
        let j0 = bessel_j(0, Complex64::new(1.0, 0.0));
        let j1 = bessel_j(1, Complex64::new(1.0, 0.0));
        let j2 = bessel_j(2, Complex64::new(2.5, 0.0));
        assert_relative_eq!(j0.re, 0.765_197_686_557_966_6, epsilon = 1e-14);
        assert_relative_eq!(j1.re, 0.440_050_585_744_933_5, epsilon = 1e-14);
        assert_relative_eq!(j2.re, 0.446_059_058, epsilon = 1e-9);
    }

    #[test]
    fn test_ratio_continuous_at_switch() {
        let dir = Complex64::new(-1.0, 1.0) / 2.0_f64.sqrt();
        let below = j2_over_j0(dir * (SERIES_LIMIT - 1e-9));
        let above = j2_over_j0(dir * (SERIES_LIMIT + 1e-9));
        assert!((below - above).norm() < 1e-5);
    }

    #[test]
    fn test_large_argument_limit() {
        let dir = Complex64::new(-1.0, 1.0) / 2.0_f64.sqrt();
        let ratio = j2_over_j0(dir * 1.0e9);
        assert_eq!(ratio, Complex64::new(-1.0, 0.0));
        let near = j2_over_j0(dir * 1.0e5);
        assert!((near + 1.0).norm() < 1e-4);
    }
}
