//! Fast scalar math approximations for the DSP hot paths.
//!
//! These trade full IEEE 754 precision for speed. Each function documents
//! its clamp range and maximum error; the test suite sweeps every function
//! against `libm` to hold those bounds.
//!
//! | Function | Replaces | Max relative error |
//! |----------|----------|--------------------|
//! | [`fast_exp`] | `libm::expf` | < 2e-3 |
//! | [`fast_log`] | `libm::logf` | < 1e-4 (absolute, in log domain) |
//! | [`fast_sin`] / [`fast_cos`] | `libm::sinf` / `cosf` | < 1e-4 (absolute) |
//! | [`fast_tanh`] | `libm::tanhf` | < 5e-3 |
//! | [`fast_sigmoid`] | `1/(1+e^-x)` | < 5e-3 |
//! | [`fast_gelu`] | GELU (tanh form) | < 5e-3 |
//! | [`fast_sqrt`] / [`fast_inv_sqrt`] | `libm::sqrtf` | < 1e-4 |
//!
//! Saturation is part of the contract: `fast_exp` saturates at ±88,
//! `fast_sigmoid` clamps beyond ±10, `fast_tanh` beyond ±5. NaN inputs
//! propagate as NaN.

use std::f32::consts::{FRAC_PI_2, LN_2, LOG2_E, TAU};
use std::sync::LazyLock;

/// Input magnitude beyond which [`fast_exp`] saturates.
pub const EXP_CLAMP: f32 = 88.0;
/// Input magnitude beyond which [`fast_sigmoid`] returns exactly 0 or 1.
pub const SIGMOID_CLAMP: f32 = 10.0;
/// Input magnitude beyond which [`fast_tanh`] returns exactly ±1.
pub const TANH_CLAMP: f32 = 5.0;

const SIN_TABLE_SIZE: usize = 1024;

// One extra entry so interpolation at the wrap point needs no modulo.
static SIN_TABLE: LazyLock<[f32; SIN_TABLE_SIZE + 1]> = LazyLock::new(|| {
    let mut table = [0.0f32; SIN_TABLE_SIZE + 1];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = libm::sin(i as f64 * (std::f64::consts::TAU / SIN_TABLE_SIZE as f64)) as f32;
    }
    table
});

/// Fast `e^x` via `2^(x·log₂e)`.
///
/// The integer part of the base-2 exponent is assembled directly into the
/// IEEE 754 exponent field; the fractional part uses a 4-term polynomial.
/// Saturates at ±[`EXP_CLAMP`].
#[inline]
pub fn fast_exp(x: f32) -> f32 {
    if x.is_nan() {
        return x;
    }
    // The lower clamp keeps the assembled exponent in normal-float range.
    let t = (x.clamp(-EXP_CLAMP, EXP_CLAMP) * LOG2_E).max(-126.0);
    let i = t.floor();
    let f = t - i;
    // 4-term polynomial for 2^f, f in [0, 1). Coefficients sum to 1 so
    // the approximation is exact (and continuous) at both endpoints;
    // max relative error ~2e-4 in between.
    let p = 1.0 + f * (0.695_976 + f * (0.224_494 + f * 0.079_530));
    // 2^i via exponent-field assembly.
    f32::from_bits(((i as i32 + 127) as u32) << 23) * p
}

/// Fast natural logarithm via bit-extracted mantissa.
///
/// Decomposes `x = 2^e · m` with `m ∈ [1, 2)` from the float bits, then
/// evaluates a 4-term odd polynomial in `z = (m−1)/(m+1)`.
/// Returns NaN for `x < 0` and −∞-like saturation (`-103.28`) for
/// `x <= 0` subnormal-or-zero inputs.
#[inline]
pub fn fast_log(x: f32) -> f32 {
    if x.is_nan() || x < 0.0 {
        return f32::NAN;
    }
    if x == 0.0 {
        // ln(smallest normal) region; callers treat this as -inf-ish.
        return -103.28;
    }
    let bits = x.to_bits();
    let e = ((bits >> 23) & 0xFF) as i32 - 127;
    let m = f32::from_bits((bits & 0x007F_FFFF) | 0x3F80_0000);
    // ln(m) = 2·(z + z³/3 + z⁵/5 + z⁷/7), z = (m−1)/(m+1), |z| < 1/3.
    let z = (m - 1.0) / (m + 1.0);
    let z2 = z * z;
    let ln_m = 2.0 * z * (1.0 + z2 * (1.0 / 3.0 + z2 * (0.2 + z2 * (1.0 / 7.0))));
    e as f32 * LN_2 + ln_m
}

/// Fast sine via a 1024-entry unit-circle table with linear interpolation.
///
/// Accepts any finite angle in radians; the phase wraps internally.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    if !x.is_finite() {
        return f32::NAN;
    }
    let turns = x * (1.0 / TAU);
    let frac = turns - turns.floor();
    let pos = frac * SIN_TABLE_SIZE as f32;
    let idx = pos as usize; // in [0, 1023] since frac < 1
    let t = pos - idx as f32;
    let table = &*SIN_TABLE;
    table[idx] + (table[idx + 1] - table[idx]) * t
}

/// Fast cosine as `sin(x + π/2)`.
#[inline]
pub fn fast_cos(x: f32) -> f32 {
    fast_sin(x + FRAC_PI_2)
}

/// Fast hyperbolic tangent composed from [`fast_exp`].
///
/// Clamps beyond ±[`TANH_CLAMP`] to exactly ±1.
#[inline]
pub fn fast_tanh(x: f32) -> f32 {
    if x.is_nan() {
        return x;
    }
    if x >= TANH_CLAMP {
        return 1.0;
    }
    if x <= -TANH_CLAMP {
        return -1.0;
    }
    let e2x = fast_exp(2.0 * x);
    (e2x - 1.0) / (e2x + 1.0)
}

/// Fast logistic sigmoid composed from [`fast_exp`].
///
/// Clamps beyond ±[`SIGMOID_CLAMP`] to exactly 0 or 1.
#[inline]
pub fn fast_sigmoid(x: f32) -> f32 {
    if x.is_nan() {
        return x;
    }
    if x >= SIGMOID_CLAMP {
        return 1.0;
    }
    if x <= -SIGMOID_CLAMP {
        return 0.0;
    }
    1.0 / (1.0 + fast_exp(-x))
}

/// Fast GELU (tanh formulation) composed from [`fast_tanh`].
#[inline]
pub fn fast_gelu(x: f32) -> f32 {
    // sqrt(2/pi)
    const C: f32 = 0.797_884_6;
    0.5 * x * (1.0 + fast_tanh(C * (x + 0.044_715 * x * x * x)))
}

/// Fast inverse square root: magic-constant seed plus two Newton steps.
///
/// Returns +∞ for 0 and NaN for negative input, matching `1/sqrt(x)`.
#[inline]
pub fn fast_inv_sqrt(x: f32) -> f32 {
    if x < 0.0 {
        return f32::NAN;
    }
    if x == 0.0 {
        return f32::INFINITY;
    }
    let half = 0.5 * x;
    let mut y = f32::from_bits(0x5F37_59DF - (x.to_bits() >> 1));
    y *= 1.5 - half * y * y;
    y *= 1.5 - half * y * y;
    y
}

/// Fast square root as `x · inv_sqrt(x)`.
#[inline]
pub fn fast_sqrt(x: f32) -> f32 {
    if x <= 0.0 {
        return if x == 0.0 { 0.0 } else { f32::NAN };
    }
    x * fast_inv_sqrt(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_accuracy_sweep() {
        let mut max_rel: f32 = 0.0;
        for i in -800..=800 {
            let x = i as f32 * 0.025; // [-20, 20]
            let exact = libm::expf(x);
            let approx = fast_exp(x);
            let rel = (approx - exact).abs() / exact;
            max_rel = max_rel.max(rel);
        }
        assert!(max_rel < 2e-3, "max rel error {max_rel:.6}");
    }

    #[test]
    fn exp_saturates() {
        assert!((fast_exp(100.0) - fast_exp(88.0)).abs() < f32::EPSILON);
        assert!(fast_exp(-100.0) > 0.0);
        assert!(fast_exp(-100.0) < 1e-37);
        assert!(fast_exp(f32::NAN).is_nan());
    }

    #[test]
    fn log_accuracy_sweep() {
        let mut max_abs: f32 = 0.0;
        for i in 1..=10_000 {
            let x = i as f32 * 0.01; // (0, 100]
            let exact = libm::logf(x);
            let approx = fast_log(x);
            max_abs = max_abs.max((approx - exact).abs());
        }
        assert!(max_abs < 1e-4, "max abs error {max_abs:.6}");
    }

    #[test]
    fn log_edge_cases() {
        assert!(fast_log(-1.0).is_nan());
        assert!(fast_log(0.0) < -100.0);
        assert!(fast_log(f32::NAN).is_nan());
    }

    #[test]
    fn exp_log_roundtrip() {
        // |exp(log(x)) − x| / x <= 5e-3 over twelve decades.
        let mut x = 1e-6f32;
        while x <= 1e6 {
            let rt = fast_exp(fast_log(x));
            let rel = (rt - x).abs() / x;
            assert!(rel <= 5e-3, "roundtrip failed at {x}: {rt} (rel {rel})");
            x *= 1.7;
        }
        // |log(exp(x)) − x| <= 5e-3 on [-20, 20].
        for i in -200..=200 {
            let x = i as f32 * 0.1;
            let rt = fast_log(fast_exp(x));
            assert!((rt - x).abs() <= 5e-3, "log(exp({x})) = {rt}");
        }
    }

    #[test]
    fn sin_cos_accuracy() {
        let mut max_err: f32 = 0.0;
        for i in -2000..=2000 {
            let x = i as f32 * 0.01;
            max_err = max_err.max((fast_sin(x) - libm::sinf(x)).abs());
            max_err = max_err.max((fast_cos(x) - libm::cosf(x)).abs());
        }
        assert!(max_err < 1e-4, "max abs error {max_err:.6}");
    }

    #[test]
    fn tanh_clamps_and_accuracy() {
        assert_eq!(fast_tanh(6.0), 1.0);
        assert_eq!(fast_tanh(-6.0), -1.0);
        for i in -50..=50 {
            let x = i as f32 * 0.1;
            let rel_floor = libm::tanhf(x).abs().max(1e-3);
            let err = (fast_tanh(x) - libm::tanhf(x)).abs() / rel_floor;
            assert!(err < 5e-3, "tanh({x}) rel err {err}");
        }
    }

    #[test]
    fn sigmoid_clamps_and_accuracy() {
        assert_eq!(fast_sigmoid(11.0), 1.0);
        assert_eq!(fast_sigmoid(-11.0), 0.0);
        for i in -100..=100 {
            let x = i as f32 * 0.1;
            let exact = 1.0 / (1.0 + libm::expf(-x));
            assert!((fast_sigmoid(x) - exact).abs() < 5e-3);
        }
    }

    #[test]
    fn gelu_matches_reference() {
        for i in -50..=50 {
            let x = i as f32 * 0.1;
            let c = libm::sqrtf(2.0 / std::f32::consts::PI);
            let exact = 0.5 * x * (1.0 + libm::tanhf(c * (x + 0.044_715 * x * x * x)));
            assert!((fast_gelu(x) - exact).abs() < 5e-3 * x.abs().max(1.0));
        }
    }

    #[test]
    fn sqrt_accuracy() {
        for i in 1..=10_000 {
            let x = i as f32 * 0.37;
            let exact = libm::sqrtf(x);
            let rel = (fast_sqrt(x) - exact).abs() / exact;
            assert!(rel < 1e-4, "sqrt({x}) rel err {rel}");
        }
        assert_eq!(fast_sqrt(0.0), 0.0);
        assert!(fast_sqrt(-1.0).is_nan());
        assert!(fast_inv_sqrt(0.0).is_infinite());
    }
}
