//! Complex and polynomial helpers shared by the filter design routines.
//!
//! Polynomials are coefficient slices `c[0..=degree]` where `c[i]` weighs
//! `x^i`. Design math happens in `Complex64`; the final coefficient arrays
//! exposed to callers are the real parts.

use rustfft::num_complex::Complex64;

/// Bilinear transform of an analog pole/zero into the z-plane:
/// `z = (1 + s) / (1 - s)`.
pub fn bilinear_s2z(s: Complex64) -> Complex64 {
    (Complex64::new(1.0, 0.0) + s) / (Complex64::new(1.0, 0.0) - s)
}

/// Pre-warp a digital angular frequency (0..pi) onto the analog s-plane axis.
pub fn freq_to_s(w: f64) -> f64 {
    (w / 2.0).tan()
}

/// Inverse of [`freq_to_s`], mapping an analog frequency back to 0..pi.
pub fn s_to_freq(s: f64) -> f64 {
    2.0 * s.atan()
}

/// Convert a passband-edge fall-off (0..1, the drop below unity gain at the
/// cutoff) into the ripple epsilon used by the s-plane prototypes.
///
/// The design prototypes expect `1/sqrt(1 + e^2)` gain at the edge; this
/// solves that relation for `e` given the requested `1 - falloff` edge gain.
pub fn edge_falloff_to_epsilon(falloff: f64) -> f64 {
    let e2 = (1.0 - falloff) * (1.0 - falloff);
    ((1.0 - e2) / e2).sqrt()
}

/// Evaluate a real polynomial at `x` (Horner).
pub fn poly_eval(c: &[f64], x: f64) -> f64 {
    let mut sum = 0.0;
    for &v in c.iter().rev() {
        sum = sum * x + v;
    }
    sum
}

/// Scale all coefficients in place.
pub fn poly_scale(c: &mut [f64], scale: f64) {
    for v in c.iter_mut() {
        *v *= scale;
    }
}

/// Multiply the complex polynomial `c` by the reciprocal root factor
/// `(1 - root * x)`, growing its degree by one.
pub fn cpoly_mul_reciprocal(c: &mut Vec<Complex64>, root: Complex64) {
    let n = c.len();
    c.push(c[n - 1] * -root);
    for j in (1..n).rev() {
        let t = c[j - 1] * root;
        c[j] -= t;
    }
}

/// Full complex polynomial product (convolution of coefficients).
pub fn cpoly_mul(a: &[Complex64], b: &[Complex64]) -> Vec<Complex64> {
    let mut p = vec![Complex64::new(0.0, 0.0); a.len() + b.len() - 1];
    for (i, &av) in a.iter().enumerate() {
        for (j, &bv) in b.iter().enumerate() {
            p[i + j] += av * bv;
        }
    }
    p
}

/// Linear factor to decibel, clamped at `min_db` for factors at or near zero.
pub fn db_from_factor(factor: f64, min_db: f64) -> f64 {
    if factor > 0.0 {
        let db = 20.0 * factor.log10();
        db.max(min_db)
    } else {
        min_db
    }
}

/// Decibel to linear factor.
pub fn db_to_factor(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// `log2(10^(1/20))`, converts a dB value into an exponent for [`approx_exp2`].
pub const LOG2_POW_1_20_OF_10: f64 = 0.166_096_404_744_368_12;

/// Fast degree-5 approximation of `2^x` for realtime parameter sweeps.
///
/// Within -1..1 the error stays below 4.7e-6 (about 17.7 bit of sample
/// precision); it vanishes at integer exponents.
pub fn approx_exp2(ex: f64) -> f64 {
    let i = ex.round();
    let x = ex - i;
    let pot = f64::from_bits(((1023 + i as i64) as u64) << 52);
    pot * (1.0
        + x * (0.693_147_180_559_945_31
            + x * (0.240_226_506_959_100_71
                + x * (0.055_504_108_664_821_58
                    + x * (0.009_618_129_107_628_477
                        + x * 0.001_333_355_814_642_844_3)))))
}
