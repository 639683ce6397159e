//! Analog-prototype IIR design and windowed FIR approximation.
//!
//! The IIR designs place poles (and for Chebyshev type 2, zeros) on the
//! s-plane with closed-form trigonometric formulas, map them into the
//! z-plane with the bilinear transform, expand the root sets into real
//! coefficient polynomials and normalize the gain to exactly 1.0 at DC
//! (lowpass) or Nyquist (highpass). Band filters transform two edge
//! frequencies into one lowpass prototype frequency first.
//!
//! All functions are pure; invalid specifications are rejected with a
//! [`DesignError`] instead of being clamped.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use thiserror::Error;

use crate::math;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DesignError {
    #[error("filter order {0} too small, need at least 2")]
    OrderTooSmall(usize),
    #[error("band and FIR filters require an even order, got {0}")]
    OddOrder(usize),
    #[error("frequency {0} outside the open interval (0, pi)")]
    FrequencyOutOfRange(f64),
    #[error("band edges ({0}, {1}) must satisfy 0 < low < high < pi")]
    InvalidBand(f64, f64),
    #[error("steepness {0} must exceed 1.0")]
    SteepnessTooSmall(f64),
    #[error("stopband edge {0} (cutoff * steepness) must stay below pi")]
    StopbandPastNyquist(f64),
    #[error("magnitude curve needs at least two breakpoints")]
    CurveTooShort,
}

pub type DesignResult<T> = Result<T, DesignError>;

/// Transfer function of a digital IIR filter,
/// `H(z) = (a[0] + a[1] z^-1 + …) / (b[0] + b[1] z^-1 + …)`
/// with `b[0]` normalized to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    /// Numerator (zero) coefficients, `a[0..=order]`.
    pub a: Vec<f64>,
    /// Denominator (pole) coefficients, `b[0..=order]`.
    pub b: Vec<f64>,
}

impl Coefficients {
    pub fn order(&self) -> usize {
        self.a.len() - 1
    }

    /// Transfer function magnitude at angular frequency `w` (0..pi).
    pub fn response_at(&self, w: f64) -> f64 {
        let z = Complex64::new(0.0, -w).exp();
        let eval = |c: &[f64]| {
            let mut sum = Complex64::new(0.0, 0.0);
            for &v in c.iter().rev() {
                sum = sum * z + v;
            }
            sum
        };
        (eval(&self.a) / eval(&self.b)).norm()
    }
}

/// s-plane roots and poles of a lowpass prototype, pre-mapped into z.
struct Prototype {
    roots: Vec<Complex64>,
    poles: Vec<Complex64>,
}

fn butter_prototype(order: usize, freq: f64, falloff: f64) -> Prototype {
    let n = order as f64;
    let beta_mul = PI / (2.0 * n);
    let epsilon = math::edge_falloff_to_epsilon(falloff);
    let kappa = math::freq_to_s(freq) * epsilon.powf(-1.0 / n);

    let mut poles = Vec::with_capacity(order);
    for i in 1..=order {
        let beta = ((i << 1) + order - 1) as f64 * beta_mul;
        let s = Complex64::new(kappa * beta.cos(), kappa * beta.sin());
        poles.push(math::bilinear_s2z(s));
    }
    let roots = vec![Complex64::new(-1.0, 0.0); order];
    Prototype { roots, poles }
}

/// Chebyshev polynomial T_degree(x) via the three-term recurrence.
fn chebyshev_eval(degree: usize, x: f64) -> f64 {
    if degree == 0 {
        return 1.0;
    }
    let mut td = x;
    let mut td_m_1 = 1.0;
    for _ in 1..degree {
        let td1 = 2.0 * x * td - td_m_1;
        td_m_1 = td;
        td = td1;
    }
    td
}

/// Solves `T_degree(y) = x` for y >= 1, using T_d(x) = cosh(d * acosh(x)).
fn chebyshev_inverse(degree: usize, x: f64) -> f64 {
    (x.acosh() / degree as f64).cosh()
}

fn chebyshev1_prototype(order: usize, freq: f64, falloff: f64) -> Prototype {
    let n = order as f64;
    let beta_mul = PI / (2.0 * n);
    let kappa = math::freq_to_s(freq);
    let epsilon = math::edge_falloff_to_epsilon(falloff);
    let alpha = (1.0 / epsilon).asinh() / n;

    let mut poles = Vec::with_capacity(order);
    for i in 1..=order {
        let beta = ((i << 1) + order - 1) as f64 * beta_mul;
        let s = Complex64::new(
            kappa * alpha.sinh() * beta.cos(),
            kappa * alpha.cosh() * beta.sin(),
        );
        poles.push(math::bilinear_s2z(s));
    }
    let roots = vec![Complex64::new(-1.0, 0.0); order];
    Prototype { roots, poles }
}

fn chebyshev2_prototype(order: usize, c_freq: f64, steepness: f64, falloff: f64) -> Prototype {
    let n = order as f64;
    let beta_mul = PI / (2.0 * n);
    let r_freq = c_freq * steepness;
    let kappa_c = math::freq_to_s(c_freq);
    let kappa_r = math::freq_to_s(r_freq);
    let epsilon = math::edge_falloff_to_epsilon(falloff);
    let tepsilon = epsilon * chebyshev_eval(order, kappa_r / kappa_c);
    let alpha = tepsilon.asinh() / n;

    let mut poles = Vec::with_capacity(order);
    for i in 1..=order {
        let beta = ((i << 1) + order - 1) as f64 * beta_mul;
        let s = Complex64::new(kappa_r, 0.0)
            / Complex64::new(alpha.sinh() * beta.cos(), alpha.cosh() * beta.sin());
        poles.push(math::bilinear_s2z(s));
    }

    // zeros sit on the analog jw axis; a zero degenerating to w=inf maps to z=-1
    let mut roots = Vec::with_capacity(order);
    for i in 1..=order {
        let beta = ((i << 1) - 1) as f64 * beta_mul;
        let im = beta.cos();
        if im.abs() > 1e-14 {
            let s = Complex64::new(kappa_r, 0.0) / Complex64::new(0.0, im);
            roots.push(math::bilinear_s2z(s));
        } else {
            roots.push(Complex64::new(-1.0, 0.0));
        }
    }
    Prototype { roots, poles }
}

/// Expand z-plane root/pole sets into real coefficient polynomials.
fn rp_to_z(proto: &Prototype) -> (Vec<f64>, Vec<f64>) {
    let mut poly = vec![Complex64::new(1.0, 0.0)];
    for &root in &proto.roots {
        math::cpoly_mul_reciprocal(&mut poly, root);
    }
    let a: Vec<f64> = poly.iter().map(|c| c.re).collect();

    let mut poly = vec![Complex64::new(1.0, 0.0)];
    for &pole in &proto.poles {
        math::cpoly_mul_reciprocal(&mut poly, pole);
    }
    let b: Vec<f64> = poly.iter().map(|c| c.re).collect();
    (a, b)
}

/// Mirror a lowpass response around pi/2 by flipping odd coefficient signs.
fn lp_invert(a: &mut [f64], b: &mut [f64]) {
    for i in (1..a.len()).step_by(2) {
        a[i] = -a[i];
        b[i] = -b[i];
    }
}

fn check_freq(freq: f64) -> DesignResult<()> {
    if freq > 0.0 && freq < PI {
        Ok(())
    } else {
        Err(DesignError::FrequencyOutOfRange(freq))
    }
}

fn check_order(order: usize) -> DesignResult<()> {
    if order < 2 {
        Err(DesignError::OrderTooSmall(order))
    } else {
        Ok(())
    }
}

fn check_band(order: usize, freq1: f64, freq2: f64) -> DesignResult<()> {
    check_order(order)?;
    if order & 1 != 0 {
        return Err(DesignError::OddOrder(order));
    }
    if freq1 > 0.0 && freq1 < freq2 && freq2 < PI {
        Ok(())
    } else {
        Err(DesignError::InvalidBand(freq1, freq2))
    }
}

fn check_steepness(freq: f64, steepness: f64) -> DesignResult<()> {
    if steepness <= 1.0 {
        return Err(DesignError::SteepnessTooSmall(steepness));
    }
    if freq * steepness >= PI {
        return Err(DesignError::StopbandPastNyquist(freq * steepness));
    }
    Ok(())
}

fn cotan(x: f64) -> f64 {
    -(x + PI * 0.5).tan()
}

/// Shared band-pass/band-stop expansion: each prototype root/pole becomes a
/// quadratic z factor, the DC/center gain is normalized from the prototype.
fn band_expand(
    order: usize,
    p_freq: f64,
    s_freq: f64,
    falloff: f64,
    proto: &Prototype,
    band_pass: bool,
) -> Coefficients {
    let order2 = order >> 1;
    let epsilon = math::edge_falloff_to_epsilon(falloff);
    let alpha = ((s_freq + p_freq) * 0.5).cos() / ((s_freq - p_freq) * 0.5).cos();
    let one = Complex64::new(1.0, 0.0);

    let mut f_roots = one;
    let mut f_poles = one;
    for i in 0..order2 {
        f_roots *= one - proto.roots[i].inv();
        f_poles *= one - proto.poles[i].inv();
    }
    let mut norm = (f_poles / f_roots).re;
    if order2 & 1 == 0 {
        // norm lands on the ripple minimum for even half-order
        norm *= (1.0 / (1.0 + epsilon * epsilon)).sqrt();
    }

    let alphac = Complex64::new(alpha, 0.0);
    let expand = |roots: &[Complex64], scale: Complex64| -> Vec<f64> {
        let mut poly = vec![scale];
        for &r in roots.iter().take(order2) {
            let t = if band_pass { -r } else { r };
            let quad = [-t.inv(), alphac / t - alphac, one];
            poly = math::cpoly_mul(&poly, &quad);
        }
        poly.iter().map(|c| c.re).collect()
    };

    let mut a = expand(&proto.roots, Complex64::new(norm, 0.0));
    let mut b = expand(&proto.poles, one);
    let scale = 1.0 / b[0];
    math::poly_scale(&mut a, scale);
    math::poly_scale(&mut b, scale);
    Coefficients { a, b }
}

/// Butterworth lowpass; `freq` is the cutoff (0..pi), `falloff` the gain
/// drop below 1.0 at the cutoff (0..1).
pub fn butter_lowpass(order: usize, freq: f64, falloff: f64) -> DesignResult<Coefficients> {
    check_order(order)?;
    check_freq(freq)?;
    let proto = butter_prototype(order, freq, falloff);
    let (mut a, b) = rp_to_z(&proto);
    let norm = math::poly_eval(&b, 1.0) / math::poly_eval(&a, 1.0);
    math::poly_scale(&mut a, norm);
    Ok(Coefficients { a, b })
}

/// Chebyshev type 1 lowpass with equiripple passband.
pub fn chebyshev1_lowpass(order: usize, freq: f64, falloff: f64) -> DesignResult<Coefficients> {
    check_order(order)?;
    check_freq(freq)?;
    let proto = chebyshev1_prototype(order, freq, falloff);
    let (mut a, b) = rp_to_z(&proto);
    let mut norm = math::poly_eval(&b, 1.0) / math::poly_eval(&a, 1.0);
    if order & 1 == 0 {
        // DC sits on a ripple minimum for even orders
        let epsilon = math::edge_falloff_to_epsilon(falloff);
        norm *= (1.0 / (1.0 + epsilon * epsilon)).sqrt();
    }
    math::poly_scale(&mut a, norm);
    Ok(Coefficients { a, b })
}

/// Chebyshev type 2 lowpass with equiripple stopband beginning at
/// `freq * steepness`.
pub fn chebyshev2_lowpass(
    order: usize,
    freq: f64,
    steepness: f64,
    falloff: f64,
) -> DesignResult<Coefficients> {
    check_order(order)?;
    check_freq(freq)?;
    check_steepness(freq, steepness)?;
    let proto = chebyshev2_prototype(order, freq, steepness, falloff);
    let (mut a, b) = rp_to_z(&proto);
    let norm = math::poly_eval(&b, 1.0) / math::poly_eval(&a, 1.0);
    math::poly_scale(&mut a, norm);
    Ok(Coefficients { a, b })
}

pub fn butter_highpass(order: usize, freq: f64, falloff: f64) -> DesignResult<Coefficients> {
    check_freq(freq)?;
    let mut c = butter_lowpass(order, PI - freq, falloff)?;
    lp_invert(&mut c.a, &mut c.b);
    Ok(c)
}

pub fn chebyshev1_highpass(order: usize, freq: f64, falloff: f64) -> DesignResult<Coefficients> {
    check_freq(freq)?;
    let mut c = chebyshev1_lowpass(order, PI - freq, falloff)?;
    lp_invert(&mut c.a, &mut c.b);
    Ok(c)
}

pub fn chebyshev2_highpass(
    order: usize,
    freq: f64,
    steepness: f64,
    falloff: f64,
) -> DesignResult<Coefficients> {
    check_freq(freq)?;
    let mut c = chebyshev2_lowpass(order, PI - freq, steepness, falloff)?;
    lp_invert(&mut c.a, &mut c.b);
    Ok(c)
}

/// Butterworth bandpass between `freq1` and `freq2`; `order` must be even.
pub fn butter_bandpass(
    order: usize,
    freq1: f64,
    freq2: f64,
    falloff: f64,
) -> DesignResult<Coefficients> {
    check_band(order, freq1, freq2)?;
    let theta = 2.0 * 1f64.atan2(cotan((freq2 - freq1) * 0.5));
    let proto = butter_prototype(order >> 1, theta, falloff);
    Ok(band_expand(order, freq1, freq2, falloff, &proto, true))
}

pub fn chebyshev1_bandpass(
    order: usize,
    freq1: f64,
    freq2: f64,
    falloff: f64,
) -> DesignResult<Coefficients> {
    check_band(order, freq1, freq2)?;
    let theta = 2.0 * 1f64.atan2(cotan((freq2 - freq1) * 0.5));
    let proto = chebyshev1_prototype(order >> 1, theta, falloff);
    Ok(band_expand(order, freq1, freq2, falloff, &proto, true))
}

pub fn chebyshev2_bandpass(
    order: usize,
    freq1: f64,
    freq2: f64,
    steepness: f64,
    falloff: f64,
) -> DesignResult<Coefficients> {
    check_band(order, freq1, freq2)?;
    let theta = 2.0 * 1f64.atan2(cotan((freq2 - freq1) * 0.5));
    check_steepness(theta, steepness)?;
    let proto = chebyshev2_prototype(order >> 1, theta, steepness, falloff);
    Ok(band_expand(order, freq1, freq2, falloff, &proto, true))
}

/// Butterworth bandstop between `freq1` and `freq2`; `order` must be even.
pub fn butter_bandstop(
    order: usize,
    freq1: f64,
    freq2: f64,
    falloff: f64,
) -> DesignResult<Coefficients> {
    check_band(order, freq1, freq2)?;
    let theta = 2.0 * 1f64.atan2(((freq2 - freq1) * 0.5).tan());
    let proto = butter_prototype(order >> 1, theta, falloff);
    Ok(band_expand(order, freq1, freq2, falloff, &proto, false))
}

pub fn chebyshev1_bandstop(
    order: usize,
    freq1: f64,
    freq2: f64,
    falloff: f64,
) -> DesignResult<Coefficients> {
    check_band(order, freq1, freq2)?;
    let theta = 2.0 * 1f64.atan2(((freq2 - freq1) * 0.5).tan());
    let proto = chebyshev1_prototype(order >> 1, theta, falloff);
    Ok(band_expand(order, freq1, freq2, falloff, &proto, false))
}

pub fn chebyshev2_bandstop(
    order: usize,
    freq1: f64,
    freq2: f64,
    steepness: f64,
    falloff: f64,
) -> DesignResult<Coefficients> {
    check_band(order, freq1, freq2)?;
    let theta = 2.0 * 1f64.atan2(((freq2 - freq1) * 0.5).tan());
    check_steepness(theta, steepness)?;
    let proto = chebyshev2_prototype(order >> 1, theta, steepness, falloff);
    Ok(band_expand(order, freq1, freq2, falloff, &proto, false))
}

/// Steepness parameter for a Chebyshev type 2 design from the maximum
/// stopband residue (0..1).
pub fn chebyshev2_steepness(
    order: usize,
    c_freq: f64,
    falloff: f64,
    residue: f64,
) -> DesignResult<f64> {
    check_order(order)?;
    check_freq(c_freq)?;
    let epsilon = math::edge_falloff_to_epsilon(falloff);
    let kappa_c = math::freq_to_s(c_freq);
    let kappa_r =
        chebyshev_inverse(order, (1.0 / (residue * residue) - 1.0).sqrt() / epsilon) * kappa_c;
    Ok(math::s_to_freq(kappa_r) / c_freq)
}

/// Steepness parameter from the stopband attenuation in dB (>= 0).
pub fn chebyshev2_steepness_db(
    order: usize,
    c_freq: f64,
    falloff: f64,
    stopband_db: f64,
) -> DesignResult<f64> {
    chebyshev2_steepness(order, c_freq, falloff, math::db_to_factor(-stopband_db))
}

/// Blackman window over 0..=1, zero outside.
fn blackman_window(x: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) {
        return 0.0;
    }
    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
}

/// Approximate a piecewise-linear magnitude curve with `order + 1` FIR taps.
///
/// `curve` holds (frequency, magnitude) breakpoints with frequencies rising
/// over 0..pi. The curve is sampled onto a power-of-two grid, inverse
/// transformed into the time domain and tapered with a Blackman window to
/// suppress Gibbs ringing. With `interpolate_db` the magnitude is
/// interpolated in dB (floored at -96 dB) instead of linearly.
pub fn fir_approx(order: usize, curve: &[(f64, f64)], interpolate_db: bool) -> DesignResult<Vec<f64>> {
    check_order(order)?;
    if order & 1 != 0 {
        return Err(DesignError::OddOrder(order));
    }
    if curve.len() < 2 {
        return Err(DesignError::CurveTooShort);
    }

    let mut fft_size = 8usize;
    while fft_size / 2 <= order {
        fft_size *= 2;
    }
    let ffact = 2.0 * PI / fft_size as f64;

    // sample the curve onto the half spectrum, then mirror (real spectrum)
    let mut spectrum = vec![Complex64::new(0.0, 0.0); fft_size];
    let (mut lfreq, mut lval) = (-2.0, 1.0);
    let (mut rfreq, mut rval) = (-1.0, 1.0);
    let mut point = 0;
    for i in 0..=fft_size / 2 {
        let f = i as f64 * ffact;
        while f > rfreq && point != curve.len() {
            lfreq = rfreq;
            lval = rval;
            rfreq = curve[point].0;
            rval = curve[point].1;
            point += 1;
        }
        let pos = (f - lfreq) / (rfreq - lfreq);
        let val = if interpolate_db {
            math::db_to_factor(
                math::db_from_factor(lval, -96.0) * (1.0 - pos)
                    + math::db_from_factor(rval, -96.0) * pos,
            )
        } else {
            lval * (1.0 - pos) + rval * pos
        };
        spectrum[i] = Complex64::new(val, 0.0);
        if i > 0 && i < fft_size / 2 {
            spectrum[fft_size - i] = Complex64::new(val, 0.0);
        }
    }

    let mut planner = FftPlanner::new();
    planner.plan_fft_inverse(fft_size).process(&mut spectrum);
    let scale = 1.0 / fft_size as f64;

    let mut a = vec![0.0; order + 1];
    for i in 0..=order / 2 {
        let c = spectrum[i].re * scale * blackman_window(0.5 + i as f64 / (order as f64 + 2.0));
        a[order / 2 - i] = c;
        a[order / 2 + i] = c;
    }
    Ok(a)
}
