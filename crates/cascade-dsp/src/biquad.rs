//! Resonant second-order low/high-pass filter.
//!
//! The configuration carries a frequency and a resonance gain in dB; the
//! exact setter recomputes both intermediates with full-precision
//! transcendentals, while the approx setters trade precision for speed and
//! are meant for per-block parameter sweeps. Coefficients are only
//! recomputed by [`BiquadFilter::configure`] when the config is dirty.

use crate::math;

const SQRT2: f64 = std::f64::consts::SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadType {
    ResonantLowpass,
    ResonantHighpass,
}

/// How the resonance peak relates to unity gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadNormalize {
    /// Unity gain in the passband; the resonance rises above 1.0.
    Passband,
    /// The gain at the cutoff is scaled back to 1.0.
    ResonanceGain,
    /// The true response maximum is scaled to 1.0.
    PeakGain,
}

#[derive(Debug, Clone)]
pub struct BiquadConfig {
    kind: BiquadType,
    normalize: BiquadNormalize,
    f_fn: f64,
    gain: f64,
    k: f64,
    v: f64,
    dirty: bool,
    approx_values: bool,
}

impl BiquadConfig {
    pub fn new(kind: BiquadType, normalize: BiquadNormalize) -> Self {
        let mut c = BiquadConfig {
            kind,
            normalize,
            f_fn: 0.0,
            gain: 0.0,
            k: 0.0,
            v: 0.0,
            dirty: false,
            approx_values: false,
        };
        c.setup(0.5, 3.0);
        c.approx_values = true;
        c
    }

    /// Exact setter: `f_fn` is Nyquist-relative (0 = DC, 1 = Nyquist),
    /// `gain` is the resonance gain in dB. Out-of-range frequencies clamp.
    pub fn setup(&mut self, f_fn: f64, gain: f64) {
        let f_fn = f_fn.clamp(0.0, 1.0);
        self.f_fn = match self.kind {
            BiquadType::ResonantHighpass => 1.0 - f_fn,
            BiquadType::ResonantLowpass => f_fn,
        };
        self.gain = gain;
        self.k = (self.f_fn * std::f64::consts::PI / 2.0).tan();
        self.v = math::db_to_factor(gain);
        self.dirty = true;
        self.approx_values = false;
    }

    /// Fast-path frequency sweep setter.
    pub fn approx_freq(&mut self, f_fn: f64) {
        let f_fn = f_fn.clamp(0.0, 1.0);
        self.f_fn = match self.kind {
            BiquadType::ResonantHighpass => 1.0 - f_fn,
            BiquadType::ResonantLowpass => f_fn,
        };
        self.k = (self.f_fn * std::f64::consts::PI / 2.0).tan();
        self.dirty = true;
        self.approx_values = true;
    }

    /// Fast-path gain sweep setter, using a polynomial 2^x approximation for
    /// the dB conversion.
    pub fn approx_gain(&mut self, gain: f64) {
        self.gain = gain;
        self.v = math::approx_exp2(gain * math::LOG2_POW_1_20_OF_10);
        self.dirty = true;
        self.approx_values = true;
    }

    /// Whether the current intermediates came through an approx setter.
    pub fn is_approximate(&self) -> bool {
        self.approx_values
    }
}

/// Evaluation state plus the five canonical biquad coefficients.
#[derive(Debug, Clone, Default)]
pub struct BiquadFilter {
    xc0: f64,
    xc1: f64,
    xc2: f64,
    yc1: f64,
    yc2: f64,
    xd1: f64,
    xd2: f64,
    yd1: f64,
    yd2: f64,
}

impl BiquadFilter {
    pub fn new(config: &mut BiquadConfig) -> Self {
        let mut f = BiquadFilter::default();
        config.dirty = true;
        f.configure(config, true);
        f
    }

    /// Recompute coefficients from a dirty config; optionally clear the
    /// delay state (keep it for glitch-free parameter sweeps).
    pub fn configure(&mut self, config: &mut BiquadConfig, reset_state: bool) {
        if config.dirty {
            self.design_lowpass_resonance(config);
            if config.kind == BiquadType::ResonantHighpass {
                // mirror the lowpass response around pi/2
                self.xc1 = -self.xc1;
                self.yc1 = -self.yc1;
            }
            config.dirty = false;
        }
        if reset_state {
            self.xd1 = 0.0;
            self.xd2 = 0.0;
            self.yd1 = 0.0;
            self.yd2 = 0.0;
        }
    }

    fn design_lowpass_resonance(&mut self, c: &BiquadConfig) {
        let kk = c.k * c.k;
        let sqrt2_reso = 1.0 / c.v;
        let denominator = 1.0 + (c.k + sqrt2_reso) * c.k;

        let r2p_norm = match c.normalize {
            BiquadNormalize::Passband => kk,
            BiquadNormalize::ResonanceGain => kk * sqrt2_reso,
            BiquadNormalize::PeakGain => {
                let r2p = (SQRT2 * sqrt2_reso - 1.0) / (sqrt2_reso * sqrt2_reso - 0.5);
                if r2p > 1.0 {
                    kk * sqrt2_reso
                } else {
                    kk * r2p * sqrt2_reso
                }
            }
        };
        self.xc0 = r2p_norm / denominator;
        self.xc1 = 2.0 * self.xc0;
        self.xc2 = self.xc0;
        self.yc1 = 2.0 * (kk - 1.0) / denominator;
        self.yc2 = (1.0 + (c.k - sqrt2_reso) * c.k) / denominator;
    }

    /// Filter `x` into `y`; both slices must have equal length.
    pub fn eval(&mut self, x: &[f32], y: &mut [f32]) {
        debug_assert_eq!(x.len(), y.len());
        let (xc0, xc1, xc2) = (self.xc0, self.xc1, self.xc2);
        let (yc1, yc2) = (self.yc1, self.yc2);
        let (mut xd1, mut xd2) = (self.xd1, self.xd2);
        let (mut yd1, mut yd2) = (self.yd1, self.yd2);
        for (xv, yv) in x.iter().zip(y.iter_mut()) {
            let mut k2 = xd2 * xc2;
            let mut k1 = xd1 * xc1;
            xd2 = xd1;
            xd1 = *xv as f64;
            k2 -= yd2 * yc2;
            k1 -= yd1 * yc1;
            yd2 = yd1;
            let k0 = xd1 * xc0;
            yd1 = k2 + k1 + k0;
            *yv = yd1 as f32;
        }
        self.xd1 = xd1;
        self.xd2 = xd2;
        self.yd1 = yd1;
        self.yd2 = yd2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure(filter: &mut BiquadFilter, w: f64) -> f64 {
        // steady-state magnitude after the transient decays
        let n = 48000;
        let x: Vec<f32> = (0..n).map(|i| (w * i as f64).sin() as f32).collect();
        let mut y = vec![0.0f32; n];
        filter.eval(&x, &mut y);
        let tail = &y[n - 8192..];
        tail.iter().fold(0.0f32, |m, &v| m.max(v.abs())) as f64
    }

    #[test]
    fn passband_normalized_lowpass_has_unity_dc() {
        let mut c = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        c.setup(0.25, 6.0);
        let mut f = BiquadFilter::new(&mut c);
        let gain = measure(&mut f, 0.01);
        assert!((gain - 1.0).abs() < 1e-2, "DC gain {gain}");
    }

    #[test]
    fn resonance_normalized_cutoff_is_unity() {
        let mut c = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::ResonanceGain);
        c.setup(0.25, 12.0);
        let mut f = BiquadFilter::new(&mut c);
        let w = 0.25 * std::f64::consts::PI;
        let gain = measure(&mut f, w);
        assert!((gain - 1.0).abs() < 5e-2, "cutoff gain {gain}");
    }

    #[test]
    fn highpass_mirrors_lowpass() {
        let mut c = BiquadConfig::new(BiquadType::ResonantHighpass, BiquadNormalize::Passband);
        c.setup(0.25, 3.0);
        let mut f = BiquadFilter::new(&mut c);
        let lo = measure(&mut f, 0.01);
        f.configure(&mut c, true);
        let hi = measure(&mut f, std::f64::consts::PI * 0.98);
        assert!(lo < 0.05, "DC leak {lo}");
        assert!((hi - 1.0).abs() < 5e-2, "nyquist gain {hi}");
    }

    #[test]
    fn approx_setters_track_the_exact_ones() {
        let mut exact = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        exact.setup(0.3, 9.0);
        let mut approx = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        approx.approx_freq(0.3);
        approx.approx_gain(9.0);
        assert!(approx.is_approximate());
        assert!((exact.k - approx.k).abs() < 1e-12);
        assert!((exact.v - approx.v).abs() / exact.v < 1e-5);
    }

    #[test]
    fn configure_without_reset_keeps_state() {
        let mut c = BiquadConfig::new(BiquadType::ResonantLowpass, BiquadNormalize::Passband);
        c.setup(0.25, 6.0);
        let mut f = BiquadFilter::new(&mut c);
        let x = vec![1.0f32; 32];
        let mut y = vec![0.0f32; 32];
        f.eval(&x, &mut y);
        let (xd1, yd1) = (f.xd1, f.yd1);
        c.approx_freq(0.3);
        f.configure(&mut c, false);
        assert_eq!((f.xd1, f.yd1), (xd1, yd1));
    }
}
