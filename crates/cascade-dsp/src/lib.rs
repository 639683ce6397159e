//! Cascade DSP - filter design and evaluation primitives

pub mod biquad;
pub mod design;
pub mod iir;
pub mod math;

pub use biquad::{BiquadConfig, BiquadFilter, BiquadNormalize, BiquadType};
pub use design::{Coefficients, DesignError, DesignResult};
pub use iir::{sine_scan, IirFilter};
