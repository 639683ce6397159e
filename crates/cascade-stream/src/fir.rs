//! Derived handle filtering a wrapped source through a windowed FIR.
//!
//! The taps come from [`cascade_dsp::design::fir_approx`] against a
//! piecewise-linear low/high-pass target, computed at open time when the
//! source's mix frequency is known. Reads are served from one cached block
//! of raw source values (1024 per channel) with `order/2` samples of
//! history on each side, so any value inside the block can be convolved
//! without touching the source again; positions outside the stream read as
//! zero, so the response decays gracefully at the stream edges instead of
//! erroring.

use std::f64::consts::PI;

use cascade_dsp::design;

use crate::error::{StreamError, StreamResult};
use crate::handle::{DataHandle, HandleImpl, HandleSetup};

/// Values per channel covered by one cached block.
const BLOCK_SAMPLES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirMode {
    Lowpass,
    Highpass,
}

pub struct FirHandle {
    source: DataHandle,
    mode: FirMode,
    order: usize,
    cutoff_hz: f64,
    taps: Vec<f64>,
    n_channels: usize,
    block_values: usize,
    history: usize,
    /// Raw source values for `block_pos - history .. block_pos +
    /// block_values + history`, zero outside the stream.
    block: Vec<f32>,
    block_pos: Option<u64>,
}

impl FirHandle {
    /// Wrap `source` in a FIR filter handle. An odd `order` is rounded up;
    /// `cutoff_hz` is validated against the source rate at open time.
    pub fn new(source: DataHandle, mode: FirMode, order: usize, cutoff_hz: f64) -> DataHandle {
        let order = (order + 1) & !1;
        let name = format!("{}//fir", source.name());
        DataHandle::new(
            name,
            Box::new(FirHandle {
                source,
                mode,
                order: order.max(2),
                cutoff_hz,
                taps: Vec::new(),
                n_channels: 0,
                block_values: 0,
                history: 0,
                block: Vec::new(),
                block_pos: None,
            }),
        )
    }

    fn target_curve(&self, cutoff: f64) -> Vec<(f64, f64)> {
        // finite transition band of half an octave next to the cutoff
        match self.mode {
            FirMode::Lowpass => {
                let stop = cutoff * 1.5;
                if stop < PI {
                    vec![(0.0, 1.0), (cutoff, 1.0), (stop, 0.0), (PI, 0.0)]
                } else {
                    vec![(0.0, 1.0), (cutoff, 1.0), (PI, 0.0)]
                }
            }
            FirMode::Highpass => {
                vec![(0.0, 0.0), (cutoff / 1.5, 0.0), (cutoff, 1.0), (PI, 1.0)]
            }
        }
    }

    /// Load raw source values for the block starting at `block_pos`,
    /// including the history margins. Offsets outside `0..n_values` fill
    /// with zeros.
    fn fill_block(&mut self, block_pos: u64, n_values: u64) -> StreamResult<()> {
        let total = self.block.len();
        let start = block_pos as i64 - self.history as i64;

        let mut i = 0;
        // consecutive forward reads reuse the previous block's tail as the
        // new history head
        if let Some(prev) = self.block_pos {
            if prev + self.block_values as u64 == block_pos && total > 2 * self.history {
                self.block.copy_within(total - 2 * self.history.., 0);
                i = 2 * self.history;
            }
        }
        self.block_pos = None;

        while i < total {
            let abs = start + i as i64;
            if abs < 0 {
                self.block[i] = 0.0;
                i += 1;
                continue;
            }
            let abs = abs as u64;
            if abs >= n_values {
                self.block[i..].fill(0.0);
                break;
            }
            let want = (total - i).min((n_values - abs) as usize);
            let got = self.source.read(abs, &mut self.block[i..i + want])?;
            if got == 0 {
                return Err(StreamError::DecodeFailed(format!(
                    "source of {} returned no data at value offset {abs}",
                    self.source.name()
                )));
            }
            i += got;
        }
        self.block_pos = Some(block_pos);
        Ok(())
    }

    /// Convolve one output value at block-relative buffer index `idx`.
    #[inline]
    fn convolve(&self, idx: usize) -> f32 {
        let ch = self.n_channels;
        let center = idx + self.history; // buffer index of the input value
        let mut acc = 0.0f64;
        for (k, &t) in self.taps.iter().enumerate() {
            let j = center + (self.order / 2) * ch - k * ch;
            acc += t * self.block[j] as f64;
        }
        acc as f32
    }
}

impl HandleImpl for FirHandle {
    fn open(&mut self) -> StreamResult<HandleSetup> {
        self.source.open()?;
        let mix_freq = self.source.mix_freq();
        let cutoff = 2.0 * PI * self.cutoff_hz / mix_freq;
        if !(cutoff > 0.0 && cutoff < PI) {
            self.source.close();
            return Err(StreamError::UnsupportedLayout(format!(
                "cutoff {} Hz unusable at {mix_freq} Hz",
                self.cutoff_hz
            )));
        }
        let curve = self.target_curve(cutoff);
        let taps = match design::fir_approx(self.order, &curve, false) {
            Ok(taps) => taps,
            Err(e) => {
                self.source.close();
                return Err(e.into());
            }
        };
        self.taps = taps;
        self.n_channels = self.source.n_channels() as usize;
        self.block_values = BLOCK_SAMPLES * self.n_channels;
        self.history = (self.order / 2) * self.n_channels;
        self.block = vec![0.0; self.block_values + 2 * self.history];
        self.block_pos = None;
        Ok(HandleSetup {
            n_values: self.source.n_values(),
            n_channels: self.n_channels as u32,
            bit_depth: self.source.bit_depth(),
            mix_freq,
            needs_cache: true,
            xinfos: self.source.xinfos(),
        })
    }

    fn read(
        &mut self,
        setup: &HandleSetup,
        value_offset: u64,
        out: &mut [f32],
    ) -> StreamResult<usize> {
        let block_pos = value_offset / self.block_values as u64 * self.block_values as u64;
        if self.block_pos != Some(block_pos) {
            self.fill_block(block_pos, setup.n_values)?;
        }
        // serve only from the cached block; the caller retries across the
        // block boundary
        let end = (block_pos + self.block_values as u64).min(setup.n_values);
        let n = out.len().min((end - value_offset) as usize);
        let rel = (value_offset - block_pos) as usize;
        for (i, v) in out[..n].iter_mut().enumerate() {
            *v = self.convolve(rel + i);
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.taps = Vec::new();
        self.block = Vec::new();
        self.block_pos = None;
        self.source.close();
    }

    fn state_length(&self) -> u64 {
        self.source.state_length() + (self.order as u64) / 2
    }
}
