//! Headerless PCM file handle.
//!
//! The loader layer tells us the sample format, channel count and rate; the
//! handle maps value offsets onto byte offsets through the file pool and
//! converts samples to float on the fly. A byte offset plus an optional
//! value-count limit allow viewing a PCM region embedded in a container.

use std::path::{Path, PathBuf};

use crate::error::{StreamError, StreamResult};
use crate::handle::{DataHandle, HandleImpl, HandleSetup, Xinfos};
use crate::pool::PooledFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int8,
    Int16,
    Float32,
}

impl SampleFormat {
    pub fn byte_width(self) -> u64 {
        match self {
            SampleFormat::Int8 => 1,
            SampleFormat::Int16 => 2,
            SampleFormat::Float32 => 4,
        }
    }

    pub fn bit_depth(self) -> u32 {
        match self {
            SampleFormat::Int8 => 8,
            SampleFormat::Int16 => 16,
            SampleFormat::Float32 => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

pub struct RawHandle {
    path: PathBuf,
    format: SampleFormat,
    byte_order: ByteOrder,
    n_channels: u32,
    mix_freq: f64,
    byte_offset: u64,
    max_values: Option<u64>,
    file: Option<PooledFile>,
}

impl RawHandle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: &Path,
        format: SampleFormat,
        byte_order: ByteOrder,
        n_channels: u32,
        mix_freq: f64,
        byte_offset: u64,
        max_values: Option<u64>,
    ) -> StreamResult<DataHandle> {
        if n_channels < 1 {
            return Err(StreamError::UnsupportedLayout(
                "raw stream needs at least one channel".into(),
            ));
        }
        if !(mix_freq > 0.0) {
            return Err(StreamError::UnsupportedLayout(format!(
                "invalid mix freq {mix_freq}"
            )));
        }
        Ok(DataHandle::new(
            path.to_string_lossy().into_owned(),
            Box::new(RawHandle {
                path: path.to_path_buf(),
                format,
                byte_order,
                n_channels,
                mix_freq,
                byte_offset,
                max_values,
                file: None,
            }),
        ))
    }

    fn convert(&self, bytes: &[u8], out: &mut [f32]) -> usize {
        let width = self.format.byte_width() as usize;
        let n = bytes.len() / width;
        match self.format {
            SampleFormat::Int8 => {
                for (v, &b) in out.iter_mut().zip(bytes.iter()) {
                    *v = (b as i8) as f32 * (1.0 / 128.0);
                }
            }
            SampleFormat::Int16 => {
                for (v, c) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                    let raw = match self.byte_order {
                        ByteOrder::LittleEndian => i16::from_le_bytes([c[0], c[1]]),
                        ByteOrder::BigEndian => i16::from_be_bytes([c[0], c[1]]),
                    };
                    *v = raw as f32 * (1.0 / 32768.0);
                }
            }
            SampleFormat::Float32 => {
                for (v, c) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                    let raw = [c[0], c[1], c[2], c[3]];
                    *v = match self.byte_order {
                        ByteOrder::LittleEndian => f32::from_le_bytes(raw),
                        ByteOrder::BigEndian => f32::from_be_bytes(raw),
                    };
                }
            }
        }
        n
    }
}

impl HandleImpl for RawHandle {
    fn open(&mut self) -> StreamResult<HandleSetup> {
        let file = PooledFile::open(&self.path)?;
        let width = self.format.byte_width();
        let payload = file.len().saturating_sub(self.byte_offset);
        let mut n_values = payload / width;
        if let Some(max) = self.max_values {
            n_values = n_values.min(max);
        }
        // trailing partial frames are not addressable
        n_values -= n_values % self.n_channels as u64;
        self.file = Some(file);
        Ok(HandleSetup {
            n_values,
            n_channels: self.n_channels,
            bit_depth: self.format.bit_depth(),
            mix_freq: self.mix_freq,
            needs_cache: false,
            xinfos: Xinfos::new(),
        })
    }

    fn read(
        &mut self,
        _setup: &HandleSetup,
        value_offset: u64,
        out: &mut [f32],
    ) -> StreamResult<usize> {
        let file = self.file.as_ref().ok_or(StreamError::NotOpen)?;
        let width = self.format.byte_width();
        let byte_offset = self.byte_offset + value_offset * width;
        let mut bytes = vec![0u8; out.len() * width as usize];
        let got = file.pread(byte_offset, &mut bytes)?;
        // drop a trailing partial sample, the caller retries
        let whole = got - got % width as usize;
        Ok(self.convert(&bytes[..whole], out))
    }

    fn close(&mut self) {
        self.file = None;
    }
}
