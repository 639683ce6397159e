//! The data handle contract: one uniform, seekable, float-sample view over
//! any audio source.
//!
//! A [`DataHandle`] is a cheap clone-able reference to a shared handle
//! object; the last clone dropping destroys it. Independently of that, the
//! handle is open-counted: `open` prepares decode state and publishes the
//! stream shape, nested opens are free, and the resources are torn down by
//! the close matching the first open. Offsets and counts are in units of
//! interleaved *values* (`sample_index * n_channels + channel`). Reads may
//! come back short; the caller retries with an adjusted offset. A read at
//! or past the end yields 0, which is not an error.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use log::warn;

use crate::error::{StreamError, StreamResult};

/// Free-form string metadata carried by an open handle (loop points,
/// oscillator frequency hints and the like).
pub type Xinfos = BTreeMap<String, String>;

/// Numeric xinfo lookup; absent or malformed entries read as `None`.
pub fn xinfo_float(xinfos: &Xinfos, key: &str) -> Option<f64> {
    xinfos.get(key)?.parse().ok()
}

/// Stream shape published by a successful open.
#[derive(Debug, Clone)]
pub struct HandleSetup {
    /// Total number of interleaved values.
    pub n_values: u64,
    pub n_channels: u32,
    /// Resolution of the source material, informational.
    pub bit_depth: u32,
    /// Sampling frequency in Hz.
    pub mix_freq: f64,
    /// Whether reads are expensive enough to warrant caching by the caller.
    pub needs_cache: bool,
    pub xinfos: Xinfos,
}

/// What a concrete handle kind must provide. Lifecycle bookkeeping lives in
/// [`DataHandle`]; implementations only see balanced open/close pairs and
/// reads that are pre-clamped to `0..n_values`.
pub trait HandleImpl: Send {
    fn open(&mut self) -> StreamResult<HandleSetup>;

    /// Write decoded values starting at `value_offset` into `out`, returning
    /// how many were produced. Short counts are fine; 0 means nothing could
    /// be produced at this offset.
    fn read(&mut self, setup: &HandleSetup, value_offset: u64, out: &mut [f32])
        -> StreamResult<usize>;

    fn close(&mut self);

    /// Extra trailing samples needed to drain internal state (filter or
    /// resampler tails). 0 for plain sources.
    fn state_length(&self) -> u64 {
        0
    }
}

struct HandleState {
    open_count: u32,
    setup: Option<HandleSetup>,
    imp: Box<dyn HandleImpl>,
}

impl Drop for HandleState {
    fn drop(&mut self) {
        if self.open_count > 0 {
            warn!("data handle destroyed while still open ({}x)", self.open_count);
            self.imp.close();
        }
    }
}

/// Shared reference to a data handle. Clones refer to the same handle;
/// dropping the last clone destroys it.
#[derive(Clone)]
pub struct DataHandle {
    name: Arc<str>,
    state: Arc<Mutex<HandleState>>,
}

impl DataHandle {
    pub fn new(name: impl Into<String>, imp: Box<dyn HandleImpl>) -> DataHandle {
        DataHandle {
            name: Arc::from(name.into()),
            state: Arc::new(Mutex::new(HandleState {
                open_count: 0,
                setup: None,
                imp,
            })),
        }
    }

    /// Display name, the file path for file-backed handles.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Prepare the handle for reading. Nested opens only bump a counter;
    /// the stream shape is fixed by the first one.
    pub fn open(&self) -> StreamResult<()> {
        let mut st = self.lock();
        if st.open_count == 0 {
            let setup = st.imp.open()?;
            if setup.n_values < 1 || setup.n_channels < 1 {
                st.imp.close();
                return Err(StreamError::NoData);
            }
            st.setup = Some(setup);
        }
        st.open_count += 1;
        Ok(())
    }

    /// Balance one `open`. The close matching the first open releases
    /// decode state and buffers.
    pub fn close(&self) {
        let mut st = self.lock();
        if st.open_count == 0 {
            warn!("close on unopened data handle {}", self.name);
            return;
        }
        st.open_count -= 1;
        if st.open_count == 0 {
            st.imp.close();
            st.setup = None;
        }
    }

    /// Read up to `out.len()` values starting at `value_offset`. Returns the
    /// number of values written: possibly fewer than requested, and 0 at or
    /// past the end of the stream.
    pub fn read(&self, value_offset: u64, out: &mut [f32]) -> StreamResult<usize> {
        let st = &mut *self.lock();
        let setup = st.setup.as_ref().ok_or(StreamError::NotOpen)?;
        if value_offset >= setup.n_values {
            return Ok(0);
        }
        let n = out.len().min((setup.n_values - value_offset) as usize);
        if n == 0 {
            return Ok(0);
        }
        st.imp.read(setup, value_offset, &mut out[..n])
    }

    /// Total interleaved values, 0 while closed.
    pub fn n_values(&self) -> u64 {
        self.lock().setup.as_ref().map_or(0, |s| s.n_values)
    }

    /// Channel count, 0 while closed.
    pub fn n_channels(&self) -> u32 {
        self.lock().setup.as_ref().map_or(0, |s| s.n_channels)
    }

    /// Sampling frequency in Hz, 0.0 while closed.
    pub fn mix_freq(&self) -> f64 {
        self.lock().setup.as_ref().map_or(0.0, |s| s.mix_freq)
    }

    /// Source resolution in bits, 0 while closed.
    pub fn bit_depth(&self) -> u32 {
        self.lock().setup.as_ref().map_or(0, |s| s.bit_depth)
    }

    pub fn needs_cache(&self) -> bool {
        self.lock().setup.as_ref().map_or(false, |s| s.needs_cache)
    }

    /// Extra trailing samples needed to drain internal state; 0 while closed.
    pub fn state_length(&self) -> u64 {
        let st = self.lock();
        if st.setup.is_some() {
            st.imp.state_length()
        } else {
            0
        }
    }

    /// Metadata snapshot, empty while closed.
    pub fn xinfos(&self) -> Xinfos {
        self.lock().setup.as_ref().map_or_else(Xinfos::new, |s| s.xinfos.clone())
    }
}

/// In-memory source, mostly useful as a leaf for derived handles and tests.
pub struct MemHandle {
    n_channels: u32,
    mix_freq: f64,
    bit_depth: u32,
    values: Arc<[f32]>,
}

impl MemHandle {
    /// Wrap an interleaved value buffer in a handle. A trailing partial
    /// frame is ignored.
    pub fn new(
        values: impl Into<Arc<[f32]>>,
        n_channels: u32,
        mix_freq: f64,
        bit_depth: u32,
    ) -> StreamResult<DataHandle> {
        let values: Arc<[f32]> = values.into();
        if n_channels < 1 || values.len() < n_channels as usize {
            return Err(StreamError::UnsupportedLayout(format!(
                "{} values cannot form a whole {n_channels}-channel frame",
                values.len()
            )));
        }
        if !(mix_freq > 0.0) {
            return Err(StreamError::UnsupportedLayout(format!(
                "invalid mix freq {mix_freq}"
            )));
        }
        Ok(DataHandle::new(
            "mem",
            Box::new(MemHandle {
                n_channels,
                mix_freq,
                bit_depth,
                values,
            }),
        ))
    }
}

impl HandleImpl for MemHandle {
    fn open(&mut self) -> StreamResult<HandleSetup> {
        let whole_frames = self.values.len() / self.n_channels as usize;
        Ok(HandleSetup {
            n_values: (whole_frames * self.n_channels as usize) as u64,
            n_channels: self.n_channels,
            bit_depth: self.bit_depth,
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
        let offset = value_offset as usize;
        let n = out.len().min(self.values.len() - offset);
        out[..n].copy_from_slice(&self.values[offset..offset + n]);
        Ok(n)
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn open_is_counted_and_idempotent() {
        let dh = MemHandle::new(ramp(8), 2, 44100.0, 32).unwrap();
        assert_eq!(dh.n_values(), 0);
        dh.open().unwrap();
        dh.open().unwrap();
        assert_eq!(dh.n_values(), 8);
        assert_eq!(dh.n_channels(), 2);
        dh.close();
        assert_eq!(dh.n_values(), 8, "stays open for the nested opener");
        dh.close();
        assert_eq!(dh.n_values(), 0);
    }

    #[test]
    fn read_clamps_to_stream_end() {
        let dh = MemHandle::new(ramp(10), 1, 8000.0, 32).unwrap();
        dh.open().unwrap();
        let mut buf = [0.0f32; 8];
        assert_eq!(dh.read(6, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[6.0, 7.0, 8.0, 9.0]);
        assert_eq!(buf[4], 0.0, "untouched past the short read");
        assert_eq!(dh.read(10, &mut buf).unwrap(), 0);
        assert_eq!(dh.read(9999, &mut buf).unwrap(), 0);
        dh.close();
    }

    #[test]
    fn read_requires_open() {
        let dh = MemHandle::new(ramp(4), 1, 8000.0, 32).unwrap();
        let mut buf = [0.0f32; 4];
        assert!(matches!(dh.read(0, &mut buf), Err(StreamError::NotOpen)));
    }

    #[test]
    fn clones_share_the_handle() {
        let dh = MemHandle::new(ramp(4), 1, 8000.0, 32).unwrap();
        let other = dh.clone();
        dh.open().unwrap();
        assert_eq!(other.n_values(), 4, "clone sees the open state");
        other.close();
        assert_eq!(dh.n_values(), 0);
    }

    #[test]
    fn partial_trailing_frame_is_dropped() {
        let dh = MemHandle::new(ramp(5), 2, 44100.0, 32).unwrap();
        dh.open().unwrap();
        assert_eq!(dh.n_values(), 4);
        dh.close();
    }

    #[test]
    fn rejects_unusable_layouts() {
        assert!(MemHandle::new(ramp(0), 1, 44100.0, 32).is_err());
        assert!(MemHandle::new(ramp(1), 2, 44100.0, 32).is_err());
        assert!(MemHandle::new(ramp(4), 1, 0.0, 32).is_err());
        assert!(MemHandle::new(ramp(4), 0, 44100.0, 32).is_err());
    }

    #[test]
    fn xinfo_float_parses_entries() {
        let mut x = Xinfos::new();
        x.insert("osc-freq".into(), "440.5".into());
        x.insert("label".into(), "kick".into());
        assert_eq!(xinfo_float(&x, "osc-freq"), Some(440.5));
        assert_eq!(xinfo_float(&x, "label"), None);
        assert_eq!(xinfo_float(&x, "missing"), None);
    }
}
