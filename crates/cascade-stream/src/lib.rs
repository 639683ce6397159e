//! Cascade Stream - uniform random access to audio sample data.
//!
//! Every source of sample values, whether a raw PCM file, a compressed
//! stream, or a filter applied to another source, is wrapped in a
//! [`DataHandle`]: a cheaply cloneable, open-counted reference to a value
//! array that is read in chunks of interleaved `f32` frames. Reads may be
//! short; only `Ok(0)` at the end of the array means end of data.
//!
//! Decoder-backed handles ([`MpegHandle`], [`VorbisHandle`]) reconstruct
//! random access over sequential codecs with per-frame seek tables and a
//! coarse-seek/fine-read protocol. [`FirHandle`] derives a new handle by
//! running an existing one through a windowed-sinc filter designed with
//! [`cascade_dsp`].

pub mod error;
pub mod fir;
pub mod handle;
pub mod mpeg;
pub mod pool;
pub mod raw;
pub mod vorbis;

pub use error::{StreamError, StreamResult};
pub use fir::{FirHandle, FirMode};
pub use handle::{xinfo_float, DataHandle, HandleImpl, HandleSetup, MemHandle, Xinfos};
pub use mpeg::MpegHandle;
pub use pool::PooledFile;
pub use raw::{ByteOrder, RawHandle, SampleFormat};
pub use vorbis::VorbisHandle;
