//! Ogg/Vorbis decode handle.
//!
//! Vorbis decodes in variable-size blocks, so like the MPEG handle this one
//! keeps a pcm window of the last decoded packet and serves fine-grained
//! reads out of it, repositioning the container reader only when a read
//! lands outside the window plus a read-ahead allowance.
//!
//! A handle can address a byte range within a larger file, which is how
//! multi-stream containers embed individual Vorbis streams.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_VORBIS};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{StreamError, StreamResult};
use crate::handle::{DataHandle, HandleImpl, HandleSetup, Xinfos};
use crate::pool::PooledFile;

/// A pooled file exposed to the container reader as a plain seekable
/// stream, optionally windowed to a byte range.
struct RangedSource {
    file: PooledFile,
    start: u64,
    len: u64,
    pos: u64,
}

impl RangedSource {
    fn open(path: &Path, byte_offset: u64, byte_length: Option<u64>) -> StreamResult<Self> {
        let file = PooledFile::open(path)?;
        let avail = file.len().saturating_sub(byte_offset);
        let len = byte_length.map_or(avail, |l| l.min(avail));
        Ok(RangedSource {
            file,
            start: byte_offset,
            len,
            pos: 0,
        })
    }
}

impl Read for RangedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = (self.len - self.pos.min(self.len)) as usize;
        let want = buf.len().min(left);
        if want == 0 {
            return Ok(0);
        }
        let n = self.file.pread(self.start + self.pos, &mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RangedSource {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let pos = match target {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(delta) => self.len as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before byte range start",
            ));
        }
        self.pos = (pos as u64).min(self.len);
        Ok(self.pos)
    }
}

impl MediaSource for RangedSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.len)
    }
}

struct VorbisStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

pub struct VorbisHandle {
    path: PathBuf,
    byte_offset: u64,
    byte_length: Option<u64>,

    n_channels: u64,
    sample_rate: u32,
    max_block_size: u64,

    /// Total samples per channel; survives close together with the
    /// fingerprint, so reopening an unchanged file skips the packet scan.
    total_samples: u64,
    fingerprint: Option<(SystemTime, u64)>,

    stream: Option<VorbisStream>,
    pcm: Vec<f32>,
    pcm_pos: u64,
    pcm_len: u64,
}

impl VorbisHandle {
    pub fn new(path: &Path) -> DataHandle {
        Self::with_byte_range(path, 0, None)
    }

    /// Decode the Vorbis stream found at `byte_offset..byte_offset + len`
    /// of `path`.
    pub fn with_byte_range(path: &Path, byte_offset: u64, byte_length: Option<u64>) -> DataHandle {
        DataHandle::new(
            path.to_string_lossy().into_owned(),
            Box::new(VorbisHandle {
                path: path.to_path_buf(),
                byte_offset,
                byte_length,
                n_channels: 0,
                sample_rate: 0,
                max_block_size: 0,
                total_samples: 0,
                fingerprint: None,
                stream: None,
                pcm: Vec::new(),
                pcm_pos: 0,
                pcm_len: 0,
            }),
        )
    }

    fn open_stream(&self) -> StreamResult<VorbisStream> {
        let source = RangedSource::open(&self.path, self.byte_offset, self.byte_length)?;
        let mss = MediaSourceStream::new(Box::new(source), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("ogg");
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|_| StreamError::NoHeader(self.path.clone()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec == CODEC_TYPE_VORBIS)
            .ok_or_else(|| StreamError::NoHeader(self.path.clone()))?;
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(StreamError::from)?;
        Ok(VorbisStream {
            reader,
            decoder,
            track_id,
        })
    }

    /// Walk every packet once to find the stream length and the largest
    /// packet duration, then rewind.
    fn scan_stream(&mut self, stream: &mut VorbisStream) -> StreamResult<()> {
        let mut total = 0u64;
        let mut max_dur = 0u64;
        loop {
            match stream.reader.next_packet() {
                Ok(packet) => {
                    if packet.track_id() != stream.track_id {
                        continue;
                    }
                    total = total.max(packet.ts() + packet.dur());
                    max_dur = max_dur.max(packet.dur());
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(StreamError::from(e)),
            }
        }
        self.total_samples = total;
        self.max_block_size = max_dur.max(64);

        stream
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: 0,
                    track_id: stream.track_id,
                },
            )
            .map_err(StreamError::from)?;
        stream.decoder.reset();
        Ok(())
    }

    /// Reposition so that decoding forward reaches `pos` (sample per
    /// channel) quickly.
    fn coarse_seek(&mut self, pos: u64) -> StreamResult<()> {
        let read_ahead = self.max_block_size * 8;
        if pos >= self.pcm_pos && pos < self.pcm_pos + self.pcm_len + read_ahead {
            return Ok(());
        }
        let stream = self.stream.as_mut().ok_or(StreamError::NotOpen)?;
        let seeked = stream
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: pos,
                    track_id: stream.track_id,
                },
            )
            .map_err(|_| StreamError::SeekFailed(pos))?;
        stream.decoder.reset();
        self.pcm_pos = seeked.actual_ts;
        self.pcm_len = 0;
        debug!("seek to sample {pos} landed at {}", seeked.actual_ts);
        Ok(())
    }

    /// Decode the next packet into the pcm window. Corrupt packets turn
    /// into silence of their nominal duration.
    fn decode_next(&mut self) -> StreamResult<()> {
        let stream = self.stream.as_mut().ok_or(StreamError::NotOpen)?;
        loop {
            let packet = stream.reader.next_packet().map_err(StreamError::from)?;
            if packet.track_id() != stream.track_id {
                continue;
            }
            self.pcm_pos = packet.ts();
            match stream.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut sbuf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sbuf.copy_interleaved_ref(decoded);
                    let samples = sbuf.samples();
                    if samples.is_empty() {
                        // priming packet after a reset, no audio yet
                        continue;
                    }
                    self.pcm.clear();
                    self.pcm
                        .extend(samples.iter().map(|s| s.clamp(-1.0, 1.0)));
                    self.pcm_len = (samples.len() as u64) / self.n_channels;
                }
                Err(e) => {
                    warn!(
                        "{}: packet at sample {} failed to decode, left silent: {e}",
                        self.path.display(),
                        packet.ts()
                    );
                    // dur can be zero on header packets, keep the loop moving
                    let dur = packet.dur().max(1);
                    self.pcm.clear();
                    self.pcm.resize((dur * self.n_channels) as usize, 0.0);
                    self.pcm_len = dur;
                }
            }
            return Ok(());
        }
    }
}

impl HandleImpl for VorbisHandle {
    fn open(&mut self) -> StreamResult<HandleSetup> {
        let mut stream = self.open_stream()?;
        let params = stream
            .reader
            .tracks()
            .iter()
            .find(|t| t.id == stream.track_id)
            .map(|t| t.codec_params.clone())
            .ok_or_else(|| StreamError::NoHeader(self.path.clone()))?;
        let n_channels = params
            .channels
            .map(|c| c.count() as u64)
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                StreamError::UnsupportedLayout("stream without channel map".into())
            })?;
        let sample_rate = params
            .sample_rate
            .filter(|&r| r > 0)
            .ok_or_else(|| StreamError::UnsupportedLayout("stream without rate".into()))?;

        let file_fingerprint = {
            let file = PooledFile::open(&self.path)?;
            (file.mtime(), file.len())
        };
        if self.fingerprint != Some(file_fingerprint) || self.total_samples == 0 {
            self.scan_stream(&mut stream)?;
            self.fingerprint = Some(file_fingerprint);
            debug!("vorbis stream holds {} samples", self.total_samples);
        }
        if self.total_samples == 0 {
            return Err(StreamError::NoData);
        }

        self.n_channels = n_channels;
        self.sample_rate = sample_rate;
        self.stream = Some(stream);
        self.pcm = Vec::new();
        self.pcm_pos = 0;
        self.pcm_len = 0;

        Ok(HandleSetup {
            n_values: self.total_samples * n_channels,
            n_channels: n_channels as u32,
            bit_depth: 24,
            mix_freq: sample_rate as f64,
            needs_cache: true,
            xinfos: Xinfos::new(),
        })
    }

    fn read(
        &mut self,
        _setup: &HandleSetup,
        value_offset: u64,
        out: &mut [f32],
    ) -> StreamResult<usize> {
        let pos = value_offset / self.n_channels;
        self.coarse_seek(pos)?;
        while pos >= self.pcm_pos + self.pcm_len {
            self.decode_next()?;
        }
        if pos < self.pcm_pos {
            // the decoder overshot; land exactly with a tighter seek
            return Err(StreamError::SeekFailed(pos));
        }

        let offset = ((pos - self.pcm_pos) * self.n_channels
            + value_offset % self.n_channels) as usize;
        let avail = (self.pcm_len * self.n_channels) as usize - offset;
        let n = out.len().min(avail);
        out[..n].copy_from_slice(&self.pcm[offset..offset + n]);
        Ok(n)
    }

    fn close(&mut self) {
        self.stream = None;
        self.pcm = Vec::new();
        self.pcm_pos = 0;
        self.pcm_len = 0;
        // total_samples and fingerprint survive for cheap reopens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn source_over(
        bytes: &[u8],
        offset: u64,
        len: Option<u64>,
    ) -> (tempfile::NamedTempFile, RangedSource) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        let src = RangedSource::open(f.path(), offset, len).unwrap();
        (f, src)
    }

    #[test]
    fn ranged_source_windows_reads() {
        let bytes: Vec<u8> = (0..100).collect();
        let (_f, mut src) = source_over(&bytes, 10, Some(20));
        assert_eq!(src.byte_len(), Some(20));

        let mut buf = [0u8; 8];
        assert_eq!(src.read(&mut buf).unwrap(), 8);
        assert_eq!(buf, [10, 11, 12, 13, 14, 15, 16, 17]);

        // reads stop at the window end, not the file end
        src.seek(SeekFrom::Start(16)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(src.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[26, 27, 28, 29]);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn ranged_source_seeks_clamp_to_window() {
        let bytes: Vec<u8> = (0..50).collect();
        let (_f, mut src) = source_over(&bytes, 5, Some(30));
        assert_eq!(src.seek(SeekFrom::End(-10)).unwrap(), 20);
        assert_eq!(src.seek(SeekFrom::Current(5)).unwrap(), 25);
        assert_eq!(src.seek(SeekFrom::Start(99)).unwrap(), 30);
        assert!(src.seek(SeekFrom::Current(-31)).is_err());
    }

    #[test]
    fn open_rejects_streams_without_vorbis_data() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let junk: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
        f.write_all(&junk).unwrap();
        f.flush().unwrap();

        let dh = VorbisHandle::new(f.path());
        assert!(matches!(dh.open(), Err(StreamError::NoHeader(_))));
        // the failed open leaves the handle closed and reusable
        assert_eq!(dh.n_values(), 0);
        assert!(matches!(dh.open(), Err(StreamError::NoHeader(_))));
    }

    #[test]
    fn ranged_source_without_length_runs_to_eof() {
        let bytes: Vec<u8> = (0..40).collect();
        let (_f, mut src) = source_over(&bytes, 32, None);
        let mut buf = [0u8; 16];
        assert_eq!(src.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf[..8], &[32, 33, 34, 35, 36, 37, 38, 39]);
    }
}
