//! MPEG-audio (layer I/II/III) decode handle.
//!
//! MPEG frames are only sequentially decodable: layer III carries a bit
//! reservoir across frame boundaries, so decoding a frame cold produces
//! garbage until enough prior frames have been fed through the decoder.
//! Random access is reconstructed with a coarse-seek + fine-read protocol:
//! one exhaustive forward header scan at open time records every frame's
//! byte offset, a seek then positions a few frames early and decodes the
//! warm-up frames into the void, and reads decode forward frame by frame
//! from there. The warm-up count starts at zero and escalates (bounded)
//! when a post-seek decode fails.
//!
//! The scan never touches frame payloads, only the fixed-size headers, so
//! it runs at I/O speed even for long files.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_MP3};
use symphonia::core::formats::Packet;

use crate::error::{StreamError, StreamResult};
use crate::handle::{DataHandle, HandleImpl, HandleSetup, Xinfos};
use crate::pool::PooledFile;

/// Scan buffer, roughly one second at 320 kbit.
const SCAN_BUFFER_SIZE: usize = 1024 * 44;
/// Upper bound on the warm-up frame count.
const MAX_ACCUMULATE_FRAMES: u32 = 10;
const MAX_FRAMES: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    V1,
    V2,
    V25,
}

/// One parsed MPEG-audio frame header.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(test), allow(dead_code))]
struct FrameHeader {
    version: MpegVersion,
    layer: u8,
    sample_rate: u32,
    n_channels: u32,
    /// Decoded samples per channel per frame.
    samples_per_frame: u32,
    /// Whole frame length in bytes, header included.
    frame_len: u32,
}

const BITRATES_V1: [[u32; 14]; 3] = [
    // layer I
    [32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    // layer II
    [32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    // layer III
    [32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];
const BITRATES_V2: [[u32; 14]; 3] = [
    [32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    [8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];
const SAMPLE_RATES: [[u32; 3]; 3] = [
    [44100, 48000, 32000], // V1
    [22050, 24000, 16000], // V2
    [11025, 12000, 8000],  // V2.5
];

fn parse_frame_header(b: [u8; 4]) -> Option<FrameHeader> {
    if b[0] != 0xFF || b[1] & 0xE0 != 0xE0 {
        return None;
    }
    let version = match (b[1] >> 3) & 0x3 {
        0 => MpegVersion::V25,
        2 => MpegVersion::V2,
        3 => MpegVersion::V1,
        _ => return None,
    };
    let layer = match (b[1] >> 1) & 0x3 {
        1 => 3u8,
        2 => 2,
        3 => 1,
        _ => return None,
    };
    let bitrate_index = (b[2] >> 4) & 0xF;
    if bitrate_index == 0 || bitrate_index == 15 {
        // free-format and reserved bitrates are not scannable
        return None;
    }
    let rate_index = ((b[2] >> 2) & 0x3) as usize;
    if rate_index == 3 {
        return None;
    }
    let table = match version {
        MpegVersion::V1 => &BITRATES_V1,
        _ => &BITRATES_V2,
    };
    let bitrate = table[layer as usize - 1][bitrate_index as usize - 1] * 1000;
    let sample_rate = match version {
        MpegVersion::V1 => SAMPLE_RATES[0][rate_index],
        MpegVersion::V2 => SAMPLE_RATES[1][rate_index],
        MpegVersion::V25 => SAMPLE_RATES[2][rate_index],
    };
    let padding = ((b[2] >> 1) & 0x1) as u32;
    let n_channels = if (b[3] >> 6) & 0x3 == 3 { 1 } else { 2 };

    let samples_per_frame = match (layer, version) {
        (1, _) => 384,
        (2, _) => 1152,
        (3, MpegVersion::V1) => 1152,
        (3, _) => 576,
        _ => unreachable!(),
    };
    let frame_len = match layer {
        1 => (12 * bitrate / sample_rate + padding) * 4,
        _ => samples_per_frame / 8 * bitrate / sample_rate + padding,
    };
    if frame_len <= 4 {
        return None;
    }
    Some(FrameHeader {
        version,
        layer,
        sample_rate,
        n_channels,
        samples_per_frame,
        frame_len,
    })
}

/// Chunked forward reader over a pooled file, for the header scan.
struct ScanWindow<'a> {
    file: &'a PooledFile,
    buf: Vec<u8>,
    start: u64,
    filled: usize,
}

impl<'a> ScanWindow<'a> {
    fn new(file: &'a PooledFile) -> Self {
        ScanWindow {
            file,
            buf: vec![0; SCAN_BUFFER_SIZE],
            start: 0,
            filled: 0,
        }
    }

    /// Bytes at `pos..pos + n`, or `None` past end of file. `n` must fit
    /// the buffer; headers need only a handful of bytes.
    fn get(&mut self, pos: u64, n: usize) -> StreamResult<Option<&[u8]>> {
        if pos < self.start || pos + n as u64 > self.start + self.filled as u64 {
            self.start = pos;
            self.filled = self.file.pread(pos, &mut self.buf)?;
        }
        if (self.filled as u64) < n as u64 {
            return Ok(None);
        }
        let rel = (pos - self.start) as usize;
        Ok(Some(&self.buf[rel..rel + n]))
    }
}

/// Byte length of an ID3v2 tag at the stream head, 0 if there is none.
fn id3v2_length(head: &[u8]) -> u64 {
    if head.len() >= 10 && &head[..3] == b"ID3" {
        let size = ((head[6] as u64 & 0x7F) << 21)
            | ((head[7] as u64 & 0x7F) << 14)
            | ((head[8] as u64 & 0x7F) << 7)
            | (head[9] as u64 & 0x7F);
        let footer = if head[5] & 0x10 != 0 { 10 } else { 0 };
        10 + size + footer
    } else {
        0
    }
}

struct SeekTable {
    /// (byte offset, frame length) per decodable frame.
    frames: Vec<(u64, u32)>,
    first: FrameHeader,
}

/// One exhaustive forward pass over the whole file, recording every frame
/// that matches the stream's channel layout. Sync losses resync by byte.
fn build_seek_table(file: &PooledFile, stop_after_first: bool) -> StreamResult<SeekTable> {
    let mut window = ScanWindow::new(file);
    let mut pos = 0u64;
    if let Some(head) = window.get(0, 10)? {
        pos = id3v2_length(head);
    }

    let mut frames: Vec<(u64, u32)> = Vec::new();
    let mut first: Option<FrameHeader> = None;
    while let Some(bytes) = window.get(pos, 4)? {
        let header = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match parse_frame_header(header) {
            Some(h) => {
                if let Some(f) = &first {
                    if h.n_channels != f.n_channels || h.sample_rate != f.sample_rate {
                        debug!("skipping frame at {pos}: layout differs from stream");
                        pos += 1;
                        continue;
                    }
                } else {
                    first = Some(h);
                }
                frames.push((pos, h.frame_len));
                if frames.len() > MAX_FRAMES {
                    return Err(StreamError::NoSeekInfo(format!(
                        "more than {MAX_FRAMES} frames in {}",
                        file.path().display()
                    )));
                }
                pos += h.frame_len as u64;
                if stop_after_first {
                    break;
                }
            }
            None => pos += 1,
        }
    }

    match first {
        Some(first) => Ok(SeekTable { frames, first }),
        None => Err(StreamError::NoHeader(file.path().to_path_buf())),
    }
}

pub struct MpegHandle {
    path: PathBuf,
    osc_freq: f64,
    skip_seek_table: bool,

    sample_rate: u32,
    frame_size: u64,
    n_channels: u64,
    accumulate_state_frames: u32,

    /// Survives close; invalidated when the file fingerprint changes.
    seeks: Vec<(u64, u32)>,
    seek_fingerprint: Option<(SystemTime, u64)>,

    file: Option<PooledFile>,
    decoder: Option<Box<dyn Decoder>>,
    packet_buf: Vec<u8>,

    /// Interleaved samples of the last synthesized frame.
    pcm: Vec<f32>,
    /// First sample (per channel) covered by `pcm`.
    pcm_pos: u64,
    /// Samples (per channel) in `pcm`.
    pcm_len: u64,
    /// Next frame index the decoder will consume.
    next_frame: usize,
    /// Set between a coarse seek and its first clean decode; a decode
    /// failure in that span means missing reservoir state, not corruption.
    fresh_seek: bool,
}

impl MpegHandle {
    /// Create a closed handle for an MPEG-audio file. `osc_freq` is carried
    /// as an `osc-freq` xinfo for the synthesis layer.
    pub fn new(path: &Path, osc_freq: f64) -> DataHandle {
        Self::with_options(path, osc_freq, false)
    }

    /// `skip_seek_table` trades random access for instant opens: only the
    /// first frame is scanned, and only sequential reads will work.
    pub fn with_options(path: &Path, osc_freq: f64, skip_seek_table: bool) -> DataHandle {
        DataHandle::new(
            path.to_string_lossy().into_owned(),
            Box::new(MpegHandle {
                path: path.to_path_buf(),
                osc_freq,
                skip_seek_table,
                sample_rate: 0,
                frame_size: 0,
                n_channels: 0,
                accumulate_state_frames: 0,
                seeks: Vec::new(),
                seek_fingerprint: None,
                file: None,
                decoder: None,
                packet_buf: Vec::new(),
                pcm: Vec::new(),
                pcm_pos: 0,
                pcm_len: 0,
                next_frame: 0,
                fresh_seek: false,
            }),
        )
    }

    /// Probe `path` for channel count and sampling rate without paying for
    /// the seek table scan.
    pub fn probe(path: &Path) -> StreamResult<(u32, u32)> {
        let dh = Self::with_options(path, 440.0, true);
        dh.open()?;
        let result = (dh.n_channels(), dh.mix_freq() as u32);
        dh.close();
        Ok(result)
    }

    fn seek_by_read_ahead(&self) -> u64 {
        (self.sample_rate as u64 / (self.frame_size * 2)).max(1)
    }

    /// Decode the next scheduled frame. With `synth`, its samples land in
    /// the pcm window; warm-up decodes discard them. Returns false when the
    /// decoder rejected the frame (the window then holds silence).
    fn decode_frame(&mut self, synth: bool) -> StreamResult<bool> {
        let (offset, len) = match self.seeks.get(self.next_frame) {
            Some(&f) => f,
            None => {
                return Err(StreamError::DecodeFailed(
                    "read past the last scanned frame".into(),
                ))
            }
        };
        let file = self.file.as_ref().ok_or(StreamError::NotOpen)?;
        self.packet_buf.resize(len as usize, 0);
        let got = file.pread(offset, &mut self.packet_buf)?;
        self.packet_buf.truncate(got);

        let ts = self.next_frame as u64 * self.frame_size;
        let packet = Packet::new_from_slice(0, ts, self.frame_size, &self.packet_buf);

        self.pcm_pos = ts;
        self.pcm_len = self.frame_size;
        self.next_frame += 1;
        if synth {
            self.pcm.fill(0.0);
        }

        let decoder = self.decoder.as_mut().ok_or(StreamError::NotOpen)?;
        match decoder.decode(&packet) {
            Ok(decoded) => {
                if synth {
                    let spec = *decoded.spec();
                    let mut sbuf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sbuf.copy_interleaved_ref(decoded);
                    let n = sbuf.samples().len().min(self.pcm.len());
                    self.pcm[..n].copy_from_slice(&sbuf.samples()[..n]);
                }
                self.fresh_seek = false;
                Ok(true)
            }
            Err(e) => {
                debug!("frame {} failed to decode: {e}", self.next_frame - 1);
                Ok(false)
            }
        }
    }

    /// Position the decoder so `pos` (sample per channel) is decodable,
    /// rewinding `accumulate_state_frames` extra frames to rebuild the bit
    /// reservoir.
    fn coarse_seek(&mut self, pos: u64) -> StreamResult<()> {
        let read_ahead = self.seek_by_read_ahead() * self.frame_size;
        if pos >= self.pcm_pos && pos < self.pcm_pos + self.pcm_len + read_ahead {
            return Ok(());
        }
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        let warmup = self.accumulate_state_frames as u64 * self.frame_size;
        let offs = pos
            .saturating_sub(warmup)
            .min(self.seeks.len() as u64 * self.frame_size);
        let i = (offs / self.frame_size) as usize;

        self.next_frame = i;
        self.pcm_pos = i as u64 * self.frame_size;
        self.pcm_len = 0;
        self.fresh_seek = true;

        if pos >= warmup {
            for k in 0..self.accumulate_state_frames {
                let synth = k + 1 == self.accumulate_state_frames;
                if !self.decode_frame(synth)? {
                    debug!("warm-up frame {k} failed during coarse seek");
                }
            }
        }
        Ok(())
    }
}

impl HandleImpl for MpegHandle {
    fn open(&mut self) -> StreamResult<HandleSetup> {
        let file = PooledFile::open(&self.path)?;
        let fingerprint = (file.mtime(), file.len());
        let table_valid = self.seek_fingerprint == Some(fingerprint)
            && !self.seeks.is_empty()
            && !self.skip_seek_table;

        let table = build_seek_table(&file, self.skip_seek_table || table_valid)?;
        let first = table.first;
        if !(1..=2).contains(&first.n_channels) || first.sample_rate < 4000 {
            return Err(StreamError::UnsupportedLayout(format!(
                "{} channels at {} Hz",
                first.n_channels, first.sample_rate
            )));
        }
        if !table_valid {
            self.seeks = table.frames;
            self.seek_fingerprint = Some(fingerprint);
            debug!("frames in seek table: {}", self.seeks.len());
        }
        self.sample_rate = first.sample_rate;
        self.frame_size = first.samples_per_frame as u64;
        self.n_channels = first.n_channels as u64;

        let n_values = self.seeks.len() as u64 * self.frame_size * self.n_channels;
        if n_values == 0 {
            return Err(StreamError::NoData);
        }

        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_MP3)
            .with_sample_rate(self.sample_rate);
        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(StreamError::from)?;

        self.file = Some(file);
        self.decoder = Some(decoder);
        self.pcm = vec![0.0; (self.frame_size * self.n_channels) as usize];
        self.pcm_pos = 0;
        self.pcm_len = 0;
        self.next_frame = 0;
        self.fresh_seek = false;
        self.coarse_seek(0)?;

        let mut xinfos = Xinfos::new();
        xinfos.insert("osc-freq".into(), self.osc_freq.to_string());
        Ok(HandleSetup {
            n_values,
            n_channels: self.n_channels as u32,
            bit_depth: 24,
            mix_freq: self.sample_rate as f64,
            needs_cache: true,
            xinfos,
        })
    }

    fn read(
        &mut self,
        _setup: &HandleSetup,
        value_offset: u64,
        out: &mut [f32],
    ) -> StreamResult<usize> {
        let pos = value_offset / self.n_channels;
        loop {
            let horizon =
                self.pcm_pos + self.pcm_len + self.seek_by_read_ahead() * self.frame_size;
            if pos < self.pcm_pos || pos >= horizon {
                self.coarse_seek(pos)?;
            }

            let mut frame_ok = true;
            while pos >= self.pcm_pos + self.pcm_len {
                frame_ok = self.decode_frame(true)?;
            }

            if !frame_ok {
                if self.fresh_seek && self.accumulate_state_frames < MAX_ACCUMULATE_FRAMES {
                    // inter-frame reservoir state was incomplete; rewind
                    // further and retry the whole positioning
                    self.accumulate_state_frames += 1;
                    debug!(
                        "retrying seek with accumulate_state_frames={}",
                        self.accumulate_state_frames
                    );
                    if let Some(decoder) = self.decoder.as_mut() {
                        decoder.reset();
                    }
                    self.pcm_pos = 0;
                    self.pcm_len = 0;
                    self.next_frame = 0;
                    continue;
                }
                if self.fresh_seek {
                    return Err(StreamError::DecodeFailed(format!(
                        "frame never became decodable after {} warm-up frames",
                        self.accumulate_state_frames
                    )));
                }
                // mid-stream corruption degrades to a silent frame
                warn!(
                    "{}: undecodable frame at sample {} left silent",
                    self.path.display(),
                    self.pcm_pos
                );
            }

            let offset = (value_offset - self.pcm_pos * self.n_channels) as usize;
            let avail = (self.pcm_len * self.n_channels) as usize - offset;
            let n = out.len().min(avail);
            out[..n].copy_from_slice(&self.pcm[offset..offset + n]);
            return Ok(n);
        }
    }

    fn close(&mut self) {
        self.file = None;
        self.decoder = None;
        self.pcm = Vec::new();
        self.packet_buf = Vec::new();
        self.pcm_pos = 0;
        self.pcm_len = 0;
        self.next_frame = 0;
        self.fresh_seek = false;
        // seeks and seek_fingerprint survive for cheap reopens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // MPEG1 layer III, 44100 Hz, 128 kbit, stereo
    const HDR: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
    const HDR_LEN: usize = 417; // 144 * 128000 / 44100

    fn frame_bytes() -> Vec<u8> {
        let mut f = vec![0u8; HDR_LEN];
        f[..4].copy_from_slice(&HDR);
        f
    }

    #[test]
    fn header_parser_accepts_canonical_frames() {
        let h = parse_frame_header(HDR).unwrap();
        assert_eq!(h.version, MpegVersion::V1);
        assert_eq!(h.layer, 3);
        assert_eq!(h.sample_rate, 44100);
        assert_eq!(h.n_channels, 2);
        assert_eq!(h.samples_per_frame, 1152);
        assert_eq!(h.frame_len as usize, HDR_LEN);
    }

    #[test]
    fn header_parser_rejects_reserved_fields() {
        assert!(parse_frame_header([0xFE, 0xFB, 0x90, 0x00]).is_none(), "sync");
        assert!(parse_frame_header([0xFF, 0xEB, 0x90, 0x00]).is_none(), "version");
        assert!(parse_frame_header([0xFF, 0xF9, 0x90, 0x00]).is_none(), "layer");
        assert!(parse_frame_header([0xFF, 0xFB, 0x00, 0x00]).is_none(), "free bitrate");
        assert!(parse_frame_header([0xFF, 0xFB, 0xF0, 0x00]).is_none(), "bad bitrate");
        assert!(parse_frame_header([0xFF, 0xFB, 0x9C, 0x00]).is_none(), "sample rate");
    }

    #[test]
    fn mono_mpeg2_frames_parse() {
        // MPEG2 layer III, 22050 Hz, 64 kbit, mono
        let h = parse_frame_header([0xFF, 0xF3, 0x80, 0xC0]).unwrap();
        assert_eq!(h.version, MpegVersion::V2);
        assert_eq!(h.n_channels, 1);
        assert_eq!(h.sample_rate, 22050);
        assert_eq!(h.samples_per_frame, 576);
    }

    #[test]
    fn scan_skips_id3_and_finds_all_frames() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"ID3\x04\x00\x00\x00\x00\x00\x64"); // 100-byte tag
        bytes.extend_from_slice(&[0u8; 100]);
        for _ in 0..5 {
            bytes.extend_from_slice(&frame_bytes());
        }
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        f.flush().unwrap();

        let file = PooledFile::open(f.path()).unwrap();
        let table = build_seek_table(&file, false).unwrap();
        assert_eq!(table.frames.len(), 5);
        for (i, &(offset, len)) in table.frames.iter().enumerate() {
            assert_eq!(offset, 110 + (i * HDR_LEN) as u64);
            assert_eq!(len as usize, HDR_LEN);
        }
    }

    #[test]
    fn scan_resyncs_over_garbage() {
        let mut bytes = vec![0xAAu8; 7];
        bytes.extend_from_slice(&frame_bytes());
        bytes.extend_from_slice(&[0xFF, 0x00, 0x12]); // false sync prefix
        bytes.extend_from_slice(&frame_bytes());
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        f.flush().unwrap();

        let file = PooledFile::open(f.path()).unwrap();
        let table = build_seek_table(&file, false).unwrap();
        assert_eq!(table.frames.len(), 2);
        assert_eq!(table.frames[0].0, 7);
        assert_eq!(table.frames[1].0, 7 + HDR_LEN as u64 + 3);
    }

    #[test]
    fn scan_without_frames_reports_no_header() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; 512]).unwrap();
        f.flush().unwrap();
        let file = PooledFile::open(f.path()).unwrap();
        assert!(matches!(
            build_seek_table(&file, false),
            Err(StreamError::NoHeader(_))
        ));
    }

    /// A stream of well-formed stereo headers whose payloads the decoder
    /// must reject.
    fn garbage_stream(n_frames: usize) -> tempfile::NamedTempFile {
        let mut bytes = Vec::with_capacity(n_frames * HDR_LEN);
        for i in 0..n_frames {
            let mut frame = frame_bytes();
            for (j, b) in frame[4..].iter_mut().enumerate() {
                *b = ((i * 37 + j * 11) % 127) as u8 | 1;
            }
            bytes.extend_from_slice(&frame);
        }
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn open_reports_shape_before_any_frame_decodes() {
        let f = garbage_stream(20);
        let dh = MpegHandle::new(f.path(), 440.0);
        dh.open().unwrap();
        assert_eq!(dh.n_values(), 20 * 1152 * 2);
        assert_eq!(dh.n_channels(), 2);
        assert_eq!(dh.mix_freq(), 44100.0);
        assert_eq!(dh.bit_depth(), 24);
        assert!(dh.needs_cache());
        assert_eq!(
            crate::handle::xinfo_float(&dh.xinfos(), "osc-freq"),
            Some(440.0)
        );
        dh.close();
        assert_eq!(dh.n_values(), 0);
    }

    #[test]
    fn undecodable_frames_read_as_silence() {
        let f = garbage_stream(20);
        let dh = MpegHandle::new(f.path(), 440.0);
        dh.open().unwrap();

        // sequential reads walk the frames and terminate
        let mut buf = vec![0.5f32; 2 * 1152 * 2];
        let mut off = 0u64;
        while off < buf.len() as u64 {
            let n = dh.read(off, &mut buf[off as usize..]).unwrap();
            assert!(n > 0);
            off += n as u64;
        }
        assert!(buf.iter().all(|&v| v == 0.0), "muted frames must be silent");

        // a jump into the stream, landing off the channel grid
        let mid = 15 * 1152 * 2 + 1;
        let mut buf = [0.5f32; 64];
        let n = dh.read(mid, &mut buf).unwrap();
        assert_eq!(n, 64);
        assert!(buf.iter().all(|&v| v == 0.0));

        assert_eq!(dh.read(20 * 1152 * 2, &mut buf).unwrap(), 0);
        dh.close();
    }

    #[test]
    fn far_seek_on_undecodable_stream_gives_up() {
        // far enough past the read-ahead horizon to force a coarse seek;
        // the warm-up escalation runs out and surfaces a decode error
        let f = garbage_stream(60);
        let dh = MpegHandle::new(f.path(), 440.0);
        dh.open().unwrap();
        let mut buf = [0.0f32; 64];
        let far = 45 * 1152 * 2;
        assert!(matches!(
            dh.read(far, &mut buf),
            Err(StreamError::DecodeFailed(_))
        ));
        dh.close();
    }

    #[test]
    fn frames_with_other_layout_are_skipped() {
        let mut bytes = frame_bytes();
        // a mono frame in the middle of a stereo stream
        let mut alien = vec![0u8; 208];
        alien[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0xC0]);
        bytes.extend_from_slice(&alien);
        bytes.extend_from_slice(&frame_bytes());
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        f.flush().unwrap();

        let file = PooledFile::open(f.path()).unwrap();
        let table = build_seek_table(&file, false).unwrap();
        assert_eq!(table.frames.len(), 2);
        assert_eq!(table.first.n_channels, 2);
    }
}
