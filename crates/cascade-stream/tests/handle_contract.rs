//! End-to-end checks of the handle contract across a chain of handles:
//! a raw PCM file on disk, wrapped by a derived FIR handle.

use std::io::Write;

use cascade_stream::{
    ByteOrder, DataHandle, FirHandle, FirMode, MemHandle, RawHandle, SampleFormat, StreamError,
};

/// Stereo 44.1 kHz file with 10000 values of 16-bit PCM holding a ramp.
fn ramp_file() -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    let mut bytes = Vec::with_capacity(20000);
    for i in 0..10000i64 {
        let v = ((i % 2000) - 1000) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    f.write_all(&bytes).unwrap();
    f.flush().unwrap();
    f
}

fn read_exact(dh: &DataHandle, mut offset: u64, want: usize) -> Vec<f32> {
    let mut buf = vec![0.0f32; want];
    let mut got = 0;
    while got < want {
        let n = dh.read(offset, &mut buf[got..]).unwrap();
        assert!(n > 0, "unexpected end of data at {offset}");
        got += n;
        offset += n as u64;
    }
    buf
}

#[test]
fn fir_over_raw_keeps_shape_and_clips_at_end() {
    let f = ramp_file();
    let raw = RawHandle::new(
        f.path(),
        SampleFormat::Int16,
        ByteOrder::LittleEndian,
        2,
        44100.0,
        0,
        None,
    )
    .unwrap();
    let lp = FirHandle::new(raw, FirMode::Lowpass, 8, 1000.0);
    lp.open().unwrap();

    assert_eq!(lp.n_values(), 10000);
    assert_eq!(lp.n_channels(), 2);
    assert_eq!(lp.mix_freq(), 44100.0);
    assert!(lp.state_length() >= 4);

    // a read near the end is clamped to the remaining values
    let mut buf = [7.0f32; 8];
    let n = lp.read(9996, &mut buf).unwrap();
    assert_eq!(n, 4);
    assert_eq!(&buf[4..], &[7.0; 4], "past-end slots must stay untouched");

    // at the end, reads return zero without error
    assert_eq!(lp.read(10000, &mut buf).unwrap(), 0);
    assert_eq!(lp.read(10400, &mut buf).unwrap(), 0);

    lp.close();
}

#[test]
fn reads_are_position_independent() {
    let f = ramp_file();
    let raw = RawHandle::new(
        f.path(),
        SampleFormat::Int16,
        ByteOrder::LittleEndian,
        2,
        44100.0,
        0,
        None,
    )
    .unwrap();
    let lp = FirHandle::new(raw, FirMode::Lowpass, 16, 4000.0);
    lp.open().unwrap();

    // sequential pass
    let forward = read_exact(&lp, 0, 10000);

    // random offsets against the same open handle
    for &offset in &[0u64, 1, 777, 4096, 5001, 9000, 9990] {
        let window = read_exact(&lp, offset, 10.min(10000 - offset as usize));
        for (k, v) in window.iter().enumerate() {
            assert_eq!(
                *v,
                forward[offset as usize + k],
                "value {k} after offset {offset} differs from sequential read"
            );
        }
    }
    lp.close();
}

#[test]
fn open_close_counting_survives_clones() {
    let values: Vec<f32> = (0..64).map(|i| i as f32 / 64.0).collect();
    let dh = MemHandle::new(values, 2, 48000.0, 32).unwrap();
    let other = dh.clone();

    dh.open().unwrap();
    other.open().unwrap();
    other.close();
    // still open through the first reference
    let mut buf = [0.0f32; 4];
    assert_eq!(dh.read(0, &mut buf).unwrap(), 4);
    dh.close();
    assert!(matches!(dh.read(0, &mut buf), Err(StreamError::NotOpen)));
}

#[test]
fn reopening_yields_identical_data() {
    let f = ramp_file();
    let raw = RawHandle::new(
        f.path(),
        SampleFormat::Int16,
        ByteOrder::LittleEndian,
        2,
        44100.0,
        0,
        None,
    )
    .unwrap();

    raw.open().unwrap();
    let first = read_exact(&raw, 2500, 100);
    raw.close();

    raw.open().unwrap();
    let second = read_exact(&raw, 2500, 100);
    raw.close();
    assert_eq!(first, second);
}

#[test]
fn byte_offset_and_limit_shape_the_view() {
    let f = ramp_file();
    // skip the first 500 values, expose the next 3000
    let raw = RawHandle::new(
        f.path(),
        SampleFormat::Int16,
        ByteOrder::LittleEndian,
        2,
        44100.0,
        1000,
        Some(3000),
    )
    .unwrap();
    raw.open().unwrap();
    assert_eq!(raw.n_values(), 3000);

    let head = read_exact(&raw, 0, 2);
    assert_eq!(head[0], ((500 % 2000) - 1000) as f32 / 32768.0);
    raw.close();
}
