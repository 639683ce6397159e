//! Process-wide cache of open file descriptors.
//!
//! Many handles routinely view the same file (a waveform preview and a
//! playing voice, several FIR handles over one source). The pool hands all
//! of them one shared descriptor, keyed by (path, mtime, size) so a file
//! replaced on disk gets a fresh entry while existing readers keep the old
//! one. Lookup/insert/evict run under one pool-wide lock; each entry guards
//! its descriptor cursor with its own lock so positional reads from
//! independent handles interleave without racing on the implicit offset.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

use log::warn;

use crate::error::{StreamError, StreamResult};

#[derive(Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    path: PathBuf,
    mtime: SystemTime,
    len: u64,
}

struct SharedFile {
    key: PoolKey,
    file: Mutex<File>,
}

struct PoolSlot {
    shared: Arc<SharedFile>,
    uses: usize,
}

static POOL: OnceLock<Mutex<HashMap<PoolKey, PoolSlot>>> = OnceLock::new();

fn pool() -> &'static Mutex<HashMap<PoolKey, PoolSlot>> {
    POOL.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_pool() -> std::sync::MutexGuard<'static, HashMap<PoolKey, PoolSlot>> {
    match pool().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Use-counted view onto a pooled descriptor. Dropping the last view of an
/// entry closes the file.
pub struct PooledFile {
    shared: Arc<SharedFile>,
}

impl PooledFile {
    /// Open `path` through the pool, sharing an existing descriptor when the
    /// file is provably the same (equal path, mtime and size). A failing
    /// stat is a hard open error.
    pub fn open(path: &Path) -> StreamResult<PooledFile> {
        let meta = std::fs::metadata(path).map_err(|source| StreamError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let mtime = meta.modified().map_err(|source| StreamError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let key = PoolKey {
            path: path.to_path_buf(),
            mtime,
            len: meta.len(),
        };

        let mut entries = lock_pool();
        if let Some(slot) = entries.get_mut(&key) {
            slot.uses += 1;
            return Ok(PooledFile {
                shared: Arc::clone(&slot.shared),
            });
        }

        let file = File::open(path).map_err(|source| StreamError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let shared = Arc::new(SharedFile {
            key: key.clone(),
            file: Mutex::new(file),
        });
        entries.insert(
            key,
            PoolSlot {
                shared: Arc::clone(&shared),
                uses: 1,
            },
        );
        Ok(PooledFile { shared })
    }

    /// Positional read; seeks and reads under the entry lock so concurrent
    /// readers never clobber each other's cursor. Reads at or past the end
    /// of file return short or zero counts, never an error.
    pub fn pread(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.shared.key.len || buf.is_empty() {
            return Ok(0);
        }
        let mut file = match self.shared.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    pub fn len(&self) -> u64 {
        self.shared.key.len
    }

    pub fn is_empty(&self) -> bool {
        self.shared.key.len == 0
    }

    pub fn mtime(&self) -> SystemTime {
        self.shared.key.mtime
    }

    pub fn path(&self) -> &Path {
        &self.shared.key.path
    }
}

impl Clone for PooledFile {
    fn clone(&self) -> Self {
        let mut entries = lock_pool();
        if let Some(slot) = entries.get_mut(&self.shared.key) {
            slot.uses += 1;
        } else {
            warn!(
                "pool entry for {} vanished while still in use",
                self.shared.key.path.display()
            );
        }
        PooledFile {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for PooledFile {
    fn drop(&mut self) {
        let mut entries = lock_pool();
        if let Some(slot) = entries.get_mut(&self.shared.key) {
            slot.uses -= 1;
            if slot.uses == 0 {
                entries.remove(&self.shared.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn equivalent_opens_share_a_descriptor() {
        let f = fixture(b"0123456789");
        let a = PooledFile::open(f.path()).unwrap();
        let b = PooledFile::open(f.path()).unwrap();
        assert!(Arc::ptr_eq(&a.shared, &b.shared));
        drop(a);
        // still readable through the remaining view
        let mut buf = [0u8; 4];
        assert_eq!(b.pread(2, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"2345");
    }

    #[test]
    fn entry_is_evicted_at_last_drop() {
        let f = fixture(b"abc");
        let a = PooledFile::open(f.path()).unwrap();
        let key = a.shared.key.clone();
        drop(a);
        assert!(!lock_pool().contains_key(&key));
    }

    #[test]
    fn reads_past_eof_are_short_not_errors() {
        let f = fixture(b"abcdef");
        let p = PooledFile::open(f.path()).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(p.pread(4, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(p.pread(6, &mut buf).unwrap(), 0);
        assert_eq!(p.pread(100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn missing_file_is_a_hard_open_error() {
        let result = PooledFile::open(Path::new("/nonexistent/cascade-test"));
        assert!(matches!(result, Err(StreamError::OpenFailed { .. })));
    }

    #[test]
    fn interleaved_positional_reads_do_not_race() {
        let f = fixture(&(0..=255u8).collect::<Vec<_>>());
        let p = PooledFile::open(f.path()).unwrap();
        let q = p.clone();
        let t = std::thread::spawn(move || {
            for _ in 0..200 {
                let mut buf = [0u8; 8];
                assert_eq!(q.pread(8, &mut buf).unwrap(), 8);
                assert_eq!(buf[0], 8);
            }
        });
        for _ in 0..200 {
            let mut buf = [0u8; 8];
            assert_eq!(p.pread(100, &mut buf).unwrap(), 8);
            assert_eq!(buf[0], 100);
        }
        t.join().unwrap();
    }
}
