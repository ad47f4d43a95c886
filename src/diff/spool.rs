use crate::error::MaterializeError;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::sync::Arc;

/// Append-only copy of the raw patch bytes, shared between the parser
/// thread (writer) and whoever re-materializes hunks (readers).
///
/// Starts in memory and rolls over to an anonymous temp file once it grows
/// past `memory_limit`. Also keeps a running SHA-256 of everything written
/// so a finished session can be compared against the previous one.
#[derive(Clone)]
pub struct PatchSpool {
    inner: Arc<Mutex<SpoolInner>>,
}

enum Storage {
    Memory(Vec<u8>),
    Disk(File),
}

struct SpoolInner {
    storage: Storage,
    len: u64,
    memory_limit: usize,
    hasher: Sha256,
    fingerprint: Option<String>,
}

impl PatchSpool {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SpoolInner {
                storage: Storage::Memory(Vec::new()),
                len: 0,
                memory_limit,
                hasher: Sha256::new(),
                fingerprint: None,
            })),
        }
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().len
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self.inner.lock().storage, Storage::Disk(_))
    }

    /// Read back `range`. Fails if the range has not been written (yet).
    pub fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, MaterializeError> {
        let mut inner = self.inner.lock();
        if range.start > range.end || range.end > inner.len {
            return Err(MaterializeError::OutOfRange {
                start: range.start,
                end: range.end,
                len: inner.len,
            });
        }
        let size = (range.end - range.start) as usize;
        match &mut inner.storage {
            Storage::Memory(buf) => Ok(buf[range.start as usize..range.end as usize].to_vec()),
            Storage::Disk(file) => {
                let mut out = vec![0; size];
                file.seek(SeekFrom::Start(range.start))?;
                file.read_exact(&mut out)?;
                file.seek(SeekFrom::End(0))?;
                Ok(out)
            }
        }
    }

    /// Finish hashing and return the hex SHA-256 of the whole patch.
    /// Calling it again returns the same value.
    pub fn seal(&self) -> String {
        let mut inner = self.inner.lock();
        if let Some(fp) = &inner.fingerprint {
            return fp.clone();
        }
        let hasher = std::mem::take(&mut inner.hasher);
        let fp = format!("{:x}", hasher.finalize());
        inner.fingerprint = Some(fp.clone());
        fp
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.inner.lock().fingerprint.clone()
    }
}

impl SpoolInner {
    fn roll_over(&mut self) -> io::Result<()> {
        if let Storage::Memory(buf) = &self.storage {
            let mut file = tempfile::tempfile()?;
            file.write_all(buf)?;
            tracing::debug!(bytes = buf.len(), "patch spool rolled over to disk");
            self.storage = Storage::Disk(file);
        }
        Ok(())
    }
}

impl Write for PatchSpool {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fingerprint.is_some() {
            return Err(io::Error::other("patch spool is sealed"));
        }
        let over_limit = matches!(
            &inner.storage,
            Storage::Memory(buf) if buf.len() + data.len() > inner.memory_limit
        );
        if over_limit {
            inner.roll_over()?;
        }
        match &mut inner.storage {
            Storage::Memory(buf) => buf.extend_from_slice(data),
            Storage::Disk(file) => file.write_all(data)?,
        }
        inner.hasher.update(data);
        inner.len += data.len() as u64;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.inner.lock();
        if let Storage::Disk(file) = &mut inner.storage {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_spool_reads_back_ranges() {
        let mut spool = PatchSpool::new(1024);
        spool.write_all(b"hello world").unwrap();
        assert_eq!(spool.read_range(6..11).unwrap(), b"world");
        assert!(!spool.is_on_disk());
    }

    #[test]
    fn rolls_over_to_disk_past_limit() {
        let mut spool = PatchSpool::new(8);
        spool.write_all(b"0123456").unwrap();
        assert!(!spool.is_on_disk());
        spool.write_all(b"789abc").unwrap();
        assert!(spool.is_on_disk());
        assert_eq!(spool.len(), 13);
        assert_eq!(spool.read_range(5..10).unwrap(), b"56789");
        // Writes after a read still append at the end
        spool.write_all(b"def").unwrap();
        assert_eq!(spool.read_range(10..16).unwrap(), b"abcdef");
    }

    #[test]
    fn out_of_range_is_an_error() {
        let mut spool = PatchSpool::new(64);
        spool.write_all(b"abc").unwrap();
        assert!(matches!(
            spool.read_range(1..9),
            Err(MaterializeError::OutOfRange { len: 3, .. })
        ));
    }

    #[test]
    fn fingerprint_matches_for_same_content() {
        let mut a = PatchSpool::new(4);
        let mut b = PatchSpool::new(1024);
        a.write_all(b"same bytes").unwrap();
        b.write_all(b"same ").unwrap();
        b.write_all(b"bytes").unwrap();
        assert_eq!(a.seal(), b.seal());
        assert_eq!(a.fingerprint(), Some(a.seal()));

        let mut c = PatchSpool::new(1024);
        c.write_all(b"other bytes").unwrap();
        assert_ne!(a.seal(), c.seal());
    }

    #[test]
    fn sealed_spool_rejects_writes() {
        let mut spool = PatchSpool::new(64);
        spool.seal();
        assert!(spool.write_all(b"late").is_err());
    }
}
