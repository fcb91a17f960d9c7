//! Byte sources - the readers pages are loaded from.
//!
//! A [`ByteSource`] is a random-access view over an opaque byte stream with
//! a sequential cursor used only while storages are being laid out:
//!
//! ```text
//!  ┌──────────────┬──────────────────────┬──────────────────────┬─────
//!  │    header    │  storage A region    │  storage B region    │ …
//!  └──────────────┴──────────────────────┴──────────────────────┴─────
//!                 ▲ offset() at A.initialize  ▲ offset() after A skipped
//! ```
//!
//! Page loads never move the cursor; they use positional reads.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, Result};

/// Random-access reader over a fixed-length byte stream.
///
/// # Thread Safety
/// `copy_bytes_with_offset` takes `&self` and may be called from several
/// threads at once. The cursor (`offset` / `seek`) is `&mut self` and only
/// used during initialization.
pub trait ByteSource: Send + Sync {
    /// Current cursor position.
    fn offset(&self) -> u64;

    /// Move the cursor. Positions past the end are allowed; reads there fail.
    fn seek(&mut self, position: u64) -> Result<()>;

    /// Total length of the stream in bytes.
    fn file_length(&self) -> u64;

    /// Fill `dest` with the bytes starting at `offset`. Blocks until done.
    ///
    /// # Errors
    /// `Error::Io` with `UnexpectedEof` if fewer than `dest.len()` bytes are
    /// available, or whatever the underlying reader reports.
    fn copy_bytes_with_offset(&self, offset: u64, dest: &mut [u8]) -> Result<()>;

    /// Advance the cursor by `bytes` without reading.
    fn skip(&mut self, bytes: u64) -> Result<()> {
        let target = self.offset().checked_add(bytes).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "skip past u64::MAX",
            ))
        })?;
        self.seek(target)
    }
}

fn eof(offset: u64, wanted: usize, length: u64) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!(
            "read of {} bytes at offset {} past end of {}-byte source",
            wanted, offset, length
        ),
    ))
}

// ============================================================================
// In-memory source
// ============================================================================

/// A byte source over shared in-memory bytes.
///
/// Cloning is cheap and gives an independent cursor over the same bytes,
/// which is how each operation gets its own handle.
///
/// # Example
/// ```
/// use epochpage::storage::{ByteSource, MemoryByteSource};
///
/// let mut source = MemoryByteSource::new(vec![1u8, 2, 3, 4]);
/// source.skip(2).unwrap();
/// assert_eq!(source.offset(), 2);
///
/// let mut buf = [0u8; 2];
/// source.copy_bytes_with_offset(1, &mut buf).unwrap();
/// assert_eq!(buf, [2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryByteSource {
    bytes: Arc<[u8]>,
    position: u64,
}

impl MemoryByteSource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            position: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl ByteSource for MemoryByteSource {
    fn offset(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn file_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn copy_bytes_with_offset(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(dest.len())?))
            .filter(|range| range.end <= self.bytes.len())
            .ok_or_else(|| eof(offset, dest.len(), self.file_length()))?;

        dest.copy_from_slice(&self.bytes[range]);
        Ok(())
    }
}

// ============================================================================
// File source
// ============================================================================

/// A byte source over a read-only file.
///
/// # Thread Safety
/// The `File` sits behind a `Mutex` because a positional read is a seek
/// followed by a read on the shared handle. Use [`reopen`](Self::reopen) to
/// give each operation its own handle and avoid contending on the lock.
#[derive(Debug)]
pub struct FileByteSource {
    path: PathBuf,
    file: Mutex<File>,
    /// File length at open time. The file must not change while open.
    length: u64,
    position: u64,
}

impl FileByteSource {
    /// Open `path` for reading.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let length = file.metadata()?.len();

        Ok(Self {
            path,
            file: Mutex::new(file),
            length,
            position: 0,
        })
    }

    /// Open a fresh handle on the same file, with the cursor at the start.
    pub fn reopen(&self) -> Result<Self> {
        Self::open(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileByteSource {
    fn offset(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn file_length(&self) -> u64 {
        self.length
    }

    fn copy_bytes_with_offset(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let end = offset.checked_add(dest.len() as u64);
        if end.map_or(true, |end| end > self.length) {
            return Err(eof(offset, dest.len(), self.length));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dest)?;
        Ok(())
    }
}
