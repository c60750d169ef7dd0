//! Segment files.
//!
//! One segment is a single append-only file named
//! `<seq:16-hex>-<first-index:16-hex>.wal`, where `seq` increases by one
//! per cut and `first-index` is the consensus index the segment is known to
//! cover from. Fixed-width hex keeps lexicographic directory order equal to
//! numeric order.
//!
//! Segments are created with owner-only permissions, optionally under an
//! advisory exclusive lock, and preallocated to the configured segment size
//! so appends do not grow the file one block at a time. The lock lives for
//! the lifetime of the handle; dropping the handle releases it.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::WalError;
use fs4::fs_std::FileExt;
use tracing::{debug, warn};

/// File extension of a WAL segment.
pub(crate) const SEGMENT_SUFFIX: &str = ".wal";

/// Owner-only permissions for freshly created segments.
const SEGMENT_FILE_MODE: u32 = 0o600;

// ------------------------------------------------------------------------------------------------
// Naming
// ------------------------------------------------------------------------------------------------

/// Format the basename of the segment with the given sequence number and
/// first covered index.
pub(crate) fn segment_name(seq: u64, first_index: u64) -> String {
    format!("{seq:016x}-{first_index:016x}{SEGMENT_SUFFIX}")
}

/// Parse a segment basename into `(seq, first_index)`.
pub(crate) fn parse_segment_name(name: &str) -> Result<(u64, u64), WalError> {
    let bad = || WalError::BadSegmentName(name.to_string());
    let stem = name.strip_suffix(SEGMENT_SUFFIX).ok_or_else(bad)?;
    let (seq_hex, index_hex) = stem.split_once('-').ok_or_else(bad)?;
    if seq_hex.len() != 16 || index_hex.len() != 16 {
        return Err(bad());
    }
    let seq = u64::from_str_radix(seq_hex, 16).map_err(|_| bad())?;
    let first_index = u64::from_str_radix(index_hex, 16).map_err(|_| bad())?;
    Ok((seq, first_index))
}

// ------------------------------------------------------------------------------------------------
// Segment file handle
// ------------------------------------------------------------------------------------------------

/// An open segment file, optionally holding the advisory write lock.
#[derive(Debug)]
pub(crate) struct SegmentFile {
    /// The open file handle. Closing it releases the advisory lock.
    pub(crate) file: File,
    /// Full path of the segment.
    pub(crate) path: PathBuf,
    /// Sequence number parsed from the name.
    pub(crate) seq: u64,
    /// First covered index parsed from the name.
    pub(crate) first_index: u64,
    locked: bool,
}

impl SegmentFile {
    /// Create a new segment file at `path` with private permissions.
    ///
    /// With `force_new`, a pre-existing file at the same path is truncated
    /// to zero. With `lock`, the advisory exclusive lock is taken before
    /// the handle is returned; creation never contends, so a held lock
    /// surfaces as [`WalError::LockHeld`] only when `path` already existed.
    pub(crate) fn create(path: &Path, force_new: bool, lock: bool) -> Result<Self, WalError> {
        let (seq, first_index) = parse_basename(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(force_new)
            .mode(SEGMENT_FILE_MODE)
            .open(path)?;
        let locked = lock && try_lock(&file, path)?;
        debug!(path = %path.display(), seq, first_index, locked, "segment created");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            seq,
            first_index,
            locked,
        })
    }

    /// Open an existing segment read-write and take its advisory lock.
    pub(crate) fn open_locked(path: &Path) -> Result<Self, WalError> {
        let (seq, first_index) = parse_basename(path)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        try_lock(&file, path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            seq,
            first_index,
            locked: true,
        })
    }

    /// Open an existing segment read-only, without locking.
    pub(crate) fn open_read(path: &Path) -> Result<File, WalError> {
        Ok(File::open(path)?)
    }

    /// Hint the filesystem to reserve `len` contiguous bytes.
    ///
    /// Filesystems without allocation support get a zero-fill `set_len`
    /// instead; either way the readable region is delimited by record
    /// length fields, never by the physical file length.
    pub(crate) fn preallocate(&self, len: u64) -> Result<(), WalError> {
        if let Err(e) = self.file.allocate(len) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "segment preallocation unsupported, falling back to zero-fill"
            );
            self.file.set_len(len)?;
        }
        Ok(())
    }

    /// Seal the segment: truncate away unused preallocated space so the
    /// on-disk size equals the data size, then fsync.
    pub(crate) fn seal(&self, data_len: u64) -> Result<(), WalError> {
        self.file.set_len(data_len)?;
        self.file.sync_all()?;
        debug!(path = %self.path.display(), len = data_len, "segment sealed");
        Ok(())
    }
}

impl Drop for SegmentFile {
    fn drop(&mut self) {
        if self.locked {
            let _ = FileExt::unlock(&self.file);
            debug!(path = %self.path.display(), "segment lock released");
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

fn parse_basename(path: &Path) -> Result<(u64, u64), WalError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| WalError::BadSegmentName(path.display().to_string()))?;
    parse_segment_name(name)
}

fn try_lock(file: &File, path: &Path) -> Result<bool, WalError> {
    match file.try_lock_exclusive() {
        Ok(true) => Ok(true),
        Ok(false) => Err(WalError::LockHeld(path.to_path_buf())),
        Err(e) => Err(WalError::Io(e)),
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
