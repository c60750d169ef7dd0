//! Crate-wide error type.
//!
//! Every fallible operation in the log returns [`WalError`]. Write-path
//! errors leave the in-memory handle unchanged past the last successful
//! fsync; read-path errors abort the scan, except for a torn write at the
//! tail of the final segment, which the reader repairs locally.

use std::io;
use std::path::PathBuf;

use crate::encoding::EncodingError;
use thiserror::Error;

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalError {
    /// Underlying I/O error (includes out-of-space conditions).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record body encoding / decoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// `create` was invoked on a directory that already holds segments.
    #[error("WAL directory already exists: {0}")]
    DirectoryExists(PathBuf),

    /// `open` was invoked on a directory with no segment files.
    #[error("No WAL segment files in directory: {0}")]
    NoSegmentFiles(PathBuf),

    /// No segment file covers the requested start snapshot.
    #[error("No WAL segment covers snapshot index {index}")]
    SegmentNotFound {
        /// Index of the start snapshot that could not be located.
        index: u64,
    },

    /// A file name did not parse as `<seq:16-hex>-<index:16-hex>.wal`.
    #[error("Bad WAL segment file name: {0}")]
    BadSegmentName(String),

    /// CRC chain violation. Fatal for the current open.
    #[error("CRC mismatch")]
    CrcMismatch,

    /// The stream ended inside a record. Tolerated only at the tail of the
    /// last segment, where it signals a torn write.
    #[error("Unexpected end of WAL stream")]
    UnexpectedEof,

    /// A frame announced a record larger than the configured maximum.
    #[error("Record size {len} exceeds limit ({limit} bytes)")]
    RecordTooLarge {
        /// Announced record length.
        len: u64,
        /// Configured maximum record length.
        limit: u64,
    },

    /// A frame length field was non-positive after masking the padding bits.
    #[error("Invalid frame length field: {0:#x}")]
    InvalidFrame(i64),

    /// The scan produced no metadata record.
    #[error("WAL metadata record not found")]
    MetadataNotFound,

    /// A later metadata record disagreed with the first one.
    #[error("Conflicting WAL metadata records")]
    MetadataConflict,

    /// A snapshot pointer at the start index carried a different term.
    #[error("Snapshot mismatch at index {index}: found term {term}")]
    SnapshotMismatch {
        /// Index of the mismatching pointer.
        index: u64,
        /// Term found in the stream.
        term: u64,
    },

    /// The scan never encountered the start snapshot pointer.
    #[error("Snapshot (index {index}, term {term}) not found in WAL stream")]
    SnapshotNotFound {
        /// Requested start index.
        index: u64,
        /// Requested start term.
        term: u64,
    },

    /// An entry index broke strict monotonic succession.
    #[error("Entry index {index} is not contiguous (expected {expected})")]
    EntryNotContiguous {
        /// Index found in the stream.
        index: u64,
        /// Index the scan required.
        expected: u64,
    },

    /// Segment sequence numbers or first-indices do not increase
    /// continuously — a mid-stream segment is missing.
    #[error("WAL segment indices do not increase continuously")]
    IndicesNotContinuous,

    /// An entry index exceeds the addressable range for the scan.
    #[error("Entry index {index} out of range for start index {start}")]
    SliceOutOfRange {
        /// Offending entry index.
        index: u64,
        /// Start snapshot index of the scan.
        start: u64,
    },

    /// A read operation was invoked on a handle whose decoder is gone
    /// (already consumed by `read_all`, or never initialized).
    #[error("WAL decoder not found")]
    DecoderNotFound,

    /// A write operation was invoked on a read-only handle, or before
    /// `read_all` positioned the writer at the tail.
    #[error("WAL handle is not writable")]
    NotWritable,

    /// Another writer holds the advisory lock on a segment.
    #[error("WAL lock held by another writer: {0}")]
    LockHeld(PathBuf),

    /// Internal invariant violation (counter overflow, unexpected state).
    #[error("Internal error: {0}")]
    Internal(String),
}
