//! The write-ahead log.
//!
//! A [`Wal`] handle owns one log directory: an ordered set of segment
//! files, each an append-only sequence of CRC-chained records. The
//! consensus layer feeds it three kinds of events — hard-state updates,
//! replicated entries, and snapshot pointers — and on restart reads back
//! the exact committed stream from a caller-named snapshot.
//!
//! # Lifecycle
//!
//! ```text
//!  Wal::create ──► segment 0 (crc, metadata, zero snapshot)
//!       │
//!       ▼
//!  save / save_snapshot ──► tail segment ──► fsync
//!       │                        │
//!       │                  size ≥ limit?
//!       │                        ▼
//!       │                      cut ──► segment N+1 (crc, metadata,
//!       │                               state, latest snapshot)
//!       ▼
//!  close ──► fsync + release locks
//!
//!  Wal::open(dir, snap) ──► read_all ──► (metadata, state, entries)
//!                                │
//!                                └──► writer positioned at the tail
//! ```
//!
//! # Modes
//!
//! Write mode (`create` / `open`) locks every opened segment with an
//! advisory exclusive lock, so a second writer fails fast with
//! `lock-held`. Read-only mode (`open_for_read`) takes no locks and
//! tolerates a writer appending to the tail by stopping at the last
//! complete record.
//!
//! # Durability
//!
//! Every `save`, `save_snapshot`, `cut`, and `close` blocks until fsync
//! returns. A crash between appends surfaces on recovery as a torn write
//! at the tail and is truncated away; committed records are never lost and
//! are replayed in exactly the order they were written.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec::{Decoder, Encoder};
use crate::encoding::{decode_from_slice, encode_to_vec};
use crate::error::WalError;
use crate::fsutil;
use crate::record::{Entry, HardState, RecordKind, Snapshot};
use crate::segment::{SegmentFile, segment_name};
use tracing::{debug, error, info, warn};

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// Default byte size a tail segment may reach before the writer cuts to a
/// new one (64 MiB). The effective size can exceed this because cuts only
/// happen at record boundaries.
pub const SEGMENT_SIZE_BYTES: u64 = 64 * 1024 * 1024;

/// Tunables fixed at `create` / `open` time.
#[derive(Debug, Clone)]
pub struct WalOptions {
    /// Size threshold that triggers a cut, and the preallocation size of
    /// every new segment.
    pub segment_size: u64,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self {
            segment_size: SEGMENT_SIZE_BYTES,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// WAL handle
// ------------------------------------------------------------------------------------------------

/// A write-ahead log bound to one directory.
///
/// See the [module-level documentation](self) for modes, lifecycle, and
/// durability guarantees.
#[derive(Debug)]
pub struct Wal {
    /// Log directory.
    dir: PathBuf,

    /// Open handle on the directory for fsyncing entry changes (write
    /// mode only).
    dir_file: Option<File>,

    /// Tunables captured at open time.
    options: WalOptions,

    /// Log identity, recorded at the head of every segment.
    metadata: Vec<u8>,

    /// Most recent hard state, replayed into new segment heads at cut.
    state: HardState,

    /// Snapshot the reader was asked to start from.
    start: Snapshot,

    /// Most recent snapshot pointer, replayed into new segment heads.
    last_snapshot: Snapshot,

    /// Recovery scanner. Consumed by the first `read_all`.
    decoder: Option<Decoder>,

    /// Tail-bound record writer. Present after `create`, or after
    /// `read_all` on a write-mode open.
    encoder: Option<Encoder>,

    /// Open segments, oldest first, tail last. Write mode holds the
    /// advisory lock on each.
    segments: Vec<SegmentFile>,

    /// Index of the last entry or snapshot written or scanned; names the
    /// next segment at cut.
    last_index: u64,

    write_mode: bool,
    closed: bool,
}

impl Wal {
    // --------------------------------------------------------------------------------------------
    // Construction
    // --------------------------------------------------------------------------------------------

    /// Create a fresh WAL directory with default options.
    ///
    /// See [`Wal::create_with`].
    pub fn create(dir: impl AsRef<Path>, metadata: &[u8]) -> Result<Self, WalError> {
        Self::create_with(dir, metadata, WalOptions::default())
    }

    /// Create a fresh WAL directory holding `metadata`, and return an
    /// open, locked writer positioned at the tail of segment 0.
    ///
    /// Initialization is atomic: everything is staged in a `<dir>.tmp`
    /// sibling, fsynced, and renamed into place. A crash at any point
    /// leaves either the old state or a complete new one, and a leftover
    /// `.tmp` from an interrupted attempt is discarded.
    ///
    /// Fails with [`WalError::DirectoryExists`] when `dir` already holds
    /// segment files.
    pub fn create_with(
        dir: impl AsRef<Path>,
        metadata: &[u8],
        options: WalOptions,
    ) -> Result<Self, WalError> {
        let dir = dir.as_ref();
        if fsutil::exists(dir) {
            return Err(WalError::DirectoryExists(dir.to_path_buf()));
        }

        let tmp_dir = sibling_tmp_dir(dir);
        if tmp_dir.exists() {
            warn!(dir = %tmp_dir.display(), "removing leftover temp directory");
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        // Segment 0 starts the CRC chain at zero and carries the log
        // identity plus the zero snapshot as the initial anchor.
        let seg_path = tmp_dir.join(segment_name(0, 0));
        let mut seg = SegmentFile::create(&seg_path, true, true)?;
        seg.preallocate(options.segment_size)?;

        let mut encoder = Encoder::new(seg.file.try_clone()?, 0);
        encoder.encode(RecordKind::Crc, &[])?;
        encoder.encode(RecordKind::Metadata, metadata)?;
        let anchor = Snapshot::default();
        encoder.encode(RecordKind::Snapshot, &encode_to_vec(&anchor)?)?;
        encoder.sync()?;
        fsutil::fsync_dir(&tmp_dir)?;

        // Promote: fsync parent, rename, fsync parent again.
        let parent = dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        if let Some(parent) = &parent {
            fsutil::fsync_dir(parent)?;
        }
        if dir.exists() {
            // No segments inside (checked above) — replace the junk.
            fs::remove_dir_all(dir)?;
        }
        fs::rename(&tmp_dir, dir)?;
        if let Some(parent) = &parent {
            fsutil::fsync_dir(parent)?;
        }
        seg.path = dir.join(segment_name(0, 0));

        let dir_file = File::open(dir)?;
        info!(dir = %dir.display(), "WAL created");

        Ok(Self {
            dir: dir.to_path_buf(),
            dir_file: Some(dir_file),
            options,
            metadata: metadata.to_vec(),
            state: HardState::default(),
            start: Snapshot::default(),
            last_snapshot: anchor,
            decoder: None,
            encoder: Some(encoder),
            segments: vec![seg],
            last_index: 0,
            write_mode: true,
            closed: false,
        })
    }

    /// Open an existing WAL for writing with default options.
    ///
    /// See [`Wal::open_with`].
    pub fn open(dir: impl AsRef<Path>, snap: Snapshot) -> Result<Self, WalError> {
        Self::open_with(dir, snap, WalOptions::default())
    }

    /// Open an existing WAL for writing.
    ///
    /// Locks every segment from the one covering `snap` through the tail;
    /// a competing writer fails with [`WalError::LockHeld`]. The returned
    /// handle must run [`Wal::read_all`] before appending, which verifies
    /// the stream and positions the writer at the tail.
    pub fn open_with(
        dir: impl AsRef<Path>,
        snap: Snapshot,
        options: WalOptions,
    ) -> Result<Self, WalError> {
        Self::open_at(dir.as_ref(), snap, true, options)
    }

    /// Open an existing WAL read-only.
    ///
    /// Takes no locks: historical segments are immutable and a concurrent
    /// writer on the tail is tolerated by stopping at the last complete
    /// record.
    pub fn open_for_read(dir: impl AsRef<Path>, snap: Snapshot) -> Result<Self, WalError> {
        Self::open_at(dir.as_ref(), snap, false, WalOptions::default())
    }

    fn open_at(
        dir: &Path,
        snap: Snapshot,
        write: bool,
        options: WalOptions,
    ) -> Result<Self, WalError> {
        let names = match fsutil::segment_names(dir) {
            Ok(names) => names,
            Err(WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WalError::NoSegmentFiles(dir.to_path_buf()));
            }
            Err(e) => return Err(e),
        };
        if names.is_empty() {
            return Err(WalError::NoSegmentFiles(dir.to_path_buf()));
        }

        let Some(first) = fsutil::search_index(&names, snap.index)? else {
            return Err(WalError::SegmentNotFound { index: snap.index });
        };
        let names = &names[first..];
        let parsed = fsutil::parse_all(names)?;
        if !fsutil::is_continuous(&parsed) {
            return Err(WalError::IndicesNotContinuous);
        }

        let mut segments = Vec::new();
        let mut read_files = Vec::new();
        for name in names {
            let path = dir.join(name);
            if write {
                let seg = SegmentFile::open_locked(&path)?;
                read_files.push(seg.file.try_clone()?);
                segments.push(seg);
            } else {
                read_files.push(SegmentFile::open_read(&path)?);
            }
        }

        let dir_file = if write { Some(File::open(dir)?) } else { None };
        info!(
            dir = %dir.display(),
            start_index = snap.index,
            start_term = snap.term,
            segments = names.len(),
            write,
            "WAL opened"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            dir_file,
            options,
            metadata: Vec::new(),
            state: HardState::default(),
            start: snap.clone(),
            last_snapshot: snap,
            decoder: Some(Decoder::new(read_files)),
            encoder: None,
            segments,
            last_index: 0,
            write_mode: write,
            closed: false,
        })
    }

    // --------------------------------------------------------------------------------------------
    // Recovery
    // --------------------------------------------------------------------------------------------

    /// Replay the stream from the start snapshot.
    ///
    /// Returns the log metadata, the last hard state, and every entry past
    /// the start snapshot in strict index order. On a write-mode handle a
    /// torn write at the tail is truncated away and the writer takes over
    /// at the byte past the last complete record; a torn write in any
    /// earlier segment fails with [`WalError::UnexpectedEof`].
    ///
    /// The scan consumes the decoder: a second call fails with
    /// [`WalError::DecoderNotFound`].
    pub fn read_all(&mut self) -> Result<(Vec<u8>, HardState, Vec<Entry>), WalError> {
        self.scan(true)
    }

    fn scan(&mut self, keep_entries: bool) -> Result<(Vec<u8>, HardState, Vec<Entry>), WalError> {
        let mut decoder = self.decoder.take().ok_or(WalError::DecoderNotFound)?;

        let mut metadata: Option<Vec<u8>> = None;
        let mut state = HardState::default();
        let mut entries: Vec<Entry> = Vec::new();
        let mut matched = false;
        let mut last_index = self.start.index;

        let outcome = loop {
            let record = match decoder.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            match record.kind {
                RecordKind::Entry => {
                    let (entry, _) = decode_from_slice::<Entry>(&record.data)?;
                    if entry.index > self.start.index {
                        if entry.index - self.start.index > isize::MAX as u64 {
                            break Err(WalError::SliceOutOfRange {
                                index: entry.index,
                                start: self.start.index,
                            });
                        }
                        let Some(expected) = last_index.checked_add(1) else {
                            break Err(WalError::SliceOutOfRange {
                                index: entry.index,
                                start: self.start.index,
                            });
                        };
                        if entry.index != expected {
                            break Err(WalError::EntryNotContiguous {
                                index: entry.index,
                                expected,
                            });
                        }
                        last_index = entry.index;
                        self.last_index = entry.index;
                        if keep_entries {
                            entries.push(entry);
                        }
                    } else {
                        // Residue from before the start snapshot.
                        self.last_index = self.last_index.max(entry.index);
                    }
                }
                RecordKind::State => {
                    let (s, _) = decode_from_slice::<HardState>(&record.data)?;
                    state = s;
                }
                RecordKind::Metadata => match &metadata {
                    Some(prev) if *prev != record.data => break Err(WalError::MetadataConflict),
                    _ => metadata = Some(record.data),
                },
                RecordKind::Crc => {
                    let running = decoder.crc();
                    if running != 0 && record.crc != running {
                        break Err(WalError::CrcMismatch);
                    }
                    decoder.set_crc(record.crc);
                }
                RecordKind::Snapshot => {
                    let (s, _) = decode_from_slice::<Snapshot>(&record.data)?;
                    if s.index == self.start.index {
                        if s.term != self.start.term {
                            break Err(WalError::SnapshotMismatch {
                                index: s.index,
                                term: s.term,
                            });
                        }
                        matched = true;
                    }
                    self.last_index = self.last_index.max(s.index);
                }
            }
        };

        match outcome {
            Ok(()) => {}
            Err(WalError::UnexpectedEof) if decoder.at_last_file() => {
                warn!(
                    dir = %self.dir.display(),
                    offset = decoder.last_offset(),
                    "torn write at WAL tail, truncating"
                );
            }
            Err(e) => return Err(e),
        }

        let metadata = metadata.ok_or(WalError::MetadataNotFound)?;
        if !matched {
            return Err(WalError::SnapshotNotFound {
                index: self.start.index,
                term: self.start.term,
            });
        }

        if self.write_mode {
            // Cut the tail back to the last complete record and hand the
            // byte stream over to the encoder, chain intact.
            let tail = self
                .segments
                .last()
                .ok_or_else(|| WalError::Internal("write-mode WAL has no tail".into()))?;
            let offset = decoder.last_offset();
            tail.file.set_len(offset)?;
            tail.file.sync_all()?;
            (&tail.file).seek(SeekFrom::Start(offset))?;
            self.encoder = Some(Encoder::new(tail.file.try_clone()?, decoder.crc()));
        }

        self.metadata = metadata.clone();
        self.state = state.clone();
        debug!(
            dir = %self.dir.display(),
            entries = entries.len(),
            last_index = self.last_index,
            "WAL replay complete"
        );
        Ok((metadata, state, entries))
    }

    // --------------------------------------------------------------------------------------------
    // Appending
    // --------------------------------------------------------------------------------------------

    /// Durably append `entries` followed by a non-empty `state`.
    ///
    /// Both empty together is a no-op. The call returns once the records
    /// are fsynced; if the tail has reached the segment size threshold the
    /// log is cut to a fresh segment before returning.
    pub fn save(&mut self, state: &HardState, entries: &[Entry]) -> Result<(), WalError> {
        self.ensure_writable()?;
        if state.is_empty() && entries.is_empty() {
            return Ok(());
        }

        for entry in entries {
            let body = encode_to_vec(entry)?;
            self.encoder_mut()?.encode(RecordKind::Entry, &body)?;
            self.last_index = entry.index;
        }
        if !state.is_empty() {
            let body = encode_to_vec(state)?;
            self.encoder_mut()?.encode(RecordKind::State, &body)?;
            self.state = state.clone();
        }

        let encoder = self.encoder_mut()?;
        encoder.sync()?;
        let offset = encoder.current_offset()?;
        if offset < self.options.segment_size {
            return Ok(());
        }
        self.cut()
    }

    /// Durably append a snapshot pointer.
    ///
    /// The pointer is also remembered so the next cut can stamp the new
    /// segment with the correct first index and re-anchor readers.
    pub fn save_snapshot(&mut self, snap: &Snapshot) -> Result<(), WalError> {
        self.ensure_writable()?;
        let body = encode_to_vec(snap)?;
        let encoder = self.encoder_mut()?;
        encoder.encode(RecordKind::Snapshot, &body)?;
        encoder.sync()?;
        self.last_index = self.last_index.max(snap.index);
        self.last_snapshot = snap.clone();
        debug!(index = snap.index, term = snap.term, "snapshot pointer saved");
        Ok(())
    }

    /// Seal the tail segment and start a new one.
    ///
    /// The prior tail is fsynced and truncated to its data size; the new
    /// segment is created locked and preallocated, opens with a `crc`
    /// record chained to the prior tail's final CRC, and restates the log
    /// metadata, the current hard state, and the latest snapshot pointer
    /// so any scan may start there.
    pub fn cut(&mut self) -> Result<(), WalError> {
        self.ensure_writable()?;
        let offset = self.encoder_mut()?.current_offset()?;
        let prev_crc = self.encoder_mut()?.crc();

        let tail = self
            .segments
            .last()
            .ok_or_else(|| WalError::Internal("write-mode WAL has no tail".into()))?;
        tail.seal(offset)?;

        let next_seq = tail
            .seq
            .checked_add(1)
            .ok_or_else(|| WalError::Internal("segment sequence overflow".into()))?;
        let first_index = self
            .last_index
            .checked_add(1)
            .ok_or_else(|| WalError::Internal("entry index overflow".into()))?;

        let path = self.dir.join(segment_name(next_seq, first_index));
        let seg = SegmentFile::create(&path, true, true)?;
        seg.preallocate(self.options.segment_size)?;

        let mut encoder = Encoder::new(seg.file.try_clone()?, prev_crc);
        encoder.encode(RecordKind::Crc, &[])?;
        encoder.encode(RecordKind::Metadata, &self.metadata)?;
        if !self.state.is_empty() {
            encoder.encode(RecordKind::State, &encode_to_vec(&self.state)?)?;
        }
        encoder.encode(RecordKind::Snapshot, &encode_to_vec(&self.last_snapshot)?)?;
        encoder.sync()?;
        if let Some(dir_file) = &self.dir_file {
            dir_file.sync_all()?;
        }

        info!(
            segment = %path.display(),
            seq = next_seq,
            first_index,
            sealed_bytes = offset,
            "WAL cut"
        );
        self.encoder = Some(encoder);
        self.segments.push(seg);
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Lock management
    // --------------------------------------------------------------------------------------------

    /// Release advisory locks on every segment whose entries are all at or
    /// below `index`, keeping the last such segment locked so the chain
    /// boundary stays owned. Locks are only ever released, never
    /// re-acquired.
    pub fn release_lock_to(&mut self, index: u64) -> Result<(), WalError> {
        if self.segments.is_empty() {
            return Ok(());
        }

        let past = self
            .segments
            .iter()
            .position(|seg| seg.first_index >= index);
        let keep_from = match past {
            Some(i) => i.saturating_sub(1),
            // Everything starts below the release point: keep the tail.
            None => self.segments.len() - 1,
        };
        if keep_from == 0 {
            return Ok(());
        }

        // Dropping the handles closes the files and releases their locks.
        self.segments.drain(..keep_from);
        debug!(index, released = keep_from, "released segment locks");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Shutdown
    // --------------------------------------------------------------------------------------------

    /// Fsync outstanding writes, release every lock, and consume the
    /// handle.
    pub fn close(mut self) -> Result<(), WalError> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<(), WalError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.sync()?;
        }
        self.encoder = None;
        self.decoder = None;
        self.segments.clear();
        self.dir_file = None;
        info!(dir = %self.dir.display(), "WAL closed");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Accessors & helpers
    // --------------------------------------------------------------------------------------------

    /// The log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index of the last entry or snapshot appended or recovered.
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    fn ensure_writable(&self) -> Result<(), WalError> {
        if self.closed || !self.write_mode || self.encoder.is_none() {
            return Err(WalError::NotWritable);
        }
        Ok(())
    }

    fn encoder_mut(&mut self) -> Result<&mut Encoder, WalError> {
        self.encoder.as_mut().ok_or(WalError::NotWritable)
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close_inner() {
            error!(dir = %self.dir.display(), error = %e, "WAL close failed on drop");
        }
    }
}

/// `<dir>.tmp`, the staging sibling used by atomic initialization.
fn sibling_tmp_dir(dir: &Path) -> PathBuf {
    let mut os = dir.as_os_str().to_os_string();
    os.push(fsutil::TMP_DIR_SUFFIX);
    PathBuf::from(os)
}

// ------------------------------------------------------------------------------------------------
// Read-only passes
// ------------------------------------------------------------------------------------------------

/// Integrity-check the log from `snap` without retaining entry payloads.
///
/// Runs the full recovery scan — CRC chain, index continuity, snapshot
/// match — and returns only the final hard state.
pub fn verify(dir: impl AsRef<Path>, snap: &Snapshot) -> Result<HardState, WalError> {
    let mut wal = Wal::open_for_read(dir, snap.clone())?;
    let (_, state, _) = wal.scan(false)?;
    Ok(state)
}

/// Enumerate the snapshot pointers proven durable by a later hard-state
/// commit.
///
/// Scans every segment in the directory. A pointer qualifies when some
/// hard-state record *after* it commits at least its index under at least
/// its term; a trailing pointer with no covering commit is excluded.
pub fn valid_snapshot_entries(dir: impl AsRef<Path>) -> Result<Vec<Snapshot>, WalError> {
    let dir = dir.as_ref();
    let names = match fsutil::segment_names(dir) {
        Ok(names) => names,
        Err(WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WalError::NoSegmentFiles(dir.to_path_buf()));
        }
        Err(e) => return Err(e),
    };
    if names.is_empty() {
        return Err(WalError::NoSegmentFiles(dir.to_path_buf()));
    }
    let parsed = fsutil::parse_all(&names)?;
    if !fsutil::is_continuous(&parsed) {
        return Err(WalError::IndicesNotContinuous);
    }

    let mut files = Vec::new();
    for name in &names {
        files.push(SegmentFile::open_read(&dir.join(name))?);
    }
    let mut decoder = Decoder::new(files);

    let mut snaps: Vec<(usize, Snapshot)> = Vec::new();
    let mut states: Vec<(usize, HardState)> = Vec::new();
    let mut position = 0usize;
    loop {
        let record = match decoder.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(WalError::UnexpectedEof) if decoder.at_last_file() => {
                warn!(dir = %dir.display(), "torn write at WAL tail, stopping enumeration");
                break;
            }
            Err(e) => return Err(e),
        };
        match record.kind {
            RecordKind::Snapshot => {
                let (snap, _) = decode_from_slice::<Snapshot>(&record.data)?;
                // Cuts restate the latest pointer; collapse the repeats.
                if snaps.last().map(|(_, prev)| prev == &snap) != Some(true) {
                    snaps.push((position, snap));
                }
            }
            RecordKind::State => {
                let (state, _) = decode_from_slice::<HardState>(&record.data)?;
                states.push((position, state));
            }
            RecordKind::Crc => {
                let running = decoder.crc();
                if running != 0 && record.crc != running {
                    return Err(WalError::CrcMismatch);
                }
                decoder.set_crc(record.crc);
            }
            RecordKind::Entry | RecordKind::Metadata => {}
        }
        position += 1;
    }

    Ok(snaps
        .into_iter()
        .filter(|(at, snap)| {
            states
                .iter()
                .any(|(sp, st)| sp > at && st.commit >= snap.index && st.term >= snap.term)
        })
        .map(|(_, snap)| snap)
        .collect())
}
