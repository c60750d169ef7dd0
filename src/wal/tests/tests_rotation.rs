//! Segment rotation: size-triggered and explicit cuts.
//!
//! Coverage:
//! - the size threshold rotates the tail and the new name carries
//!   `(seq + 1, last index + 1)`
//! - sealed segments shrink to their data size
//! - replay spans the whole segment chain

use super::helpers::{ent, hs, init_tracing, segment_path_with_seq, sized_ent, small_opts};
use crate::record::Snapshot;
use crate::segment::segment_name;
use crate::wal::Wal;
use tempfile::TempDir;

/// # Scenario
/// With a 2 KiB segment size and ~500-byte entries, a handful of saves
/// pushes the tail past the threshold and cuts to a new segment.
///
/// # Expected behavior
/// - A segment with sequence 1 appears, named after the next entry index.
/// - A full reopen recovers every entry in order across both segments.
#[test]
fn size_threshold_triggers_cut() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let mut wal = Wal::create_with(&dir, b"m", small_opts(2048)).unwrap();
    for i in 1..=5 {
        wal.save(&Default::default(), &[sized_ent(i, 1, 500)]).unwrap();
    }
    wal.close().unwrap();

    // The cut fired mid-way, so a second-generation segment exists and its
    // name encodes the first index it covers.
    let rotated = segment_path_with_seq(&dir, 1);
    let name = rotated.file_name().unwrap().to_str().unwrap().to_string();
    let (_, first_index) = crate::segment::parse_segment_name(&name).unwrap();
    assert!(first_index > 1 && first_index <= 6, "first index {first_index}");

    let mut wal = Wal::open(&dir, Snapshot::default()).unwrap();
    let (_, _, entries) = wal.read_all().unwrap();
    assert_eq!(entries.len(), 5);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.index, i as u64 + 1);
    }
}

/// # Scenario
/// An explicit `cut` seals the tail and appends continue in the new
/// segment.
#[test]
fn explicit_cut_rotates_and_seals() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let segment_size = 64 * 1024;
    let mut wal = Wal::create_with(&dir, b"m", small_opts(segment_size)).unwrap();
    wal.save(&hs(1, 1, 1), &[ent(1, 1)]).unwrap();
    wal.cut().unwrap();
    wal.save(&hs(1, 1, 2), &[ent(2, 1)]).unwrap();
    wal.close().unwrap();

    // Sealing trimmed the preallocated space away.
    let sealed = dir.join(segment_name(0, 0));
    let sealed_len = std::fs::metadata(&sealed).unwrap().len();
    assert!(sealed_len < segment_size, "sealed segment still {sealed_len} bytes");

    // The new tail covers index 2 onward.
    assert!(dir.join(segment_name(1, 2)).exists());

    let mut wal = Wal::open_for_read(&dir, Snapshot::default()).unwrap();
    let (_, state, entries) = wal.read_all().unwrap();
    assert_eq!(state, hs(1, 1, 2));
    assert_eq!(entries.len(), 2);
}

/// # Scenario
/// Several cuts in a row build a chain of segments whose sequence numbers
/// and first indices both increase, and replay walks the whole chain.
#[test]
fn replay_spans_many_segments() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let mut wal = Wal::create_with(&dir, b"m", small_opts(64 * 1024)).unwrap();
    let mut next = 1;
    for _ in 0..4 {
        let batch: Vec<_> = (next..next + 3).map(|i| ent(i, 1)).collect();
        wal.save(&Default::default(), &batch).unwrap();
        wal.cut().unwrap();
        next += 3;
    }
    wal.close().unwrap();

    for seq in 0..=4 {
        segment_path_with_seq(&dir, seq);
    }

    let mut wal = Wal::open_for_read(&dir, Snapshot::default()).unwrap();
    let (_, _, entries) = wal.read_all().unwrap();
    assert_eq!(entries.len(), 12);
    assert_eq!(entries.last().unwrap().index, 12);
}
