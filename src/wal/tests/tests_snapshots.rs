//! Snapshot enumeration and the read-only verifier.

use super::helpers::{ent, hs, init_tracing, small_opts, snap};
use crate::error::WalError;
use crate::record::Snapshot;
use crate::wal::{Wal, valid_snapshot_entries, verify};
use tempfile::TempDir;

/// # Scenario
/// Pointers at indices 1..=4 with one hard-state commit (commit 3, term 2)
/// recorded between the third and fourth.
///
/// # Expected behavior
/// Enumeration returns the zero anchor and the first three pointers; the
/// trailing orphan at index 4 has no covering commit and is excluded.
#[test]
fn enumeration_excludes_trailing_orphan() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let mut wal = Wal::create_with(&dir, b"m", small_opts(64 * 1024)).unwrap();
    wal.save_snapshot(&snap(1, 1)).unwrap();
    wal.save_snapshot(&snap(2, 1)).unwrap();
    wal.save_snapshot(&snap(3, 2)).unwrap();
    wal.save(&hs(2, 0, 3), &[]).unwrap();
    wal.save_snapshot(&snap(4, 2)).unwrap();
    wal.close().unwrap();

    let snaps = valid_snapshot_entries(&dir).unwrap();
    assert_eq!(
        snaps,
        vec![Snapshot::default(), snap(1, 1), snap(2, 1), snap(3, 2)]
    );
}

/// # Scenario
/// No hard state was ever committed, so nothing proves any pointer
/// durable — not even the zero anchor.
#[test]
fn enumeration_without_commits_is_empty() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let mut wal = Wal::create_with(&dir, b"m", small_opts(64 * 1024)).unwrap();
    wal.save_snapshot(&snap(1, 1)).unwrap();
    wal.close().unwrap();

    assert!(valid_snapshot_entries(&dir).unwrap().is_empty());
}

/// # Scenario
/// A commit under a lower term does not legitimize a higher-term pointer.
#[test]
fn enumeration_requires_covering_term() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let mut wal = Wal::create_with(&dir, b"m", small_opts(64 * 1024)).unwrap();
    wal.save_snapshot(&snap(1, 5)).unwrap();
    wal.save(&hs(2, 0, 9), &[]).unwrap();
    wal.close().unwrap();

    // Commit 9 covers index 1, but term 2 < 5.
    let snaps = valid_snapshot_entries(&dir).unwrap();
    assert_eq!(snaps, vec![Snapshot::default()]);
}

/// # Scenario
/// Enumeration spans cuts and collapses the pointer each cut restates.
#[test]
fn enumeration_spans_segments_without_duplicates() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let mut wal = Wal::create_with(&dir, b"m", small_opts(64 * 1024)).unwrap();
    wal.save(&hs(1, 0, 0), &[ent(1, 1), ent(2, 1)]).unwrap();
    wal.save_snapshot(&snap(2, 1)).unwrap();
    wal.cut().unwrap();
    wal.save(&hs(1, 0, 4), &[ent(3, 1), ent(4, 1)]).unwrap();
    wal.close().unwrap();

    let snaps = valid_snapshot_entries(&dir).unwrap();
    assert_eq!(snaps, vec![Snapshot::default(), snap(2, 1)]);
}

#[test]
fn verify_returns_the_last_hard_state() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let mut wal = Wal::create_with(&dir, b"m", small_opts(64 * 1024)).unwrap();
    wal.save(&hs(1, 1, 1), &[ent(1, 1)]).unwrap();
    wal.save(&hs(2, 1, 2), &[ent(2, 2)]).unwrap();
    wal.close().unwrap();

    let state = verify(&dir, &Snapshot::default()).unwrap();
    assert_eq!(state, hs(2, 1, 2));
}

#[test]
fn verify_rejects_a_corrupted_stream() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("wal");
    let mut wal = Wal::create_with(&dir, b"m", small_opts(64 * 1024)).unwrap();
    wal.save(&hs(1, 1, 1), &(1..=8).map(|i| ent(i, 1)).collect::<Vec<_>>())
        .unwrap();
    wal.cut().unwrap();
    wal.save(&Default::default(), &[ent(9, 1)]).unwrap();
    wal.close().unwrap();

    // Flip a byte in the sealed segment.
    let sealed = super::helpers::segment_path_with_seq(&dir, 0);
    let start = super::helpers::entry_frame_start(&sealed, 4) + 15;
    use std::io::{Read, Seek, SeekFrom, Write};
    let mut f = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&sealed)
        .unwrap();
    f.seek(SeekFrom::Start(start)).unwrap();
    let mut byte = [0u8; 1];
    f.read_exact(&mut byte).unwrap();
    f.seek(SeekFrom::Start(start)).unwrap();
    f.write_all(&[byte[0] ^ 0x40]).unwrap();
    f.sync_all().unwrap();

    let err = verify(&dir, &Snapshot::default()).unwrap_err();
    assert!(matches!(
        err,
        WalError::CrcMismatch | WalError::UnexpectedEof
    ));
}
