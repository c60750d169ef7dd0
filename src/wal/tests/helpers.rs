//! Shared helpers for WAL tests.

use std::fs::File;
use std::path::Path;

use crate::codec::Decoder;
use crate::record::{Entry, HardState, RecordKind, Snapshot};
use crate::wal::WalOptions;
use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

/// An entry with a small recognizable payload.
pub fn ent(index: u64, term: u64) -> Entry {
    Entry {
        term,
        index,
        data: format!("entry-{index}").into_bytes(),
        ..Default::default()
    }
}

/// An entry padded to roughly `data_len` payload bytes.
pub fn sized_ent(index: u64, term: u64, data_len: usize) -> Entry {
    Entry {
        term,
        index,
        data: vec![b'x'; data_len],
        ..Default::default()
    }
}

pub fn hs(term: u64, vote: u64, commit: u64) -> HardState {
    HardState { term, vote, commit }
}

pub fn snap(index: u64, term: u64) -> Snapshot {
    Snapshot {
        index,
        term,
        ..Default::default()
    }
}

/// Small segments so rotation is cheap to trigger in tests.
pub fn small_opts(segment_size: u64) -> WalOptions {
    WalOptions { segment_size }
}

/// Byte offset of the frame of the `n`-th (1-based) entry record in a
/// first-generation segment file.
pub fn entry_frame_start(path: &Path, n: usize) -> u64 {
    let file = File::open(path).unwrap();
    let mut decoder = Decoder::new(vec![file]);
    let mut seen = 0;
    loop {
        let frame_start = decoder.last_offset();
        match decoder.next_record() {
            Ok(Some(record)) if record.kind == RecordKind::Entry => {
                seen += 1;
                if seen == n {
                    return frame_start;
                }
            }
            Ok(Some(_)) => {}
            other => panic!("entry {n} not found in {}: {other:?}", path.display()),
        }
    }
}

/// The single segment file matching a 16-hex-digit sequence prefix.
pub fn segment_path_with_seq(dir: &Path, seq: u64) -> std::path::PathBuf {
    let prefix = format!("{seq:016x}-");
    let mut matches: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    assert_eq!(matches.len(), 1, "expected one segment with seq {seq}");
    matches.pop().unwrap()
}
