//! # quorumlog
//!
//! A crash-safe, append-only, segmented **write-ahead log** for replicated
//! consensus state machines. The log durably records, in strict order, the
//! three kinds of events a consensus layer emits — hard-state updates,
//! replicated entries, and snapshot pointers — and on restart reconstructs
//! the exact committed stream from the most recent snapshot the caller
//! names.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                           Wal                              │
//! │                                                            │
//! │  save / save_snapshot          open / read_all             │
//! │        │                             │                     │
//! │        ▼                             ▼                     │
//! │  ┌───────────┐                ┌───────────┐                │
//! │  │  Encoder  │                │  Decoder  │   codec        │
//! │  └─────┬─────┘                └─────┬─────┘                │
//! │        │ framed, CRC-chained records│                      │
//! │        ▼                            ▼                      │
//! │  ┌──────────────────────────────────────────┐              │
//! │  │ 0000…00-0000…00.wal  0000…01-0000…0b.wal │  segment     │
//! │  │ (sealed)             (tail, locked)      │              │
//! │  └──────────────────────────────────────────┘              │
//! │        discovery · selection · quarantine      fsutil      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`wal`] | The log itself — create, open, replay, append, cut, lock release |
//! | [`record`] | Record model: entries, hard state, snapshot pointers, wire tags |
//! | [`encoding`] | Deterministic, byte-stable body serialization |
//! | [`error`] | The crate-wide error taxonomy |
//!
//! ## Guarantees
//!
//! - **Durability** — every append blocks until fsync; committed records
//!   are replayed after a crash in exactly the order they were written.
//! - **Integrity** — a rolling CRC-32 chains every record to its
//!   predecessor, across segment boundaries; any single-byte mutation is
//!   detected from that point forward.
//! - **Torn-write recovery** — a crash mid-append leaves a partial record
//!   at the tail, which recovery truncates away before handing the log
//!   back to the writer.
//! - **Single writer** — advisory file locks keep a second process from
//!   appending to the same directory while readers stay unrestricted.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use quorumlog::{Entry, HardState, Snapshot, Wal};
//!
//! # fn main() -> Result<(), quorumlog::WalError> {
//! // Create a log and append one committed entry.
//! let mut wal = Wal::create("/var/lib/node0/wal", b"node-0")?;
//! let state = HardState { term: 1, vote: 1, commit: 1 };
//! let entry = Entry { term: 1, index: 1, data: b"put x=1".to_vec(), ..Default::default() };
//! wal.save(&state, &[entry])?;
//! wal.close()?;
//!
//! // Replay it after a restart.
//! let mut wal = Wal::open("/var/lib/node0/wal", Snapshot::default())?;
//! let (metadata, state, entries) = wal.read_all()?;
//! assert_eq!(metadata, b"node-0");
//! assert_eq!(entries.len(), 1);
//! # Ok(())
//! # }
//! ```

mod codec;
pub mod encoding;
pub mod error;
mod fsutil;
pub mod record;
mod segment;
pub mod wal;

pub use error::WalError;
pub use fsutil::{exists, quarantine};
pub use record::{ConfState, Entry, EntryKind, HardState, Record, RecordKind, Snapshot};
pub use wal::{SEGMENT_SIZE_BYTES, Wal, WalOptions, valid_snapshot_entries, verify};
