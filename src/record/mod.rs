//! WAL record model.
//!
//! A segment file is an ordered sequence of records. Each record carries a
//! type tag, a chained CRC, and an opaque body; this module defines the tag
//! space, the framed [`Record`] value, and the bodies the log itself
//! interprets: replicated [`Entry`] payloads, the consensus [`HardState`]
//! triple, and compaction [`Snapshot`] pointers.
//!
//! Wire tag values are stable and must never be renumbered:
//!
//! | tag | record          |
//! |-----|-----------------|
//! | 1   | metadata        |
//! | 2   | entry           |
//! | 3   | hard state      |
//! | 4   | crc checkpoint  |
//! | 5   | snapshot pointer|

use crate::encoding::{self, Decode, Encode, EncodingError};

// ------------------------------------------------------------------------------------------------
// Record kinds
// ------------------------------------------------------------------------------------------------

/// Type tag of a WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Caller-supplied, opaque log identity written once per segment.
    Metadata,
    /// A replicated log entry.
    Entry,
    /// A consensus hard-state update.
    State,
    /// CRC checkpoint carrying the running chain value into a new segment.
    Crc,
    /// A snapshot pointer marking compacted history.
    Snapshot,
}

impl RecordKind {
    /// Stable wire tag for this kind.
    pub fn tag(self) -> u64 {
        match self {
            RecordKind::Metadata => 1,
            RecordKind::Entry => 2,
            RecordKind::State => 3,
            RecordKind::Crc => 4,
            RecordKind::Snapshot => 5,
        }
    }

    /// Map a wire tag back to a kind.
    pub fn from_tag(tag: u64) -> Result<Self, EncodingError> {
        match tag {
            1 => Ok(RecordKind::Metadata),
            2 => Ok(RecordKind::Entry),
            3 => Ok(RecordKind::State),
            4 => Ok(RecordKind::Crc),
            5 => Ok(RecordKind::Snapshot),
            other => Err(EncodingError::InvalidTag {
                tag: other,
                type_name: "RecordKind",
            }),
        }
    }
}

/// One framed record as read back from a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Type tag.
    pub kind: RecordKind,
    /// CRC-32 over the body, chained with the previous record's CRC. For
    /// [`RecordKind::Crc`] records this *is* the payload: the running chain
    /// value, with an empty body.
    pub crc: u32,
    /// Opaque body bytes.
    pub data: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// Entries
// ------------------------------------------------------------------------------------------------

/// Payload class of a replicated entry.
///
/// The log stores the tag verbatim; only the consensus layer acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    /// A normal state-machine command.
    #[default]
    Normal,
    /// A cluster-membership change.
    ConfChange,
}

impl EntryKind {
    fn tag(self) -> u32 {
        match self {
            EntryKind::Normal => 0,
            EntryKind::ConfChange => 1,
        }
    }
}

/// A single replicated log entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entry {
    /// Term under which the entry was proposed.
    pub term: u64,
    /// Position in the replicated log. Strictly increasing by 1 across the
    /// recovered stream.
    pub index: u64,
    /// Payload class.
    pub kind: EntryKind,
    /// Opaque command bytes.
    pub data: Vec<u8>,
}

impl Encode for Entry {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.term.encode_to(buf)?;
        self.index.encode_to(buf)?;
        self.kind.tag().encode_to(buf)?;
        self.data.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Entry {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (term, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (index, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (tag, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let kind = match tag {
            0 => EntryKind::Normal,
            1 => EntryKind::ConfChange,
            other => {
                return Err(EncodingError::InvalidTag {
                    tag: u64::from(other),
                    type_name: "EntryKind",
                });
            }
        };
        let (data, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                term,
                index,
                kind,
                data,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Hard state
// ------------------------------------------------------------------------------------------------

/// The consensus durability triple replayed on restart.
///
/// Only the *last* hard state in a recovered stream is returned to the
/// caller; earlier ones are superseded in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HardState {
    /// Current term.
    pub term: u64,
    /// Node voted for in the current term (0 = none).
    pub vote: u64,
    /// Highest log index known committed.
    pub commit: u64,
}

impl HardState {
    /// True when no field has been set. Empty hard states are never written.
    pub fn is_empty(&self) -> bool {
        self.term == 0 && self.vote == 0 && self.commit == 0
    }
}

impl Encode for HardState {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.term.encode_to(buf)?;
        self.vote.encode_to(buf)?;
        self.commit.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for HardState {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (term, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (vote, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (commit, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { term, vote, commit }, offset))
    }
}

// ------------------------------------------------------------------------------------------------
// Snapshot pointers
// ------------------------------------------------------------------------------------------------

/// Cluster membership captured alongside a snapshot pointer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfState {
    /// Voting member IDs.
    pub voters: Vec<u64>,
    /// Non-voting learner IDs.
    pub learners: Vec<u64>,
}

impl Encode for ConfState {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::encode_vec(&self.voters, buf)?;
        encoding::encode_vec(&self.learners, buf)?;
        Ok(())
    }
}

impl Decode for ConfState {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (voters, n) = encoding::decode_vec::<u64>(&buf[offset..])?;
        offset += n;
        let (learners, n) = encoding::decode_vec::<u64>(&buf[offset..])?;
        offset += n;
        Ok((Self { voters, learners }, offset))
    }
}

/// A snapshot pointer: the `(index, term)` anchor below which entries have
/// been compacted away, plus the membership in force at that point.
///
/// Only the pointer lives in the log; snapshot *data* is stored elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Index of the last compacted entry.
    pub index: u64,
    /// Term of the last compacted entry.
    pub term: u64,
    /// Membership at the snapshot point.
    pub conf_state: ConfState,
}

impl Encode for Snapshot {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.index.encode_to(buf)?;
        self.term.encode_to(buf)?;
        self.conf_state.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Snapshot {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (index, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (term, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (conf_state, n) = ConfState::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                index,
                term,
                conf_state,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode_from_slice, encode_to_vec};

    #[test]
    fn record_kind_tags_are_stable() {
        assert_eq!(RecordKind::Metadata.tag(), 1);
        assert_eq!(RecordKind::Entry.tag(), 2);
        assert_eq!(RecordKind::State.tag(), 3);
        assert_eq!(RecordKind::Crc.tag(), 4);
        assert_eq!(RecordKind::Snapshot.tag(), 5);
        for tag in 1..=5 {
            assert_eq!(RecordKind::from_tag(tag).unwrap().tag(), tag);
        }
        assert!(RecordKind::from_tag(0).is_err());
        assert!(RecordKind::from_tag(6).is_err());
    }

    #[test]
    fn entry_round_trip() {
        let entry = Entry {
            term: 3,
            index: 17,
            kind: EntryKind::ConfChange,
            data: b"add node 4".to_vec(),
        };
        let bytes = encode_to_vec(&entry).unwrap();
        let (decoded, consumed) = decode_from_slice::<Entry>(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn hard_state_emptiness() {
        assert!(HardState::default().is_empty());
        assert!(
            !HardState {
                term: 1,
                vote: 0,
                commit: 0
            }
            .is_empty()
        );
    }

    #[test]
    fn snapshot_round_trip() {
        let snap = Snapshot {
            index: 42,
            term: 7,
            conf_state: ConfState {
                voters: vec![1, 2, 3],
                learners: vec![9],
            },
        };
        let bytes = encode_to_vec(&snap).unwrap();
        let (decoded, _) = decode_from_slice::<Snapshot>(&bytes).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn default_snapshot_is_the_zero_anchor() {
        let snap = Snapshot::default();
        assert_eq!(snap.index, 0);
        assert_eq!(snap.term, 0);
        assert!(snap.conf_state.voters.is_empty());
    }
}
