//! Record framing over segment files.
//!
//! The framer owns the byte-level layout of a segment and the rolling CRC
//! that chains every record to its predecessor — across segment boundaries
//! as well, carried by `crc` checkpoint records.
//!
//! # On-disk layout
//!
//! ```text
//! [len u64 LE][type uvarint][crc u32 LE][body][0–7 zero padding]
//! [len u64 LE][type uvarint][crc u32 LE][body][0–7 zero padding]
//! ...
//! [zeroes to end of preallocated region]
//! ```
//!
//! The low 56 bits of the length field give the record byte length
//! (`type + crc + body`). Padding rounds each frame to an 8-byte boundary;
//! its byte count lives in the low 3 bits of the length field's most
//! significant byte, whose set sign bit marks that padding is present. A
//! length field of zero marks the end of the written region, so a reader
//! never depends on the physical file length.
//!
//! # Failure modes
//!
//! Decoding fails with `unexpected-eof` when the stream ends inside a frame
//! (the torn-write signal), `crc-mismatch` when the chained checksum does
//! not match, and `invalid-frame` / `record-too-large` for implausible
//! length fields.


use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};

use crate::encoding;
use crate::error::WalError;
use crate::record::{Record, RecordKind};
use crc32fast::Hasher as Crc32;
use tracing::trace;

/// Width of the frame length field.
pub(crate) const FRAME_HEADER_LEN: usize = 8;

/// Maximum accepted record length (`type + crc + body`), 10 MiB.
pub(crate) const MAX_RECORD_SIZE: u64 = 10 * 1024 * 1024;

/// Smallest sector size the torn-write heuristic assumes.
const MIN_SECTOR_SIZE: u64 = 512;

const PAD_ZEROES: [u8; 8] = [0; 8];

// ------------------------------------------------------------------------------------------------
// Frame size math
// ------------------------------------------------------------------------------------------------

/// Build the length field for a record of `data_len` bytes.
///
/// Returns the field and the number of trailing padding bytes that round
/// the frame to an 8-byte boundary.
pub(crate) fn encode_frame_size(data_len: usize) -> (u64, usize) {
    let mut len_field = data_len as u64;
    let pad = (8 - (data_len % 8)) % 8;
    if pad != 0 {
        len_field |= (0x80 | pad as u64) << 56;
    }
    (len_field, pad)
}

/// Split a length field into `(record_len, pad_len)`.
///
/// Masking the padding bits and validating the remaining length is a single
/// step: callers must never compare the raw field against available bytes.
pub(crate) fn decode_frame_size(len_field: i64) -> (u64, u64) {
    let record_len = (len_field as u64) & !(0xffu64 << 56);
    let pad_len = if len_field < 0 {
        ((len_field as u64) >> 56) & 0x7
    } else {
        0
    };
    (record_len, pad_len)
}

// ------------------------------------------------------------------------------------------------
// Encoder
// ------------------------------------------------------------------------------------------------

/// Buffered record writer bound to the tail segment.
///
/// `encode` only fills the internal buffer; the writer calls [`sync`] at
/// commit points. The encoder carries the rolling CRC: after each record
/// it remembers the CRC just written and seeds the next record with it.
///
/// [`sync`]: Encoder::sync
#[derive(Debug)]
pub(crate) struct Encoder {
    out: BufWriter<File>,
    crc: u32,
    scratch: Vec<u8>,
}

impl Encoder {
    /// Bind an encoder to `file` at its current position, continuing the
    /// CRC chain from `prev_crc`.
    pub(crate) fn new(file: File, prev_crc: u32) -> Self {
        Self {
            out: BufWriter::new(file),
            crc: prev_crc,
            scratch: Vec::new(),
        }
    }

    /// The running CRC after the last encoded record.
    pub(crate) fn crc(&self) -> u32 {
        self.crc
    }

    /// Frame and buffer one record.
    ///
    /// A [`RecordKind::Crc`] record does not advance the chain; its CRC
    /// field carries the current running value over an empty body.
    pub(crate) fn encode(&mut self, kind: RecordKind, body: &[u8]) -> Result<(), WalError> {
        let crc = if kind == RecordKind::Crc {
            self.crc
        } else {
            let mut hasher = Crc32::new_with_initial(self.crc);
            hasher.update(body);
            hasher.finalize()
        };

        self.scratch.clear();
        encoding::write_uvarint(kind.tag(), &mut self.scratch);
        self.scratch.extend_from_slice(&crc.to_le_bytes());
        self.scratch.extend_from_slice(body);

        let record_len = self.scratch.len() as u64;
        if record_len > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                len: record_len,
                limit: MAX_RECORD_SIZE,
            });
        }

        let (len_field, pad) = encode_frame_size(self.scratch.len());
        self.out.write_all(&len_field.to_le_bytes())?;
        self.out.write_all(&self.scratch)?;
        if pad > 0 {
            self.out.write_all(&PAD_ZEROES[..pad])?;
        }
        self.crc = crc;

        trace!(
            kind = kind.tag(),
            len = record_len,
            crc = format_args!("{crc:08x}"),
            "record encoded"
        );
        Ok(())
    }

    /// Flush buffered bytes and fsync the underlying file.
    pub(crate) fn sync(&mut self) -> Result<(), WalError> {
        self.out.flush()?;
        self.out.get_ref().sync_data()?;
        Ok(())
    }

    /// Flush and report the file offset of the next frame.
    pub(crate) fn current_offset(&mut self) -> Result<u64, WalError> {
        self.out.flush()?;
        Ok(self.out.get_mut().stream_position()?)
    }
}

// ------------------------------------------------------------------------------------------------
// Decoder
// ------------------------------------------------------------------------------------------------

/// Streaming record reader over an ordered chain of segment files.
///
/// The decoder verifies the CRC chain record by record, remembers the byte
/// offset just past the last complete record of the file it is currently
/// reading, and distinguishes a torn tail write (all-zero sector in the
/// final segment) from genuine corruption.
pub(crate) struct Decoder {
    readers: Vec<BufReader<File>>,
    /// Index of the file currently being read.
    index: usize,
    /// Running chain value.
    crc: u32,
    /// Offset just past the last complete record in the current file.
    last_valid_off: u64,
}

impl Decoder {
    /// Build a decoder over `files`, ordered oldest first, each positioned
    /// at its start.
    pub(crate) fn new(files: Vec<File>) -> Self {
        Self {
            readers: files.into_iter().map(BufReader::new).collect(),
            index: 0,
            crc: 0,
            last_valid_off: 0,
        }
    }

    /// The running chain value.
    pub(crate) fn crc(&self) -> u32 {
        self.crc
    }

    /// Reset the chain, as directed by a `crc` checkpoint record.
    pub(crate) fn set_crc(&mut self, crc: u32) {
        self.crc = crc;
    }

    /// Offset just past the last complete record in the current file.
    pub(crate) fn last_offset(&self) -> u64 {
        self.last_valid_off
    }

    /// True when the decoder is positioned in (or exhausted past) the final
    /// file of the chain.
    pub(crate) fn at_last_file(&self) -> bool {
        self.index + 1 >= self.readers.len()
    }

    /// Decode the next record, or `None` at the clean end of the stream.
    pub(crate) fn next_record(&mut self) -> Result<Option<Record>, WalError> {
        loop {
            let Some(reader) = self.readers.get_mut(self.index) else {
                return Ok(None);
            };

            let mut header = [0u8; FRAME_HEADER_LEN];
            let n = read_full(reader, &mut header)?;
            if n == 0 {
                // Clean end of this file. The final file keeps its offset so
                // the writer can resume at the byte past the last record.
                if self.at_last_file() {
                    return Ok(None);
                }
                self.index += 1;
                self.last_valid_off = 0;
                continue;
            }
            if n < FRAME_HEADER_LEN {
                return Err(WalError::UnexpectedEof);
            }

            let len_field = i64::from_le_bytes(header);
            if len_field == 0 {
                // Start of the preallocated zero region.
                if self.at_last_file() {
                    return Ok(None);
                }
                self.index += 1;
                self.last_valid_off = 0;
                continue;
            }

            let (record_len, pad_len) = decode_frame_size(len_field);
            if record_len == 0 {
                return Err(WalError::InvalidFrame(len_field));
            }
            if record_len > MAX_RECORD_SIZE {
                return Err(WalError::RecordTooLarge {
                    len: record_len,
                    limit: MAX_RECORD_SIZE,
                });
            }

            let padded_len = (record_len + pad_len) as usize;
            let mut frame = vec![0u8; padded_len];
            let n = read_full(reader, &mut frame)?;
            if n < padded_len {
                return Err(WalError::UnexpectedEof);
            }

            let record = self.parse_record(&frame, record_len as usize)?;
            self.last_valid_off += (FRAME_HEADER_LEN + padded_len) as u64;

            trace!(
                kind = record.kind.tag(),
                len = record_len,
                offset = self.last_valid_off,
                "record decoded"
            );
            return Ok(Some(record));
        }
    }

    /// Parse and chain-verify one record out of its padded frame bytes.
    ///
    /// A record that fails to parse or verify in the final file is
    /// re-examined with the torn-write heuristic before the failure is
    /// reported as corruption.
    fn parse_record(&mut self, frame: &[u8], record_len: usize) -> Result<Record, WalError> {
        match self.parse_record_inner(frame, record_len) {
            Ok(record) => Ok(record),
            Err(WalError::UnexpectedEof) => Err(WalError::UnexpectedEof),
            Err(e) => {
                if self.at_last_file() && self.is_torn_frame(frame) {
                    return Err(WalError::UnexpectedEof);
                }
                Err(e)
            }
        }
    }

    fn parse_record_inner(&mut self, frame: &[u8], record_len: usize) -> Result<Record, WalError> {
        let record_bytes = &frame[..record_len];
        let (tag, tag_len) = encoding::read_uvarint(record_bytes)?;
        let kind = RecordKind::from_tag(tag)?;

        if record_bytes.len() < tag_len + 4 {
            return Err(WalError::InvalidFrame(record_len as i64));
        }
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&record_bytes[tag_len..tag_len + 4]);
        let crc = u32::from_le_bytes(crc_bytes);
        let body = record_bytes[tag_len + 4..].to_vec();

        // Checkpoint records are validated against the running chain by the
        // scanner; every other record must extend the chain exactly.
        if kind != RecordKind::Crc {
            let mut hasher = Crc32::new_with_initial(self.crc);
            hasher.update(&body);
            let chained = hasher.finalize();
            if chained != crc {
                return Err(WalError::CrcMismatch);
            }
            self.crc = chained;
        }

        Ok(Record { kind, crc, data: body })
    }

    /// Torn-write heuristic for the final segment: split the frame at
    /// sector boundaries of its file offset; an all-zero chunk marks a
    /// write that never reached the disk.
    fn is_torn_frame(&self, frame: &[u8]) -> bool {
        let mut file_off = self.last_valid_off + FRAME_HEADER_LEN as u64;
        let mut cur = 0usize;
        while cur < frame.len() {
            let mut chunk_len = (MIN_SECTOR_SIZE - (file_off % MIN_SECTOR_SIZE)) as usize;
            if chunk_len > frame.len() - cur {
                chunk_len = frame.len() - cur;
            }
            let chunk = &frame[cur..cur + chunk_len];
            if chunk.iter().all(|&b| b == 0) {
                return true;
            }
            file_off += chunk_len as u64;
            cur += chunk_len;
        }
        false
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("files", &self.readers.len())
            .field("index", &self.index)
            .field("last_valid_off", &self.last_valid_off)
            .finish_non_exhaustive()
    }
}

// ------------------------------------------------------------------------------------------------
// Read helpers
// ------------------------------------------------------------------------------------------------

/// Read as many bytes as possible into `buf`, short only at end of file.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
