//! Journal entry types.
//!
//! Each journal record has the following on-disk format:
//!
//! ```text
//! +----------+----------+----------+----------+----------+----------+
//! | magic    | kind     | flags    | reserved | length   | crc32c   |
//! | 4 bytes  | 1 byte   | 1 byte   | 2 bytes  | 4 bytes  | 4 bytes  |
//! +----------+----------+----------+----------+----------+----------+
//! | sequence_number     | payload (JSON)                            |
//! | 8 bytes             | length bytes                              |
//! +---------------------+-------------------------------------------+
//! ```

use crate::error::WalError;
use crate::RECORD_HEADER_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Magic bytes for journal records: "FFJL"
pub const JOURNAL_MAGIC: [u8; 4] = *b"FFJL";

/// Maximum record payload size (16 MiB).
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Kind of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// A set of record changes applied atomically.
    Commit = 1,
    /// Marker written after the state was captured in a snapshot.
    Checkpoint = 2,
}

impl TryFrom<u8> for EntryKind {
    type Error = WalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EntryKind::Commit),
            2 => Ok(EntryKind::Checkpoint),
            _ => Err(WalError::InvalidHeader {
                offset: 0,
                reason: format!("unknown entry kind: {}", value),
            }),
        }
    }
}

/// A parsed record header.
#[derive(Debug, Clone)]
pub struct RecordHeader {
    pub kind: EntryKind,
    pub flags: u8,
    pub payload_len: u32,
    pub crc32c: u32,
    pub sequence: u64,
}

/// A complete journal record (header + payload).
#[derive(Debug, Clone)]
pub struct JournalRecord {
    pub header: RecordHeader,
    pub payload: Bytes,
}

impl JournalRecord {
    /// Creates a new record, computing the payload checksum.
    pub fn new(kind: EntryKind, sequence: u64, payload: Bytes) -> Self {
        let crc = crc32c::crc32c(&payload);
        Self {
            header: RecordHeader {
                kind,
                flags: 0,
                payload_len: payload.len() as u32,
                crc32c: crc,
                sequence,
            },
            payload,
        }
    }

    /// Encodes the record into bytes.
    pub fn encode(&self) -> Result<BytesMut, WalError> {
        if self.payload.len() > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                size: self.payload.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(self.disk_size());
        buf.put_slice(&JOURNAL_MAGIC);
        buf.put_u8(self.header.kind as u8);
        buf.put_u8(self.header.flags);
        buf.put_u16(0);
        buf.put_u32(self.header.payload_len);
        buf.put_u32(self.header.crc32c);
        buf.put_u64(self.header.sequence);
        buf.put_slice(&self.payload);

        Ok(buf)
    }

    /// Returns the total record length announced by the header at the front
    /// of `buf`, or `None` if fewer than a header's worth of bytes remain or
    /// the header is zero padding.
    pub fn peek_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < RECORD_HEADER_SIZE || buf[0..4] == [0, 0, 0, 0] {
            return None;
        }
        let payload_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        Some(RECORD_HEADER_SIZE + payload_len)
    }

    /// Decodes a record from the front of `buf`.
    ///
    /// Returns `Ok(None)` when the buffer holds less than one full record.
    pub fn decode(buf: &mut BytesMut, offset: u64) -> Result<Option<Self>, WalError> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Ok(None);
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != JOURNAL_MAGIC {
            if magic == [0, 0, 0, 0] {
                return Ok(None);
            }
            return Err(WalError::InvalidHeader {
                offset,
                reason: format!("invalid magic: {:?}", magic),
            });
        }

        let kind = EntryKind::try_from(buf[4]).map_err(|_| WalError::InvalidHeader {
            offset,
            reason: format!("unknown entry kind: {}", buf[4]),
        })?;
        let flags = buf[5];
        let payload_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        let crc_expected = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let sequence = u64::from_be_bytes([
            buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
        ]);

        if payload_len > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                size: payload_len,
                max: MAX_RECORD_SIZE,
            });
        }
        if buf.len() < RECORD_HEADER_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(RECORD_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        let crc_actual = crc32c::crc32c(&payload);
        if crc_actual != crc_expected {
            return Err(WalError::CorruptedRecord {
                offset,
                expected: crc_expected,
                actual: crc_actual,
            });
        }

        Ok(Some(Self {
            header: RecordHeader {
                kind,
                flags,
                payload_len: payload_len as u32,
                crc32c: crc_expected,
                sequence,
            },
            payload,
        }))
    }

    /// Returns the total size of this record on disk.
    pub fn disk_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.payload.len()
    }
}

/// A single record change inside a commit.
///
/// Records travel as JSON so the journal stays independent of the entity
/// types defined by `fleetflow-core`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalChange {
    Put {
        kind: String,
        id: String,
        record: serde_json::Value,
    },
    Delete {
        kind: String,
        id: String,
    },
}

impl JournalChange {
    /// Returns the `(kind, id)` key this change touches.
    pub fn key(&self) -> (&str, &str) {
        match self {
            JournalChange::Put { kind, id, .. } | JournalChange::Delete { kind, id } => (kind, id),
        }
    }
}

/// Typed journal entry with deserialized payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEntry {
    Commit {
        commit_id: String,
        changes: Vec<JournalChange>,
    },
    Checkpoint {
        timestamp: i64,
        /// Journal sequence covered by the snapshot this checkpoint follows.
        snapshot_sequence: u64,
    },
}

impl JournalEntry {
    /// Returns the entry kind for this entry.
    pub fn kind(&self) -> EntryKind {
        match self {
            JournalEntry::Commit { .. } => EntryKind::Commit,
            JournalEntry::Checkpoint { .. } => EntryKind::Checkpoint,
        }
    }

    /// Returns the number of record changes carried by this entry.
    pub fn change_count(&self) -> usize {
        match self {
            JournalEntry::Commit { changes, .. } => changes.len(),
            JournalEntry::Checkpoint { .. } => 0,
        }
    }
}
