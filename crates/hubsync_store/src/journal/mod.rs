//! Durable journal backing the access event store.
//!
//! Every committed write transaction becomes exactly one frame:
//!
//! ```text
//! magic "HSJF" (4) | version u16 LE (2) | payload length u32 LE (4) | CBOR payload | CRC32 LE (4)
//! ```
//!
//! The CRC covers the header and the payload. On replay a frame cut short at
//! the end of the journal is a torn write and marks the end of the log; a
//! complete frame with a bad magic, version or checksum is corruption.

mod file;
mod memory;

pub use file::FileJournal;
pub use memory::MemoryJournal;

use crate::error::{StoreError, StoreResult};
use crate::types::{AccessEvent, AccessPointId, ManagerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"HSJF";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_SIZE: usize = 10;

const CRC_SIZE: usize = 4;

/// Which record a heartbeat mark refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatTarget {
    /// A manager or hub.
    Manager(ManagerId),
    /// A stand-alone access point.
    Point(AccessPointId),
}

/// A heartbeat timestamp written by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMark {
    /// Record that checked in.
    pub target: HeartbeatTarget,
    /// Server time of the check-in.
    pub at: DateTime<Utc>,
}

/// Payload of one journal frame: everything a transaction committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Appended access events.
    pub events: Vec<AccessEvent>,
    /// Heartbeat timestamps.
    pub heartbeats: Vec<HeartbeatMark>,
}

impl JournalEntry {
    /// Returns true if the entry carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.heartbeats.is_empty()
    }
}

/// An append-only sink for committed transactions.
///
/// # Invariants
///
/// - `append` either makes the whole entry durable or returns an error and
///   leaves the previously replayable entries unchanged
/// - `replay` returns every appended entry in append order
pub trait EventJournal: Send + Sync {
    /// Durably appends one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    fn append(&mut self, entry: &JournalEntry) -> StoreResult<()>;

    /// Reads back all entries in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if a complete frame is corrupted.
    fn replay(&mut self) -> StoreResult<Vec<JournalEntry>>;

    /// Returns the journal size in bytes.
    fn size(&self) -> u64;
}

/// Result of decoding a journal image.
#[derive(Debug)]
pub struct DecodedJournal {
    /// Entries of every complete frame.
    pub entries: Vec<JournalEntry>,
    /// Byte length covered by complete frames.
    pub valid_len: u64,
}

/// Encodes an entry into a frame.
pub fn encode_frame(entry: &JournalEntry) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(entry, &mut payload).map_err(|e| StoreError::Encode(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Encode(format!("frame too large: {} bytes", payload.len())))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&JOURNAL_MAGIC);
    frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Decodes all complete frames of a journal image.
pub fn decode_frames(bytes: &[u8]) -> StoreResult<DecodedJournal> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[0..4] != JOURNAL_MAGIC {
            return Err(StoreError::corrupted(offset as u64, "bad frame magic"));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != JOURNAL_VERSION {
            return Err(StoreError::corrupted(
                offset as u64,
                format!("unsupported frame version {version}"),
            ));
        }
        let len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let frame_len = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < frame_len {
            break;
        }

        let body = &rest[..HEADER_SIZE + len];
        let stored = &rest[HEADER_SIZE + len..frame_len];
        let stored_crc = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        if compute_crc32(body) != stored_crc {
            return Err(StoreError::corrupted(offset as u64, "checksum mismatch"));
        }

        let entry: JournalEntry = ciborium::from_reader(&body[HEADER_SIZE..])
            .map_err(|e| StoreError::corrupted(offset as u64, e.to_string()))?;
        entries.push(entry);
        offset += frame_len;
    }

    if offset < bytes.len() {
        tracing::warn!(
            offset,
            trailing = bytes.len() - offset,
            "ignoring torn frame at end of journal"
        );
    }

    Ok(DecodedJournal {
        entries,
        valid_len: offset as u64,
    })
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}
