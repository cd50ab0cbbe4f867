//! In-memory journal for tests and ephemeral servers.

use super::{decode_frames, encode_frame, EventJournal, JournalEntry};
use crate::error::StoreResult;

/// A journal held in memory.
///
/// Frames are encoded exactly as on disk, so the image returned by
/// [`MemoryJournal::data`] can seed a recovery test.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    data: Vec<u8>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal over an existing image.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns a copy of the journal image.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl EventJournal for MemoryJournal {
    fn append(&mut self, entry: &JournalEntry) -> StoreResult<()> {
        let frame = encode_frame(entry)?;
        self.data.extend_from_slice(&frame);
        Ok(())
    }

    fn replay(&mut self) -> StoreResult<Vec<JournalEntry>> {
        let decoded = decode_frames(&self.data)?;
        self.data.truncate(decoded.valid_len as usize);
        Ok(decoded.entries)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
