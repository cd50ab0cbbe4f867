//! File-backed journal.

use super::{decode_frames, encode_frame, EventJournal, JournalEntry};
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A journal stored in a single append-only file.
///
/// # Durability
///
/// Each `append` writes one frame and calls `File::sync_data` before
/// returning, so a committed transaction survives process termination.
///
/// # Locking
///
/// The file is exclusively locked while the journal is open. A second
/// server pointed at the same file fails with [`StoreError::Locked`].
///
/// # Example
///
/// ```no_run
/// use hubsync_store::{EventJournal, FileJournal};
/// use std::path::Path;
///
/// let mut journal = FileJournal::open(Path::new("events.journal")).unwrap();
/// let entries = journal.replay().unwrap();
/// ```
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    size: u64,
}

impl FileJournal {
    /// Opens or creates a journal at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is locked.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked(path.display().to_string()))?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
        })
    }

    /// Opens or creates a journal, creating parent directories if needed.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventJournal for FileJournal {
    fn append(&mut self, entry: &JournalEntry) -> StoreResult<()> {
        let frame = encode_frame(entry)?;

        self.file.seek(SeekFrom::Start(self.size))?;
        if let Err(err) = self.file.write_all(&frame).and_then(|()| self.file.sync_data()) {
            // Cut off whatever part of the frame reached the file.
            let _ = self.file.set_len(self.size);
            return Err(err.into());
        }
        self.size += frame.len() as u64;
        Ok(())
    }

    fn replay(&mut self) -> StoreResult<Vec<JournalEntry>> {
        let mut image = Vec::with_capacity(self.size as usize);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut image)?;

        let decoded = decode_frames(&image)?;
        if decoded.valid_len < image.len() as u64 {
            tracing::warn!(
                path = %self.path.display(),
                valid_len = decoded.valid_len,
                "truncating torn journal tail"
            );
            self.file.set_len(decoded.valid_len)?;
            self.file.sync_all()?;
        }
        self.size = decoded.valid_len;

        Ok(decoded.entries)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for FileJournal {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::tests::sample_entry;
    use tempfile::tempdir;

    #[test]
    fn entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.journal");

        {
            let mut journal = FileJournal::open(&path).unwrap();
            journal.append(&sample_entry(1)).unwrap();
            journal.append(&sample_entry(2)).unwrap();
        }

        let mut journal = FileJournal::open(&path).unwrap();
        assert_eq!(
            journal.replay().unwrap(),
            vec![sample_entry(1), sample_entry(2)]
        );
    }

    #[test]
    fn torn_tail_is_truncated_on_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.journal");

        let clean_len = {
            let mut journal = FileJournal::open(&path).unwrap();
            journal.append(&sample_entry(1)).unwrap();
            journal.size()
        };
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"HSJF\x01\x00\xff\x00\x00\x00partial").unwrap();
        }

        let mut journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.replay().unwrap().len(), 1);
        assert_eq!(journal.size(), clean_len);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), clean_len);

        journal.append(&sample_entry(2)).unwrap();
        assert_eq!(journal.replay().unwrap().len(), 2);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.journal");

        let _first = FileJournal::open(&path).unwrap();
        assert!(matches!(
            FileJournal::open(&path),
            Err(StoreError::Locked(_))
        ));
    }

    #[test]
    fn creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("events.journal");

        let journal = FileJournal::open_with_create_dirs(&path).unwrap();
        assert_eq!(journal.path(), path.as_path());
        assert!(path.exists());
    }
}
