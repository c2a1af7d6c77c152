//! Durable vote journal.
//!
//! The journal is the persisted form of the `vote_records` table. The
//! tally is rebuilt from it on startup, so records and counts can never
//! disagree on disk.
//!
//! File format: a sequence of frames, each a big-endian `u32` length
//! followed by that many bytes of CBOR-encoded [`VoteReceipt`].

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::{Error, VoteReceipt};

/// Frames larger than this are treated as corruption.
const MAX_FRAME_LEN: usize = 64 * 1024;

/// Append-only storage for accepted votes.
pub trait VoteJournal: Send {
    /// Read every stored receipt, in append order.
    fn load(&mut self) -> Result<Vec<VoteReceipt>, Error>;

    /// Durably store one receipt. On error nothing is stored.
    fn append(&mut self, receipt: &VoteReceipt) -> Result<(), Error>;
}

/// In-memory journal. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryJournal {
    entries: Arc<Mutex<Vec<VoteReceipt>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing entries.
    pub fn with_entries(entries: Vec<VoteReceipt>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
            unavailable: Arc::default(),
        }
    }

    /// Make appends fail, simulating an unreachable store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<VoteReceipt> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl VoteJournal for MemoryJournal {
    fn load(&mut self) -> Result<Vec<VoteReceipt>, Error> {
        Ok(self.entries())
    }

    fn append(&mut self, receipt: &VoteReceipt) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "memory journal marked unavailable",
            )));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(receipt.clone());
        Ok(())
    }
}

/// Append-only journal file, synced on every append.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    /// Length of the valid prefix of the file.
    len: u64,
}

impl FileJournal {
    /// Open or create the journal at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self { path, file, len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VoteJournal for FileJournal {
    fn load(&mut self) -> Result<Vec<VoteReceipt>, Error> {
        let mut buf = Vec::new();
        File::open(&self.path)?.read_to_end(&mut buf)?;

        let mut receipts = Vec::new();
        let mut offset = 0usize;

        while offset < buf.len() {
            let sequence = receipts.len() as u64;
            let Some(header) = buf.get(offset..offset + 4) else {
                break;
            };
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(header);
            let frame_len = u32::from_be_bytes(len_bytes) as usize;
            if frame_len == 0 || frame_len > MAX_FRAME_LEN {
                return Err(Error::corrupt(sequence, format!("bad frame length {frame_len}")));
            }

            let start = offset + 4;
            let Some(frame) = buf.get(start..start + frame_len) else {
                break;
            };
            let receipt: VoteReceipt = ciborium::from_reader(frame)
                .map_err(|e| Error::corrupt(sequence, e.to_string()))?;
            receipts.push(receipt);
            offset = start + frame_len;
        }

        if offset < buf.len() {
            warn!(
                path = %self.path.display(),
                dropped_bytes = buf.len() - offset,
                "Truncating incomplete trailing journal frame"
            );
            self.file.set_len(offset as u64)?;
            self.file.sync_data()?;
        }
        self.len = offset as u64;

        debug!(path = %self.path.display(), entries = receipts.len(), "Loaded vote journal");
        Ok(receipts)
    }

    fn append(&mut self, receipt: &VoteReceipt) -> Result<(), Error> {
        let mut body = Vec::new();
        ciborium::into_writer(receipt, &mut body)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(Error::Serialization(format!(
                "receipt frame of {} bytes exceeds {MAX_FRAME_LEN}",
                body.len()
            )));
        }

        let mut frame = Vec::with_capacity(body.len() + 4);
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);

        let written = self
            .file
            .write_all(&frame)
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data());

        if let Err(e) = written {
            // Drop whatever part of the frame reached the file.
            if let Err(rollback) = self.truncate_to_valid_len() {
                warn!(error = %rollback, "Failed to roll back partial journal frame");
            }
            return Err(Error::Io(e));
        }

        self.len += frame.len() as u64;
        Ok(())
    }
}

impl FileJournal {
    /// Cut the file back to its last complete frame, through a fresh handle
    /// since the one that failed may be unusable.
    fn truncate_to_valid_len(&self) -> std::io::Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(self.len)?;
        file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CandidateId, Hash, ReceiptSigner, VoterIdentity};
    use tempfile::tempdir;

    fn receipts(n: u64) -> Vec<VoteReceipt> {
        let signer = ReceiptSigner::generate();
        let mut prev = Hash::ZERO;
        (0..n)
            .map(|i| {
                let r = VoteReceipt::issue(
                    i,
                    VoterIdentity::new(format!("voter-{i}")).unwrap(),
                    CandidateId(1 + (i % 2) as u32),
                    1_000 + i,
                    prev,
                    &signer,
                )
                .unwrap();
                prev = r.digest;
                r
            })
            .collect()
    }

    #[test]
    fn file_journal_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("votes.journal");
        let written = receipts(3);

        {
            let mut journal = FileJournal::open(&path).unwrap();
            assert!(journal.load().unwrap().is_empty());
            for r in &written {
                journal.append(r).unwrap();
            }
        }

        let mut journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.load().unwrap(), written);
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("votes.journal");
        let written = receipts(2);

        {
            let mut journal = FileJournal::open(&path).unwrap();
            for r in &written {
                journal.append(r).unwrap();
            }
        }
        let full_len = std::fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&[0, 0, 0, 40, 1, 2, 3])
            .unwrap();

        let mut journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.load().unwrap(), written);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), full_len);

        // Appends continue cleanly after the truncated frame.
        let more = receipts(1);
        journal.append(&more[0]).unwrap();
        let mut reopened = FileJournal::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap().len(), 3);
    }

    #[test]
    fn failed_append_rolls_back_partial_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("votes.journal");
        let written = receipts(2);

        let mut journal = FileJournal::open(&path).unwrap();
        journal.append(&written[0]).unwrap();
        let valid_len = std::fs::metadata(&path).unwrap().len();

        // Half a frame reaches the file, then the handle stops accepting writes.
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&[0, 0, 0, 40, 1, 2])
            .unwrap();
        journal.file = File::open(&path).unwrap();

        assert!(matches!(journal.append(&written[1]), Err(Error::Io(_))));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), valid_len);

        let mut reopened = FileJournal::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), written[..1]);
        reopened.append(&written[1]).unwrap();
        assert_eq!(FileJournal::open(&path).unwrap().load().unwrap(), written);
    }

    #[test]
    fn garbage_frame_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("votes.journal");
        std::fs::write(&path, [0, 0, 0, 3, 0xff, 0xff, 0xff]).unwrap();

        let mut journal = FileJournal::open(&path).unwrap();
        assert!(matches!(
            journal.load(),
            Err(Error::JournalCorrupt { sequence: 0, .. })
        ));
    }

    #[test]
    fn unavailable_memory_journal_rejects_appends() {
        let journal = MemoryJournal::new();
        let mut handle = journal.clone();
        let r = receipts(1);

        journal.set_unavailable(true);
        assert!(handle.append(&r[0]).is_err());
        assert!(journal.entries().is_empty());

        journal.set_unavailable(false);
        handle.append(&r[0]).unwrap();
        assert_eq!(journal.entries().len(), 1);
    }
}
