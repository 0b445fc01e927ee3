//! Single-file commit journal.

use crate::entry::{JournalEntry, JournalRecord};
use crate::error::WalError;
use crate::DEFAULT_MAX_JOURNAL_SIZE;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Fsync policy for journal writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsyncPolicy {
    /// Fsync after every commit (safest, slowest).
    #[default]
    EveryWrite,
    /// Fsync after N commits.
    EveryN(u32),
    /// Never fsync automatically (caller must call sync).
    Never,
}

/// Journal configuration.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Path of the journal file.
    pub path: PathBuf,
    /// Size after which the journal reports itself as due for compaction.
    pub max_size: u64,
    /// Fsync policy.
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: DEFAULT_MAX_JOURNAL_SIZE,
            fsync_policy: FsyncPolicy::default(),
        }
    }

    pub fn with_max_size(mut self, size: u64) -> Self {
        self.max_size = size;
        self
    }

    pub fn with_fsync_policy(mut self, policy: FsyncPolicy) -> Self {
        self.fsync_policy = policy;
        self
    }
}

/// What `Journal::open` found on disk.
#[derive(Debug, Clone, Default)]
pub struct OpenReport {
    /// Number of intact records.
    pub records: u64,
    /// Bytes cut off the end because the final record was torn.
    pub bytes_truncated: u64,
    /// Highest sequence number found.
    pub max_sequence: u64,
}

/// I/O statistics for the journal.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalStats {
    pub bytes_written: u64,
    pub writes: u64,
    pub fsyncs: u64,
}

struct Inner {
    file: File,
    size: u64,
    next_sequence: u64,
    writes_since_sync: u32,
    sync_pending: bool,
    closed: bool,
    stats: JournalStats,
}

/// Append-only commit journal.
pub struct Journal {
    config: JournalConfig,
    inner: Mutex<Inner>,
}

/// Result of scanning raw journal bytes.
struct Scan {
    records: Vec<(u64, JournalRecord)>,
    valid_len: u64,
}

impl Journal {
    /// Opens or creates the journal, truncating a torn final record.
    pub fn open(config: JournalConfig) -> Result<(Self, OpenReport), WalError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&config.path)?;

        let scan = scan_file(&mut file)?;
        let file_len = file.metadata()?.len();
        let report = OpenReport {
            records: scan.records.len() as u64,
            bytes_truncated: file_len - scan.valid_len,
            max_sequence: scan
                .records
                .iter()
                .map(|(_, r)| r.header.sequence)
                .max()
                .unwrap_or(0),
        };

        if report.bytes_truncated > 0 {
            tracing::warn!(
                "Journal {} has a torn tail: truncating {} bytes at offset {}",
                config.path.display(),
                report.bytes_truncated,
                scan.valid_len
            );
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        tracing::debug!(
            "Journal opened: {} records, next_sequence={}",
            report.records,
            report.max_sequence + 1
        );

        let journal = Self {
            inner: Mutex::new(Inner {
                file,
                size: scan.valid_len,
                next_sequence: report.max_sequence + 1,
                writes_since_sync: 0,
                sync_pending: false,
                closed: false,
                stats: JournalStats::default(),
            }),
            config,
        };

        Ok((journal, report))
    }

    /// Returns the journal file path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Appends an entry, returning the sequence number assigned to it.
    pub fn append(&self, entry: &JournalEntry) -> Result<u64, WalError> {
        let payload = serde_json::to_vec(entry)?;
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(WalError::Closed);
        }

        let sequence = inner.next_sequence;
        let record = JournalRecord::new(entry.kind(), sequence, Bytes::from(payload));
        let encoded = record.encode()?;

        let start = inner.size;
        if let Err(e) = write_frame(&mut inner, &encoded, self.config.fsync_policy) {
            discard_from(&mut inner, start);
            return Err(e);
        }
        inner.size += encoded.len() as u64;
        inner.next_sequence += 1;
        inner.stats.bytes_written += encoded.len() as u64;
        inner.stats.writes += 1;

        Ok(sequence)
    }

    /// Reads every entry in the journal, in sequence order.
    pub fn read_all(&self) -> Result<Vec<(u64, JournalEntry)>, WalError> {
        let mut inner = self.inner.lock();
        let scan = scan_file(&mut inner.file)?;

        scan.records
            .into_iter()
            .map(|(_, record)| {
                let entry: JournalEntry = serde_json::from_slice(&record.payload)?;
                Ok((record.header.sequence, entry))
            })
            .collect()
    }

    /// Discards every record while keeping the sequence counter.
    ///
    /// Only call this after a snapshot has captured all committed state.
    pub fn reset(&self) -> Result<(), WalError> {
        let mut inner = self.inner.lock();
        inner.file.set_len(0)?;
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.sync_all()?;
        inner.size = 0;
        inner.sync_pending = false;
        inner.writes_since_sync = 0;
        tracing::debug!("Journal reset at sequence {}", inner.next_sequence);
        Ok(())
    }

    /// Makes sure the next assigned sequence is greater than `sequence`.
    pub fn advance_past(&self, sequence: u64) {
        let mut inner = self.inner.lock();
        if inner.next_sequence <= sequence {
            inner.next_sequence = sequence + 1;
        }
    }

    /// Forces a sync to disk.
    pub fn sync(&self) -> Result<(), WalError> {
        let mut inner = self.inner.lock();
        sync_inner(&mut inner)
    }

    /// Syncs and refuses further appends.
    pub fn close(&self) -> Result<(), WalError> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        sync_inner(&mut inner)
    }

    /// Returns the sequence of the last appended record (0 when none).
    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().next_sequence - 1
    }

    /// Returns the current journal size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Returns whether the journal has outgrown its configured size.
    pub fn is_oversized(&self) -> bool {
        self.size() >= self.config.max_size
    }

    /// Returns the current I/O statistics.
    pub fn stats(&self) -> JournalStats {
        self.inner.lock().stats
    }
}

fn write_frame(inner: &mut Inner, encoded: &[u8], policy: FsyncPolicy) -> Result<(), WalError> {
    inner.file.seek(SeekFrom::End(0))?;
    inner.file.write_all(encoded)?;
    inner.sync_pending = true;
    inner.writes_since_sync += 1;

    let due = match policy {
        FsyncPolicy::EveryWrite => true,
        FsyncPolicy::EveryN(n) => inner.writes_since_sync >= n,
        FsyncPolicy::Never => false,
    };
    if due {
        sync_inner(inner)?;
    }
    Ok(())
}

/// Cuts the file back to `len` after a failed append, so a commit the caller
/// saw fail is never replayed. If the cut itself fails the journal closes.
fn discard_from(inner: &mut Inner, len: u64) {
    let cut = inner
        .file
        .set_len(len)
        .and_then(|_| inner.file.sync_data());
    match cut {
        Ok(()) => tracing::warn!("Discarded failed journal append at offset {}", len),
        Err(e) => {
            tracing::error!(
                "Failed to discard journal append at offset {}, closing journal: {}",
                len,
                e
            );
            inner.closed = true;
        }
    }
}

fn sync_inner(inner: &mut Inner) -> Result<(), WalError> {
    if inner.sync_pending {
        inner.file.sync_data()?;
        inner.sync_pending = false;
        inner.stats.fsyncs += 1;
    }
    inner.writes_since_sync = 0;
    Ok(())
}

/// Scans the whole file and returns every intact record plus the length of
/// the valid prefix. A damaged final record counts as a torn tail; damage
/// anywhere before it is reported as corruption.
fn scan_file(file: &mut File) -> Result<Scan, WalError> {
    file.seek(SeekFrom::Start(0))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    let total = raw.len() as u64;

    let mut buf = BytesMut::from(&raw[..]);
    let mut records = Vec::new();
    let mut offset = 0u64;

    while let Some(record_len) = JournalRecord::peek_len(&buf) {
        if offset + record_len as u64 > total {
            break;
        }
        match JournalRecord::decode(&mut buf, offset) {
            Ok(Some(record)) => {
                let size = record.disk_size() as u64;
                records.push((offset, record));
                offset += size;
            }
            Ok(None) => break,
            Err(WalError::CorruptedRecord { .. }) if offset + record_len as u64 == total => break,
            Err(e) => return Err(e),
        }
    }

    Ok(Scan {
        records,
        valid_len: offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::JournalChange;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> JournalConfig {
        JournalConfig::new(dir.join("journal.log")).with_fsync_policy(FsyncPolicy::EveryWrite)
    }

    fn commit(n: u32) -> JournalEntry {
        JournalEntry::Commit {
            commit_id: format!("c-{}", n),
            changes: vec![JournalChange::Put {
                kind: "vehicle".to_string(),
                id: format!("v-{}", n),
                record: json!({"odometer": n}),
            }],
        }
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let (journal, report) = Journal::open(test_config(dir.path())).unwrap();
        assert_eq!(report.records, 0);

        assert_eq!(journal.append(&commit(1)).unwrap(), 1);
        assert_eq!(journal.append(&commit(2)).unwrap(), 2);

        let entries = journal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].0, 2);
        assert_eq!(journal.last_sequence(), 2);
        assert_eq!(journal.stats().writes, 2);
    }

    #[test]
    fn test_failed_append_is_discarded() {
        let dir = TempDir::new().unwrap();
        {
            let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
            journal.append(&commit(1)).unwrap();

            // A frame that reached the file before its append failed.
            let mut inner = journal.inner.lock();
            let start = inner.size;
            let payload = serde_json::to_vec(&commit(2)).unwrap();
            let frame = JournalRecord::new(commit(2).kind(), 2, Bytes::from(payload))
                .encode()
                .unwrap();
            write_frame(&mut inner, &frame, FsyncPolicy::EveryWrite).unwrap();
            discard_from(&mut inner, start);
            assert!(!inner.closed);
            drop(inner);

            assert_eq!(journal.append(&commit(3)).unwrap(), 2);
            journal.close().unwrap();
        }

        let (journal, report) = Journal::open(test_config(dir.path())).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.bytes_truncated, 0);
        let ids: Vec<String> = journal
            .read_all()
            .unwrap()
            .into_iter()
            .map(|(_, entry)| match entry {
                JournalEntry::Commit { commit_id, .. } => commit_id,
                other => panic!("unexpected entry {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec!["c-1", "c-3"]);
    }

    #[test]
    fn test_reopen_continues_sequence() {
        let dir = TempDir::new().unwrap();
        {
            let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
            for i in 0..5 {
                journal.append(&commit(i)).unwrap();
            }
            journal.close().unwrap();
        }

        let (journal, report) = Journal::open(test_config(dir.path())).unwrap();
        assert_eq!(report.records, 5);
        assert_eq!(report.max_sequence, 5);
        assert_eq!(journal.append(&commit(9)).unwrap(), 6);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        {
            let (journal, _) = Journal::open(config.clone()).unwrap();
            journal.append(&commit(1)).unwrap();
            journal.append(&commit(2)).unwrap();
        }

        // Chop the last few bytes off the second record.
        let len = std::fs::metadata(&config.path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&config.path).unwrap();
        file.set_len(len - 5).unwrap();

        let (journal, report) = Journal::open(config).unwrap();
        assert_eq!(report.records, 1);
        assert!(report.bytes_truncated > 0);
        assert_eq!(journal.read_all().unwrap().len(), 1);
        assert_eq!(journal.append(&commit(3)).unwrap(), 2);
    }

    #[test]
    fn test_corrupt_tail_checksum_is_truncated() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        {
            let (journal, _) = Journal::open(config.clone()).unwrap();
            journal.append(&commit(1)).unwrap();
            journal.append(&commit(2)).unwrap();
        }

        let mut raw = std::fs::read(&config.path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        std::fs::write(&config.path, &raw).unwrap();

        let (_journal, report) = Journal::open(config).unwrap();
        assert_eq!(report.records, 1);
    }

    #[test]
    fn test_corruption_before_tail_is_error() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        {
            let (journal, _) = Journal::open(config.clone()).unwrap();
            journal.append(&commit(1)).unwrap();
            journal.append(&commit(2)).unwrap();
        }

        let mut raw = std::fs::read(&config.path).unwrap();
        // Last payload byte of the first record.
        let first_len = JournalRecord::peek_len(&raw).unwrap();
        raw[first_len - 1] ^= 0xFF;
        std::fs::write(&config.path, &raw).unwrap();

        assert!(matches!(
            Journal::open(config),
            Err(WalError::CorruptedRecord { .. })
        ));
    }

    #[test]
    fn test_reset_keeps_sequence() {
        let dir = TempDir::new().unwrap();
        let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
        journal.append(&commit(1)).unwrap();
        journal.append(&commit(2)).unwrap();

        journal.reset().unwrap();
        assert_eq!(journal.size(), 0);
        assert!(journal.read_all().unwrap().is_empty());
        assert_eq!(journal.append(&commit(3)).unwrap(), 3);
    }

    #[test]
    fn test_advance_past() {
        let dir = TempDir::new().unwrap();
        let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
        journal.advance_past(41);
        assert_eq!(journal.append(&commit(1)).unwrap(), 42);

        // Never moves backwards.
        journal.advance_past(10);
        assert_eq!(journal.append(&commit(2)).unwrap(), 43);
    }

    #[test]
    fn test_closed_journal_rejects_append() {
        let dir = TempDir::new().unwrap();
        let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
        journal.close().unwrap();
        assert!(matches!(journal.append(&commit(1)), Err(WalError::Closed)));
    }

    #[test]
    fn test_every_n_policy() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path()).with_fsync_policy(FsyncPolicy::EveryN(3));
        let (journal, _) = Journal::open(config).unwrap();

        for i in 0..6 {
            journal.append(&commit(i)).unwrap();
        }
        assert_eq!(journal.stats().fsyncs, 2);
    }

    #[test]
    fn test_oversized() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path()).with_max_size(64);
        let (journal, _) = Journal::open(config).unwrap();
        assert!(!journal.is_oversized());

        journal.append(&commit(1)).unwrap();
        assert!(journal.is_oversized());
    }
}
