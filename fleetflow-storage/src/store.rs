//! Journal-backed entity store.
//!
//! Records live in memory. Every change set is appended to the journal as a
//! single commit entry before it is applied, and periodic snapshots bound the
//! amount of journal replayed on open.

use crate::error::StorageError;
use crate::snapshot::{SnapshotMeta, SnapshotStore};
use fleetflow_core::{
    Change, ChangeSet, CoreError, EntityKind, EntityStore, MemoryStore, Record,
};
use fleetflow_wal::{Journal, JournalChange, JournalConfig, JournalEntry};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

/// When to fold the journal into a fresh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionPolicy {
    /// Only compact on request.
    Never,
    /// Compact after N commits, or earlier if the journal outgrows its
    /// configured size.
    EveryNCommits(u64),
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self::EveryNCommits(1000)
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base directory for all storage.
    pub dir: PathBuf,
    /// Journal configuration.
    pub journal: JournalConfig,
    /// Compaction policy.
    pub compaction: CompactionPolicy,
}

impl StorageConfig {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            journal: JournalConfig::new(dir.join("journal.log")),
            dir,
            compaction: CompactionPolicy::default(),
        }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join("snapshot.json")
    }
}

/// What [`Storage::open`] restored.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Sequence covered by the loaded snapshot (0 without one).
    pub snapshot_sequence: u64,
    pub snapshot_records: usize,
    pub commits_replayed: u64,
    /// Bytes cut from a torn journal tail.
    pub bytes_truncated: u64,
}

/// Result of a compaction.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    pub snapshot: SnapshotMeta,
    /// Journal bytes dropped by the reset.
    pub bytes_reclaimed: u64,
}

/// Storage statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStats {
    pub records: usize,
    pub journal_bytes: u64,
    pub last_sequence: u64,
    pub commits_since_snapshot: u64,
}

/// Durable entity store.
pub struct Storage {
    config: StorageConfig,
    journal: Journal,
    snapshots: SnapshotStore,
    state: MemoryStore,
    /// Serializes commits and compactions; holds the commit count since the
    /// last snapshot.
    commit_lock: Mutex<u64>,
    recovery: RecoveryReport,
}

impl Storage {
    /// Opens or creates storage, restoring the snapshot and replaying the
    /// journal commits made after it.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.dir)?;

        let snapshots = SnapshotStore::new(config.snapshot_path());
        let (snapshot_sequence, records) = match snapshots.load()? {
            Some(snapshot) => (snapshot.meta.sequence, snapshot.records),
            None => (0, Vec::new()),
        };
        let snapshot_records = records.len();
        let state = MemoryStore::with_records(records);

        let (journal, open_report) = Journal::open(config.journal.clone())?;
        journal.advance_past(snapshot_sequence);

        let mut commits_replayed = 0;
        for (sequence, entry) in journal.read_all()? {
            if sequence <= snapshot_sequence {
                continue;
            }
            if let JournalEntry::Commit { commit_id, changes } = entry {
                let changes = decode_changes(changes).map_err(|e| {
                    StorageError::Corruption(format!(
                        "commit {} at sequence {}: {}",
                        commit_id, sequence, e
                    ))
                })?;
                state.apply(&changes);
                commits_replayed += 1;
            }
        }

        let recovery = RecoveryReport {
            snapshot_sequence,
            snapshot_records,
            commits_replayed,
            bytes_truncated: open_report.bytes_truncated,
        };
        tracing::info!(
            "Recovery complete: {} records ({} from snapshot at sequence {}, {} commits replayed)",
            state.len(),
            recovery.snapshot_records,
            recovery.snapshot_sequence,
            recovery.commits_replayed
        );

        Ok(Self {
            config,
            journal,
            snapshots,
            state,
            commit_lock: Mutex::new(commits_replayed),
            recovery,
        })
    }

    /// Returns what was restored when the store was opened.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Returns the in-memory view of every record.
    pub fn state(&self) -> &MemoryStore {
        &self.state
    }

    /// Journals a change set and applies it, returning the journal sequence.
    ///
    /// The in-memory state is only touched once the commit is in the journal;
    /// a failed append is cut from the journal, so it leaves no trace in
    /// either.
    pub fn write(&self, changes: ChangeSet) -> Result<u64, StorageError> {
        let mut commits = self.commit_lock.lock();

        if changes.is_empty() {
            return Ok(self.journal.last_sequence());
        }

        let entry = JournalEntry::Commit {
            commit_id: uuid::Uuid::new_v4().to_string(),
            changes: encode_changes(&changes)?,
        };
        let sequence = self.journal.append(&entry)?;
        self.state.apply(&changes);
        *commits += 1;

        tracing::debug!(
            "Committed {} changes at sequence {}",
            changes.len(),
            sequence
        );

        // The commit is durable at this point; a failed compaction leaves the
        // journal in place and is retried on the next commit.
        if self.compaction_due(*commits) {
            if let Err(e) = self.compact_locked(&mut commits) {
                tracing::warn!("Automatic compaction failed: {}", e);
            }
        }

        Ok(sequence)
    }

    /// Writes a snapshot of every record and empties the journal.
    pub fn compact(&self) -> Result<CompactionResult, StorageError> {
        let mut commits = self.commit_lock.lock();
        self.compact_locked(&mut commits)
    }

    fn compaction_due(&self, commits: u64) -> bool {
        match self.config.compaction {
            CompactionPolicy::Never => false,
            CompactionPolicy::EveryNCommits(n) => commits >= n || self.journal.is_oversized(),
        }
    }

    fn compact_locked(&self, commits: &mut u64) -> Result<CompactionResult, StorageError> {
        let sequence = self.journal.last_sequence();
        let size_before = self.journal.size();

        let snapshot = self.snapshots.write(sequence, &self.state.all_records())?;
        self.journal.reset()?;
        self.journal.append(&JournalEntry::Checkpoint {
            timestamp: snapshot.created_at,
            snapshot_sequence: snapshot.sequence,
        })?;
        *commits = 0;

        tracing::info!(
            "Compacted journal at sequence {}, reclaimed {} bytes",
            sequence,
            size_before
        );

        Ok(CompactionResult {
            snapshot,
            bytes_reclaimed: size_before,
        })
    }

    /// Syncs the journal to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.journal.sync()?;
        Ok(())
    }

    /// Syncs and closes the journal.
    pub fn close(&self) -> Result<(), StorageError> {
        self.journal.close()?;
        Ok(())
    }

    pub fn stats(&self) -> StorageStats {
        let commits = self.commit_lock.lock();
        StorageStats {
            records: self.state.len(),
            journal_bytes: self.journal.size(),
            last_sequence: self.journal.last_sequence(),
            commits_since_snapshot: *commits,
        }
    }
}

impl EntityStore for Storage {
    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>, CoreError> {
        self.state.get(kind, id)
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<Record>, CoreError> {
        self.state.list(kind)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), CoreError> {
        self.write(changes)?;
        Ok(())
    }
}

fn encode_changes(changes: &ChangeSet) -> Result<Vec<JournalChange>, StorageError> {
    changes
        .changes()
        .iter()
        .map(|change| {
            Ok(match change {
                Change::Put { record } => JournalChange::Put {
                    kind: record.kind().as_str().to_string(),
                    id: record.id().to_string(),
                    record: serde_json::to_value(record)?,
                },
                Change::Delete { kind, id } => JournalChange::Delete {
                    kind: kind.as_str().to_string(),
                    id: id.clone(),
                },
            })
        })
        .collect()
}

fn decode_changes(changes: Vec<JournalChange>) -> Result<ChangeSet, StorageError> {
    let mut set = ChangeSet::new();
    for change in changes {
        match change {
            JournalChange::Put { kind, id, record } => {
                let record: Record = serde_json::from_value(record)?;
                if record.kind().as_str() != kind || record.id() != id {
                    return Err(StorageError::Corruption(format!(
                        "put keyed {}/{} carries {}/{}",
                        kind,
                        id,
                        record.kind(),
                        record.id()
                    )));
                }
                set.put(record);
            }
            JournalChange::Delete { kind, id } => {
                let kind = EntityKind::parse(&kind).ok_or_else(|| {
                    StorageError::Corruption(format!("unknown record kind '{}'", kind))
                })?;
                set.delete(kind, id);
            }
        }
    }
    Ok(set)
}
