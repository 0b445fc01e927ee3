//! Full-state snapshots.
//!
//! A snapshot file holds one line of metadata followed by the JSON-encoded
//! records. The metadata carries a CRC32C of the record body and the journal
//! sequence the snapshot covers.

use crate::error::StorageError;
use fleetflow_core::Record;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// Snapshot metadata, stored as the first line of the snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Last journal sequence whose commit is included.
    pub sequence: u64,
    /// Creation time, milliseconds since the epoch.
    pub created_at: i64,
    pub record_count: usize,
    pub size_bytes: u64,
    pub checksum: String,
}

/// A loaded snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub records: Vec<Record>,
}

/// Reads and writes the snapshot file.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a snapshot of `records` covering journal `sequence`.
    ///
    /// The file is written beside the current one and renamed over it, so a
    /// crash leaves either the old snapshot or the new one.
    pub fn write(&self, sequence: u64, records: &[Record]) -> Result<SnapshotMeta, StorageError> {
        let body = serde_json::to_vec(records)?;
        let meta = SnapshotMeta {
            sequence,
            created_at: chrono::Utc::now().timestamp_millis(),
            record_count: records.len(),
            size_bytes: body.len() as u64,
            checksum: format!("{:08x}", crc32c::crc32c(&body)),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            serde_json::to_writer(&mut file, &meta)?;
            file.write_all(b"\n")?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::info!(
            "Wrote snapshot of {} records at sequence {} ({} bytes)",
            meta.record_count,
            meta.sequence,
            meta.size_bytes
        );
        Ok(meta)
    }

    /// Loads the snapshot, if one has been written.
    pub fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let meta: SnapshotMeta = serde_json::from_str(header.trim_end()).map_err(|e| {
            StorageError::Corruption(format!(
                "snapshot {} has an unreadable header: {}",
                self.path.display(),
                e
            ))
        })?;

        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;

        let actual = format!("{:08x}", crc32c::crc32c(&body));
        if actual != meta.checksum {
            return Err(StorageError::Corruption(format!(
                "snapshot {} checksum mismatch: expected {}, got {}",
                self.path.display(),
                meta.checksum,
                actual
            )));
        }

        let records: Vec<Record> = serde_json::from_slice(&body)?;
        if records.len() != meta.record_count {
            return Err(StorageError::Corruption(format!(
                "snapshot {} lists {} records but holds {}",
                self.path.display(),
                meta.record_count,
                records.len()
            )));
        }

        Ok(Some(Snapshot { meta, records }))
    }

    /// Reads only the snapshot metadata.
    pub fn meta(&self) -> Result<Option<SnapshotMeta>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut header = String::new();
        BufReader::new(File::open(&self.path)?).read_line(&mut header)?;
        Ok(Some(serde_json::from_str(header.trim_end())?))
    }
}
