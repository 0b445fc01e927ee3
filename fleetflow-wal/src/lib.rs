//! # fleetflow-wal
//!
//! Commit journal for fleetflow.
//!
//! Every lifecycle transition is written as exactly one journal record, so a
//! transition is either entirely on disk or entirely absent. The journal
//! provides:
//! - Per-record CRC32C checksums
//! - Configurable fsync policies
//! - Truncation of torn tail records on open
//! - Reset after a snapshot has captured the full state

pub mod entry;
pub mod error;
pub mod journal;

pub use entry::{EntryKind, JournalChange, JournalEntry, JournalRecord};
pub use error::WalError;
pub use journal::{FsyncPolicy, Journal, JournalConfig, JournalStats, OpenReport};

/// Journal record header size in bytes.
pub const RECORD_HEADER_SIZE: usize = 24;

/// Default journal size (64 MiB) above which callers should compact.
pub const DEFAULT_MAX_JOURNAL_SIZE: u64 = 64 * 1024 * 1024;
