//! # fleetflow-storage
//!
//! Durable entity store for fleetflow.
//!
//! This crate provides:
//! - Journaled, atomic multi-record commits
//! - Full-state snapshots with checksums
//! - Recovery from snapshot plus journal replay
//! - Journal compaction

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::StorageError;
pub use snapshot::{Snapshot, SnapshotMeta, SnapshotStore};
pub use store::{
    CompactionPolicy, CompactionResult, RecoveryReport, Storage, StorageConfig, StorageStats,
};
