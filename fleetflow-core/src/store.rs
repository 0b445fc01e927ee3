//! Entity store contract and the in-memory implementation.

use crate::error::CoreError;
use crate::record::{Entity, EntityKind, Record};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One record change inside a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    Put { record: Record },
    Delete { kind: EntityKind, id: String },
}

impl Change {
    pub fn kind(&self) -> EntityKind {
        match self {
            Change::Put { record } => record.kind(),
            Change::Delete { kind, .. } => *kind,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Change::Put { record } => record.id(),
            Change::Delete { id, .. } => id,
        }
    }
}

/// All record changes produced by one lifecycle transition.
///
/// A change set is committed as a unit: a store applies every change or
/// none of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, record: impl Into<Record>) -> &mut Self {
        self.changes.push(Change::Put {
            record: record.into(),
        });
        self
    }

    pub fn delete(&mut self, kind: EntityKind, id: impl Into<String>) -> &mut Self {
        self.changes.push(Change::Delete {
            kind,
            id: id.into(),
        });
        self
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

impl From<Record> for ChangeSet {
    fn from(record: Record) -> Self {
        let mut set = ChangeSet::new();
        set.put(record);
        set
    }
}

/// Keyed record storage used by the lifecycle engine.
///
/// Implementations must make [`EntityStore::commit`] atomic: after it
/// returns, readers observe either all of the change set or none of it.
pub trait EntityStore: Send + Sync {
    /// Returns the record of `kind` with `id`, if present.
    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>, CoreError>;

    /// Returns every record of `kind`, ordered by id.
    fn list(&self, kind: EntityKind) -> Result<Vec<Record>, CoreError>;

    /// Applies a change set as one atomic unit.
    fn commit(&self, changes: ChangeSet) -> Result<(), CoreError>;

    /// Stores a single record.
    fn put(&self, record: Record) -> Result<(), CoreError> {
        self.commit(ChangeSet::from(record))
    }

    /// Fetches a typed record, failing with `NotFound` when absent.
    fn fetch<T: Entity>(&self, id: &str) -> Result<T, CoreError>
    where
        Self: Sized,
    {
        self.get(T::KIND, id)?
            .and_then(T::from_record)
            .ok_or_else(|| CoreError::not_found(T::KIND, id))
    }

    /// Lists every record of one concrete type.
    fn list_of<T: Entity>(&self) -> Result<Vec<T>, CoreError>
    where
        Self: Sized,
    {
        Ok(self
            .list(T::KIND)?
            .into_iter()
            .filter_map(T::from_record)
            .collect())
    }
}

/// Records grouped by kind, ordered by id within a kind.
pub type RecordMap = HashMap<EntityKind, BTreeMap<String, Record>>;

/// In-memory entity store.
///
/// All records live behind one lock, so a commit is observed all at once.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<RecordMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store holding `records`.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            for record in records {
                map.entry(record.kind())
                    .or_default()
                    .insert(record.id().to_string(), record);
            }
        }
        store
    }

    /// Applies a change set. Deleting an absent record is a no-op.
    pub fn apply(&self, changes: &ChangeSet) {
        let mut map = self.records.write();
        for change in changes.changes() {
            match change {
                Change::Put { record } => {
                    map.entry(record.kind())
                        .or_default()
                        .insert(record.id().to_string(), record.clone());
                }
                Change::Delete { kind, id } => {
                    if let Some(records) = map.get_mut(kind) {
                        records.remove(id);
                    }
                }
            }
        }
    }

    /// Returns a copy of every record, grouped by kind in a fixed order.
    pub fn all_records(&self) -> Vec<Record> {
        let map = self.records.read();
        EntityKind::ALL
            .iter()
            .filter_map(|kind| map.get(kind))
            .flat_map(|records| records.values().cloned())
            .collect()
    }

    /// Returns the number of records of `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.records.read().get(&kind).map_or(0, |r| r.len())
    }

    /// Returns the total number of records.
    pub fn len(&self) -> usize {
        self.records.read().values().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, kind: EntityKind, id: &str) -> Result<Option<Record>, CoreError> {
        Ok(self
            .records
            .read()
            .get(&kind)
            .and_then(|records| records.get(id))
            .cloned())
    }

    fn list(&self, kind: EntityKind) -> Result<Vec<Record>, CoreError> {
        Ok(self
            .records
            .read()
            .get(&kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), CoreError> {
        self.apply(&changes);
        Ok(())
    }
}
