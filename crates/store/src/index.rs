//! Index structures for a typed store
//!
//! All indexes store `RecordId` handles, never records. Buckets are
//! `BTreeSet<RecordId>`: ids are assigned in insertion order, so
//! enumeration within an equal-key bucket is insertion order of the
//! records into the type (stable).
//!
//! Three shapes cover the declared index kinds:
//! - `UniqueIndex`: key → one record (primary and unique keys)
//! - `DictIndex`: key → set of records (equality; also backs list indexes)
//! - `OrderedIndex`: sorted map of key → set of records (range predicates)

use granary_core::KeyValue;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Stable handle to a record in a type's arena
///
/// Ids are handed out from a per-type monotonically increasing counter and
/// never reused, so id order is insertion order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RecordId(pub u64);

impl RecordId {
    /// The next id after this one
    pub fn next(self) -> RecordId {
        RecordId(self.0 + 1)
    }
}

/// Key → single record map (unique keys)
#[derive(Debug, Clone, Default)]
pub struct UniqueIndex {
    map: FxHashMap<KeyValue, RecordId>,
}

impl UniqueIndex {
    /// Create an empty unique index
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a key to a record, returning the displaced id if any
    pub fn insert(&mut self, key: KeyValue, id: RecordId) -> Option<RecordId> {
        self.map.insert(key, id)
    }

    /// Remove a key
    pub fn remove(&mut self, key: &KeyValue) -> Option<RecordId> {
        self.map.remove(key)
    }

    /// Look up the record for a key
    pub fn get(&self, key: &KeyValue) -> Option<RecordId> {
        self.map.get(key).copied()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the index holds no keys
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Key → set-of-records map (equality and list indexes)
#[derive(Debug, Clone, Default)]
pub struct DictIndex {
    map: FxHashMap<KeyValue, BTreeSet<RecordId>>,
}

impl DictIndex {
    /// Create an empty dictionary index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under a key
    pub fn insert(&mut self, key: KeyValue, id: RecordId) {
        self.map.entry(key).or_default().insert(id);
    }

    /// Remove a record from a key's bucket
    ///
    /// Empty buckets are removed entirely so the index never accumulates
    /// dangling keys.
    pub fn remove(&mut self, key: &KeyValue, id: RecordId) {
        if let Some(bucket) = self.map.get_mut(key) {
            bucket.remove(&id);
            if bucket.is_empty() {
                self.map.remove(key);
            }
        }
    }

    /// Get the bucket for a key
    pub fn get(&self, key: &KeyValue) -> Option<&BTreeSet<RecordId>> {
        self.map.get(key)
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the index holds no keys
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate all `(key, bucket)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&KeyValue, &BTreeSet<RecordId>)> {
        self.map.iter()
    }
}

/// Sorted key → set-of-records map (range predicates)
///
/// Maintained alongside a `DictIndex` for fields declared ordered; the
/// dictionary serves equality, this map serves ranges.
#[derive(Debug, Clone, Default)]
pub struct OrderedIndex {
    map: BTreeMap<KeyValue, BTreeSet<RecordId>>,
}

impl OrderedIndex {
    /// Create an empty ordered index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under a key
    pub fn insert(&mut self, key: KeyValue, id: RecordId) {
        self.map.entry(key).or_default().insert(id);
    }

    /// Remove a record from a key's bucket, dropping empty buckets
    pub fn remove(&mut self, key: &KeyValue, id: RecordId) {
        if let Some(bucket) = self.map.get_mut(key) {
            bucket.remove(&id);
            if bucket.is_empty() {
                self.map.remove(key);
            }
        }
    }

    /// Collect record ids whose key falls in the given bounds
    pub fn range(&self, lower: Bound<&KeyValue>, upper: Bound<&KeyValue>) -> Vec<RecordId> {
        self.map
            .range::<KeyValue, _>((lower, upper))
            .flat_map(|(_, bucket)| bucket.iter().copied())
            .collect()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the index holds no keys
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
