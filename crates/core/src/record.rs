//! Stored record snapshots
//!
//! A record is an immutable snapshot of a typed object at a given mutation.
//! The server never reflects on user types: the payload is opaque bytes
//! (whatever serialization the client supplied), and all the server reads
//! are the key values the client extracted alongside it.

use crate::key::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One stored object snapshot: opaque payload plus extracted key values
///
/// Records are immutable. `Put` with the same primary key replaces the
/// whole record; there is no partial update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The serialized object exactly as the client supplied it
    pub payload: Vec<u8>,
    /// Primary key value (mandatory, unique within the type)
    pub primary: KeyValue,
    /// Unique-key values by key name
    pub unique: BTreeMap<String, KeyValue>,
    /// Scalar index-key values by key name
    pub index: BTreeMap<String, KeyValue>,
    /// List index-key values by key name (each a set of scalars)
    pub list: BTreeMap<String, BTreeSet<KeyValue>>,
}

impl Record {
    /// Create a record with only a primary key
    pub fn new(payload: Vec<u8>, primary: KeyValue) -> Self {
        Record {
            payload,
            primary,
            unique: BTreeMap::new(),
            index: BTreeMap::new(),
            list: BTreeMap::new(),
        }
    }

    /// Add a unique-key value (builder style)
    pub fn with_unique(mut self, name: impl Into<String>, value: KeyValue) -> Self {
        self.unique.insert(name.into(), value);
        self
    }

    /// Add a scalar index-key value (builder style)
    pub fn with_index(mut self, name: impl Into<String>, value: KeyValue) -> Self {
        self.index.insert(name.into(), value);
        self
    }

    /// Add a list index-key value (builder style)
    pub fn with_list(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = KeyValue>,
    ) -> Self {
        self.list.insert(name.into(), values.into_iter().collect());
        self
    }

    /// Resolve a scalar key value by name
    ///
    /// Looks through primary, unique, and index keys, in that order. The
    /// schema guarantees key names are distinct across roles, so at most
    /// one lookup can hit. `primary_name` is the schema's primary field
    /// name; the record itself does not store it.
    pub fn scalar(&self, primary_name: &str, key_name: &str) -> Option<&KeyValue> {
        if key_name == primary_name {
            return Some(&self.primary);
        }
        self.unique.get(key_name).or_else(|| self.index.get(key_name))
    }

    /// Resolve a list key's value set by name
    pub fn list_values(&self, key_name: &str) -> Option<&BTreeSet<KeyValue>> {
        self.list.get(key_name)
    }
}
