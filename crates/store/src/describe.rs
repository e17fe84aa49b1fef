//! Key-value projections of stored records
//!
//! `GetObjectDescriptions` returns the extracted keys of each match,
//! without the payload. Useful for clients that want to know what is in
//! the cache without pulling the objects over.

use granary_core::{KeyValue, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The extracted keys of one record, payload omitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescription {
    /// Primary key value
    pub primary: KeyValue,
    /// Unique-key values by key name
    pub unique: BTreeMap<String, KeyValue>,
    /// Scalar index-key values by key name
    pub index: BTreeMap<String, KeyValue>,
}

impl ObjectDescription {
    /// Project a record down to its keys
    pub fn of(record: &Record) -> Self {
        ObjectDescription {
            primary: record.primary.clone(),
            unique: record.unique.clone(),
            index: record.index.clone(),
        }
    }
}
