//! Per-type record store
//!
//! One `TypedStore` exists per registered type. It owns:
//! - the arena: `RecordId` → `Arc<Record>`, ids assigned in insertion order
//! - the primary map, kept sorted by key so dumps can partition in
//!   primary-key order
//! - one unique map per declared unique key
//! - dictionary / ordered / list indexes exactly as the `TypeDescription`
//!   declares them
//! - the domain-completeness tracker and the hit counter
//!
//! A record is observable by queries iff it is observable by `get_one` on
//! its primary key: every mutation updates the arena and all indexes under
//! the caller's write lock, so readers of the same type never see an
//! intermediate state.

use crate::domain::DomainTracker;
use crate::eval;
use crate::index::{DictIndex, OrderedIndex, RecordId, UniqueIndex};
use granary_core::{
    DeclareMode, DomainDescription, GranaryError, KeyValue, Query, Record, Result, TypeDescription,
};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory store for one registered type
#[derive(Debug)]
pub struct TypedStore {
    pub(crate) description: TypeDescription,
    next_id: RecordId,
    /// Arena of live records, insertion order
    pub(crate) records: BTreeMap<RecordId, Arc<Record>>,
    /// Primary key → record, sorted by key
    pub(crate) primary: BTreeMap<KeyValue, RecordId>,
    /// Unique key name → map
    pub(crate) unique: FxHashMap<String, UniqueIndex>,
    /// Scalar index field → dictionary index
    pub(crate) dict: FxHashMap<String, DictIndex>,
    /// Ordered subset of the scalar index fields
    pub(crate) ordered: FxHashMap<String, OrderedIndex>,
    /// List index field → element dictionary
    pub(crate) list: FxHashMap<String, DictIndex>,
    domain: DomainTracker,
    hits: AtomicU64,
}

impl TypedStore {
    /// Create an empty store from a type description
    ///
    /// The index set is fixed here; nothing is inferred later.
    pub fn new(description: TypeDescription) -> Result<Self> {
        description.check()?;

        let mut unique = FxHashMap::default();
        for f in &description.unique {
            unique.insert(f.name.clone(), UniqueIndex::new());
        }
        let mut dict = FxHashMap::default();
        let mut ordered = FxHashMap::default();
        let mut list = FxHashMap::default();
        for ix in &description.indexes {
            if ix.list {
                list.insert(ix.field.name.clone(), DictIndex::new());
            } else {
                dict.insert(ix.field.name.clone(), DictIndex::new());
                if ix.ordered {
                    ordered.insert(ix.field.name.clone(), OrderedIndex::new());
                }
            }
        }

        Ok(TypedStore {
            description,
            next_id: RecordId(0),
            records: BTreeMap::new(),
            primary: BTreeMap::new(),
            unique,
            dict,
            ordered,
            list,
            domain: DomainTracker::new(),
            hits: AtomicU64::new(0),
        })
    }

    /// The immutable schema this store was built from
    pub fn description(&self) -> &TypeDescription {
        &self.description
    }

    /// Number of live records
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Reads that visited at least one record since the last truncate
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn note_visit(&self, visited: bool) {
        if visited {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Check that a put would succeed, without touching anything
    ///
    /// Validates the record against the schema and checks unique-key
    /// conflicts. The engine journals between this check and the apply,
    /// which is why the two halves are separable.
    pub fn check_put(&self, record: &Record) -> Result<()> {
        self.description.validate(record)?;

        // The id being replaced (if any) is exempt from conflict checks.
        let replacing = self.primary.get(&record.primary).copied();
        for (name, value) in &record.unique {
            if let Some(holder) = self.unique[name.as_str()].get(value) {
                if Some(holder) != replacing {
                    return Err(GranaryError::schema_mismatch(
                        &self.description.type_name,
                        format!("unique key '{}'={} already held by another record", name, value),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Insert a record, replacing any record with the same primary key
    ///
    /// Runs `check_put` first; after that point the apply cannot fail, so
    /// a returned error implies no observable change. A replaced record is
    /// fully unindexed before the new one is indexed.
    pub fn put(&mut self, record: Record) -> Result<()> {
        self.check_put(&record)?;

        if let Some(old_id) = self.primary.get(&record.primary).copied() {
            self.unindex(old_id);
        }

        let id = self.next_id;
        self.next_id = self.next_id.next();

        self.primary.insert(record.primary.clone(), id);
        for (name, value) in &record.unique {
            self.unique
                .get_mut(name)
                .expect("unique key declared in schema")
                .insert(value.clone(), id);
        }
        for (name, value) in &record.index {
            self.dict
                .get_mut(name)
                .expect("index declared in schema")
                .insert(value.clone(), id);
            if let Some(ord) = self.ordered.get_mut(name) {
                ord.insert(value.clone(), id);
            }
        }
        for (name, values) in &record.list {
            let ix = self
                .list
                .get_mut(name)
                .expect("list index declared in schema");
            for v in values {
                ix.insert(v.clone(), id);
            }
        }
        self.records.insert(id, Arc::new(record));
        Ok(())
    }

    /// Remove the record with the given primary key
    pub fn remove(&mut self, primary: &KeyValue) -> Result<Arc<Record>> {
        let id = self
            .primary
            .get(primary)
            .copied()
            .ok_or_else(|| GranaryError::not_found(&self.description.type_name, primary))?;
        self.unindex(id);
        Ok(self
            .records
            .remove(&id)
            .expect("arena entry for indexed id"))
    }

    /// Remove every record and reset the hit counter
    ///
    /// Domain declarations are left standing; what resets on truncate is
    /// the record set, the indexes, and the counters.
    pub fn truncate(&mut self) {
        self.records.clear();
        self.primary.clear();
        for ix in self.unique.values_mut() {
            ix.clear();
        }
        for ix in self.dict.values_mut() {
            ix.clear();
        }
        for ix in self.ordered.values_mut() {
            ix.clear();
        }
        for ix in self.list.values_mut() {
            ix.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
    }

    /// Remove a record from every index, leaving the arena entry
    fn unindex(&mut self, id: RecordId) {
        let record = self.records[&id].clone();
        self.primary.remove(&record.primary);
        for (name, value) in &record.unique {
            self.unique
                .get_mut(name)
                .expect("unique key declared in schema")
                .remove(value);
        }
        for (name, value) in &record.index {
            self.dict
                .get_mut(name)
                .expect("index declared in schema")
                .remove(value, id);
            if let Some(ord) = self.ordered.get_mut(name) {
                ord.remove(value, id);
            }
        }
        for (name, values) in &record.list {
            let ix = self
                .list
                .get_mut(name)
                .expect("list index declared in schema");
            for v in values {
                ix.remove(v, id);
            }
        }
    }

    /// Apply a domain declaration
    pub fn declare_domain(&mut self, description: &DomainDescription, mode: DeclareMode) {
        self.domain.declare(description, mode);
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Whether a record with this primary key is present
    pub fn contains(&self, primary: &KeyValue) -> bool {
        self.primary.contains_key(primary)
    }

    /// Primary keys of the records matching a query
    ///
    /// Used by `delete_many`: it is a write path, so unlike `get_many`
    /// this does not touch the hit counter.
    pub fn matching_primaries(&self, query: &Query) -> Result<Vec<KeyValue>> {
        let ids = eval::evaluate(self, query)?;
        Ok(ids
            .into_iter()
            .map(|id| self.records[&id].primary.clone())
            .collect())
    }

    /// Look up one record by primary or unique key
    ///
    /// Any other key name is `InvalidQuery`: dictionary-indexed fields can
    /// hold many records and belong to `get_many`.
    pub fn get_one(&self, key_name: &str, value: &KeyValue) -> Result<Option<Arc<Record>>> {
        let id = if self.description.is_primary(key_name) {
            self.primary.get(value).copied()
        } else if let Some(ix) = self.unique.get(key_name) {
            ix.get(value)
        } else {
            return Err(GranaryError::invalid_query(format!(
                "'{}' is not a primary or unique key of '{}'",
                key_name, self.description.type_name
            )));
        };
        let found = id.map(|id| self.records[&id].clone());
        self.note_visit(found.is_some());
        Ok(found)
    }

    /// Lazily resolve the records matching a query
    ///
    /// The evaluator produces the id set up front (ids are cheap); each
    /// record is resolved from the arena only as the iterator advances,
    /// so a caller streaming a large result never holds a materialized
    /// copy of it. Result order is unspecified; callers that need an
    /// order sort explicitly.
    pub fn matching_records<'a>(
        &'a self,
        query: &Query,
    ) -> Result<impl Iterator<Item = &'a Arc<Record>> + 'a> {
        let ids = eval::evaluate(self, query)?;
        self.note_visit(!ids.is_empty());
        Ok(ids
            .into_iter()
            .map(move |id| self.records.get(&id).expect("arena entry for evaluated id")))
    }

    /// Evaluate a query and return the matching records at once
    ///
    /// Convenience over [`TypedStore::matching_records`] for callers that
    /// want the whole result in hand.
    pub fn get_many(&self, query: &Query) -> Result<Vec<Arc<Record>>> {
        Ok(self.matching_records(query)?.cloned().collect())
    }

    /// Resolve a live record by its arena id
    pub fn record(&self, id: RecordId) -> &Arc<Record> {
        self.records.get(&id).expect("arena entry for live id")
    }

    /// Count matches and report whether the answer is authoritative
    pub fn eval_query(&self, query: &Query) -> Result<(bool, usize)> {
        let ids = eval::evaluate(self, query)?;
        self.note_visit(!ids.is_empty());
        Ok((self.domain.is_authoritative(query), ids.len()))
    }

    /// Partition a list of primary keys into found ids and missing keys
    ///
    /// Both halves preserve the input order. An optional filter query
    /// narrows the found half; a record that fails the filter counts as
    /// missing. Only ids come back; the caller resolves records one at a
    /// time through [`TypedStore::record`] while streaming.
    pub fn available_ids(
        &self,
        keys: &[KeyValue],
        filter: Option<&Query>,
    ) -> Result<(Vec<RecordId>, Vec<KeyValue>)> {
        if let Some(q) = filter {
            q.validate(&self.description)?;
        }
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for key in keys {
            match self.primary.get(key) {
                Some(id) => {
                    let keep = match filter {
                        Some(q) => eval::matches_record(&self.description, &self.records[id], q),
                        None => true,
                    };
                    if keep {
                        found.push(*id);
                    } else {
                        missing.push(key.clone());
                    }
                }
                None => missing.push(key.clone()),
            }
        }
        self.note_visit(!found.is_empty());
        Ok((found, missing))
    }

    /// Iterate live records in insertion order
    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.values()
    }

    /// Iterate live records in primary-key order (dump partitioning)
    pub fn records_by_primary(&self) -> impl Iterator<Item = &Arc<Record>> + '_ {
        self.primary.values().map(move |id| &self.records[id])
    }
}

// AtomicU64 is not Clone; the snapshot taken for import rollback carries
// the counter value across by hand. Arc<Record> keeps the copy cheap.
impl Clone for TypedStore {
    fn clone(&self) -> Self {
        TypedStore {
            description: self.description.clone(),
            next_id: self.next_id,
            records: self.records.clone(),
            primary: self.primary.clone(),
            unique: self.unique.clone(),
            dict: self.dict.clone(),
            ordered: self.ordered.clone(),
            list: self.list.clone(),
            domain: self.domain.clone(),
            hits: AtomicU64::new(self.hits.load(Ordering::Relaxed)),
        }
    }
}
