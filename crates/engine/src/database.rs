//! The `Database` facade
//!
//! One `Database` per process. All public operations are `&self`: state
//! sits behind the registry lock, the per-type locks, and the admin lock
//! described in the crate docs. Mutations journal to the transaction log
//! inside the per-type write lock and before returning.

use crate::config::NodeConfig;
use crate::sequences::{IdRange, Sequences};
use granary_core::{
    DeclareMode, DomainDescription, GranaryError, KeyValue, Query, Record, Result, Timestamp,
    TypeDescription,
};
use granary_durability::{LogEntry, TransactionLog};
use granary_store::{ObjectDescription, TypedStore};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// One found record of a `get_available_items` call, with progress
#[derive(Debug, Clone)]
pub struct AvailableItem {
    /// 1-based position among the found records
    pub current: usize,
    /// Total number of found records
    pub total: usize,
    /// The record itself
    pub record: Arc<Record>,
}

/// Result of `get_available_items`
#[derive(Debug, Clone)]
pub struct AvailableItems {
    /// Found records in input order, each tagged with progress
    pub items: Vec<AvailableItem>,
    /// Requested keys with no (matching) record, in input order
    pub missing: Vec<KeyValue>,
}

/// One type's row in the server description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSummary {
    /// The registered schema
    pub description: TypeDescription,
    /// Live record count
    pub count: usize,
    /// Reads that visited at least one record since the last truncate
    pub hit_count: u64,
}

/// The queryable object cache
pub struct Database {
    pub(crate) registry: RwLock<FxHashMap<String, Arc<RwLock<TypedStore>>>>,
    pub(crate) admin: RwLock<()>,
    pub(crate) sequences: Sequences,
    pub(crate) log: TransactionLog,
}

impl Database {
    /// Open (or create) a database under a data directory
    ///
    /// Opens the transaction log and replays it into an empty in-memory
    /// store. A corrupt log tail is logged and the prefix used.
    pub fn open<P: AsRef<Path>>(data_path: P) -> Result<Self> {
        std::fs::create_dir_all(data_path.as_ref())?;
        let log = TransactionLog::open(data_path.as_ref().join("txn.log"))?;

        let db = Database {
            registry: RwLock::new(FxHashMap::default()),
            admin: RwLock::new(()),
            sequences: Sequences::new(),
            log,
        };

        let read = db.log.read_all()?;
        if let Some(corruption) = &read.corruption {
            warn!(
                offset = corruption.offset,
                entries = corruption.entries_before,
                reason = %corruption.message,
                "transaction log damaged; recovering the valid prefix"
            );
        }
        let replayed = read.entries.len();
        db.replay(read.entries);
        info!(entries = replayed, "recovery complete");
        Ok(db)
    }

    /// Open a database from a node configuration
    pub fn open_with_config(config: &NodeConfig) -> Result<Self> {
        Self::open(&config.data_path)
    }

    fn store(&self, type_name: &str) -> Result<Arc<RwLock<TypedStore>>> {
        self.registry
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| GranaryError::unknown_type(type_name))
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Register a type
    ///
    /// Re-registering an identical description is an idempotent ack;
    /// a differing description is a `SchemaMismatch`.
    pub fn register_type(&self, description: TypeDescription) -> Result<()> {
        let _admin = self.admin.read();
        description.check()?;

        let mut registry = self.registry.write();
        if let Some(existing) = registry.get(&description.type_name) {
            if existing.read().description() == &description {
                return Ok(());
            }
            return Err(GranaryError::schema_mismatch(
                &description.type_name,
                "already registered with a different schema",
            ));
        }

        self.log.append(&LogEntry::RegisterType {
            description: description.clone(),
            timestamp: Timestamp::now(),
        })?;
        let type_name = description.type_name.clone();
        registry.insert(type_name, Arc::new(RwLock::new(TypedStore::new(description)?)));
        Ok(())
    }

    /// Descriptions of every registered type, sorted by name
    pub fn known_types(&self) -> Vec<TypeDescription> {
        let registry = self.registry.read();
        let mut types: Vec<TypeDescription> = registry
            .values()
            .map(|s| s.read().description().clone())
            .collect();
        types.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        types
    }

    /// Per-type count, hit count, and schema, sorted by name
    pub fn server_description(&self) -> Vec<TypeSummary> {
        let registry = self.registry.read();
        let mut rows: Vec<TypeSummary> = registry
            .values()
            .map(|s| {
                let guard = s.read();
                TypeSummary {
                    description: guard.description().clone(),
                    count: guard.count(),
                    hit_count: guard.hit_count(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.description.type_name.cmp(&b.description.type_name));
        rows
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert a record, replacing any record with the same primary key
    pub fn put(&self, type_name: &str, record: Record) -> Result<()> {
        let _admin = self.admin.read();
        let store = self.store(type_name)?;
        let mut guard = store.write();
        guard.check_put(&record)?;
        self.log.append(&LogEntry::Put {
            type_name: type_name.to_string(),
            record: record.clone(),
            timestamp: Timestamp::now(),
        })?;
        guard.put(record)
    }

    /// Remove a record by primary key; `NotFound` if absent
    pub fn remove(&self, type_name: &str, primary: &KeyValue) -> Result<()> {
        let _admin = self.admin.read();
        let store = self.store(type_name)?;
        let mut guard = store.write();
        if !guard.contains(primary) {
            return Err(GranaryError::not_found(type_name, primary));
        }
        self.log.append(&LogEntry::Remove {
            type_name: type_name.to_string(),
            primary: primary.clone(),
            timestamp: Timestamp::now(),
        })?;
        guard.remove(primary)?;
        Ok(())
    }

    /// Delete every record matching a query; returns the count deleted
    ///
    /// Journals one `Remove` per record, made durable as one batch before
    /// anything is deleted.
    pub fn delete_many(&self, query: &Query) -> Result<usize> {
        let _admin = self.admin.read();
        let store = self.store(&query.type_name)?;
        let mut guard = store.write();
        let primaries = guard.matching_primaries(query)?;

        let timestamp = Timestamp::now();
        let entries: Vec<LogEntry> = primaries
            .iter()
            .map(|primary| LogEntry::Remove {
                type_name: query.type_name.clone(),
                primary: primary.clone(),
                timestamp,
            })
            .collect();
        self.log.append_batch(&entries)?;

        for primary in &primaries {
            guard.remove(primary)?;
        }
        Ok(primaries.len())
    }

    /// Clear a type: all records, all indexes, both counters
    pub fn truncate(&self, type_name: &str) -> Result<()> {
        let _admin = self.admin.read();
        let store = self.store(type_name)?;
        let mut guard = store.write();
        self.log.append(&LogEntry::Truncate {
            type_name: type_name.to_string(),
            timestamp: Timestamp::now(),
        })?;
        guard.truncate();
        Ok(())
    }

    /// Apply a domain-completeness declaration
    ///
    /// Administrative: holds the process-wide lock exclusively.
    pub fn declare_domain(
        &self,
        type_name: &str,
        description: &DomainDescription,
        mode: DeclareMode,
    ) -> Result<()> {
        let _admin = self.admin.write();
        let store = self.store(type_name)?;
        let mut guard = store.write();
        self.log.append(&LogEntry::DeclareDomain {
            type_name: type_name.to_string(),
            description: description.clone(),
            mode,
            timestamp: Timestamp::now(),
        })?;
        guard.declare_domain(description, mode);
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Look up one record by primary or unique key
    pub fn get_one(
        &self,
        type_name: &str,
        key_name: &str,
        value: &KeyValue,
    ) -> Result<Option<Arc<Record>>> {
        let _admin = self.admin.read();
        let store = self.store(type_name)?;
        let guard = store.read();
        guard.get_one(key_name, value)
    }

    /// Visit every record matching a query, one at a time
    ///
    /// The per-type read lock is held for the duration; each record is
    /// resolved from the arena as the walk reaches it, so a streaming
    /// caller never buffers the result set. Returns the visit count.
    /// Order is unspecified.
    pub fn get_many_with(
        &self,
        query: &Query,
        mut visit: impl FnMut(&Arc<Record>) -> Result<()>,
    ) -> Result<usize> {
        let _admin = self.admin.read();
        let store = self.store(&query.type_name)?;
        let guard = store.read();
        let mut count = 0usize;
        for record in guard.matching_records(query)? {
            visit(record)?;
            count += 1;
        }
        Ok(count)
    }

    /// All records matching a query; order unspecified
    ///
    /// Convenience over [`Database::get_many_with`] for embedded callers
    /// that want the whole result in hand.
    pub fn get_many(&self, query: &Query) -> Result<Vec<Arc<Record>>> {
        let mut records = Vec::new();
        self.get_many_with(query, |record| {
            records.push(record.clone());
            Ok(())
        })?;
        Ok(records)
    }

    /// Count matches and report whether the answer is authoritative
    pub fn eval_query(&self, query: &Query) -> Result<(bool, usize)> {
        let _admin = self.admin.read();
        let store = self.store(&query.type_name)?;
        let guard = store.read();
        guard.eval_query(query)
    }

    /// Visit the key projection of each record matching a query
    ///
    /// Streams like [`Database::get_many_with`]; the projection is built
    /// per record as the walk reaches it. Returns the visit count.
    pub fn get_object_descriptions_with(
        &self,
        query: &Query,
        mut visit: impl FnMut(ObjectDescription) -> Result<()>,
    ) -> Result<usize> {
        let _admin = self.admin.read();
        let store = self.store(&query.type_name)?;
        let guard = store.read();
        let mut count = 0usize;
        for record in guard.matching_records(query)? {
            visit(ObjectDescription::of(record))?;
            count += 1;
        }
        Ok(count)
    }

    /// Visit each present record of a primary-key list, with progress
    ///
    /// Found records stream in input order, each tagged `(current,
    /// total)`; only the ids are collected up front, the records resolve
    /// one at a time under the read lock. Returns the keys with no
    /// (matching) record, in input order.
    pub fn get_available_items_with(
        &self,
        type_name: &str,
        keys: &[KeyValue],
        filter: Option<&Query>,
        mut visit: impl FnMut(AvailableItem) -> Result<()>,
    ) -> Result<Vec<KeyValue>> {
        let _admin = self.admin.read();
        let store = self.store(type_name)?;
        let guard = store.read();
        let (found, missing) = guard.available_ids(keys, filter)?;
        let total = found.len();
        for (i, id) in found.into_iter().enumerate() {
            visit(AvailableItem {
                current: i + 1,
                total,
                record: guard.record(id).clone(),
            })?;
        }
        Ok(missing)
    }

    /// Which of the given primary keys are present (optionally filtered)
    ///
    /// Convenience over [`Database::get_available_items_with`]: the found
    /// records in input order with their progress tags, plus the missing
    /// keys in input order.
    pub fn get_available_items(
        &self,
        type_name: &str,
        keys: &[KeyValue],
        filter: Option<&Query>,
    ) -> Result<AvailableItems> {
        let mut items = Vec::new();
        let missing = self.get_available_items_with(type_name, keys, filter, |item| {
            items.push(item);
            Ok(())
        })?;
        Ok(AvailableItems { items, missing })
    }

    /// Live record count of a type
    pub fn count(&self, type_name: &str) -> Result<usize> {
        let _admin = self.admin.read();
        Ok(self.store(type_name)?.read().count())
    }

    /// Hit count of a type
    pub fn hit_count(&self, type_name: &str) -> Result<u64> {
        let _admin = self.admin.read();
        Ok(self.store(type_name)?.read().hit_count())
    }

    // ========================================================================
    // Sequences
    // ========================================================================

    /// Reserve `n` consecutive ids of a named sequence
    ///
    /// Concurrent callers receive disjoint ranges; the reservation is
    /// journaled before the range is handed out.
    pub fn generate_unique_ids(&self, name: &str, n: u64) -> Result<IdRange> {
        if n == 0 {
            return Err(GranaryError::invalid_query(
                "generate_unique_ids needs n >= 1",
            ));
        }
        let _admin = self.admin.read();
        let handle = self.sequences.handle(name);
        let mut value = handle.lock();
        self.log.append(&LogEntry::SequenceReserve {
            name: name.to_string(),
            count: n,
            timestamp: Timestamp::now(),
        })?;
        let first = *value + 1;
        *value += n;
        Ok(IdRange { first, last: *value })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("types", &self.registry.read().len())
            .field("log", &self.log)
            .finish()
    }
}
