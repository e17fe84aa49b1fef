//! Dump, import, and initialize-from-dump
//!
//! All three hold the process-wide admin lock exclusively for their whole
//! duration.
//!
//! Import applies the dump to a **staging view**: clones of the affected
//! per-type stores (`Arc<Record>` makes the clones cheap) plus fresh
//! stores for types only the dump knows. The live store is untouched
//! until the staged state is complete and journaled; only then is it
//! swapped in. Any failure on the way, a corrupt data file as much as an
//! injected fault, just drops the staging view, so a failed import is
//! indistinguishable from no import.

use crate::database::Database;
use granary_core::{GranaryError, Result, Timestamp};
use granary_durability::{DumpReader, DumpWriter, FaultInjector, LogEntry};
use granary_store::TypedStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

impl Database {
    /// Write a full logical dump under `root/YYYY-MM-DD/`
    ///
    /// Schema, data partitions in primary-key order, and sequence marks.
    /// Returns the dump directory.
    pub fn dump<P: AsRef<Path>>(&self, root: P) -> Result<PathBuf> {
        let _admin = self.admin.write();
        let registry = self.registry.read();

        let mut names: Vec<&String> = registry.keys().collect();
        names.sort();

        let mut writer = DumpWriter::create(root)?;
        let mut schema = Vec::with_capacity(names.len());
        for name in names {
            let guard = registry[name.as_str()].read();
            schema.push(guard.description().clone());
            writer.write_type(name, guard.records_by_primary().map(|r| r.as_ref()))?;
        }
        writer.write_sequences(&self.sequences.snapshot())?;
        let dir = writer.finish(&schema)?;
        info!(dir = %dir.display(), types = schema.len(), "dump written");
        Ok(dir)
    }

    /// Import a dump into the running store
    ///
    /// Records upsert by primary key: a dumped record replaces the live
    /// record with the same key, live records the dump does not know
    /// survive. Sequences restore to the max of current and dumped, so
    /// ids generated after the import stay above anything handed out
    /// before the dump. Atomic: on any failure the store is left exactly
    /// as it was.
    pub fn import_dump<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let _admin = self.admin.write();
        self.import_locked(path.as_ref())
    }

    /// Import a dump into an empty store
    ///
    /// `StoreNotEmpty` if any registered type holds records or any
    /// sequence has been reserved.
    pub fn initialize_from_dump<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let _admin = self.admin.write();

        {
            let registry = self.registry.read();
            for (name, store) in registry.iter() {
                if store.read().count() > 0 {
                    return Err(GranaryError::StoreNotEmpty {
                        reason: format!("type '{}' holds records", name),
                    });
                }
            }
        }
        if !self.sequences.all_unused() {
            return Err(GranaryError::StoreNotEmpty {
                reason: "sequences have been reserved".to_string(),
            });
        }

        self.import_locked(path.as_ref())
    }

    /// The shared import path; caller holds the admin lock exclusively
    fn import_locked(&self, path: &Path) -> Result<usize> {
        let reader = DumpReader::open(path)?;
        let timestamp = Timestamp::now();

        // Stage: clones of affected live stores, fresh stores for new types.
        let mut staging: BTreeMap<String, TypedStore> = BTreeMap::new();
        let mut entries: Vec<LogEntry> = Vec::new();
        {
            let registry = self.registry.read();
            for description in &reader.contents().schema {
                match registry.get(&description.type_name) {
                    Some(live) => {
                        let guard = live.read();
                        if guard.description() != description {
                            return Err(GranaryError::schema_mismatch(
                                &description.type_name,
                                "dump schema differs from the registered schema",
                            ));
                        }
                        staging.insert(description.type_name.clone(), guard.clone());
                    }
                    None => {
                        staging.insert(
                            description.type_name.clone(),
                            TypedStore::new(description.clone())?,
                        );
                        entries.push(LogEntry::RegisterType {
                            description: description.clone(),
                            timestamp,
                        });
                    }
                }
            }
        }

        // Apply records to the staging view only.
        let mut applied = 0usize;
        reader.for_each_record(|type_name, record| {
            FaultInjector::step()?;
            let store = staging.get_mut(type_name).ok_or_else(|| {
                GranaryError::dump_corrupt(
                    path.display().to_string(),
                    format!("data file for undeclared type '{}'", type_name),
                )
            })?;
            entries.push(LogEntry::Put {
                type_name: type_name.to_string(),
                record: record.clone(),
                timestamp,
            });
            store.put(record)?;
            applied += 1;
            Ok(())
        })?;

        for (name, to) in &reader.contents().sequences {
            entries.push(LogEntry::SequenceAdvance {
                name: name.clone(),
                to: *to,
                timestamp,
            });
        }

        // Durable first, then swap the staged stores in.
        self.log.append_batch(&entries)?;

        let mut registry = self.registry.write();
        for (name, store) in staging {
            if let Some(live) = registry.get(&name).cloned() {
                *live.write() = store;
            } else {
                registry.insert(name, Arc::new(RwLock::new(store)));
            }
        }
        for (name, to) in &reader.contents().sequences {
            self.sequences.advance_to(name, *to);
        }

        info!(
            dir = %reader.dir().display(),
            records = applied,
            "dump imported"
        );
        Ok(applied)
    }
}
