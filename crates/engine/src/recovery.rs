//! Startup recovery
//!
//! Replays transaction-log entries, in append order, into an empty
//! in-memory store. Replay never journals (the entries are already in the
//! log) and never touches hit counters.
//!
//! An entry that cannot be applied is skipped with a warning rather than
//! aborting the whole replay: the log prefix before it has already been
//! applied and losing the entire store to one bad entry would be worse
//! than losing the entry.

use crate::database::Database;
use granary_core::Result;
use granary_durability::LogEntry;
use granary_store::TypedStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

impl Database {
    /// Apply recovered entries to an empty store
    pub(crate) fn replay(&self, entries: Vec<LogEntry>) {
        for entry in entries {
            if let Err(e) = self.apply_replayed(entry) {
                warn!(error = %e, "skipping unreplayable log entry");
            }
        }
    }

    fn apply_replayed(&self, entry: LogEntry) -> Result<()> {
        match entry {
            LogEntry::RegisterType { description, .. } => {
                let mut registry = self.registry.write();
                if registry.contains_key(&description.type_name) {
                    // Idempotent re-registration was journaled once; seeing
                    // the name twice means two registrations both made it
                    // to the log, which replay treats the same way.
                    return Ok(());
                }
                let type_name = description.type_name.clone();
                registry.insert(type_name, Arc::new(RwLock::new(TypedStore::new(description)?)));
                Ok(())
            }
            LogEntry::Put { type_name, record, .. } => {
                let store = self.store_for_replay(&type_name)?;
                let result = store.write().put(record);
                result
            }
            LogEntry::Remove { type_name, primary, .. } => {
                let store = self.store_for_replay(&type_name)?;
                store.write().remove(&primary)?;
                Ok(())
            }
            LogEntry::Truncate { type_name, .. } => {
                let store = self.store_for_replay(&type_name)?;
                store.write().truncate();
                Ok(())
            }
            LogEntry::DeclareDomain {
                type_name,
                description,
                mode,
                ..
            } => {
                let store = self.store_for_replay(&type_name)?;
                store.write().declare_domain(&description, mode);
                Ok(())
            }
            LogEntry::SequenceReserve { name, count, .. } => {
                *self.sequences.handle(&name).lock() += count;
                Ok(())
            }
            LogEntry::SequenceAdvance { name, to, .. } => {
                self.sequences.advance_to(&name, to);
                Ok(())
            }
        }
    }

    fn store_for_replay(
        &self,
        type_name: &str,
    ) -> Result<Arc<RwLock<TypedStore>>> {
        self.registry
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| granary_core::GranaryError::unknown_type(type_name))
    }
}
