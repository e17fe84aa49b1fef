//! Granary engine
//!
//! The `Database` facade ties the pieces together: the per-type stores
//! behind reader/writer locks, the transaction log (journal before
//! acknowledge), the sequence generator, startup recovery, and the
//! dump/import/initialize administrative operations.
//!
//! ## Locking discipline
//!
//! - Per-type `RwLock<TypedStore>`: reads take the read lock, writes the
//!   write lock.
//! - A process-wide admin lock spanning all types: normal operations hold
//!   it shared, administrative operations (dump, import, initialize,
//!   domain declarations) hold it exclusively.
//! - Per-sequence mutexes; the log has its own append lock.
//!
//! Log append happens inside the per-type write lock and before the
//! operation returns, so acknowledgement implies durability.

mod config;
mod database;
mod import;
mod recovery;
mod sequences;

pub use config::NodeConfig;
pub use database::{AvailableItem, AvailableItems, Database, TypeSummary};
pub use sequences::IdRange;
