//! Persistence layer for Granary
//!
//! Three concerns live here:
//! - the append-only transaction log (`TransactionLog`, `LogEntry`):
//!   every successful mutation is journaled before it is acknowledged and
//!   replayed at startup
//! - logical dumps (`DumpWriter`, `DumpReader`): a dated snapshot
//!   directory of schema, partitioned data files, and sequence marks
//! - the debug-only `FaultInjector` consulted at import checkpoints
//!
//! All framed records on disk share one format:
//! `[length: u32][type: u8][payload: bincode][crc32: u32]`, crc over
//! `[type][payload]`, little-endian throughout.

pub mod dump;
pub mod encoding;
pub mod fault;
pub mod log;

pub use dump::{DumpContents, DumpReader, DumpWriter, DUMP_PARTITION_RECORDS};
pub use fault::FaultInjector;
pub use log::{LogCorruptionInfo, LogEntry, LogReadResult, TransactionLog};
