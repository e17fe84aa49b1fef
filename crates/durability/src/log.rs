//! Append-only transaction log
//!
//! Every successful mutating operation is appended as one framed record
//! before the operation is acknowledged, and the file is synced to stable
//! storage on acknowledgement. At startup the server replays all records
//! in order into an empty in-memory store.
//!
//! ## File Layout
//!
//! ```text
//! [magic: u32][version: u32]  -- file header
//! frame*                      -- see encoding module
//! ```
//!
//! A torn frame at the tail (crash mid-append) is tolerated: replay stops
//! there with a warning. A checksum failure anywhere else also stops
//! replay; the entries before it are used.

use crate::encoding::{decode_frame, encode_frame, DecodeOutcome};
use granary_core::{
    DeclareMode, DomainDescription, GranaryError, KeyValue, Record, Result, Timestamp,
    TypeDescription,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// File magic: "GRNL"
const LOG_MAGIC: u32 = 0x4752_4E4C;
/// Current log format version
const LOG_VERSION: u32 = 1;
/// Header size in bytes
const HEADER_LEN: u64 = 8;

// Entry type tags
const TYPE_REGISTER: u8 = 1;
const TYPE_PUT: u8 = 2;
const TYPE_REMOVE: u8 = 3;
const TYPE_TRUNCATE: u8 = 4;
const TYPE_DECLARE_DOMAIN: u8 = 5;
const TYPE_SEQ_RESERVE: u8 = 6;
const TYPE_SEQ_ADVANCE: u8 = 7;

/// One journaled mutation
///
/// `DeleteMany` has no entry of its own: it journals one `Remove` per
/// deleted record, so replay never re-evaluates a query against a
/// half-built store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    /// A type was registered
    RegisterType {
        /// The registered schema
        description: TypeDescription,
        /// When the registration was applied
        timestamp: Timestamp,
    },
    /// A record was inserted or replaced
    Put {
        /// Type the record belongs to
        type_name: String,
        /// The full record
        record: Record,
        /// When the put was applied
        timestamp: Timestamp,
    },
    /// A record was removed
    Remove {
        /// Type the record belonged to
        type_name: String,
        /// Primary key of the removed record
        primary: KeyValue,
        /// When the remove was applied
        timestamp: Timestamp,
    },
    /// A type was cleared
    Truncate {
        /// The cleared type
        type_name: String,
        /// When the truncate was applied
        timestamp: Timestamp,
    },
    /// A domain declaration changed
    DeclareDomain {
        /// Type the declaration applies to
        type_name: String,
        /// The declared description
        description: DomainDescription,
        /// How it combined with the existing state
        mode: DeclareMode,
        /// When the declaration was applied
        timestamp: Timestamp,
    },
    /// A sequence range was handed out
    SequenceReserve {
        /// Sequence name
        name: String,
        /// How many ids were reserved
        count: u64,
        /// When the reservation was applied
        timestamp: Timestamp,
    },
    /// A sequence was advanced to at least a mark (dump import)
    SequenceAdvance {
        /// Sequence name
        name: String,
        /// The restored high-water mark; replay takes the max with the
        /// current value
        to: u64,
        /// When the advance was applied
        timestamp: Timestamp,
    },
}

impl LogEntry {
    fn type_tag(&self) -> u8 {
        match self {
            LogEntry::RegisterType { .. } => TYPE_REGISTER,
            LogEntry::Put { .. } => TYPE_PUT,
            LogEntry::Remove { .. } => TYPE_REMOVE,
            LogEntry::Truncate { .. } => TYPE_TRUNCATE,
            LogEntry::DeclareDomain { .. } => TYPE_DECLARE_DOMAIN,
            LogEntry::SequenceReserve { .. } => TYPE_SEQ_RESERVE,
            LogEntry::SequenceAdvance { .. } => TYPE_SEQ_ADVANCE,
        }
    }
}

/// Information about log corruption detected during read
#[derive(Debug, Clone)]
pub struct LogCorruptionInfo {
    /// Byte offset where the bad frame starts
    pub offset: u64,
    /// What failed
    pub message: String,
    /// Entries successfully read before the bad frame
    pub entries_before: usize,
}

/// Result of reading the log
#[derive(Debug)]
pub struct LogReadResult {
    /// Successfully decoded entries, in append order
    pub entries: Vec<LogEntry>,
    /// Bytes consumed by valid frames (header included)
    pub bytes_read: u64,
    /// Set when the read stopped before the end of the file
    pub corruption: Option<LogCorruptionInfo>,
}

/// Append-only transaction log file
///
/// Thread-safe: appends serialize on an internal lock; `append` returns
/// only after the entry is synced, which is what lets the engine
/// acknowledge the mutation.
pub struct TransactionLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    offset: AtomicU64,
}

impl TransactionLog {
    /// Open an existing log or create a new one
    ///
    /// Creates parent directories as needed. A new file gets the header; an
    /// existing file has its header validated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.write_all(&LOG_MAGIC.to_le_bytes())?;
            file.write_all(&LOG_VERSION.to_le_bytes())?;
            file.sync_all()?;
        } else {
            if len < HEADER_LEN {
                return Err(GranaryError::io(format!(
                    "log '{}' shorter than its header",
                    path.display()
                )));
            }
            let mut header = [0u8; 8];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if magic != LOG_MAGIC {
                return Err(GranaryError::io(format!(
                    "'{}' is not a granary transaction log",
                    path.display()
                )));
            }
            if version != LOG_VERSION {
                return Err(GranaryError::io(format!(
                    "log '{}' has unsupported version {}",
                    path.display(),
                    version
                )));
            }
        }

        let offset = AtomicU64::new(HEADER_LEN.max(len));
        debug!(path = %path.display(), size = offset.load(Ordering::SeqCst), "opened transaction log");

        Ok(TransactionLog {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            offset,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and sync it to stable storage
    ///
    /// Returns the offset the entry was written at. The caller must not
    /// acknowledge the mutation before this returns.
    pub fn append(&self, entry: &LogEntry) -> Result<u64> {
        let encoded = encode_frame(entry.type_tag(), entry)?;
        let mut writer = self.writer.lock();
        let offset = self.offset.load(Ordering::SeqCst);
        writer
            .write_all(&encoded)
            .map_err(|e| GranaryError::io(format!("log append at {}: {}", offset, e)))?;
        writer
            .flush()
            .map_err(|e| GranaryError::io(format!("log flush: {}", e)))?;
        writer
            .get_mut()
            .sync_all()
            .map_err(|e| GranaryError::io(format!("log fsync: {}", e)))?;
        self.offset
            .fetch_add(encoded.len() as u64, Ordering::SeqCst);
        Ok(offset)
    }

    /// Append a batch of entries with a single sync at the end
    ///
    /// Used where one logical mutation journals several entries
    /// (`DeleteMany`, dump import); the batch becomes durable together.
    pub fn append_batch(&self, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        let mut written = 0u64;
        for entry in entries {
            let encoded = encode_frame(entry.type_tag(), entry)?;
            writer
                .write_all(&encoded)
                .map_err(|e| GranaryError::io(format!("log append: {}", e)))?;
            written += encoded.len() as u64;
        }
        writer
            .flush()
            .map_err(|e| GranaryError::io(format!("log flush: {}", e)))?;
        writer
            .get_mut()
            .sync_all()
            .map_err(|e| GranaryError::io(format!("log fsync: {}", e)))?;
        self.offset.fetch_add(written, Ordering::SeqCst);
        Ok(())
    }

    /// Current file size in bytes
    pub fn size(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Read every entry from the start of the log
    ///
    /// Never fails on a bad frame: replay uses the prefix before the
    /// damage and reports it in `corruption`.
    pub fn read_all(&self) -> Result<LogReadResult> {
        // Flush buffered appends so the read sees them.
        self.writer
            .lock()
            .flush()
            .map_err(|e| GranaryError::io(format!("log flush before read: {}", e)))?;

        let mut file = File::open(&self.path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        if bytes.len() < HEADER_LEN as usize {
            return Err(GranaryError::io(format!(
                "log '{}' shorter than its header",
                self.path.display()
            )));
        }

        let mut entries = Vec::new();
        let mut pos = HEADER_LEN as usize;
        let mut corruption = None;
        loop {
            match decode_frame::<LogEntry>(&bytes[pos..]) {
                DecodeOutcome::Frame(frame) => {
                    entries.push(frame.record);
                    pos += frame.encoded_len;
                }
                DecodeOutcome::End => break,
                DecodeOutcome::Truncated => {
                    warn!(
                        path = %self.path.display(),
                        offset = pos,
                        "torn frame at log tail; replaying the prefix"
                    );
                    corruption = Some(LogCorruptionInfo {
                        offset: pos as u64,
                        message: "torn frame at tail".to_string(),
                        entries_before: entries.len(),
                    });
                    break;
                }
                DecodeOutcome::Corrupt { reason } => {
                    warn!(
                        path = %self.path.display(),
                        offset = pos,
                        reason = %reason,
                        "corrupt log frame; replaying the prefix"
                    );
                    corruption = Some(LogCorruptionInfo {
                        offset: pos as u64,
                        message: reason,
                        entries_before: entries.len(),
                    });
                    break;
                }
            }
        }

        Ok(LogReadResult {
            entries,
            bytes_read: pos as u64,
            corruption,
        })
    }
}

impl std::fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLog")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_entry(i: i64) -> LogEntry {
        LogEntry::Put {
            type_name: "Item".to_string(),
            record: Record::new(vec![i as u8], KeyValue::Int(i)),
            timestamp: Timestamp::from_micros(i as u64),
        }
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransactionLog::open(dir.path().join("txn.log")).unwrap();

        for i in 0..10 {
            log.append(&put_entry(i)).unwrap();
        }
        let result = log.read_all().unwrap();
        assert_eq!(result.entries.len(), 10);
        assert!(result.corruption.is_none());
        assert_eq!(result.entries[3], put_entry(3));
    }

    #[test]
    fn reopen_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txn.log");
        {
            let log = TransactionLog::open(&path).unwrap();
            log.append(&put_entry(1)).unwrap();
        }
        let log = TransactionLog::open(&path).unwrap();
        log.append(&put_entry(2)).unwrap();
        assert_eq!(log.read_all().unwrap().entries.len(), 2);
    }

    #[test]
    fn rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-log");
        std::fs::write(&path, b"definitely not a log file").unwrap();
        assert!(TransactionLog::open(&path).is_err());
    }
}
