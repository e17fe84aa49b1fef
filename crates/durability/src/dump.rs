//! Logical dumps
//!
//! A dump is a dated snapshot directory:
//!
//! ```text
//! <root>/YYYY-MM-DD/
//!   <type>_<partition>.data   -- at most 1000 records each, primary-key order
//!   sequence                  -- JSON map of sequence name -> high-water mark
//!   schema.json               -- concatenated TypeDescriptions, written LAST
//! ```
//!
//! Every file is written under a temporary name and renamed into place.
//! `schema.json` goes last: its presence is the completeness marker, so a
//! dump that died halfway is recognisable (and ignored) by its absence.
//!
//! Data files carry a small header followed by one CRC frame per record:
//!
//! ```text
//! [magic: u32][version: u32][name len: u32][type name][record count: u32]
//! frame*
//! ```

use crate::encoding::{decode_frame, encode_frame, DecodeOutcome};
use chrono::Local;
use granary_core::{GranaryError, Record, Result, TypeDescription};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Maximum records per data file
pub const DUMP_PARTITION_RECORDS: usize = 1000;

/// File magic for data files: "GRDT"
const DATA_MAGIC: u32 = 0x4752_4454;
/// Data file format version
const DATA_VERSION: u32 = 1;
/// Frame tag for a record
const TYPE_RECORD: u8 = 1;

/// Name of the completeness marker file
const SCHEMA_FILE: &str = "schema.json";
/// Name of the sequence high-water file
const SEQUENCE_FILE: &str = "sequence";

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

// ============================================================================
// Writer
// ============================================================================

/// Writes one dump directory
///
/// Usage: `create`, then `write_type` per type, `write_sequences`, and
/// `finish` with the schema. Dropping a writer without `finish` leaves a
/// directory without `schema.json`, which readers ignore.
pub struct DumpWriter {
    dir: PathBuf,
}

impl DumpWriter {
    /// Create today's dump directory under `root`
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let dir = root
            .as_ref()
            .join(Local::now().format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "writing dump");
        Ok(DumpWriter { dir })
    }

    /// Write one type's records, partitioned
    ///
    /// The caller supplies records in primary-key order; partitions split
    /// on that order, at most [`DUMP_PARTITION_RECORDS`] records each. A
    /// type with no records writes no files.
    pub fn write_type<'a>(
        &mut self,
        type_name: &str,
        records: impl Iterator<Item = &'a Record>,
    ) -> Result<usize> {
        let mut partition = 0usize;
        let mut chunk: Vec<&Record> = Vec::with_capacity(DUMP_PARTITION_RECORDS);
        for record in records {
            chunk.push(record);
            if chunk.len() == DUMP_PARTITION_RECORDS {
                self.write_partition(type_name, partition, &chunk)?;
                partition += 1;
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            self.write_partition(type_name, partition, &chunk)?;
            partition += 1;
        }
        Ok(partition)
    }

    fn write_partition(&self, type_name: &str, partition: usize, records: &[&Record]) -> Result<()> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&DATA_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&DATA_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(type_name.len() as u32).to_le_bytes());
        bytes.extend_from_slice(type_name.as_bytes());
        bytes.extend_from_slice(&(records.len() as u32).to_le_bytes());
        for record in records {
            bytes.extend_from_slice(&encode_frame(TYPE_RECORD, record)?);
        }

        let path = self.dir.join(format!("{}_{}.data", type_name, partition));
        write_atomic(&path, &bytes)
    }

    /// Write the sequence high-water marks
    pub fn write_sequences(&mut self, sequences: &BTreeMap<String, u64>) -> Result<()> {
        let json = serde_json::to_vec_pretty(sequences)
            .map_err(|e| GranaryError::io(format!("encoding sequence file: {}", e)))?;
        write_atomic(&self.dir.join(SEQUENCE_FILE), &json)
    }

    /// Write `schema.json` and seal the dump
    ///
    /// Returns the dump directory. Nothing before this call makes the
    /// dump visible to readers.
    pub fn finish(self, schema: &[TypeDescription]) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(schema)
            .map_err(|e| GranaryError::io(format!("encoding schema.json: {}", e)))?;
        write_atomic(&self.dir.join(SCHEMA_FILE), &json)?;
        info!(dir = %self.dir.display(), types = schema.len(), "dump complete");
        Ok(self.dir)
    }
}

// ============================================================================
// Reader
// ============================================================================

/// The sealed parts of a dump directory
#[derive(Debug)]
pub struct DumpContents {
    /// Declared schemas, as written
    pub schema: Vec<TypeDescription>,
    /// Sequence high-water marks, as written
    pub sequences: BTreeMap<String, u64>,
}

/// Reads one dump directory back
pub struct DumpReader {
    dir: PathBuf,
    contents: DumpContents,
}

impl DumpReader {
    /// Open a dump
    ///
    /// `path` is either a dated dump directory (holds `schema.json`) or a
    /// dump root; for a root, the newest complete dated directory wins and
    /// partial dumps (no `schema.json`) are skipped with a warning.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dir = if path.join(SCHEMA_FILE).is_file() {
            path.to_path_buf()
        } else {
            Self::latest_complete(path)?
        };

        let schema_bytes = fs::read(dir.join(SCHEMA_FILE))
            .map_err(|e| GranaryError::dump_corrupt(dir.display().to_string(), e.to_string()))?;
        let schema: Vec<TypeDescription> = serde_json::from_slice(&schema_bytes).map_err(|e| {
            GranaryError::dump_corrupt(dir.display().to_string(), format!("schema.json: {}", e))
        })?;

        let seq_bytes = fs::read(dir.join(SEQUENCE_FILE)).map_err(|_| {
            GranaryError::dump_corrupt(dir.display().to_string(), "missing sequence file")
        })?;
        let sequences: BTreeMap<String, u64> = serde_json::from_slice(&seq_bytes).map_err(|e| {
            GranaryError::dump_corrupt(dir.display().to_string(), format!("sequence file: {}", e))
        })?;

        Ok(DumpReader {
            dir,
            contents: DumpContents { schema, sequences },
        })
    }

    fn latest_complete(root: &Path) -> Result<PathBuf> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(root)
            .map_err(|e| GranaryError::dump_corrupt(root.display().to_string(), e.to_string()))?
        {
            let dir = entry?.path();
            if !dir.is_dir() {
                continue;
            }
            if dir.join(SCHEMA_FILE).is_file() {
                candidates.push(dir);
            } else {
                warn!(dir = %dir.display(), "ignoring partial dump (no schema.json)");
            }
        }
        // Dated names sort lexicographically in date order.
        candidates.sort();
        candidates.pop().ok_or_else(|| {
            GranaryError::dump_corrupt(root.display().to_string(), "no complete dump found")
        })
    }

    /// The directory being read
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Schema and sequence marks
    pub fn contents(&self) -> &DumpContents {
        &self.contents
    }

    /// Stream every record to a visitor, file by file
    ///
    /// Partitions of a type are visited in partition order; nothing is
    /// buffered beyond one file. The visitor's error aborts the walk.
    pub fn for_each_record(
        &self,
        mut visit: impl FnMut(&str, Record) -> Result<()>,
    ) -> Result<()> {
        let mut data_files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "data"))
            .collect();
        data_files.sort();

        for path in data_files {
            self.read_data_file(&path, &mut visit)?;
        }
        Ok(())
    }

    fn read_data_file(
        &self,
        path: &Path,
        visit: &mut impl FnMut(&str, Record) -> Result<()>,
    ) -> Result<()> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        let display = path.display().to_string();

        if bytes.len() < 12 {
            return Err(GranaryError::dump_corrupt(display, "header too short"));
        }
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if magic != DATA_MAGIC {
            return Err(GranaryError::dump_corrupt(display, "bad magic"));
        }
        if version != DATA_VERSION {
            return Err(GranaryError::dump_corrupt(
                display,
                format!("unsupported version {}", version),
            ));
        }
        let name_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        if bytes.len() < 12 + name_len + 4 {
            return Err(GranaryError::dump_corrupt(display, "truncated header"));
        }
        let type_name = std::str::from_utf8(&bytes[12..12 + name_len])
            .map_err(|_| GranaryError::dump_corrupt(display.clone(), "type name not utf-8"))?
            .to_string();
        let count_at = 12 + name_len;
        let declared = u32::from_le_bytes([
            bytes[count_at],
            bytes[count_at + 1],
            bytes[count_at + 2],
            bytes[count_at + 3],
        ]) as usize;

        let mut pos = count_at + 4;
        let mut seen = 0usize;
        loop {
            match decode_frame::<Record>(&bytes[pos..]) {
                DecodeOutcome::Frame(frame) => {
                    pos += frame.encoded_len;
                    seen += 1;
                    visit(&type_name, frame.record)?;
                }
                DecodeOutcome::End => break,
                DecodeOutcome::Truncated => {
                    return Err(GranaryError::dump_corrupt(display, "truncated record frame"))
                }
                DecodeOutcome::Corrupt { reason } => {
                    return Err(GranaryError::dump_corrupt(display, reason))
                }
            }
        }
        if seen != declared {
            return Err(GranaryError::dump_corrupt(
                display,
                format!("header declares {} records, file holds {}", declared, seen),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granary_core::{FieldDescriptor, KeyKind, KeyValue};

    fn schema() -> Vec<TypeDescription> {
        vec![TypeDescription::new(
            "Item",
            FieldDescriptor::new("id", KeyKind::Int),
        )]
    }

    #[test]
    fn partition_cap_respected() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<Record> = (0..(DUMP_PARTITION_RECORDS as i64 + 10))
            .map(|i| Record::new(vec![], KeyValue::Int(i)))
            .collect();

        let mut writer = DumpWriter::create(dir.path()).unwrap();
        let partitions = writer.write_type("Item", records.iter()).unwrap();
        assert_eq!(partitions, 2);
        writer.write_sequences(&BTreeMap::new()).unwrap();
        let dump_dir = writer.finish(&schema()).unwrap();

        assert!(dump_dir.join("Item_0.data").is_file());
        assert!(dump_dir.join("Item_1.data").is_file());
        assert!(!dump_dir.join("Item_2.data").exists());
    }

    #[test]
    fn partial_dump_without_schema_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DumpWriter::create(dir.path()).unwrap();
        writer.write_sequences(&BTreeMap::new()).unwrap();
        drop(writer); // no finish(): no schema.json

        assert!(DumpReader::open(dir.path()).is_err());
    }
}
