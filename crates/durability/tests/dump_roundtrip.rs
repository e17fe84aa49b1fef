//! Dump write/read round trips
//!
//! Verifies the on-disk dump contract: dated directory, partition cap,
//! schema.json as the completeness marker, sequence marks, and corruption
//! detection on damaged data files.

use granary_core::{FieldDescriptor, IndexDescriptor, KeyKind, KeyValue, Record, TypeDescription};
use granary_durability::{DumpReader, DumpWriter, DUMP_PARTITION_RECORDS};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

fn trade_schema() -> TypeDescription {
    TypeDescription::new("Trade", FieldDescriptor::new("id", KeyKind::Int))
        .with_index(IndexDescriptor::dictionary("folder", KeyKind::Str))
}

fn trade(i: i64) -> Record {
    let folder = if i % 10 == 0 { "TOTO" } else { "TATA" };
    Record::new(format!("trade-{}", i).into_bytes(), KeyValue::Int(i))
        .with_index("folder", KeyValue::str(folder))
}

fn write_dump(root: &std::path::Path, count: i64) -> std::path::PathBuf {
    let records: Vec<Record> = (0..count).map(trade).collect();
    let mut sequences = BTreeMap::new();
    sequences.insert("blah".to_string(), 20u64);
    sequences.insert("foo".to_string(), 40u64);

    let mut writer = DumpWriter::create(root).unwrap();
    writer.write_type("Trade", records.iter()).unwrap();
    writer.write_sequences(&sequences).unwrap();
    writer.finish(std::slice::from_ref(&trade_schema())).unwrap()
}

#[test]
fn dump_layout_matches_contract() {
    let root = TempDir::new().unwrap();
    let dir = write_dump(root.path(), DUMP_PARTITION_RECORDS as i64 + 10);

    // Dated directory name.
    let name = dir.file_name().unwrap().to_str().unwrap();
    assert_eq!(name.len(), 10);
    assert_eq!(&name[4..5], "-");
    assert_eq!(&name[7..8], "-");

    // schema.json, sequence, and exactly two partitions (1000 + 10).
    assert!(dir.join("schema.json").is_file());
    assert!(dir.join("sequence").is_file());
    assert!(dir.join("Trade_0.data").is_file());
    assert!(dir.join("Trade_1.data").is_file());
    assert!(!dir.join("Trade_2.data").exists());
}

#[test]
fn reader_restores_schema_sequences_and_records() {
    let root = TempDir::new().unwrap();
    write_dump(root.path(), 25);

    // Open via the root: the reader finds the dated directory itself.
    let reader = DumpReader::open(root.path()).unwrap();
    assert_eq!(reader.contents().schema, vec![trade_schema()]);
    assert_eq!(reader.contents().sequences.get("blah"), Some(&20));
    assert_eq!(reader.contents().sequences.get("foo"), Some(&40));

    let mut restored = Vec::new();
    reader
        .for_each_record(|type_name, record| {
            assert_eq!(type_name, "Trade");
            restored.push(record);
            Ok(())
        })
        .unwrap();
    assert_eq!(restored.len(), 25);
    // Primary-key order within the partition.
    assert_eq!(restored[0].primary, KeyValue::Int(0));
    assert_eq!(restored[24].primary, KeyValue::Int(24));
    assert_eq!(restored[10].payload, b"trade-10");
}

#[test]
fn partitions_stream_in_order_across_files() {
    let root = TempDir::new().unwrap();
    write_dump(root.path(), DUMP_PARTITION_RECORDS as i64 + 10);

    let reader = DumpReader::open(root.path()).unwrap();
    let mut primaries = Vec::new();
    reader
        .for_each_record(|_, record| {
            primaries.push(record.primary.clone());
            Ok(())
        })
        .unwrap();
    assert_eq!(primaries.len(), DUMP_PARTITION_RECORDS + 10);
    // Partition 0 ends at 999, partition 1 starts at 1000.
    assert_eq!(
        primaries[DUMP_PARTITION_RECORDS - 1],
        KeyValue::Int(DUMP_PARTITION_RECORDS as i64 - 1)
    );
    assert_eq!(
        primaries[DUMP_PARTITION_RECORDS],
        KeyValue::Int(DUMP_PARTITION_RECORDS as i64)
    );
}

#[test]
fn missing_schema_json_means_no_dump() {
    let root = TempDir::new().unwrap();
    let dir = write_dump(root.path(), 5);
    fs::remove_file(dir.join("schema.json")).unwrap();

    assert!(DumpReader::open(root.path()).is_err());
    assert!(DumpReader::open(&dir).is_err());
}

#[test]
fn damaged_data_file_is_reported() {
    let root = TempDir::new().unwrap();
    let dir = write_dump(root.path(), 5);

    let data = dir.join("Trade_0.data");
    let mut bytes = fs::read(&data).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x01;
    fs::write(&data, &bytes).unwrap();

    let reader = DumpReader::open(&dir).unwrap();
    let result = reader.for_each_record(|_, _| Ok(()));
    assert!(result.is_err());
}

#[test]
fn empty_type_writes_no_files() {
    let root = TempDir::new().unwrap();
    let mut writer = DumpWriter::create(root.path()).unwrap();
    let partitions = writer.write_type("Trade", std::iter::empty()).unwrap();
    assert_eq!(partitions, 0);
    writer.write_sequences(&BTreeMap::new()).unwrap();
    let dir = writer.finish(&[trade_schema()]).unwrap();

    let reader = DumpReader::open(&dir).unwrap();
    let mut seen = 0;
    reader
        .for_each_record(|_, _| {
            seen += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, 0);
}
