//! Sequence generator guarantees under concurrency
//!
//! Across any interleaving of concurrent reservations on one name, the
//! returned ranges must be pairwise disjoint and their union a contiguous
//! block starting just above the initial high-water mark.

use granary_engine::Database;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

#[test]
fn concurrent_reservations_are_disjoint_and_contiguous() {
    let data = TempDir::new().unwrap();
    let db = Arc::new(Database::open(data.path()).unwrap());

    const THREADS: usize = 8;
    const ROUNDS: usize = 25;
    const CHUNK: u64 = 7;

    let mut handles = Vec::new();
    for _ in 0..THREADS {
        let db = db.clone();
        handles.push(thread::spawn(move || {
            let mut ranges = Vec::with_capacity(ROUNDS);
            for _ in 0..ROUNDS {
                ranges.push(db.generate_unique_ids("shared", CHUNK).unwrap());
            }
            ranges
        }));
    }

    let mut all_ids = BTreeSet::new();
    for handle in handles {
        for range in handle.join().unwrap() {
            assert_eq!(range.len(), CHUNK);
            for id in range.iter() {
                // Disjointness: every id is handed out exactly once.
                assert!(all_ids.insert(id), "id {} handed out twice", id);
            }
        }
    }

    // Contiguity: the union is exactly 1..=total.
    let total = (THREADS * ROUNDS) as u64 * CHUNK;
    assert_eq!(all_ids.len() as u64, total);
    assert_eq!(all_ids.first(), Some(&1));
    assert_eq!(all_ids.last(), Some(&total));
}

#[test]
fn distinct_names_do_not_interfere() {
    let data = TempDir::new().unwrap();
    let db = Arc::new(Database::open(data.path()).unwrap());

    let a = db.clone();
    let t1 = thread::spawn(move || {
        for _ in 0..50 {
            a.generate_unique_ids("left", 3).unwrap();
        }
    });
    let b = db.clone();
    let t2 = thread::spawn(move || {
        for _ in 0..50 {
            b.generate_unique_ids("right", 5).unwrap();
        }
    });
    t1.join().unwrap();
    t2.join().unwrap();

    assert_eq!(db.generate_unique_ids("left", 1).unwrap().first, 151);
    assert_eq!(db.generate_unique_ids("right", 1).unwrap().first, 251);
}

#[test]
fn zero_count_reservation_is_rejected() {
    let data = TempDir::new().unwrap();
    let db = Database::open(data.path()).unwrap();
    assert!(db.generate_unique_ids("s", 0).is_err());
}
