//! Named unique-id sequences
//!
//! `generate_unique_ids(name, n)` atomically advances sequence `name` by
//! `n` and returns the contiguous range `[old+1 .. old+n]`. Different
//! names are independent; concurrent callers on one name serialize on its
//! mutex and therefore receive disjoint ranges.

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A contiguous range of reserved ids, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    /// First id in the range
    pub first: u64,
    /// Last id in the range
    pub last: u64,
}

impl IdRange {
    /// The ids as an iterator
    pub fn iter(&self) -> impl Iterator<Item = u64> {
        self.first..=self.last
    }

    /// Number of ids in the range (never zero by construction)
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }
}

/// The set of named sequences
///
/// The outer map lock is held only to fetch a handle; reservations hold
/// the per-sequence mutex, so distinct names never contend.
#[derive(Debug, Default)]
pub(crate) struct Sequences {
    map: RwLock<FxHashMap<String, Arc<Mutex<u64>>>>,
}

impl Sequences {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the handle for a sequence
    pub(crate) fn handle(&self, name: &str) -> Arc<Mutex<u64>> {
        if let Some(h) = self.map.read().get(name) {
            return h.clone();
        }
        self.map
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(0)))
            .clone()
    }

    /// Current high-water mark of every sequence
    pub(crate) fn snapshot(&self) -> BTreeMap<String, u64> {
        self.map
            .read()
            .iter()
            .map(|(name, h)| (name.clone(), *h.lock()))
            .collect()
    }

    /// Restore every sequence to a snapshot, dropping names not in it
    pub(crate) fn restore(&self, snapshot: &BTreeMap<String, u64>) {
        let mut map = self.map.write();
        map.clear();
        for (name, value) in snapshot {
            map.insert(name.clone(), Arc::new(Mutex::new(*value)));
        }
    }

    /// Advance a sequence to at least `to` (import restore policy)
    pub(crate) fn advance_to(&self, name: &str, to: u64) {
        let handle = self.handle(name);
        let mut value = handle.lock();
        if *value < to {
            *value = to;
        }
    }

    /// Whether no sequence has ever been advanced
    pub(crate) fn all_unused(&self) -> bool {
        self.map.read().values().all(|h| *h.lock() == 0)
    }
}
