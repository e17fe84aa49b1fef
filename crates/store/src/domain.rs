//! Domain-completeness tracker
//!
//! Per type, the tracker records which subsets of the type are known to be
//! fully loaded into the cache: an `is_fully_loaded` flag plus a set of
//! covered sub-queries (each an and-block). `eval_query` consults it to
//! answer "authoritative / not authoritative" alongside the count.

use granary_core::{AndBlock, DeclareMode, DomainDescription, Query};

/// Tracks declared domain completeness for one type
#[derive(Debug, Clone, Default)]
pub struct DomainTracker {
    fully_loaded: bool,
    covered: Vec<AndBlock>,
}

impl DomainTracker {
    /// Create an empty tracker (nothing declared complete)
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a domain declaration
    ///
    /// - `Set` replaces both the flag and the covered set
    /// - `Add` unions the description's covered sub-queries in; the flag
    ///   becomes true if already true or set by this call
    /// - `Remove` clears the flag and removes the listed sub-queries
    pub fn declare(&mut self, description: &DomainDescription, mode: DeclareMode) {
        match mode {
            DeclareMode::Set => {
                self.fully_loaded = description.fully_loaded;
                self.covered = description.covered.clone();
            }
            DeclareMode::Add => {
                self.fully_loaded = self.fully_loaded || description.fully_loaded;
                for block in &description.covered {
                    if !self.covered.contains(block) {
                        self.covered.push(block.clone());
                    }
                }
            }
            DeclareMode::Remove => {
                self.fully_loaded = false;
                self.covered.retain(|b| !description.covered.contains(b));
            }
        }
    }

    /// Whether the whole type is declared loaded
    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded
    }

    /// The current covered sub-queries
    pub fn covered(&self) -> &[AndBlock] {
        &self.covered
    }

    /// Authoritative test for a query
    ///
    /// A query is authoritative if the type is fully loaded, or every one
    /// of its and-blocks is subsumed by some covered sub-query. A covered
    /// sub-query subsumes an and-block when every atomic predicate of the
    /// covered sub-query appears in the and-block: the block then only
    /// narrows the covered region further.
    pub fn is_authoritative(&self, query: &Query) -> bool {
        if self.fully_loaded {
            return true;
        }
        query.blocks.iter().all(|block| {
            self.covered.iter().any(|cov| {
                cov.predicates
                    .iter()
                    .all(|p| block.predicates.contains(p))
            })
        })
    }

}
