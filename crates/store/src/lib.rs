//! Typed record store, indexes, and query evaluation
//!
//! This crate holds the in-memory heart of Granary:
//! - `TypedStore`: one per registered type; an arena of live records plus
//!   the index structures derived from the type's description
//! - the query evaluator (driving-predicate selection, residual filtering,
//!   block union)
//! - the domain-completeness tracker
//!
//! Records and indexes reference each other through `RecordId` handles:
//! records live in a stable arena, indexes store ids only, so there are no
//! ownership cycles.

pub mod describe;
pub mod domain;
mod eval;
pub mod index;
pub mod typed_store;

pub use describe::ObjectDescription;
pub use domain::DomainTracker;
pub use index::RecordId;
pub use typed_store::TypedStore;
