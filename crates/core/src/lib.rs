//! Core types and contracts for Granary
//!
//! This crate defines the foundational types used throughout the system:
//! - KeyValue / KeyKind: Tagged scalar key values (int, string, date ticks)
//! - Record: One stored object snapshot (opaque payload + extracted keys)
//! - TypeDescription: The immutable per-type schema
//! - Query: Disjunction of and-blocks of atomic predicates
//! - DomainDescription: Declared domain-completeness regions
//! - GranaryError: Error type hierarchy with canonical wire codes
//! - Timestamp: Microsecond-precision timestamps for the transaction log

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod query;
pub mod record;
pub mod schema;
pub mod timestamp;

pub use error::{ErrorCode, GranaryError, Result};
pub use key::{KeyKind, KeyValue};
pub use query::{AndBlock, DeclareMode, DomainDescription, Operator, Predicate, Query};
pub use record::Record;
pub use schema::{FieldDescriptor, IndexDescriptor, TypeDescription};
pub use timestamp::Timestamp;
