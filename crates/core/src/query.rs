//! Query model
//!
//! A query is a disjunction of and-blocks over a single type. An and-block
//! is a conjunction of atomic predicates `(key, op, operands)`. The model
//! here is pure data; eligibility rules and evaluation live in the store
//! crate. Validation runs against a `TypeDescription` before any
//! evaluation, so the evaluator only ever sees well-kinded predicates.
//!
//! Domain-completeness declarations reuse `AndBlock` as their covered
//! sub-query shape.

use crate::error::{GranaryError, Result};
use crate::key::KeyValue;
use crate::schema::TypeDescription;
use serde::{Deserialize, Serialize};

/// Atomic predicate operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Equality
    Eq,
    /// Inequality (never drives an index; filter only)
    Ne,
    /// Strictly less than
    Lt,
    /// Less than or equal
    Le,
    /// Strictly greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Membership in a scalar set
    In,
    /// List-index intersection with a scalar set
    Contains,
}

impl Operator {
    /// Whether this operator compares against exactly one operand
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }

    /// Whether this is a range comparison
    pub fn is_range(&self) -> bool {
        matches!(self, Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge)
    }
}

/// One atomic predicate: `(key name, operator, operands)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    /// Key name the predicate reads
    pub key: String,
    /// Comparison operator
    pub op: Operator,
    /// Operands; exactly one for scalar comparisons, one or more for
    /// `In`/`Contains`
    pub operands: Vec<KeyValue>,
}

impl Predicate {
    /// Build a scalar comparison predicate
    pub fn cmp(key: impl Into<String>, op: Operator, operand: KeyValue) -> Self {
        Predicate {
            key: key.into(),
            op,
            operands: vec![operand],
        }
    }

    /// Build an equality predicate
    pub fn eq(key: impl Into<String>, operand: KeyValue) -> Self {
        Self::cmp(key, Operator::Eq, operand)
    }

    /// Build an `in` predicate over a set of scalars
    pub fn is_in(key: impl Into<String>, operands: impl IntoIterator<Item = KeyValue>) -> Self {
        Predicate {
            key: key.into(),
            op: Operator::In,
            operands: operands.into_iter().collect(),
        }
    }

    /// Build a `contains` predicate over a list index
    pub fn contains(key: impl Into<String>, operands: impl IntoIterator<Item = KeyValue>) -> Self {
        Predicate {
            key: key.into(),
            op: Operator::Contains,
            operands: operands.into_iter().collect(),
        }
    }
}

/// A conjunction of atomic predicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AndBlock {
    /// The conjoined predicates
    pub predicates: Vec<Predicate>,
}

impl AndBlock {
    /// Build an and-block from predicates
    pub fn new(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        AndBlock {
            predicates: predicates.into_iter().collect(),
        }
    }
}

/// A query: a disjunction of and-blocks over one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Type the query runs against
    pub type_name: String,
    /// The disjuncts; a record matches if any block accepts it
    pub blocks: Vec<AndBlock>,
}

impl Query {
    /// Build a single-block query
    pub fn single(type_name: impl Into<String>, block: AndBlock) -> Self {
        Query {
            type_name: type_name.into(),
            blocks: vec![block],
        }
    }

    /// Build a single-predicate query
    pub fn filter(type_name: impl Into<String>, predicate: Predicate) -> Self {
        Self::single(type_name, AndBlock::new([predicate]))
    }

    /// Add a further disjunct (builder style)
    pub fn or(mut self, block: AndBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Validate the query against a type description
    ///
    /// Enforces, per predicate:
    /// - the key name is declared;
    /// - scalar comparisons carry exactly one operand, `In`/`Contains` at
    ///   least one;
    /// - `Contains` targets a list index and nothing else does;
    /// - every operand kind equals the declared field kind.
    ///
    /// An empty query (no blocks, or a block with no predicates) is also
    /// rejected here; the evaluator would otherwise have to invent a
    /// meaning for it.
    pub fn validate(&self, description: &TypeDescription) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(GranaryError::invalid_query("query has no and-blocks"));
        }
        for block in &self.blocks {
            if block.predicates.is_empty() {
                return Err(GranaryError::invalid_query("and-block has no predicates"));
            }
            for p in &block.predicates {
                let (kind, is_list) = description.key_shape(&p.key).ok_or_else(|| {
                    GranaryError::invalid_query(format!(
                        "'{}' is not a declared key of '{}'",
                        p.key, description.type_name
                    ))
                })?;

                match p.op {
                    op if op.is_scalar() => {
                        if p.operands.len() != 1 {
                            return Err(GranaryError::invalid_query(format!(
                                "'{}' takes exactly one operand",
                                p.key
                            )));
                        }
                    }
                    Operator::In | Operator::Contains => {
                        if p.operands.is_empty() {
                            return Err(GranaryError::invalid_query(format!(
                                "'{}' needs at least one operand",
                                p.key
                            )));
                        }
                    }
                    _ => unreachable!("operator classes are exhaustive"),
                }

                if p.op == Operator::Contains && !is_list {
                    return Err(GranaryError::invalid_query(format!(
                        "contains on '{}' which is not a list index",
                        p.key
                    )));
                }
                if p.op != Operator::Contains && is_list {
                    return Err(GranaryError::invalid_query(format!(
                        "list index '{}' only supports contains",
                        p.key
                    )));
                }

                if let Some(bad) = p.operands.iter().find(|v| v.kind() != kind) {
                    return Err(GranaryError::invalid_query(format!(
                        "operand for '{}' is {} but the field is {}",
                        p.key,
                        bad.kind(),
                        kind
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Which subsets of a type are known to be fully loaded
///
/// `covered` lists and-blocks whose matching records are all present in
/// the cache; `fully_loaded` declares the whole type present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDescription {
    /// The whole type is present in the cache
    pub fully_loaded: bool,
    /// Covered sub-queries, each a conjunction
    pub covered: Vec<AndBlock>,
}

impl DomainDescription {
    /// Declare the whole type fully loaded
    pub fn fully_loaded() -> Self {
        DomainDescription {
            fully_loaded: true,
            covered: Vec::new(),
        }
    }

    /// Declare a set of covered sub-queries
    pub fn covering(covered: impl IntoIterator<Item = AndBlock>) -> Self {
        DomainDescription {
            fully_loaded: false,
            covered: covered.into_iter().collect(),
        }
    }
}

/// How a domain declaration combines with the tracker's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclareMode {
    /// Replace both the flag and the covered set
    Set,
    /// Union covered sub-queries in; the flag is sticky-true
    Add,
    /// Clear the flag and remove the listed sub-queries
    Remove,
}
