//! Query evaluation
//!
//! Each and-block is driven by one indexed predicate; the rest filter the
//! candidates by reading key values off the record. Eligibility ranks the
//! available indexes from cheapest to broadest:
//!
//! 1. equality (`=` / `in`) on the primary key
//! 2. equality on a unique key
//! 3. equality on a dictionary index
//! 4. a range predicate on an ordered index
//! 5. `contains` on a list index
//!
//! An and-block with none of these fails the whole query with
//! `NotIndexable`. The final result is the union of the block results,
//! deduplicated by record id (ids and primary keys are in bijection).

use crate::index::RecordId;
use crate::typed_store::TypedStore;
use granary_core::{
    AndBlock, GranaryError, Operator, Predicate, Query, Record, Result, TypeDescription,
};
use std::collections::BTreeSet;
use std::ops::Bound;

/// Evaluate a query against a store, returning matching record ids
pub(crate) fn evaluate(store: &TypedStore, query: &Query) -> Result<Vec<RecordId>> {
    query.validate(&store.description)?;

    let mut result = BTreeSet::new();
    for block in &query.blocks {
        for id in evaluate_block(store, block)? {
            result.insert(id);
        }
    }
    Ok(result.into_iter().collect())
}

/// True if the record matches any and-block of the query
///
/// Pure per-record evaluation, no index involvement. Used for residual
/// filters applied to an already-known record (availability checks).
pub(crate) fn matches_record(
    description: &TypeDescription,
    record: &Record,
    query: &Query,
) -> bool {
    query
        .blocks
        .iter()
        .any(|block| block.predicates.iter().all(|p| matches(description, record, p)))
}

fn evaluate_block(store: &TypedStore, block: &AndBlock) -> Result<Vec<RecordId>> {
    let driving = pick_driving(store, block).ok_or_else(|| GranaryError::NotIndexable {
        type_name: store.description.type_name.clone(),
    })?;

    let candidates = drive(store, &block.predicates[driving]);

    let residual: Vec<&Predicate> = block
        .predicates
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != driving)
        .map(|(_, p)| p)
        .collect();

    Ok(candidates
        .into_iter()
        .filter(|id| {
            let record = &store.records[id];
            residual
                .iter()
                .all(|p| matches(&store.description, record, p))
        })
        .collect())
}

/// Pick the driving predicate for an and-block, or None if nothing indexes
///
/// Lower rank wins; the first predicate wins ties, so a query author can
/// bias the choice by ordering, not that the result depends on it.
fn pick_driving(store: &TypedStore, block: &AndBlock) -> Option<usize> {
    let mut best: Option<(u8, usize)> = None;
    for (i, p) in block.predicates.iter().enumerate() {
        let rank = match p.op {
            Operator::Eq | Operator::In => {
                if store.description.is_primary(&p.key) {
                    Some(0)
                } else if store.description.is_unique(&p.key) {
                    Some(1)
                } else if store.dict.contains_key(&p.key) {
                    Some(2)
                } else {
                    None
                }
            }
            op if op.is_range() => store.ordered.contains_key(&p.key).then_some(3),
            Operator::Contains => store.list.contains_key(&p.key).then_some(4),
            _ => None, // Ne never drives
        };
        if let Some(rank) = rank {
            if best.map_or(true, |(b, _)| rank < b) {
                best = Some((rank, i));
            }
        }
    }
    best.map(|(_, i)| i)
}

/// Produce the candidate set for a driving predicate
fn drive(store: &TypedStore, p: &Predicate) -> Vec<RecordId> {
    match p.op {
        Operator::Eq | Operator::In => {
            if store.description.is_primary(&p.key) {
                p.operands
                    .iter()
                    .filter_map(|v| store.primary.get(v).copied())
                    .collect()
            } else if let Some(ix) = store.unique.get(&p.key) {
                p.operands.iter().filter_map(|v| ix.get(v)).collect()
            } else {
                let ix = &store.dict[&p.key];
                let mut ids = BTreeSet::new();
                for v in &p.operands {
                    if let Some(bucket) = ix.get(v) {
                        ids.extend(bucket.iter().copied());
                    }
                }
                ids.into_iter().collect()
            }
        }
        op if op.is_range() => {
            let ix = &store.ordered[&p.key];
            let v = &p.operands[0];
            let (lower, upper) = match op {
                Operator::Lt => (Bound::Unbounded, Bound::Excluded(v)),
                Operator::Le => (Bound::Unbounded, Bound::Included(v)),
                Operator::Gt => (Bound::Excluded(v), Bound::Unbounded),
                Operator::Ge => (Bound::Included(v), Bound::Unbounded),
                _ => unreachable!("is_range covers exactly these"),
            };
            ix.range(lower, upper)
        }
        Operator::Contains => {
            let ix = &store.list[&p.key];
            let mut ids = BTreeSet::new();
            for v in &p.operands {
                if let Some(bucket) = ix.get(v) {
                    ids.extend(bucket.iter().copied());
                }
            }
            ids.into_iter().collect()
        }
        _ => unreachable!("Ne is never picked as driving"),
    }
}

/// Evaluate one predicate against one record
fn matches(description: &TypeDescription, record: &Record, p: &Predicate) -> bool {
    let primary_name = &description.primary.name;
    match p.op {
        Operator::Contains => match record.list_values(&p.key) {
            Some(values) => p.operands.iter().any(|v| values.contains(v)),
            None => false,
        },
        Operator::In => match record.scalar(primary_name, &p.key) {
            Some(value) => p.operands.contains(value),
            None => false,
        },
        op => {
            // Scalar comparison; a record that does not carry the key
            // matches nothing, Ne included.
            let value = match record.scalar(primary_name, &p.key) {
                Some(v) => v,
                None => return false,
            };
            let operand = &p.operands[0];
            match op {
                Operator::Eq => value == operand,
                Operator::Ne => value != operand,
                Operator::Lt => value < operand,
                Operator::Le => value <= operand,
                Operator::Gt => value > operand,
                Operator::Ge => value >= operand,
                _ => unreachable!("In/Contains handled above"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use granary_core::{
        FieldDescriptor, IndexDescriptor, KeyKind, KeyValue, Record, TypeDescription,
    };

    fn trade_schema() -> TypeDescription {
        TypeDescription::new("Trade", FieldDescriptor::new("id", KeyKind::Int))
            .with_unique(FieldDescriptor::new("ref", KeyKind::Str))
            .with_index(IndexDescriptor::dictionary("folder", KeyKind::Str))
            .with_index(IndexDescriptor::ordered("notional", KeyKind::Int))
            .with_index(IndexDescriptor::ordered("traded", KeyKind::Ticks))
            .with_index(IndexDescriptor::list("accounts", KeyKind::Int))
    }

    fn trade(id: i64, folder: &str, notional: i64, accounts: &[i64]) -> Record {
        Record::new(vec![], KeyValue::Int(id))
            .with_unique("ref", KeyValue::str(format!("T-{}", id)))
            .with_index("folder", KeyValue::str(folder))
            .with_index("notional", KeyValue::Int(notional))
            .with_index("traded", KeyValue::Ticks(1000 + id))
            .with_list("accounts", accounts.iter().map(|a| KeyValue::Int(*a)))
    }

    fn store() -> TypedStore {
        let mut s = TypedStore::new(trade_schema()).unwrap();
        s.put(trade(1, "aaa", 1500, &[1, 101, 10001, 7])).unwrap();
        s.put(trade(2, "aaa", 1600, &[2, 102, 10002, 7])).unwrap();
        s.put(trade(3, "bbb", 2000, &[3])).unwrap();
        s
    }

    fn ids(store: &TypedStore, q: &Query) -> Vec<i64> {
        let mut out: Vec<i64> = evaluate(store, q)
            .unwrap()
            .into_iter()
            .map(|id| match &store.records[&id].primary {
                KeyValue::Int(v) => *v,
                other => panic!("unexpected primary {:?}", other),
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn primary_equality_drives() {
        let s = store();
        let q = Query::filter("Trade", Predicate::eq("id", KeyValue::Int(2)));
        assert_eq!(ids(&s, &q), vec![2]);
    }

    #[test]
    fn primary_in_unions_point_lookups() {
        let s = store();
        let q = Query::filter(
            "Trade",
            Predicate::is_in("id", [KeyValue::Int(1), KeyValue::Int(3), KeyValue::Int(99)]),
        );
        assert_eq!(ids(&s, &q), vec![1, 3]);
    }

    #[test]
    fn unique_equality_drives() {
        let s = store();
        let q = Query::filter("Trade", Predicate::eq("ref", KeyValue::str("T-3")));
        assert_eq!(ids(&s, &q), vec![3]);
    }

    #[test]
    fn dictionary_equality_drives() {
        let s = store();
        let q = Query::filter("Trade", Predicate::eq("folder", KeyValue::str("aaa")));
        assert_eq!(ids(&s, &q), vec![1, 2]);
    }

    #[test]
    fn range_on_ordered_index() {
        let s = store();
        let q = Query::filter(
            "Trade",
            Predicate::cmp("notional", Operator::Ge, KeyValue::Int(1600)),
        );
        assert_eq!(ids(&s, &q), vec![2, 3]);

        let q = Query::filter(
            "Trade",
            Predicate::cmp("notional", Operator::Lt, KeyValue::Int(1600)),
        );
        assert_eq!(ids(&s, &q), vec![1]);
    }

    #[test]
    fn between_as_conjoined_ranges() {
        let s = store();
        let q = Query::single(
            "Trade",
            AndBlock::new([
                Predicate::cmp("notional", Operator::Ge, KeyValue::Int(1500)),
                Predicate::cmp("notional", Operator::Le, KeyValue::Int(1600)),
            ]),
        );
        assert_eq!(ids(&s, &q), vec![1, 2]);
    }

    #[test]
    fn contains_on_list_index() {
        let s = store();
        let q = Query::filter("Trade", Predicate::contains("accounts", [KeyValue::Int(101)]));
        assert_eq!(ids(&s, &q), vec![1]);

        let q = Query::filter("Trade", Predicate::contains("accounts", [KeyValue::Int(7)]));
        assert_eq!(ids(&s, &q), vec![1, 2]);

        let q = Query::filter(
            "Trade",
            Predicate::contains("accounts", [KeyValue::Int(101), KeyValue::Int(102)]),
        );
        assert_eq!(ids(&s, &q), vec![1, 2]);
    }

    #[test]
    fn residual_predicates_filter_candidates() {
        let s = store();
        let q = Query::single(
            "Trade",
            AndBlock::new([
                Predicate::eq("folder", KeyValue::str("aaa")),
                Predicate::cmp("notional", Operator::Gt, KeyValue::Int(1500)),
            ]),
        );
        assert_eq!(ids(&s, &q), vec![2]);

        let q = Query::single(
            "Trade",
            AndBlock::new([
                Predicate::eq("folder", KeyValue::str("aaa")),
                Predicate::cmp("notional", Operator::Ne, KeyValue::Int(1500)),
            ]),
        );
        assert_eq!(ids(&s, &q), vec![2]);
    }

    #[test]
    fn disjunction_dedupes_by_primary_key() {
        let s = store();
        let q = Query::filter("Trade", Predicate::eq("folder", KeyValue::str("aaa")))
            .or(AndBlock::new([Predicate::cmp(
                "notional",
                Operator::Ge,
                KeyValue::Int(1600),
            )]));
        // Trade 2 matches both blocks; it appears once.
        assert_eq!(ids(&s, &q), vec![1, 2, 3]);
    }

    #[test]
    fn pure_ne_block_is_not_indexable() {
        let s = store();
        let q = Query::filter(
            "Trade",
            Predicate::cmp("folder", Operator::Ne, KeyValue::str("aaa")),
        );
        let err = evaluate(&s, &q).unwrap_err();
        assert!(matches!(err, GranaryError::NotIndexable { .. }));
    }

    #[test]
    fn one_bad_block_fails_the_whole_query() {
        let s = store();
        let q = Query::filter("Trade", Predicate::eq("id", KeyValue::Int(1))).or(AndBlock::new(
            [Predicate::cmp("folder", Operator::Ne, KeyValue::str("x"))],
        ));
        assert!(evaluate(&s, &q).is_err());
    }

    #[test]
    fn range_on_ticks() {
        let s = store();
        let q = Query::filter(
            "Trade",
            Predicate::cmp("traded", Operator::Gt, KeyValue::Ticks(1001)),
        );
        assert_eq!(ids(&s, &q), vec![2, 3]);
    }
}
