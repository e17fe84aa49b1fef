//! Query/count agreement through the public surface
//!
//! For any query, the count returned by `eval_query` must equal the length
//! of `get_many`, and the authoritative bit must reflect the domain
//! tracker alone.

use granary_core::{
    AndBlock, DeclareMode, DomainDescription, FieldDescriptor, IndexDescriptor, KeyKind, KeyValue,
    Operator, Predicate, Query, Record, TypeDescription,
};
use granary_store::TypedStore;

fn schema() -> TypeDescription {
    TypeDescription::new("Order", FieldDescriptor::new("id", KeyKind::Int))
        .with_index(IndexDescriptor::dictionary("desk", KeyKind::Str))
        .with_index(IndexDescriptor::ordered("qty", KeyKind::Int))
        .with_index(IndexDescriptor::list("books", KeyKind::Str))
}

fn order(id: i64, desk: &str, qty: i64, books: &[&str]) -> Record {
    Record::new(vec![0u8; 4], KeyValue::Int(id))
        .with_index("desk", KeyValue::str(desk))
        .with_index("qty", KeyValue::Int(qty))
        .with_list("books", books.iter().map(|b| KeyValue::str(*b)))
}

fn populated() -> TypedStore {
    let mut store = TypedStore::new(schema()).unwrap();
    for i in 0..40 {
        let desk = if i % 4 == 0 { "rates" } else { "credit" };
        let books: &[&str] = if i % 2 == 0 { &["alpha", "beta"] } else { &["beta"] };
        store.put(order(i, desk, i * 100, books)).unwrap();
    }
    store
}

fn queries() -> Vec<Query> {
    vec![
        Query::filter("Order", Predicate::eq("desk", KeyValue::str("rates"))),
        Query::filter("Order", Predicate::cmp("qty", Operator::Ge, KeyValue::Int(2000))),
        Query::filter("Order", Predicate::contains("books", [KeyValue::str("alpha")])),
        Query::single(
            "Order",
            AndBlock::new([
                Predicate::eq("desk", KeyValue::str("credit")),
                Predicate::cmp("qty", Operator::Lt, KeyValue::Int(1500)),
            ]),
        )
        .or(AndBlock::new([Predicate::is_in(
            "id",
            [KeyValue::Int(0), KeyValue::Int(1), KeyValue::Int(999)],
        )])),
    ]
}

#[test]
fn eval_query_count_matches_get_many() {
    let store = populated();
    for q in queries() {
        let (_, count) = store.eval_query(&q).unwrap();
        assert_eq!(count, store.get_many(&q).unwrap().len(), "query {:?}", q);
    }
}

#[test]
fn authoritative_bit_tracks_declarations_not_counts() {
    let mut store = populated();
    let rates = Query::filter("Order", Predicate::eq("desk", KeyValue::str("rates")));

    let (auth, count) = store.eval_query(&rates).unwrap();
    assert!(!auth);
    assert_eq!(count, 10);

    store.declare_domain(
        &DomainDescription::covering([AndBlock::new([Predicate::eq(
            "desk",
            KeyValue::str("rates"),
        )])]),
        DeclareMode::Add,
    );
    let (auth, count) = store.eval_query(&rates).unwrap();
    assert!(auth);
    assert_eq!(count, 10);

    // The declaration covers the desk, not the books.
    let books = Query::filter("Order", Predicate::contains("books", [KeyValue::str("alpha")]));
    let (auth, _) = store.eval_query(&books).unwrap();
    assert!(!auth);

    store.declare_domain(&DomainDescription::fully_loaded(), DeclareMode::Add);
    let (auth, _) = store.eval_query(&books).unwrap();
    assert!(auth);
}

#[test]
fn result_sets_agree_after_mutations() {
    let mut store = populated();
    for i in (0..40).step_by(5) {
        store.remove(&KeyValue::Int(i)).unwrap();
    }
    store.put(order(100, "rates", 50, &["alpha"])).unwrap();

    for q in queries() {
        let (_, count) = store.eval_query(&q).unwrap();
        assert_eq!(count, store.get_many(&q).unwrap().len());
    }
}
