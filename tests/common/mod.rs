#![allow(dead_code)]

use genealogy_records::{
    Caller, EntitySchema, FieldType, InMemoryStorage, Record, RequestContext, SchemaRegistry, Value,
};
use std::sync::Arc;

/// Fresh tables for the built-in entities, used on behalf of `caller`.
pub fn context(caller: Caller) -> RequestContext {
    genealogy_records::in_memory(caller).unwrap()
}

/// Context over a single small entity, `Pairs` (tblPairs: ID, A, B, Label,
/// Version), for filter and concurrency tests.
pub fn pairs_context(caller: Caller) -> RequestContext {
    let registry = SchemaRegistry::new(vec![
        EntitySchema::new("Pairs", "tblPairs")
            .primary_key("id", "ID")
            .field("a", "A", FieldType::Integer)
            .field("b", "B", FieldType::Integer)
            .field("label", "Label", FieldType::Text)
            .versioned("version", "Version"),
    ])
    .unwrap();
    let storage = InMemoryStorage::for_registry(&registry).unwrap();
    RequestContext::new(Arc::new(storage), caller).with_registry(Arc::new(registry))
}

/// Insert one row as administrator and return its key.
pub async fn insert(ctx: &RequestContext, entity: &str, fields: &[(&str, Value)]) -> i64 {
    let admin = ctx.for_caller(Caller::admin("master"));
    let mut record = Record::new(&admin, entity).unwrap();
    for (field, value) in fields {
        record.set(field, value.clone()).unwrap();
    }
    record.save().await.unwrap();
    record.key().unwrap()
}

/// Eight locations: three on "Lot 5 Con 2" and five elsewhere, interleaved.
/// Returns the keys of the matching three in ascending order.
pub async fn seed_locations(ctx: &RequestContext) -> Vec<i64> {
    let names = [
        ("Caradoc, Middlesex, ON, CA", false),
        ("Lot 5 Con 2, Caradoc, Middlesex, ON, CA", true),
        ("London, Middlesex, ON, CA", false),
        ("Lot 15 Con 2, Caradoc, Middlesex, ON, CA", false),
        ("Lot 5 Con 2 East, Ekfrid, Middlesex, ON, CA", true),
        ("Lot 5 Con 3, Caradoc, Middlesex, ON, CA", false),
        ("Strathroy, Middlesex, ON, CA", false),
        ("lot 5 con 2, Metcalfe, Middlesex, ON, CA", true),
    ];
    let mut matching = Vec::new();
    for (zoom, (name, matches)) in names.iter().enumerate() {
        let key = insert(
            ctx,
            "Locations",
            &[("location", Value::from(*name)), ("zoom", Value::Integer(zoom as i64 + 1))],
        )
        .await;
        if *matches {
            matching.push(key);
        }
    }
    matching
}

/// `count` numbered temples, codes T001.. with `used` set on even ones.
pub async fn seed_temples(ctx: &RequestContext, count: usize) {
    for n in 1..=count {
        insert(
            ctx,
            "Temples",
            &[
                ("code", Value::from(format!("T{:03}", n))),
                ("templestart", Value::Integer(1800 + n as i64)),
                ("used", Value::Boolean(n % 2 == 0)),
            ],
        )
        .await;
    }
}
