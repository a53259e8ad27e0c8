mod common;

use common::{context, insert, seed_locations, seed_temples};
use async_trait::async_trait;
use genealogy_records::{
    AccessConfig, BatchMode, BulkOutcome, Caller, FilterSpec, InMemoryStorage, QueryResult, Record, RecordError,
    RecordSet, RequestContext, SchemaRegistry, SetSpec, Statement, Storage, TransactionId, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

async fn keys(set: &RecordSet) -> Vec<i64> {
    set.records().await.unwrap().filter_map(|r| r.key()).collect()
}

#[tokio::test]
async fn test_count_matches_unbounded_iteration() {
    let ctx = context(Caller::anonymous());
    seed_temples(&ctx, 25).await;

    for spec in [
        FilterSpec::new(),
        FilterSpec::new().and("used", true),
        FilterSpec::new().range("templestart", 1805, 1812),
        FilterSpec::new().pattern("code", "^T00"),
    ] {
        let set = RecordSet::new(&ctx, "Temples", &spec.limit(0)).unwrap();
        assert_eq!(set.count().await.unwrap() as usize, set.records().await.unwrap().count());
    }
}

#[tokio::test]
async fn test_pages_are_disjoint_and_ordered() {
    let ctx = context(Caller::anonymous());
    seed_temples(&ctx, 25).await;
    let filter = FilterSpec::new().range("templestart", 1803, 1824).order_by("used DESC, code");

    let all = keys(&RecordSet::new(&ctx, "Temples", &filter.clone().limit(0)).unwrap()).await;
    let first = keys(&RecordSet::new(&ctx, "Temples", &filter.clone().limit(10).offset(0)).unwrap()).await;
    let second = keys(&RecordSet::new(&ctx, "Temples", &filter.clone().limit(10).offset(10)).unwrap()).await;

    assert_eq!(all.len(), 22);
    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 10);
    assert!(first.iter().all(|k| !second.contains(k)));

    let joined: Vec<i64> = first.iter().chain(second.iter()).copied().collect();
    assert_eq!(joined, all[..20].to_vec());
}

#[tokio::test]
async fn test_location_prefix_scenario() {
    let ctx = context(Caller::anonymous());
    let expected = seed_locations(&ctx).await;

    let spec = FilterSpec::new().and("location", "^Lot 5 Con 2").limit(20).offset(0);
    let set = RecordSet::new(&ctx, "Locations", &spec).unwrap();

    assert_eq!(set.count().await.unwrap(), 3);
    assert_eq!(keys(&set).await, expected);
}

#[tokio::test]
async fn test_count_ignores_limit_and_offset() {
    let ctx = context(Caller::anonymous());
    seed_temples(&ctx, 12).await;
    let set = RecordSet::new(&ctx, "Temples", &FilterSpec::new().limit(5).offset(10)).unwrap();

    assert_eq!(set.count().await.unwrap(), 12);
    assert_eq!(set.len().await.unwrap(), 2);

    let info = set.information().await.unwrap();
    assert_eq!(info.entity, "Temples");
    assert_eq!(info.table, "tblTR");
    assert_eq!(info.primary_key, "IDTR");
    assert_eq!(info.count, 12);
    assert_eq!(info.returned, 2);
    assert_eq!(info.limit, Some(5));
    assert_eq!(info.offset, 10);
}

#[tokio::test]
async fn test_requested_limit_is_clamped() {
    let ctx = context(Caller::anonymous()).with_config(AccessConfig::new().max_limit(8));
    seed_temples(&ctx, 12).await;
    let set = RecordSet::new(&ctx, "Temples", &FilterSpec::new().limit(50)).unwrap();
    assert_eq!(set.limit(), Some(8));
    assert_eq!(set.len().await.unwrap(), 8);
}

#[tokio::test]
async fn test_default_order_is_primary_key() {
    let ctx = context(Caller::anonymous());
    for code in ["ZZZ", "AAA", "MMM"] {
        insert(&ctx, "Temples", &[("code", Value::from(code))]).await;
    }
    let set = RecordSet::new(&ctx, "Temples", &FilterSpec::new()).unwrap();
    assert_eq!(keys(&set).await, vec![1, 2, 3]);

    let by_code = RecordSet::new(&ctx, "Temples", &FilterSpec::new().order_by("code DESC")).unwrap();
    assert_eq!(keys(&by_code).await, vec![1, 3, 2]);
}

#[tokio::test]
async fn test_ties_broken_by_primary_key() {
    let ctx = context(Caller::anonymous());
    seed_temples(&ctx, 6).await;
    let set = RecordSet::new(&ctx, "Temples", &FilterSpec::new().order_by("used")).unwrap();
    assert_eq!(keys(&set).await, vec![1, 3, 5, 2, 4, 6]);
}

#[tokio::test]
async fn test_get_distinct_ascending() {
    let ctx = context(Caller::anonymous());
    seed_locations(&ctx).await;
    insert(&ctx, "Locations", &[("location", Value::from("Delaware")), ("zoom", Value::Integer(2))]).await;

    let set = RecordSet::new(&ctx, "Locations", &FilterSpec::new().range("zoom", 2, 4).limit(1)).unwrap();
    assert_eq!(
        set.get_distinct("zoom").await.unwrap(),
        vec![Value::Integer(2), Value::Integer(3), Value::Integer(4)]
    );
    assert!(matches!(set.get_distinct("colour").await.unwrap_err(), RecordError::UnknownField(..)));
}

#[tokio::test]
async fn test_bulk_update_with_increment() {
    let ctx = context(Caller::editor("jcobban"));
    seed_temples(&ctx, 5).await;

    let mut set = RecordSet::new(&ctx, "Temples", &FilterSpec::new().range("templestart", 1802, 1804).limit(1)).unwrap();
    let spec = SetSpec::from_params([("templestart", "+=100"), ("temple", "moved")]).unwrap();
    let outcome = set.update(&spec).await.unwrap();
    assert_eq!(outcome, BulkOutcome { applied: 3, denied: 0, blocked: 0 });

    let moved = RecordSet::new(&ctx, "Temples", &FilterSpec::new().and("temple", "moved")).unwrap();
    let starts: Vec<Value> = moved
        .records()
        .await
        .unwrap()
        .map(|r| r.get("templestart").unwrap().clone())
        .collect();
    assert_eq!(starts, vec![Value::Integer(1902), Value::Integer(1903), Value::Integer(1904)]);
}

#[tokio::test]
async fn test_bulk_update_validates_before_writing() {
    let ctx = context(Caller::editor("jcobban"));
    seed_temples(&ctx, 3).await;
    let mut set = RecordSet::new(&ctx, "Temples", &FilterSpec::new()).unwrap();

    let err = set.update(&SetSpec::new().set("templestart", "soon")).await.unwrap_err();
    assert!(matches!(err, RecordError::TypeMismatch(_)));
    let err = set.update(&SetSpec::new().increment("code", 1)).await.unwrap_err();
    assert!(matches!(err, RecordError::TypeMismatch(_)));

    assert_eq!(
        set.get_distinct("templestart").await.unwrap(),
        vec![Value::Integer(1801), Value::Integer(1802), Value::Integer(1803)]
    );
}

#[tokio::test]
async fn test_bulk_delete_skips_unowned_rows() {
    let ctx = context(Caller::editor("alice"));
    let bob = ctx.for_caller(Caller::editor("bob"));

    for (owner, surname) in [(&ctx, "Smith"), (&bob, "Smith"), (&ctx, "Smith"), (&ctx, "Jones")] {
        let mut person = Record::new(owner, "Persons").unwrap();
        person.set("surname", surname).unwrap();
        person.save().await.unwrap();
    }

    let mut smiths = RecordSet::new(&ctx, "Persons", &FilterSpec::new().and("surname", "Smith")).unwrap();
    let outcome = smiths.delete().await.unwrap();
    assert_eq!(outcome, BulkOutcome { applied: 2, denied: 1, blocked: 0 });

    let remaining = RecordSet::new(&ctx, "Persons", &FilterSpec::new()).unwrap();
    assert_eq!(keys(&remaining).await, vec![2, 4]);
    assert_eq!(smiths.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bulk_delete_counts_referenced_rows_as_blocked() {
    let ctx = context(Caller::editor("jcobban"));
    let used = insert(&ctx, "Locations", &[("location", Value::from("Caradoc"))]).await;
    insert(&ctx, "Locations", &[("location", Value::from("Caradoc Twp"))]).await;
    insert(&ctx, "Events", &[("idlrevent", Value::Integer(used))]).await;

    let mut set = RecordSet::new(&ctx, "Locations", &FilterSpec::new().pattern("location", "^Caradoc")).unwrap();
    let outcome = set.delete().await.unwrap();
    assert_eq!(outcome, BulkOutcome { applied: 1, denied: 0, blocked: 1 });
    assert!(Record::load(&ctx, "Locations", used).await.unwrap().exists());
}

/// Storage that fails the n-th UPDATE it is asked to run.
struct FlakyStorage {
    inner: InMemoryStorage,
    updates: AtomicUsize,
    fail_at: usize,
}

impl FlakyStorage {
    fn check(&self, statement: &Statement) -> genealogy_records::Result<()> {
        if matches!(statement, Statement::Update { .. })
            && self.updates.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at
        {
            return Err(RecordError::StorageError("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn execute(&self, statement: &Statement) -> genealogy_records::Result<QueryResult> {
        self.check(statement)?;
        self.inner.execute(statement).await
    }

    async fn begin(&self) -> genealogy_records::Result<TransactionId> {
        self.inner.begin().await
    }

    async fn execute_in(&self, txn: TransactionId, statement: &Statement) -> genealogy_records::Result<QueryResult> {
        self.check(statement)?;
        self.inner.execute_in(txn, statement).await
    }

    async fn commit(&self, txn: TransactionId) -> genealogy_records::Result<()> {
        self.inner.commit(txn).await
    }

    async fn rollback(&self, txn: TransactionId) -> genealogy_records::Result<()> {
        self.inner.rollback(txn).await
    }
}

fn flaky_context(mode: BatchMode) -> RequestContext {
    let storage = FlakyStorage {
        inner: InMemoryStorage::for_registry(SchemaRegistry::global()).unwrap(),
        updates: AtomicUsize::new(0),
        fail_at: 3,
    };
    RequestContext::new(Arc::new(storage), Caller::admin("master"))
        .with_config(AccessConfig::new().batch_mode(mode))
}

async fn renamed(ctx: &RequestContext) -> u64 {
    let set = RecordSet::new(ctx, "Temples", &FilterSpec::new().and("temple", "renamed")).unwrap();
    set.count().await.unwrap()
}

#[tokio::test]
async fn test_transaction_batch_rolls_back_on_storage_error() {
    let ctx = flaky_context(BatchMode::Transaction);
    seed_temples(&ctx, 4).await;

    let mut set = RecordSet::new(&ctx, "Temples", &FilterSpec::new()).unwrap();
    let err = set.update(&SetSpec::new().set("temple", "renamed")).await.unwrap_err();
    assert!(matches!(err, RecordError::StorageError(_)));
    assert_eq!(renamed(&ctx).await, 0);
}

#[tokio::test]
async fn test_rollback_leaves_other_requests_writes() {
    let first = context(Caller::admin("master")).with_config(AccessConfig::new().batch_mode(BatchMode::Transaction));
    let second = first.for_caller(Caller::editor("alice"));
    seed_temples(&first, 1).await;

    let storage = Arc::clone(first.storage());
    let txn = storage.begin().await.unwrap();
    let mut doomed = Record::new(&first.in_transaction(txn), "Temples").unwrap();
    doomed.set("code", "GONE").unwrap();
    doomed.save().await.unwrap();

    let mut temple = Record::new(&second, "Temples").unwrap();
    temple.set("code", "LOGAN").unwrap();
    temple.save().await.unwrap();
    let mut set = RecordSet::new(&second, "Temples", &FilterSpec::new().and("code", "LOGAN")).unwrap();
    let outcome = set.update(&SetSpec::new().set("temple", "renamed")).await.unwrap();
    assert_eq!(outcome.applied, 1);

    storage.rollback(txn).await.unwrap();
    let all = RecordSet::new(&first, "Temples", &FilterSpec::new()).unwrap();
    assert_eq!(all.count().await.unwrap(), 2);
    assert_eq!(renamed(&first).await, 1);
    assert!(!Record::load(&first, "Temples", doomed.key().unwrap()).await.unwrap().exists());
}

#[tokio::test]
async fn test_per_row_batch_keeps_earlier_rows() {
    let ctx = flaky_context(BatchMode::PerRow);
    seed_temples(&ctx, 4).await;

    let mut set = RecordSet::new(&ctx, "Temples", &FilterSpec::new()).unwrap();
    assert!(set.update(&SetSpec::new().set("temple", "renamed")).await.is_err());
    assert_eq!(renamed(&ctx).await, 2);
}

#[tokio::test]
async fn test_from_params_page() {
    let ctx = context(Caller::anonymous());
    seed_temples(&ctx, 30).await;

    let params = vec![("code", "^T0"), ("templestart", "1810..1829"), ("limit", "5"), ("offset", "5")];
    let spec = FilterSpec::from_params(params, ctx.config()).unwrap();
    let set = RecordSet::new(&ctx, "Temples", &spec).unwrap();
    assert_eq!(set.count().await.unwrap(), 20);
    assert_eq!(keys(&set).await, vec![15, 16, 17, 18, 19]);

    let bad = FilterSpec::from_params([("limit", "all")], ctx.config()).unwrap_err();
    assert!(matches!(bad, RecordError::InvalidFilter(_)));
}

#[tokio::test]
async fn test_seed_file_then_browse() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seed.json");
    std::fs::write(
        &path,
        r#"{
            "Locations": [
                {"location": "Lot 5 Con 2, Caradoc", "latitude": 42.95, "longitude": -81.6},
                {"location": "Strathroy", "used": "yes"}
            ]
        }"#,
    )
    .unwrap();

    let ctx = context(Caller::anonymous());
    let summary = genealogy_records::seed::load_seed_file(&ctx, &path).await.unwrap();
    assert_eq!(summary.get("Locations"), Some(&2));

    let set = RecordSet::new(&ctx, "tblLR", &FilterSpec::new().and("used", 1)).unwrap();
    let names: Vec<Value> = set.records().await.unwrap().map(|r| r.get("location").unwrap().clone()).collect();
    assert_eq!(names, vec![Value::from("Strathroy")]);

    let missing = genealogy_records::seed::load_seed_file(&ctx, dir.path().join("absent.json")).await;
    assert!(matches!(missing, Err(RecordError::StorageError(_))));
}
