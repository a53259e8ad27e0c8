mod common;

use common::{context, insert, pairs_context};
use genealogy_records::{Caller, Record, RecordError, Value};

#[tokio::test]
async fn test_saved_record_round_trips() {
    let ctx = context(Caller::editor("jcobban"));

    let mut source = Record::new(&ctx, "Sources").unwrap();
    source.set("srcname", "1881 Census of Canada").unwrap();
    source.set("idst", 3).unwrap();
    source.set("srcnote", "Library and Archives Canada").unwrap();
    assert_eq!(source.save().await.unwrap(), 1);
    let key = source.key().unwrap();

    let loaded = Record::load(&ctx, "Sources", key).await.unwrap();
    assert!(loaded.exists());
    let saved: Vec<_> = source.fields().collect();
    let reloaded: Vec<_> = loaded.fields().collect();
    assert_eq!(saved, reloaded);
}

#[tokio::test]
async fn test_set_save_load_get_per_type() {
    let ctx = context(Caller::editor("jcobban"));
    let mut location = Record::new(&ctx, "Locations").unwrap();
    location.save().await.unwrap();
    let key = location.key().unwrap();

    let cases = [
        ("zoom", Value::Integer(14)),
        ("location", Value::from("Lot 5 Con 2, Caradoc")),
        ("verified", Value::Boolean(true)),
        ("latitude", Value::Float(42.9)),
    ];
    for (field, value) in cases {
        let mut record = Record::load(&ctx, "Locations", key).await.unwrap();
        record.set(field, value.clone()).unwrap();
        assert_eq!(record.save().await.unwrap(), 1);

        let reloaded = Record::load(&ctx, "Locations", key).await.unwrap();
        assert_eq!(reloaded.get(field).unwrap(), &value, "field {}", field);
    }
}

#[tokio::test]
async fn test_flag_fields_coerce_truthy_input() {
    let ctx = context(Caller::editor("jcobban"));
    let mut location = Record::new(&ctx, "Locations").unwrap();
    location.set("used", "Y").unwrap();
    location.set("verified", 0).unwrap();
    assert_eq!(location.get("used").unwrap(), &Value::Boolean(true));
    assert_eq!(location.get("verified").unwrap(), &Value::Boolean(false));
    assert_eq!(location.get("used").unwrap().to_string(), "1");
}

#[tokio::test]
async fn test_numeric_field_rejects_text_and_stays_clean() {
    let ctx = context(Caller::editor("jcobban"));
    let mut location = Record::new(&ctx, "Locations").unwrap();

    let err = location.set("latitude", "abc").unwrap_err();
    assert!(matches!(err, RecordError::TypeMismatch(_)));
    assert!(!location.is_dirty());
    assert_eq!(location.get("latitude").unwrap(), &Value::Float(0.0));

    assert!(matches!(location.set("zoom", "12b").unwrap_err(), RecordError::TypeMismatch(_)));
    assert!(location.dirty_fields().is_empty());
}

#[tokio::test]
async fn test_unknown_field_and_entity() {
    let ctx = context(Caller::editor("jcobban"));
    let mut location = Record::new(&ctx, "Locations").unwrap();
    assert!(matches!(location.get("colour").unwrap_err(), RecordError::UnknownField(..)));
    assert!(matches!(location.set("colour", 1).unwrap_err(), RecordError::UnknownField(..)));
    assert!(matches!(Record::new(&ctx, "Censuses").unwrap_err(), RecordError::UnknownEntity(_)));
    assert!(Record::new(&ctx, "tblLR").is_ok());
}

#[tokio::test]
async fn test_load_missing_row_is_not_an_error() {
    let ctx = context(Caller::anonymous());
    let record = Record::load(&ctx, "Locations", 999).await.unwrap();
    assert!(!record.exists());
    assert_eq!(record.get("location").unwrap(), &Value::from(""));
    assert!(matches!(
        Record::load_str(&ctx, "Locations", "abc").await.unwrap_err(),
        RecordError::MalformedKey(_)
    ));
}

#[tokio::test]
async fn test_clean_save_is_a_no_op() {
    let ctx = context(Caller::editor("jcobban"));
    let key = insert(&ctx, "Temples", &[("code", Value::from("ABERD"))]).await;
    let mut temple = Record::load(&ctx, "Temples", key).await.unwrap();
    assert_eq!(temple.save().await.unwrap(), 0);

    temple.set("code", "ABERD").unwrap();
    assert!(!temple.is_dirty());
    assert_eq!(temple.save().await.unwrap(), 0);

    temple.set("temple", "Aberdeen, Scotland").unwrap();
    assert_eq!(temple.dirty_fields(), vec!["temple"]);
    assert_eq!(temple.save().await.unwrap(), 1);
    assert!(!temple.is_dirty());

    temple.set("used", 1).unwrap();
    assert_eq!(temple.save().await.unwrap(), 1);
    temple.set("used", "yes").unwrap();
    assert!(!temple.is_dirty());
}

#[tokio::test]
async fn test_largest_key_is_refused_not_panicking() {
    let ctx = context(Caller::editor("jcobban"));
    let mut temple = Record::load(&ctx, "Temples", i64::MAX).await.unwrap();
    temple.set("code", "X").unwrap();
    assert!(matches!(temple.save().await.unwrap_err(), RecordError::StorageError(_)));
    assert!(!temple.exists());

    let mut parsed = Record::load_str(&ctx, "Temples", "9223372036854775807").await.unwrap();
    parsed.set("code", "Y").unwrap();
    assert!(parsed.save().await.is_err());
}

#[tokio::test]
async fn test_natural_key_lowest_key_wins() {
    let ctx = context(Caller::editor("jcobban"));
    insert(&ctx, "Temples", &[("code", Value::from("LONDO")), ("temple", Value::from("First"))]).await;
    insert(&ctx, "Temples", &[("code", Value::from("LONDO")), ("temple", Value::from("Second"))]).await;

    let temple = Record::load_by_natural_key(&ctx, "Temples", "code", "LONDO").await.unwrap();
    assert!(temple.exists());
    assert_eq!(temple.key(), Some(1));
    assert_eq!(temple.get("temple").unwrap(), &Value::from("First"));

    let mut missing = Record::load_by_natural_key(&ctx, "Temples", "code", "PARIS").await.unwrap();
    assert!(!missing.exists());
    assert_eq!(missing.get("code").unwrap(), &Value::from("PARIS"));
    assert!(missing.is_dirty());
    missing.save().await.unwrap();
    assert_eq!(missing.key(), Some(3));
}

#[tokio::test]
async fn test_deleted_record_refuses_save() {
    let ctx = context(Caller::editor("jcobban"));
    let mut temple = Record::new(&ctx, "Temples").unwrap();
    temple.set("code", "ACCRA").unwrap();
    temple.save().await.unwrap();

    let report = temple.delete(Default::default()).await.unwrap();
    assert_eq!(report.rows, 1);
    assert!(!temple.exists());
    assert!(matches!(temple.save().await.unwrap_err(), RecordError::RecordDeleted(..)));
    assert!(matches!(temple.set("code", "X").unwrap_err(), RecordError::RecordDeleted(..)));
}

#[tokio::test]
async fn test_versioned_save_detects_conflict() {
    let ctx = pairs_context(Caller::editor("jcobban"));
    let key = insert(&ctx, "Pairs", &[("a", Value::Integer(1))]).await;

    let mut first = Record::load(&ctx, "Pairs", key).await.unwrap();
    let mut second = Record::load(&ctx, "Pairs", key).await.unwrap();
    assert_eq!(first.get("version").unwrap(), &Value::Integer(1));

    first.set("label", "first").unwrap();
    assert_eq!(first.save().await.unwrap(), 1);
    assert_eq!(first.get("version").unwrap(), &Value::Integer(2));

    second.set("label", "second").unwrap();
    let err = second.save().await.unwrap_err();
    assert!(matches!(err, RecordError::Conflict(ref entity, k) if entity == "Pairs" && k == key));
    assert!(err.is_recoverable());
    assert!(second.is_dirty());

    let current = Record::load(&ctx, "Pairs", key).await.unwrap();
    assert_eq!(current.get("label").unwrap(), &Value::from("first"));
}

#[tokio::test]
async fn test_update_of_vanished_row() {
    let ctx = context(Caller::editor("jcobban"));
    let key = insert(&ctx, "Temples", &[("code", Value::from("BOGOT"))]).await;
    let mut stale = Record::load(&ctx, "Temples", key).await.unwrap();

    let mut other = Record::load(&ctx, "Temples", key).await.unwrap();
    other.delete(Default::default()).await.unwrap();

    stale.set("temple", "Bogota, Colombia").unwrap();
    assert!(matches!(stale.save().await.unwrap_err(), RecordError::RecordDeleted(..)));
    assert!(!stale.exists());
}
