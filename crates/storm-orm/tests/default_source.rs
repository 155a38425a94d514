//! The process-wide default source. Kept in its own test binary because it
//! can be set only once per process.

use std::sync::Arc;

use storm_orm::{
    default_source, fields, set_default_source, BackendKind, ConnectionParams, ConnectionPool,
    Entity, MemoryStore, OrmError, PoolSettings, Record, Source, Value,
};

#[derive(Debug, Default, Entity)]
#[entity(table = "events")]
struct Event {
    record: Record,
}

#[tokio::test]
async fn test_default_source_is_set_once_and_used_by_objects() {
    let pool = ConnectionPool::builder(PoolSettings::new(ConnectionParams::new("app")).count(2))
        .backend(BackendKind::Document(Arc::new(MemoryStore::new())))
        .build()
        .unwrap();
    set_default_source(pool).unwrap();
    assert!(matches!(default_source(), Some(Source::Pool(_))));

    let again = ConnectionPool::builder(PoolSettings::default())
        .backend(BackendKind::Relational)
        .build()
        .unwrap();
    let err = set_default_source(again).unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)));

    let mut event = Event::default();
    event.set("kind", "signup");
    Event::objects().save(&mut event).await.unwrap();

    let found = Event::objects()
        .find(fields! { "kind" => "signup" })
        .await
        .unwrap();
    assert_eq!(found.get("_id"), event.get("_id"));
    assert_eq!(found.get("kind"), Some(&Value::Text("signup".into())));
}
