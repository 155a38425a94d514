//! Tests for `#[derive(Entity)]`.

use storm_orm::{Entity, EntityHooks, EntityState, PrimaryKey, Record, Result, Value};

#[derive(Debug, Default, Entity)]
struct Article {
    record: Record,
}

#[derive(Debug, Default, Entity)]
#[entity(
    table = "blog_posts",
    primary_key = "id",
    json_fields("tags", "meta"),
    modified = "modified_on"
)]
struct Post {
    record: Record,
    loaded: bool,
}

#[derive(Debug, Default, Entity)]
#[entity(primary_key("org", "user"), hooks)]
struct Membership {
    data: storm_orm::Record,
    loads: usize,
}

#[derive(Debug, Default, Entity)]
#[entity(table = "countries", primary_key("code"))]
struct Country {
    record: Record,
}

impl EntityHooks for Membership {
    async fn after_load(&mut self) -> Result<()> {
        self.loads += 1;
        Ok(())
    }
}

#[test]
fn test_defaults() {
    assert_eq!(Article::TYPE_NAME, "Article");
    assert_eq!(Article::table(), "article");
    assert_eq!(Article::primary_key(), PrimaryKey::simple("_id"));
    assert!(Article::json_fields().is_empty());
    assert_eq!(Article::modified_field(), None);
}

#[test]
fn test_attributes() {
    assert_eq!(Post::table(), "blog_posts");
    assert_eq!(Post::primary_key(), PrimaryKey::simple("id"));
    assert_eq!(Post::json_fields(), ["tags", "meta"]);
    assert_eq!(Post::modified_field(), Some("modified_on"));
}

#[test]
fn test_compound_key() {
    assert_eq!(
        Membership::primary_key(),
        PrimaryKey::compound(["org", "user"])
    );
    assert_eq!(Membership::table(), "membership");
}

#[test]
fn test_single_key_list_is_simple_key() {
    assert_eq!(Country::primary_key(), PrimaryKey::simple("code"));
}

#[test]
fn test_from_record_fills_other_fields_with_defaults() {
    let mut record = Record::new();
    record.set_field("title", "hello");
    let post = Post::from_record(record);
    assert!(!post.loaded);
    assert_eq!(post.get("title"), Some(&Value::Text("hello".into())));
}

#[test]
fn test_set_goes_through_change_log() {
    let mut post = Post::default();
    assert!(post.set("title", "a"));
    assert!(!post.set("title", "a"));
    assert_eq!(post.record().changes(), ["title"]);
    assert_eq!(post.state(), EntityState::Transient);
}

#[tokio::test]
async fn test_custom_hooks_are_used() {
    let mut m = Membership::default();
    m.after_load().await.unwrap();
    assert_eq!(m.loads, 1);

    m.set("org", "acme");
    assert_eq!(m.record_mut().changes(), ["org"]);
}
