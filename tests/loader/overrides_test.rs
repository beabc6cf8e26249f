// tests/loader/overrides_test.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tablegraph::compile::{fields, CompileOptions, Compiler, Operation, Selection, Variables};
use tablegraph::config::Settings;
use tablegraph::graph::*;
use tablegraph::loader::*;
use tablegraph::sql::Dialect;

/// Stands in for introspection: two tables and no foreign keys.
struct Fixture;

#[async_trait]
impl GraphLoader for Fixture {
    fn name(&self) -> &str {
        "fixture"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn load(&self, sink: &mut GraphBuilder) -> LoadResult<()> {
        let mut users = Class::new("users", "users")
            .with_field(Field::column("id", "id", ScalarType::Int).primary())
            .with_field(Field::column("email", "email", ScalarType::Text))
            .with_field(Field::column("full_name", "full_name", ScalarType::Text));
        users.primary_keys = vec!["id".into()];
        sink.insert_class(users);

        let mut posts = Class::new("posts", "posts")
            .with_field(Field::column("id", "id", ScalarType::Int).primary())
            .with_field(Field::column("title", "title", ScalarType::Text))
            .with_field(Field::column("owner", "owner", ScalarType::Int));
        posts.primary_keys = vec!["id".into()];
        sink.insert_class(posts);
        Ok(())
    }
}

async fn build(toml: &str) -> LoadResult<(EntityGraph, LoadReport)> {
    let settings = Settings::parse(toml).unwrap();
    let mut loaders = configured_loaders(&settings)?;
    loaders.push(Box::new(Fixture));
    let env = LoadEnv {
        dialect: Dialect::Postgres,
        has_database: false,
    };
    load_graph(&settings, &loaders, &env).await
}

const BLOG: &str = r#"
[classes.posts.fields.owner]
relation = "users"

[classes.Member]
table = "users"

[classes.Author]
table = "users"
exclude = ["email"]

[classes.users.fields.name]
column = "full_name"
description = "Display name"
"#;

#[tokio::test]
async fn test_static_loader_runs_after_fixture() {
    let (_, report) = build(BLOG).await.unwrap();
    assert_eq!(report.loaded, vec!["fixture".to_string(), "static".to_string()]);
}

#[tokio::test]
async fn test_declared_relation_is_inferred() {
    let (graph, _) = build("[classes.posts.fields.owner]\nrelation = \"users\"")
        .await
        .unwrap();

    let fk = &graph.foreign_keys()[0];
    assert!(fk.declared);
    assert_eq!((fk.column.as_str(), fk.ref_column.as_str()), ("owner", "id"));

    let posts = graph.class("posts").unwrap();
    let relation = graph.relation(posts.field("user").unwrap().relation.unwrap());
    assert_eq!(relation.kind, RelationKind::ManyToOne);
    assert!(graph.class("users").unwrap().field("posts").is_some());
}

#[tokio::test]
async fn test_cheap_alias_and_edited_copy() {
    let (graph, _) = build(BLOG).await.unwrap();

    assert_eq!(graph.class_id("Member"), graph.class_id("users"));

    let author = graph.class("Author").unwrap();
    assert_ne!(graph.class_id("Author"), graph.class_id("users"));
    assert!(author.field("email").is_none());
    assert!(graph.class("users").unwrap().field("email").is_some());
    // The copy still exposes the canonical class's relations.
    assert!(author.field("posts").is_some());
}

#[tokio::test]
async fn test_renamed_field_compiles_to_column() {
    let (graph, _) = build(BLOG).await.unwrap();
    let users = graph.class("users").unwrap();
    assert_eq!(users.field("name").unwrap().description.as_deref(), Some("Display name"));

    let compiler = Compiler::new(Arc::new(graph), CompileOptions::default());
    let op = Operation::query(vec![Selection::new("users")
        .arg("where", json!({"name": {"eq": "Ann"}}))
        .select(fields(&["name"]))]);
    let out = compiler.compile(&op, &Variables::new()).unwrap();
    assert!(out.sql.contains("'name', \"users_2\".\"full_name\""));
    assert!(out.sql.contains("WHERE (\"users_2\".\"full_name\" = $1)"));
}

#[tokio::test]
async fn test_copy_is_queryable_as_root() {
    let (graph, _) = build(BLOG).await.unwrap();
    let compiler = Compiler::new(Arc::new(graph), CompileOptions::default());

    let op = Operation::query(vec![Selection::new("Author").select(fields(&["id", "name"]))]);
    let out = compiler.compile(&op, &Variables::new()).unwrap();
    assert!(out.sql.contains("FROM \"users\" AS \"users_2\""));

    let op = Operation::query(vec![Selection::new("Author").select(fields(&["email"]))]);
    assert!(compiler.compile(&op, &Variables::new()).is_err());
}

#[tokio::test]
async fn test_virtual_class_is_not_a_root() {
    let (graph, _) = build("[classes.Search]\nvirtual = true\n\n[classes.Search.fields.q]\n")
        .await
        .unwrap();
    let search = graph.class("Search").unwrap();
    assert!(search.is_virtual());
    assert!(graph.root("Search").is_none());
}

#[tokio::test]
async fn test_invalid_override_is_reported() {
    let (graph, report) = build("[classes.Ghost]\ntable = \"ghosts\"").await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "static");
    assert!(graph.class("users").is_some());
}

#[tokio::test]
async fn test_required_static_loader_aborts() {
    let toml = "[loaders]\nrequired = [\"static\"]\n\n[classes.Ghost]\ntable = \"ghosts\"";
    let err = build(toml).await.unwrap_err();
    match err {
        LoadError::Required { loader, source } => {
            assert_eq!(loader, "static");
            assert!(matches!(*source, LoadError::InvalidOverride { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
}
