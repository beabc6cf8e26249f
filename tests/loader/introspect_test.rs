// tests/loader/introspect_test.rs
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tablegraph::config::Settings;
use tablegraph::graph::{GraphBuilder, RelationKind, ScalarType};
use tablegraph::loader::*;
use tablegraph::sql::Dialect;

struct MockSource {
    version: u64,
    payload: Result<Value, SourceError>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockSource {
    fn new(version: u64, payload: Value) -> Self {
        Self {
            version,
            payload: Ok(payload),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(version: u64, error: SourceError) -> Self {
        Self {
            version,
            payload: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SchemaSource for MockSource {
    async fn server_version(&self) -> Result<u64, SourceError> {
        Ok(self.version)
    }

    async fn query_json(&self, sql: &str, params: &[Value]) -> Result<Value, SourceError> {
        self.calls.lock().push((sql.to_string(), params.to_vec()));
        self.payload.clone()
    }
}

fn blog_payload() -> Value {
    json!({
        "tables": [
            {"name": "app_users", "description": "Accounts"},
            {"name": "app_blog_posts"},
            {"name": "schema_migrations"}
        ],
        "columns": [
            {"table": "app_users", "name": "id", "type": "integer", "nullable": false,
             "position": 1},
            {"table": "app_users", "name": "password_hash", "type": "text", "position": 3},
            {"table": "app_users", "name": "display_name", "type": "varchar(80)", "position": 2},
            {"table": "app_blog_posts", "name": "id", "type": "bigint", "position": 1},
            {"table": "app_blog_posts", "name": "author_id", "type": "int4", "position": 2},
            {"table": "app_blog_posts", "name": "published_at", "type": "timestamptz",
             "position": 3},
            {"table": "schema_migrations", "name": "version", "type": "text"}
        ],
        "primary_keys": [
            {"table": "app_users", "column": "id"},
            {"table": "app_blog_posts", "column": "id"}
        ],
        "foreign_keys": [
            {"table": "app_blog_posts", "column": "author_id",
             "ref_table": "app_users", "ref_column": "id"}
        ]
    })
}

fn settings(dialect: Dialect) -> Settings {
    let toml = format!(
        r#"
dialect = "{}"
schema = "blog"
exclude_tables = ["schema_migrations"]
exclude_fields = ["app_users.password_hash"]

[naming]
camel_case = true
singularize = true
table_prefixes = ["app_"]
"#,
        dialect
    );
    Settings::parse(&toml).unwrap()
}

fn env(dialect: Dialect) -> LoadEnv {
    LoadEnv {
        dialect,
        has_database: true,
    }
}

#[tokio::test]
async fn test_introspection_builds_named_classes() {
    let settings = settings(Dialect::Postgres);
    let mut loaders = configured_loaders(&settings).unwrap();
    loaders.push(Box::new(IntrospectionLoader::new(
        MockSource::new(POSTGRES_MIN_VERSION, blog_payload()),
        &settings,
    )));

    let (graph, report) = load_graph(&settings, &loaders, &env(Dialect::Postgres))
        .await
        .unwrap();
    assert!(report.loaded.contains(&"introspection".to_string()));

    let user = graph.class("User").unwrap();
    assert_eq!(user.table.as_deref(), Some("app_users"));
    assert_eq!(user.schema.as_deref(), Some("blog"));
    assert_eq!(user.description.as_deref(), Some("Accounts"));
    assert_eq!(user.primary_keys, vec!["id".to_string()]);
    let columns: Vec<&str> = user.column_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(columns, ["id", "displayName"]);

    let post = graph.class("BlogPost").unwrap();
    assert_eq!(post.field("publishedAt").unwrap().scalar, ScalarType::Timestamp);
    assert_eq!(post.field("author_id").unwrap().name, "authorId");

    let author = graph.relation(post.field("user").unwrap().relation.unwrap());
    assert_eq!(author.kind, RelationKind::ManyToOne);
    assert!(graph.class("schema_migrations").is_none());
    assert!(graph.root("blogPosts").is_some());
}

#[tokio::test]
async fn test_schema_is_bound_as_parameter() {
    for (dialect, version, binds) in [
        (Dialect::Postgres, POSTGRES_MIN_VERSION, 1),
        (Dialect::MySql, MYSQL_MIN_VERSION, 4),
    ] {
        let settings = settings(dialect);
        let loader = IntrospectionLoader::new(MockSource::new(version, json!({})), &settings);
        loader.fetch().await.unwrap();

        let calls = loader_calls(&loader);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec![json!("blog"); binds]);
        assert!(!calls[0].0.contains("'blog'"));
    }
}

fn loader_calls(loader: &IntrospectionLoader<MockSource>) -> Vec<(String, Vec<Value>)> {
    loader.source().calls.lock().clone()
}

#[tokio::test]
async fn test_old_server_is_rejected() {
    let settings = settings(Dialect::MySql);
    let loader = IntrospectionLoader::new(MockSource::new(80_013, blog_payload()), &settings);
    let err = loader.fetch().await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::UnsupportedVersion {
            found: 80_013,
            minimum: 80_014,
            ..
        }
    ));
    assert!(loader_calls(&loader).is_empty());
}

#[tokio::test]
async fn test_empty_schema_is_an_error() {
    let settings = settings(Dialect::Postgres);
    let loader = IntrospectionLoader::new(
        MockSource::new(POSTGRES_MIN_VERSION, json!({"tables": null})),
        &settings,
    );
    let mut sink = GraphBuilder::new();
    let err = loader.load(&mut sink).await.unwrap_err();
    assert!(matches!(err, LoadError::NoTables { ref schema } if schema == "blog"));
}

#[tokio::test]
async fn test_source_failure_is_optional_by_default() {
    let settings = settings(Dialect::Postgres);
    let loaders: Vec<Box<dyn GraphLoader>> = vec![Box::new(IntrospectionLoader::new(
        MockSource::failing(POSTGRES_MIN_VERSION, SourceError::Connection("refused".into())),
        &settings,
    ))];

    let (graph, report) = load_graph(&settings, &loaders, &env(Dialect::Postgres))
        .await
        .unwrap();
    assert_eq!(graph.class_count(), 0);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("refused"));
}

#[tokio::test]
async fn test_required_source_failure_aborts() {
    let mut settings = settings(Dialect::Postgres);
    settings.loaders.required = vec!["introspection".into()];
    let loaders: Vec<Box<dyn GraphLoader>> = vec![Box::new(IntrospectionLoader::new(
        MockSource::failing(POSTGRES_MIN_VERSION, SourceError::Query("timeout".into())),
        &settings,
    ))];

    let err = load_graph(&settings, &loaders, &env(Dialect::Postgres))
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Required { ref loader, .. } if loader == "introspection"));
}

#[tokio::test]
async fn test_introspection_skipped_without_database() {
    let settings = settings(Dialect::Postgres);
    let loaders: Vec<Box<dyn GraphLoader>> = vec![Box::new(IntrospectionLoader::new(
        MockSource::new(POSTGRES_MIN_VERSION, blog_payload()),
        &settings,
    ))];
    let offline = LoadEnv {
        dialect: Dialect::Postgres,
        has_database: false,
    };
    let (_, report) = load_graph(&settings, &loaders, &offline).await.unwrap();
    assert_eq!(report.skipped, vec!["introspection".to_string()]);
}
