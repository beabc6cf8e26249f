// tests/compile/filter_test.rs
use std::sync::Arc;

use serde_json::{json, Value};
use tablegraph::compile::*;
use tablegraph::graph::*;
use tablegraph::naming::Namer;
use tablegraph::sql::Dialect;

fn graph() -> Arc<EntityGraph> {
    let mut b = GraphBuilder::new();
    b.insert_class(
        Class::new("users", "users")
            .with_field(Field::column("id", "id", ScalarType::Int).primary())
            .with_field(Field::column("name", "name", ScalarType::Text))
            .with_field(Field::column("meta", "meta", ScalarType::Json))
            .with_field(Field::column("created_at", "created_at", ScalarType::Timestamp))
            .with_field(Field::column("active", "active", ScalarType::Bool)),
    );
    b.insert_class(
        Class::new("posts", "posts")
            .with_field(Field::column("id", "id", ScalarType::Int).primary())
            .with_field(Field::column("title", "title", ScalarType::Text))
            .with_field(Field::column("user_id", "user_id", ScalarType::Int)),
    );
    b.insert_class(
        Class::new("tags", "tags")
            .with_field(Field::column("id", "id", ScalarType::Int).primary())
            .with_field(Field::column("label", "label", ScalarType::Text)),
    );
    b.insert_class(
        Class::new("posts_tags", "posts_tags")
            .with_field(Field::column("post_id", "post_id", ScalarType::Int))
            .with_field(Field::column("tag_id", "tag_id", ScalarType::Int))
            .with_field(Field::column("weight", "weight", ScalarType::Int)),
    );
    b.add_foreign_key(ForeignKey::new("posts", "user_id", "users", "id"));
    b.add_foreign_key(ForeignKey::new("posts_tags", "post_id", "posts", "id"));
    b.add_foreign_key(ForeignKey::new("posts_tags", "tag_id", "tags", "id"));
    Arc::new(b.build(&Namer::default()))
}

fn filter(
    dialect: Dialect,
    root: &str,
    filter: Value,
) -> CompileResult<CompiledStatement> {
    let compiler = Compiler::new(graph(), CompileOptions::default().with_dialect(dialect));
    let op = Operation::query(vec![Selection::new(root)
        .arg("where", filter)
        .select(fields(&["id"]))]);
    compiler.compile(&op, &Variables::new())
}

/// The WHERE clause of the root entity.
fn where_clause(sql: &str) -> &str {
    let start = sql.find(" WHERE ").map(|i| i + 7).unwrap_or(0);
    let end = sql.rfind(" LIMIT 20").unwrap_or(sql.len());
    &sql[start..end]
}

#[test]
fn test_combinators_nest_with_parentheses() {
    let out = filter(
        Dialect::Postgres,
        "users",
        json!({
            "active": {"eq": true},
            "or": [
                {"name": {"like": "A%"}},
                {"and": [{"id": {"gte": 10}}, {"not": {"meta": {"is_null": true}}}]}
            ]
        }),
    )
    .unwrap();
    assert_eq!(
        where_clause(&out.sql),
        "((\"users_2\".\"active\" = $1) AND (((\"users_2\".\"name\" LIKE $2) OR \
         (((\"users_2\".\"id\" >= $3) AND (NOT (\"users_2\".\"meta\" IS NULL)))))))"
    );
    assert_eq!(out.params, vec![json!(true), json!("A%"), json!(10)]);
}

#[test]
fn test_boolean_accepts_single_object() {
    let out = filter(Dialect::Postgres, "users", json!({"_or": {"id": {"eq": 1}}})).unwrap();
    assert_eq!(where_clause(&out.sql), "(((\"users_2\".\"id\" = $1)))");
}

#[test]
fn test_timestamp_range_mysql() {
    let out = filter(
        Dialect::MySql,
        "users",
        json!({"created_at": {"gte": "2024-01-01", "lt": "2025-01-01"}}),
    )
    .unwrap();
    assert_eq!(
        where_clause(&out.sql),
        "((`users_2`.`created_at` >= ?) AND (`users_2`.`created_at` < ?))"
    );
    assert_eq!(out.params, vec![json!("2024-01-01"), json!("2025-01-01")]);
}

#[test]
fn test_one_to_many_filter_uses_exists() {
    let out = filter(
        Dialect::Postgres,
        "users",
        json!({"posts": {"title": {"ilike": "%rust%"}}}),
    )
    .unwrap();
    assert_eq!(
        where_clause(&out.sql),
        "(EXISTS (SELECT 1 FROM \"posts\" AS \"posts_3\" WHERE \"posts_3\".\"user_id\" = \
         \"users_2\".\"id\" AND (\"posts_3\".\"title\" ILIKE $1)))"
    );
}

#[test]
fn test_many_to_many_filter_joins_junction() {
    let out = filter(
        Dialect::Postgres,
        "posts",
        json!({"tags": {"label": {"in": ["rust", "sql"]}, "weight": {"gt": 1}}}),
    )
    .unwrap();
    assert_eq!(
        where_clause(&out.sql),
        "(EXISTS (SELECT 1 FROM \"tags\" AS \"tags_3\" INNER JOIN \"posts_tags\" AS \
         \"__jt_4\" ON \"__jt_4\".\"tag_id\" = \"tags_3\".\"id\" WHERE \
         \"__jt_4\".\"post_id\" = \"posts_2\".\"id\" AND ((\"tags_3\".\"label\" IN ($1, $2)) \
         AND (\"__jt_4\".\"weight\" > $3))))"
    );
    assert_eq!(out.params, vec![json!("rust"), json!("sql"), json!(1)]);
}

#[test]
fn test_nested_relation_filters() {
    let out = filter(
        Dialect::MySql,
        "tags",
        json!({"posts": {"user": {"name": {"eq": "ann"}}}}),
    )
    .unwrap();
    let sql = where_clause(&out.sql);
    assert!(sql.starts_with("(EXISTS (SELECT 1 FROM `posts` AS `posts_3` INNER JOIN"));
    assert!(sql.contains(
        "AND (EXISTS (SELECT 1 FROM `users` AS `users_5` WHERE `users_5`.`id` = \
         `posts_3`.`user_id` AND (`users_5`.`name` = ?))))"
    ));
}

#[test]
fn test_json_key_test() {
    let out = filter(Dialect::Postgres, "users", json!({"meta": {"has_key": "theme"}})).unwrap();
    assert_eq!(where_clause(&out.sql), "(\"users_2\".\"meta\"::jsonb ? $1)");

    let err = filter(Dialect::Postgres, "users", json!({"name": {"has_key": "x"}})).unwrap_err();
    assert_eq!(
        err.kind,
        CompileErrorKind::UnsupportedOperator {
            operator: "has_key".into(),
            scalar: ScalarType::Text
        }
    );
}

#[test]
fn test_json_columns_compare_as_documents() {
    let out = filter(
        Dialect::Postgres,
        "users",
        json!({"meta": {"neq": {"theme": "dark"}, "in": [{"a": 1}]}}),
    )
    .unwrap();
    assert_eq!(
        where_clause(&out.sql),
        "((\"users_2\".\"meta\"::jsonb <> $1::jsonb) AND \
         (\"users_2\".\"meta\"::jsonb IN ($2::jsonb)))"
    );
    assert_eq!(out.params, vec![json!({"theme": "dark"}), json!({"a": 1})]);

    let out = filter(Dialect::MySql, "users", json!({"meta": {"eq": [1, 2]}})).unwrap();
    assert_eq!(
        where_clause(&out.sql),
        "(CAST(`users_2`.`meta` AS JSON) = CAST(? AS JSON))"
    );

    let err = filter(Dialect::Postgres, "users", json!({"meta": {"gt": 1}})).unwrap_err();
    assert!(matches!(err.kind, CompileErrorKind::UnsupportedOperator { .. }));
}

#[test]
fn test_empty_lists() {
    let out = filter(Dialect::Postgres, "users", json!({"id": {"in": []}})).unwrap();
    assert_eq!(where_clause(&out.sql), "(1 = 0)");

    let out = filter(Dialect::Postgres, "users", json!({"id": {"not_in": []}})).unwrap();
    assert_eq!(where_clause(&out.sql), "(1 = 1)");
    assert!(out.params.is_empty());
}

#[test]
fn test_errors_point_at_the_condition() {
    let err = filter(
        Dialect::Postgres,
        "users",
        json!({"or": [{"id": {"eq": 1}}, {"name": {"between": ["a", "b"]}}]}),
    )
    .unwrap_err();
    assert_eq!(err.path, "users.where.or.1.name.between");
    assert_eq!(err.kind, CompileErrorKind::UnknownOperator("between".into()));

    let err = filter(Dialect::Postgres, "users", json!({"active": {"gt": true}})).unwrap_err();
    assert!(matches!(err.kind, CompileErrorKind::UnsupportedOperator { .. }));

    let err = filter(Dialect::Postgres, "users", json!({"id": {"in": [1, "2"]}})).unwrap_err();
    assert_eq!(err.path, "users.where.id.in");

    let err = filter(Dialect::Postgres, "users", json!({"name": {"is_null": "yes"}})).unwrap_err();
    assert!(matches!(err.kind, CompileErrorKind::TypeMismatch { .. }));

    let err = filter(Dialect::Postgres, "users", json!({"name": {"eq": null}})).unwrap_err();
    assert!(matches!(err.kind, CompileErrorKind::InvalidArgument(_)));

    let err = filter(Dialect::Postgres, "users", json!({"or": []})).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::EmptyBoolean("OR"));

    let err = filter(Dialect::Postgres, "posts", json!({"tags": {"post_id": {"eq": 1}}}))
        .unwrap_err();
    assert_eq!(
        err.kind,
        CompileErrorKind::UnknownField {
            field: "post_id".into(),
            parent: "tags".into()
        }
    );
}

#[test]
fn test_empty_where_is_ignored() {
    let out = filter(Dialect::Postgres, "users", json!({})).unwrap();
    assert!(!out.sql.contains("WHERE"));
}

#[test]
fn test_empty_nested_condition_is_true() {
    let out = filter(Dialect::MySql, "users", json!({"and": [{}]})).unwrap();
    assert_eq!(where_clause(&out.sql), "(((1)))");
    let out = filter(Dialect::Postgres, "users", json!({"and": [{}]})).unwrap();
    assert_eq!(where_clause(&out.sql), "(((true)))");
}

#[test]
fn test_values_are_never_inlined() {
    let hostile = "x') OR 1=1 --";
    for dialect in [Dialect::Postgres, Dialect::MySql] {
        let out = filter(dialect, "users", json!({"name": {"eq": hostile}})).unwrap();
        assert!(!out.sql.contains("1=1"));
        assert_eq!(out.params, vec![json!(hostile)]);
    }
}
