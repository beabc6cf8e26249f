// tests/compile/query_test.rs
use std::sync::Arc;

use insta::assert_snapshot;
use serde_json::json;
use tablegraph::compile::*;
use tablegraph::graph::*;
use tablegraph::naming::Namer;
use tablegraph::sql::Dialect;

fn blog() -> Arc<EntityGraph> {
    let mut b = GraphBuilder::new();
    let mut add = |name: &str, columns: &[(&str, ScalarType)], pks: &[&str]| {
        let mut class = Class::new(name, name).with_schema("public");
        for (column, scalar) in columns {
            let mut field = Field::column(*column, *column, *scalar);
            if pks.contains(column) {
                field = field.primary();
            }
            class.insert_field(field);
        }
        class.primary_keys = pks.iter().map(|p| p.to_string()).collect();
        b.insert_class(class);
    };
    add(
        "users",
        &[("id", ScalarType::Int), ("name", ScalarType::Text), ("email", ScalarType::Text)],
        &["id"],
    );
    add(
        "posts",
        &[
            ("id", ScalarType::Int),
            ("title", ScalarType::Text),
            ("user_id", ScalarType::Int),
            ("published", ScalarType::Bool),
        ],
        &["id"],
    );
    add("tags", &[("id", ScalarType::Int), ("label", ScalarType::Text)], &["id"]);
    add(
        "post_tags",
        &[("post_id", ScalarType::Int), ("tag_id", ScalarType::Int)],
        &["post_id", "tag_id"],
    );
    b.add_foreign_key(ForeignKey::new("posts", "user_id", "users", "id"));
    b.add_foreign_key(ForeignKey::new("post_tags", "post_id", "posts", "id"));
    b.add_foreign_key(ForeignKey::new("post_tags", "tag_id", "tags", "id"));
    Arc::new(b.build(&Namer::default()))
}

fn compiler(dialect: Dialect) -> Compiler {
    Compiler::new(blog(), CompileOptions::default().with_dialect(dialect))
}

fn compile(dialect: Dialect, op: &Operation) -> CompiledStatement {
    compiler(dialect).compile(op, &Variables::new()).unwrap()
}

#[test]
fn test_filtered_sorted_page() {
    let op = Operation::query(vec![Selection::new("users")
        .arg("where", json!({"name": {"ilike": "a%"}}))
        .arg("order_by", json!({"name": "asc"}))
        .arg("limit", json!(5))
        .arg("offset", json!(10))
        .select(fields(&["id", "name"]))]);
    let out = compile(Dialect::Postgres, &op);
    assert_snapshot!(out.sql, @r#"SELECT json_build_object('users', (SELECT coalesce(json_agg("__sr_1"."json"), '[]'::json) AS "json" FROM (SELECT json_build_object('id', "users_2"."id", 'name', "users_2"."name") AS "json" FROM "public"."users" AS "users_2" WHERE ("users_2"."name" ILIKE $1) ORDER BY "users_2"."name" ASC LIMIT 5 OFFSET 10) AS "__sr_1")) AS "__root""#);
    assert_eq!(out.params, vec![json!("a%")]);
}

#[test]
fn test_filtered_sorted_page_mysql() {
    let op = Operation::query(vec![Selection::new("users")
        .arg("where", json!({"name": {"like": "a%"}}))
        .arg("order_by", json!({"name": "asc"}))
        .arg("limit", json!(5))
        .arg("offset", json!(10))
        .select(fields(&["id"]))]);
    let out = compile(Dialect::MySql, &op);
    assert_snapshot!(out.sql, @"SELECT JSON_OBJECT('users', (SELECT coalesce(JSON_ARRAYAGG(`__sr_1`.`json`), JSON_ARRAY()) AS `json` FROM (SELECT JSON_OBJECT('id', `users_2`.`id`) AS `json` FROM `public`.`users` AS `users_2` WHERE (`users_2`.`name` LIKE ?) ORDER BY `users_2`.`name` ASC LIMIT 10, 5) AS `__sr_1`)) AS `__root`");
}

#[test]
fn test_many_to_many_lateral() {
    let op = Operation::query(vec![Selection::new("posts").select(vec![
        Selection::new("title"),
        Selection::new("tags").select(fields(&["label"])),
    ])]);
    let out = compile(Dialect::Postgres, &op);
    assert!(out.sql.contains(
        "FROM \"public\".\"posts\" AS \"posts_2\" LEFT OUTER JOIN LATERAL (SELECT \
         coalesce(json_agg(\"__sr_4\".\"json\"), '[]'::json) AS \"json\" FROM (SELECT \
         json_build_object('label', \"tags_5\".\"label\") AS \"json\" FROM \"public\".\"tags\" \
         AS \"tags_5\" INNER JOIN \"public\".\"post_tags\" AS \"__jt_6\" ON \
         \"__jt_6\".\"tag_id\" = \"tags_5\".\"id\" WHERE \"__jt_6\".\"post_id\" = \
         \"posts_2\".\"id\" LIMIT 20) AS \"__sr_4\") AS \"__sj_3\" ON true"
    ));
}

#[test]
fn test_many_to_many_correlated_mysql() {
    let op = Operation::query(vec![Selection::new("posts").select(vec![
        Selection::new("tags").select(fields(&["label"])),
    ])]);
    let out = compile(Dialect::MySql, &op);
    assert!(out.sql.contains(
        "'tags', (SELECT coalesce(JSON_ARRAYAGG(`__sr_3`.`json`), JSON_ARRAY()) AS `json` \
         FROM (SELECT JSON_OBJECT('label', `tags_4`.`label`) AS `json` FROM `public`.`tags` \
         AS `tags_4` INNER JOIN `public`.`post_tags` AS `__jt_5` ON `__jt_5`.`tag_id` = \
         `tags_4`.`id` WHERE `__jt_5`.`post_id` = `posts_2`.`id` LIMIT 20) AS `__sr_3`)"
    ));
}

#[test]
fn test_aliased_roots_bind_in_text_order() {
    let op = Operation::query(vec![
        Selection::new("users")
            .alias("first")
            .arg("where", json!({"id": {"eq": 1}}))
            .select(fields(&["name"])),
        Selection::new("users")
            .alias("second")
            .arg("where", json!({"id": {"in": [2, 3]}}))
            .select(vec![Selection::new("name").alias("label")]),
    ]);

    for dialect in [Dialect::Postgres, Dialect::MySql] {
        let out = compile(dialect, &op);
        assert_eq!(out.params, vec![json!(1), json!(2), json!(3)]);
        assert!(out.sql.contains("'first', (SELECT"));
        assert!(out.sql.contains("'second', (SELECT"));
        assert!(out.sql.contains("'label', "));
    }
    let out = compile(Dialect::Postgres, &op);
    assert!(out.sql.contains("IN ($2, $3)"));
}

#[test]
fn test_variables_are_resolved() {
    let op = Operation::query(vec![Selection::new("posts")
        .arg("where", json!({"title": {"eq": {"$var": "title"}}}))
        .arg("limit", InputValue::var("n"))
        .select(fields(&["id"]))]);
    let mut vars = Variables::new();
    vars.insert("title".into(), json!("Hello"));
    vars.insert("n".into(), json!(3));

    let out = compiler(Dialect::Postgres).compile(&op, &vars).unwrap();
    assert_eq!(out.params, vec![json!("Hello")]);
    assert!(out.sql.contains("LIMIT 3)"));

    vars.remove("n");
    let err = compiler(Dialect::Postgres).compile(&op, &vars).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnknownVariable("n".into()));
    assert_eq!(err.path, "posts.limit");
}

#[test]
fn test_operation_from_json() {
    let op = Operation::from_json(
        r#"{
            "name": "RecentPosts",
            "selections": [{
                "name": "posts",
                "arguments": {"where": {"published": {"eq": true}}, "order_by": {"id": "desc"}},
                "selections": [
                    {"name": "title"},
                    {"name": "user", "selections": [{"name": "name"}]}
                ]
            }]
        }"#,
    )
    .unwrap();
    let out = compile(Dialect::Postgres, &op);
    assert_eq!(out.params, vec![json!(true)]);
    assert!(out.sql.contains("ORDER BY \"posts_2\".\"id\" DESC LIMIT 20"));
    assert!(out.sql.contains("'user', \"__sj_3\".\"json\""));
}

#[test]
fn test_singular_root_with_nested_object() {
    let op = Operation::query(vec![Selection::new("post")
        .arg("where", json!({"title": {"eq": "Hi"}}))
        .select(vec![
            Selection::new("title"),
            Selection::new("user").select(fields(&["email"])),
        ])]);
    let out = compile(Dialect::Postgres, &op);
    assert!(out.sql.starts_with("SELECT json_build_object('post', (SELECT \"__sr_1\".\"json\""));
    assert!(out.sql.contains("WHERE (\"posts_2\".\"title\" = $1) LIMIT 1) AS \"__sr_1\""));
    assert!(out.sql.contains("WHERE \"users_5\".\"id\" = \"posts_2\".\"user_id\" LIMIT 1)"));
}

#[test]
fn test_object_root_rejects_list_arguments() {
    let op = Operation::query(vec![Selection::new("post")
        .arg("limit", json!(2))
        .select(fields(&["id"]))]);
    let err = compiler(Dialect::Postgres).compile(&op, &Variables::new()).unwrap_err();
    assert_eq!(err.path, "post.limit");
    assert!(matches!(err.kind, CompileErrorKind::InvalidArgument(_)));
}

#[test]
fn test_default_limit_can_be_disabled() {
    let compiler = Compiler::new(
        blog(),
        CompileOptions {
            default_limit: 0,
            ..CompileOptions::default()
        },
    );
    let op = Operation::query(vec![Selection::new("tags").select(fields(&["label"]))]);
    let out = compiler.compile(&op, &Variables::new()).unwrap();
    assert!(!out.sql.contains("LIMIT"));
}

#[test]
fn test_selection_errors_carry_paths() {
    let compiler = compiler(Dialect::Postgres);

    let op = Operation::query(vec![Selection::new("users").select(fields(&["id", "age"]))]);
    let err = compiler.compile(&op, &Variables::new()).unwrap_err();
    assert_eq!(err.path, "users.age");
    assert_eq!(
        err.kind,
        CompileErrorKind::UnknownField {
            field: "age".into(),
            parent: "users".into()
        }
    );

    let op = Operation::query(vec![Selection::new("users").select(vec![
        Selection::new("name").arg("limit", json!(1)),
    ])]);
    let err = compiler.compile(&op, &Variables::new()).unwrap_err();
    assert_eq!(err.path, "users.name");

    let op = Operation::query(vec![Selection::new("post_tag").select(fields(&["tag_id"]))]);
    let err = compiler.compile(&op, &Variables::new()).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnknownType("post_tag".into()));

    let op = Operation::query(vec![Selection::new("posts").select(vec![
        Selection::new("user").arg("where", json!({})).select(fields(&["id"])),
    ])]);
    let err = compiler.compile(&op, &Variables::new()).unwrap_err();
    assert_eq!(err.path, "posts.user.where");
}

#[test]
fn test_junction_queried_by_table_name() {
    let op = Operation::query(vec![Selection::new("post_tags")
        .arg("where", json!({"tag_id": {"eq": 3}}))
        .select(vec![
            Selection::new("post_id"),
            Selection::new("post").select(fields(&["title"])),
        ])]);
    let out = compile(Dialect::MySql, &op);
    assert!(out.sql.starts_with(
        "SELECT JSON_OBJECT('post_tags', (SELECT coalesce(JSON_ARRAYAGG(`__sr_1`.`json`), \
         JSON_ARRAY()) AS `json` FROM (SELECT JSON_OBJECT('post_id', `post_tags_2`.`post_id`, \
         'post', (SELECT `__sr_3`.`json` AS `json` FROM (SELECT JSON_OBJECT('title', \
         `posts_4`.`title`) AS `json` FROM `public`.`posts` AS `posts_4` WHERE \
         `posts_4`.`id` = `post_tags_2`.`post_id` LIMIT 1) AS `__sr_3`)) AS `json` FROM \
         `public`.`post_tags` AS `post_tags_2` WHERE (`post_tags_2`.`tag_id` = ?) LIMIT 20)"
    ));
    assert_eq!(out.params, vec![json!(3)]);
}

#[test]
fn test_compiler_from_settings() {
    let settings = tablegraph::config::Settings::parse("dialect = \"mysql\"\ndefault_limit = 7")
        .unwrap();
    let compiler = Compiler::new(blog(), CompileOptions::from_settings(&settings));
    let op = Operation::query(vec![Selection::new("tags").select(fields(&["id"]))]);
    let out = compiler.compile(&op, &Variables::new()).unwrap();
    assert!(out.sql.starts_with("SELECT JSON_OBJECT("));
    assert!(out.sql.contains("LIMIT 7"));
}
