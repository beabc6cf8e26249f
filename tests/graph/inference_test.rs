// tests/graph/inference_test.rs
use tablegraph::graph::*;
use tablegraph::naming::Namer;

fn table(name: &str, columns: &[(&str, ScalarType)], pks: &[&str]) -> Class {
    let mut class = Class::new(name, name);
    for (column, scalar) in columns {
        let mut field = Field::column(*column, *column, *scalar);
        if pks.contains(column) {
            field = field.primary();
        }
        class.insert_field(field);
    }
    class.primary_keys = pks.iter().map(|p| p.to_string()).collect();
    class
}

fn relation_of<'g>(graph: &'g EntityGraph, class: &str, field: &str) -> &'g Relation {
    let field = graph.class(class).unwrap().field(field).unwrap();
    graph.relation(field.relation.unwrap())
}

fn tagged_users() -> EntityGraph {
    let mut b = GraphBuilder::new();
    b.insert_class(table("users", &[("id", ScalarType::Int)], &["id"]));
    b.insert_class(table("tags", &[("id", ScalarType::Int)], &["id"]));
    b.insert_class(table(
        "user_tags",
        &[("user_id", ScalarType::Int), ("tag_id", ScalarType::Int)],
        &["user_id", "tag_id"],
    ));
    b.add_foreign_key(ForeignKey::new("user_tags", "user_id", "users", "id"));
    b.add_foreign_key(ForeignKey::new("user_tags", "tag_id", "tags", "id"));
    b.build(&Namer::default())
}

#[test]
fn test_composite_key_junction_becomes_many_to_many() {
    let graph = tagged_users();

    let tags = relation_of(&graph, "users", "tags");
    assert_eq!(tags.kind, RelationKind::ManyToMany);
    assert!(tags.is_list());
    let through = tags.through.as_ref().unwrap();
    assert_eq!(through.table, "user_tags");
    assert_eq!(through.source_key, "user_id");
    assert_eq!(through.target_key, "tag_id");
    assert!(through.extra_fields.is_empty());

    let users = relation_of(&graph, "tags", "users");
    assert_eq!(users.kind, RelationKind::ManyToMany);
    assert_eq!(users.through.as_ref().unwrap().source_key, "tag_id");
}

#[test]
fn test_junction_is_hidden_from_roots() {
    let graph = tagged_users();
    assert!(graph.class("user_tags").unwrap().is_through());
    assert!(graph.root("user_tags").is_none());
    assert!(graph.root("users").is_some());
}

#[test]
fn test_many_to_many_reverse_links() {
    let graph = tagged_users();
    let forward_id = graph
        .class("users")
        .unwrap()
        .field("tags")
        .unwrap()
        .relation
        .unwrap();
    let forward = graph.relation(forward_id);
    let back = graph.relation(forward.reverse.unwrap());
    assert_eq!(back.reverse, Some(forward_id));
    assert_eq!(back.source.class, forward.target.class);
}

#[test]
fn test_self_reference_yields_list_fields() {
    let mut b = GraphBuilder::new();
    b.insert_class(table(
        "categories",
        &[
            ("id", ScalarType::Int),
            ("name", ScalarType::Text),
            ("parent_id", ScalarType::Int),
        ],
        &["id"],
    ));
    b.add_foreign_key(ForeignKey::new("categories", "parent_id", "categories", "id"));
    let graph = b.build(&Namer::default());

    let parent = relation_of(&graph, "categories", "parent");
    assert_eq!(parent.kind, RelationKind::Recursive);
    assert_eq!(parent.recursion, Some(Recursion::Ancestors));
    assert!(parent.is_list());
    assert_eq!(graph.field(parent.source).column, "parent_id");

    let children = relation_of(&graph, "categories", "children");
    assert_eq!(children.recursion, Some(Recursion::Descendants));
    assert!(children.is_list());
    assert_eq!(graph.field(children.source).column, "id");
    assert_eq!(graph.field(children.target).column, "parent_id");
}

#[test]
fn test_unresolvable_foreign_keys_add_nothing() {
    let mut b = GraphBuilder::new();
    b.insert_class(table(
        "posts",
        &[("id", ScalarType::Int), ("user_id", ScalarType::Int)],
        &["id"],
    ));
    b.add_foreign_key(ForeignKey::new("posts", "user_id", "users", "id"));
    b.add_foreign_key(ForeignKey::new("posts", "editor_id", "posts", "id"));
    let graph = b.build(&Namer::default());

    assert_eq!(graph.relations().count(), 0);
    assert_eq!(graph.class("posts").unwrap().field_count(), 2);
}

#[test]
fn test_foreign_key_facts_are_kept() {
    let graph = tagged_users();
    assert_eq!(graph.foreign_keys().len(), 2);
    assert!(graph
        .foreign_keys()
        .iter()
        .all(|fk| fk.table == "user_tags" && !fk.declared));
}
