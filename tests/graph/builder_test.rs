// tests/graph/builder_test.rs
use tablegraph::config::NamingSettings;
use tablegraph::graph::*;
use tablegraph::naming::Namer;

fn camel_namer() -> Namer {
    Namer::new(&NamingSettings {
        camel_case: true,
        singularize: true,
        ..NamingSettings::default()
    })
}

fn blog_builder() -> GraphBuilder {
    let mut b = GraphBuilder::new();
    b.insert_class(
        Class::new("User", "users")
            .with_field(Field::column("id", "id", ScalarType::Int).primary())
            .with_field(Field::column("fullName", "full_name", ScalarType::Text)),
    );
    b.insert_class(
        Class::new("BlogPost", "blog_posts")
            .with_field(Field::column("id", "id", ScalarType::Int).primary())
            .with_field(Field::column("title", "title", ScalarType::Text))
            .with_field(Field::column("authorId", "author_id", ScalarType::Int)),
    );
    b.add_foreign_key(ForeignKey::new("blog_posts", "author_id", "users", "id"));
    b
}

#[test]
fn test_graph_resolves_names_and_tables() {
    let graph = blog_builder().build(&camel_namer());

    let by_name = graph.class_id("BlogPost").unwrap();
    assert_eq!(graph.class_id("blog_posts"), Some(by_name));
    assert_eq!(graph.class_by_table("blog_posts").unwrap().name, "BlogPost");
    assert_eq!(graph.class_count(), 2);
}

#[test]
fn test_root_fields_follow_naming() {
    let graph = blog_builder().build(&camel_namer());
    let posts = graph.class_id("BlogPost").unwrap();

    assert_eq!(
        graph.root("blogPosts"),
        Some(RootField {
            class: posts,
            list: true
        })
    );
    assert_eq!(
        graph.root("blogPost"),
        Some(RootField {
            class: posts,
            list: false
        })
    );
    assert_eq!(graph.root("BlogPost").map(|r| r.list), Some(true));
}

#[test]
fn test_relation_fields_are_added() {
    let graph = blog_builder().build(&camel_namer());

    let post = graph.class("BlogPost").unwrap();
    let user_field = post.field("user").unwrap();
    assert!(user_field.is_virtual);
    let forward = graph.relation(user_field.relation.unwrap());
    assert_eq!(forward.kind, RelationKind::ManyToOne);
    assert!(!forward.is_list());

    let user = graph.class("User").unwrap();
    let back = graph.relation(user.field("blogPosts").unwrap().relation.unwrap());
    assert_eq!(back.kind, RelationKind::OneToMany);
    assert!(back.is_list());
    assert_eq!(graph.field(back.target).column, "author_id");
}

#[test]
fn test_loaded_fields_are_untouched() {
    let graph = blog_builder().build(&camel_namer());
    let user = graph.class("User").unwrap();
    let names: Vec<&str> = user.column_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["id", "fullName"]);
    assert_eq!(user.field("full_name").unwrap().name, "fullName");
}

#[test]
fn test_aliases_resolve_to_the_same_record() {
    let mut b = blog_builder();
    let user = b.class_id("User").unwrap();
    b.alias("Author", user, false).unwrap();
    let graph = b.build(&camel_namer());

    assert_eq!(graph.class_id("Author"), graph.class_id("User"));
    assert_eq!(graph.root("Author").map(|r| r.list), Some(true));
}

#[test]
fn test_each_build_gets_a_newer_version() {
    let first = blog_builder().build(&Namer::default());
    let second = blog_builder().build(&Namer::default());
    assert!(second.version() > first.version());
}

#[test]
fn test_empty_builder_builds_empty_graph() {
    let b = GraphBuilder::new();
    assert!(b.is_empty());
    let graph = b.build(&Namer::default());
    assert_eq!(graph.class_count(), 0);
    assert_eq!(graph.roots().count(), 0);
}
