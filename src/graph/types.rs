//! Type definitions for the entity graph.
//!
//! Classes, fields and relations live in arenas owned by
//! [`EntityGraph`](super::EntityGraph) and refer to each other through
//! copyable index handles, so a class reachable under several names is one
//! record, and a relation and its reverse can point at each other.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Handles
// ============================================================================

/// Index of a [`Class`] in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) usize);

/// Index of a [`Field`] within its owning [`Class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) usize);

/// Index of a [`Relation`] in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub(crate) usize);

impl ClassId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl FieldId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl RelationId {
    pub fn index(self) -> usize {
        self.0
    }
}

// ============================================================================
// Supporting Enums
// ============================================================================

/// Scalar type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int,
    Float,
    Text,
    Bool,
    Date,
    Timestamp,
    Json,
    Uuid,
    #[default]
    Unknown,
}

impl ScalarType {
    /// Classify a database type name (`integer`, `varchar(255)`, `jsonb`, `tinyint(1)`).
    pub fn from_sql(type_name: &str) -> Self {
        let lower = type_name.trim().to_lowercase();
        if lower == "tinyint(1)" {
            return ScalarType::Bool;
        }
        if lower.ends_with("[]") || lower == "array" {
            return ScalarType::Json;
        }

        let base = lower.split('(').next().unwrap_or_default().trim();
        let base = base.strip_suffix(" unsigned").unwrap_or(base);

        match base {
            "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8" | "serial"
            | "serial4" | "bigserial" | "serial8" | "smallserial" | "tinyint" | "mediumint" => {
                ScalarType::Int
            }
            "real" | "float4" | "double precision" | "float8" | "numeric" | "decimal"
            | "float" | "double" | "money" => ScalarType::Float,
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "citext" | "name" | "tinytext" | "mediumtext" | "longtext" | "enum" | "set" => {
                ScalarType::Text
            }
            "boolean" | "bool" => ScalarType::Bool,
            "date" => ScalarType::Date,
            "timestamp"
            | "timestamptz"
            | "timestamp with time zone"
            | "timestamp without time zone"
            | "datetime"
            | "time"
            | "timetz"
            | "time with time zone"
            | "time without time zone" => ScalarType::Timestamp,
            "json" | "jsonb" => ScalarType::Json,
            "uuid" => ScalarType::Uuid,
            _ => ScalarType::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Text => "text",
            ScalarType::Bool => "bool",
            ScalarType::Date => "date",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Json => "json",
            ScalarType::Uuid => "uuid",
            ScalarType::Unknown => "unknown",
        }
    }

    /// Whether a client literal can be bound against a column of this type.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (_, Value::Null) => true,
            (ScalarType::Json | ScalarType::Unknown, _) => true,
            (ScalarType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ScalarType::Float, Value::Number(_)) => true,
            (ScalarType::Bool, Value::Bool(_)) => true,
            (
                ScalarType::Text | ScalarType::Date | ScalarType::Timestamp | ScalarType::Uuid,
                Value::String(_),
            ) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a class stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    /// Backed by a physical table.
    #[default]
    Table,
    /// No physical table (synthetic root types).
    Virtual,
    /// Junction table of a many-to-many relation; hidden from the root.
    Through,
}

/// Kind of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ManyToOne,
    OneToMany,
    ManyToMany,
    Recursive,
}

impl RelationKind {
    /// Whether the relation field yields a JSON array.
    pub fn is_list(&self, recursion: Option<Recursion>) -> bool {
        match self {
            RelationKind::ManyToOne => false,
            RelationKind::OneToMany | RelationKind::ManyToMany => true,
            RelationKind::Recursive => recursion.is_some(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelationKind::ManyToOne => "many_to_one",
            RelationKind::OneToMany => "one_to_many",
            RelationKind::ManyToMany => "many_to_many",
            RelationKind::Recursive => "recursive",
        }
    }
}

/// Direction of a recursive relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recursion {
    /// Walks towards the root (`parent`).
    Ancestors,
    /// Walks towards the leaves (`children`).
    Descendants,
}

// ============================================================================
// Field
// ============================================================================

/// A column or relation endpoint on a class.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Logical name used by clients.
    pub name: String,
    /// Physical column; empty for virtual fields.
    pub column: String,
    pub scalar: ScalarType,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    /// Synthesized by relation inference rather than loaded from the schema.
    pub is_virtual: bool,
    pub description: Option<String>,
    pub relation: Option<RelationId>,
}

impl Field {
    /// A physical column.
    pub fn column(name: impl Into<String>, column: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            scalar,
            nullable: true,
            unique: false,
            primary_key: false,
            is_virtual: false,
            description: None,
            relation: None,
        }
    }

    /// A virtual field exposing a relation.
    pub fn relation(name: impl Into<String>, relation: RelationId) -> Self {
        Self {
            name: name.into(),
            column: String::new(),
            scalar: ScalarType::Json,
            nullable: true,
            unique: false,
            primary_key: false,
            is_virtual: true,
            description: None,
            relation: Some(relation),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self.nullable = false;
        self
    }

    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }
}

// ============================================================================
// Class
// ============================================================================

/// One queryable entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    /// Logical name used by clients.
    pub name: String,
    /// Physical table; `None` for virtual classes.
    pub table: Option<String>,
    pub schema: Option<String>,
    pub description: Option<String>,
    /// Primary key field names.
    pub primary_keys: Vec<String>,
    pub kind: ClassKind,
    /// Canonical class this record was copied from.
    pub alias_of: Option<ClassId>,
    /// Extra names resolving to this record.
    pub aliases: Vec<String>,
    fields: Vec<Field>,
    field_index: HashMap<String, FieldId>,
}

impl Class {
    /// A class backed by `table`.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: Some(table.into()),
            schema: None,
            description: None,
            primary_keys: Vec::new(),
            kind: ClassKind::Table,
            alias_of: None,
            aliases: Vec::new(),
            fields: Vec::new(),
            field_index: HashMap::new(),
        }
    }

    /// A class with no physical table.
    pub fn new_virtual(name: impl Into<String>) -> Self {
        Self {
            table: None,
            kind: ClassKind::Virtual,
            ..Self::new(name, "")
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.insert_field(field);
        self
    }

    pub fn is_virtual(&self) -> bool {
        self.kind == ClassKind::Virtual
    }

    pub fn is_through(&self) -> bool {
        self.kind == ClassKind::Through
    }

    /// Look up a field by logical name or physical column.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.field_index.get(name).map(|id| &self.fields[id.0])
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.field_index.get(name).copied()
    }

    pub fn field_by_id(&self, id: FieldId) -> &Field {
        &self.fields[id.0]
    }

    /// Every field once, in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Fields backed by a column.
    pub fn column_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_virtual)
    }

    /// Field of the first primary key.
    pub fn primary_key_field(&self) -> Option<&Field> {
        self.primary_keys.first().and_then(|pk| self.field(pk))
    }

    /// Insert a field, replacing any field already registered under its name.
    ///
    /// The field is indexed under its name and, when it differs, its column.
    pub fn insert_field(&mut self, field: Field) -> FieldId {
        let id = match self.field_index.get(&field.name) {
            Some(&existing) if self.fields[existing.0].name == field.name => {
                self.fields[existing.0] = field;
                existing
            }
            _ => {
                self.fields.push(field);
                FieldId(self.fields.len() - 1)
            }
        };
        self.reindex();
        id
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        let id = self.field_index.get(name).copied()?;
        self.fields.get_mut(id.0)
    }

    /// Keep only fields matching `keep`.
    pub(crate) fn retain_fields(&mut self, keep: impl FnMut(&Field) -> bool) {
        self.fields.retain(keep);
        let names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        self.primary_keys.retain(|pk| names.contains(&pk.as_str()));
        self.reindex();
    }

    /// Rebuild the name index after fields changed.
    ///
    /// Logical names always win over column names of other fields.
    pub(crate) fn reindex(&mut self) {
        self.field_index.clear();
        for (i, f) in self.fields.iter().enumerate() {
            if !f.column.is_empty() && f.column != f.name {
                self.field_index.insert(f.column.clone(), FieldId(i));
            }
        }
        for (i, f) in self.fields.iter().enumerate() {
            self.field_index.insert(f.name.clone(), FieldId(i));
        }
    }
}

// ============================================================================
// Relation
// ============================================================================

/// A field on a specific class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: ClassId,
    pub field: FieldId,
}

/// Junction table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    pub class: ClassId,
    pub table: String,
    pub schema: Option<String>,
    /// Junction column referencing the relation's source.
    pub source_key: String,
    /// Junction column referencing the relation's target.
    pub target_key: String,
    /// Junction fields exposed next to the target's own fields.
    pub extra_fields: Vec<String>,
}

/// Directional link between two fields.
///
/// Rows of the target class related to a source row are those whose target
/// key column equals the source row's source key column (through the
/// junction table for many-to-many).
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub kind: RelationKind,
    pub recursion: Option<Recursion>,
    pub source: FieldRef,
    pub target: FieldRef,
    pub through: Option<Through>,
    pub reverse: Option<RelationId>,
    /// Virtual field on the source class exposing this relation.
    pub field: Option<FieldId>,
}

impl Relation {
    pub fn is_list(&self) -> bool {
        self.kind.is_list(self.recursion)
    }
}

/// A raw foreign-key fact collected by loaders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    /// Declared by a static override rather than introspected.
    #[serde(default)]
    pub declared: bool,
}

impl ForeignKey {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            ref_table: ref_table.into(),
            ref_column: ref_column.into(),
            declared: false,
        }
    }
}
