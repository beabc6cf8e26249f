//! JSON snapshot of an entity graph.
//!
//! A snapshot stores, per logical class name, the class attributes and its
//! column fields keyed by field name, with each foreign key recorded on the
//! field that holds it. Relations and relation fields are not stored:
//! restoring a snapshot re-runs inference, which rebuilds them.
//!
//! ```json
//! {
//!   "classes": {
//!     "posts": {
//!       "table": "posts",
//!       "primary_keys": ["id"],
//!       "fields": {
//!         "id": { "column": "id", "type": "int", "primary_key": true },
//!         "user_id": { "column": "user_id", "type": "int",
//!                      "references": { "table": "users", "column": "id" } }
//!       }
//!     }
//!   },
//!   "version": "01760601234567890123"
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::builder::{GraphBuilder, GraphError};
use super::types::*;
use super::{EntityGraph, GraphVersion};
use crate::naming::Namer;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to access snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Class '{alias}' is a copy of unknown class '{canonical}'")]
    UnknownCanonical { alias: String, canonical: String },
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Serialized graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub classes: BTreeMap<String, SnapshotClass>,
    pub version: GraphVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotClass {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub kind: ClassKind,
    /// Logical name of the class this one was copied from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, SnapshotField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotField {
    pub column: String,
    #[serde(rename = "type", default)]
    pub scalar: ScalarType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<SnapshotRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub table: String,
    pub column: String,
}

impl GraphSnapshot {
    pub fn from_graph(graph: &EntityGraph) -> Self {
        let mut classes = BTreeMap::new();

        for (_, class) in graph.classes() {
            let fields = class
                .column_fields()
                .map(|f| (f.name.clone(), snapshot_field(graph, class, f)))
                .collect();

            classes.insert(
                class.name.clone(),
                SnapshotClass {
                    table: class.table.clone(),
                    schema: class.schema.clone(),
                    description: class.description.clone(),
                    primary_keys: class.primary_keys.clone(),
                    kind: class.kind,
                    alias_of: class
                        .alias_of
                        .map(|id| graph.class_by_id(id).name.clone()),
                    aliases: class.aliases.clone(),
                    fields,
                },
            );
        }

        Self {
            classes,
            version: graph.version().clone(),
        }
    }

    pub fn to_json(&self) -> SnapshotResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> SnapshotResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Write the snapshot's classes, aliases and foreign keys into `builder`.
    pub fn apply(&self, builder: &mut GraphBuilder) -> SnapshotResult<()> {
        let (canonical, copies): (Vec<_>, Vec<_>) = self
            .classes
            .iter()
            .partition(|(_, c)| c.alias_of.is_none());

        for (name, sc) in canonical {
            let id = builder.insert_class(restore_class(name, sc));
            for alias in &sc.aliases {
                builder.alias(alias, id, false)?;
            }
            if let Some(table) = &sc.table {
                for (field_name, field) in &sc.fields {
                    if let Some(r) = &field.references {
                        let column = if field.column.is_empty() {
                            field_name
                        } else {
                            &field.column
                        };
                        builder.add_foreign_key(ForeignKey::new(
                            table.as_str(),
                            column.as_str(),
                            r.table.as_str(),
                            r.column.as_str(),
                        ));
                    }
                }
            }
        }

        for (name, sc) in copies {
            let canonical_name = sc.alias_of.clone().unwrap_or_default();
            let source = builder.class_id(&canonical_name).ok_or_else(|| {
                SnapshotError::UnknownCanonical {
                    alias: name.clone(),
                    canonical: canonical_name.clone(),
                }
            })?;
            let id = builder.insert_copy(name, source, false)?;
            let mut class = restore_class(name, sc);
            class.alias_of = Some(source);
            *builder.class_by_id_mut(id) = class;
        }

        Ok(())
    }

    /// Rebuild a graph from this snapshot alone.
    pub fn restore(&self, namer: &Namer) -> SnapshotResult<EntityGraph> {
        let mut builder = GraphBuilder::new();
        self.apply(&mut builder)?;
        Ok(builder.build(namer))
    }
}

fn snapshot_field(graph: &EntityGraph, class: &Class, field: &Field) -> SnapshotField {
    let references = match (&class.table, class.alias_of) {
        (Some(table), None) => graph
            .foreign_keys()
            .iter()
            .find(|fk| &fk.table == table && fk.column == field.column)
            .map(|fk| SnapshotRef {
                table: fk.ref_table.clone(),
                column: fk.ref_column.clone(),
            }),
        _ => None,
    };

    SnapshotField {
        column: field.column.clone(),
        scalar: field.scalar,
        nullable: field.nullable,
        unique: field.unique,
        primary_key: field.primary_key,
        description: field.description.clone(),
        references,
    }
}

fn restore_class(name: &str, sc: &SnapshotClass) -> Class {
    let mut class = match &sc.table {
        Some(table) => Class::new(name, table.as_str()),
        None => Class::new_virtual(name),
    };
    class.schema = sc.schema.clone();
    class.description = sc.description.clone();
    class.primary_keys = sc.primary_keys.clone();
    class.kind = sc.kind;

    for (field_name, sf) in &sc.fields {
        class.insert_field(Field {
            name: field_name.clone(),
            column: sf.column.clone(),
            scalar: sf.scalar,
            nullable: sf.nullable,
            unique: sf.unique,
            primary_key: sf.primary_key,
            is_virtual: false,
            description: sf.description.clone(),
            relation: None,
        });
    }
    class
}
