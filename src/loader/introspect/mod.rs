//! Database introspection loader.
//!
//! Issues one consolidated catalog query per dialect and turns the returned
//! JSON document into classes, fields and foreign-key facts. Running SQL is
//! left to a [`SchemaSource`] supplied by the caller.

mod mysql;
mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{info, warn};

use super::{GraphLoader, LoadEnv, LoadError, LoadResult};
use crate::config::Settings;
use crate::graph::{Class, Field, ForeignKey, GraphBuilder, ScalarType};
use crate::naming::Namer;
use crate::sql::Dialect;

pub use mysql::MIN_VERSION as MYSQL_MIN_VERSION;
pub use postgres::MIN_VERSION as POSTGRES_MIN_VERSION;

/// Error reported by a [`SchemaSource`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// A live database handle.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Numeric server version (`server_version_num` on PostgreSQL,
    /// `major * 10000 + minor * 100 + patch` on MySQL).
    async fn server_version(&self) -> Result<u64, SourceError>;

    /// Run `sql` with positional `params` and return the JSON value of the
    /// first column of the first row.
    async fn query_json(&self, sql: &str, params: &[Value]) -> Result<Value, SourceError>;
}

pub(crate) struct MetadataQuery {
    pub engine: &'static str,
    pub min_version: u64,
    pub sql: &'static str,
    /// How many times the schema name is bound.
    pub schema_params: usize,
}

fn metadata_query(dialect: Dialect) -> &'static MetadataQuery {
    match dialect {
        Dialect::Postgres => &postgres::QUERY,
        Dialect::MySql => &mysql::QUERY,
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Catalog document returned by the metadata query.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchemaMetadata {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tables: Vec<TableMeta>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub columns: Vec<ColumnMeta>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub primary_keys: Vec<KeyMeta>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub foreign_keys: Vec<ForeignKeyMeta>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableMeta {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnMeta {
    pub table: String,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub nullable: bool,
    #[serde(default, deserialize_with = "flag")]
    pub unique: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeyMeta {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForeignKeyMeta {
    pub table: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

fn default_true() -> bool {
    true
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Booleans arrive as `true`, `1` or `"YES"` depending on the engine.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.to_ascii_uppercase().as_str(), "YES" | "Y" | "TRUE" | "1"),
        _ => false,
    })
}

// ============================================================================
// Loader
// ============================================================================

/// Loads classes from a live database.
pub struct IntrospectionLoader<S> {
    source: S,
    dialect: Dialect,
    settings: Settings,
    namer: Namer,
}

impl<S: SchemaSource> IntrospectionLoader<S> {
    pub fn new(source: S, settings: &Settings) -> Self {
        Self {
            source,
            dialect: settings.dialect,
            settings: settings.clone(),
            namer: Namer::new(&settings.naming),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch the catalog document, checking the server version first.
    pub async fn fetch(&self) -> LoadResult<SchemaMetadata> {
        let query = metadata_query(self.dialect);

        let version = self.source.server_version().await?;
        if version < query.min_version {
            return Err(LoadError::UnsupportedVersion {
                engine: query.engine,
                found: version,
                minimum: query.min_version,
            });
        }

        let params = vec![Value::String(self.settings.schema.clone()); query.schema_params];
        let payload = self.source.query_json(query.sql, &params).await?;
        serde_json::from_value(payload).map_err(LoadError::Payload)
    }

    /// Write `meta` into `sink`.
    pub fn apply(&self, meta: SchemaMetadata, sink: &mut GraphBuilder) -> LoadResult<()> {
        if meta.tables.is_empty() {
            return Err(LoadError::NoTables {
                schema: self.settings.schema.clone(),
            });
        }

        let mut columns: HashMap<&str, Vec<&ColumnMeta>> = HashMap::new();
        for column in &meta.columns {
            columns.entry(column.table.as_str()).or_default().push(column);
        }
        let mut keys: HashMap<&str, Vec<&KeyMeta>> = HashMap::new();
        for key in &meta.primary_keys {
            keys.entry(key.table.as_str()).or_default().push(key);
        }

        let mut loaded = 0;
        for table in &meta.tables {
            if self.settings.is_table_excluded(&table.name) {
                continue;
            }
            let class = self.build_class(
                sink,
                table,
                columns.get_mut(table.name.as_str()),
                keys.get_mut(table.name.as_str()),
            );
            sink.insert_class(class);
            loaded += 1;
        }

        let mut foreign_keys = 0;
        for fk in &meta.foreign_keys {
            if self.settings.is_table_excluded(&fk.table)
                || self.settings.is_table_excluded(&fk.ref_table)
                || self.settings.is_field_excluded(&fk.table, &fk.column)
                || self.settings.is_field_excluded(&fk.ref_table, &fk.ref_column)
            {
                continue;
            }
            sink.add_foreign_key(ForeignKey::new(
                fk.table.as_str(),
                fk.column.as_str(),
                fk.ref_table.as_str(),
                fk.ref_column.as_str(),
            ));
            foreign_keys += 1;
        }

        info!(
            schema = %self.settings.schema,
            dialect = %self.dialect,
            tables = loaded,
            foreign_keys,
            "introspected schema"
        );
        Ok(())
    }

    fn build_class(
        &self,
        sink: &GraphBuilder,
        table: &TableMeta,
        columns: Option<&mut Vec<&ColumnMeta>>,
        keys: Option<&mut Vec<&KeyMeta>>,
    ) -> Class {
        let mut name = self.namer.class_name(&table.name);
        if let Some(existing) = sink.class(&name) {
            if existing.table.as_deref() != Some(table.name.as_str()) {
                warn!(table = %table.name, class = %name, "class name taken; using table name");
                name = table.name.clone();
            }
        }

        let mut class =
            Class::new(name, table.name.as_str()).with_schema(self.settings.schema.as_str());
        class.description = table.description.clone();

        if let Some(columns) = columns {
            columns.sort_by_key(|c| c.position);
            for column in columns.iter() {
                if self.settings.is_field_excluded(&table.name, &column.name) {
                    continue;
                }
                let mut field = Field::column(
                    self.namer.field_name(&column.name),
                    column.name.as_str(),
                    ScalarType::from_sql(&column.data_type),
                );
                field.nullable = column.nullable;
                field.unique = column.unique;
                field.description = column.description.clone();
                class.insert_field(field);
            }
        }

        if let Some(keys) = keys {
            keys.sort_by_key(|k| k.position);
            for key in keys.iter() {
                if let Some(field) = class.field_mut(&key.column) {
                    field.primary_key = true;
                    field.nullable = false;
                    let field_name = field.name.clone();
                    class.primary_keys.push(field_name);
                }
            }
            if let [pk] = class.primary_keys.clone().as_slice() {
                if let Some(field) = class.field_mut(pk) {
                    field.unique = true;
                }
            }
        }

        class
    }
}

#[async_trait]
impl<S: SchemaSource> GraphLoader for IntrospectionLoader<S> {
    fn name(&self) -> &str {
        "introspection"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn supports(&self, env: &LoadEnv) -> bool {
        env.has_database && env.dialect == self.dialect
    }

    async fn load(&self, sink: &mut GraphBuilder) -> LoadResult<()> {
        let meta = self.fetch().await?;
        self.apply(meta, sink)
    }
}
