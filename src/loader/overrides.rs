//! Static override loader.
//!
//! Applies the `[classes.*]` tables of the settings file:
//!
//! - `virtual = true` declares a class with no physical table;
//! - a class naming a table already loaded under another name becomes an
//!   alias. Without field edits it is the same record under a new name;
//!   with `include`/`exclude`/`fields` it is an independent copy and the
//!   canonical class is left as loaded;
//! - a class naming itself (or its own table) is edited in place;
//! - a field `relation = "table.column"` declares a foreign key.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{GraphLoader, LoadError, LoadResult};
use crate::config::{ClassOverride, FieldOverride, Settings};
use crate::graph::{Class, ClassId, Field, ForeignKey, GraphBuilder, GraphError, ScalarType};
use crate::naming::Namer;

/// Loads declarative class definitions.
#[derive(Debug, Clone)]
pub struct OverrideLoader {
    classes: BTreeMap<String, ClassOverride>,
    namer: Namer,
}

impl OverrideLoader {
    pub fn new(settings: &Settings) -> Self {
        Self {
            classes: settings.classes.clone(),
            namer: Namer::new(&settings.naming),
        }
    }

    fn apply(&self, name: &str, ov: &ClassOverride, sink: &mut GraphBuilder) -> LoadResult<()> {
        if ov.is_virtual {
            return self.apply_virtual(name, ov, sink);
        }

        let canonical = match &ov.table {
            Some(table) => sink
                .table_class(table)
                .ok_or_else(|| invalid(name, format!("unknown table '{}'", table)))?,
            None => sink
                .class_id(name)
                .ok_or_else(|| invalid(name, "no such class; set `table` to alias one"))?,
        };

        let id = if sink.class_id(name) == Some(canonical) {
            canonical
        } else if !ov.edits_fields() {
            sink.alias(name, canonical, ov.replace)?;
            debug!(alias = name, "registered alias");
            canonical
        } else {
            sink.insert_copy(name, canonical, ov.replace)?
        };

        self.edit(name, id, ov, sink)
    }

    fn apply_virtual(
        &self,
        name: &str,
        ov: &ClassOverride,
        sink: &mut GraphBuilder,
    ) -> LoadResult<()> {
        if let Some(existing) = sink.class(name) {
            if !ov.replace || !existing.is_virtual() {
                return Err(GraphError::AliasConflict {
                    alias: name.to_string(),
                    existing: existing.name.clone(),
                }
                .into());
            }
        }

        let mut class = Class::new_virtual(name);
        class.description = ov.description.clone();
        class.primary_keys = ov.primary_keys.clone();
        for (field_name, fo) in &ov.fields {
            if fo.relation.is_some() {
                return Err(invalid(name, "virtual classes cannot declare relations"));
            }
            class.insert_field(new_field(field_name, fo));
        }
        sink.insert_class(class);
        Ok(())
    }

    fn edit(
        &self,
        name: &str,
        id: ClassId,
        ov: &ClassOverride,
        sink: &mut GraphBuilder,
    ) -> LoadResult<()> {
        let class = sink.class_by_id_mut(id);
        if ov.description.is_some() && class.name == name {
            class.description = ov.description.clone();
        }
        if !ov.primary_keys.is_empty() {
            class.primary_keys = ov.primary_keys.clone();
        }

        for (field_name, fo) in &ov.fields {
            // An override may rename the field loaded for its column.
            let existing = class
                .field(field_name)
                .or_else(|| fo.column.as_deref().and_then(|c| class.field(c)))
                .map(|f| f.name.clone());
            if let Some(old) = existing.as_ref().filter(|old| *old != field_name) {
                for pk in class.primary_keys.iter_mut() {
                    if *pk == *old {
                        *pk = field_name.clone();
                    }
                }
            }

            let target = match &existing {
                Some(old) => class.field_mut(old),
                None => None,
            };
            match target {
                Some(field) => {
                    field.name = field_name.clone();
                    if let Some(column) = &fo.column {
                        field.column = column.clone();
                    }
                    if let Some(scalar) = &fo.scalar {
                        field.scalar = ScalarType::from_sql(scalar);
                    }
                    if let Some(nullable) = fo.nullable {
                        field.nullable = nullable;
                    }
                    if fo.description.is_some() {
                        field.description = fo.description.clone();
                    }
                }
                None => {
                    class.insert_field(new_field(field_name, fo));
                }
            }
        }
        class.reindex();

        if !ov.include.is_empty() {
            let keep = |f: &Field| {
                f.primary_key
                    || ov.include.iter().any(|n| n == &f.name || n == &f.column)
                    || ov.fields.contains_key(&f.name)
            };
            class.retain_fields(keep);
        }
        if !ov.exclude.is_empty() {
            class.retain_fields(|f| !ov.exclude.iter().any(|n| n == &f.name || n == &f.column));
        }

        let table = class.table.clone();
        let declared: Vec<(String, String)> = ov
            .fields
            .iter()
            .filter_map(|(field_name, fo)| {
                let relation = fo.relation.as_ref()?;
                let column = class.field(field_name)?.column.clone();
                Some((column, relation.clone()))
            })
            .collect();

        for (column, relation) in declared {
            let Some(table) = &table else {
                return Err(invalid(name, "relations need a physical table"));
            };
            let (ref_table, ref_column) = self.resolve_target(name, &relation, sink)?;
            sink.add_foreign_key(ForeignKey {
                declared: true,
                ..ForeignKey::new(table.as_str(), column, ref_table, ref_column)
            });
        }
        Ok(())
    }

    /// `table.column`, or `table` meaning its first primary key. Class names
    /// are accepted in place of table names.
    fn resolve_target(
        &self,
        name: &str,
        relation: &str,
        sink: &GraphBuilder,
    ) -> LoadResult<(String, String)> {
        let (target, column) = match relation.split_once('.') {
            Some((t, c)) => (t, Some(c)),
            None => (relation, None),
        };
        let class = sink
            .class(target)
            .ok_or_else(|| invalid(name, format!("relation target '{}' is unknown", relation)))?;
        let table = class
            .table
            .clone()
            .ok_or_else(|| invalid(name, format!("relation target '{}' is virtual", relation)))?;

        let column = match column {
            Some(c) => class
                .field(c)
                .map(|f| f.column.clone())
                .unwrap_or_else(|| c.to_string()),
            None => class
                .primary_key_field()
                .map(|f| f.column.clone())
                .ok_or_else(|| {
                    invalid(
                        name,
                        format!("relation target '{}' has no primary key", relation),
                    )
                })?,
        };
        Ok((table, column))
    }
}

fn new_field(name: &str, fo: &FieldOverride) -> Field {
    let mut field = Field::column(
        name,
        fo.column.clone().unwrap_or_else(|| name.to_string()),
        fo.scalar
            .as_deref()
            .map(ScalarType::from_sql)
            .unwrap_or_default(),
    );
    field.nullable = fo.nullable.unwrap_or(true);
    field.description = fo.description.clone();
    field
}

fn invalid(class: &str, message: impl Into<String>) -> LoadError {
    LoadError::InvalidOverride {
        class: class.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl GraphLoader for OverrideLoader {
    fn name(&self) -> &str {
        "static"
    }

    fn priority(&self) -> i32 {
        100
    }

    async fn load(&self, sink: &mut GraphBuilder) -> LoadResult<()> {
        // Virtual classes and in-place edits first, so aliases see edited canonicals.
        let (direct, aliases): (Vec<_>, Vec<_>) = self.classes.iter().partition(|(name, ov)| {
            ov.is_virtual
                || ov.table.is_none()
                || sink.class_id(name) == ov.table.as_ref().and_then(|t| sink.table_class(t))
        });

        for (name, ov) in direct.into_iter().chain(aliases) {
            self.apply(name, ov, sink)?;
        }

        info!(
            classes = self.classes.len(),
            camel_case = self.namer.camel_case(),
            "applied static overrides"
        );
        Ok(())
    }
}
