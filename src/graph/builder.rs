//! Mutable sink the loaders write into.
//!
//! A [`GraphBuilder`] accepts classes, aliases and foreign-key facts in any
//! order. [`GraphBuilder::build`] runs relation inference and freezes the
//! result into an immutable [`EntityGraph`].

use std::collections::HashMap;

use tracing::debug;

use super::inference;
use super::types::*;
use super::{EntityGraph, GraphVersion};
use crate::naming::Namer;

/// Errors raised while registering classes.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Name '{alias}' is already registered for class '{existing}'")]
    AliasConflict { alias: String, existing: String },

    #[error("Unknown class: {0}")]
    UnknownClass(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Accumulates loader output before inference.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    pub(super) classes: Vec<Class>,
    /// Logical names, table names and aliases.
    pub(super) names: HashMap<String, ClassId>,
    /// Physical table → canonical class.
    pub(super) tables: HashMap<String, ClassId>,
    pub(super) foreign_keys: Vec<ForeignKey>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Insert a class, or merge it into the class already registered under
    /// its logical name or its table.
    ///
    /// The class is reachable under its logical name and its table name,
    /// both resolving to the same record.
    pub fn insert_class(&mut self, class: Class) -> ClassId {
        let existing = self.names.get(&class.name).copied().or_else(|| {
            class
                .table
                .as_ref()
                .and_then(|t| self.tables.get(t).copied())
        });

        let id = match existing {
            Some(id) => {
                let name = class.name.clone();
                merge_class(&mut self.classes[id.0], class);
                if self.classes[id.0].name != name {
                    self.register_alias(&name, id);
                }
                id
            }
            None => {
                let id = ClassId(self.classes.len());
                self.names.insert(class.name.clone(), id);
                self.classes.push(class);
                id
            }
        };

        if let Some(table) = self.classes[id.0].table.clone() {
            self.tables.entry(table.clone()).or_insert(id);
            self.names.entry(table).or_insert(id);
        }
        id
    }

    /// Register `alias` as another name of class `id`.
    ///
    /// Fails if the name already belongs to a different class, unless
    /// `overwrite` is set.
    pub fn alias(&mut self, alias: &str, id: ClassId, overwrite: bool) -> GraphResult<()> {
        self.check_free(alias, Some(id), overwrite)?;
        self.register_alias(alias, id);
        Ok(())
    }

    /// Clone class `source` into a new record reachable only as `name`.
    ///
    /// The copy can be edited freely; `source` is never touched.
    pub fn insert_copy(
        &mut self,
        name: &str,
        source: ClassId,
        overwrite: bool,
    ) -> GraphResult<ClassId> {
        self.check_free(name, None, overwrite)?;

        let mut copy = self.classes[source.0].clone();
        copy.name = name.to_string();
        copy.alias_of = Some(source);
        copy.aliases.clear();

        let id = ClassId(self.classes.len());
        self.classes.push(copy);
        self.names.insert(name.to_string(), id);
        debug!(alias = name, canonical = %self.classes[source.0].name, "copied class");
        Ok(id)
    }

    pub fn add_foreign_key(&mut self, fk: ForeignKey) {
        if !self.foreign_keys.contains(&fk) {
            self.foreign_keys.push(fk);
        }
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.names.get(name).copied()
    }

    pub fn class(&self, name: &str) -> Option<&Class> {
        self.class_id(name).map(|id| &self.classes[id.0])
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut Class> {
        let id = self.class_id(name)?;
        self.classes.get_mut(id.0)
    }

    pub fn class_by_id(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    pub fn class_by_id_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.0]
    }

    /// Canonical class of a physical table.
    pub fn table_class(&self, table: &str) -> Option<ClassId> {
        self.tables.get(table).copied()
    }

    /// Run relation inference and freeze the graph.
    pub fn build(mut self, namer: &Namer) -> EntityGraph {
        let relations = inference::infer(&mut self, namer);
        debug!(
            classes = self.classes.len(),
            relations = relations.len(),
            "built entity graph"
        );
        EntityGraph::from_parts(
            self.classes,
            self.names,
            self.tables,
            relations,
            self.foreign_keys,
            namer,
            GraphVersion::next(),
        )
    }

    fn check_free(&self, name: &str, target: Option<ClassId>, overwrite: bool) -> GraphResult<()> {
        match self.names.get(name) {
            Some(&existing) if Some(existing) != target && !overwrite => {
                Err(GraphError::AliasConflict {
                    alias: name.to_string(),
                    existing: self.classes[existing.0].name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn register_alias(&mut self, alias: &str, id: ClassId) {
        self.names.insert(alias.to_string(), id);
        let class = &mut self.classes[id.0];
        if class.name != alias && !class.aliases.iter().any(|a| a == alias) {
            class.aliases.push(alias.to_string());
        }
    }
}

/// Merge `incoming` into `target`. Incoming fields replace same-named ones;
/// other attributes are taken only when set.
fn merge_class(target: &mut Class, incoming: Class) {
    if incoming.table.is_some() {
        target.table = incoming.table.clone();
    }
    if incoming.schema.is_some() {
        target.schema = incoming.schema.clone();
    }
    if incoming.description.is_some() {
        target.description = incoming.description.clone();
    }
    if !incoming.primary_keys.is_empty() {
        target.primary_keys = incoming.primary_keys.clone();
    }
    if incoming.kind != ClassKind::Table {
        target.kind = incoming.kind;
    }
    for field in incoming.fields() {
        target.insert_field(field.clone());
    }
}
