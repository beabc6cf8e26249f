//! Entity graph - classes, fields and relations inferred from a relational schema.
//!
//! The graph is an arena: [`Class`] and [`Relation`] records are addressed by
//! [`ClassId`] and [`RelationId`], and a name index maps every logical name,
//! physical table name and alias to a class handle. Several names may share
//! one handle, which is how "the same class under two names" is expressed.
//!
//! An [`EntityGraph`] is only produced by [`GraphBuilder::build`] and has no
//! mutating API; share it behind an `Arc` for concurrent compilation.

mod builder;
mod inference;
pub mod snapshot;
pub mod types;

pub use builder::{GraphBuilder, GraphError, GraphResult};
pub use snapshot::{GraphSnapshot, SnapshotError};
pub use types::*;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::naming::Namer;

/// Sortable build token, bumped on every successful build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphVersion(String);

static LAST_VERSION: AtomicU64 = AtomicU64::new(0);

impl GraphVersion {
    /// Zero-padded nanosecond timestamp, strictly increasing within a process.
    pub fn next() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();

        let mut last = LAST_VERSION.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match LAST_VERSION.compare_exchange_weak(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return GraphVersion(format!("{:020}", candidate)),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GraphVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A field selectable at the top level of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootField {
    pub class: ClassId,
    /// Yields a JSON array; otherwise one object looked up by `id`/`where`.
    pub list: bool,
}

/// The frozen entity graph.
#[derive(Debug)]
pub struct EntityGraph {
    classes: Vec<Class>,
    names: HashMap<String, ClassId>,
    tables: HashMap<String, ClassId>,
    relations: Vec<Relation>,
    foreign_keys: Vec<ForeignKey>,
    roots: HashMap<String, RootField>,
    version: GraphVersion,
}

impl EntityGraph {
    pub(crate) fn from_parts(
        classes: Vec<Class>,
        names: HashMap<String, ClassId>,
        tables: HashMap<String, ClassId>,
        relations: Vec<Relation>,
        foreign_keys: Vec<ForeignKey>,
        namer: &Namer,
        version: GraphVersion,
    ) -> Self {
        let roots = root_index(&classes, namer);
        Self {
            classes,
            names,
            tables,
            relations,
            foreign_keys,
            roots,
            version,
        }
    }

    /// Look up a class by logical name, table name or alias.
    pub fn class(&self, name: &str) -> Option<&Class> {
        self.class_id(name).map(|id| &self.classes[id.0])
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.names.get(name).copied()
    }

    pub fn class_by_id(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    /// Canonical class of a physical table.
    pub fn class_by_table(&self, table: &str) -> Option<&Class> {
        self.tables.get(table).map(|id| &self.classes[id.0])
    }

    /// Every class record once.
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassId(i), c))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Every registered name with its class.
    pub fn names(&self) -> impl Iterator<Item = (&str, ClassId)> {
        self.names.iter().map(|(n, id)| (n.as_str(), *id))
    }

    pub fn relation(&self, id: RelationId) -> &Relation {
        &self.relations[id.0]
    }

    pub fn relations(&self) -> impl Iterator<Item = (RelationId, &Relation)> {
        self.relations
            .iter()
            .enumerate()
            .map(|(i, r)| (RelationId(i), r))
    }

    /// The field a relation is keyed on.
    pub fn field(&self, at: FieldRef) -> &Field {
        self.classes[at.class.0].field_by_id(at.field)
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn root(&self, name: &str) -> Option<RootField> {
        self.roots.get(name).copied()
    }

    pub fn roots(&self) -> impl Iterator<Item = (&str, RootField)> {
        self.roots.iter().map(|(n, r)| (n.as_str(), *r))
    }

    pub fn version(&self) -> &GraphVersion {
        &self.version
    }
}

/// Root fields: the list name, class name and aliases yield lists; the
/// singular name yields one object. The first registration of a name wins.
///
/// Junction tables are reachable only under their exact class or table name,
/// and only when no table class already claims it.
fn root_index(classes: &[Class], namer: &Namer) -> HashMap<String, RootField> {
    let mut roots = HashMap::new();

    for (i, class) in classes.iter().enumerate() {
        if class.kind != ClassKind::Table {
            continue;
        }
        let id = ClassId(i);
        let list = RootField { class: id, list: true };

        let mut list_names = vec![namer.list_field_name(&class.name), class.name.clone()];
        list_names.extend(class.aliases.iter().cloned());
        for name in list_names {
            roots.entry(name).or_insert(list);
        }

        let object = namer.object_field_name(&class.name);
        if !roots.contains_key(&object) {
            roots.insert(object, RootField { class: id, list: false });
        } else {
            warn!(
                class = %class.name,
                name = %object,
                "singular root name already taken; class has no single-row root"
            );
        }
    }

    for (i, class) in classes.iter().enumerate() {
        if !class.is_through() {
            continue;
        }
        let list = RootField {
            class: ClassId(i),
            list: true,
        };
        for name in std::iter::once(&class.name).chain(class.table.as_ref()) {
            roots.entry(name.clone()).or_insert(list);
        }
    }

    roots
}
