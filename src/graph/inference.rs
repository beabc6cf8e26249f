//! Relation Inference Engine.
//!
//! Runs once over the foreign-key facts collected by the loaders:
//!
//! 1. every foreign key becomes a `many_to_one`/`one_to_many` pair (or a
//!    `recursive` parent/children pair for self references) with mutual
//!    reverse links;
//! 2. tables with exactly two foreign keys whose primary key is that pair of
//!    columns, or whose name is `a_b`/`b_a` for the referenced tables, become
//!    junctions of a `many_to_many` pair;
//! 3. every relation gets a virtual field on its owning class;
//! 4. relation fields are copied onto independent alias copies.
//!
//! Inference only adds relations and virtual fields. Foreign keys whose
//! endpoints cannot be resolved are skipped with a warning.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::builder::GraphBuilder;
use super::types::*;
use crate::naming::Namer;

pub(super) fn infer(b: &mut GraphBuilder, namer: &Namer) -> Vec<Relation> {
    let mut relations = Vec::new();

    pair_foreign_keys(b, &mut relations);
    detect_junctions(b, &mut relations);
    name_relation_fields(b, namer, &mut relations);
    propagate_to_copies(b, &relations);

    relations
}

// ============================================================================
// Step 1: foreign keys
// ============================================================================

type FkKey<'a> = (&'a str, &'a str, &'a str, &'a str);

fn pair_foreign_keys(b: &GraphBuilder, relations: &mut Vec<Relation>) {
    let mut seen: HashSet<FkKey<'_>> = HashSet::new();

    for fk in &b.foreign_keys {
        let key = (
            fk.table.as_str(),
            fk.column.as_str(),
            fk.ref_table.as_str(),
            fk.ref_column.as_str(),
        );
        if seen.contains(&key) {
            continue;
        }
        seen.insert(key);
        seen.insert((key.2, key.3, key.0, key.1));

        let Some(source) = resolve(b, &fk.table, &fk.column) else {
            warn!(
                table = %fk.table,
                column = %fk.column,
                "skipping foreign key with unknown source"
            );
            continue;
        };
        let Some(target) = resolve(b, &fk.ref_table, &fk.ref_column) else {
            warn!(
                table = %fk.table,
                column = %fk.column,
                target = %format!("{}.{}", fk.ref_table, fk.ref_column),
                "skipping foreign key with unknown target"
            );
            continue;
        };

        if source.class == target.class {
            // parent: this row's key column → referenced column
            // children: referenced column → rows pointing at it
            push_pair(
                relations,
                Relation {
                    kind: RelationKind::Recursive,
                    recursion: Some(Recursion::Ancestors),
                    source,
                    target,
                    through: None,
                    reverse: None,
                    field: None,
                },
                Relation {
                    kind: RelationKind::Recursive,
                    recursion: Some(Recursion::Descendants),
                    source: target,
                    target: source,
                    through: None,
                    reverse: None,
                    field: None,
                },
            );
        } else {
            push_pair(
                relations,
                Relation {
                    kind: RelationKind::ManyToOne,
                    recursion: None,
                    source,
                    target,
                    through: None,
                    reverse: None,
                    field: None,
                },
                Relation {
                    kind: RelationKind::OneToMany,
                    recursion: None,
                    source: target,
                    target: source,
                    through: None,
                    reverse: None,
                    field: None,
                },
            );
        }
    }
}

fn resolve(b: &GraphBuilder, table: &str, column: &str) -> Option<FieldRef> {
    let class = b.table_class(table)?;
    let field = b.class_by_id(class).field_id(column)?;
    Some(FieldRef { class, field })
}

fn push_pair(relations: &mut Vec<Relation>, mut forward: Relation, mut backward: Relation) {
    let f = RelationId(relations.len());
    let r = RelationId(relations.len() + 1);
    forward.reverse = Some(r);
    backward.reverse = Some(f);
    relations.push(forward);
    relations.push(backward);
}

// ============================================================================
// Step 2: junction tables
// ============================================================================

fn detect_junctions(b: &mut GraphBuilder, relations: &mut Vec<Relation>) {
    let candidates: Vec<ClassId> = (0..b.classes.len())
        .map(ClassId)
        .filter(|id| {
            let class = b.class_by_id(*id);
            class.alias_of.is_none() && class.table.is_some() && !class.is_virtual()
        })
        .collect();

    for junction in candidates {
        let Some(table) = b.class_by_id(junction).table.clone() else {
            continue;
        };

        let mut fks: Vec<&ForeignKey> = Vec::new();
        for fk in b.foreign_keys.iter().filter(|fk| fk.table == table) {
            if !fks.iter().any(|seen| {
                seen.column == fk.column
                    && seen.ref_table == fk.ref_table
                    && seen.ref_column == fk.ref_column
            }) {
                fks.push(fk);
            }
        }
        let [a, bk] = fks.as_slice() else {
            continue;
        };

        if !is_junction(b.class_by_id(junction), &table, a, bk) {
            continue;
        }

        let (Some(a_side), Some(b_side)) = (
            resolve(b, &a.ref_table, &a.ref_column),
            resolve(b, &bk.ref_table, &bk.ref_column),
        ) else {
            warn!(table = %table, "junction references an unknown class; skipping");
            continue;
        };

        let class = b.class_by_id(junction);
        let extra_fields: Vec<String> = class
            .column_fields()
            .filter(|f| f.column != a.column && f.column != bk.column)
            .map(|f| f.name.clone())
            .collect();
        let schema = class.schema.clone();

        let through = |source_key: &str, target_key: &str| Through {
            class: junction,
            table: table.clone(),
            schema: schema.clone(),
            source_key: source_key.to_string(),
            target_key: target_key.to_string(),
            extra_fields: extra_fields.clone(),
        };

        debug!(junction = %table, a = %a.ref_table, b = %bk.ref_table, "detected junction table");

        push_pair(
            relations,
            Relation {
                kind: RelationKind::ManyToMany,
                recursion: None,
                source: a_side,
                target: b_side,
                through: Some(through(&a.column, &bk.column)),
                reverse: None,
                field: None,
            },
            Relation {
                kind: RelationKind::ManyToMany,
                recursion: None,
                source: b_side,
                target: a_side,
                through: Some(through(&bk.column, &a.column)),
                reverse: None,
                field: None,
            },
        );

        b.class_by_id_mut(junction).kind = ClassKind::Through;
    }
}

fn is_junction(class: &Class, table: &str, a: &ForeignKey, b: &ForeignKey) -> bool {
    let pk_columns: HashSet<&str> = class
        .primary_keys
        .iter()
        .filter_map(|pk| class.field(pk))
        .map(|f| f.column.as_str())
        .collect();
    let fk_columns: HashSet<&str> = [a.column.as_str(), b.column.as_str()].into();

    let key_match = pk_columns.len() == 2 && pk_columns == fk_columns;
    let name_match = table == format!("{}_{}", a.ref_table, b.ref_table)
        || table == format!("{}_{}", b.ref_table, a.ref_table);

    key_match || name_match
}

// ============================================================================
// Step 3: relation fields
// ============================================================================

fn name_relation_fields(b: &mut GraphBuilder, namer: &Namer, relations: &mut [Relation]) {
    for (i, relation) in relations.iter_mut().enumerate() {
        let target_name = b.class_by_id(relation.target.class).name.clone();
        let base = match (relation.kind, relation.recursion) {
            (RelationKind::Recursive, Some(Recursion::Ancestors)) => "parent".to_string(),
            (RelationKind::Recursive, _) => "children".to_string(),
            (RelationKind::ManyToOne, _) => namer.object_field_name(&target_name),
            (RelationKind::OneToMany | RelationKind::ManyToMany, _) => {
                namer.list_field_name(&target_name)
            }
        };

        let owner = b.class_by_id_mut(relation.source.class);
        let name = unique_field_name(owner, &base);
        relation.field = Some(owner.insert_field(Field::relation(name, RelationId(i))));
    }
}

/// `base`, or `base` followed by the first numeric suffix not yet taken.
fn unique_field_name(class: &Class, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut n = 0;
    while class.field(&candidate).is_some() {
        n += 1;
        candidate = format!("{}{}", base, n);
    }
    candidate
}

// ============================================================================
// Step 4: alias copies
// ============================================================================

fn propagate_to_copies(b: &mut GraphBuilder, relations: &[Relation]) {
    let copies: Vec<(ClassId, ClassId)> = b
        .classes
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.alias_of.map(|canonical| (ClassId(i), canonical)))
        .collect();

    for (copy, canonical) in copies {
        for (i, relation) in relations.iter().enumerate() {
            if relation.source.class != canonical {
                continue;
            }
            let Some(field_id) = relation.field else {
                continue;
            };
            let source = b.class_by_id(canonical);
            let name = source.field_by_id(field_id).name.clone();
            let key_column = source.field_by_id(relation.source.field).column.clone();

            let target = b.class_by_id_mut(copy);
            if target.field(&key_column).is_none() || target.field(&name).is_some() {
                continue;
            }
            target.insert_field(Field::relation(name, RelationId(i)));
        }
    }
}
