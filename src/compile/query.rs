//! Query emission.
//!
//! A query compiles to one statement returning a single JSON document:
//!
//! ```text
//! SELECT json_build_object('posts', (<posts subquery>), ...) AS "__root"
//! ```
//!
//! Each selected entity becomes a subquery whose rows are built as JSON
//! objects and aggregated into an array (or limited to one row for singular
//! fields):
//!
//! ```text
//! SELECT coalesce(json_agg("__sr_1"."json"), '[]'::json) AS "json" FROM (
//!   SELECT json_build_object('title', "posts_2"."title", ...) AS "json"
//!   FROM "public"."posts" AS "posts_2"
//!   WHERE ... ORDER BY ... LIMIT 20
//! ) AS "__sr_1"
//! ```
//!
//! Nested relations are LATERAL joins where the dialect has them and
//! correlated subqueries in the select list otherwise. Recursive relations
//! read from a `WITH RECURSIVE` walk seeded by the parent row.

use super::args::{invalid, mismatch, Direction, FieldArgs, NullsOrder, SortSpec};
use super::args::{DISTINCT, ID, LEVEL, LIMIT, LIST_ARGS, OFFSET, ORDER_BY, WHERE};
use super::context::CompileContext;
use super::error::{join_path, CompileError, CompileErrorKind, CompileResult};
use super::filter::{emit_junction_join, emit_link_condition, FilterCompiler, Junction, RowSource};
use super::operation::{Operation, Selection};
use super::operators::OperatorTable;
use super::CompileOptions;
use crate::graph::{Class, ClassId, EntityGraph, Recursion, Relation, RelationKind, RootField};
use crate::sql::{SqlDialect, Token};

/// Column holding each row's JSON object.
pub(crate) const JSON_COLUMN: &str = "json";
/// Alias of the single result column.
pub const ROOT_ALIAS: &str = "__root";
/// Depth counter of a recursive walk.
pub(crate) const LEVEL_COLUMN: &str = "__rlevel";
/// Keys visited by a recursive walk; a row already on the path ends it.
const PATH_COLUMN: &str = "__rpath";
/// Selectable on every type; yields the type name.
pub const TYPENAME: &str = "__typename";

const OBJECT_ROOT_ARGS: &[&str] = &[WHERE, ID, ORDER_BY];
const RECURSIVE_ARGS: &[&str] = &[WHERE, ORDER_BY, LIMIT, OFFSET, DISTINCT, LEVEL];

/// Where an entity's rows come from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Link<'a> {
    /// The class's own table.
    Root,
    /// Rows related to the row aliased `parent`.
    Relation {
        relation: &'a Relation,
        parent: &'a str,
    },
    /// Rows returned by a data-modifying CTE.
    Mutation { cte: &'a str },
}

/// One entity subquery to emit.
pub(crate) struct Entity<'a> {
    pub class: ClassId,
    pub list: bool,
    pub link: Link<'a>,
    pub sel: &'a Selection,
    pub args: FieldArgs,
    pub path: String,
    pub depth: usize,
}

/// A relation deferred to a LATERAL join after the `FROM` clause.
struct Lateral<'a> {
    alias: String,
    entity: Entity<'a>,
}

/// Writes operations into a [`CompileContext`].
///
/// Holds only shared references, so one emitter may serve any number of
/// contexts.
pub struct QueryEmitter<'g> {
    pub(super) graph: &'g EntityGraph,
    pub(super) operators: &'g OperatorTable,
    pub(super) options: &'g CompileOptions,
}

impl<'g> QueryEmitter<'g> {
    pub fn new(
        graph: &'g EntityGraph,
        operators: &'g OperatorTable,
        options: &'g CompileOptions,
    ) -> Self {
        Self {
            graph,
            operators,
            options,
        }
    }

    pub(super) fn filters(&self) -> FilterCompiler<'g> {
        FilterCompiler::new(self.graph, self.operators)
    }

    /// Compile a query operation.
    pub fn emit_query(&self, cx: &mut CompileContext, op: &Operation) -> CompileResult<()> {
        let dialect = cx.dialect();
        cx.push(Token::Select).space();
        let mut object = JsonObjectWriter::open(cx, op.selections.len());

        for sel in &op.selections {
            object.next_pair(cx);
            let path = sel.response_name().to_string();
            json_key(cx, sel.response_name(), &path)?;

            if sel.name == TYPENAME {
                cx.raw(&dialect.quote_string(op.kind.root_type()));
                continue;
            }

            let root = self.root(sel, &path)?;
            let allowed = if root.list { LIST_ARGS } else { OBJECT_ROOT_ARGS };
            let args = FieldArgs::parse(sel, cx.variables(), allowed, &path)?;

            cx.raw("(");
            self.emit_entity(
                cx,
                Entity {
                    class: root.class,
                    list: root.list,
                    link: Link::Root,
                    sel,
                    args,
                    path,
                    depth: 1,
                },
            )?;
            cx.raw(")");
        }

        object.close(cx);
        cx.raw(" AS ").ident(ROOT_ALIAS);
        Ok(())
    }

    /// Resolve a top-level selection to its class.
    pub(super) fn root(&self, sel: &Selection, path: &str) -> CompileResult<RootField> {
        if let Some(root) = self.graph.root(&sel.name) {
            return Ok(root);
        }
        let kind = match self.graph.class(&sel.name) {
            Some(class) => CompileErrorKind::NotSelectable(class.name.clone()),
            None => CompileErrorKind::UnknownType(sel.name.clone()),
        };
        Err(CompileError::new(path, kind))
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// `SELECT <aggregate> AS "json" FROM (<rows>) AS "__sr_N"`
    pub(super) fn emit_entity(
        &self,
        cx: &mut CompileContext,
        entity: Entity<'_>,
    ) -> CompileResult<()> {
        if entity.depth > self.options.max_depth {
            return Err(CompileError::new(
                &entity.path,
                CompileErrorKind::DepthExceeded(self.options.max_depth),
            ));
        }
        let dialect = cx.dialect();
        if !entity.args.distinct.is_empty() && !dialect.supports_distinct_on() {
            return Err(CompileError::new(
                &entity.path,
                CompileErrorKind::Unsupported {
                    dialect: dialect.name(),
                    feature: "distinct".into(),
                },
            ));
        }

        let rows = cx.next_alias("__sr");
        cx.push(Token::Select).space();
        if entity.list {
            cx.push(Token::Coalesce)
                .raw("(")
                .raw(dialect.json_array_agg_fn())
                .raw("(")
                .column(&rows, JSON_COLUMN)
                .raw("), ")
                .raw(dialect.empty_json_array())
                .raw(")");
        } else {
            cx.column(&rows, JSON_COLUMN);
        }
        cx.raw(" AS ").ident(JSON_COLUMN).raw(" FROM (");
        self.emit_rows(cx, &entity)?;
        cx.raw(") AS ").ident(&rows);
        Ok(())
    }

    /// One JSON object per matching row.
    fn emit_rows(&self, cx: &mut CompileContext, entity: &Entity<'_>) -> CompileResult<()> {
        let class = self.graph.class_by_id(entity.class);
        let Some(table) = class.table.as_deref() else {
            return Err(CompileError::new(
                &entity.path,
                CompileErrorKind::NotSelectable(class.name.clone()),
            ));
        };
        let path = entity.path.as_str();

        let alias = cx.next_alias(table);
        let (relation, through) = match entity.link {
            Link::Relation { relation, .. } => (Some(relation), relation.through.as_ref()),
            _ => (None, None),
        };
        let recursive = relation.is_some_and(|r| r.kind == RelationKind::Recursive);
        let junction_alias = through.map(|_| cx.next_alias("__jt"));

        let mut source = RowSource::new(class, &alias);
        if let (Some(through), Some(junction)) = (through, junction_alias.as_deref()) {
            source.junction = Some(Junction {
                class: self.graph.class_by_id(through.class),
                alias: junction,
                extra_fields: &through.extra_fields,
            });
        }

        cx.push(Token::Select).space();
        if !entity.args.distinct.is_empty() {
            cx.push(Token::Distinct).space().push(Token::On).raw(" (");
            for (i, name) in entity.args.distinct.iter().enumerate() {
                if i > 0 {
                    cx.comma();
                }
                let at = join_path(path, "distinct");
                let (owner, field) = self.column_field(source, name, &at)?;
                cx.column(owner, &field.column);
            }
            cx.raw(") ");
        }

        let laterals = self.emit_object(cx, source, entity.sel, path, entity.depth)?;
        cx.raw(" AS ").ident(JSON_COLUMN).space().push(Token::From).space();

        match entity.link {
            Link::Root => {
                cx.qualified(class.schema.as_deref(), table);
            }
            Link::Mutation { cte } => {
                cx.ident(cte);
            }
            Link::Relation { relation, parent } if recursive => {
                cx.raw("(");
                self.emit_recursive(cx, class, table, relation, parent, entity.args.level, path)?;
                cx.raw(")");
            }
            Link::Relation { .. } => {
                cx.qualified(class.schema.as_deref(), table);
            }
        }
        cx.raw(" AS ").ident(&alias);

        if let (Some(relation), Some(through), Some(junction)) =
            (relation, through, junction_alias.as_deref())
        {
            emit_junction_join(cx, self.graph, relation, through, &alias, junction);
        }

        for lateral in laterals {
            cx.space()
                .push(Token::Left)
                .space()
                .push(Token::Outer)
                .space()
                .push(Token::Join)
                .space()
                .push(Token::Lateral)
                .raw(" (");
            self.emit_entity(cx, lateral.entity)?;
            cx.raw(") AS ")
                .ident(&lateral.alias)
                .space()
                .push(Token::On)
                .space()
                .push(Token::True);
        }

        // WHERE
        let mut first = true;
        if let Link::Relation { relation, parent } = entity.link {
            if !recursive {
                clause(cx, &mut first);
                let junction = junction_alias.as_deref();
                emit_link_condition(cx, self.graph, relation, &alias, junction, parent);
            }
        }
        if let Some(id) = &entity.args.id {
            let at = join_path(path, ID);
            let pk = class
                .primary_key_field()
                .ok_or_else(|| invalid(&at, format!("type '{}' has no primary key", class.name)))?;
            if id.is_object() || id.is_array() || !pk.scalar.accepts(id) {
                return Err(mismatch(&at, pk.scalar.name(), id));
            }
            clause(cx, &mut first);
            cx.column(&alias, &pk.column).raw(" = ").param(id.clone());
        }
        if let Some(filter) = &entity.args.filter {
            let map_empty = filter.as_object().is_some_and(|m| m.is_empty());
            if !map_empty {
                clause(cx, &mut first);
                cx.raw("(");
                self.filters().emit(cx, source, filter, &join_path(path, WHERE))?;
                cx.raw(")");
            }
        }

        self.emit_order_by(cx, source, &entity.args, path)?;

        let limit = if !entity.list {
            Some(1)
        } else {
            match (entity.args.limit, entity.link) {
                (Some(limit), _) => Some(limit),
                (None, Link::Mutation { .. }) => None,
                (None, _) => Some(self.options.default_limit).filter(|l| *l > 0),
            }
        };
        let pagination = cx.dialect().emit_limit_offset(limit, entity.args.offset);
        if !pagination.is_empty() {
            cx.space().tokens(&pagination);
        }
        Ok(())
    }

    /// The `json_build_object(...)` of one row. Relations needing a LATERAL
    /// join are returned for the caller to emit after `FROM`.
    fn emit_object<'a>(
        &self,
        cx: &mut CompileContext,
        source: RowSource<'a>,
        sel: &'a Selection,
        path: &str,
        depth: usize,
    ) -> CompileResult<Vec<Lateral<'a>>>
    where
        'g: 'a,
    {
        let dialect = cx.dialect();
        let mut laterals = Vec::new();

        let mut object = JsonObjectWriter::open(cx, sel.selections.len());
        for child in &sel.selections {
            object.next_pair(cx);
            let child_path = join_path(path, child.response_name());
            json_key(cx, child.response_name(), &child_path)?;

            if child.name == TYPENAME {
                cx.raw(&dialect.quote_string(&source.class.name));
                continue;
            }

            let (owner, field) = source
                .lookup(&child.name)
                .ok_or_else(|| source.unknown_field(&child.name, &child_path))?;

            let Some(rid) = field.relation else {
                if !child.arguments.is_empty() {
                    return Err(invalid(&child_path, "scalar fields take no arguments"));
                }
                cx.column(owner, &field.column);
                continue;
            };

            let relation: &'a Relation = self.graph.relation(rid);
            let allowed: &[&str] = match relation.kind {
                RelationKind::Recursive => RECURSIVE_ARGS,
                _ if relation.is_list() => LIST_ARGS,
                _ => &[],
            };
            let args = FieldArgs::parse(child, cx.variables(), allowed, &child_path)?;
            let entity = Entity {
                class: relation.target.class,
                list: relation.is_list(),
                link: Link::Relation {
                    relation,
                    parent: owner,
                },
                sel: child,
                args,
                path: child_path,
                depth: depth + 1,
            };

            if dialect.supports_lateral() {
                let alias = cx.next_alias("__sj");
                cx.column(&alias, JSON_COLUMN);
                laterals.push(Lateral { alias, entity });
            } else {
                cx.raw("(");
                self.emit_entity(cx, entity)?;
                cx.raw(")");
            }
        }
        object.close(cx);
        Ok(laterals)
    }

    /// `WITH RECURSIVE` walk from the row aliased `parent`.
    ///
    /// Descendants are seeded with the parent row itself at level 0 and the
    /// seed is dropped from the result; ancestors are seeded with the
    /// immediate parent at level 1. A positive `level` bounds the walk.
    #[allow(clippy::too_many_arguments)]
    fn emit_recursive(
        &self,
        cx: &mut CompileContext,
        class: &Class,
        table: &str,
        relation: &Relation,
        parent: &str,
        level: Option<u64>,
        path: &str,
    ) -> CompileResult<()> {
        let dialect = cx.dialect();
        if !dialect.supports_recursive_cte() {
            return Err(CompileError::new(
                path,
                CompileErrorKind::Unsupported {
                    dialect: dialect.name(),
                    feature: "recursive relations".into(),
                },
            ));
        }

        let source = self.graph.field(relation.source).column.as_str();
        let target = self.graph.field(relation.target).column.as_str();
        let descendants = relation.recursion != Some(Recursion::Ancestors);
        let schema = class.schema.as_deref();

        let cte = cx.next_alias("__rcte");
        let seed = cx.next_alias(table);
        let step = cx.next_alias(table);
        let prev = cx.next_alias("__rprev");

        let key = if descendants { source } else { target };
        let rendered = |alias: &str, column: &str| {
            format!(
                "{}.{}",
                dialect.quote_identifier(alias),
                dialect.quote_identifier(column)
            )
        };
        let guard = dialect.cycle_guard(
            &rendered(&seed, key),
            &rendered(&step, key),
            &rendered(&prev, PATH_COLUMN),
        );

        cx.push(Token::With)
            .space()
            .push(Token::Recursive)
            .space()
            .ident(&cte)
            .raw(" AS (");

        // Seed
        cx.push(Token::Select)
            .space()
            .ident(&seed)
            .raw(".*, ")
            .push(Token::LitInt(if descendants { 0 } else { 1 }))
            .raw(" AS ")
            .ident(LEVEL_COLUMN)
            .comma()
            .raw(&guard.seed)
            .raw(" AS ")
            .ident(PATH_COLUMN)
            .space()
            .push(Token::From)
            .space()
            .qualified(schema, table)
            .raw(" AS ")
            .ident(&seed)
            .space()
            .push(Token::Where)
            .space()
            .column(&seed, if descendants { source } else { target })
            .raw(" = ")
            .column(parent, source);

        cx.space().push(Token::UnionAll).space();

        // Step
        cx.push(Token::Select)
            .space()
            .ident(&step)
            .raw(".*, ")
            .column(&prev, LEVEL_COLUMN)
            .raw(" + 1, ")
            .raw(&guard.step)
            .space()
            .push(Token::From)
            .space()
            .qualified(schema, table)
            .raw(" AS ")
            .ident(&step)
            .space()
            .push(Token::Inner)
            .space()
            .push(Token::Join)
            .space()
            .ident(&cte)
            .raw(" AS ")
            .ident(&prev)
            .raw(" ON ")
            .column(&step, target)
            .raw(" = ")
            .column(&prev, source)
            .space()
            .push(Token::Where)
            .space()
            .raw(&guard.unvisited);
        if let Some(level) = level.filter(|l| *l > 0) {
            cx.space()
                .push(Token::And)
                .space()
                .column(&prev, LEVEL_COLUMN)
                .raw(" < ")
                .push(Token::LitInt(i64::try_from(level).unwrap_or(i64::MAX)));
        }
        cx.raw(") ");

        cx.push(Token::Select)
            .raw(" * ")
            .push(Token::From)
            .space()
            .ident(&cte);
        if descendants {
            cx.space()
                .push(Token::Where)
                .space()
                .ident(LEVEL_COLUMN)
                .raw(" > 0");
        }
        Ok(())
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    fn emit_order_by(
        &self,
        cx: &mut CompileContext,
        source: RowSource<'_>,
        args: &FieldArgs,
        path: &str,
    ) -> CompileResult<()> {
        // DISTINCT ON expressions must lead the ORDER BY.
        let distinct = args.distinct.iter().map(|field| SortSpec {
            field: field.clone(),
            direction: Direction::default(),
        });
        let keys: Vec<SortSpec> = distinct.chain(args.order_by.iter().cloned()).collect();
        if keys.is_empty() {
            return Ok(());
        }

        let dialect = cx.dialect();
        let at = join_path(path, ORDER_BY);
        cx.space().push(Token::OrderBy).space();
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                cx.comma();
            }
            let (owner, field) = self.column_field(source, &key.field, &at)?;
            let direction = key.direction;

            match direction.nulls {
                Some(nulls) if !dialect.supports_nulls_ordering() => {
                    // A leading IS NULL key stands in for NULLS FIRST/LAST.
                    cx.column(owner, &field.column)
                        .space()
                        .push(Token::IsNull)
                        .space()
                        .push(match nulls {
                            NullsOrder::First => Token::Desc,
                            NullsOrder::Last => Token::Asc,
                        })
                        .comma();
                    cx.column(owner, &field.column).space().push(direction_token(direction));
                }
                nulls => {
                    cx.column(owner, &field.column).space().push(direction_token(direction));
                    if let Some(nulls) = nulls {
                        cx.space().push(match nulls {
                            NullsOrder::First => Token::NullsFirst,
                            NullsOrder::Last => Token::NullsLast,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// A column-backed field; relations cannot be sorted or made distinct.
    fn column_field<'a>(
        &self,
        source: RowSource<'a>,
        name: &str,
        path: &str,
    ) -> CompileResult<(&'a str, &'a crate::graph::Field)> {
        let (owner, field) = source
            .lookup(name)
            .ok_or_else(|| source.unknown_field(name, path))?;
        if field.is_relation() {
            return Err(invalid(path, format!("'{}' is a relation, not a column", name)));
        }
        Ok((owner, field))
    }
}

fn direction_token(direction: Direction) -> Token {
    if direction.descending {
        Token::Desc
    } else {
        Token::Asc
    }
}

fn clause(cx: &mut CompileContext, first: &mut bool) {
    cx.space()
        .push(if *first { Token::Where } else { Token::And })
        .space();
    *first = false;
}

/// Writes the pairs of one JSON object, spreading them over several merged
/// calls when the dialect caps the arguments of a single call.
pub(super) struct JsonObjectWriter {
    per_call: usize,
    split: bool,
    written: usize,
}

impl JsonObjectWriter {
    pub(super) fn open(cx: &mut CompileContext, pairs: usize) -> Self {
        let dialect = cx.dialect();
        let per_call = dialect.json_object_max_pairs().unwrap_or(usize::MAX).max(1);
        let split = pairs > per_call;
        if split {
            cx.raw(dialect.json_object_merge().0);
        }
        cx.raw(dialect.json_object_fn()).raw("(");
        Self {
            per_call,
            split,
            written: 0,
        }
    }

    /// Call before writing each key.
    pub(super) fn next_pair(&mut self, cx: &mut CompileContext) {
        if self.written > 0 {
            if self.written % self.per_call == 0 {
                let dialect = cx.dialect();
                cx.raw(")")
                    .raw(dialect.json_object_merge().1)
                    .raw(dialect.json_object_fn())
                    .raw("(");
            } else {
                cx.comma();
            }
        }
        self.written += 1;
    }

    pub(super) fn close(self, cx: &mut CompileContext) {
        cx.raw(")");
        if self.split {
            let dialect = cx.dialect();
            cx.raw(dialect.json_object_merge().2);
        }
    }
}

/// Write `'key', ` for a JSON object entry.
pub(super) fn json_key(cx: &mut CompileContext, key: &str, path: &str) -> CompileResult<()> {
    cx.json_key(key)
        .map_err(|kind| CompileError::new(path, kind))?
        .comma();
    Ok(())
}
