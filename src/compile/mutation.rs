//! Mutation emission.
//!
//! Each mutation root takes exactly one of `insert`, `update`, `upsert` or
//! `delete`, plus `where` for update and delete. Where data-modifying CTEs
//! exist, every root becomes `"__mut_N" AS (<dml> RETURNING *)` and the
//! selection is read back from it as JSON:
//!
//! ```text
//! WITH "__mut_1" AS (INSERT INTO "public"."users" ("name") VALUES ($1) RETURNING *)
//! SELECT json_build_object('users', (SELECT coalesce(json_agg(...)) ...)) AS "__root"
//! ```
//!
//! Elsewhere only a single root with no selection compiles, to the bare
//! statement.

use serde_json::{Map, Value};

use super::args::{invalid, mismatch, FieldArgs, DELETE, INSERT, MUTATION_ARGS, UPDATE, UPSERT};
use super::context::CompileContext;
use super::error::{join_path, CompileError, CompileErrorKind, CompileResult};
use super::filter::RowSource;
use super::operation::{Operation, Selection};
use super::query::{json_key, Entity, JsonObjectWriter, Link, ROOT_ALIAS, TYPENAME};
use crate::graph::{Class, Field, RootField};
use crate::sql::{SqlDialect, Token, UpsertStyle};

/// A resolved mutation root.
struct MutationRoot<'a> {
    sel: &'a Selection,
    root: RootField,
    args: FieldArgs,
    path: String,
}

impl<'g> super::QueryEmitter<'g> {
    /// Compile a mutation operation.
    pub fn emit_mutation(&self, cx: &mut CompileContext, op: &Operation) -> CompileResult<()> {
        let dialect = cx.dialect();
        let mut roots = Vec::new();
        for sel in op.selections.iter().filter(|s| s.name != TYPENAME) {
            let path = sel.response_name().to_string();
            let root = self.root(sel, &path)?;
            let args = FieldArgs::parse(sel, cx.variables(), MUTATION_ARGS, &path)?;
            roots.push(MutationRoot {
                sel,
                root,
                args,
                path,
            });
        }
        if roots.is_empty() {
            return Err(invalid("", "a mutation needs at least one field"));
        }

        if !dialect.supports_data_modifying_cte() || !dialect.supports_returning() {
            let unsupported = || {
                CompileError::new(
                    "",
                    CompileErrorKind::Unsupported {
                        dialect: dialect.name(),
                        feature: "returning mutation results".into(),
                    },
                )
            };
            let [single] = roots.as_slice() else {
                return Err(unsupported());
            };
            if op.selections.len() != 1 || !single.sel.selections.is_empty() {
                return Err(unsupported());
            }
            let class = self.graph.class_by_id(single.root.class);
            return self.emit_statement(cx, class, &single.args, &single.path);
        }

        cx.push(Token::With).space();
        let mut ctes = Vec::with_capacity(roots.len());
        for (i, root) in roots.iter().enumerate() {
            if i > 0 {
                cx.comma();
            }
            let cte = cx.next_alias("__mut");
            cx.ident(&cte).raw(" AS (");
            let class = self.graph.class_by_id(root.root.class);
            self.emit_statement(cx, class, &root.args, &root.path)?;
            cx.space().push(Token::Returning).raw(" *)");
            ctes.push(cte);
        }

        cx.space().push(Token::Select).space();
        let mut object = JsonObjectWriter::open(cx, op.selections.len());
        let mut results = roots.into_iter().zip(ctes.iter());
        for sel in &op.selections {
            object.next_pair(cx);
            let path = sel.response_name().to_string();
            json_key(cx, sel.response_name(), &path)?;
            if sel.name == TYPENAME {
                cx.raw(&dialect.quote_string(op.kind.root_type()));
                continue;
            }
            let Some((root, cte)) = results.next() else {
                break;
            };
            cx.raw("(");
            self.emit_entity(
                cx,
                Entity {
                    class: root.root.class,
                    list: root.root.list,
                    link: Link::Mutation { cte },
                    sel: root.sel,
                    args: FieldArgs::default(),
                    path: root.path,
                    depth: 1,
                },
            )?;
            cx.raw(")");
        }
        object.close(cx);
        cx.raw(" AS ").ident(ROOT_ALIAS);
        Ok(())
    }

    /// The bare INSERT/UPDATE/DELETE for one root.
    fn emit_statement(
        &self,
        cx: &mut CompileContext,
        class: &Class,
        args: &FieldArgs,
        path: &str,
    ) -> CompileResult<()> {
        let Some(table) = class.table.as_deref() else {
            return Err(CompileError::new(
                path,
                CompileErrorKind::NotSelectable(class.name.clone()),
            ));
        };

        let chosen = [
            args.insert.is_some(),
            args.update.is_some(),
            args.upsert.is_some(),
            args.delete,
        ]
        .iter()
        .filter(|b| **b)
        .count();
        if chosen != 1 {
            return Err(invalid(
                path,
                "exactly one of insert, update, upsert or delete is required",
            ));
        }
        if args.filter.is_some() && (args.insert.is_some() || args.upsert.is_some()) {
            return Err(invalid(path, "where applies to update and delete only"));
        }

        if let Some(rows) = &args.insert {
            return self.emit_insert(cx, class, table, rows, false, &join_path(path, INSERT));
        }
        if let Some(rows) = &args.upsert {
            return self.emit_insert(cx, class, table, rows, true, &join_path(path, UPSERT));
        }
        if let Some(set) = &args.update {
            let at = join_path(path, UPDATE);
            let Value::Object(set) = set else {
                return Err(mismatch(&at, "object", set));
            };
            if set.is_empty() {
                return Err(invalid(&at, "nothing to update"));
            }
            cx.push(Token::Update)
                .space()
                .qualified(class.schema.as_deref(), table)
                .space()
                .push(Token::Set)
                .space();
            for (i, (name, value)) in set.iter().enumerate() {
                if i > 0 {
                    cx.comma();
                }
                let field = writable_field(class, name, &at)?;
                check_value(field, value, &join_path(&at, name))?;
                cx.ident(&field.column).raw(" = ").param(value.clone());
            }
            return self.emit_required_where(cx, class, table, args, path, UPDATE);
        }

        cx.push(Token::Delete)
            .space()
            .push(Token::From)
            .space()
            .qualified(class.schema.as_deref(), table);
        self.emit_required_where(cx, class, table, args, path, DELETE)
    }

    fn emit_required_where(
        &self,
        cx: &mut CompileContext,
        class: &Class,
        table: &str,
        args: &FieldArgs,
        path: &str,
        action: &str,
    ) -> CompileResult<()> {
        let Some(filter) = &args.filter else {
            return Err(invalid(path, format!("{} requires a where argument", action)));
        };
        cx.space().push(Token::Where).space();
        self.filters()
            .emit(cx, RowSource::new(class, table), filter, &join_path(path, "where"))
    }

    fn emit_insert(
        &self,
        cx: &mut CompileContext,
        class: &Class,
        table: &str,
        rows: &Value,
        upsert: bool,
        path: &str,
    ) -> CompileResult<()> {
        let rows: Vec<&Map<String, Value>> = match rows {
            Value::Object(row) => vec![row],
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_object().ok_or_else(|| mismatch(path, "object", item)))
                .collect::<CompileResult<_>>()?,
            Value::Array(_) => return Err(invalid(path, "nothing to insert")),
            other => return Err(mismatch(path, "object or list", other)),
        };

        // Columns in order of first appearance across rows.
        let mut columns: Vec<&Field> = Vec::new();
        for row in &rows {
            for name in row.keys() {
                let field = writable_field(class, name, path)?;
                if !columns.iter().any(|c| std::ptr::eq(*c, field)) {
                    columns.push(field);
                }
            }
        }
        if columns.is_empty() {
            return Err(invalid(path, "nothing to insert"));
        }

        cx.push(Token::Insert)
            .space()
            .push(Token::Into)
            .space()
            .qualified(class.schema.as_deref(), table)
            .raw(" (");
        for (i, field) in columns.iter().enumerate() {
            if i > 0 {
                cx.comma();
            }
            cx.ident(&field.column);
        }
        cx.raw(") ").push(Token::Values).space();

        for (r, row) in rows.iter().enumerate() {
            if r > 0 {
                cx.comma();
            }
            cx.raw("(");
            for (i, field) in columns.iter().enumerate() {
                if i > 0 {
                    cx.comma();
                }
                let value = row
                    .iter()
                    .find(|(name, _)| class.field(name).is_some_and(|f| std::ptr::eq(f, *field)))
                    .map(|(_, v)| v);
                match value {
                    Some(value) => {
                        check_value(field, value, &join_path(path, &field.name))?;
                        cx.param(value.clone());
                    }
                    None => {
                        cx.push(Token::Default);
                    }
                }
            }
            cx.raw(")");
        }

        if upsert {
            self.emit_conflict(cx, class, &columns, path)?;
        }
        Ok(())
    }

    fn emit_conflict(
        &self,
        cx: &mut CompileContext,
        class: &Class,
        columns: &[&Field],
        path: &str,
    ) -> CompileResult<()> {
        let keys: Vec<&Field> = class
            .primary_keys
            .iter()
            .filter_map(|pk| class.field(pk))
            .collect();
        if keys.is_empty() {
            return Err(invalid(
                path,
                format!("upsert needs a primary key on '{}'", class.name),
            ));
        }
        let updates: Vec<&Field> = columns
            .iter()
            .copied()
            .filter(|c| !keys.iter().any(|k| std::ptr::eq(*k, *c)))
            .collect();

        match cx.dialect().upsert_style() {
            UpsertStyle::OnConflict => {
                cx.space()
                    .push(Token::On)
                    .space()
                    .push(Token::Conflict)
                    .raw(" (");
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        cx.comma();
                    }
                    cx.ident(&key.column);
                }
                cx.raw(") ").push(Token::Do).space();
                if updates.is_empty() {
                    cx.push(Token::Nothing);
                    return Ok(());
                }
                cx.push(Token::Update).space().push(Token::Set).space();
                for (i, field) in updates.iter().enumerate() {
                    if i > 0 {
                        cx.comma();
                    }
                    cx.ident(&field.column)
                        .raw(" = ")
                        .push(Token::Excluded)
                        .raw(".")
                        .ident(&field.column);
                }
            }
            UpsertStyle::OnDuplicateKey => {
                cx.space().push(Token::DuplicateKeyUpdate).space();
                if updates.is_empty() {
                    // No-op assignment keeps the statement valid.
                    let key = &keys[0].column;
                    cx.ident(key).raw(" = ").ident(key);
                    return Ok(());
                }
                for (i, field) in updates.iter().enumerate() {
                    if i > 0 {
                        cx.comma();
                    }
                    cx.ident(&field.column)
                        .raw(" = ")
                        .push(Token::Values)
                        .raw("(")
                        .ident(&field.column)
                        .raw(")");
                }
            }
        }
        Ok(())
    }
}

/// A column-backed field a mutation may write.
fn writable_field<'c>(class: &'c Class, name: &str, path: &str) -> CompileResult<&'c Field> {
    let field = class.field(name).ok_or_else(|| {
        CompileError::new(
            join_path(path, name),
            CompileErrorKind::UnknownField {
                field: name.to_string(),
                parent: class.name.clone(),
            },
        )
    })?;
    if field.is_relation() || field.column.is_empty() {
        return Err(invalid(
            &join_path(path, name),
            format!("'{}' is not a writable column", name),
        ));
    }
    Ok(field)
}

fn check_value(field: &Field, value: &Value, path: &str) -> CompileResult<()> {
    if value.is_null() && !field.nullable {
        return Err(invalid(path, format!("'{}' cannot be null", field.name)));
    }
    if !field.scalar.accepts(value) {
        return Err(mismatch(path, field.scalar.name(), value));
    }
    Ok(())
}
