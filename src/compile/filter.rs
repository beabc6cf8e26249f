//! Filter compilation.
//!
//! A filter is a JSON object. Each key is either a boolean combinator
//! (`and`, `or`, `not`) or a field name mapping to `{operator: operand}`;
//! several keys in one object are AND-ed. A relation field takes a nested
//! filter over the related class and compiles to `EXISTS (...)`.
//!
//! Every operand is bound as a parameter; identifiers come from the graph.

use serde_json::{Map, Value};

use super::args::{invalid, mismatch};
use super::context::CompileContext;
use super::error::{join_path, CompileError, CompileErrorKind, CompileResult};
use super::operators::{Operand, Operator, OperatorTable};
use crate::graph::{Class, EntityGraph, Field, Relation, RelationId, ScalarType, Through};
use crate::sql::{Dialect, SqlDialect, Token};

/// A class bound to an alias in the current `FROM` clause.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowSource<'a> {
    pub class: &'a Class,
    pub alias: &'a str,
    pub junction: Option<Junction<'a>>,
}

/// The junction table joined in for a many-to-many relation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Junction<'a> {
    pub class: &'a Class,
    pub alias: &'a str,
    pub extra_fields: &'a [String],
}

impl<'a> RowSource<'a> {
    pub fn new(class: &'a Class, alias: &'a str) -> Self {
        Self {
            class,
            alias,
            junction: None,
        }
    }

    /// Resolve a field name to the alias owning its column.
    ///
    /// Junction fields are visible only when listed as extra fields.
    pub fn lookup(&self, name: &str) -> Option<(&'a str, &'a Field)> {
        if let Some(field) = self.class.field(name) {
            return Some((self.alias, field));
        }
        let junction = self.junction?;
        let field = junction.class.field(name)?;
        junction
            .extra_fields
            .iter()
            .any(|e| *e == field.name || *e == field.column)
            .then_some((junction.alias, field))
    }

    pub fn unknown_field(&self, name: &str, path: &str) -> CompileError {
        CompileError::new(
            path,
            CompileErrorKind::UnknownField {
                field: name.to_string(),
                parent: self.class.name.clone(),
            },
        )
    }
}

// ============================================================================
// Relation joins
// ============================================================================

/// `INNER JOIN <junction> AS <junction_alias> ON junction.target_key = child.target_col`
pub(crate) fn emit_junction_join(
    cx: &mut CompileContext,
    graph: &EntityGraph,
    relation: &Relation,
    through: &Through,
    child: &str,
    junction: &str,
) {
    let target = &graph.field(relation.target).column;
    cx.raw(" ")
        .push(Token::Inner)
        .raw(" ")
        .push(Token::Join)
        .space()
        .qualified(through.schema.as_deref(), &through.table)
        .raw(" AS ")
        .ident(junction)
        .raw(" ON ")
        .column(junction, &through.target_key)
        .raw(" = ")
        .column(child, target);
}

/// Condition tying rows of the relation's target to one parent row.
pub(crate) fn emit_link_condition(
    cx: &mut CompileContext,
    graph: &EntityGraph,
    relation: &Relation,
    child: &str,
    junction: Option<&str>,
    parent: &str,
) {
    let source = &graph.field(relation.source).column;
    match (&relation.through, junction) {
        (Some(through), Some(junction)) => {
            cx.column(junction, &through.source_key);
        }
        _ => {
            cx.column(child, &graph.field(relation.target).column);
        }
    }
    cx.raw(" = ").column(parent, source);
}

// ============================================================================
// Filters
// ============================================================================

pub(crate) struct FilterCompiler<'g> {
    graph: &'g EntityGraph,
    operators: &'g OperatorTable,
}

impl<'g> FilterCompiler<'g> {
    pub fn new(graph: &'g EntityGraph, operators: &'g OperatorTable) -> Self {
        Self { graph, operators }
    }

    /// Write the condition for `filter` over `source`.
    pub fn emit(
        &self,
        cx: &mut CompileContext,
        source: RowSource<'_>,
        filter: &Value,
        path: &str,
    ) -> CompileResult<()> {
        match filter {
            Value::Object(map) => self.emit_object(cx, source, map, path),
            other => Err(mismatch(path, "object", other)),
        }
    }

    fn emit_object(
        &self,
        cx: &mut CompileContext,
        source: RowSource<'_>,
        map: &Map<String, Value>,
        path: &str,
    ) -> CompileResult<()> {
        if map.is_empty() {
            cx.push(Token::True);
            return Ok(());
        }

        let wrap = map.len() > 1;
        for (i, (key, value)) in map.iter().enumerate() {
            if i > 0 {
                cx.raw(" AND ");
            }
            if wrap {
                cx.raw("(");
            }
            self.emit_term(cx, source, key, value, &join_path(path, key))?;
            if wrap {
                cx.raw(")");
            }
        }
        Ok(())
    }

    fn emit_term(
        &self,
        cx: &mut CompileContext,
        source: RowSource<'_>,
        key: &str,
        value: &Value,
        path: &str,
    ) -> CompileResult<()> {
        match key {
            "and" | "_and" => self.emit_boolean(cx, source, value, Token::And, "AND", path),
            "or" | "_or" => self.emit_boolean(cx, source, value, Token::Or, "OR", path),
            "not" | "_not" => {
                cx.push(Token::Not).raw(" (");
                self.emit(cx, source, value, path)?;
                cx.raw(")");
                Ok(())
            }
            name => self.emit_field(cx, source, name, value, path),
        }
    }

    fn emit_boolean(
        &self,
        cx: &mut CompileContext,
        source: RowSource<'_>,
        value: &Value,
        joiner: Token,
        label: &'static str,
        path: &str,
    ) -> CompileResult<()> {
        let items = match value {
            Value::Array(items) => items.as_slice(),
            Value::Object(_) => std::slice::from_ref(value),
            other => return Err(mismatch(path, "list", other)),
        };
        if items.is_empty() {
            return Err(CompileError::new(path, CompileErrorKind::EmptyBoolean(label)));
        }

        cx.raw("(");
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                cx.space().push(joiner.clone()).space();
            }
            cx.raw("(");
            self.emit(cx, source, item, &join_path(path, &i.to_string()))?;
            cx.raw(")");
        }
        cx.raw(")");
        Ok(())
    }

    fn emit_field(
        &self,
        cx: &mut CompileContext,
        source: RowSource<'_>,
        name: &str,
        value: &Value,
        path: &str,
    ) -> CompileResult<()> {
        let (alias, field) = source
            .lookup(name)
            .ok_or_else(|| source.unknown_field(name, path))?;

        if let Some(relation) = field.relation {
            return self.emit_exists(cx, alias, relation, value, path);
        }

        let ops = match value {
            Value::Object(ops) if !ops.is_empty() => ops,
            Value::Object(_) => return Err(invalid(path, "expected at least one operator")),
            other => return Err(mismatch(path, "object", other)),
        };

        let wrap = ops.len() > 1;
        for (i, (op, operand)) in ops.iter().enumerate() {
            if i > 0 {
                cx.raw(" AND ");
            }
            if wrap {
                cx.raw("(");
            }
            self.emit_comparison(cx, alias, field, op, operand, &join_path(path, op))?;
            if wrap {
                cx.raw(")");
            }
        }
        Ok(())
    }

    fn emit_comparison(
        &self,
        cx: &mut CompileContext,
        alias: &str,
        field: &Field,
        name: &str,
        operand: &Value,
        path: &str,
    ) -> CompileResult<()> {
        let spec = self.operators.get(name).ok_or_else(|| {
            CompileError::new(path, CompileErrorKind::UnknownOperator(name.to_string()))
        })?;
        if !spec.applies_to(field.scalar) {
            return Err(CompileError::new(
                path,
                CompileErrorKind::UnsupportedOperator {
                    operator: name.to_string(),
                    scalar: field.scalar,
                },
            ));
        }

        match spec.operand {
            Operand::Value => {
                if operand.is_null() {
                    return Err(invalid(path, "use is_null to compare with null"));
                }
                if spec.operator == Operator::HasKey {
                    if !operand.is_string() {
                        return Err(mismatch(path, "string", operand));
                    }
                    let dialect = cx.dialect();
                    let column = qualified_column(dialect, alias, field);
                    let placeholder = cx.bind(operand.clone());
                    cx.raw(&dialect.json_has_key(&column, &placeholder));
                    return Ok(());
                }
                check_scalar(field, operand, path)?;
                if let Some(token) = spec.comparison() {
                    emit_operand_column(cx, alias, field);
                    cx.space().push(token).space();
                    emit_operand_param(cx, field, operand.clone());
                }
            }
            Operand::List => {
                let Value::Array(items) = operand else {
                    return Err(mismatch(path, "list", operand));
                };
                for item in items {
                    if item.is_null() {
                        return Err(invalid(path, "lists cannot contain null"));
                    }
                    check_scalar(field, item, path)?;
                }
                let negated = spec.operator == Operator::NotIn;
                if items.is_empty() {
                    // Nothing is in an empty list.
                    cx.raw(if negated { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }
                emit_operand_column(cx, alias, field);
                cx.space();
                if negated {
                    cx.push(Token::Not).space();
                }
                cx.push(Token::In).raw(" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        cx.comma();
                    }
                    emit_operand_param(cx, field, item.clone());
                }
                cx.raw(")");
            }
            Operand::Flag => {
                let Value::Bool(is_null) = operand else {
                    return Err(mismatch(path, "boolean", operand));
                };
                cx.column(alias, &field.column).space().push(if *is_null {
                    Token::IsNull
                } else {
                    Token::IsNotNull
                });
            }
        }
        Ok(())
    }

    /// `EXISTS (SELECT 1 FROM <target> WHERE <link> AND (<nested>))`
    fn emit_exists(
        &self,
        cx: &mut CompileContext,
        parent: &str,
        relation: RelationId,
        value: &Value,
        path: &str,
    ) -> CompileResult<()> {
        let relation = self.graph.relation(relation);
        let target = self.graph.class_by_id(relation.target.class);
        let Some(table) = target.table.as_deref() else {
            return Err(CompileError::new(
                path,
                CompileErrorKind::NotSelectable(target.name.clone()),
            ));
        };

        let alias = cx.next_alias(table);
        let through = relation.through.as_ref();
        let junction_alias = through.map(|_| cx.next_alias("__jt"));

        cx.raw("EXISTS (")
            .push(Token::Select)
            .raw(" 1 ")
            .push(Token::From)
            .space()
            .qualified(target.schema.as_deref(), table)
            .raw(" AS ")
            .ident(&alias);

        let mut source = RowSource::new(target, &alias);
        if let (Some(through), Some(junction)) = (through, junction_alias.as_deref()) {
            emit_junction_join(cx, self.graph, relation, through, &alias, junction);
            source.junction = Some(Junction {
                class: self.graph.class_by_id(through.class),
                alias: junction,
                extra_fields: &through.extra_fields,
            });
        }

        cx.raw(" WHERE ");
        emit_link_condition(cx, self.graph, relation, &alias, junction_alias.as_deref(), parent);
        cx.raw(" AND (");
        self.emit(cx, source, value, path)?;
        cx.raw("))");
        Ok(())
    }
}

fn qualified_column(dialect: Dialect, alias: &str, field: &Field) -> String {
    format!(
        "{}.{}",
        dialect.quote_identifier(alias),
        dialect.quote_identifier(&field.column)
    )
}

/// Left side of a comparison. JSON columns compare as documents.
fn emit_operand_column(cx: &mut CompileContext, alias: &str, field: &Field) {
    if field.scalar == ScalarType::Json {
        let dialect = cx.dialect();
        let column = dialect.json_value(&qualified_column(dialect, alias, field));
        cx.raw(&column);
    } else {
        cx.column(alias, &field.column);
    }
}

fn emit_operand_param(cx: &mut CompileContext, field: &Field, value: Value) {
    if field.scalar == ScalarType::Json {
        let placeholder = cx.bind(value);
        let cast = cx.dialect().json_value(&placeholder);
        cx.raw(&cast);
    } else {
        cx.param(value);
    }
}

fn check_scalar(field: &Field, value: &Value, path: &str) -> CompileResult<()> {
    if field.scalar.accepts(value) {
        Ok(())
    } else {
        Err(mismatch(path, field.scalar.name(), value))
    }
}
