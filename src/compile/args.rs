//! Field arguments.
//!
//! Arguments are resolved against the variables first, so everything below
//! works on plain JSON values.

use serde_json::Value;

use super::error::{join_path, json_type, CompileError, CompileErrorKind, CompileResult};
use super::operation::{Selection, Variables};

pub(crate) const WHERE: &str = "where";
pub(crate) const ORDER_BY: &str = "order_by";
pub(crate) const LIMIT: &str = "limit";
pub(crate) const OFFSET: &str = "offset";
pub(crate) const DISTINCT: &str = "distinct";
pub(crate) const ID: &str = "id";
pub(crate) const LEVEL: &str = "level";
pub(crate) const INSERT: &str = "insert";
pub(crate) const UPDATE: &str = "update";
pub(crate) const UPSERT: &str = "upsert";
pub(crate) const DELETE: &str = "delete";

/// Arguments of a list-valued field.
pub(crate) const LIST_ARGS: &[&str] = &[WHERE, ORDER_BY, LIMIT, OFFSET, DISTINCT];
/// Arguments of a mutation root.
pub(crate) const MUTATION_ARGS: &[&str] = &[INSERT, UPDATE, UPSERT, DELETE, WHERE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// A sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Direction {
    pub descending: bool,
    pub nulls: Option<NullsOrder>,
}

impl Direction {
    /// `asc`, `desc`, `asc_nulls_first`, `asc_nulls_last`,
    /// `desc_nulls_first` or `desc_nulls_last`, in any case.
    pub fn parse(s: &str) -> Option<Self> {
        let (descending, nulls) = match s.to_ascii_lowercase().as_str() {
            "asc" => (false, None),
            "desc" => (true, None),
            "asc_nulls_first" => (false, Some(NullsOrder::First)),
            "asc_nulls_last" => (false, Some(NullsOrder::Last)),
            "desc_nulls_first" => (true, Some(NullsOrder::First)),
            "desc_nulls_last" => (true, Some(NullsOrder::Last)),
            _ => return None,
        };
        Some(Self { descending, nulls })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SortSpec {
    pub field: String,
    pub direction: Direction,
}

/// Parsed arguments of one selection.
#[derive(Debug, Default)]
pub(crate) struct FieldArgs {
    pub filter: Option<Value>,
    pub order_by: Vec<SortSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: Vec<String>,
    pub id: Option<Value>,
    pub level: Option<u64>,
    pub insert: Option<Value>,
    pub update: Option<Value>,
    pub upsert: Option<Value>,
    pub delete: bool,
}

impl FieldArgs {
    /// Resolve and parse the arguments of `sel`, rejecting any not in `allowed`.
    pub fn parse(
        sel: &Selection,
        variables: &Variables,
        allowed: &[&str],
        path: &str,
    ) -> CompileResult<Self> {
        let mut args = FieldArgs::default();

        for (name, input) in &sel.arguments {
            let at = join_path(path, name);
            if !allowed.contains(&name.as_str()) {
                return Err(invalid(&at, format!("unknown argument '{}'", name)));
            }
            let value = input
                .resolve(variables)
                .map_err(|var| CompileError::new(&at, CompileErrorKind::UnknownVariable(var)))?;
            if value.is_null() {
                continue;
            }

            match name.as_str() {
                WHERE => {
                    if !value.is_object() {
                        return Err(mismatch(&at, "object", &value));
                    }
                    args.filter = Some(value);
                }
                ORDER_BY => args.order_by = parse_order_by(&value, &at)?,
                LIMIT => args.limit = Some(parse_count(&value, &at)?),
                OFFSET => args.offset = Some(parse_count(&value, &at)?),
                LEVEL => args.level = Some(parse_count(&value, &at)?),
                DISTINCT => args.distinct = parse_names(&value, &at)?,
                ID => args.id = Some(value),
                INSERT => args.insert = Some(value),
                UPDATE => args.update = Some(value),
                UPSERT => args.upsert = Some(value),
                DELETE => match value {
                    Value::Bool(b) => args.delete = b,
                    other => return Err(mismatch(&at, "boolean", &other)),
                },
                _ => return Err(invalid(&at, format!("unknown argument '{}'", name))),
            }
        }

        Ok(args)
    }
}

fn parse_count(value: &Value, path: &str) -> CompileResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| invalid(path, format!("expected a non-negative integer, got {}", value)))
}

fn parse_names(value: &Value, path: &str) -> CompileResult<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| mismatch(path, "string", v))
            })
            .collect(),
        other => Err(mismatch(path, "string or list", other)),
    }
}

/// Accepts `{"title": "asc", "id": "desc"}`, a list of such objects,
/// a list of `{"field": .., "direction": ..}`, or a bare field name.
fn parse_order_by(value: &Value, path: &str) -> CompileResult<Vec<SortSpec>> {
    let mut specs = Vec::new();
    match value {
        Value::String(field) => specs.push(SortSpec {
            field: field.clone(),
            direction: Direction::default(),
        }),
        Value::Object(_) => push_sort_object(value, path, &mut specs)?,
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(field) => specs.push(SortSpec {
                        field: field.clone(),
                        direction: Direction::default(),
                    }),
                    Value::Object(_) => push_sort_object(item, path, &mut specs)?,
                    other => return Err(mismatch(path, "object", other)),
                }
            }
        }
        other => return Err(mismatch(path, "object or list", other)),
    }
    Ok(specs)
}

fn push_sort_object(value: &Value, path: &str, specs: &mut Vec<SortSpec>) -> CompileResult<()> {
    let Value::Object(map) = value else {
        return Err(mismatch(path, "object", value));
    };

    if let Some(field) = map.get("field") {
        let field = field.as_str().ok_or_else(|| mismatch(path, "string", field))?;
        let direction = match map.get("direction") {
            Some(d) => direction(d, path)?,
            None => Direction::default(),
        };
        specs.push(SortSpec {
            field: field.to_string(),
            direction,
        });
        return Ok(());
    }

    for (field, dir) in map {
        specs.push(SortSpec {
            field: field.clone(),
            direction: direction(dir, &join_path(path, field))?,
        });
    }
    Ok(())
}

fn direction(value: &Value, path: &str) -> CompileResult<Direction> {
    let s = value.as_str().ok_or_else(|| mismatch(path, "string", value))?;
    Direction::parse(s)
        .ok_or_else(|| CompileError::new(path, CompileErrorKind::UnknownDirection(s.to_string())))
}

pub(crate) fn invalid(path: &str, message: impl Into<String>) -> CompileError {
    CompileError::new(path, CompileErrorKind::InvalidArgument(message.into()))
}

pub(crate) fn mismatch(path: &str, expected: &str, found: &Value) -> CompileError {
    CompileError::new(
        path,
        CompileErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: json_type(found).to_string(),
        },
    )
}
