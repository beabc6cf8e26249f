//! Compile errors.

use crate::graph::ScalarType;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("unknown field '{field}' on type '{parent}'")]
    UnknownField { field: String, parent: String },

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{operator}' does not apply to {scalar} fields")]
    UnsupportedOperator { operator: String, scalar: ScalarType },

    #[error("{0} requires at least one condition")]
    EmptyBoolean(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("expected a {expected} value, got {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("unknown sort direction '{0}'")]
    UnknownDirection(String),

    #[error("variable '${0}' is not defined")]
    UnknownVariable(String),

    #[error("'{0}' is not a valid name")]
    InvalidName(String),

    #[error("type '{0}' has no table and cannot be selected")]
    NotSelectable(String),

    #[error("selection is nested deeper than {0} levels")]
    DepthExceeded(usize),

    #[error("{dialect} does not support {feature}")]
    Unsupported {
        dialect: &'static str,
        feature: String,
    },
}

/// A compile error attached to the response/argument path that caused it,
/// e.g. `posts.where.and`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}: {kind}")]
pub struct CompileError {
    pub path: String,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(path: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// `parent.child`, or `child` at the root.
pub(crate) fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

/// JSON type name of a value, for mismatch messages.
pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
