//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Numbered placeholders (`$1`, `$2`, ...)
//! - Native boolean literals
//! - LATERAL joins
//! - RETURNING clause, also inside data-modifying CTEs
//! - ON CONFLICT for upserts
//! - DISTINCT ON
//! - ILIKE and the `?` JSON key-existence operator

use super::helpers;
use super::{SqlDialect, UpsertStyle};

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn true_literal(&self) -> &'static str {
        "true"
    }

    fn placeholder(&self, index: usize) -> String {
        helpers::placeholder_numbered(index)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn supports_distinct_on(&self) -> bool {
        true
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn supports_data_modifying_cte(&self) -> bool {
        true
    }

    fn json_object_fn(&self) -> &'static str {
        "json_build_object"
    }

    fn json_array_agg_fn(&self) -> &'static str {
        "json_agg"
    }

    fn empty_json_array(&self) -> &'static str {
        "'[]'::json"
    }

    fn json_object_max_pairs(&self) -> Option<usize> {
        Some(50)
    }

    fn json_object_merge(&self) -> (&'static str, &'static str, &'static str) {
        ("(", "::jsonb || ", "::jsonb)::json")
    }

    fn json_value(&self, expr: &str) -> String {
        format!("{}::jsonb", expr)
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::OnConflict
    }
}
