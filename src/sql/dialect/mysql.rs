//! MySQL SQL dialect.
//!
//! MySQL differences from PostgreSQL:
//! - Backtick identifier quoting (`` `name` ``)
//! - `?` positional placeholders
//! - Boolean is TINYINT(1), so true is `1`
//! - `LIMIT offset, count` for pagination
//! - ON DUPLICATE KEY UPDATE for upserts
//! - No RETURNING clause (use LAST_INSERT_ID())
//! - No NULLS FIRST/LAST
//! - No DISTINCT ON, no ILIKE
//! - Nested relations use correlated subqueries rather than LATERAL

use super::helpers;
use super::{CycleGuard, SqlDialect, UpsertStyle};
use crate::sql::token::TokenStream;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn true_literal(&self) -> &'static str {
        "1"
    }

    fn placeholder(&self, index: usize) -> String {
        helpers::placeholder_question(index)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_mysql(limit, offset)
    }

    fn supports_lateral(&self) -> bool {
        false
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn supports_returning(&self) -> bool {
        // MySQL has no RETURNING, use LAST_INSERT_ID()
        false
    }

    fn json_object_fn(&self) -> &'static str {
        "JSON_OBJECT"
    }

    fn json_array_agg_fn(&self) -> &'static str {
        "JSON_ARRAYAGG"
    }

    fn empty_json_array(&self) -> &'static str {
        "JSON_ARRAY()"
    }

    fn cycle_guard(&self, seed_key: &str, step_key: &str, prev_path: &str) -> CycleGuard {
        CycleGuard {
            seed: format!("CAST(CONCAT(',', {}, ',') AS CHAR(10000))", seed_key),
            step: format!("CONCAT({}, {}, ',')", prev_path, step_key),
            unvisited: format!("LOCATE(CONCAT(',', {}, ','), {}) = 0", step_key, prev_path),
        }
    }

    fn json_has_key(&self, column: &str, placeholder: &str) -> String {
        format!(
            "JSON_CONTAINS_PATH({}, 'one', CONCAT('$.', {}))",
            column, placeholder
        )
    }

    fn upsert_style(&self) -> UpsertStyle {
        UpsertStyle::OnDuplicateKey
    }
}
