//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (PostgreSQL), `` ` `` (MySQL)
//! - Placeholders: `$1, $2, ...` vs `?`
//! - Pagination: `LIMIT n OFFSET m` vs `LIMIT m, n`
//! - JSON construction: `json_build_object`/`json_agg` vs `JSON_OBJECT`/`JSON_ARRAYAGG`
//!   (PostgreSQL caps a function call at 100 arguments)
//! - RETURNING, LATERAL, DISTINCT ON, NULLS FIRST/LAST support
//!
//! # Usage
//!
//! ```ignore
//! use tablegraph::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! let ph = dialect.placeholder(1);                // $1
//! ```
//!
//! # Minimum Version Requirements
//!
//! | Feature | PostgreSQL | MySQL |
//! |---------|-----------|-------|
//! | Recursive CTE | 8.4+ | 8.0+ |
//! | LATERAL | 9.3+ | 8.0.14+ (unused) |
//! | Outer references in derived tables | ✓ | 8.0.14+ |
//! | RETURNING | 8.2+ | ❌ |
//! | Data-modifying CTE | 9.1+ | ❌ |
//! | NULLS FIRST/LAST | 8.3+ | ❌ |
//! | DISTINCT ON | ✓ | ❌ |
//!
//! The introspection loaders refuse servers below PostgreSQL 10 and MySQL 8.0.14.

pub mod helpers;
mod mysql;
mod postgres;

pub use mysql::MySql;
pub use postgres::Postgres;

use serde::{Deserialize, Serialize};

use super::token::TokenStream;
use crate::compile::{CompileContext, CompileResult, Operation, QueryEmitter};

/// How a dialect spells "insert, or update on key conflict".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// `ON CONFLICT (keys) DO UPDATE SET col = EXCLUDED.col`
    OnConflict,
    /// `ON DUPLICATE KEY UPDATE col = VALUES(col)`
    OnDuplicateKey,
}

/// How a recursive walk remembers the keys it has already visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleGuard {
    /// Path value of the seed row.
    pub seed: String,
    /// Path value of a step row.
    pub step: String,
    /// Condition holding while the step row is not yet on the path.
    pub unvisited: String,
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations are stateless and shared across concurrent compilations.
pub trait SqlDialect: std::fmt::Debug + Send + Sync {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// - PostgreSQL: `"identifier"`
    /// - MySQL: `` `identifier` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// Only used for compiler-controlled text (JSON keys, type names).
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Literal for an always-true condition (`ON true`, an empty filter).
    fn true_literal(&self) -> &'static str;

    /// Placeholder for the `index`-th bound parameter (1-based).
    fn placeholder(&self, index: usize) -> String;

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Whether this dialect supports RETURNING clause.
    fn supports_returning(&self) -> bool {
        true
    }

    /// Whether INSERT/UPDATE/DELETE ... RETURNING may appear inside a WITH clause.
    fn supports_data_modifying_cte(&self) -> bool {
        false
    }

    /// Whether this dialect supports WITH RECURSIVE.
    fn supports_recursive_cte(&self) -> bool {
        true
    }

    /// Visited-key path of a recursive walk, given the rendered key columns
    /// of the seed and step rows and the previous row's path column.
    fn cycle_guard(&self, seed_key: &str, step_key: &str, prev_path: &str) -> CycleGuard {
        CycleGuard {
            seed: format!("ARRAY[{}]", seed_key),
            step: format!("{} || {}", prev_path, step_key),
            unvisited: format!("NOT ({} = ANY({}))", step_key, prev_path),
        }
    }

    /// Whether nested relations are emitted as LATERAL joins.
    fn supports_lateral(&self) -> bool {
        true
    }

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    /// Whether this dialect supports DISTINCT ON.
    fn supports_distinct_on(&self) -> bool {
        false
    }

    /// Whether this dialect has a case-insensitive ILIKE.
    fn supports_ilike(&self) -> bool {
        false
    }

    // =========================================================================
    // JSON construction
    // =========================================================================

    /// Function building a JSON object from alternating keys and values.
    fn json_object_fn(&self) -> &'static str;

    /// Aggregate collecting JSON values into an array.
    fn json_array_agg_fn(&self) -> &'static str;

    /// Expression for an empty JSON array.
    fn empty_json_array(&self) -> &'static str;

    /// Most key/value pairs one `json_object_fn` call accepts, if capped.
    fn json_object_max_pairs(&self) -> Option<usize> {
        None
    }

    /// Opening, separator and closing text that merge several JSON object
    /// calls into one object.
    fn json_object_merge(&self) -> (&'static str, &'static str, &'static str) {
        ("JSON_MERGE_PATCH(", ", ", ")")
    }

    /// An expression read as a comparable JSON document.
    ///
    /// - PostgreSQL: `expr::jsonb` (plain `json` has no equality or `?`)
    /// - MySQL: `CAST(expr AS JSON)`
    fn json_value(&self, expr: &str) -> String {
        format!("CAST({} AS JSON)", expr)
    }

    /// JSON key-existence test of an already-rendered column against a placeholder.
    fn json_has_key(&self, column: &str, placeholder: &str) -> String {
        format!("{} ? {}", self.json_value(column), placeholder)
    }

    /// Upsert clause flavour.
    fn upsert_style(&self) -> UpsertStyle;
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
        }
    }

    /// Compile a query operation into `cx`.
    pub fn compile_query(
        &self,
        emitter: &QueryEmitter<'_>,
        cx: &mut CompileContext,
        op: &Operation,
    ) -> CompileResult<()> {
        emitter.emit_query(cx, op)
    }

    /// Compile a mutation operation into `cx`.
    pub fn compile_mutation(
        &self,
        emitter: &QueryEmitter<'_>,
        cx: &mut CompileContext,
        op: &Operation,
    ) -> CompileResult<()> {
        emitter.emit_mutation(cx, op)
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn true_literal(&self) -> &'static str {
        self.dialect().true_literal()
    }

    fn placeholder(&self, index: usize) -> String {
        self.dialect().placeholder(index)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn supports_returning(&self) -> bool {
        self.dialect().supports_returning()
    }

    fn supports_data_modifying_cte(&self) -> bool {
        self.dialect().supports_data_modifying_cte()
    }

    fn supports_recursive_cte(&self) -> bool {
        self.dialect().supports_recursive_cte()
    }

    fn cycle_guard(&self, seed_key: &str, step_key: &str, prev_path: &str) -> CycleGuard {
        self.dialect().cycle_guard(seed_key, step_key, prev_path)
    }

    fn supports_lateral(&self) -> bool {
        self.dialect().supports_lateral()
    }

    fn supports_nulls_ordering(&self) -> bool {
        self.dialect().supports_nulls_ordering()
    }

    fn supports_distinct_on(&self) -> bool {
        self.dialect().supports_distinct_on()
    }

    fn supports_ilike(&self) -> bool {
        self.dialect().supports_ilike()
    }

    fn json_object_fn(&self) -> &'static str {
        self.dialect().json_object_fn()
    }

    fn json_array_agg_fn(&self) -> &'static str {
        self.dialect().json_array_agg_fn()
    }

    fn empty_json_array(&self) -> &'static str {
        self.dialect().empty_json_array()
    }

    fn json_object_max_pairs(&self) -> Option<usize> {
        self.dialect().json_object_max_pairs()
    }

    fn json_object_merge(&self) -> (&'static str, &'static str, &'static str) {
        self.dialect().json_object_merge()
    }

    fn json_value(&self, expr: &str) -> String {
        self.dialect().json_value(expr)
    }

    fn json_has_key(&self, column: &str, placeholder: &str) -> String {
        self.dialect().json_has_key(column, placeholder)
    }

    fn upsert_style(&self) -> UpsertStyle {
        self.dialect().upsert_style()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}
