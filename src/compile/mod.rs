//! Operation compilation.
//!
//! Turns a validated [`Operation`] and its variables into one parameterized
//! SQL statement for the configured dialect:
//!
//! ```text
//! Operation + Variables → QueryEmitter → CompileContext → CompiledStatement
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tablegraph::compile::{fields, CompileOptions, Compiler, Operation, Selection, Variables};
//!
//! let compiler = Compiler::new(graph, CompileOptions::default());
//! let op = Operation::query(vec![Selection::new("users").select(fields(&["id", "name"]))]);
//! let stmt = compiler.compile(&op, &Variables::new())?;
//! println!("{} {:?}", stmt.sql, stmt.params);
//! ```
//!
//! A [`Compiler`] is immutable after construction apart from its context
//! pool and may be shared across threads.

mod args;
mod context;
mod error;
mod filter;
mod mutation;
mod operation;
mod operators;
mod query;

pub use args::{Direction, NullsOrder};
pub use context::{is_plain_name, CompileContext, ContextPool, PooledContext};
pub use error::{CompileError, CompileErrorKind, CompileResult};
pub use operation::{fields, InputValue, Operation, OperationKind, Selection, Variables};
pub use operators::{Operand, Operator, OperatorSpec, OperatorTable};
pub use query::{QueryEmitter, ROOT_ALIAS, TYPENAME};

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::graph::EntityGraph;
use crate::sql::Dialect;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// SQL dialect to generate.
    pub dialect: Dialect,
    /// Row limit of list fields without an explicit `limit`; 0 disables it.
    pub default_limit: u64,
    /// Deepest allowed selection nesting.
    pub max_depth: usize,
    /// Contexts kept for reuse.
    pub pool_size: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            default_limit: 20,
            max_depth: 16,
            pool_size: 16,
        }
    }
}

impl CompileOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            dialect: settings.dialect,
            default_limit: settings.default_limit,
            max_depth: settings.max_depth,
            ..Self::default()
        }
    }

    /// Set the SQL dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// One SQL statement and its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles operations against one graph.
#[derive(Debug)]
pub struct Compiler {
    graph: Arc<EntityGraph>,
    operators: OperatorTable,
    pool: ContextPool,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(graph: Arc<EntityGraph>, options: CompileOptions) -> Self {
        Self {
            graph,
            operators: OperatorTable::new(),
            pool: ContextPool::new(options.pool_size),
            options,
        }
    }

    pub fn graph(&self) -> &Arc<EntityGraph> {
        &self.graph
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    /// Compile one operation.
    pub fn compile(
        &self,
        op: &Operation,
        variables: &Variables,
    ) -> CompileResult<CompiledStatement> {
        let dialect = self.options.dialect;
        let mut cx = self.pool.acquire(dialect, variables.clone());
        let emitter = QueryEmitter::new(&self.graph, &self.operators, &self.options);

        match op.kind {
            OperationKind::Query => dialect.compile_query(&emitter, &mut cx, op)?,
            OperationKind::Mutation => dialect.compile_mutation(&emitter, &mut cx, op)?,
        }

        let (sql, params) = cx.finish();
        debug!(
            operation = op.name.as_deref().unwrap_or("anonymous"),
            kind = op.kind.root_type(),
            %dialect,
            params = params.len(),
            "compiled operation"
        );
        Ok(CompiledStatement { sql, params })
    }

    /// Compile several operations independently; one failure does not
    /// affect the others.
    pub fn compile_all(
        &self,
        ops: &[Operation],
        variables: &Variables,
    ) -> Vec<CompileResult<CompiledStatement>> {
        ops.iter().map(|op| self.compile(op, variables)).collect()
    }
}
