//! # tablegraph
//!
//! Compiles graph-shaped queries over a relational schema into a single
//! SQL statement that returns the whole result as JSON.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │     Loaders (snapshot, introspection, static overrides)  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [graph builder + inference]
//! ┌─────────────────────────────────────────────────────────┐
//! │          EntityGraph (classes, fields, relations)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │       One parameterized statement (PostgreSQL, MySQL)    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod compile;
pub mod config;
pub mod graph;
pub mod loader;
pub mod naming;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{
        fields, CompileError, CompileOptions, CompiledStatement, Compiler, InputValue,
        Operation, Selection, Variables,
    };
    pub use crate::config::Settings;
    pub use crate::graph::{EntityGraph, GraphBuilder, GraphSnapshot};
    pub use crate::loader::{load_graph, GraphLoader, LoadEnv};
    pub use crate::naming::Namer;
    pub use crate::sql::{Dialect, SqlDialect};
}

pub use compile::{CompileOptions, CompiledStatement, Compiler};
pub use graph::EntityGraph;
pub use sql::Dialect;
