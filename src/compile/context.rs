//! Compile context and its pool.
//!
//! A [`CompileContext`] is the per-compilation state: the SQL text being
//! written, the bound parameters in placeholder order, the dialect, the
//! variables and an alias counter. Contexts are reused through a
//! [`ContextPool`]; a [`PooledContext`] resets its context and hands it back
//! when dropped, so no parameter or text leaks between compilations.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use serde_json::Value;

use super::error::CompileErrorKind;
use super::operation::Variables;
use crate::sql::{Dialect, SqlDialect, Token, TokenStream};

#[derive(Debug, Default)]
pub struct CompileContext {
    sql: String,
    params: Vec<Value>,
    dialect: Dialect,
    variables: Variables,
    aliases: usize,
}

impl CompileContext {
    pub fn new(dialect: Dialect, variables: Variables) -> Self {
        Self {
            dialect,
            variables,
            ..Self::default()
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        let text = token.serialize(self.dialect);
        self.sql.push_str(&text);
        self
    }

    pub fn tokens(&mut self, stream: &TokenStream) -> &mut Self {
        let text = stream.serialize(self.dialect);
        self.sql.push_str(&text);
        self
    }

    /// Append compiler-generated text verbatim. Never pass client input here.
    pub fn raw(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub fn space(&mut self) -> &mut Self {
        self.sql.push(' ');
        self
    }

    pub fn comma(&mut self) -> &mut Self {
        self.sql.push_str(", ");
        self
    }

    pub fn ident(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote_identifier(name);
        self.sql.push_str(&quoted);
        self
    }

    pub fn qualified(&mut self, schema: Option<&str>, name: &str) -> &mut Self {
        self.push(Token::QualifiedIdent {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }

    /// `"alias"."column"`
    pub fn column(&mut self, alias: &str, column: &str) -> &mut Self {
        self.ident(alias).raw(".").ident(column)
    }

    /// Bind `value` and write its placeholder.
    pub fn param(&mut self, value: Value) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Placeholder text for `value` without writing it, for dialect
    /// functions that wrap the placeholder.
    pub fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    /// Write a JSON object key as a string literal.
    ///
    /// Keys come from client aliases, so only plain names are accepted.
    pub fn json_key(&mut self, key: &str) -> Result<&mut Self, CompileErrorKind> {
        if !is_plain_name(key) {
            return Err(CompileErrorKind::InvalidName(key.to_string()));
        }
        let quoted = self.dialect.quote_string(key);
        self.sql.push_str(&quoted);
        Ok(self)
    }

    /// A fresh `prefix_N` alias, unique within this compilation.
    pub fn next_alias(&mut self, prefix: &str) -> String {
        self.aliases += 1;
        format!("{}_{}", prefix, self.aliases)
    }

    /// Clear everything for reuse, keeping allocations.
    pub fn reset(&mut self) {
        self.sql.clear();
        self.params.clear();
        self.variables.clear();
        self.dialect = Dialect::default();
        self.aliases = 0;
    }

    /// Take the finished SQL and parameters.
    pub fn finish(&mut self) -> (String, Vec<Value>) {
        (
            std::mem::take(&mut self.sql),
            std::mem::take(&mut self.params),
        )
    }
}

/// `[_A-Za-z][_0-9A-Za-z]*`
pub fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

// ============================================================================
// Pool
// ============================================================================

/// Reusable compile contexts.
#[derive(Debug)]
pub struct ContextPool {
    idle: Mutex<Vec<CompileContext>>,
    max_idle: usize,
}

impl ContextPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    pub fn acquire(&self, dialect: Dialect, variables: Variables) -> PooledContext<'_> {
        let mut cx = self.idle.lock().pop().unwrap_or_default();
        cx.dialect = dialect;
        cx.variables = variables;
        PooledContext { cx, pool: self }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut cx: CompileContext) {
        cx.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(cx);
        }
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(16)
    }
}

/// A context on loan from a [`ContextPool`].
pub struct PooledContext<'a> {
    cx: CompileContext,
    pool: &'a ContextPool,
}

impl Deref for PooledContext<'_> {
    type Target = CompileContext;

    fn deref(&self) -> &CompileContext {
        &self.cx
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut CompileContext {
        &mut self.cx
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.cx));
    }
}
