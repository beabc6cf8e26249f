//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
/// Used by: All dialects
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Placeholders
// =============================================================================

/// Numbered placeholder (`$1`, `$2`, ...). `index` is 1-based.
/// Used by: Postgres
pub fn placeholder_numbered(index: usize) -> String {
    format!("${}", index)
}

/// Positional placeholder (`?`).
/// Used by: MySQL
pub fn placeholder_question(_index: usize) -> String {
    "?".into()
}

// =============================================================================
// Pagination
// =============================================================================

/// Largest row count MySQL accepts, used when only an offset is given.
pub const MYSQL_MAX_ROWS: u64 = 18_446_744_073_709_551_615;

/// Emit LIMIT ... OFFSET ... (standard SQL).
/// Used by: Postgres
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit).space().push(lit_u64(lim));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset).space().push(lit_u64(off));
    }

    ts
}

/// Emit `LIMIT offset, count` (MySQL style).
///
/// MySQL has no standalone OFFSET, so an offset without a limit uses the
/// maximum row count.
pub fn emit_limit_offset_mysql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    match (limit, offset) {
        (Some(lim), None) => {
            ts.push(Token::Limit).space().push(lit_u64(lim));
        }
        (lim, Some(off)) => {
            ts.push(Token::Limit)
                .space()
                .push(lit_u64(off))
                .comma()
                .space()
                .push(Token::Raw(lim.unwrap_or(MYSQL_MAX_ROWS).to_string()));
        }
        (None, None) => {}
    }

    ts
}

fn lit_u64(n: u64) -> Token {
    match i64::try_from(n) {
        Ok(v) => Token::LitInt(v),
        Err(_) => Token::Raw(n.to_string()),
    }
}
