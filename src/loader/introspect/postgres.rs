//! PostgreSQL catalog query.

use super::MetadataQuery;

/// `server_version_num` of PostgreSQL 10.
pub const MIN_VERSION: u64 = 100_000;

/// Base and partitioned tables, their columns, primary keys and foreign
/// keys for schema `$1`, as one JSON document.
const SQL: &str = r#"SELECT json_build_object(
  'tables', coalesce((
    SELECT json_agg(json_build_object(
      'name', c.relname,
      'description', obj_description(c.oid, 'pg_class')
    ) ORDER BY c.relname)
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
  ), '[]'::json),
  'columns', coalesce((
    SELECT json_agg(json_build_object(
      'table', c.relname,
      'name', a.attname,
      'type', format_type(a.atttypid, a.atttypmod),
      'nullable', NOT a.attnotnull,
      'unique', EXISTS (
        SELECT 1 FROM pg_constraint u
        WHERE u.conrelid = c.oid AND u.contype IN ('p', 'u') AND u.conkey = ARRAY[a.attnum]
      ),
      'description', col_description(c.oid, a.attnum),
      'position', a.attnum
    ) ORDER BY c.relname, a.attnum)
    FROM pg_attribute a
    JOIN pg_class c ON c.oid = a.attrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relkind IN ('r', 'p') AND a.attnum > 0 AND NOT a.attisdropped
  ), '[]'::json),
  'primary_keys', coalesce((
    SELECT json_agg(json_build_object(
      'table', c.relname,
      'column', a.attname,
      'position', k.ord
    ) ORDER BY c.relname, k.ord)
    FROM pg_constraint con
    JOIN pg_class c ON c.oid = con.conrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
    WHERE n.nspname = $1 AND con.contype = 'p'
  ), '[]'::json),
  'foreign_keys', coalesce((
    SELECT json_agg(json_build_object(
      'table', c.relname,
      'column', a.attname,
      'ref_table', rc.relname,
      'ref_column', ra.attname
    ) ORDER BY c.relname, con.conname, k.ord)
    FROM pg_constraint con
    JOIN pg_class c ON c.oid = con.conrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_class rc ON rc.oid = con.confrelid
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, ord)
    JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
    JOIN pg_attribute ra ON ra.attrelid = rc.oid AND ra.attnum = k.ref_attnum
    WHERE n.nspname = $1 AND con.contype = 'f'
  ), '[]'::json)
) AS metadata"#;

pub(super) const QUERY: MetadataQuery = MetadataQuery {
    engine: "PostgreSQL",
    min_version: MIN_VERSION,
    sql: SQL,
    schema_params: 1,
};
