//! MySQL information_schema query.

use super::MetadataQuery;

/// 8.0.14, the first release resolving outer references inside derived
/// tables, which correlated relation subqueries rely on.
pub const MIN_VERSION: u64 = 80_014;

/// Base tables, columns, primary keys and foreign keys of database `?`
/// (bound once per sub-select), as one JSON document.
const SQL: &str = r#"SELECT JSON_OBJECT(
  'tables', COALESCE((
    SELECT JSON_ARRAYAGG(JSON_OBJECT(
      'name', t.table_name,
      'description', NULLIF(t.table_comment, '')
    ))
    FROM information_schema.tables t
    WHERE t.table_schema = ? AND t.table_type = 'BASE TABLE'
  ), JSON_ARRAY()),
  'columns', COALESCE((
    SELECT JSON_ARRAYAGG(JSON_OBJECT(
      'table', c.table_name,
      'name', c.column_name,
      'type', c.column_type,
      'nullable', c.is_nullable,
      'unique', c.column_key IN ('PRI', 'UNI'),
      'description', NULLIF(c.column_comment, ''),
      'position', c.ordinal_position
    ))
    FROM information_schema.columns c
    JOIN information_schema.tables t
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name
    WHERE c.table_schema = ? AND t.table_type = 'BASE TABLE'
  ), JSON_ARRAY()),
  'primary_keys', COALESCE((
    SELECT JSON_ARRAYAGG(JSON_OBJECT(
      'table', k.table_name,
      'column', k.column_name,
      'position', k.ordinal_position
    ))
    FROM information_schema.key_column_usage k
    WHERE k.table_schema = ? AND k.constraint_name = 'PRIMARY'
  ), JSON_ARRAY()),
  'foreign_keys', COALESCE((
    SELECT JSON_ARRAYAGG(JSON_OBJECT(
      'table', k.table_name,
      'column', k.column_name,
      'ref_table', k.referenced_table_name,
      'ref_column', k.referenced_column_name
    ))
    FROM information_schema.key_column_usage k
    WHERE k.table_schema = ? AND k.referenced_table_name IS NOT NULL
  ), JSON_ARRAY())
) AS metadata"#;

pub(super) const QUERY: MetadataQuery = MetadataQuery {
    engine: "MySQL",
    min_version: MIN_VERSION,
    sql: SQL,
    schema_params: 4,
};
