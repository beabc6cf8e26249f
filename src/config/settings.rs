//! TOML-based configuration for tablegraph.
//!
//! Supports a config file (tablegraph.toml) with environment variable
//! expansion for paths.
//!
//! Example configuration:
//! ```toml
//! dialect = "postgres"
//! schema = "public"
//! default_limit = 20
//! exclude_tables = ["schema_migrations"]
//! exclude_fields = ["users.password_hash"]
//!
//! [naming]
//! camel_case = true
//! singularize = true
//! table_prefixes = ["tbl_"]
//!
//! [loaders]
//! required = ["introspection"]
//! snapshot = "${STATE_DIR}/graph.json"
//!
//! [classes.Author]
//! table = "users"
//! exclude = ["email"]
//!
//! [classes.Author.fields.name]
//! column = "full_name"
//! description = "Display name"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Target SQL engine.
    pub dialect: Dialect,

    /// Schema (PostgreSQL) or database (MySQL) to introspect.
    pub schema: String,

    /// Row limit applied to list fields that carry no `limit` argument.
    pub default_limit: u64,

    /// Deepest selection nesting the compiler accepts.
    pub max_depth: usize,

    /// Tables never loaded into the graph.
    pub exclude_tables: Vec<String>,

    /// Columns never loaded, written `table.column`.
    pub exclude_fields: Vec<String>,

    /// Naming convention toggles.
    pub naming: NamingSettings,

    /// Loader selection.
    pub loaders: LoaderSettings,

    /// Declarative class overrides, keyed by logical class name.
    pub classes: BTreeMap<String, ClassOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            schema: "public".to_string(),
            default_limit: 20,
            max_depth: 16,
            exclude_tables: Vec::new(),
            exclude_fields: Vec::new(),
            naming: NamingSettings::default(),
            loaders: LoaderSettings::default(),
            classes: BTreeMap::new(),
        }
    }
}

/// Naming convention settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NamingSettings {
    /// Upper camel case class names, lower camel case field names.
    pub camel_case: bool,

    /// Singularize class names derived from plural table names.
    ///
    /// Without it a class keeps its table name, and a table whose name is
    /// already singular (`person`) registers that name as its list root, so
    /// it gets no single-row root.
    pub singularize: bool,

    /// Table prefixes to strip; the longest matching prefix wins.
    pub table_prefixes: Vec<String>,

    /// Words never singularized or pluralized.
    pub uncountable: Vec<String>,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            camel_case: false,
            singularize: false,
            table_prefixes: Vec::new(),
            uncountable: vec![
                "children".to_string(),
                "data".to_string(),
                "metadata".to_string(),
                "information".to_string(),
                "series".to_string(),
            ],
        }
    }
}

/// Loader settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Loaders whose failure aborts the graph build.
    pub required: Vec<String>,

    /// Snapshot file read by the snapshot loader (supports ${ENV_VAR} expansion).
    pub snapshot: Option<String>,
}

/// Declarative override for one class.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassOverride {
    /// Physical table. When it names a table already loaded under another
    /// name, this class becomes an alias of it.
    pub table: Option<String>,

    /// Class with no physical table.
    #[serde(rename = "virtual")]
    pub is_virtual: bool,

    /// Replace an existing registration of this name instead of failing.
    #[serde(rename = "override")]
    pub replace: bool,

    pub description: Option<String>,

    /// Primary key field names; replaces introspected keys when non-empty.
    pub primary_keys: Vec<String>,

    /// Keep only these fields (primary keys are always kept).
    pub include: Vec<String>,

    /// Drop these fields.
    pub exclude: Vec<String>,

    /// Per-field overrides keyed by field name.
    pub fields: BTreeMap<String, FieldOverride>,
}

impl ClassOverride {
    /// Whether applying this override changes the field set of a class.
    pub fn edits_fields(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty() || !self.fields.is_empty()
    }
}

/// Declarative override for one field.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldOverride {
    /// Physical column, when it differs from the field name.
    pub column: Option<String>,

    /// Scalar type name (SQL spelling, e.g. `integer`, `text`, `jsonb`).
    #[serde(rename = "type")]
    pub scalar: Option<String>,

    pub description: Option<String>,

    pub nullable: Option<bool>,

    /// Foreign key target written `table.column` (or `table`, meaning its primary key).
    pub relation: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the loaders and compiler cannot work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.default_limit == 0 {
            return Err(SettingsError::InvalidConfig(
                "default_limit must be greater than zero".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(SettingsError::InvalidConfig(
                "max_depth must be greater than zero".into(),
            ));
        }
        for field in &self.exclude_fields {
            if !field.contains('.') {
                return Err(SettingsError::InvalidConfig(format!(
                    "exclude_fields entry '{}' must be written table.column",
                    field
                )));
            }
        }
        for (name, class) in &self.classes {
            if class.is_virtual && class.table.is_some() {
                return Err(SettingsError::InvalidConfig(format!(
                    "class '{}' cannot be virtual and name a table",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn is_table_excluded(&self, table: &str) -> bool {
        self.exclude_tables.iter().any(|t| t == table)
    }

    pub fn is_field_excluded(&self, table: &str, column: &str) -> bool {
        self.exclude_fields
            .iter()
            .filter_map(|f| f.split_once('.'))
            .any(|(t, c)| t == table && c == column)
    }

    /// Snapshot path with environment variables expanded.
    pub fn snapshot_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        match &self.loaders.snapshot {
            Some(path) => Ok(Some(PathBuf::from(expand_env_vars(path)?))),
            None => Ok(None),
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
