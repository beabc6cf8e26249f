//! Naming Normalizer.
//!
//! Maps raw table and column identifiers to the names clients use:
//! prefix stripping, optional camel casing, and singular/plural forms for
//! class names and relation fields.

pub mod inflection;

use std::collections::HashSet;

use inflector::Inflector;

use crate::config::NamingSettings;

/// Pure naming rules derived from [`NamingSettings`].
#[derive(Debug, Clone)]
pub struct Namer {
    camel_case: bool,
    singularize: bool,
    /// Sorted longest first.
    prefixes: Vec<String>,
    uncountable: HashSet<String>,
}

impl Default for Namer {
    fn default() -> Self {
        Self::new(&NamingSettings::default())
    }
}

impl Namer {
    pub fn new(settings: &NamingSettings) -> Self {
        let mut prefixes: Vec<String> = settings
            .table_prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()));

        let mut uncountable: HashSet<String> = settings
            .uncountable
            .iter()
            .map(|w| w.to_lowercase())
            .collect();
        uncountable.insert("children".to_string());

        Self {
            camel_case: settings.camel_case,
            singularize: settings.singularize,
            prefixes,
            uncountable,
        }
    }

    pub fn camel_case(&self) -> bool {
        self.camel_case
    }

    /// Strip the longest configured prefix. A table that is nothing but a
    /// prefix keeps its name.
    pub fn strip_prefix<'a>(&self, table: &'a str) -> &'a str {
        self.prefixes
            .iter()
            .find_map(|p| table.strip_prefix(p.as_str()))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(table)
    }

    /// Logical class name for a physical table.
    pub fn class_name(&self, table: &str) -> String {
        let base = self.strip_prefix(table);
        let base = if self.singularize {
            self.singularize(base)
        } else {
            base.to_string()
        };
        if self.camel_case {
            base.to_pascal_case()
        } else {
            base
        }
    }

    /// Logical field name for a physical column.
    pub fn field_name(&self, column: &str) -> String {
        if self.camel_case {
            column.to_camel_case()
        } else {
            column.to_string()
        }
    }

    pub fn pluralize(&self, word: &str) -> String {
        if self.is_uncountable(word) {
            word.to_string()
        } else {
            inflection::pluralize(word)
        }
    }

    pub fn singularize(&self, word: &str) -> String {
        if self.is_uncountable(word) {
            word.to_string()
        } else {
            inflection::singularize(word)
        }
    }

    /// Field name exposing a list of `class_name` entities (`BlogPost` → `blogPosts`).
    pub fn list_field_name(&self, class_name: &str) -> String {
        self.field_case(&self.pluralize(class_name))
    }

    /// Field name exposing one `class_name` entity (`BlogPost` → `blogPost`).
    pub fn object_field_name(&self, class_name: &str) -> String {
        self.field_case(&self.singularize(class_name))
    }

    fn field_case(&self, name: &str) -> String {
        if self.camel_case {
            name.to_camel_case()
        } else {
            name.to_snake_case()
        }
    }

    fn is_uncountable(&self, word: &str) -> bool {
        let (_, last) = inflection::split_last_word(word);
        self.uncountable.contains(&last.to_lowercase())
    }
}
