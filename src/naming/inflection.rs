//! String inflection for table and relation names.
//!
//! Pluralization and singularization operate on the last word of a
//! compound identifier (`blog_post` → `blog_posts`, `BlogPost` → `BlogPosts`),
//! so prefixes and casing survive. Irregular plurals common in database
//! schemas are handled first; everything else falls back to `inflector`.

use inflector::Inflector;

/// Irregular plurals that inflector doesn't handle well for database contexts.
static IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("goose", "geese"),
    ("mouse", "mice"),
    ("leaf", "leaves"),
    ("life", "lives"),
    ("knife", "knives"),
    ("wife", "wives"),
    ("half", "halves"),
    ("analysis", "analyses"),
    ("crisis", "crises"),
    ("criterion", "criteria"),
    ("medium", "media"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("vertex", "vertices"),
];

/// Pluralize the last word of `word`.
///
/// # Examples
/// ```ignore
/// assert_eq!(pluralize("blog_post"), "blog_posts");
/// assert_eq!(pluralize("category"), "categories");
/// assert_eq!(pluralize("Person"), "People");
/// ```
pub fn pluralize(word: &str) -> String {
    let (head, last) = split_last_word(word);
    if last.is_empty() {
        return word.to_string();
    }

    let lower = last.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *singular || lower == *plural {
            return format!("{}{}", head, match_case(last, plural));
        }
    }

    format!("{}{}", head, last.to_plural())
}

/// Singularize the last word of `word`.
///
/// # Examples
/// ```ignore
/// assert_eq!(singularize("blog_posts"), "blog_post");
/// assert_eq!(singularize("categories"), "category");
/// assert_eq!(singularize("People"), "Person");
/// ```
pub fn singularize(word: &str) -> String {
    let (head, last) = split_last_word(word);
    if last.is_empty() {
        return word.to_string();
    }

    let lower = last.to_lowercase();
    for (singular, plural) in IRREGULAR_PLURALS {
        if lower == *plural || lower == *singular {
            return format!("{}{}", head, match_case(last, singular));
        }
    }

    format!("{}{}", head, last.to_singular())
}

/// Split an identifier into everything before its last word and the last word.
///
/// Words are delimited by `_` or by an upper-case letter (camel/Pascal case).
pub fn split_last_word(word: &str) -> (&str, &str) {
    if let Some(idx) = word.rfind('_') {
        return (&word[..=idx], &word[idx + 1..]);
    }

    let boundary = word
        .char_indices()
        .rev()
        .find(|(i, c)| *i > 0 && c.is_uppercase())
        .map(|(i, _)| i);

    match boundary {
        Some(i) => (&word[..i], &word[i..]),
        None => ("", word),
    }
}

fn match_case(template: &str, replacement: &str) -> String {
    let upper = template.chars().next().is_some_and(|c| c.is_uppercase());
    if !upper {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
