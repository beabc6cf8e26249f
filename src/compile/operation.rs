//! Validated operation trees.
//!
//! The compiler takes an already-parsed operation: a kind, and a tree of
//! selections with arguments. Argument values may reference variables, which
//! are substituted from the variables map at compile time.
//!
//! The JSON form, as read by the CLI:
//!
//! ```json
//! {
//!   "kind": "query",
//!   "selections": [
//!     {
//!       "name": "posts",
//!       "arguments": {"where": {"id": {"eq": {"$var": "id"}}}, "limit": 5},
//!       "selections": [{"name": "title"}, {"name": "author", "selections": [{"name": "name"}]}]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Variable values by name.
pub type Variables = Map<String, Value>;

/// Key marking a variable reference in the JSON form.
pub const VARIABLE_KEY: &str = "$var";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
}

impl OperationKind {
    /// Root type name reported by `__typename`.
    pub fn root_type(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
        }
    }
}

/// A query or mutation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub selections: Vec<Selection>,
}

impl Operation {
    pub fn query(selections: Vec<Selection>) -> Self {
        Self {
            kind: OperationKind::Query,
            name: None,
            selections,
        }
    }

    pub fn mutation(selections: Vec<Selection>) -> Self {
        Self {
            kind: OperationKind::Mutation,
            name: None,
            selections,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// One selected field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_arguments",
        deserialize_with = "deserialize_arguments"
    )]
    pub arguments: Vec<(String, InputValue)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<Selection>,
}

impl Selection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.arguments.push((name.into(), value.into()));
        self
    }

    pub fn select(mut self, selections: Vec<Selection>) -> Self {
        self.selections.extend(selections);
        self
    }

    /// Key of this field in the JSON result.
    pub fn response_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Leaf selections, one per name.
pub fn fields(names: &[&str]) -> Vec<Selection> {
    names.iter().map(|n| Selection::new(*n)).collect()
}

fn serialize_arguments<S: Serializer>(
    arguments: &[(String, InputValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let map: Map<String, Value> = arguments
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
        .collect();
    map.serialize(serializer)
}

fn deserialize_arguments<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<(String, InputValue)>, D::Error> {
    let map = Map::<String, Value>::deserialize(deserializer)?;
    Ok(map.into_iter().map(|(k, v)| (k, InputValue::from(v))).collect())
}

// ============================================================================
// Input values
// ============================================================================

/// An argument literal.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
    Variable(String),
}

impl InputValue {
    pub fn var(name: impl Into<String>) -> Self {
        InputValue::Variable(name.into())
    }

    /// Substitute variables, producing a plain JSON value.
    ///
    /// Fails with the name of the first variable missing from `variables`.
    pub fn resolve(&self, variables: &Variables) -> Result<Value, String> {
        Ok(match self {
            InputValue::Null => Value::Null,
            InputValue::Bool(b) => Value::Bool(*b),
            InputValue::Int(n) => Value::from(*n),
            InputValue::Float(f) => Value::from(*f),
            InputValue::String(s) | InputValue::Enum(s) => Value::String(s.clone()),
            InputValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|v| v.resolve(variables))
                    .collect::<Result<_, _>>()?,
            ),
            InputValue::Object(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.resolve(variables)?)))
                    .collect::<Result<_, String>>()?,
            ),
            InputValue::Variable(name) => {
                variables.get(name).cloned().ok_or_else(|| name.clone())?
            }
        })
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => InputValue::Null,
            Value::Bool(b) => InputValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => InputValue::Int(i),
                None => InputValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => InputValue::String(s),
            Value::Array(items) => InputValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(name)) = map.get(VARIABLE_KEY) {
                        return InputValue::Variable(name.clone());
                    }
                }
                InputValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<InputValue> for Value {
    fn from(value: InputValue) -> Self {
        match value {
            InputValue::Null => Value::Null,
            InputValue::Bool(b) => Value::Bool(b),
            InputValue::Int(n) => Value::from(n),
            InputValue::Float(f) => Value::from(f),
            InputValue::String(s) | InputValue::Enum(s) => Value::String(s),
            InputValue::List(items) => Value::Array(items.into_iter().map(Into::into).collect()),
            InputValue::Object(pairs) => {
                Value::Object(pairs.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            InputValue::Variable(name) => {
                let mut map = Map::new();
                map.insert(VARIABLE_KEY.to_string(), Value::String(name));
                Value::Object(map)
            }
        }
    }
}

impl From<&str> for InputValue {
    fn from(s: &str) -> Self {
        InputValue::String(s.to_string())
    }
}

impl From<i64> for InputValue {
    fn from(n: i64) -> Self {
        InputValue::Int(n)
    }
}

impl From<bool> for InputValue {
    fn from(b: bool) -> Self {
        InputValue::Bool(b)
    }
}
