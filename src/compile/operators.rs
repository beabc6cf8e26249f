//! Filter operators.

use std::collections::HashMap;

use crate::graph::ScalarType;
use crate::sql::Token;

/// A comparison a filter can apply to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
    NotIn,
    IsNull,
    HasKey,
}

/// Shape of the operand an operator expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// One value bound as a parameter.
    Value,
    /// A list of values, one parameter each.
    List,
    /// A boolean choosing between two fixed forms.
    Flag,
}

const ORDERED: &[ScalarType] = &[
    ScalarType::Int,
    ScalarType::Float,
    ScalarType::Text,
    ScalarType::Date,
    ScalarType::Timestamp,
    ScalarType::Uuid,
];
const TEXT: &[ScalarType] = &[ScalarType::Text];
const JSON: &[ScalarType] = &[ScalarType::Json];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorSpec {
    pub operator: Operator,
    pub operand: Operand,
    /// Scalar types the operator applies to; empty means all.
    applies: &'static [ScalarType],
}

impl OperatorSpec {
    const fn new(operator: Operator, operand: Operand, applies: &'static [ScalarType]) -> Self {
        Self {
            operator,
            operand,
            applies,
        }
    }

    /// Fields of unknown type accept every operator.
    pub fn applies_to(&self, scalar: ScalarType) -> bool {
        self.applies.is_empty() || scalar == ScalarType::Unknown || self.applies.contains(&scalar)
    }

    /// Infix comparison token for [`Operand::Value`] operators.
    pub fn comparison(&self) -> Option<Token> {
        Some(match self.operator {
            Operator::Eq => Token::Eq,
            Operator::Neq => Token::Ne,
            Operator::Gt => Token::Gt,
            Operator::Gte => Token::Gte,
            Operator::Lt => Token::Lt,
            Operator::Lte => Token::Lte,
            Operator::Like => Token::Like,
            Operator::ILike => Token::ILike,
            _ => return None,
        })
    }
}

/// Operator names recognized in filters.
#[derive(Debug, Clone)]
pub struct OperatorTable {
    by_name: HashMap<&'static str, OperatorSpec>,
}

impl OperatorTable {
    pub fn new() -> Self {
        use Operand::*;
        use Operator::*;

        let entries = [
            ("eq", OperatorSpec::new(Eq, Value, &[])),
            ("neq", OperatorSpec::new(Neq, Value, &[])),
            ("gt", OperatorSpec::new(Gt, Value, ORDERED)),
            ("gte", OperatorSpec::new(Gte, Value, ORDERED)),
            ("lt", OperatorSpec::new(Lt, Value, ORDERED)),
            ("lte", OperatorSpec::new(Lte, Value, ORDERED)),
            ("like", OperatorSpec::new(Like, Value, TEXT)),
            ("ilike", OperatorSpec::new(ILike, Value, TEXT)),
            ("in", OperatorSpec::new(In, List, &[])),
            ("nin", OperatorSpec::new(NotIn, List, &[])),
            ("not_in", OperatorSpec::new(NotIn, List, &[])),
            ("is_null", OperatorSpec::new(IsNull, Flag, &[])),
            ("is", OperatorSpec::new(IsNull, Flag, &[])),
            ("has_key", OperatorSpec::new(HasKey, Value, JSON)),
        ];

        Self {
            by_name: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OperatorSpec> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_name.keys().copied()
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::new()
    }
}
