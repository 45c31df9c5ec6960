// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Metadata filter compiler
//!
//! Compiles the MongoDB-style filter language into a [`Predicate`] over a
//! record's metadata document. Compilation is pure: malformed filters are
//! rejected here, before anything reaches a backend.
//!
//! Grammar:
//!
//! ```text
//! filter  := { "$and": [filter, ...] }
//!          | { "$or":  [filter, ...] }
//!          | { <field>: { <operator>: <operand> } }
//! operator := $eq | $ne | $lt | $lte | $gt | $gte | $in | $contains
//! ```
//!
//! Every mapping in the grammar holds exactly one entry.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::core::jsonb;
use crate::core::types::Metadata;

/// Errors that can occur during filter compilation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid filter syntax: {0}")]
    InvalidSyntax(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operand for {operator}: {reason}")]
    InvalidOperand { operator: String, reason: String },
}

/// Operators accepted inside a field clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "$eq" => Some(Operator::Eq),
            "$ne" => Some(Operator::Ne),
            "$lt" => Some(Operator::Lt),
            "$lte" => Some(Operator::Lte),
            "$gt" => Some(Operator::Gt),
            "$gte" => Some(Operator::Gte),
            "$in" => Some(Operator::In),
            "$contains" => Some(Operator::Contains),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::In => "$in",
            Operator::Contains => "$contains",
        }
    }
}

/// Typed comparison between a field's stored value and an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
        }
    }

    fn holds(&self, stored: &JsonValue, operand: &JsonValue) -> bool {
        match self {
            Comparison::Eq => jsonb::equals(stored, operand),
            Comparison::Ne => !jsonb::equals(stored, operand),
            Comparison::Lt => jsonb::compare(stored, operand) == Ordering::Less,
            Comparison::Lte => jsonb::compare(stored, operand) != Ordering::Greater,
            Comparison::Gt => jsonb::compare(stored, operand) == Ordering::Greater,
            Comparison::Gte => jsonb::compare(stored, operand) != Ordering::Less,
        }
    }
}

/// Compiled filter over a metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// All sub-predicates hold
    And { predicates: Vec<Predicate> },

    /// At least one sub-predicate holds
    Or { predicates: Vec<Predicate> },

    /// Document contains `{field: value}`; served by the metadata index
    Contains { field: String, value: JsonValue },

    /// `metadata -> field <op> value`
    Compare {
        field: String,
        op: Comparison,
        value: JsonValue,
    },

    /// Field's value equals one of `values`
    In { field: String, values: Vec<JsonValue> },

    /// Field holds an array with `value` as an element
    HasElement { field: String, value: JsonValue },
}

impl Predicate {
    /// Compile a filter expression
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use vecs::core::metadata_filter::Predicate;
    ///
    /// let predicate = Predicate::compile(&json!({
    ///     "$and": [
    ///         {"year": {"$gte": 1990}},
    ///         {"genre": {"$contains": "drama"}}
    ///     ]
    /// })).unwrap();
    ///
    /// let metadata = json!({"year": 1997, "genre": ["drama", "romance"]});
    /// assert!(predicate.matches(metadata.as_object().unwrap()));
    /// ```
    pub fn compile(filter: &JsonValue) -> Result<Self, FilterError> {
        let map = match filter {
            JsonValue::Object(map) => map,
            other => {
                return Err(FilterError::InvalidSyntax(format!(
                    "filters must be a mapping, got {}",
                    jsonb::type_name(other)
                )))
            }
        };

        if map.len() != 1 {
            return Err(FilterError::InvalidSyntax(
                "max one entry per filter".to_string(),
            ));
        }

        let (key, value) = match map.iter().next() {
            Some(entry) => entry,
            None => {
                return Err(FilterError::InvalidSyntax(
                    "max one entry per filter".to_string(),
                ))
            }
        };

        match key.as_str() {
            "$and" => Ok(Predicate::And {
                predicates: Self::compile_list(key, value)?,
            }),
            "$or" => Ok(Predicate::Or {
                predicates: Self::compile_list(key, value)?,
            }),
            field => Self::compile_field(field, value),
        }
    }

    fn compile_list(key: &str, value: &JsonValue) -> Result<Vec<Predicate>, FilterError> {
        let conditions = value.as_array().ok_or_else(|| {
            FilterError::InvalidSyntax(format!(
                "{} filters must have associated list of conditions",
                key
            ))
        })?;

        if conditions.is_empty() {
            return Err(FilterError::InvalidSyntax(format!(
                "{} filters must have at least one condition",
                key
            )));
        }

        conditions.iter().map(Self::compile).collect()
    }

    fn compile_field(field: &str, clause: &JsonValue) -> Result<Self, FilterError> {
        let ops = clause.as_object().ok_or_else(|| {
            FilterError::InvalidSyntax(format!(
                "clause for field '{}' must be a mapping of operator to operand",
                field
            ))
        })?;

        if ops.len() != 1 {
            return Err(FilterError::InvalidSyntax(
                "only one operator permitted".to_string(),
            ));
        }

        let (symbol, operand) = match ops.iter().next() {
            Some(entry) => entry,
            None => {
                return Err(FilterError::InvalidSyntax(
                    "only one operator permitted".to_string(),
                ))
            }
        };

        let operator = Operator::from_symbol(symbol)
            .ok_or_else(|| FilterError::UnsupportedOperator(symbol.clone()))?;

        let compare = |op: Comparison| Predicate::Compare {
            field: field.to_string(),
            op,
            value: operand.clone(),
        };

        match operator {
            // Equality against a scalar without a length can use the metadata index via
            // containment; strings, arrays and objects need structural equality.
            Operator::Eq => match operand {
                JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) => {
                    Ok(Predicate::Contains {
                        field: field.to_string(),
                        value: operand.clone(),
                    })
                }
                _ => Ok(compare(Comparison::Eq)),
            },
            Operator::Ne => Ok(compare(Comparison::Ne)),
            Operator::Lt => Ok(compare(Comparison::Lt)),
            Operator::Lte => Ok(compare(Comparison::Lte)),
            Operator::Gt => Ok(compare(Comparison::Gt)),
            Operator::Gte => Ok(compare(Comparison::Gte)),
            Operator::In => {
                let values = operand.as_array().ok_or_else(|| FilterError::InvalidOperand {
                    operator: operator.symbol().to_string(),
                    reason: "argument to $in filter must be a list".to_string(),
                })?;
                if let Some(bad) = values.iter().find(|v| !is_filter_scalar(v)) {
                    return Err(FilterError::InvalidOperand {
                        operator: operator.symbol().to_string(),
                        reason: format!(
                            "argument to $in filter must be a list of scalars, found {}",
                            jsonb::type_name(bad)
                        ),
                    });
                }
                Ok(Predicate::In {
                    field: field.to_string(),
                    values: values.clone(),
                })
            }
            Operator::Contains => {
                if !is_filter_scalar(operand) {
                    return Err(FilterError::InvalidOperand {
                        operator: operator.symbol().to_string(),
                        reason: format!(
                            "argument to $contains filter must be a scalar, found {}",
                            jsonb::type_name(operand)
                        ),
                    });
                }
                Ok(Predicate::HasElement {
                    field: field.to_string(),
                    value: operand.clone(),
                })
            }
        }
    }

    /// Check if metadata matches this predicate
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Predicate::And { predicates } => predicates.iter().all(|p| p.matches(metadata)),
            Predicate::Or { predicates } => predicates.iter().any(|p| p.matches(metadata)),
            Predicate::Contains { field, value } => metadata
                .get(field)
                .map_or(false, |stored| jsonb::value_contains(stored, value)),
            Predicate::Compare { field, op, value } => metadata
                .get(field)
                .map_or(false, |stored| op.holds(stored, value)),
            Predicate::In { field, values } => metadata
                .get(field)
                .map_or(false, |stored| values.iter().any(|v| jsonb::equals(stored, v))),
            Predicate::HasElement { field, value } => metadata
                .get(field)
                .map_or(false, |stored| {
                    stored.is_array() && jsonb::contains(stored, value)
                }),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::And { predicates } | Predicate::Or { predicates } => {
                let joiner = if matches!(self, Predicate::And { .. }) {
                    " and "
                } else {
                    " or "
                };
                write!(f, "(")?;
                for (i, p) in predicates.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Predicate::Contains { field, value } => write!(f, "{} @> {}", field, value),
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} {}", field, op.sql_operator(), value)
            }
            Predicate::In { field, values } => {
                write!(f, "{} in {}", field, JsonValue::Array(values.clone()))
            }
            Predicate::HasElement { field, value } => write!(f, "{} has {}", field, value),
        }
    }
}

/// Compile a filter expression; see [`Predicate::compile`].
pub fn compile(filter: &JsonValue) -> Result<Predicate, FilterError> {
    Predicate::compile(filter)
}

fn is_filter_scalar(value: &JsonValue) -> bool {
    matches!(
        value,
        JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_)
    )
}
